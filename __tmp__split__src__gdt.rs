//! Flat GDT layout and descriptor packing (spec.md 3 "GDT entry", 4.1).
//!
//! Six entries: null, kernel code, kernel data, user code, user data, and
//! a TSS placeholder, all base 0 / limit 4 GiB except the TSS. Loading the
//! table into the processor (`lgdt` + the far-jump/segment-reload dance)
//! is an assembly trampoline out of this crate's scope per spec.md 1 "Out
//! of scope"; this module only builds the eight-byte descriptors, which is
//! pure bit-packing and so lives in the host-testable half of the crate.

pub const NULL_SEGMENT: u16 = 0x00;
pub const KERNEL_CODE_SEGMENT: u16 = 0x08;
pub const KERNEL_DATA_SEGMENT: u16 = 0x10;
pub const USER_CODE_SEGMENT: u16 = 0x18;
pub const USER_DATA_SEGMENT: u16 = 0x20;
pub const TSS_SEGMENT: u16 = 0x28;

pub const GDT_ENTRY_COUNT: usize = 6;

const ACCESS_PRESENT: u8 = 1 << 7;
const ACCESS_RING3: u8 = 3 << 5;
const ACCESS_DESCRIPTOR: u8 = 1 << 4; // code/data, not a system segment
const ACCESS_EXECUTABLE: u8 = 1 << 3;
const ACCESS_RW: u8 = 1 << 1; // readable (code) / writable (data)
const ACCESS_ACCESSED: u8 = 1 << 0;
const ACCESS_TSS_AVAILABLE: u8 = 0x9;

const FLAG_GRANULARITY_4K: u8 = 1 << 3;
const FLAG_SIZE_32BIT: u8 = 1 << 2;

/// An 8-byte segment descriptor, packed the way the CPU expects it in
/// memory: base split across three fields, limit split across two.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    limit_high_flags: u8,
    base_high: u8,
}

impl GdtEntry {
    pub const fn null() -> GdtEntry {
        GdtEntry {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            limit_high_flags: 0,
            base_high: 0,
        }
    }

    /// Builds a descriptor for `base`/`limit` with the given access byte
    /// and granularity/size flags (spec.md 3 "GDT entry").
    pub fn new(base: u32, limit: u32, access: u8, flags: u8) -> GdtEntry {
        GdtEntry {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            limit_high_flags: (((limit >> 16) & 0x0F) as u8) | (flags << 4),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    fn flat(access: u8) -> GdtEntry {
        // limit 0xFFFFF with 4K granularity covers the full 4 GiB flat
        // address space spec.md 4.1 describes.
        GdtEntry::new(0, 0x000F_FFFF, access, FLAG_GRANULARITY_4K | FLAG_SIZE_32BIT)
    }

    pub fn kernel_code() -> GdtEntry {
        GdtEntry::flat(ACCESS_PRESENT | ACCESS_DESCRIPTOR | ACCESS_EXECUTABLE | ACCESS_RW)
    }

    pub fn kernel_data() -> GdtEntry {
        GdtEntry::flat(ACCESS_PRESENT | ACCESS_DESCRIPTOR | ACCESS_RW)
    }

    pub fn user_code() -> GdtEntry {
        GdtEntry::flat(
            ACCESS_PRESENT | ACCESS_RING3 | ACCESS_DESCRIPTOR | ACCESS_EXECUTABLE | ACCESS_RW,
        )
    }

    pub fn user_data() -> GdtEntry {
        GdtEntry::flat(ACCESS_PRESENT | ACCESS_RING3 | ACCESS_DESCRIPTOR | ACCESS_RW)
    }

    /// TSS placeholder: base/limit point at a 104-byte structure owned by
    /// `arch` at kernel-runtime; here it is zeroed since this module never
    /// touches real memory.
    pub fn tss_placeholder(base: u32, limit: u32) -> GdtEntry {
        GdtEntry::new(base, limit, ACCESS_PRESENT | ACCESS_TSS_AVAILABLE, 0)
    }

    pub fn access_byte(&self) -> u8 {
        self.access
    }

    pub fn limit_low(&self) -> u16 {
        self.limit_low
    }

    pub fn base_low(&self) -> u16 {
        self.base_low
    }
}

/// The six-entry flat table, spec.md 3 "Six entries: null, kernel
/// code, kernel data, user code, user data, TSS placeholder".
#[repr(C, packed)]
pub struct GdtTable {
    entries: [GdtEntry; GDT_ENTRY_COUNT],
}

impl GdtTable {
    pub const fn uninitialized() -> GdtTable {
        GdtTable {
            entries: [GdtEntry::null(); GDT_ENTRY_COUNT],
        }
    }

    /// Builds the standard flat table. `tss_base`/`tss_limit` describe the
    /// TSS structure `arch` owns; pass `(0, 0)` if no TSS is installed yet.
    pub fn flat(tss_base: u32, tss_limit: u32) -> GdtTable {
        GdtTable {
            entries: [
                GdtEntry::null(),
                GdtEntry::kernel_code(),
                GdtEntry::kernel_data(),
                GdtEntry::user_code(),
                GdtEntry::user_data(),
                GdtEntry::tss_placeholder(tss_base, tss_limit),
            ],
        }
    }

    pub fn entries(&self) -> &[GdtEntry; GDT_ENTRY_COUNT] {
        &self.entries
    }

    /// `base`/`limit` pair for the `lgdt` pseudo-descriptor; the caller
    /// (arch, kernel-target only) owns computing the table's address.
    pub fn limit_bytes() -> u16 {
        (GDT_ENTRY_COUNT * core::mem::size_of::<GdtEntry>() - 1) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_8_byte_aligned_in_order() {
        assert_eq!(NULL_SEGMENT, 0);
        assert_eq!(KERNEL_CODE_SEGMENT, 8);
        assert_eq!(KERNEL_DATA_SEGMENT, 16);
        assert_eq!(USER_CODE_SEGMENT, 24);
        assert_eq!(USER_DATA_SEGMENT, 32);
        assert_eq!(TSS_SEGMENT, 40);
    }

    #[test]
    fn kernel_code_descriptor_is_flat_4gib() {
        let e = GdtEntry::kernel_code();
        assert_eq!({ e.limit_low }, 0xFFFF);
        assert_eq!(e.limit_high_flags & 0x0F, 0x0F);
        assert_eq!(e.access_byte() & ACCESS_PRESENT, ACCESS_PRESENT);
        assert_eq!(e.access_byte() & ACCESS_EXECUTABLE, ACCESS_EXECUTABLE);
    }

    #[test]
    fn user_segments_carry_ring3_dpl() {
        let code = GdtEntry::user_code();
        let data = GdtEntry::user_data();
        assert_eq!(code.access_byte() & ACCESS_RING3, ACCESS_RING3);
        assert_eq!(data.access_byte() & ACCESS_RING3, ACCESS_RING3);
    }

    #[test]
    fn kernel_segments_have_ring0_dpl() {
        let code = GdtEntry::kernel_code();
        assert_eq!(code.access_byte() & ACCESS_RING3, 0);
    }

    #[test]
    fn flat_table_has_six_entries_null_first() {
        let t = GdtTable::flat(0, 0);
        assert_eq!(t.entries().len(), 6);
        assert_eq!(t.entries()[0].access_byte(), 0);
    }

    #[test]
    fn limit_bytes_matches_table_size_minus_one() {
        assert_eq!(GdtTable::limit_bytes() as usize, GDT_ENTRY_COUNT * 8 - 1);
    }
}


