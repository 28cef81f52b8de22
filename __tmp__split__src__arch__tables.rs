//! `lgdt`/`lidt`/`ltr`, hand-rolled the way `asterism-labs-hadron`'s
//! `arch/x86_64/instructions/tables.rs` does rather than pulling in a
//! typed descriptor-table crate for three privileged instructions.

use core::arch::asm;
use core::mem::size_of;

/// The `limit:base` pair `lgdt`/`lidt` read from memory. 32-bit protected
/// mode uses a 32-bit base, unlike the 64-bit version of this structure.
#[repr(C, packed)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u32,
}

impl DescriptorTablePointer {
    pub fn new(base: u32, limit: u16) -> DescriptorTablePointer {
        DescriptorTablePointer { limit, base }
    }
}

/// # Safety
/// `ptr` must describe a live, correctly laid out GDT that outlives every
/// subsequent segment load.
#[inline]
pub unsafe fn lgdt(ptr: &DescriptorTablePointer) {
    unsafe {
        asm!("lgdt [{0}]", in(reg) ptr, options(nostack, preserves_flags));
    }
}

/// # Safety
/// `ptr` must describe a live, correctly laid out IDT.
#[inline]
pub unsafe fn lidt(ptr: &DescriptorTablePointer) {
    unsafe {
        asm!("lidt [{0}]", in(reg) ptr, options(nostack, preserves_flags));
    }
}

/// # Safety
/// `selector` must reference a present TSS descriptor in the currently
/// loaded GDT.
#[inline]
pub unsafe fn ltr(selector: u16) {
    unsafe {
        asm!("ltr {0:x}", in(reg) selector, options(nostack, preserves_flags));
    }
}

pub const fn table_pointer_size() -> usize {
    size_of::<DescriptorTablePointer>()
}


