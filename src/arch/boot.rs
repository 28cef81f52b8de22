//! The Multiboot header and the `_start` entry trampoline (spec.md 1 "Out
//! of scope: ... the Multiboot loader that delivers the info structure",
//! 6 "Multiboot entry": "the kernel is entered with `magic` in EAX and a
//! pointer to an info structure in EBX").
//!
//! GRUB (or any other Multiboot-compliant loader) scans the first 8 KiB
//! of the kernel image for the header below, loads the ELF image at the
//! link address `linker.ld` fixes at 1 MiB, and jumps to `_start` in
//! 32-bit protected mode with paging disabled, a flat unknown GDT, and no
//! guarantee about the stack. `_start` switches onto a stack this crate
//! owns and calls into [`super::super::kernel_main::run`] with the two
//! registers the loader handed it, the same boundary
//! `SQLpassion-osdev`'s `boot.asm` hands off to its Rust entry point.

use core::arch::global_asm;

const MULTIBOOT1_MAGIC: u32 = 0x1BADB002;
const FLAG_ALIGN: u32 = 1 << 0;
const FLAG_MEMINFO: u32 = 1 << 1;
const FLAGS: u32 = FLAG_ALIGN | FLAG_MEMINFO;
const CHECKSUM: u32 = (0u32).wrapping_sub(MULTIBOOT1_MAGIC).wrapping_sub(FLAGS);

/// Size of the stack `_start` switches onto before Rust code runs. 64
/// KiB is generously more than the deepest call chain in this kernel
/// (no recursion anywhere: the FAT32 cluster walk and USB enumeration
/// are both iterative) ever needs.
const BOOT_STACK_SIZE: usize = 64 * 1024;

#[no_mangle]
static mut BOOT_STACK: [u8; BOOT_STACK_SIZE] = [0; BOOT_STACK_SIZE];

/// Top of the stack `_start` already switched onto before calling
/// `kernel_entry`. This kernel never enters user mode (spec.md 1
/// Non-goals), so the TSS's `esp0` the GDT needs is simply this same
/// stack rather than a second one set aside for privilege transitions.
pub fn stack_top() -> u32 {
    unsafe { core::ptr::addr_of!(BOOT_STACK) as u32 + BOOT_STACK_SIZE as u32 }
}

global_asm!(
    r#"
.section .multiboot_header, "a"
.align 4
.long {magic}
.long {flags}
.long {checksum}

.section .text.boot, "ax"
.global _start
_start:
    cli
    mov esp, offset BOOT_STACK + {stack_size}
    and esp, 0xFFFFFFF0
    push 0
    push ebp
    mov ebp, esp

    push ebx
    push eax
    call kernel_entry
2:
    cli
    hlt
    jmp 2b
"#,
    magic = const MULTIBOOT1_MAGIC,
    flags = const FLAGS,
    checksum = const CHECKSUM,
    stack_size = const BOOT_STACK_SIZE,
);

extern "C" {
    /// Defined in `main.rs`; the single handoff point from assembly into
    /// Rust (spec.md 6's `magic`-in-EAX, info-pointer-in-EBX contract,
    /// passed through here as plain arguments instead).
    fn kernel_entry(magic: u32, info_ptr: u32) -> !;
}

/// Resolves the absolute-pointer fields `crate::multiboot::parse_v1`
/// deliberately leaves unresolved (cmdline, bootloader name, and the
/// separate memory-map table) against identity-mapped physical memory.
/// Paging is never enabled (spec.md 1 Non-goals), so every physical
/// address the Multiboot v1 header carries is also a valid pointer here.
///
/// # Safety
/// `info_ptr` must be the untouched EBX value the loader handed
/// `_start`, and must still point at a live Multiboot v1 info structure.
pub unsafe fn resolve_v1_tables(info: &mut crate::multiboot::BootInfo, info_ptr: u32) {
    unsafe {
        let header = core::slice::from_raw_parts(info_ptr as *const u8, 112);
        let flags = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);

        const FLAG_CMDLINE: u32 = 1 << 2;
        const FLAG_MMAP: u32 = 1 << 6;
        const FLAG_BOOTLOADER_NAME: u32 = 1 << 9;

        if flags & FLAG_CMDLINE != 0 {
            let ptr = u32::from_le_bytes([header[16], header[17], header[18], header[19]]);
            if ptr != 0 {
                info.command_line = read_cstr_at(ptr);
            }
        }

        if flags & FLAG_BOOTLOADER_NAME != 0 {
            let ptr = u32::from_le_bytes([header[64], header[65], header[66], header[67]]);
            if ptr != 0 {
                info.bootloader_name = read_cstr_at(ptr);
            }
        }

        if flags & FLAG_MMAP != 0 {
            let len = u32::from_le_bytes([header[44], header[45], header[46], header[47]]);
            let addr = u32::from_le_bytes([header[48], header[49], header[50], header[51]]);
            if addr != 0 && len > 0 {
                let table = core::slice::from_raw_parts(addr as *const u8, len as usize);
                info.memory_map = crate::multiboot::parse_mmap_table(table);
            }
        }
    }
}

/// # Safety
/// `ptr` must point at a live, NUL-terminated string in physical memory.
unsafe fn read_cstr_at(ptr: u32) -> Option<alloc::string::String> {
    unsafe {
        const MAX_LEN: usize = 256;
        let bytes = core::slice::from_raw_parts(ptr as *const u8, MAX_LEN);
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(MAX_LEN);
        core::str::from_utf8(&bytes[..len]).ok().map(alloc::string::String::from)
    }
}
