//! Loads the flat GDT `crate::gdt` describes and performs the
//! segment-register reload dance (spec.md 4.1 "installs a flat GDT ...
//! then loads it via an assembly trampoline that reloads all segment
//! selectors").
//!
//! `mov` cannot target `cs`; reloading it requires a far jump, so that
//! half of the trampoline is a tiny `global_asm!` block, the same shape
//! `SQLpassion-osdev`'s `gdt_flush_and_reload` uses for its long-mode
//! segment reload (there: data segments by `mov`, `cs` left alone because
//! long mode never changes it at this point; here we must reload `cs`
//! too since protected mode checks `CS.L`/`CS.D` on every far transfer).

use core::arch::global_asm;
use core::mem::size_of;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::gdt::{GdtTable, KERNEL_CODE_SEGMENT, KERNEL_DATA_SEGMENT, TSS_SEGMENT};

use super::tables::{lgdt, DescriptorTablePointer};

/// 32-bit Task State Segment. Only `esp0`/`ss0` are consulted by this
/// kernel (ring 0 only, spec.md 1 "no user mode"); the rest of the
/// structure still has to exist because the CPU reads the whole 104-byte
/// layout on `ltr` and on every ring transition, of which there are none,
/// but the descriptor's limit still needs a matching backing object.
#[repr(C, packed)]
struct TaskStateSegment {
    prev_task_link: u32,
    esp0: u32,
    ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    iomap_base: u16,
}

impl TaskStateSegment {
    const fn new() -> TaskStateSegment {
        TaskStateSegment {
            prev_task_link: 0,
            esp0: 0,
            ss0: KERNEL_DATA_SEGMENT as u32,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            trap: 0,
            iomap_base: size_of::<TaskStateSegment>() as u16,
        }
    }
}

static mut GDT: GdtTable = GdtTable::uninitialized();
static mut TSS: TaskStateSegment = TaskStateSegment::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);

extern "C" {
    fn gdt_reload_segments(data_selector: u16, code_selector: u16);
}

global_asm!(
    r#"
.section .text
.global gdt_reload_segments
gdt_reload_segments:
    mov eax, [esp + 4]
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    mov ss, ax

    mov eax, [esp + 8]
    lea ecx, [1f]
    push eax
    push ecx
    retf
1:
    ret
"#
);

/// Builds the six descriptors, loads the GDT, reloads every segment
/// register (including `cs`, via the far-return trick above since `mov`
/// cannot target it), and loads the task register (spec.md 4.1).
///
/// # Safety
/// Must run once, early in boot, before any interrupt can fire (the IDT
/// is not loaded yet at the point `kernel_main` calls this).
pub unsafe fn init(kernel_stack_top: u32) {
    unsafe {
        TSS.esp0 = kernel_stack_top;

        let tss_base = core::ptr::addr_of!(TSS) as u32;
        let tss_limit = (size_of::<TaskStateSegment>() - 1) as u32;

        GDT = GdtTable::flat(tss_base, tss_limit);

        let ptr = DescriptorTablePointer::new(core::ptr::addr_of!(GDT) as u32, GdtTable::limit_bytes());
        lgdt(&ptr);
        gdt_reload_segments(KERNEL_DATA_SEGMENT, KERNEL_CODE_SEGMENT);
        super::tables::ltr(TSS_SEGMENT);

        INITIALIZED.store(true, Ordering::Release);
    }
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Updates `esp0` when the kernel's own stack pointer changes (never
/// happens today since there is exactly one ring-0 stack, but kept
/// symmetric with the teacher's TSS-update entry point for when a second
/// kernel thread is introduced).
pub fn set_kernel_stack(esp0: u32) {
    unsafe {
        TSS.esp0 = esp0;
    }
}


