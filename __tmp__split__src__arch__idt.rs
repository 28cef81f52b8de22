//! Builds and loads the 256-entry IDT, and generates the raw assembly
//! stubs every vector needs (spec.md 4.1, 4.2).
//!
//! Each stub saves the general-purpose registers, calls into
//! `arch::interrupts::{exception_dispatch, irq_dispatch}`, and either
//! halts forever (exceptions never return here, matching the policy in
//! `crate::idt`'s doc comment) or restores the registers and `iret`s
//! (IRQs). This is the same shape `SQLpassion-osdev`'s
//! `arch/interrupts_stubs.rs` uses for its 64-bit stubs; ported to 32-bit
//! general-purpose registers and `iretd` instead of `iretq`.

use core::arch::global_asm;
use core::mem::size_of;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::gdt::KERNEL_CODE_SEGMENT;
use crate::idt::IdtTable;

use super::tables::{lidt, DescriptorTablePointer};

static mut IDT: IdtTable = IdtTable::empty();
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Exception vectors the CPU pushes a hardware error code for.
const VECTORS_WITH_ERROR_CODE: [u8; 7] = [8, 10, 11, 12, 13, 14, 17];

fn has_error_code(vector: u8) -> bool {
    VECTORS_WITH_ERROR_CODE.contains(&vector)
}

macro_rules! exception_stub_no_error {
    ($name:ident, $vector:literal) => {
        global_asm!(
            concat!(
                ".section .text\n",
                ".global ", stringify!($name), "\n",
                stringify!($name), ":\n",
                "    cli\n",
                "    push edi\n",
                "    push esi\n",
                "    push ebp\n",
                "    push ebx\n",
                "    push edx\n",
                "    push ecx\n",
                "    push eax\n",
                "    push 0\n",
                "    push ", stringify!($vector), "\n",
                "    call exception_dispatch\n",
                "2:\n",
                "    cli\n",
                "    hlt\n",
                "    jmp 2b\n",
            )
        );
    };
}

macro_rules! exception_stub_with_error {
    ($name:ident, $vector:literal) => {
        global_asm!(
            concat!(
                ".section .text\n",
                ".global ", stringify!($name), "\n",
                stringify!($name), ":\n",
                "    cli\n",
                "    push edi\n",
                "    push esi\n",
                "    push ebp\n",
                "    push ebx\n",
                "    push edx\n",
                "    push ecx\n",
                "    push eax\n",
                "    push dword ptr [esp + 28]\n",
                "    push ", stringify!($vector), "\n",
                "    call exception_dispatch\n",
                "2:\n",
                "    cli\n",
                "    hlt\n",
                "    jmp 2b\n",
            )
        );
    };
}

macro_rules! irq_stub {
    ($name:ident, $vector:literal) => {
        global_asm!(
            concat!(
                ".section .text\n",
                ".global ", stringify!($name), "\n",
                stringify!($name), ":\n",
                "    push edi\n",
                "    push esi\n",
                "    push ebp\n",
                "    push ebx\n",
                "    push edx\n",
                "    push ecx\n",
                "    push eax\n",
                "    push ", stringify!($vector), "\n",
                "    call irq_dispatch\n",
                "    add esp, 4\n",
                "    pop eax\n",
                "    pop ecx\n",
                "    pop edx\n",
                "    pop ebx\n",
                "    pop ebp\n",
                "    pop esi\n",
                "    pop edi\n",
                "    iretd\n",
            )
        );
    };
}

exception_stub_no_error!(isr0_divide_error, 0);
exception_stub_no_error!(isr1_debug, 1);
exception_stub_no_error!(isr2_nmi, 2);
exception_stub_no_error!(isr3_breakpoint, 3);
exception_stub_no_error!(isr4_overflow, 4);
exception_stub_no_error!(isr5_bound_range, 5);
exception_stub_no_error!(isr6_invalid_opcode, 6);
exception_stub_no_error!(isr7_device_not_available, 7);
exception_stub_with_error!(isr8_double_fault, 8);
exception_stub_no_error!(isr9_coprocessor_segment_overrun, 9);
exception_stub_with_error!(isr10_invalid_tss, 10);
exception_stub_with_error!(isr11_segment_not_present, 11);
exception_stub_with_error!(isr12_stack_fault, 12);
exception_stub_with_error!(isr13_general_protection, 13);
exception_stub_with_error!(isr14_page_fault, 14);
exception_stub_no_error!(isr15_reserved, 15);
exception_stub_no_error!(isr16_x87_fp, 16);
exception_stub_with_error!(isr17_alignment_check, 17);
exception_stub_no_error!(isr18_machine_check, 18);
exception_stub_no_error!(isr19_simd_fp, 19);
exception_stub_no_error!(isr20_virtualization, 20);
exception_stub_no_error!(isr21_reserved, 21);
exception_stub_no_error!(isr22_reserved, 22);
exception_stub_no_error!(isr23_reserved, 23);
exception_stub_no_error!(isr24_reserved, 24);
exception_stub_no_error!(isr25_reserved, 25);
exception_stub_no_error!(isr26_reserved, 26);
exception_stub_no_error!(isr27_reserved, 27);
exception_stub_no_error!(isr28_reserved, 28);
exception_stub_no_error!(isr29_reserved, 29);
exception_stub_no_error!(isr30_security, 30);
exception_stub_no_error!(isr31_reserved, 31);

irq_stub!(irq0_pit_timer, 32);
irq_stub!(irq1_keyboard, 33);
irq_stub!(irq2_pic_cascade, 34);
irq_stub!(irq3_com2, 35);
irq_stub!(irq4_com1, 36);
irq_stub!(irq5_free, 37);
irq_stub!(irq6_floppy, 38);
irq_stub!(irq7_spurious_master, 39);
irq_stub!(irq8_rtc, 40);
irq_stub!(irq9_free, 41);
irq_stub!(irq10_free, 42);
irq_stub!(irq11_free, 43);
irq_stub!(irq12_ps2_mouse, 44);
irq_stub!(irq13_fpu, 45);
irq_stub!(irq14_primary_ata, 46);
irq_stub!(irq15_secondary_ata, 47);

extern "C" {
    fn isr0_divide_error();
    fn isr1_debug();
    fn isr2_nmi();
    fn isr3_breakpoint();
    fn isr4_overflow();
    fn isr5_bound_range();
    fn isr6_invalid_opcode();
    fn isr7_device_not_available();
    fn isr8_double_fault();
    fn isr9_coprocessor_segment_overrun();
    fn isr10_invalid_tss();
    fn isr11_segment_not_present();
    fn isr12_stack_fault();
    fn isr13_general_protection();
    fn isr14_page_fault();
    fn isr15_reserved();
    fn isr16_x87_fp();
    fn isr17_alignment_check();
    fn isr18_machine_check();
    fn isr19_simd_fp();
    fn isr20_virtualization();
    fn isr21_reserved();
    fn isr22_reserved();
    fn isr23_reserved();
    fn isr24_reserved();
    fn isr25_reserved();
    fn isr26_reserved();
    fn isr27_reserved();
    fn isr28_reserved();
    fn isr29_reserved();
    fn isr30_security();
    fn isr31_reserved();

    fn irq0_pit_timer();
    fn irq1_keyboard();
    fn irq2_pic_cascade();
    fn irq3_com2();
    fn irq4_com1();
    fn irq5_free();
    fn irq6_floppy();
    fn irq7_spurious_master();
    fn irq8_rtc();
    fn irq9_free();
    fn irq10_free();
    fn irq11_free();
    fn irq12_ps2_mouse();
    fn irq13_fpu();
    fn irq14_primary_ata();
    fn irq15_secondary_ata();
}

const EXCEPTION_STUBS: [unsafe extern "C" fn(); 32] = [
    isr0_divide_error,
    isr1_debug,
    isr2_nmi,
    isr3_breakpoint,
    isr4_overflow,
    isr5_bound_range,
    isr6_invalid_opcode,
    isr7_device_not_available,
    isr8_double_fault,
    isr9_coprocessor_segment_overrun,
    isr10_invalid_tss,
    isr11_segment_not_present,
    isr12_stack_fault,
    isr13_general_protection,
    isr14_page_fault,
    isr15_reserved,
    isr16_x87_fp,
    isr17_alignment_check,
    isr18_machine_check,
    isr19_simd_fp,
    isr20_virtualization,
    isr21_reserved,
    isr22_reserved,
    isr23_reserved,
    isr24_reserved,
    isr25_reserved,
    isr26_reserved,
    isr27_reserved,
    isr28_reserved,
    isr29_reserved,
    isr30_security,
    isr31_reserved,
];

const IRQ_STUBS: [unsafe extern "C" fn(); 16] = [
    irq0_pit_timer,
    irq1_keyboard,
    irq2_pic_cascade,
    irq3_com2,
    irq4_com1,
    irq5_free,
    irq6_floppy,
    irq7_spurious_master,
    irq8_rtc,
    irq9_free,
    irq10_free,
    irq11_free,
    irq12_ps2_mouse,
    irq13_fpu,
    irq14_primary_ata,
    irq15_secondary_ata,
];

/// Builds all 48 live gates and loads the table (spec.md 4.1 "256 gates,
/// the first 32 for exceptions, 32..48 for the remapped IRQs").
///
/// # Safety
/// Must run after `arch::gdt::init` (gates reference `KERNEL_CODE_SEGMENT`)
/// and before interrupts are enabled.
pub unsafe fn init() {
    unsafe {
        for (vector, stub) in EXCEPTION_STUBS.iter().enumerate() {
            IDT.set_gate(vector as u8, *stub as usize as u32, KERNEL_CODE_SEGMENT, 0);
        }
        for (irq, stub) in IRQ_STUBS.iter().enumerate() {
            let vector = crate::idt::irq_to_vector(irq as u8);
            IDT.set_gate(vector, *stub as usize as u32, KERNEL_CODE_SEGMENT, 0);
        }

        let ptr = DescriptorTablePointer::new(core::ptr::addr_of!(IDT) as u32, IdtTable::limit_bytes());
        lidt(&ptr);
        INITIALIZED.store(true, Ordering::Release);
    }
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

#[allow(dead_code)]
fn assert_error_code_vectors_match_spec() {
    debug_assert!(has_error_code(8) && has_error_code(14) && !has_error_code(0));
    let _ = size_of::<u32>();
}


