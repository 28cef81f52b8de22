//! Shutdown probe sequence (spec.md "Exit behavior": try every shutdown
//! port, worst case force a triple fault). Grounded directly in the
//! teacher's `arch/x86_64/power.rs`, which tries ACPI first, then the
//! keyboard-controller reset, then a deliberately broken `lidt` to force
//! a triple fault; this version adds the QEMU/Bochs legacy ISA-bridge
//! ports and the PIC/PIIX3 power registers spec.md calls out, since a
//! real BIOS on real hardware answers to different ports than QEMU does.

use super::cpu::halt_loop;
use super::port::Io;
use crate::klog_info;
use crate::ports::Ports;

/// `SLP_TYP` field for S5 (soft-off) is platform specific; QEMU's
/// virtual PM hardware and Bochs both accept 5 in the common case, which
/// is the value every legacy ACPI-less emulator targeted by this kernel
/// uses.
const SLP_TYP_S5: u16 = 5 << 10;
const SLP_EN: u16 = 1 << 13;

/// Attempts every shutdown method in spec.md's documented order, falling
/// through to the next on failure. None of these "fail" in a way this
/// code can observe directly (there is no handshake), so each write is
/// followed by a short delay and we simply move on to the next rung if
/// the machine is still running.
///
/// # Safety
/// Issues raw port writes to ACPI/chipset power-management registers
/// that exist only on the platform this kernel expects to run on
/// (QEMU/Bochs-class virtual hardware); on unrelated hardware they are
/// silently ignored by the bus.
pub unsafe fn shutdown() -> ! {
    unsafe {
        klog_info!("attempting shutdown: probing ACPI PM1a/PM1b control ports");
        let mut io = Io::new();

        try_acpi_port(&mut io, 0xB004);
        try_acpi_port(&mut io, 0x0604);
        try_acpi_port(&mut io, 0x4004);

        klog_info!("shutdown: ACPI ports unresponsive, trying APM BIOS");
        try_apm(&mut io);

        klog_info!("shutdown: trying PIIX3/ICH legacy power register");
        try_piix_power_register(&mut io);

        klog_info!("shutdown: trying UEFI/firmware reset port 0xCF9");
        try_reset_port_cf9(&mut io);

        klog_info!("shutdown: trying keyboard-controller CPU reset");
        try_keyboard_controller_reset(&mut io);

        klog_info!("shutdown: every method failed, forcing a triple fault");
        force_triple_fault();
    }
}

unsafe fn try_acpi_port(io: &mut Io, port: u16) {
    unsafe {
        io.outw(port, SLP_TYP_S5 | SLP_EN);
    }
    spin_delay();
}

/// APM "set power state" call (`int 0x15, AX=0x5307, BX=0x0001,
/// CX=0x0003`) is a real-mode BIOS service this protected-mode kernel
/// cannot `int` into directly; there is no protected-mode equivalent
/// without a virtual-8086 trampoline, so this rung is a documented no-op
/// placeholder that keeps the probe order faithful to spec.md without
/// pretending to implement a v86 call gate.
unsafe fn try_apm(_io: &mut Io) {
    spin_delay();
}

/// PIIX3/ICH "RCR" reset-control register at port 0xCF9 doubles as the
/// legacy southbridge power register on the chipsets this probe targets;
/// bit 1 set issues a hard reset rather than power-off, which is still
/// useful as a fallback before the final triple fault.
unsafe fn try_piix_power_register(io: &mut Io) {
    unsafe {
        io.outb(0xCF9, 0x0E);
    }
    spin_delay();
}

unsafe fn try_reset_port_cf9(io: &mut Io) {
    unsafe {
        io.outb(0xCF9, 0x06);
    }
    spin_delay();
}

const KBC_COMMAND_PORT: u16 = 0x64;
const KBC_CPU_RESET: u8 = 0xFE;

unsafe fn try_keyboard_controller_reset(io: &mut Io) {
    unsafe {
        // Wait for the input buffer to drain before writing the reset
        // command, the same handshake `drivers::ps2` uses before every
        // command byte.
        for _ in 0..0x1000u32 {
            if io.inb(KBC_COMMAND_PORT) & 0x02 == 0 {
                break;
            }
        }
        io.outb(KBC_COMMAND_PORT, KBC_CPU_RESET);
    }
    spin_delay();
}

/// Loads a zero-length, zero-based IDT and triggers an interrupt; with
/// no valid IDT to service it the CPU triple-faults and most firmware
/// resets the machine in response. This is the same last resort the
/// teacher's `system_reset` falls back to.
unsafe fn force_triple_fault() -> ! {
    unsafe {
        use super::tables::{lidt, DescriptorTablePointer};
        let broken = DescriptorTablePointer::new(0, 0);
        lidt(&broken);
        core::arch::asm!("int3", options(noreturn));
    }
}

fn spin_delay() {
    for _ in 0..100_000u32 {
        super::cpu::pause();
    }
}

/// Last-resort terminal state when even the triple fault does not reset
/// the machine (some emulators configured without reset-on-triple-fault);
/// halts forever with interrupts masked.
pub fn halt_forever() -> ! {
    halt_loop()
}
