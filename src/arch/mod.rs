//! Kernel-target architecture layer (x86, 32-bit protected mode).
//!
//! Everything in here touches real CPU state or MMIO and therefore cannot
//! be exercised on the host; the logic it drives (descriptor packing,
//! PIC/PIT programming, PS/2 decode, heap bookkeeping, ...) lives in the
//! always-compiled modules one level up in the crate and is what actually
//! carries the unit tests. This module is intentionally thin: it wires
//! those pure routines to real ports, real memory, and real CPU
//! instructions, the way the teacher's `arch/x86_64/*.rs` wires its
//! `x86_64`-crate-typed register access to `crates/kernel/src/{gdt,idt,pic,pit}.rs`-
//! equivalent logic (here folded into this crate's root modules instead).
//!
//! The 32-bit protected-mode target has no `x86_64`/`uart_16550`/`pic8259`
//! equivalent crate available (those three are hard-wired to
//! `target_arch = "x86_64"`), so the primitives below are hand-rolled
//! inline assembly — the same posture `asterism-labs-hadron`'s
//! `arch/x86_64/instructions/tables.rs` and `SQLpassion-osdev`'s
//! `arch/port.rs` take even on a target that *does* have `x86_64`
//! available, because a typed crate wrapper buys little over three lines
//! of `asm!` for a single instruction. See `DESIGN.md` for the dependency
//! note.

pub mod boot;
pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod interrupts;
pub mod pic;
pub mod pit;
pub mod port;
pub mod power;
pub mod serial;
pub mod tables;
