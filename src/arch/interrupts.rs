//! Interrupt dispatch: the two functions every assembly stub in
//! `arch::idt` calls into (spec.md 4.1 "dispatcher picks a path: an
//! unhandled exception halts the CPU, an IRQ looks up the handler table,
//! calls it if present, and always sends an EOI").

use spin::Mutex;

use crate::idt::{vector_to_irq, HandlerFn, HandlerTable};
use crate::klog_error;

static HANDLERS: Mutex<HandlerTable> = Mutex::new(HandlerTable::new());

/// Registers `handler` for `vector`, returning whatever was previously
/// installed there (spec.md 4.1 `install_handler`).
pub fn install_handler(vector: u8, handler: HandlerFn) -> Option<HandlerFn> {
    HANDLERS.lock().install(vector, handler)
}

pub fn is_installed(vector: u8) -> bool {
    HANDLERS.lock().is_installed(vector)
}

/// Called by every exception stub (vectors 0..32). There is no recovery
/// path for a CPU exception in this kernel, so this logs the fault and
/// halts rather than returning (spec.md 4.1 "halts the CPU with
/// interrupts masked").
///
/// # Safety
/// Must only be reached from an exception stub with a matching register
/// frame already pushed.
#[no_mangle]
pub unsafe extern "C" fn exception_dispatch(vector: u32, error_code: u32) -> ! {
    klog_error!(
        "unhandled CPU exception vector={} error_code={:#010x}",
        vector,
        error_code
    );
    super::cpu::halt_loop()
}

/// Called by every IRQ stub (vectors 32..48). Looks up and runs the
/// installed handler, if any, then always sends the PIC its EOI so the
/// line is not left masked (spec.md 4.2).
///
/// # Safety
/// Must only be reached from an IRQ stub for a vector in 32..48.
#[no_mangle]
pub unsafe extern "C" fn irq_dispatch(vector: u32) {
    let vector = vector as u8;
    if let Some(irq) = vector_to_irq(vector) {
        if let Some(handler) = HANDLERS.lock().get(vector) {
            handler(vector, 0);
        }
        let mut io = super::port::Io::new();
        crate::pic::send_eoi(&mut io, irq);
    }
}
