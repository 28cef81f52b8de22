//! Serial logging facade (`SPEC_FULL.md` "Logging"). Five levels, a
//! global atomic gate set from [`crate::config::BootConfig`], and
//! `module: message [key=value ...]` formatting written through
//! [`crate::arch::serial::_print`] -- the same sink `arch::serial`'s own
//! `fmt::Write` impl feeds, just gated by level here instead of always
//! firing.
//!
//! Modeled on the teacher's `crates/kernel/src/log.rs` level-gate shape,
//! minus its ring-buffer log history: this kernel has one output (the
//! serial port) and nothing downstream ever replays past log lines.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::config::LogLevel;

static LEVEL_GATE: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Sets the level gate from parsed boot configuration. Called once by
/// `kernel_main` after `BootConfig::from_boot_info` runs.
pub fn set_level(level: LogLevel) {
    LEVEL_GATE.store(level as u8, Ordering::Release);
}

pub fn level() -> LogLevel {
    match LEVEL_GATE.load(Ordering::Acquire) {
        0 => LogLevel::Error,
        1 => LogLevel::Warn,
        2 => LogLevel::Info,
        3 => LogLevel::Debug,
        _ => LogLevel::Trace,
    }
}

/// `true` if a message at `level` should be emitted under the current gate.
pub fn enabled(level: LogLevel) -> bool {
    (level as u8) <= LEVEL_GATE.load(Ordering::Acquire)
}

#[doc(hidden)]
pub fn _log(level: LogLevel, module: &str, args: core::fmt::Arguments) {
    if !enabled(level) {
        return;
    }
    crate::arch::serial::_print(format_args!("[{}] {}: {}\n", level.as_str(), module, args));
}

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => {
        $crate::logging::_log($crate::config::LogLevel::Error, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => {
        $crate::logging::_log($crate::config::LogLevel::Warn, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => {
        $crate::logging::_log($crate::config::LogLevel::Info, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => {
        $crate::logging::_log($crate::config::LogLevel::Debug, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_trace {
    ($($arg:tt)*) => {
        $crate::logging::_log($crate::config::LogLevel::Trace, module_path!(), format_args!($($arg)*))
    };
}
