//! Boot-time configuration, read from the Multiboot command line when one
//! is present. Grounded in the teacher's `init/` phase scaffolding
//! (`crates/kernel/src/init.rs`-style ordered bring-up), simplified to the
//! phases this kernel actually has: logging, timer rate, and an optional
//! headless-boot switch used to skip USB/VESA bring-up during testing.

use crate::multiboot::BootInfo;

/// Default PIT frequency per spec.md 4.2.
pub const DEFAULT_PIT_HZ: u32 = 100;

/// Default serial log level per `SPEC_FULL.md` "Configuration".
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_token(tok: &str) -> Option<LogLevel> {
        match tok {
            "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    pub log_level: LogLevel,
    pub pit_hz: u32,
    pub headless: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            log_level: DEFAULT_LOG_LEVEL,
            pit_hz: DEFAULT_PIT_HZ,
            headless: false,
        }
    }
}

impl BootConfig {
    /// Parses `key=value` / bare-flag tokens out of the Multiboot command
    /// line. Unrecognized tokens are ignored; absent flags keep defaults,
    /// matching spec.md 6's "any absent flag triggers a conservative
    /// default".
    pub fn from_boot_info(info: &BootInfo) -> BootConfig {
        let mut cfg = BootConfig::default();
        let Some(cmdline) = info.command_line.as_deref() else {
            return cfg;
        };
        for tok in cmdline.split_whitespace() {
            if let Some(level) = tok.strip_prefix("log=") {
                if let Some(l) = LogLevel::from_token(level) {
                    cfg.log_level = l;
                }
            } else if let Some(hz) = tok.strip_prefix("pit=") {
                if let Ok(v) = hz.parse::<u32>() {
                    if v > 0 && v <= 10_000 {
                        cfg.pit_hz = v;
                    }
                }
            } else if tok == "headless" {
                cfg.headless = true;
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_with_cmdline(s: &str) -> BootInfo {
        let mut info = BootInfo::default();
        info.command_line = Some(s.into());
        info
    }

    #[test]
    fn defaults_when_no_cmdline() {
        let cfg = BootConfig::from_boot_info(&BootInfo::default());
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert_eq!(cfg.pit_hz, 100);
        assert!(!cfg.headless);
    }

    #[test]
    fn parses_known_tokens() {
        let info = info_with_cmdline("log=debug pit=1000 headless");
        let cfg = BootConfig::from_boot_info(&info);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.pit_hz, 1000);
        assert!(cfg.headless);
    }

    #[test]
    fn ignores_garbage_tokens() {
        let info = info_with_cmdline("quiet=yes pit=0 pit=99999 log=verbose");
        let cfg = BootConfig::from_boot_info(&info);
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert_eq!(cfg.pit_hz, 100);
    }
}
