//! Crate-wide error classification for init-sequence and driver-setup
//! boundaries (see `SPEC_FULL.md` "Error handling"). Hot paths inside the
//! heap, IRQ handlers, and the render loop keep spec.md's sentinel-return
//! discipline (null pointer / negative int / bool) and do not use this type.

use core::fmt;

/// Coarse error classification surfaced by subsystem init and device setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The heap could not satisfy an allocation request.
    OutOfMemory,
    /// No Multiboot memory region qualified for the heap per spec.md 4.5.
    NoHeapRegion,
    /// A Multiboot info structure did not carry a magic value this kernel
    /// recognizes (0x2BADB002 or 0x36D76289).
    BadMultibootMagic,
    /// A device's reset/init sequence did not complete inside its timeout
    /// budget; the device or controller is left disabled.
    DeviceTimeout,
    /// A USB control or interrupt transfer failed or timed out.
    TransferFailed,
    /// A WM operation referenced a handle the registry does not recognize.
    InvalidHandle,
    /// The framebuffer tag was absent or described an unusable mode.
    NoFramebuffer,
    /// A FAT32 volume did not pass the boot-sector sanity checks.
    NotFat32,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KernelError::OutOfMemory => "out of memory",
            KernelError::NoHeapRegion => "no suitable heap region in memory map",
            KernelError::BadMultibootMagic => "unrecognized multiboot magic",
            KernelError::DeviceTimeout => "device did not respond within timeout",
            KernelError::TransferFailed => "usb transfer failed or timed out",
            KernelError::InvalidHandle => "stale or invalid window handle",
            KernelError::NoFramebuffer => "no usable framebuffer tag",
            KernelError::NotFat32 => "volume is not a valid fat32 filesystem",
        };
        f.write_str(s)
    }
}

pub type KernelResult<T> = Result<T, KernelError>;


