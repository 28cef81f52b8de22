//! Live ATA (LBA28 PIO) drive, and the bridge between its
//! [`crate::ata::BlockDevice`] seam and the [`crate::fat32::BlockDevice`]
//! seam `fat32::Volume` actually programs against (spec.md 1 "the ATA and
//! FAT32 drivers (treated as a block-device + filesystem boundary)").
//!
//! The two traits exist because `ata`'s is the honest hardware contract
//! (a read can fail: timeout, no device, bad status) while `fat32`'s
//! collapses that to a bool the way the original firmware's block-read
//! callback did. [`AtaDrive`] implements both: FAT32 calls the infallible
//! one and gets `false` back for anything `ata::read_sectors` would have
//! returned `Err` for.

use crate::arch::port::Io;
use crate::ata::{self, AtaError, SECTOR_SIZE as ATA_SECTOR_SIZE};
use crate::fat32;

pub struct AtaDrive {
    io_base: u16,
    control_base: u16,
    slave: bool,
}

impl AtaDrive {
    pub const fn primary_master() -> AtaDrive {
        AtaDrive {
            io_base: ata::PRIMARY_IO_BASE,
            control_base: ata::PRIMARY_CONTROL,
            slave: false,
        }
    }

    pub const fn secondary_master() -> AtaDrive {
        AtaDrive {
            io_base: ata::SECONDARY_IO_BASE,
            control_base: ata::SECONDARY_CONTROL,
            slave: false,
        }
    }

    /// Reads `count` consecutive sectors starting at `lba`, the fallible
    /// ATA-layer contract (spec.md 6 "ATA (LBA28 PIO)").
    pub fn read_sectors(&mut self, lba: u32, count: u8, out: &mut [u8]) -> Result<(), AtaError> {
        let mut io = Io::new();
        let _ = self.control_base;
        ata::read_sectors(&mut io, self.io_base, self.slave, lba, count, out)
    }
}

impl ata::BlockDevice for AtaDrive {
    fn read_sector(&mut self, lba: u32, out: &mut [u8; ATA_SECTOR_SIZE]) -> Result<(), AtaError> {
        self.read_sectors(lba, 1, out)
    }
}

impl fat32::BlockDevice for AtaDrive {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; fat32::SECTOR_SIZE]) -> bool {
        self.read_sectors(lba, 1, buf).is_ok()
    }
}
