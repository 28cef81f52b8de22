//! Read-only FAT32 volume parsing (spec.md 6 "FAT32 on-disk layout").
//!
//! The ATA block driver is an out-of-scope external collaborator per
//! spec.md 1 ("the ATA and FAT32 drivers (treated as a block-device +
//! filesystem boundary)"); this module is the filesystem half of that
//! boundary and is deliberately generic over any `BlockDevice` so the
//! on-disk parsing can be unit-tested against an in-memory mock instead
//! of real hardware, the way `SQLpassion-osdev`'s `io/fat12.rs` factors
//! its sector reader out from the wire parsing it tests.

use alloc::string::String;
use alloc::vec::Vec;

pub const SECTOR_SIZE: usize = 512;
const DIR_ENTRY_SIZE: usize = 32;

const FAT32_EOF_MIN: u32 = 0x0FFF_FFF8;
const FAT32_BAD: u32 = 0x0FFF_FFF7;
const FAT32_FREE: u32 = 0;
const FAT32_ENTRY_MASK: u32 = 0x0FFF_FFFF;

pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_LONG_NAME: u8 = 0x0F;
pub const ATTR_VOLUME_ID: u8 = 0x08;

/// Minimal abstraction over the block I/O the ATA driver provides,
/// expressed at LBA28 sector granularity per spec.md 6.
pub trait BlockDevice {
    /// Reads one 512-byte sector at absolute LBA into `buf`. Returns
    /// `false` on any device error (spec.md 7 error taxonomy).
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct BootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub sectors_per_fat32: u32,
    pub root_cluster: u32,
    pub boot_signature: u8,
}

impl BootSector {
    /// Parses and validates the boot sector per spec.md 6: `fs_type ==
    /// "FAT32"` and `boot_signature == 0x29`.
    pub fn parse(sector: &[u8; SECTOR_SIZE]) -> Option<BootSector> {
        let bytes_per_sector = u16::from_le_bytes([sector[11], sector[12]]);
        let sectors_per_cluster = sector[13];
        let reserved_sectors = u16::from_le_bytes([sector[14], sector[15]]);
        let num_fats = sector[16];
        let sectors_per_fat32 =
            u32::from_le_bytes([sector[36], sector[37], sector[38], sector[39]]);
        let root_cluster = u32::from_le_bytes([sector[44], sector[45], sector[46], sector[47]]);
        let boot_signature = sector[66];
        let fs_type = &sector[82..90];

        if boot_signature != 0x29 {
            return None;
        }
        if &fs_type[0..5] != b"FAT32" {
            return None;
        }
        if bytes_per_sector as usize != SECTOR_SIZE {
            return None;
        }

        Some(BootSector {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            sectors_per_fat32,
            root_cluster,
            boot_signature,
        })
    }

    pub fn fat_start_lba(&self, partition_start: u32) -> u32 {
        partition_start + self.reserved_sectors as u32
    }

    pub fn data_start_lba(&self, partition_start: u32) -> u32 {
        self.fat_start_lba(partition_start) + self.num_fats as u32 * self.sectors_per_fat32
    }

    /// Clusters 0 and 1 are reserved (FAT32 uses them to mark free-cluster
    /// count and the media/EOF pair) and never name real data; callers
    /// that might see one — `read_file` on a zero-length entry, a root
    /// directory with no allocation — must check before converting.
    pub fn cluster_to_lba(&self, partition_start: u32, cluster: u32) -> u32 {
        self.data_start_lba(partition_start) + cluster.saturating_sub(2) * self.sectors_per_cluster as u32
    }

    pub fn cluster_size_bytes(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterEntry {
    Free,
    Bad,
    Next(u32),
    Eof,
}

fn classify_entry(raw: u32) -> ClusterEntry {
    let v = raw & FAT32_ENTRY_MASK;
    if v == FAT32_FREE {
        ClusterEntry::Free
    } else if v == FAT32_BAD {
        ClusterEntry::Bad
    } else if v >= FAT32_EOF_MIN {
        ClusterEntry::Eof
    } else {
        ClusterEntry::Next(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attributes: u8,
    pub cluster: u32,
    pub size: u32,
}

impl DirEntry {
    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }
}

/// Parses one 32-byte 8.3 directory entry per spec.md 6. Returns `None`
/// for a free slot (`0x00`/`0xE5` first byte), a long-name entry, or the
/// volume-id entry — none of which name a file or directory.
pub fn parse_dir_entry(raw: &[u8]) -> Option<DirEntry> {
    debug_assert!(raw.len() >= DIR_ENTRY_SIZE);
    let first = raw[0];
    if first == 0x00 || first == 0xE5 {
        return None;
    }
    let attributes = raw[11];
    if attributes == ATTR_LONG_NAME || attributes & ATTR_VOLUME_ID != 0 {
        return None;
    }

    let name_raw = &raw[0..8];
    let ext_raw = &raw[8..11];
    let name = decode_83_name(name_raw, ext_raw);

    let cluster_high = u16::from_le_bytes([raw[20], raw[21]]) as u32;
    let cluster_low = u16::from_le_bytes([raw[26], raw[27]]) as u32;
    let cluster = (cluster_high << 16) | cluster_low;
    let size = u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]);

    Some(DirEntry {
        name,
        attributes,
        cluster,
        size,
    })
}

fn decode_83_name(name: &[u8], ext: &[u8]) -> String {
    let mut s = String::new();
    for &b in name {
        if b == b' ' {
            break;
        }
        s.push(b as char);
    }
    let ext_trimmed: Vec<u8> = ext.iter().copied().take_while(|&b| b != b' ').collect();
    if !ext_trimmed.is_empty() {
        s.push('.');
        for b in ext_trimmed {
            s.push(b as char);
        }
    }
    s
}

/// A mounted, read-only FAT32 volume: the boot sector plus the partition
/// start LBA it was read relative to.
pub struct Volume {
    pub boot: BootSector,
    pub partition_start: u32,
}

impl Volume {
    pub fn mount(dev: &mut dyn BlockDevice, partition_start: u32) -> Option<Volume> {
        let mut sector = [0u8; SECTOR_SIZE];
        if !dev.read_sector(partition_start, &mut sector) {
            return None;
        }
        let boot = BootSector::parse(&sector)?;
        Some(Volume {
            boot,
            partition_start,
        })
    }

    fn read_fat_entry(&self, dev: &mut dyn BlockDevice, cluster: u32) -> Option<ClusterEntry> {
        let fat_offset = cluster as u64 * 4;
        let fat_sector = self.boot.fat_start_lba(self.partition_start) as u64
            + fat_offset / SECTOR_SIZE as u64;
        let entry_offset = (fat_offset % SECTOR_SIZE as u64) as usize;
        let mut sector = [0u8; SECTOR_SIZE];
        if !dev.read_sector(fat_sector as u32, &mut sector) {
            return None;
        }
        let raw = u32::from_le_bytes([
            sector[entry_offset],
            sector[entry_offset + 1],
            sector[entry_offset + 2],
            sector[entry_offset + 3],
        ]);
        Some(classify_entry(raw))
    }

    /// Follows the cluster chain starting at `start_cluster`, returning
    /// the ordered list of cluster numbers. Stops at EOF or a bad/free
    /// entry (treated as a truncated chain).
    pub fn cluster_chain(&self, dev: &mut dyn BlockDevice, start_cluster: u32) -> Vec<u32> {
        let mut chain = Vec::new();
        if start_cluster < 2 {
            return chain;
        }
        let mut cluster = start_cluster;
        loop {
            chain.push(cluster);
            match self.read_fat_entry(dev, cluster) {
                Some(ClusterEntry::Next(next)) => cluster = next,
                _ => break,
            }
            if chain.len() > 1_000_000 {
                // Runaway chain guard; a real volume never gets this long.
                break;
            }
        }
        chain
    }

    /// Lists the directory entries in the cluster chain rooted at
    /// `start_cluster` (pass `boot.root_cluster` for the root directory).
    pub fn list_directory(&self, dev: &mut dyn BlockDevice, start_cluster: u32) -> Vec<DirEntry> {
        let mut entries = Vec::new();
        let chain = self.cluster_chain(dev, start_cluster);
        let sectors_per_cluster = self.boot.sectors_per_cluster as u32;
        let mut sector_buf = [0u8; SECTOR_SIZE];
        'outer: for cluster in chain {
            let base_lba = self.boot.cluster_to_lba(self.partition_start, cluster);
            for s in 0..sectors_per_cluster {
                if !dev.read_sector(base_lba + s, &mut sector_buf) {
                    break 'outer;
                }
                for chunk in sector_buf.chunks_exact(DIR_ENTRY_SIZE) {
                    if chunk[0] == 0x00 {
                        break 'outer;
                    }
                    if let Some(entry) = parse_dir_entry(chunk) {
                        entries.push(entry);
                    }
                }
            }
        }
        entries
    }

    /// Reads a whole file's contents given its first cluster and size.
    pub fn read_file(&self, dev: &mut dyn BlockDevice, entry: &DirEntry) -> Vec<u8> {
        let chain = self.cluster_chain(dev, entry.cluster);
        let mut out = Vec::with_capacity(entry.size as usize);
        let sectors_per_cluster = self.boot.sectors_per_cluster as u32;
        let mut sector_buf = [0u8; SECTOR_SIZE];
        for cluster in chain {
            if out.len() >= entry.size as usize {
                break;
            }
            let base_lba = self.boot.cluster_to_lba(self.partition_start, cluster);
            for s in 0..sectors_per_cluster {
                if out.len() >= entry.size as usize {
                    break;
                }
                if !dev.read_sector(base_lba + s, &mut sector_buf) {
                    return out;
                }
                let remaining = entry.size as usize - out.len();
                let take = remaining.min(SECTOR_SIZE);
                out.extend_from_slice(&sector_buf[..take]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;

    struct MockDisk {
        sectors: BTreeMap<u32, [u8; SECTOR_SIZE]>,
    }

    impl MockDisk {
        fn new() -> MockDisk {
            MockDisk {
                sectors: BTreeMap::new(),
            }
        }

        fn put(&mut self, lba: u32, data: &[u8]) {
            let mut buf = [0u8; SECTOR_SIZE];
            buf[..data.len()].copy_from_slice(data);
            self.sectors.insert(lba, buf);
        }
    }

    impl BlockDevice for MockDisk {
        fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool {
            match self.sectors.get(&lba) {
                Some(s) => {
                    *buf = *s;
                    true
                }
                None => {
                    *buf = [0u8; SECTOR_SIZE];
                    true
                }
            }
        }
    }

    fn make_boot_sector(
        sectors_per_cluster: u8,
        reserved_sectors: u16,
        num_fats: u8,
        sectors_per_fat32: u32,
        root_cluster: u32,
    ) -> [u8; SECTOR_SIZE] {
        let mut s = [0u8; SECTOR_SIZE];
        s[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        s[13] = sectors_per_cluster;
        s[14..16].copy_from_slice(&reserved_sectors.to_le_bytes());
        s[16] = num_fats;
        s[36..40].copy_from_slice(&sectors_per_fat32.to_le_bytes());
        s[44..48].copy_from_slice(&root_cluster.to_le_bytes());
        s[66] = 0x29;
        s[82..87].copy_from_slice(b"FAT32");
        s
    }

    #[test]
    fn rejects_non_fat32_boot_sector() {
        let mut s = make_boot_sector(1, 32, 2, 100, 2);
        s[82..87].copy_from_slice(b"FAT16");
        assert!(BootSector::parse(&s).is_none());
    }

    #[test]
    fn parses_valid_boot_sector() {
        let s = make_boot_sector(8, 32, 2, 1000, 2);
        let boot = BootSector::parse(&s).unwrap();
        assert_eq!(boot.sectors_per_cluster, 8);
        assert_eq!(boot.root_cluster, 2);
        assert_eq!(boot.fat_start_lba(0), 32);
        assert_eq!(boot.data_start_lba(0), 32 + 2 * 1000);
        assert_eq!(boot.cluster_to_lba(0, 2), 32 + 2000);
    }

    #[test]
    fn decodes_83_name_with_extension() {
        let mut raw = [0x20u8; DIR_ENTRY_SIZE];
        raw[0..8].copy_from_slice(b"README  ");
        raw[8..11].copy_from_slice(b"TXT");
        raw[11] = 0; // attributes: normal file
        let entry = parse_dir_entry(&raw).unwrap();
        assert_eq!(entry.name, "README.TXT");
        assert!(!entry.is_directory());
    }

    #[test]
    fn skips_free_and_long_name_entries() {
        let mut free = [0x20u8; DIR_ENTRY_SIZE];
        free[0] = 0xE5;
        assert!(parse_dir_entry(&free).is_none());

        let mut long = [0x20u8; DIR_ENTRY_SIZE];
        long[11] = ATTR_LONG_NAME;
        assert!(parse_dir_entry(&long).is_none());
    }

    #[test]
    fn cluster_chain_follows_fat_to_eof() {
        let partition_start = 0u32;
        let boot_raw = make_boot_sector(1, 2, 1, 4, 2);
        let mut disk = MockDisk::new();
        disk.put(partition_start, &boot_raw);

        // FAT sector at lba 2 (reserved_sectors=2): entries 0,1 reserved;
        // cluster 2 -> 3, cluster 3 -> EOF.
        let mut fat = [0u8; SECTOR_SIZE];
        fat[2 * 4..2 * 4 + 4].copy_from_slice(&3u32.to_le_bytes());
        fat[3 * 4..3 * 4 + 4].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
        disk.put(2, &fat);

        let vol = Volume::mount(&mut disk, partition_start).unwrap();
        let chain = vol.cluster_chain(&mut disk, 2);
        assert_eq!(chain, alloc::vec![2, 3]);
    }

    #[test]
    fn zero_length_file_reads_empty_without_underflow() {
        let partition_start = 0u32;
        let boot_raw = make_boot_sector(1, 2, 1, 4, 2);
        let mut disk = MockDisk::new();
        disk.put(partition_start, &boot_raw);

        let vol = Volume::mount(&mut disk, partition_start).unwrap();
        let entry = DirEntry {
            name: String::from("EMPTY.TXT"),
            attributes: 0,
            cluster: 0,
            size: 0,
        };
        assert_eq!(vol.cluster_chain(&mut disk, entry.cluster), alloc::vec![]);
        assert_eq!(vol.read_file(&mut disk, &entry), alloc::vec![]);
    }

    #[test]
    fn lists_directory_entries_in_root_cluster() {
        let partition_start = 0u32;
        let boot_raw = make_boot_sector(1, 2, 1, 4, 2);
        let mut disk = MockDisk::new();
        disk.put(partition_start, &boot_raw);

        let mut fat = [0u8; SECTOR_SIZE];
        fat[2 * 4..2 * 4 + 4].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
        disk.put(2, &fat);

        let vol = Volume::mount(&mut disk, partition_start).unwrap();
        let data_lba = vol.boot.cluster_to_lba(partition_start, 2);
        let mut dir_sector = [0u8; SECTOR_SIZE];
        dir_sector[0..8].copy_from_slice(b"HELLO   ");
        dir_sector[8..11].copy_from_slice(b"TXT");
        dir_sector[11] = 0;
        dir_sector[28..32].copy_from_slice(&5u32.to_le_bytes());
        disk.put(data_lba, &dir_sector);

        let entries = vol.list_directory(&mut disk, 2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "HELLO.TXT");
        assert_eq!(entries[0].size, 5);
    }
}
