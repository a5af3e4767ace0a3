//! Partition layout: computed once at format time, persisted in the
//! superblock record, and reloaded on every subsequent mount. Region
//! order is fixed: superblock, inode bitmap, data bitmap, inode table,
//! data area. All persisted offsets are in block units.

use log::debug;

use crate::config::{DATA_BLOCKS_PER_FILE, DENTRIES_PER_SEGMENT, MAGIC};
use crate::error::{FsError, Result};
use crate::records::{DENTRY_RECORD_SIZE, SUPERBLOCK_RECORD_SIZE, SuperblockRecord};

#[derive(Debug, Clone)]
pub struct Superblock {
    pub magic: u32,
    /// Bytes held by allocated data blocks, reported as the root's size.
    pub usage: u64,
    /// Queried from the device at mount, not persisted.
    pub disk_size: u64,
    /// Queried from the device at mount, not persisted.
    pub io_unit: usize,
    pub max_inodes: u32,
    pub inode_map_blocks: u64,
    pub inode_map_start: u64,
    pub max_data_blocks: u32,
    pub data_map_blocks: u64,
    pub data_map_start: u64,
    pub inode_table_blocks: u64,
    pub inode_table_start: u64,
    pub data_start: u64,
}

impl Superblock {
    /// Filesystem block size: twice the device's native I/O unit.
    pub fn block_size(&self) -> usize {
        self.io_unit * 2
    }

    /// Computes a fresh layout for a blank device.
    ///
    /// Region sizes are estimated top-down: first the theoretical inode
    /// count if inodes and their data filled the whole disk, then the
    /// bitmap regions sized from that, then the inode count recomputed
    /// with the metadata overhead subtracted so data capacity is not
    /// wasted on oversized headers.
    pub fn format(disk_size: u64, io_unit: usize) -> Result<Self> {
        let block_size = io_unit * 2;
        let disk_blocks = disk_size / block_size as u64;
        // A directory-entry segment must fit in one block.
        if DENTRIES_PER_SEGMENT * DENTRY_RECORD_SIZE > block_size {
            return Err(FsError::ResourceExhausted);
        }

        let blocks_per_inode = (DATA_BLOCKS_PER_FILE + 1) as u64;
        let super_blocks = (SUPERBLOCK_RECORD_SIZE as u64).div_ceil(block_size as u64);

        let mut inode_count = disk_blocks / blocks_per_inode;
        if inode_count == 0 {
            return Err(FsError::ResourceExhausted);
        }
        let inode_map_blocks = bitmap_blocks(inode_count, block_size);
        let data_map_blocks =
            bitmap_blocks(inode_count * DATA_BLOCKS_PER_FILE as u64, block_size);

        let overhead = super_blocks + inode_map_blocks + data_map_blocks;
        if disk_blocks <= overhead {
            return Err(FsError::ResourceExhausted);
        }
        inode_count = (disk_blocks - overhead) / blocks_per_inode;
        if inode_count == 0 {
            return Err(FsError::ResourceExhausted);
        }
        let data_block_count = inode_count * DATA_BLOCKS_PER_FILE as u64;

        let inode_map_start = super_blocks;
        let data_map_start = inode_map_start + inode_map_blocks;
        let inode_table_start = data_map_start + data_map_blocks;
        let data_start = inode_table_start + inode_count;

        debug!(
            "formatted layout: {disk_blocks} blocks of {block_size} B, \
             {inode_count} inodes, {data_block_count} data blocks, data at block {data_start}"
        );

        Ok(Superblock {
            magic: MAGIC,
            usage: 0,
            disk_size,
            io_unit,
            max_inodes: inode_count as u32,
            inode_map_blocks,
            inode_map_start,
            max_data_blocks: data_block_count as u32,
            data_map_blocks,
            data_map_start,
            inode_table_blocks: inode_count,
            inode_table_start,
            data_start,
        })
    }

    /// Rebuilds the in-memory superblock from a persisted record plus the
    /// device geometry queried at mount.
    pub fn from_record(rec: &SuperblockRecord, disk_size: u64, io_unit: usize) -> Result<Self> {
        if rec.magic != MAGIC {
            return Err(FsError::BadMagic);
        }
        Ok(Superblock {
            magic: rec.magic,
            usage: rec.usage,
            disk_size,
            io_unit,
            max_inodes: rec.max_inodes,
            inode_map_blocks: rec.inode_map_blocks,
            inode_map_start: rec.inode_map_start,
            max_data_blocks: rec.max_data_blocks,
            data_map_blocks: rec.data_map_blocks,
            data_map_start: rec.data_map_start,
            inode_table_blocks: rec.inode_table_blocks,
            inode_table_start: rec.inode_table_start,
            data_start: rec.data_start,
        })
    }

    pub fn to_record(&self) -> SuperblockRecord {
        SuperblockRecord {
            magic: self.magic,
            max_inodes: self.max_inodes,
            max_data_blocks: self.max_data_blocks,
            _reserved: 0,
            usage: self.usage,
            inode_map_blocks: self.inode_map_blocks,
            inode_map_start: self.inode_map_start,
            data_map_blocks: self.data_map_blocks,
            data_map_start: self.data_map_start,
            inode_table_blocks: self.inode_table_blocks,
            inode_table_start: self.inode_table_start,
            data_start: self.data_start,
        }
    }

    /// Byte offset of the inode table slot for `ino`. Each inode occupies
    /// one block.
    pub fn inode_slot_offset(&self, ino: u32) -> u64 {
        (self.inode_table_start + ino as u64) * self.block_size() as u64
    }

    /// Byte offset of an absolute block number (as stored in inode slots).
    pub fn block_offset(&self, block: u64) -> u64 {
        block * self.block_size() as u64
    }

    pub fn inode_map_offset(&self) -> u64 {
        self.inode_map_start * self.block_size() as u64
    }

    pub fn data_map_offset(&self) -> u64 {
        self.data_map_start * self.block_size() as u64
    }

    pub fn inode_map_bytes(&self) -> usize {
        self.inode_map_blocks as usize * self.block_size()
    }

    pub fn data_map_bytes(&self) -> usize {
        self.data_map_blocks as usize * self.block_size()
    }
}

/// Blocks needed for a bitmap addressing `slots` slots.
fn bitmap_blocks(slots: u64, block_size: usize) -> u64 {
    slots.div_ceil(8).div_ceil(block_size as u64)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn layout_for_64k_device() {
        // 64 KiB disk, 1 KiB native unit, 2 KiB blocks: 32 blocks total.
        let sb = Superblock::format(64 * 1024, 1024).unwrap();
        assert_eq!(sb.block_size(), 2048);
        assert_eq!(sb.max_inodes, 4);
        assert_eq!(sb.max_data_blocks, 24);
        assert_eq!(sb.inode_map_start, 1);
        assert_eq!(sb.data_map_start, 2);
        assert_eq!(sb.inode_table_start, 3);
        assert_eq!(sb.data_start, 7);
        // Every region fits on the device.
        assert!(sb.data_start + sb.max_data_blocks as u64 <= 32);
    }

    #[test]
    fn record_round_trip() {
        let sb = Superblock::format(1024 * 1024, 1024).unwrap();
        let rec = sb.to_record();
        let back = Superblock::from_record(
            &SuperblockRecord::from_bytes(&rec.to_bytes()),
            sb.disk_size,
            sb.io_unit,
        )
        .unwrap();
        assert_eq!(back.max_inodes, sb.max_inodes);
        assert_eq!(back.data_start, sb.data_start);
        assert_eq!(back.inode_table_start, sb.inode_table_start);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let sb = Superblock::format(64 * 1024, 1024).unwrap();
        let mut rec = sb.to_record();
        rec.magic = 0xdead_beef;
        assert_eq!(
            Superblock::from_record(&rec, sb.disk_size, sb.io_unit).unwrap_err(),
            FsError::BadMagic
        );
    }

    #[test]
    fn tiny_device_cannot_be_formatted() {
        // Three 2 KiB blocks cannot hold even one inode with its data.
        assert_eq!(
            Superblock::format(7 * 1024, 1024).unwrap_err(),
            FsError::ResourceExhausted
        );
    }

    #[test]
    fn segment_must_fit_in_a_block() {
        // A 1 KiB block cannot hold a packed 8-entry segment.
        assert_eq!(
            Superblock::format(1024 * 1024, 512).unwrap_err(),
            FsError::ResourceExhausted
        );
    }
}
