//! Serialized projections of the in-memory structures. Records are plain
//! `#[repr(C)]` integer/byte-array structs copied to and from disk with
//! unaligned reads, so layout is fixed by field order alone.

use core::mem::size_of;

use crate::config::{DATA_BLOCKS_PER_FILE, MAX_NAME_LEN};

pub const SUPERBLOCK_RECORD_SIZE: usize = size_of::<SuperblockRecord>();
pub const INODE_RECORD_SIZE: usize = size_of::<InodeRecord>();
pub const DENTRY_RECORD_SIZE: usize = size_of::<DentryRecord>();

/// On-disk superblock. Region offsets and sizes are in block units; the
/// disk size and native I/O unit are queried from the device on every
/// mount, never persisted.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SuperblockRecord {
    pub magic: u32,
    pub max_inodes: u32,
    pub max_data_blocks: u32,
    pub _reserved: u32,
    pub usage: u64,
    pub inode_map_blocks: u64,
    pub inode_map_start: u64,
    pub data_map_blocks: u64,
    pub data_map_start: u64,
    pub inode_table_blocks: u64,
    pub inode_table_start: u64,
    pub data_start: u64,
}

/// On-disk inode. One record per inode-table block; the slot array holds
/// absolute block numbers, zero meaning unused.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InodeRecord {
    pub ino: u32,
    pub ftype: u32,
    pub size: u64,
    pub dir_cnt: u32,
    pub _reserved: u32,
    pub slots: [u64; DATA_BLOCKS_PER_FILE],
}

/// On-disk directory entry, packed eight per segment.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DentryRecord {
    pub name: [u8; MAX_NAME_LEN],
    pub ino: u32,
    pub ftype: u32,
}

macro_rules! raw_record {
    ($ty:ty, $size:expr) => {
        impl $ty {
            pub fn to_bytes(&self) -> [u8; $size] {
                let mut buf = [0u8; $size];
                // Safety: the record is repr(C) plain old data and the
                // buffer is exactly its size.
                unsafe {
                    core::ptr::write_unaligned(buf.as_mut_ptr() as *mut Self, *self);
                }
                buf
            }

            pub fn from_bytes(buf: &[u8]) -> Self {
                assert!(buf.len() >= $size);
                // Safety: every bit pattern is a valid value for the
                // record's integer and byte-array fields.
                unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Self) }
            }
        }
    };
}

raw_record!(SuperblockRecord, SUPERBLOCK_RECORD_SIZE);
raw_record!(InodeRecord, INODE_RECORD_SIZE);
raw_record!(DentryRecord, DENTRY_RECORD_SIZE);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inode_record_round_trip() {
        let rec = InodeRecord {
            ino: 7,
            ftype: 1,
            size: 4096,
            dir_cnt: 3,
            _reserved: 0,
            slots: [9, 10, 0, 0, 0, 0],
        };
        let back = InodeRecord::from_bytes(&rec.to_bytes());
        assert_eq!(back.ino, 7);
        assert_eq!(back.size, 4096);
        assert_eq!(back.dir_cnt, 3);
        assert_eq!(back.slots, [9, 10, 0, 0, 0, 0]);
    }

    #[test]
    fn dentry_record_round_trip() {
        let mut name = [0u8; MAX_NAME_LEN];
        name[..5].copy_from_slice(b"hello");
        let rec = DentryRecord {
            name,
            ino: 12,
            ftype: 0,
        };
        let back = DentryRecord::from_bytes(&rec.to_bytes());
        assert_eq!(back.name, name);
        assert_eq!(back.ino, 12);
    }

    #[test]
    fn record_sizes_are_stable() {
        assert_eq!(DENTRY_RECORD_SIZE, MAX_NAME_LEN + 8);
        assert!(INODE_RECORD_SIZE <= 128);
        assert!(SUPERBLOCK_RECORD_SIZE <= 128);
    }
}
