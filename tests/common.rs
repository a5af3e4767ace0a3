#![allow(dead_code)]

//! Shared test fixtures: an in-memory block device and canned disk
//! geometries.

use std::sync::{Arc, Mutex};

use gluon::{BlockDevice, FsError, Result};

/// Unit-addressed RAM-backed device.
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    unit: usize,
}

impl RamDisk {
    pub fn new(total: usize, unit: usize) -> Arc<Self> {
        Arc::new(RamDisk {
            data: Mutex::new(vec![0u8; total]),
            unit,
        })
    }
}

impl BlockDevice for RamDisk {
    fn total_bytes(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn unit_size(&self) -> usize {
        self.unit
    }

    fn read_unit(&self, unit_id: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.data.lock().unwrap();
        let start = unit_id as usize * self.unit;
        if start + self.unit > data.len() {
            return Err(FsError::Transport("unit out of range".into()));
        }
        buf.copy_from_slice(&data[start..start + self.unit]);
        Ok(())
    }

    fn write_unit(&self, unit_id: u64, buf: &[u8]) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let start = unit_id as usize * self.unit;
        if start + self.unit > data.len() {
            return Err(FsError::Transport("unit out of range".into()));
        }
        data[start..start + self.unit].copy_from_slice(buf);
        Ok(())
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 64 KiB disk, 1 KiB unit: 4 inodes, 24 data blocks. Good for
/// exhaustion tests.
pub fn small_disk() -> Arc<RamDisk> {
    init_logging();
    RamDisk::new(64 * 1024, 1024)
}

/// 2 MiB disk, 1 KiB unit: 145 inodes, plenty of room for directory
/// capacity tests.
pub fn big_disk() -> Arc<RamDisk> {
    init_logging();
    RamDisk::new(2 * 1024 * 1024, 1024)
}
