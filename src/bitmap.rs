//! Bit-per-slot allocator for inode numbers and data block numbers. Two
//! independent instances live in memory for the whole mount session; they
//! are loaded from their bitmap regions at mount and flushed at unmount.

use log::trace;

use crate::block_dev::BlockDevice;
use crate::error::{FsError, Result};
use crate::fs::Filesystem;

pub struct Bitmap {
    bytes: Vec<u8>,
    max: usize,
}

impl Bitmap {
    /// A zeroed bitmap addressing `max` slots, backed by `byte_len` bytes
    /// (the on-disk region size, normally larger than `max / 8`).
    pub fn new(max: usize, byte_len: usize) -> Self {
        debug_assert!(byte_len * 8 >= max);
        Bitmap {
            bytes: vec![0u8; byte_len],
            max,
        }
    }

    /// Claims the lowest free slot, scanning bytes then bits. The scan
    /// stops exactly at `max`, regardless of how many trailing bits the
    /// backing region could address.
    pub fn allocate(&mut self) -> Result<usize> {
        for (byte_idx, byte) in self.bytes.iter_mut().enumerate() {
            if *byte == 0xff {
                continue;
            }
            for bit in 0..8 {
                let idx = byte_idx * 8 + bit;
                if idx >= self.max {
                    return Err(FsError::ResourceExhausted);
                }
                if *byte & (1 << bit) == 0 {
                    *byte |= 1 << bit;
                    return Ok(idx);
                }
            }
        }
        Err(FsError::ResourceExhausted)
    }

    /// Releases a slot. Freeing outside the addressable range is a caller
    /// contract violation.
    pub fn free(&mut self, idx: usize) -> Result<()> {
        if idx >= self.max {
            return Err(FsError::InvalidOperation);
        }
        self.bytes[idx / 8] &= !(1 << (idx % 8));
        Ok(())
    }

    pub fn is_set(&self, idx: usize) -> bool {
        idx < self.max && self.bytes[idx / 8] & (1 << (idx % 8)) != 0
    }

    /// Number of claimed slots.
    pub fn in_use(&self) -> usize {
        (0..self.max).filter(|&i| self.is_set(i)).count()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl<D: BlockDevice> Filesystem<D> {
    /// Claims a data block and returns its absolute block number. Slot
    /// arrays store absolute numbers so zero can mean "unused" (the data
    /// area never starts at block zero).
    pub(crate) fn alloc_data_block(&mut self) -> Result<u64> {
        let index = self.data_map.allocate()?;
        self.sb.usage += self.sb.block_size() as u64;
        trace!("allocated data block {index}");
        Ok(self.sb.data_start + index as u64)
    }

    /// Releases a data block by absolute block number.
    pub(crate) fn free_data_block(&mut self, block: u64) -> Result<()> {
        if block < self.sb.data_start {
            return Err(FsError::InvalidOperation);
        }
        self.data_map.free((block - self.sb.data_start) as usize)?;
        self.sb.usage = self.sb.usage.saturating_sub(self.sb.block_size() as u64);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allocates_lowest_first() {
        let mut map = Bitmap::new(16, 2);
        assert_eq!(map.allocate().unwrap(), 0);
        assert_eq!(map.allocate().unwrap(), 1);
        assert_eq!(map.allocate().unwrap(), 2);
    }

    #[test]
    fn exhausts_exactly_at_max() {
        // Backing region addresses 16 bits but only 10 slots exist.
        let mut map = Bitmap::new(10, 2);
        for i in 0..10 {
            assert_eq!(map.allocate().unwrap(), i);
        }
        assert_eq!(map.allocate(), Err(FsError::ResourceExhausted));
    }

    #[test]
    fn freed_slot_is_reused_lowest_first() {
        let mut map = Bitmap::new(10, 2);
        for _ in 0..10 {
            map.allocate().unwrap();
        }
        map.free(3).unwrap();
        map.free(7).unwrap();
        assert_eq!(map.allocate().unwrap(), 3);
        assert_eq!(map.allocate().unwrap(), 7);
        assert_eq!(map.allocate(), Err(FsError::ResourceExhausted));
    }

    #[test]
    fn out_of_range_free_is_rejected() {
        let mut map = Bitmap::new(10, 2);
        assert_eq!(map.free(10), Err(FsError::InvalidOperation));
    }

    #[test]
    fn in_use_tracks_state() {
        let mut map = Bitmap::new(10, 2);
        map.allocate().unwrap();
        map.allocate().unwrap();
        assert_eq!(map.in_use(), 2);
        map.free(0).unwrap();
        assert_eq!(map.in_use(), 1);
    }
}
