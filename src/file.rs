//! Block-granular file I/O: maps byte ranges of a regular file onto the
//! six-slot block array, splitting each request into at most six
//! per-block transfers through the aligned driver layer.

use log::trace;

use crate::block_dev::BlockDevice;
use crate::config::DATA_BLOCKS_PER_FILE;
use crate::driver;
use crate::error::{FsError, Result};
use crate::fs::Filesystem;
use crate::tree::{DentryId, FileType};

impl<D: BlockDevice> Filesystem<D> {
    /// Reads at most `buf.len()` bytes starting at `offset`, clamped to
    /// end of file. `offset` past the current size is an invalid seek.
    pub(crate) fn read_inode_data(
        &mut self,
        dentry: DentryId,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let block_size = self.sb.block_size() as u64;
        let (size, slots) = self.file_state(dentry)?;
        if offset > size {
            return Err(FsError::InvalidOffset);
        }
        let len = (buf.len() as u64).min(size - offset) as usize;

        let mut done = 0usize;
        let mut cursor = offset;
        while done < len {
            let slot_index = (cursor / block_size) as usize;
            let in_block = (cursor % block_size) as usize;
            let take = (block_size as usize - in_block).min(len - done);
            let block = slots[slot_index];
            if block == 0 {
                // Hole left by a sparse write: reads back as zeros.
                buf[done..done + take].fill(0);
            } else {
                driver::read_at(
                    &*self.device,
                    self.sb.block_offset(block) + in_block as u64,
                    &mut buf[done..done + take],
                )?;
            }
            done += take;
            cursor += take as u64;
        }
        Ok(len)
    }

    /// Writes `buf` at `offset`, allocating any block slot the range
    /// needs, and extends the size when the write reaches past it. The
    /// six-slot array caps the reachable range; no block is pre-zeroed.
    pub(crate) fn write_inode_data(
        &mut self,
        dentry: DentryId,
        offset: u64,
        buf: &[u8],
    ) -> Result<usize> {
        let block_size = self.sb.block_size() as u64;
        let (size, _) = self.file_state(dentry)?;
        if offset > size {
            return Err(FsError::InvalidOffset);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let end = offset + buf.len() as u64;
        let needed = end.div_ceil(block_size) as usize;
        if needed > DATA_BLOCKS_PER_FILE {
            return Err(FsError::ResourceExhausted);
        }
        for slot_index in 0..needed {
            if self.inode_mut(dentry).slots[slot_index] == 0 {
                let block = self.alloc_data_block()?;
                self.inode_mut(dentry).slots[slot_index] = block;
            }
        }
        let slots = self.inode_mut(dentry).slots;

        let mut done = 0usize;
        let mut cursor = offset;
        while done < buf.len() {
            let slot_index = (cursor / block_size) as usize;
            let in_block = (cursor % block_size) as usize;
            let take = (block_size as usize - in_block).min(buf.len() - done);
            driver::write_at(
                &*self.device,
                self.sb.block_offset(slots[slot_index]) + in_block as u64,
                &buf[done..done + take],
            )?;
            done += take;
            cursor += take as u64;
        }

        let inode = self.inode_mut(dentry);
        if end > inode.size {
            inode.size = end;
        }
        trace!("wrote {} bytes at {offset}, size now {}", buf.len(), end);
        Ok(buf.len())
    }

    /// Grows or shrinks a file to `new_size`, allocating or releasing
    /// block slots at block granularity. The logical size is updated
    /// unconditionally; shrinking does not scrub bytes inside the last
    /// kept block.
    pub(crate) fn truncate_inode(&mut self, dentry: DentryId, new_size: u64) -> Result<()> {
        let block_size = self.sb.block_size() as u64;
        let (size, _) = self.file_state(dentry)?;

        let new_blocks = new_size.div_ceil(block_size) as usize;
        let old_blocks = size.div_ceil(block_size) as usize;
        if new_blocks > DATA_BLOCKS_PER_FILE {
            return Err(FsError::ResourceExhausted);
        }

        if new_blocks > old_blocks {
            for slot_index in old_blocks..new_blocks {
                if self.inode_mut(dentry).slots[slot_index] == 0 {
                    let block = self.alloc_data_block()?;
                    self.inode_mut(dentry).slots[slot_index] = block;
                }
            }
        } else {
            for slot_index in new_blocks..old_blocks {
                let block = self.inode_mut(dentry).slots[slot_index];
                self.inode_mut(dentry).slots[slot_index] = 0;
                if block != 0 {
                    self.free_data_block(block)?;
                }
            }
        }

        self.inode_mut(dentry).size = new_size;
        Ok(())
    }

    /// Size and slot array of a regular file; directories are rejected.
    fn file_state(&self, dentry: DentryId) -> Result<(u64, [u64; DATA_BLOCKS_PER_FILE])> {
        let entry = self.arena.get(dentry);
        if entry.ftype == FileType::Dir {
            return Err(FsError::IsADirectory);
        }
        let inode = entry
            .inode
            .as_ref()
            .ok_or_else(|| FsError::Transport("inode not materialized".into()))?;
        Ok((inode.size, inode.slots))
    }
}
