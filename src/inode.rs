//! Inode store: fixed-size inode records in the inode table, plus the
//! packed directory-entry segments hanging off directory inodes. This is
//! the only persistence path; there is no write-ahead log, so a transport
//! failure mid-sync leaves the on-disk tree partially updated.

use log::{debug, trace};

use crate::block_dev::BlockDevice;
use crate::config::DENTRIES_PER_SEGMENT;
use crate::driver;
use crate::error::{FsError, Result};
use crate::fs::Filesystem;
use crate::records::{DENTRY_RECORD_SIZE, DentryRecord, INODE_RECORD_SIZE, InodeRecord};
use crate::tree::{Dentry, DentryId, FileType, Inode};

impl<D: BlockDevice> Filesystem<D> {
    /// Claims an inode number for `dentry` and links the two. The new
    /// inode starts empty: zero size, no block slots, no children.
    pub(crate) fn alloc_inode(&mut self, dentry: DentryId) -> Result<u32> {
        let ino = self.inode_map.allocate()? as u32;
        let entry = self.arena.get_mut(dentry);
        entry.ino = ino;
        entry.inode = Some(Inode::new(ino));
        trace!("allocated inode {ino} for {:?}", entry.name_str());
        Ok(ino)
    }

    /// Materializes `dentry`'s inode if it is not yet resident. Once
    /// loaded an inode stays in memory for the life of the mount; this is
    /// the engine's only caching mechanism.
    pub(crate) fn ensure_loaded(&mut self, dentry: DentryId) -> Result<()> {
        if self.arena.get(dentry).inode.is_none() {
            self.read_inode(dentry)?;
        }
        Ok(())
    }

    /// Deserializes the inode record for `dentry` and, for directories,
    /// rebuilds the child dentry list from the packed segments. Children
    /// are left unmaterialized until visited.
    pub(crate) fn read_inode(&mut self, dentry: DentryId) -> Result<()> {
        let (ino, ftype) = {
            let entry = self.arena.get(dentry);
            (entry.ino, entry.ftype)
        };

        let mut buf = [0u8; INODE_RECORD_SIZE];
        driver::read_at(&*self.device, self.sb.inode_slot_offset(ino), &mut buf)?;
        let rec = InodeRecord::from_bytes(&buf);

        let mut inode = Inode::new(ino);
        inode.size = rec.size;
        inode.slots = rec.slots;

        if ftype != FileType::Dir {
            self.arena.get_mut(dentry).inode = Some(inode);
            return Ok(());
        }

        let count = rec.dir_cnt as usize;
        let segment_bytes = DENTRIES_PER_SEGMENT * DENTRY_RECORD_SIZE;
        let mut raw = vec![0u8; Inode::segments_for(count) * segment_bytes];
        for segment in 0..Inode::segments_for(count) {
            let block = inode.slots[segment];
            driver::read_at(
                &*self.device,
                self.sb.block_offset(block),
                &mut raw[segment * segment_bytes..(segment + 1) * segment_bytes],
            )?;
        }
        self.arena.get_mut(dentry).inode = Some(inode);

        for i in 0..count {
            let rec = DentryRecord::from_bytes(&raw[i * DENTRY_RECORD_SIZE..]);
            let ftype = FileType::from_tag(rec.ftype)?;
            let mut child = Dentry::new(crate::tree::trim_name(&rec.name), Some(dentry), ftype)?;
            child.ino = rec.ino;
            let child_id = self.arena.insert(child);
            // Reload: the segment blocks are already in the slot array.
            self.alloc_child(dentry, child_id, false)?;
        }
        trace!("loaded inode {ino} ({count} entries)");
        Ok(())
    }

    /// Serializes `dentry`'s inode record and, for directories, first
    /// recursively syncs every materialized child, then rewrites the
    /// repacked directory-entry segments across the occupied block slots.
    pub(crate) fn sync_inode(&mut self, dentry: DentryId) -> Result<()> {
        let entry = self.arena.get(dentry);
        let (ino, ftype) = (entry.ino, entry.ftype);
        // Never-visited subtrees are unchanged on disk.
        let Some(inode) = entry.inode.as_ref() else {
            return Ok(());
        };
        let rec = InodeRecord {
            ino,
            ftype: ftype.tag(),
            size: inode.size,
            dir_cnt: inode.children.len() as u32,
            _reserved: 0,
            slots: inode.slots,
        };
        let slots = inode.slots;
        let children = inode.children.clone();

        driver::write_at(
            &*self.device,
            self.sb.inode_slot_offset(ino),
            &rec.to_bytes(),
        )?;

        if ftype != FileType::Dir {
            return Ok(());
        }

        for &child in &children {
            self.sync_inode(child)?;
        }

        let segment_bytes = DENTRIES_PER_SEGMENT * DENTRY_RECORD_SIZE;
        for (segment, chunk) in children.chunks(DENTRIES_PER_SEGMENT).enumerate() {
            let mut buf = vec![0u8; segment_bytes];
            for (i, &child) in chunk.iter().enumerate() {
                let entry = self.arena.get(child);
                let rec = DentryRecord {
                    name: entry.name,
                    ino: entry.ino,
                    ftype: entry.ftype.tag(),
                };
                buf[i * DENTRY_RECORD_SIZE..(i + 1) * DENTRY_RECORD_SIZE]
                    .copy_from_slice(&rec.to_bytes());
            }
            driver::write_at(&*self.device, self.sb.block_offset(slots[segment]), &buf)?;
        }
        Ok(())
    }

    /// Releases `dentry`'s inode: clears its bitmap bit, frees its data
    /// blocks, and recursively drops every descendant of a directory.
    /// The dentry itself stays in the arena; the caller detaches it.
    pub(crate) fn drop_inode(&mut self, dentry: DentryId) -> Result<()> {
        if dentry == self.root {
            return Err(FsError::InvalidOperation);
        }
        // A never-visited subtree still owns on-disk state; load it so
        // every descendant's bitmap bit gets cleared.
        self.ensure_loaded(dentry)?;

        let entry = self.arena.get(dentry);
        let ino = entry.ino;
        let ftype = entry.ftype;
        let inode = entry
            .inode
            .as_ref()
            .ok_or_else(|| FsError::Transport("inode not materialized".into()))?;
        let slots = inode.slots;
        let children = inode.children.clone();

        self.inode_map.free(ino as usize)?;
        debug!("dropped inode {ino}");

        if ftype == FileType::Dir {
            for child in children {
                self.drop_inode(child)?;
                self.arena.remove(child);
            }
        }
        for block in slots {
            if block != 0 {
                self.free_data_block(block)?;
            }
        }
        Ok(())
    }
}
