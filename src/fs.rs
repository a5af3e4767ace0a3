//! Mount/unmount controller and the OS-facing operation surface. The
//! engine is single-threaded by construction: every operation takes
//! `&mut self`, and hosts that dispatch concurrently must wrap the whole
//! filesystem in a mutex of their own.

use std::sync::Arc;
use std::time::SystemTime;

use bitflags::bitflags;
use log::{debug, info, warn};

use crate::bitmap::Bitmap;
use crate::block_dev::BlockDevice;
use crate::config::{MAGIC, ROOT_INO};
use crate::driver;
use crate::error::{FsError, Result};
use crate::path;
use crate::records::{DENTRY_RECORD_SIZE, SUPERBLOCK_RECORD_SIZE, SuperblockRecord};
use crate::superblock::Superblock;
use crate::tree::{Arena, Dentry, DentryId, FileType};

bitflags! {
    /// Access-probe flags for `check_access`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMode: u8 {
        const READ = 0b0001;
        const WRITE = 0b0010;
        const EXEC = 0b0100;
        const EXISTS = 0b1000;
    }
}

/// Attributes reported by `getattr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub ftype: FileType,
    pub size: u64,
    pub nlink: u32,
    pub block_size: usize,
}

/// One mounted filesystem session. Owns the superblock, both bitmaps,
/// and the dentry tree; holds the device for the session's lifetime.
pub struct Filesystem<D: BlockDevice> {
    pub(crate) device: Arc<D>,
    pub(crate) sb: Superblock,
    pub(crate) inode_map: Bitmap,
    pub(crate) data_map: Bitmap,
    pub(crate) arena: Arena,
    pub(crate) root: DentryId,
    pub(crate) mounted: bool,
}

impl<D: BlockDevice> Filesystem<D> {
    /// Mounts the device: loads the persisted layout, or formats a fresh
    /// one when the superblock magic does not match. Always finishes with
    /// the root inode resident and the mount active.
    pub fn mount(device: Arc<D>) -> Result<Self> {
        let disk_size = device.total_bytes();
        let io_unit = device.unit_size();

        let mut buf = [0u8; SUPERBLOCK_RECORD_SIZE];
        driver::read_at(&*device, 0, &mut buf)?;
        let rec = SuperblockRecord::from_bytes(&buf);

        let (sb, fresh) = if rec.magic == MAGIC {
            debug!("found existing superblock, loading layout");
            (Superblock::from_record(&rec, disk_size, io_unit)?, false)
        } else {
            info!("no valid superblock, formatting device ({disk_size} bytes)");
            (Superblock::format(disk_size, io_unit)?, true)
        };

        let mut inode_map = Bitmap::new(sb.max_inodes as usize, sb.inode_map_bytes());
        let mut data_map = Bitmap::new(sb.max_data_blocks as usize, sb.data_map_bytes());
        if !fresh {
            driver::read_at(&*device, sb.inode_map_offset(), inode_map.bytes_mut())?;
            driver::read_at(&*device, sb.data_map_offset(), data_map.bytes_mut())?;
        }

        let mut arena = Arena::new();
        let mut root_dentry = Dentry::new(b"/", None, FileType::Dir)?;
        root_dentry.ino = ROOT_INO;
        let root = arena.insert(root_dentry);

        let mut fs = Filesystem {
            device,
            sb,
            inode_map,
            data_map,
            arena,
            root,
            mounted: false,
        };

        if fresh {
            let ino = fs.alloc_inode(root)?;
            debug_assert_eq!(ino, ROOT_INO);
            fs.sync_inode(root)?;
        }
        fs.ensure_loaded(root)?;
        fs.mounted = true;
        Ok(fs)
    }

    /// Flushes the whole tree, both bitmaps, and the superblock record,
    /// then releases the device. This is the only persistence checkpoint;
    /// dropping a mounted filesystem without unmounting loses everything
    /// since the last sync.
    pub fn unmount(mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        self.sync_inode(self.root)?;

        let rec = self.sb.to_record();
        driver::write_at(&*self.device, 0, &rec.to_bytes())?;
        driver::write_at(
            &*self.device,
            self.sb.inode_map_offset(),
            self.inode_map.as_bytes(),
        )?;
        driver::write_at(
            &*self.device,
            self.sb.data_map_offset(),
            self.data_map.as_bytes(),
        )?;
        self.device.sync()?;
        self.mounted = false;
        info!("unmounted, {} bytes in use", self.sb.usage);
        Ok(())
    }

    /// Creates a directory at `path`.
    pub fn create_dir(&mut self, path: &str) -> Result<()> {
        self.create_node(path, FileType::Dir)
    }

    /// Creates an empty regular file at `path`.
    pub fn create_file(&mut self, path: &str) -> Result<()> {
        self.create_node(path, FileType::File)
    }

    fn create_node(&mut self, path: &str, ftype: FileType) -> Result<()> {
        let resolved = self.resolve(path)?;
        if resolved.found {
            return Err(FsError::AlreadyExists);
        }
        // The miss must be at the final component; a missing intermediate
        // directory is a plain lookup failure.
        if resolved.matched + 1 != resolved.levels {
            return Err(FsError::NotFound);
        }
        let parent = resolved.dentry;
        if self.arena.get(parent).ftype != FileType::Dir {
            return Err(FsError::NotADirectory);
        }

        let name = path::leaf(path)?;
        let child = self
            .arena
            .insert(Dentry::new(name.as_bytes(), Some(parent), ftype)?);
        if let Err(err) = self.alloc_inode(child) {
            self.arena.remove(child);
            return Err(err);
        }
        if let Err(err) = self.alloc_child(parent, child, true) {
            let ino = self.arena.get(child).ino;
            // Unwind the half-created node.
            let _ = self.inode_map.free(ino as usize);
            self.arena.remove(child);
            return Err(err);
        }
        debug!("created {path} ({ftype:?})");
        Ok(())
    }

    /// Attributes of the node at `path`. The root reports the partition's
    /// usage bytes and the conventional link count of two.
    pub fn getattr(&mut self, path: &str) -> Result<Attr> {
        let resolved = self.resolve(path)?;
        if !resolved.found {
            return Err(FsError::NotFound);
        }
        let block_size = self.sb.block_size();
        if resolved.is_root {
            return Ok(Attr {
                ftype: FileType::Dir,
                size: self.sb.usage,
                nlink: 2,
                block_size,
            });
        }
        let entry = self.arena.get(resolved.dentry);
        let inode = entry
            .inode
            .as_ref()
            .ok_or_else(|| FsError::Transport("inode not materialized".into()))?;
        let size = match entry.ftype {
            FileType::Dir => (inode.children.len() * DENTRY_RECORD_SIZE) as u64,
            FileType::File => inode.size,
        };
        Ok(Attr {
            ftype: entry.ftype,
            size,
            nlink: 1,
            block_size,
        })
    }

    /// One-at-a-time directory iteration: the name of the entry at
    /// `index`, or `None` past the end.
    pub fn read_dir_entry(&mut self, path: &str, index: usize) -> Result<Option<String>> {
        let resolved = self.resolve(path)?;
        if !resolved.found {
            return Err(FsError::NotFound);
        }
        let entry = self.arena.get(resolved.dentry);
        if entry.ftype != FileType::Dir {
            return Err(FsError::NotADirectory);
        }
        let inode = entry
            .inode
            .as_ref()
            .ok_or_else(|| FsError::Transport("inode not materialized".into()))?;
        Ok(inode
            .children
            .get(index)
            .map(|&child| self.arena.get(child).name_str()))
    }

    /// Reads from the file at `path` into `buf`; returns bytes read.
    pub fn read(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let resolved = self.resolve(path)?;
        if !resolved.found {
            return Err(FsError::NotFound);
        }
        self.read_inode_data(resolved.dentry, offset, buf)
    }

    /// Writes `buf` to the file at `path`; returns bytes written.
    pub fn write(&mut self, path: &str, offset: u64, buf: &[u8]) -> Result<usize> {
        let resolved = self.resolve(path)?;
        if !resolved.found {
            return Err(FsError::NotFound);
        }
        self.write_inode_data(resolved.dentry, offset, buf)
    }

    /// Grows or shrinks the file at `path` to `new_size`.
    pub fn truncate(&mut self, path: &str, new_size: u64) -> Result<()> {
        let resolved = self.resolve(path)?;
        if !resolved.found {
            return Err(FsError::NotFound);
        }
        self.truncate_inode(resolved.dentry, new_size)
    }

    /// Removes the regular file at `path`.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        self.remove_node(path, FileType::File)
    }

    /// Removes the directory at `path` and, recursively, everything
    /// beneath it.
    pub fn remove_dir(&mut self, path: &str) -> Result<()> {
        self.remove_node(path, FileType::Dir)
    }

    fn remove_node(&mut self, path: &str, ftype: FileType) -> Result<()> {
        let resolved = self.resolve(path)?;
        if !resolved.found {
            return Err(FsError::NotFound);
        }
        if resolved.is_root {
            return Err(FsError::InvalidOperation);
        }
        let entry = self.arena.get(resolved.dentry);
        match (entry.ftype, ftype) {
            (FileType::Dir, FileType::File) => return Err(FsError::IsADirectory),
            (FileType::File, FileType::Dir) => return Err(FsError::NotADirectory),
            _ => {}
        }
        let parent = entry
            .parent
            .ok_or(FsError::InvalidOperation)?;

        self.drop_inode(resolved.dentry)?;
        self.drop_child(parent, resolved.dentry)?;
        self.arena.remove(resolved.dentry);
        debug!("removed {path}");
        Ok(())
    }

    /// Moves the node at `from` to `to`. The target must not exist; the
    /// inode itself is untouched, only the dentry moves.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from)?;
        if !source.found {
            return Err(FsError::NotFound);
        }
        if source.is_root {
            return Err(FsError::InvalidOperation);
        }
        if path::components(from) == path::components(to) {
            return Ok(());
        }
        // Renaming a directory into its own subtree would orphan it.
        if is_prefix_of(from, to) {
            return Err(FsError::InvalidOperation);
        }

        let target = self.resolve(to)?;
        if target.found {
            return Err(FsError::AlreadyExists);
        }
        if target.matched + 1 != target.levels {
            return Err(FsError::NotFound);
        }
        let new_parent = target.dentry;
        if self.arena.get(new_parent).ftype != FileType::Dir {
            return Err(FsError::NotADirectory);
        }

        let name = path::leaf(to)?;
        let (ino, ftype, old_parent) = {
            let entry = self.arena.get(source.dentry);
            (
                entry.ino,
                entry.ftype,
                entry.parent.ok_or(FsError::InvalidOperation)?,
            )
        };

        let mut moved = Dentry::new(name.as_bytes(), Some(new_parent), ftype)?;
        moved.ino = ino;
        moved.inode = self.arena.get_mut(source.dentry).inode.take();
        let moved_id = self.arena.insert(moved);

        if let Err(err) = self.alloc_child(new_parent, moved_id, true) {
            // Put the inode back where it came from.
            let inode = self.arena.get_mut(moved_id).inode.take();
            self.arena.get_mut(source.dentry).inode = inode;
            self.arena.remove(moved_id);
            return Err(err);
        }

        // Children of a moved directory still point at the old dentry.
        // Only re-parent once the move cannot fail anymore.
        let grandchildren: Vec<DentryId> = self
            .arena
            .get(moved_id)
            .inode
            .as_ref()
            .map(|inode| inode.children.clone())
            .unwrap_or_default();
        for child in grandchildren {
            self.arena.get_mut(child).parent = Some(moved_id);
        }
        self.drop_child(old_parent, source.dentry)?;
        self.arena.remove(source.dentry);
        debug!("renamed {from} -> {to}");
        Ok(())
    }

    /// Accepted for compatibility; timestamps are not stored.
    pub fn set_times(&mut self, path: &str, _atime: SystemTime, _mtime: SystemTime) -> Result<()> {
        let resolved = self.resolve(path)?;
        if !resolved.found {
            return Err(FsError::NotFound);
        }
        Ok(())
    }

    /// Read, write, and execute are always permitted; only the existence
    /// probe consults the tree.
    pub fn check_access(&mut self, path: &str, mode: AccessMode) -> Result<bool> {
        if mode.contains(AccessMode::EXISTS) {
            return Ok(self.resolve(path)?.found);
        }
        Ok(true)
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn free_inodes(&self) -> usize {
        self.inode_map.max() - self.inode_map.in_use()
    }

    pub fn free_data_blocks(&self) -> usize {
        self.data_map.max() - self.data_map.in_use()
    }

    pub fn device(&self) -> Arc<D> {
        Arc::clone(&self.device)
    }
}

impl<D: BlockDevice> Drop for Filesystem<D> {
    fn drop(&mut self) {
        if self.mounted {
            warn!("filesystem dropped while mounted; unsynced state is lost");
        }
    }
}

/// True when `to` names a path inside the subtree rooted at `from`.
fn is_prefix_of(from: &str, to: &str) -> bool {
    let from = path::components(from);
    let to = path::components(to);
    to.len() > from.len() && to[..from.len()] == from[..]
}
