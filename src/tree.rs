//! In-memory dentry tree. Dentries live in an arena and refer to each
//! other by index, so the parent back-references and the dentry/inode
//! ownership cycle of the on-disk design need no reference counting.
//! Directory child lists grow and shrink in 8-entry segments, each
//! segment backed by one data block in the owning inode's slot array.

use log::trace;

use crate::block_dev::BlockDevice;
use crate::config::{DATA_BLOCKS_PER_FILE, DENTRIES_PER_SEGMENT, MAX_NAME_LEN};
use crate::error::{FsError, Result};
use crate::fs::Filesystem;

pub(crate) type DentryId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
}

impl FileType {
    pub(crate) fn tag(self) -> u32 {
        match self {
            FileType::File => 0,
            FileType::Dir => 1,
        }
    }

    pub(crate) fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0 => Ok(FileType::File),
            1 => Ok(FileType::Dir),
            _ => Err(FsError::Transport(format!("bad file type tag {tag}"))),
        }
    }
}

/// A named edge in the tree. The inode is lazily materialized: `None`
/// until the dentry is first visited, then resident for the rest of the
/// mount session.
pub(crate) struct Dentry {
    pub name: [u8; MAX_NAME_LEN],
    pub ino: u32,
    pub ftype: FileType,
    pub parent: Option<DentryId>,
    pub inode: Option<Inode>,
}

impl Dentry {
    pub fn new(name: &[u8], parent: Option<DentryId>, ftype: FileType) -> Result<Self> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(FsError::InvalidName);
        }
        let mut stored = [0u8; MAX_NAME_LEN];
        stored[..name.len()].copy_from_slice(name);
        Ok(Dentry {
            name: stored,
            ino: 0,
            ftype,
            parent,
            inode: None,
        })
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(trim_name(&self.name)).into_owned()
    }
}

/// In-memory inode. For directories `children` mirrors the persisted
/// dentry segments and `size` is unused (entry count is implicit);
/// for files the slot array maps block-granular file ranges to absolute
/// block numbers, zero meaning unallocated.
pub(crate) struct Inode {
    pub ino: u32,
    pub size: u64,
    pub slots: [u64; DATA_BLOCKS_PER_FILE],
    pub children: Vec<DentryId>,
}

impl Inode {
    pub fn new(ino: u32) -> Self {
        Inode {
            ino,
            size: 0,
            slots: [0; DATA_BLOCKS_PER_FILE],
            children: Vec::new(),
        }
    }

    /// Block slots needed for `count` directory entries.
    pub fn segments_for(count: usize) -> usize {
        count.div_ceil(DENTRIES_PER_SEGMENT)
    }
}

/// Slab of dentries addressed by stable indices. Slots freed by unlink
/// are recycled.
pub(crate) struct Arena {
    slots: Vec<Option<Dentry>>,
    free: Vec<usize>,
}

impl Arena {
    pub fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, dentry: Dentry) -> DentryId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(dentry);
                id
            }
            None => {
                self.slots.push(Some(dentry));
                self.slots.len() - 1
            }
        }
    }

    pub fn remove(&mut self, id: DentryId) -> Dentry {
        let dentry = self.slots[id].take().expect("dangling dentry handle");
        self.free.push(id);
        dentry
    }

    pub fn get(&self, id: DentryId) -> &Dentry {
        self.slots[id].as_ref().expect("dangling dentry handle")
    }

    pub fn get_mut(&mut self, id: DentryId) -> &mut Dentry {
        self.slots[id].as_mut().expect("dangling dentry handle")
    }
}

/// Strips the NUL padding a stored name carries.
pub(crate) fn trim_name(name: &[u8]) -> &[u8] {
    let mut end = name.len();
    while end > 0 && name[end - 1] == 0 {
        end -= 1;
    }
    &name[..end]
}

/// Exact-length name comparison. The stored name is NUL-padded, so both
/// sides are trimmed first; a name that is a strict prefix of another
/// never matches.
pub(crate) fn name_eq(stored: &[u8], query: &[u8]) -> bool {
    trim_name(stored) == trim_name(query)
}

impl<D: BlockDevice> Filesystem<D> {
    /// Appends `child` to `parent`'s in-memory child list. Crossing into
    /// a new 8-entry segment claims the next inode block slot; a fresh
    /// data block is only allocated when `grow_storage` is set (creation
    /// as opposed to reload, where the slot already points at a block).
    /// Fails with `ResourceExhausted` when the directory would need a
    /// seventh slot.
    pub(crate) fn alloc_child(
        &mut self,
        parent: DentryId,
        child: DentryId,
        grow_storage: bool,
    ) -> Result<usize> {
        let count = {
            let inode = self.dir_inode(parent)?;
            inode.children.len()
        };
        if count % DENTRIES_PER_SEGMENT == 0 {
            let segment = count / DENTRIES_PER_SEGMENT;
            if segment >= DATA_BLOCKS_PER_FILE {
                return Err(FsError::ResourceExhausted);
            }
            if grow_storage {
                let block = self.alloc_data_block()?;
                self.inode_mut(parent).slots[segment] = block;
            }
        }
        let inode = self.inode_mut(parent);
        inode.children.push(child);
        trace!(
            "alloc_child: parent ino {} now holds {} entries",
            inode.ino,
            inode.children.len()
        );
        Ok(count + 1)
    }

    /// Removes `child` from `parent`'s child list, keeping the list dense
    /// and releasing data blocks the smaller segment count no longer
    /// needs. Returns the remaining entry count.
    pub(crate) fn drop_child(&mut self, parent: DentryId, child: DentryId) -> Result<usize> {
        let (position, old_count) = {
            let inode = self.dir_inode(parent)?;
            let position = inode
                .children
                .iter()
                .position(|&c| c == child)
                .ok_or(FsError::NotFound)?;
            (position, inode.children.len())
        };

        let inode = self.inode_mut(parent);
        inode.children.remove(position);

        let old_segments = Inode::segments_for(old_count);
        let new_segments = Inode::segments_for(old_count - 1);
        for segment in new_segments..old_segments {
            let block = self.inode_mut(parent).slots[segment];
            self.inode_mut(parent).slots[segment] = 0;
            if block != 0 {
                self.free_data_block(block)?;
            }
        }
        Ok(old_count - 1)
    }

    fn dir_inode(&self, id: DentryId) -> Result<&Inode> {
        let dentry = self.arena.get(id);
        if dentry.ftype != FileType::Dir {
            return Err(FsError::NotADirectory);
        }
        dentry
            .inode
            .as_ref()
            .ok_or_else(|| FsError::Transport("directory inode not materialized".into()))
    }

    pub(crate) fn inode_mut(&mut self, id: DentryId) -> &mut Inode {
        self.arena
            .get_mut(id)
            .inode
            .as_mut()
            .expect("inode not materialized")
    }
}
