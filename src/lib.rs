//! Gluon is a tiny hosted block filesystem. It manages a fixed on-disk
//! partition laid out as
//!
//! ```text
//! [ superblock | inode bitmap | data bitmap | inode table | data blocks ]
//! ```
//!
//! on top of any [`BlockDevice`], and exposes a path-based operation
//! surface (create, read, write, rename, remove, ...) suitable for
//! plugging under a FUSE-style adapter.
//!
//! The engine is built in layers:
//!
//! - `block_dev` — the device abstraction and a file-backed disk.
//! - `driver` — byte-addressed transfers over the unit-addressed device.
//! - `records` — the fixed `repr(C)` on-disk record formats.
//! - `superblock` / `bitmap` — partition geometry and allocators.
//! - `tree` / `inode` — the in-memory dentry tree and its persistence.
//! - `path` / `file` / `fs` — resolution, file I/O, and the mount-level
//!   operation surface.
//!
//! All state between [`Filesystem::mount`] and [`Filesystem::unmount`]
//! lives in memory; unmount is the persistence checkpoint.

mod bitmap;
mod block_dev;
pub mod config;
mod driver;
mod error;
mod file;
mod fs;
mod inode;
mod path;
mod records;
mod superblock;
mod tree;

pub use block_dev::{BlockDevice, FileDisk};
pub use error::{FsError, Result};
pub use fs::{AccessMode, Attr, Filesystem};
pub use path::Lookup;
pub use superblock::Superblock;
pub use tree::FileType;
