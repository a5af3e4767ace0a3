//! On-disk constants shared by every layer.

/// Identifies a formatted gluon partition. Anything else on block zero
/// means the device gets formatted on mount.
pub const MAGIC: u32 = 0x0011_4514;

/// The root directory's inode number, fixed for the life of the filesystem.
pub const ROOT_INO: u32 = 0;

/// Maximum length of one path component, in bytes. Names are stored
/// NUL-padded to this length inside directory-entry records.
pub const MAX_NAME_LEN: usize = 128;

/// Number of data-block slots per inode. This hard-caps a file at
/// `DATA_BLOCKS_PER_FILE * block_size` bytes and a directory at
/// `DATA_BLOCKS_PER_FILE * DENTRIES_PER_SEGMENT` entries.
pub const DATA_BLOCKS_PER_FILE: usize = 6;

/// Directory entries are persisted in packed groups of this size, one
/// group per data block.
pub const DENTRIES_PER_SEGMENT: usize = 8;

/// Native I/O unit assumed for plain image files, which have no ioctl to
/// report one. A block (2x unit) must hold one directory-entry segment,
/// so units below 544 bytes are unformattable.
pub const DEFAULT_IO_UNIT: usize = 1024;
