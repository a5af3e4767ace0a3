use thiserror::Error;

/// Every failure the engine can report. The OS-facing adapter maps these
/// onto its native errno-style convention.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("file or directory already exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("offset past end of file")]
    InvalidOffset,
    #[error("invalid file name")]
    InvalidName,
    #[error("out of inodes, data blocks, or directory capacity")]
    ResourceExhausted,
    #[error("operation not permitted")]
    InvalidOperation,
    #[error("superblock magic mismatch")]
    BadMagic,
    #[error("device transport failure: {0}")]
    Transport(String),
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        FsError::Transport(err.to_string())
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
