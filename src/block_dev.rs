use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::config::DEFAULT_IO_UNIT;
use crate::error::{FsError, Result};

/// Abstraction over a raw device that only supports transfers of its
/// native I/O unit. The engine never issues a read or write smaller than
/// `unit_size()`; byte-granular access goes through the driver layer.
pub trait BlockDevice: Send + Sync {
    /// Total capacity in bytes.
    fn total_bytes(&self) -> u64;

    /// Native transfer size in bytes. Filesystem blocks are twice this.
    fn unit_size(&self) -> usize;

    /// Reads one unit. `buf.len()` must equal `unit_size()`.
    fn read_unit(&self, unit_id: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes one unit. `buf.len()` must equal `unit_size()`.
    fn write_unit(&self, unit_id: u64, buf: &[u8]) -> Result<()>;

    /// Pushes any buffered writes down to stable storage.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Block device backed by a plain file image, for hosts without a real
/// character device. This is what the single `device` path option of the
/// process configuration resolves to.
pub struct FileDisk {
    file: Mutex<File>,
    unit: usize,
    total: u64,
}

impl FileDisk {
    /// Opens an existing image with the default I/O unit.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_unit(path, DEFAULT_IO_UNIT)
    }

    /// Opens an existing image, treating `unit` as the device's native
    /// transfer size. Trailing bytes that do not fill a whole unit are
    /// ignored.
    pub fn with_unit(path: impl AsRef<Path>, unit: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(FileDisk {
            file: Mutex::new(file),
            unit,
            total: len - len % unit as u64,
        })
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| FsError::Transport("device lock poisoned".into()))
    }
}

impl BlockDevice for FileDisk {
    fn total_bytes(&self) -> u64 {
        self.total
    }

    fn unit_size(&self) -> usize {
        self.unit
    }

    fn read_unit(&self, unit_id: u64, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.unit {
            return Err(FsError::Transport("short read buffer".into()));
        }
        let mut file = self.locked()?;
        file.seek(SeekFrom::Start(unit_id * self.unit as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_unit(&self, unit_id: u64, buf: &[u8]) -> Result<()> {
        if buf.len() != self.unit {
            return Err(FsError::Transport("short write buffer".into()));
        }
        let mut file = self.locked()?;
        file.seek(SeekFrom::Start(unit_id * self.unit as u64))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.locked()?.sync_all()?;
        Ok(())
    }
}
