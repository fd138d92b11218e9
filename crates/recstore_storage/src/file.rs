//! File-based append-only byte log.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based byte log.
///
/// All appends go to the end of one OS file; reads seek to an absolute
/// offset. A backend opened with [`open_read_only`](Self::open_read_only)
/// holds a read-only handle and rejects appends.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Example
///
/// ```no_run
/// use recstore_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("archive")).unwrap();
/// let offset = backend.append(b"persistent data").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
    read_only: bool,
}

impl FileBackend {
    /// Opens or creates a read-write log at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::from_file(path, file, false)
    }

    /// Opens an existing log without write access.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(path, file, true)
    }

    fn from_file(path: &Path, file: File, read_only: bool) -> StorageResult<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
            read_only,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the log was opened without write access.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly(self.path.display().to_string()));
        }
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        match offset.checked_add(len as u64) {
            Some(end) if end <= size => {}
            _ => return Err(StorageError::ReadPastEnd { offset, len, size }),
        }
        let mut buffer = vec![0u8; len];
        if len > 0 {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check_writable()?;
        let mut size = self.size.write();
        let start = *size;
        if !data.is_empty() {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(start))?;
            if let Err(e) = file.write_all(data) {
                *size = cut_back(&file, start);
                return Err(e.into());
            }
            *size = start + data.len() as u64;
        }
        Ok(start)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if !self.read_only {
            self.file.write().flush()?;
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if !self.read_only {
            self.file.write().sync_all()?;
        }
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_writable()?;
        let mut size = self.size.write();
        if new_size > *size {
            return Err(StorageError::ReadPastEnd {
                offset: new_size,
                len: 0,
                size: *size,
            });
        }
        self.file.write().set_len(new_size)?;
        *size = new_size;
        Ok(())
    }
}

/// Drops the bytes a failed write left past `start` and returns the size
/// the file really has afterwards.
fn cut_back(file: &File, start: u64) -> u64 {
    if file.set_len(start).is_ok() {
        return start;
    }
    file.metadata().map_or(start, |meta| meta.len())
}
