//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A persistent backend over a single file.
///
/// `flush()` pushes buffered writes to the OS; `sync()` additionally
/// calls `sync_all` so data and metadata survive power loss.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens or creates a file backend at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { file, size }),
        })
    }

    /// Opens or creates a file backend, creating parent directories first.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        let size = inner.size;
        let end = offset.saturating_add(len as u64);
        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        inner.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        inner.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        if data.is_empty() {
            return Ok(inner.size);
        }
        let offset = inner.size;
        inner.file.seek(SeekFrom::End(0))?;
        inner.file.write_all(data)?;
        inner.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.lock().file.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if new_size > inner.size {
            return Err(StorageError::Corrupted(format!(
                "cannot truncate to {new_size}, current size is {}",
                inner.size
            )));
        }
        inner.file.set_len(new_size)?;
        inner.size = new_size;
        inner.file.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 10);
        assert_eq!(backend.read_at(0, 10).unwrap(), b"persistent");
    }

    #[test]
    fn append_after_reopen_continues_at_end() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"first").unwrap();
            backend.sync().unwrap();
        }

        let mut backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.append(b"second").unwrap(), 5);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"firstsecond");
    }

    #[test]
    fn create_dirs_builds_missing_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("store.log");
        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn truncate_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"hello world").unwrap();
        backend.truncate(5).unwrap();
        assert_eq!(backend.read_at(0, 5).unwrap(), b"hello");
        assert!(matches!(
            backend.read_at(0, 6),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn read_past_end_reports_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"abc").unwrap();
        match backend.read_at(2, 5) {
            Err(StorageError::ReadPastEnd { size, .. }) => assert_eq!(size, 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
