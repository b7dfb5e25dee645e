//! Plain file implementation of [`LobFile`].

use crate::backend::LobFile;
use crate::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};

/// A random-access file on local storage.
///
/// This is a direct pass-through to OS file APIs. When created from a
/// temporary file the path is removed as soon as the value is dropped, so an
/// abandoned overflow file never outlives its owner.
///
/// # Example
///
/// ```no_run
/// use lobkit_storage::{FileLob, LobFile};
/// use std::path::Path;
///
/// let mut file = FileLob::open(Path::new("overflow.tmp")).unwrap();
/// file.write_at(0, b"large object bytes").unwrap();
/// let mut buf = [0u8; 5];
/// file.read_at(6, &mut buf).unwrap();
/// assert_eq!(&buf, b"objec");
/// ```
#[derive(Debug)]
pub struct FileLob {
    path: PathBuf,
    file: Option<File>,
    len: u64,
    /// Deletes the file on drop when it was created as a temporary.
    temp: Option<TempPath>,
}

impl FileLob {
    /// Opens or creates a file at the given path.
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

        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            len,
            temp: None,
        })
    }

    /// Takes ownership of a temporary file; the file is deleted on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub fn from_temp(temp: NamedTempFile) -> StorageResult<Self> {
        let (file, temp_path) = temp.into_parts();
        let len = file.metadata()?.len();
        Ok(Self {
            path: temp_path.to_path_buf(),
            file: Some(file),
            len,
            temp: Some(temp_path),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file is deleted when this value is dropped.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    fn file(&mut self) -> StorageResult<&mut File> {
        self.file.as_mut().ok_or(StorageError::Closed)
    }
}

impl LobFile for FileLob {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> StorageResult<usize> {
        let len = self.len;
        if pos > len {
            return Err(StorageError::PositionPastEnd { pos, len });
        }

        let want = buf.len().min((len - pos) as usize);
        if want == 0 {
            return Ok(0);
        }

        let file = self.file()?;
        file.seek(SeekFrom::Start(pos))?;

        let mut done = 0;
        while done < want {
            match file.read(&mut buf[done..want]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(done)
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> StorageResult<()> {
        let len = self.len;
        if pos > len {
            return Err(StorageError::PositionPastEnd { pos, len });
        }
        if data.is_empty() {
            return Ok(());
        }

        let file = self.file()?;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(data)?;

        self.len = len.max(pos + data.len() as u64);
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        if self.file.is_none() {
            return Err(StorageError::Closed);
        }
        Ok(self.len)
    }

    fn set_len(&mut self, new_len: u64) -> StorageResult<()> {
        let len = self.len;
        if new_len > len {
            return Err(StorageError::PositionPastEnd { pos: new_len, len });
        }

        self.file()?.set_len(new_len)?;
        self.len = new_len;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.lob");

        let file = FileLob::open(&path).unwrap();
        assert_eq!(file.len().unwrap(), 0);
        assert!(path.exists());
        assert!(!file.is_temporary());
    }

    #[test]
    fn file_write_and_read() {
        let dir = tempdir().unwrap();
        let mut file = FileLob::open(&dir.path().join("test.lob")).unwrap();

        file.write_at(0, b"hello").unwrap();
        file.write_at(5, b" world").unwrap();
        assert_eq!(file.len().unwrap(), 11);

        let mut buf = [0u8; 11];
        assert_eq!(file.read_at(0, &mut buf).unwrap(), 11);
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn file_overwrite_in_place() {
        let dir = tempdir().unwrap();
        let mut file = FileLob::open(&dir.path().join("test.lob")).unwrap();

        file.write_at(0, b"hello world").unwrap();
        file.write_at(6, b"WORLD").unwrap();
        assert_eq!(file.len().unwrap(), 11);

        let mut buf = [0u8; 11];
        file.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello WORLD");
    }

    #[test]
    fn file_short_read_at_tail() {
        let dir = tempdir().unwrap();
        let mut file = FileLob::open(&dir.path().join("test.lob")).unwrap();
        file.write_at(0, b"hello").unwrap();

        let mut buf = [0u8; 10];
        assert_eq!(file.read_at(3, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(file.read_at(5, &mut buf).unwrap(), 0);
    }

    #[test]
    fn file_positions_past_end_fail() {
        let dir = tempdir().unwrap();
        let mut file = FileLob::open(&dir.path().join("test.lob")).unwrap();
        file.write_at(0, b"hello").unwrap();

        let mut buf = [0u8; 1];
        assert!(matches!(
            file.read_at(6, &mut buf),
            Err(StorageError::PositionPastEnd { pos: 6, len: 5 })
        ));
        assert!(file.write_at(7, b"x").is_err());
        assert!(file.set_len(6).is_err());
    }

    #[test]
    fn file_set_len_shrinks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.lob");
        let mut file = FileLob::open(&path).unwrap();
        file.write_at(0, b"hello world").unwrap();

        file.set_len(5).unwrap();
        assert_eq!(file.len().unwrap(), 5);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 5);
    }

    #[test]
    fn file_temp_deleted_on_drop() {
        let dir = tempdir().unwrap();
        let temp = NamedTempFile::new_in(dir.path()).unwrap();
        let file = FileLob::from_temp(temp).unwrap();
        let path = file.path().to_path_buf();

        assert!(file.is_temporary());
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn file_closed_operations_fail() {
        let dir = tempdir().unwrap();
        let mut file = FileLob::open(&dir.path().join("test.lob")).unwrap();
        file.write_at(0, b"data").unwrap();

        file.close().unwrap();
        file.close().unwrap();
        assert!(matches!(file.len(), Err(StorageError::Closed)));
        assert!(matches!(file.write_at(0, b"x"), Err(StorageError::Closed)));
    }
}
