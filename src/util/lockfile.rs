//! RAII lock-file guard implementing git's lock-then-rename write protocol.
//!
//! Grounded on the grounding repository's `git-utils::lockfile`, trimmed to
//! the errors this crate actually raises (no subprocess/date/path variants).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Errors raised while acquiring or committing a lock file.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("ref is already locked: {path}")]
    AlreadyLocked { path: PathBuf },

    #[error("failed to create lock file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to commit lock file {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Holds `<path>.lock` open for writing until committed or dropped.
///
/// Protocol: create `<path>.lock` with `O_CREAT|O_EXCL`, write the new
/// content, then rename it onto `path` on commit. Dropping without
/// committing removes the lock file, leaving the target untouched.
pub struct LockFile {
    path: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

const LOCK_SUFFIX: &str = ".lock";

impl LockFile {
    /// Acquire a lock on `path`, failing if another lock is already held.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let lock_path = PathBuf::from(format!("{}{}", path.display(), LOCK_SUFFIX));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    LockError::AlreadyLocked {
                        path: lock_path.clone(),
                    }
                } else {
                    LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    }
                }
            })?;

        Ok(Self {
            path,
            lock_path,
            file: Some(file),
            committed: false,
        })
    }

    /// Like [`acquire`](Self::acquire), but returns `Ok(None)` instead of an
    /// error when the lock is already held.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>, LockError> {
        match Self::acquire(path) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::AlreadyLocked { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn file_mut(&mut self) -> Option<&mut File> {
        self.file.as_mut()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, fsync, and atomically rename the lock file onto the target.
    pub fn commit(mut self) -> Result<(), LockError> {
        if let Some(ref mut file) = self.file {
            file.flush().map_err(|e| LockError::Commit {
                path: self.lock_path.clone(),
                source: e,
            })?;
            file.sync_all().map_err(|e| LockError::Commit {
                path: self.lock_path.clone(),
                source: e,
            })?;
        }
        self.file.take();

        fs::rename(&self.lock_path, &self.path).map_err(|e| LockError::Commit {
            path: self.lock_path.clone(),
            source: e,
        })?;

        self.committed = true;
        Ok(())
    }

    /// Discard the lock file without touching the target.
    pub fn rollback(mut self) -> Result<(), LockError> {
        self.file.take();
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).map_err(|e| LockError::Commit {
                path: self.lock_path.clone(),
                source: e,
            })?;
        }
        self.committed = true;
        Ok(())
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("test.txt");
        fs::write(&target, b"old content").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        assert!(lock.lock_path().exists());
        lock.write_all(b"new content").unwrap();
        lock.commit().unwrap();

        assert!(!dir.path().join("test.txt.lock").exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "new content");
    }

    #[test]
    fn acquire_and_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("test.txt");
        fs::write(&target, b"original").unwrap();

        {
            let mut lock = LockFile::acquire(&target).unwrap();
            lock.write_all(b"should not persist").unwrap();
            lock.rollback().unwrap();
        }

        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(!dir.path().join("test.txt.lock").exists());
    }

    #[test]
    fn drop_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("test.txt");
        fs::write(&target, b"original").unwrap();

        {
            let mut lock = LockFile::acquire(&target).unwrap();
            lock.write_all(b"dropped content").unwrap();
        }

        assert!(!dir.path().join("test.txt.lock").exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
    }

    #[test]
    fn double_lock_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("test.txt");
        fs::write(&target, b"content").unwrap();

        let _lock1 = LockFile::acquire(&target).unwrap();
        match LockFile::acquire(&target) {
            Err(LockError::AlreadyLocked { .. }) => {}
            other => panic!("expected AlreadyLocked, got {other:?}"),
        }
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("test.txt");
        fs::write(&target, b"content").unwrap();

        let _lock1 = LockFile::acquire(&target).unwrap();
        assert!(LockFile::try_acquire(&target).unwrap().is_none());
    }

    #[test]
    fn lock_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("new_file.txt");

        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"created via lock").unwrap();
        lock.commit().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "created via lock");
    }
}
