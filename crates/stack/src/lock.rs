use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// An exclusively-created lock file, removed again when the guard drops.
///
/// Lock files are both mutual-exclusion primitives and intent markers:
/// their presence tells other writers that a manifest update or a
/// compaction of a specific table is in progress. Acquisition uses
/// `create_new` (O_EXCL|O_CREAT), so exactly one writer can hold a given
/// lock at a time — across processes, not just threads.
///
/// The manifest lock doubles as the staging file for the next manifest:
/// the new name list is written into it and the lock is then renamed over
/// the manifest path via [`persist`](LockFile::persist), which is the one
/// way a lock file survives its guard.
pub(crate) struct LockFile {
    path: PathBuf,
    file: Option<File>,
    armed: bool,
}

impl LockFile {
    /// Attempts to create `path` exclusively.
    ///
    /// Returns `Ok(None)` if the lock is already held (the file exists);
    /// any other failure is an I/O error.
    pub fn acquire(path: PathBuf) -> io::Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => Ok(Some(Self {
                path,
                file: Some(file),
                armed: true,
            })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Writes `buf` into the lock file (used to stage manifest content).
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.write_all(buf),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "lock file already closed",
            )),
        }
    }

    /// Fsyncs the staged content.
    pub fn sync(&mut self) -> io::Result<()> {
        match self.file.as_ref() {
            Some(f) => f.sync_all(),
            None => Ok(()),
        }
    }

    /// Closes the handle and renames the lock file over `dest`.
    ///
    /// On success the file now *is* `dest` and nothing is removed. If the
    /// rename fails, the drop handler still removes the lock file.
    pub fn persist(mut self, dest: &Path) -> io::Result<()> {
        drop(self.file.take());
        fs::rename(&self.path, dest)?;
        self.armed = false;
        Ok(())
    }

    /// Removes the lock file now, releasing the lock early.
    pub fn release(mut self) -> io::Result<()> {
        drop(self.file.take());
        self.armed = false;
        fs::remove_file(&self.path)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.armed {
            drop(self.file.take());
            let _ = fs::remove_file(&self.path);
        }
    }
}
