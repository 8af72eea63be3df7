//! Transactional add: append one new table to the stack.
//!
//! The whole transaction runs under the manifest lock. The caller supplies
//! a write callback that populates a fresh [`TableWriter`] over a
//! temporary file; the table only becomes live when the staged manifest is
//! renamed into place. Aborting is cheap — returning an error from the
//! callback drops the temporary file and the lock, leaving the stack
//! untouched.

use std::fs;

use tempfile::NamedTempFile;
use tracing::debug;

use table::TableWriter;

use crate::error::{Error, Result};
use crate::lock::LockFile;
use crate::manifest::{names_payload, table_name, table_stem};
use crate::Stack;

impl Stack {
    /// Adds a new table to the stack, transactionally.
    ///
    /// The callback receives a writer positioned at the next update index
    /// of this stack; it must call
    /// [`set_limits`](TableWriter::set_limits) with at least
    /// [`next_update_index`](Stack::next_update_index) before adding
    /// records, or the transaction is rejected as stale.
    ///
    /// After a successful install the stack reloads and then
    /// auto-compacts. On [`Error::LockFailure`] the stack reloads (best
    /// effort) before returning, so a retry runs against fresh state.
    pub fn add<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut TableWriter) -> Result<()>,
    {
        match self.try_add(write) {
            Ok(()) => self.auto_compact(),
            Err(Error::LockFailure) => {
                let _ = self.reload();
                Err(Error::LockFailure)
            }
            Err(e) => Err(e),
        }
    }

    fn try_add<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut TableWriter) -> Result<()>,
    {
        let lock = match LockFile::acquire(self.list_lock_path())? {
            Some(lock) => lock,
            None => {
                debug!("manifest lock held by another writer");
                return Err(Error::LockFailure);
            }
        };

        if !self.up_to_date()? {
            return Err(Error::LockFailure);
        }

        let next = self.next_update_index();
        let tmp = self.new_table_tempfile(next, next)?;

        let mut writer = TableWriter::new(tmp.as_file().try_clone()?, &self.config)?;
        write(&mut writer)?;

        let (min, max) = (writer.min_update_index(), writer.max_update_index());
        writer.finish()?;

        if min < next {
            // The callback wrote a stale update range.
            return Err(Error::LockFailure);
        }

        let final_name = table_name(min, max);
        let dest = self.table_path(&final_name);
        tmp.persist(&dest).map_err(|e| Error::Io(e.error))?;

        let mut names: Vec<String> = self.readers.iter().map(|r| r.name().to_string()).collect();
        names.push(final_name);

        // The table is on disk under its final name; from here on, any
        // failure before the manifest rename must take it back out.
        if let Err(e) = self.publish_names(lock, &names) {
            let _ = fs::remove_file(&dest);
            return Err(e);
        }

        self.reload()
    }

    /// Creates an in-flight temporary in the reftable directory, named
    /// `<min>-<max>_<random>.ref`. Dropping it unlinks the file, which is
    /// what cleans up every abort path.
    pub(crate) fn new_table_tempfile(&self, min: u64, max: u64) -> Result<NamedTempFile> {
        let tmp = tempfile::Builder::new()
            .prefix(&format!("{}_", table_stem(min, max)))
            .suffix(".ref")
            .tempfile_in(&self.dir)?;
        Ok(tmp)
    }

    /// Stages `names` in the held manifest lock and renames it over the
    /// manifest path — the linearisation point of every mutation.
    pub(crate) fn publish_names(&self, mut lock: LockFile, names: &[String]) -> Result<()> {
        lock.write_all(names_payload(names).as_bytes())?;
        if self.config.sync {
            lock.sync()?;
        }
        lock.persist(&self.list_path)?;
        Ok(())
    }
}
