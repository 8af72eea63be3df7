//! Compaction: fuse a contiguous range of tables into one.
//!
//! A compaction takes the manifest lock only for its two short windows
//! (the up-to-date check and the final install); the long merge phase runs
//! under per-table locks instead, so new tables can still be added while
//! it is in flight. The merged result is written to a temporary file,
//! renamed into place, published via the manifest rename, and only then
//! are the input tables deleted.

use std::fs;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use table::{MergedTables, TableWriter, TABLE_FRAMING_BYTES};

use crate::error::Result;
use crate::lock::LockFile;
use crate::manifest::table_name;
use crate::segment::suggest_compaction_segment;
use crate::Stack;

impl Stack {
    /// Compacts the entire stack into a single table.
    pub fn compact_all(&mut self) -> Result<()> {
        let n = self.readers.len();
        if n == 0 {
            return Ok(());
        }
        self.compact_range(0, n - 1)?;
        Ok(())
    }

    /// Runs one compaction if a size tier looks imbalanced.
    ///
    /// Selection is size-tiered (see [`crate::segment`]); if the stack is
    /// balanced this is a no-op and no attempt is recorded. Contention is
    /// absorbed silently — the next mutation will try again.
    pub fn auto_compact(&mut self) -> Result<()> {
        let sizes = self.table_sizes_for_compaction();
        if let Some(seg) = suggest_compaction_segment(&sizes) {
            debug!(
                start = seg.start,
                end = seg.end,
                bytes = seg.bytes,
                "auto-compacting imbalanced tier"
            );
            self.compact_range_stats(seg.start, seg.end - 1)?;
        }
        Ok(())
    }

    /// Rewrites tables `[first, last]` (inclusive indices into the stack)
    /// as one compacted table and swaps it into the manifest.
    ///
    /// Returns `Ok(false)` if some lock was contended or the in-memory
    /// state was stale — the stack is unchanged and the caller may retry
    /// later. `Ok(true)` means the range was compacted (or was empty).
    pub fn compact_range(&mut self, first: usize, last: usize) -> Result<bool> {
        if first >= last {
            return Ok(true); // nothing to fuse
        }
        self.stats.attempts += 1;

        // Short window one: manifest lock, staleness check, table locks.
        let list_lock = match LockFile::acquire(self.list_lock_path())? {
            Some(lock) => lock,
            None => {
                debug!("manifest lock contended; compaction backing off");
                return Ok(false);
            }
        };
        if !self.up_to_date()? {
            return Ok(false);
        }

        let mut table_locks = Vec::with_capacity(last - first + 1);
        let mut delete_on_success = Vec::with_capacity(last - first + 1);
        for reader in &self.readers[first..=last] {
            match LockFile::acquire(self.table_lock_path(reader.name()))? {
                Some(lock) => {
                    table_locks.push(lock);
                    delete_on_success.push(self.table_path(reader.name()));
                }
                None => {
                    debug!(table = reader.name(), "table locked; compaction backing off");
                    return Ok(false);
                }
            }
        }

        // Long phase: release the manifest lock so writers can keep adding
        // tables above us while we merge; the per-table locks keep other
        // compactions off this range.
        list_lock.release()?;
        let (tmp, min, max, out_bytes) = self.compact_locked(first, last)?;

        // Short window two: re-acquire and install.
        let list_lock = match LockFile::acquire(self.list_lock_path())? {
            Some(lock) => lock,
            None => return Ok(false),
        };

        let final_name = table_name(min, max);
        let dest = self.table_path(&final_name);
        tmp.persist(&dest).map_err(|e| crate::Error::Io(e.error))?;

        let mut names: Vec<String> = Vec::with_capacity(self.readers.len() - (last - first));
        names.extend(self.readers[..first].iter().map(|r| r.name().to_string()));
        names.push(final_name.clone());
        names.extend(self.readers[last + 1..].iter().map(|r| r.name().to_string()));

        if let Err(e) = self.publish_names(list_lock, &names) {
            let _ = fs::remove_file(&dest);
            return Err(e);
        }

        // The manifest no longer references the inputs; take them out.
        // Their lock files go with them when `table_locks` drops.
        for path in &delete_on_success {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), "failed to delete compacted table: {e}");
            }
        }

        self.stats.bytes += out_bytes;
        info!(
            tables = last - first + 1,
            output = %final_name,
            bytes = out_bytes,
            "compacted table range"
        );

        self.reload()?;
        Ok(true)
    }

    /// Stats-tracking wrapper used by auto-compaction: any outcome other
    /// than a completed compaction counts as a failure.
    pub(crate) fn compact_range_stats(&mut self, first: usize, last: usize) -> Result<bool> {
        let result = self.compact_range(first, last);
        if !matches!(result, Ok(true)) {
            self.stats.failures += 1;
        }
        result
    }

    /// Merges `readers[first..=last]` into a temporary table, returning
    /// the temp file, the covered update-index range, and the output size.
    ///
    /// Caller must hold the per-table locks for the whole range.
    fn compact_locked(
        &self,
        first: usize,
        last: usize,
    ) -> Result<(NamedTempFile, u64, u64, u64)> {
        let min = self.readers[first].min_update_index();
        let max = self.readers[last].max_update_index();

        let tmp = self.new_table_tempfile(min, max)?;
        let mut writer = TableWriter::new(tmp.as_file().try_clone()?, &self.config)?;
        writer.set_limits(min, max)?;
        self.write_compact(&mut writer, first, last)?;
        writer.finish()?;

        let out_bytes = tmp.as_file().metadata()?.len();
        Ok((tmp, min, max, out_bytes))
    }

    fn write_compact(&self, writer: &mut TableWriter, first: usize, last: usize) -> Result<()> {
        let merged = MergedTables::new(self.readers[first..=last].to_vec());

        let mut refs = merged.seek_ref("");
        while let Some(rec) = refs.next_ref()? {
            // At the bottom of the stack a tombstone has nothing left to
            // shadow; anywhere else it must keep shadowing the tables
            // below the compacted range.
            if first == 0 && rec.is_deletion() {
                continue;
            }
            writer.add_ref(&rec)?;
        }

        let mut logs = merged.seek_log("", u64::MAX);
        while let Some(rec) = logs.next_log()? {
            writer.add_log(&rec)?;
        }
        Ok(())
    }

    /// Table sizes with the fixed per-file framing subtracted, clamped to
    /// at least one byte so empty tables still land in the lowest tier.
    fn table_sizes_for_compaction(&self) -> Vec<u64> {
        self.readers
            .iter()
            .map(|r| r.size().saturating_sub(TABLE_FRAMING_BYTES).max(1))
            .collect()
    }
}
