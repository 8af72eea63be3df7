//! Reader reuse and the deadline/back-off reload loop.
//!
//! Every successful mutation ends with a reload rather than an in-place
//! edit of the reader list, because an external compaction may have
//! renamed manifest and table files during the mutation window. The same
//! loop also absorbs the race where a table vanishes between reading the
//! manifest and opening the file: if the name list has changed since, the
//! open is retried with randomised exponential back-off until a deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use table::{MergedTables, TableReader};
use tracing::debug;

use crate::error::Result;
use crate::Stack;

/// How long a reload keeps retrying when tables keep vanishing under it.
const RELOAD_DEADLINE: Duration = Duration::from_millis(2500);

/// Upper bound on one back-off sleep; the doubling stops here.
const MAX_BACKOFF_MS: u64 = 100;

impl Stack {
    /// Builds a new reader list for `names`, reusing currently-open
    /// readers where the name matches and opening the rest.
    ///
    /// On any open error the freshly-opened readers are dropped (closing
    /// them) and the existing list is left untouched. On success the lists
    /// are swapped and readers whose names dropped out of the manifest are
    /// closed.
    fn reload_once(&mut self, names: &[String]) -> Result<()> {
        let mut current: HashMap<&str, &Arc<TableReader>> =
            self.readers.iter().map(|r| (r.name(), r)).collect();

        let mut new_tables = Vec::with_capacity(names.len());
        for name in names {
            match current.remove(name.as_str()) {
                Some(reader) => new_tables.push(Arc::clone(reader)),
                None => {
                    let reader = TableReader::open(self.table_path(name))?;
                    new_tables.push(Arc::new(reader));
                }
            }
        }

        // Success. Swap; readers no longer referenced close on drop.
        drop(current);
        self.readers = new_tables;
        Ok(())
    }

    /// Re-reads the manifest and synchronises the in-memory state with it,
    /// then rebuilds the merged view.
    ///
    /// A table that is listed but missing on disk is retried under the
    /// deadline as long as the manifest keeps changing (an external
    /// compaction is renaming files); if the name list is stable, the
    /// not-found error is real and is surfaced.
    pub fn reload(&mut self) -> Result<()> {
        let deadline = Instant::now() + RELOAD_DEADLINE;
        let mut backoff_ms: u64 = 1;
        loop {
            let names = self.read_names()?;
            match self.reload_once(&names) {
                Ok(()) => break,
                Err(e) if e.is_not_found() => {
                    let after = self.read_names()?;
                    if after == names {
                        // The manifest is stable, so the table is truly gone.
                        return Err(e);
                    }
                    if Instant::now() >= deadline {
                        return Err(e);
                    }
                    let sleep_ms = rand::thread_rng().gen_range(1..=backoff_ms);
                    debug!(
                        backoff_ms = sleep_ms,
                        "table vanished mid-reload; manifest changed, retrying"
                    );
                    thread::sleep(Duration::from_millis(sleep_ms));
                    backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                }
                Err(e) => return Err(e),
            }
        }

        self.merged = MergedTables::new(self.readers.clone());
        Ok(())
    }
}
