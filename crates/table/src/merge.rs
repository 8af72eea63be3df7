//! Merged view over an ordered set of [`TableReader`]s.
//!
//! Presents the stack of tables (oldest first) as one logical table.
//! Iteration yields records in key order; when the same key appears in
//! multiple tables, only the record from the newest containing table is
//! emitted (the newer table shadows the older ones).
//!
//! This is the core primitive for both reads and compaction: walk N input
//! tables in sorted order, resolve shadowing, and either answer a lookup or
//! write the result to a new table.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::error::{Result, TableError};
use crate::reader::TableReader;
use crate::record::{LogRecord, RefRecord};

/// A pending ref name from one table source, used for heap-based merge
/// ordering.
///
/// Only the `name` and `source` are stored — the actual [`RefRecord`] is
/// read lazily from disk when the name reaches the top of the heap. This
/// keeps heap entries lightweight.
struct RefHeapEntry {
    name: String,
    /// Index into the `readers` / `key_iters` arrays.
    source: usize,
}

impl PartialEq for RefHeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.source == other.source
    }
}

impl Eq for RefHeapEntry {}

impl PartialOrd for RefHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RefHeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the *smallest* name first,
        // so reverse the name comparison. On tie, prefer the entry from
        // the source with the lower index (arbitrary but deterministic).
        other
            .name
            .cmp(&self.name)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// A pending log key from one table source. Log order is `name asc`,
/// `update_index desc` within a name.
struct LogHeapEntry {
    name: String,
    update_index: u64,
    source: usize,
}

impl PartialEq for LogHeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.update_index == other.update_index
            && self.source == other.source
    }
}

impl Eq for LogHeapEntry {}

impl PartialOrd for LogHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogHeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .name
            .cmp(&self.name)
            .then_with(|| self.update_index.cmp(&other.update_index))
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// A merged, logically single table over an ordered stack of tables.
///
/// Tables are ordered oldest first; higher indices shadow lower ones.
/// The view holds `Arc`s to the readers, so it stays valid while the
/// stack that produced it reloads.
pub struct MergedTables {
    readers: Vec<Arc<TableReader>>,
}

impl MergedTables {
    /// Creates a merged view over `readers`, ordered oldest first.
    #[must_use]
    pub fn new(readers: Vec<Arc<TableReader>>) -> Self {
        Self { readers }
    }

    /// The tables backing this view, oldest first.
    #[must_use]
    pub fn readers(&self) -> &[Arc<TableReader>] {
        &self.readers
    }

    /// Positions a ref iteration at the first name `>= start` and walks
    /// forward in ascending name order, resolving shadowing.
    ///
    /// Deletion tombstones are yielded like any other record; use
    /// [`read_ref`](MergedTables::read_ref) for lookups that should treat
    /// them as absence.
    #[must_use]
    pub fn seek_ref(&self, start: &str) -> MergedRefIter<'_> {
        let mut key_iters = Vec::with_capacity(self.readers.len());
        let mut heap = BinaryHeap::new();
        for (i, reader) in self.readers.iter().enumerate() {
            let mut iter = reader.ref_names_from(start).into_iter();
            if let Some(name) = iter.next() {
                heap.push(RefHeapEntry { name, source: i });
            }
            key_iters.push(iter);
        }
        MergedRefIter {
            readers: &self.readers,
            key_iters,
            heap,
        }
    }

    /// Positions a log iteration at the first key
    /// `>= (start, update_index desc)` and walks forward in log order,
    /// resolving shadowing of identical `(name, update_index)` keys.
    ///
    /// `max_update_index` is part of the seek position: entries of `start`
    /// newer than it are skipped, while later names yield all their
    /// entries.
    #[must_use]
    pub fn seek_log(&self, start: &str, max_update_index: u64) -> MergedLogIter<'_> {
        let mut key_iters = Vec::with_capacity(self.readers.len());
        let mut heap = BinaryHeap::new();
        for (i, reader) in self.readers.iter().enumerate() {
            let mut iter = reader.log_keys_from(start, max_update_index).into_iter();
            if let Some((name, update_index)) = iter.next() {
                heap.push(LogHeapEntry {
                    name,
                    update_index,
                    source: i,
                });
            }
            key_iters.push(iter);
        }
        MergedLogIter {
            readers: &self.readers,
            key_iters,
            heap,
        }
    }

    /// Resolves the current value of one reference across the stack.
    ///
    /// Returns `Ok(None)` if the name is unknown or its newest record is a
    /// deletion tombstone.
    pub fn read_ref(&self, name: &str) -> Result<Option<RefRecord>> {
        let mut iter = self.seek_ref(name);
        match iter.next_ref()? {
            Some(rec) if rec.name == name && !rec.is_deletion() => Ok(Some(rec)),
            _ => Ok(None),
        }
    }
}

impl std::fmt::Debug for MergedTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedTables")
            .field("tables", &self.readers.len())
            .finish()
    }
}

/// Merged iteration over ref records, in ascending name order.
pub struct MergedRefIter<'a> {
    readers: &'a [Arc<TableReader>],
    /// Per-reader: sorted names remaining to be yielded.
    key_iters: Vec<std::vec::IntoIter<String>>,
    heap: BinaryHeap<RefHeapEntry>,
}

impl MergedRefIter<'_> {
    /// Returns the next ref record in name order, or `None` when all
    /// sources are exhausted.
    ///
    /// Duplicate names (same name in multiple tables) are resolved by
    /// keeping only the record from the newest table.
    pub fn next_ref(&mut self) -> Result<Option<RefRecord>> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };
        self.advance(top.source);

        // Drain all heap entries with the same name; the newest table
        // (highest source index) shadows the rest.
        let mut best_source = top.source;
        loop {
            let same = match self.heap.peek() {
                Some(peek) => peek.name == top.name,
                None => false,
            };
            if !same {
                break;
            }
            if let Some(dup) = self.heap.pop() {
                self.advance(dup.source);
                if dup.source > best_source {
                    best_source = dup.source;
                }
            }
        }

        match self.readers[best_source].ref_record(&top.name)? {
            Some(rec) => Ok(Some(rec)),
            None => Err(TableError::Corrupt(format!(
                "ref index lists {:?} but the record is missing",
                top.name
            ))),
        }
    }

    fn advance(&mut self, source: usize) {
        if let Some(name) = self.key_iters[source].next() {
            self.heap.push(RefHeapEntry { name, source });
        }
    }
}

/// Merged iteration over log records, in `(name asc, update_index desc)`
/// order.
pub struct MergedLogIter<'a> {
    readers: &'a [Arc<TableReader>],
    key_iters: Vec<std::vec::IntoIter<(String, u64)>>,
    heap: BinaryHeap<LogHeapEntry>,
}

impl MergedLogIter<'_> {
    /// Returns the next log record in log order, or `None` when all
    /// sources are exhausted.
    ///
    /// An identical `(name, update_index)` key in multiple tables is
    /// resolved by keeping only the record from the newest table.
    pub fn next_log(&mut self) -> Result<Option<LogRecord>> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };
        self.advance(top.source);

        let mut best_source = top.source;
        loop {
            let same = match self.heap.peek() {
                Some(peek) => peek.name == top.name && peek.update_index == top.update_index,
                None => false,
            };
            if !same {
                break;
            }
            if let Some(dup) = self.heap.pop() {
                self.advance(dup.source);
                if dup.source > best_source {
                    best_source = dup.source;
                }
            }
        }

        match self.readers[best_source].log_record(&top.name, top.update_index)? {
            Some(rec) => Ok(Some(rec)),
            None => Err(TableError::Corrupt(format!(
                "log index lists {:?}@{} but the record is missing",
                top.name, top.update_index
            ))),
        }
    }

    fn advance(&mut self, source: usize) {
        if let Some((name, update_index)) = self.key_iters[source].next() {
            self.heap.push(LogHeapEntry {
                name,
                update_index,
                source,
            });
        }
    }
}
