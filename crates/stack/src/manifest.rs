//! Manifest reads and table-name formatting.
//!
//! The manifest is a plain text file: the ordered list of live table
//! filenames, one per line, oldest first. It is the *only* source of truth
//! for which tables are live — table files not mentioned in it are either
//! in-flight temporaries or orphans awaiting deletion.
//!
//! The manifest is never edited in place. A new version is staged in the
//! manifest lock file and renamed over the old one (see [`crate::write`]
//! and [`crate::compaction`]), so concurrent readers observe either the
//! old or the new list, never a partial one.

use std::fs;
use std::io;

use crate::error::Result;
use crate::Stack;

/// Formats the stem of a table name covering `[min, max]`:
/// twelve lower-case hex digits for each bound.
pub(crate) fn table_stem(min: u64, max: u64) -> String {
    format!("{:012x}-{:012x}", min, max)
}

/// Formats the final file name of a table covering `[min, max]`.
pub(crate) fn table_name(min: u64, max: u64) -> String {
    format!("{}.ref", table_stem(min, max))
}

/// Serializes a name list into manifest file content.
pub(crate) fn names_payload(names: &[String]) -> String {
    let mut payload = names.join("\n");
    payload.push('\n');
    payload
}

impl Stack {
    /// Reads the ordered table-name list from the manifest.
    ///
    /// A missing manifest file is an empty stack, not an error. Empty
    /// lines are ignored, so a trailing newline is harmless.
    pub(crate) fn read_names(&self) -> Result<Vec<String>> {
        let content = match fs::read_to_string(&self.list_path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Checks whether the in-memory readers still match the manifest.
    ///
    /// Compares count and position-wise names. Mutations run this after
    /// taking the manifest lock; a mismatch means another process has
    /// published a manifest this instance has not reloaded yet.
    pub fn up_to_date(&self) -> Result<bool> {
        let names = self.read_names()?;
        if names.len() != self.readers.len() {
            return Ok(false);
        }
        for (reader, name) in self.readers.iter().zip(&names) {
            if reader.name() != name {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn list_lock_path(&self) -> std::path::PathBuf {
        let mut path = self.list_path.clone().into_os_string();
        path.push(".lock");
        path.into()
    }

    pub(crate) fn table_lock_path(&self, name: &str) -> std::path::PathBuf {
        let mut path = self.table_path(name).into_os_string();
        path.push(".lock");
        path.into()
    }
}
