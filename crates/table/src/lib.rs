//! # Table - Immutable Reftable Files
//!
//! On-disk storage files for the reftable stack. A table maps reference
//! names to values and carries a log of historical reference updates,
//! covering a contiguous range of update indices. Tables are *write-once,
//! read-many* — once created they are never modified (only replaced during
//! compaction).
//!
//! ## File layout (v1 – current)
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER (always first 24 bytes)                                 │
//! │                                                               │
//! │ magic (u32 LE) "RFT1" | version (u32 LE)                       │
//! │ min_update_index (u64 LE) | max_update_index (u64 LE)          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ REF SECTION (records sorted by name, ascending)                │
//! │                                                               │
//! │ crc32 (u32) | name_len (u16) | name | update_index (u64)       │
//! │ present (u8) | [val_len (u32) | value]                         │
//! │                                                               │
//! │ ... repeated for each ref ...                                  │
//! │                                                               │
//! │ The CRC32 covers everything after itself in the               │
//! │ record. This detects silent disk corruption on reads.          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ LOG SECTION (sorted by name asc, update_index desc)            │
//! │                                                               │
//! │ crc32 (u32) | name_len (u16) | name | update_index (u64)       │
//! │ old_len (u32) | old_id | new_len (u32) | new_id                │
//! │ msg_len (u32) | message | time (u64)                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │ REF INDEX (name -> data_offset mapping)                        │
//! │                                                               │
//! │ name_len (u16) | name | offset (u64)                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │ LOG INDEX ((name, update_index) -> data_offset mapping)        │
//! │                                                               │
//! │ name_len (u16) | name | update_index (u64) | offset (u64)      │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 28 bytes)                                  │
//! │                                                               │
//! │ ref_index_offset (u64 LE) | log_index_offset (u64 LE)          │
//! │ log_count (u64 LE) | magic (u32 LE) "RFT1"                     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The magic value `0x5246_5431` ("RFT1")
//! appears in both header and footer so that truncated files are rejected
//! from either end.
//!
//! ## Update indices
//!
//! Every record carries the update index of the transaction that wrote it.
//! A table covers the closed interval `[min_update_index, max_update_index]`
//! declared in its header; a writer rejects records outside its limits.
//! Shadowing between tables is resolved by the [`MergedTables`] view.

mod config;
mod error;
mod format;
mod merge;
mod reader;
mod record;
mod writer;

pub use config::Config;
pub use error::{Result, TableError};
pub use format::{FOOTER_BYTES, HEADER_BYTES, TABLE_FRAMING_BYTES, TABLE_MAGIC};
pub use merge::{MergedLogIter, MergedRefIter, MergedTables};
pub use reader::TableReader;
pub use record::{LogRecord, RefRecord};
pub use writer::TableWriter;

#[cfg(test)]
mod tests;
