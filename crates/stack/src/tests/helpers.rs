use std::fs;
use std::path::{Path, PathBuf};

use table::{Config, LogRecord, RefRecord};

use crate::{Result, Stack};

/// Opens a stack under `root` with fsync disabled (tests only care about
/// the protocol, not durability).
pub fn open_stack(root: &Path) -> Result<Stack> {
    let dir = tables_dir(root);
    fs::create_dir_all(&dir)?;
    Stack::open(dir, list_path(root), Config { sync: false })
}

pub fn tables_dir(root: &Path) -> PathBuf {
    root.join("reftables")
}

pub fn list_path(root: &Path) -> PathBuf {
    root.join("tables.list")
}

/// One transaction setting `name` to `value`.
pub fn put_ref(stack: &mut Stack, name: &str, value: &[u8]) -> Result<()> {
    let next = stack.next_update_index();
    let rec = RefRecord {
        name: name.to_string(),
        update_index: next,
        value: Some(value.to_vec()),
    };
    stack.add(move |w| {
        w.set_limits(next, next)?;
        w.add_ref(&rec)?;
        Ok(())
    })
}

/// One transaction deleting `name` (writes a tombstone).
pub fn delete_ref(stack: &mut Stack, name: &str) -> Result<()> {
    let next = stack.next_update_index();
    let rec = RefRecord {
        name: name.to_string(),
        update_index: next,
        value: None,
    };
    stack.add(move |w| {
        w.set_limits(next, next)?;
        w.add_ref(&rec)?;
        Ok(())
    })
}

/// One transaction setting `name` to `value` together with a log entry.
pub fn put_ref_logged(stack: &mut Stack, name: &str, value: &[u8], message: &str) -> Result<()> {
    let next = stack.next_update_index();
    let ref_rec = RefRecord {
        name: name.to_string(),
        update_index: next,
        value: Some(value.to_vec()),
    };
    let log_rec = LogRecord {
        name: name.to_string(),
        update_index: next,
        old_id: Vec::new(),
        new_id: value.to_vec(),
        message: message.to_string(),
        time: 1_700_000_000,
    };
    stack.add(move |w| {
        w.set_limits(next, next)?;
        w.add_ref(&ref_rec)?;
        w.add_log(&log_rec)?;
        Ok(())
    })
}

/// The resolved, live references: tombstones filtered out.
pub fn live_refs(stack: &Stack) -> Result<Vec<(String, Vec<u8>)>> {
    let mut iter = stack.merged().seek_ref("");
    let mut out = Vec::new();
    while let Some(rec) = iter.next_ref()? {
        if let Some(value) = rec.value {
            out.push((rec.name, value));
        }
    }
    Ok(out)
}

/// Every ref record the merged view yields, tombstones included.
pub fn all_ref_records(stack: &Stack) -> Result<Vec<RefRecord>> {
    let mut iter = stack.merged().seek_ref("");
    let mut out = Vec::new();
    while let Some(rec) = iter.next_ref()? {
        out.push(rec);
    }
    Ok(out)
}

/// Every log record the merged view yields.
pub fn all_log_records(stack: &Stack) -> Result<Vec<LogRecord>> {
    let mut iter = stack.merged().seek_log("", u64::MAX);
    let mut out = Vec::new();
    while let Some(rec) = iter.next_log()? {
        out.push(rec);
    }
    Ok(out)
}

/// Final table files in `dir` (name contains no `_`), sorted.
pub fn ref_files(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(".ref") && !name.contains('_'))
        .collect();
    out.sort();
    out
}

/// Leftover lock files and in-flight temporaries — must be empty after
/// every completed or failed operation.
pub fn junk_files(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(".lock") || (name.ends_with(".ref") && name.contains('_')))
        .collect();
    out.sort();
    out
}
