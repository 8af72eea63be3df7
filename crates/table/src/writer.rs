use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use crate::config::Config;
use crate::error::{Result, TableError};
use crate::format;
use crate::record::{LogRecord, RefRecord};

/// Writes one table file incrementally.
///
/// Records are streamed to disk as they are added; only the two indices are
/// kept in memory while writing. [`finish`](TableWriter::finish) writes the
/// indices and footer, then rewrites the header with the final update-index
/// limits.
///
/// # Record order
///
/// The file format requires refs sorted ascending by name (one record per
/// name) followed by logs sorted by `(name asc, update_index desc)`. The
/// writer rejects out-of-order records instead of sorting for the caller.
///
/// # Limits
///
/// [`set_limits`](TableWriter::set_limits) declares the update-index range
/// the table will cover; it must be called before any record is added, and
/// every record must fall inside it. Without declared limits, the covered
/// range is whatever the records actually span — the stack uses the reported
/// [`min_update_index`](TableWriter::min_update_index) to detect writers
/// that produced a stale range.
pub struct TableWriter {
    file: File,
    sync: bool,
    limits: Option<(u64, u64)>,
    /// Smallest update index seen so far; `u64::MAX` until the first record.
    min_seen: u64,
    max_seen: u64,
    last_ref: Option<String>,
    last_log: Option<(String, u64)>,
    /// In-memory ref index: (name, data offset).
    ref_index: Vec<(String, u64)>,
    /// In-memory log index: (name, update index, data offset).
    log_index: Vec<(String, u64, u64)>,
}

impl TableWriter {
    /// Starts a new table in `file`, reserving space for the header.
    ///
    /// The header is written with zeroed limits and rewritten by
    /// [`finish`](TableWriter::finish) once the covered range is known.
    pub fn new(mut file: File, config: &Config) -> Result<Self> {
        file.seek(SeekFrom::Start(0))?;
        format::write_header(&mut file, 0, 0)?;
        Ok(Self {
            file,
            sync: config.sync,
            limits: None,
            min_seen: u64::MAX,
            max_seen: 0,
            last_ref: None,
            last_log: None,
            ref_index: Vec::new(),
            log_index: Vec::new(),
        })
    }

    /// Declares the update-index range `[min, max]` this table covers.
    ///
    /// Must be called before any record is added. Compactions always set
    /// limits to the exact range of the tables being merged.
    pub fn set_limits(&mut self, min: u64, max: u64) -> Result<()> {
        if !self.ref_index.is_empty() || !self.log_index.is_empty() {
            return Err(TableError::InvalidRecord(
                "limits must be set before any records are added".into(),
            ));
        }
        if min > max {
            return Err(TableError::InvalidRecord(format!(
                "limits reversed: min {} > max {}",
                min, max
            )));
        }
        self.limits = Some((min, max));
        Ok(())
    }

    /// Appends a ref record. Refs must arrive in strictly ascending name
    /// order and must precede all log records.
    pub fn add_ref(&mut self, rec: &RefRecord) -> Result<()> {
        if !self.log_index.is_empty() {
            return Err(TableError::InvalidRecord(
                "refs must be added before logs".into(),
            ));
        }
        if let Some(ref last) = self.last_ref {
            if rec.name.as_str() <= last.as_str() {
                return Err(TableError::OutOfOrder {
                    prev: last.clone(),
                    got: rec.name.clone(),
                });
            }
        }
        self.check_limits(rec.update_index)?;

        let offset = self.file.stream_position()?;
        rec.encode(&mut self.file)?;
        self.track(rec.update_index);
        self.ref_index.push((rec.name.clone(), offset));
        self.last_ref = Some(rec.name.clone());
        Ok(())
    }

    /// Appends a log record. Logs must arrive sorted by
    /// `(name asc, update_index desc)`.
    pub fn add_log(&mut self, rec: &LogRecord) -> Result<()> {
        if let Some((ref last_name, last_index)) = self.last_log {
            let ordered = rec.name.as_str() > last_name.as_str()
                || (rec.name == *last_name && rec.update_index < last_index);
            if !ordered {
                return Err(TableError::OutOfOrder {
                    prev: format!("{}@{}", last_name, last_index),
                    got: format!("{}@{}", rec.name, rec.update_index),
                });
            }
        }
        self.check_limits(rec.update_index)?;

        let offset = self.file.stream_position()?;
        rec.encode(&mut self.file)?;
        self.track(rec.update_index);
        self.log_index
            .push((rec.name.clone(), rec.update_index, offset));
        self.last_log = Some((rec.name.clone(), rec.update_index));
        Ok(())
    }

    /// The smallest update index this table covers: the declared lower
    /// limit, or the smallest index actually written (0 if neither).
    #[must_use]
    pub fn min_update_index(&self) -> u64 {
        match self.limits {
            Some((min, _)) => min,
            None if self.min_seen == u64::MAX => 0,
            None => self.min_seen,
        }
    }

    /// The largest update index this table covers: the declared upper
    /// limit, or the largest index actually written.
    #[must_use]
    pub fn max_update_index(&self) -> u64 {
        match self.limits {
            Some((_, max)) => max,
            None => self.max_seen,
        }
    }

    /// Writes the indices and footer, rewrites the header with the final
    /// limits, and flushes (fsyncs when the config asks for it).
    pub fn finish(mut self) -> Result<()> {
        let ref_index_offset = self.file.stream_position()?;
        for (name, offset) in &self.ref_index {
            self.file.write_u16::<LittleEndian>(name.len() as u16)?;
            self.file.write_all(name.as_bytes())?;
            self.file.write_u64::<LittleEndian>(*offset)?;
        }

        let log_index_offset = self.file.stream_position()?;
        for (name, update_index, offset) in &self.log_index {
            self.file.write_u16::<LittleEndian>(name.len() as u16)?;
            self.file.write_all(name.as_bytes())?;
            self.file.write_u64::<LittleEndian>(*update_index)?;
            self.file.write_u64::<LittleEndian>(*offset)?;
        }

        format::write_footer(
            &mut self.file,
            ref_index_offset,
            log_index_offset,
            self.log_index.len() as u64,
        )?;

        let min = self.min_update_index();
        let max = self.max_update_index();
        self.file.seek(SeekFrom::Start(0))?;
        format::write_header(&mut self.file, min, max)?;

        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn check_limits(&self, index: u64) -> Result<()> {
        if let Some((min, max)) = self.limits {
            if index < min || index > max {
                return Err(TableError::OutsideLimits { index, min, max });
            }
        }
        Ok(())
    }

    fn track(&mut self, index: u64) {
        self.min_seen = self.min_seen.min(index);
        self.max_seen = self.max_seen.max(index);
    }
}
