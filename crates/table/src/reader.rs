use byteorder::{LittleEndian, ReadBytesExt};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, TableError};
use crate::format::{self, FORMAT_VERSION, FOOTER_BYTES, TABLE_FRAMING_BYTES, TABLE_MAGIC};
use crate::record::{LogRecord, RefRecord, MAX_NAME_BYTES};

/// Reads an immutable table file.
///
/// On [`open`](TableReader::open) both indices are loaded into memory:
/// refs as `BTreeMap<name, offset>` and logs as
/// `BTreeMap<(name, Reverse(update_index)), offset>`, so that iteration
/// order matches the on-disk record order (`name asc`, and for logs
/// `update_index desc` within a name).
///
/// A persistent file handle is kept open for the lifetime of the reader,
/// wrapped in a `Mutex` so that record reads can go through a shared
/// `&self` reference. Each record read is a single seek + read, with the
/// per-record CRC verified.
pub struct TableReader {
    /// File name (basename) of the table, as it appears in the manifest.
    name: String,
    /// Full path to the `.ref` file (kept for diagnostics).
    #[allow(dead_code)]
    path: PathBuf,
    /// Byte size of the table file.
    size: u64,
    min_update_index: u64,
    max_update_index: u64,
    ref_index: BTreeMap<String, u64>,
    log_index: BTreeMap<(String, Reverse<u64>), u64>,
    /// Persistent file handle, wrapped in Mutex for interior mutability.
    file: Mutex<BufReader<File>>,
}

impl TableReader {
    /// Opens a table file and loads its indices into memory.
    ///
    /// # Validation
    ///
    /// - The file must be at least `HEADER_BYTES + FOOTER_BYTES` long.
    /// - Both magic values must match, and the version must be supported.
    /// - Index offsets must be ordered and point inside the file.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or any I/O operation fails.
    /// A missing file surfaces as `TableError::Io` with kind `NotFound`,
    /// which the stack's reload loop treats as a transient condition.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let name = match path_buf.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => {
                return Err(TableError::Corrupt(format!(
                    "table path {} has no usable file name",
                    path_buf.display()
                )))
            }
        };

        let mut f = File::open(&path_buf)?;
        let filesize = f.metadata()?.len();
        if filesize < TABLE_FRAMING_BYTES {
            return Err(TableError::Corrupt(format!(
                "table file is {} bytes (minimum {})",
                filesize, TABLE_FRAMING_BYTES
            )));
        }

        let (ref_index_offset, log_index_offset, log_count, footer_magic) =
            format::read_footer(&mut f)?;
        if footer_magic != TABLE_MAGIC {
            return Err(TableError::Corrupt(format!(
                "bad footer magic {:#010x}",
                footer_magic
            )));
        }
        if ref_index_offset > log_index_offset || log_index_offset > format::footer_pos(filesize) {
            return Err(TableError::Corrupt("index offsets out of bounds".into()));
        }

        f.seek(SeekFrom::Start(0))?;
        let (header_magic, version, min_update_index, max_update_index) =
            format::read_header(&mut f)?;
        if header_magic != TABLE_MAGIC {
            return Err(TableError::Corrupt(format!(
                "bad header magic {:#010x}",
                header_magic
            )));
        }
        if version != FORMAT_VERSION {
            return Err(TableError::Corrupt(format!(
                "unsupported format version {}",
                version
            )));
        }

        let mut f = BufReader::new(f);

        // Ref index: name -> data offset.
        f.seek(SeekFrom::Start(ref_index_offset))?;
        let mut ref_index = BTreeMap::new();
        while f.stream_position()? < log_index_offset {
            let name = read_index_name(&mut f)?;
            let offset = f.read_u64::<LittleEndian>()?;
            ref_index.insert(name, offset);
        }

        // Log index: (name, update index) -> data offset, update desc.
        let footer_start = filesize - FOOTER_BYTES;
        let mut log_index = BTreeMap::new();
        while f.stream_position()? < footer_start {
            let name = read_index_name(&mut f)?;
            let update_index = f.read_u64::<LittleEndian>()?;
            let offset = f.read_u64::<LittleEndian>()?;
            log_index.insert((name, Reverse(update_index)), offset);
        }
        if log_index.len() as u64 != log_count {
            return Err(TableError::Corrupt(format!(
                "footer declares {} log entries, index holds {}",
                log_count,
                log_index.len()
            )));
        }

        f.seek(SeekFrom::Start(0))?;

        Ok(Self {
            name,
            path: path_buf,
            size: filesize,
            min_update_index,
            max_update_index,
            ref_index,
            log_index,
            file: Mutex::new(f),
        })
    }

    /// File name (basename) of this table, as listed in the manifest.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte size of the table file.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Smallest update index covered by this table.
    #[must_use]
    pub fn min_update_index(&self) -> u64 {
        self.min_update_index
    }

    /// Largest update index covered by this table.
    #[must_use]
    pub fn max_update_index(&self) -> u64 {
        self.max_update_index
    }

    /// Number of ref records in this table.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.ref_index.len()
    }

    /// Number of log records in this table.
    #[must_use]
    pub fn log_count(&self) -> usize {
        self.log_index.len()
    }

    /// Point lookup for a single ref record.
    ///
    /// Returns `Ok(Some(record))` if the name exists in this table (the
    /// record may be a deletion tombstone). Returns `Ok(None)` if the name
    /// is not present in the index.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, CRC mismatch, or if the on-disk
    /// name does not match the requested name (index corruption).
    pub fn ref_record(&self, name: &str) -> Result<Option<RefRecord>> {
        let offset = match self.ref_index.get(name) {
            Some(&o) => o,
            None => return Ok(None),
        };
        let rec = self.read_at(offset, RefRecord::decode)?;
        if rec.name != name {
            return Err(TableError::Corrupt(format!(
                "ref index for {:?} pointed at record {:?}",
                name, rec.name
            )));
        }
        Ok(Some(rec))
    }

    /// Point lookup for a single log record at `(name, update_index)`.
    pub fn log_record(&self, name: &str, update_index: u64) -> Result<Option<LogRecord>> {
        let offset = match self
            .log_index
            .get(&(name.to_string(), Reverse(update_index)))
        {
            Some(&o) => o,
            None => return Ok(None),
        };
        let rec = self.read_at(offset, LogRecord::decode)?;
        if rec.name != name || rec.update_index != update_index {
            return Err(TableError::Corrupt(format!(
                "log index for {:?}@{} pointed at record {:?}@{}",
                name, update_index, rec.name, rec.update_index
            )));
        }
        Ok(Some(rec))
    }

    /// Returns all ref names at or after `start`, in ascending order.
    ///
    /// Used by the merge layer to stage this table's contribution.
    pub(crate) fn ref_names_from(&self, start: &str) -> Vec<String> {
        self.ref_index
            .range::<str, _>((Bound::Included(start), Bound::Unbounded))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns all log keys at or after `(name, update_index)` in log
    /// order (`name asc`, `update_index desc` within a name).
    pub(crate) fn log_keys_from(&self, name: &str, update_index: u64) -> Vec<(String, u64)> {
        let start = (name.to_string(), Reverse(update_index));
        self.log_index
            .range((Bound::Included(start), Bound::Unbounded))
            .map(|((name, Reverse(update)), _)| (name.clone(), *update))
            .collect()
    }

    fn read_at<T>(
        &self,
        offset: u64,
        decode: impl FnOnce(&mut BufReader<File>) -> Result<T>,
    ) -> Result<T> {
        // A poisoned lock only means another reader panicked mid-read; the
        // seek below resets the cursor, so the guard is still usable.
        let mut f = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f.seek(SeekFrom::Start(offset))?;
        decode(&mut f)
    }
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("min_update_index", &self.min_update_index)
            .field("max_update_index", &self.max_update_index)
            .field("ref_count", &self.ref_index.len())
            .field("log_count", &self.log_index.len())
            .finish()
    }
}

fn read_index_name(f: &mut BufReader<File>) -> Result<String> {
    let name_len = f.read_u16::<LittleEndian>()? as usize;
    if name_len > MAX_NAME_BYTES {
        return Err(TableError::Corrupt(format!(
            "corrupt index: name_len {} exceeds maximum {}",
            name_len, MAX_NAME_BYTES
        )));
    }
    let mut name = vec![0u8; name_len];
    std::io::Read::read_exact(f, &mut name)?;
    String::from_utf8(name).map_err(|_| TableError::Corrupt("index name is not valid UTF-8".into()))
}
