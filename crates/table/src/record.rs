use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{Read, Write};

use crate::error::{Result, TableError};

/// Maximum reference-name size we'll allocate during reads (4 KiB). Prevents OOM on corrupt files.
pub(crate) const MAX_NAME_BYTES: usize = 4 * 1024;
/// Maximum value size we'll allocate during reads (64 KiB). Prevents OOM on corrupt files.
pub(crate) const MAX_VALUE_BYTES: usize = 64 * 1024;
/// Maximum log-message size we'll allocate during reads (64 KiB). Prevents OOM on corrupt files.
pub(crate) const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// The current value of one reference at one update index.
///
/// `value == None` signifies a deletion tombstone: the reference existed in
/// an older table and was removed by the transaction at `update_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRecord {
    /// The reference name, e.g. `refs/heads/main`.
    pub name: String,
    /// Update index of the transaction that wrote this record.
    pub update_index: u64,
    /// The reference value; `None` is a tombstone.
    pub value: Option<Vec<u8>>,
}

impl RefRecord {
    /// Returns `true` if this record is a deletion tombstone.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.value.is_none()
    }

    /// Serializes the record as `[crc32][body]` where the CRC covers the
    /// whole body.
    pub(crate) fn encode<W: Write>(&self, w: &mut W) -> Result<()> {
        if self.name.len() > MAX_NAME_BYTES {
            return Err(TableError::InvalidRecord(format!(
                "ref name is {} bytes (max {})",
                self.name.len(),
                MAX_NAME_BYTES
            )));
        }
        if let Some(ref v) = self.value {
            if v.len() > MAX_VALUE_BYTES {
                return Err(TableError::InvalidRecord(format!(
                    "ref value is {} bytes (max {})",
                    v.len(),
                    MAX_VALUE_BYTES
                )));
            }
        }

        let mut body = Vec::with_capacity(
            2 + self.name.len() + 8 + 1 + self.value.as_ref().map_or(0, |v| 4 + v.len()),
        );
        body.write_u16::<LittleEndian>(self.name.len() as u16)?;
        body.extend_from_slice(self.name.as_bytes());
        body.write_u64::<LittleEndian>(self.update_index)?;
        match &self.value {
            Some(v) => {
                body.write_u8(1)?;
                body.write_u32::<LittleEndian>(v.len() as u32)?;
                body.extend_from_slice(v);
            }
            None => body.write_u8(0)?,
        }

        let mut hasher = Crc32::new();
        hasher.update(&body);
        w.write_u32::<LittleEndian>(hasher.finalize())?;
        w.write_all(&body)?;
        Ok(())
    }

    /// Reads one record, verifying its CRC against the reconstructed body.
    pub(crate) fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let stored_crc = r.read_u32::<LittleEndian>()?;

        let name_len = r.read_u16::<LittleEndian>()? as usize;
        if name_len > MAX_NAME_BYTES {
            return Err(TableError::Corrupt(format!(
                "ref name_len {} exceeds maximum {}",
                name_len, MAX_NAME_BYTES
            )));
        }
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let update_index = r.read_u64::<LittleEndian>()?;
        let present = r.read_u8()?;
        let value = match present {
            0 => None,
            1 => {
                let val_len = r.read_u32::<LittleEndian>()? as usize;
                if val_len > MAX_VALUE_BYTES {
                    return Err(TableError::Corrupt(format!(
                        "ref val_len {} exceeds maximum {}",
                        val_len, MAX_VALUE_BYTES
                    )));
                }
                let mut val = vec![0u8; val_len];
                r.read_exact(&mut val)?;
                Some(val)
            }
            other => {
                return Err(TableError::Corrupt(format!(
                    "ref present flag is {} (expected 0 or 1)",
                    other
                )))
            }
        };

        // Reconstruct the body that was checksummed.
        let mut hasher = Crc32::new();
        hasher.update(&(name_len as u16).to_le_bytes());
        hasher.update(&name);
        hasher.update(&update_index.to_le_bytes());
        hasher.update(&[present]);
        if let Some(ref v) = value {
            hasher.update(&(v.len() as u32).to_le_bytes());
            hasher.update(v);
        }
        let actual_crc = hasher.finalize();
        if actual_crc != stored_crc {
            return Err(TableError::Corrupt(format!(
                "ref record CRC32 mismatch: expected {:#010x}, got {:#010x}",
                stored_crc, actual_crc
            )));
        }

        let name = String::from_utf8(name)
            .map_err(|_| TableError::Corrupt("ref name is not valid UTF-8".into()))?;

        Ok(Self {
            name,
            update_index,
            value,
        })
    }
}

/// One historical reference update: the transition of `name` from `old_id`
/// to `new_id` at `update_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// The reference name this entry belongs to.
    pub name: String,
    /// Update index of the transaction that performed the transition.
    pub update_index: u64,
    /// Value before the transition (empty for a creation).
    pub old_id: Vec<u8>,
    /// Value after the transition (empty for a deletion).
    pub new_id: Vec<u8>,
    /// Free-form message describing the update.
    pub message: String,
    /// Seconds since the Unix epoch at which the update happened.
    pub time: u64,
}

impl LogRecord {
    /// Serializes the record as `[crc32][body]` where the CRC covers the
    /// whole body.
    pub(crate) fn encode<W: Write>(&self, w: &mut W) -> Result<()> {
        if self.name.len() > MAX_NAME_BYTES {
            return Err(TableError::InvalidRecord(format!(
                "log name is {} bytes (max {})",
                self.name.len(),
                MAX_NAME_BYTES
            )));
        }
        if self.old_id.len() > MAX_VALUE_BYTES || self.new_id.len() > MAX_VALUE_BYTES {
            return Err(TableError::InvalidRecord("log id too large".into()));
        }
        if self.message.len() > MAX_MESSAGE_BYTES {
            return Err(TableError::InvalidRecord(format!(
                "log message is {} bytes (max {})",
                self.message.len(),
                MAX_MESSAGE_BYTES
            )));
        }

        let mut body = Vec::with_capacity(
            2 + self.name.len()
                + 8
                + 4
                + self.old_id.len()
                + 4
                + self.new_id.len()
                + 4
                + self.message.len()
                + 8,
        );
        body.write_u16::<LittleEndian>(self.name.len() as u16)?;
        body.extend_from_slice(self.name.as_bytes());
        body.write_u64::<LittleEndian>(self.update_index)?;
        body.write_u32::<LittleEndian>(self.old_id.len() as u32)?;
        body.extend_from_slice(&self.old_id);
        body.write_u32::<LittleEndian>(self.new_id.len() as u32)?;
        body.extend_from_slice(&self.new_id);
        body.write_u32::<LittleEndian>(self.message.len() as u32)?;
        body.extend_from_slice(self.message.as_bytes());
        body.write_u64::<LittleEndian>(self.time)?;

        let mut hasher = Crc32::new();
        hasher.update(&body);
        w.write_u32::<LittleEndian>(hasher.finalize())?;
        w.write_all(&body)?;
        Ok(())
    }

    /// Reads one record, verifying its CRC against the reconstructed body.
    pub(crate) fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let stored_crc = r.read_u32::<LittleEndian>()?;

        let name_len = r.read_u16::<LittleEndian>()? as usize;
        if name_len > MAX_NAME_BYTES {
            return Err(TableError::Corrupt(format!(
                "log name_len {} exceeds maximum {}",
                name_len, MAX_NAME_BYTES
            )));
        }
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let update_index = r.read_u64::<LittleEndian>()?;

        let old_len = r.read_u32::<LittleEndian>()? as usize;
        if old_len > MAX_VALUE_BYTES {
            return Err(TableError::Corrupt(format!(
                "log old_len {} exceeds maximum {}",
                old_len, MAX_VALUE_BYTES
            )));
        }
        let mut old_id = vec![0u8; old_len];
        r.read_exact(&mut old_id)?;

        let new_len = r.read_u32::<LittleEndian>()? as usize;
        if new_len > MAX_VALUE_BYTES {
            return Err(TableError::Corrupt(format!(
                "log new_len {} exceeds maximum {}",
                new_len, MAX_VALUE_BYTES
            )));
        }
        let mut new_id = vec![0u8; new_len];
        r.read_exact(&mut new_id)?;

        let msg_len = r.read_u32::<LittleEndian>()? as usize;
        if msg_len > MAX_MESSAGE_BYTES {
            return Err(TableError::Corrupt(format!(
                "log msg_len {} exceeds maximum {}",
                msg_len, MAX_MESSAGE_BYTES
            )));
        }
        let mut message = vec![0u8; msg_len];
        r.read_exact(&mut message)?;
        let time = r.read_u64::<LittleEndian>()?;

        let mut hasher = Crc32::new();
        hasher.update(&(name_len as u16).to_le_bytes());
        hasher.update(&name);
        hasher.update(&update_index.to_le_bytes());
        hasher.update(&(old_len as u32).to_le_bytes());
        hasher.update(&old_id);
        hasher.update(&(new_len as u32).to_le_bytes());
        hasher.update(&new_id);
        hasher.update(&(msg_len as u32).to_le_bytes());
        hasher.update(&message);
        hasher.update(&time.to_le_bytes());
        let actual_crc = hasher.finalize();
        if actual_crc != stored_crc {
            return Err(TableError::Corrupt(format!(
                "log record CRC32 mismatch: expected {:#010x}, got {:#010x}",
                stored_crc, actual_crc
            )));
        }

        let name = String::from_utf8(name)
            .map_err(|_| TableError::Corrupt("log name is not valid UTF-8".into()))?;
        let message = String::from_utf8(message)
            .map_err(|_| TableError::Corrupt("log message is not valid UTF-8".into()))?;

        Ok(Self {
            name,
            update_index,
            old_id,
            new_id,
            message,
            time,
        })
    }
}
