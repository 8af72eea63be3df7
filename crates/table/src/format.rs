use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Result as IoResult, Seek, SeekFrom, Write};

pub const TABLE_MAGIC: u32 = 0x5246_5431; // "RFT1"
pub const FORMAT_VERSION: u32 = 1;

pub const HEADER_BYTES: u64 = 4 /*magic*/ + 4 /*version*/ + 8 /*min*/ + 8 /*max*/;
pub const FOOTER_BYTES: u64 = 8 /*ref_index_offset*/ + 8 /*log_index_offset*/ + 8 /*log_count*/ + 4 /*magic*/;

/// Fixed per-file framing overhead (header + footer). The stack subtracts
/// this from file sizes when sizing tables for compaction.
pub const TABLE_FRAMING_BYTES: u64 = HEADER_BYTES + FOOTER_BYTES;

/// returns position where footer starts (filesize - FOOTER_BYTES)
pub fn footer_pos(filesize: u64) -> u64 {
    filesize.saturating_sub(FOOTER_BYTES)
}

/// Convenience: write header (magic + version + update-index limits)
pub(crate) fn write_header<W: Write>(w: &mut W, min: u64, max: u64) -> IoResult<()> {
    w.write_u32::<LittleEndian>(TABLE_MAGIC)?;
    w.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    w.write_u64::<LittleEndian>(min)?;
    w.write_u64::<LittleEndian>(max)?;
    Ok(())
}

/// Convenience: read header, returning (magic, version, min, max)
pub(crate) fn read_header<R: Read>(r: &mut R) -> IoResult<(u32, u32, u64, u64)> {
    let magic = r.read_u32::<LittleEndian>()?;
    let version = r.read_u32::<LittleEndian>()?;
    let min = r.read_u64::<LittleEndian>()?;
    let max = r.read_u64::<LittleEndian>()?;
    Ok((magic, version, min, max))
}

/// Convenience: write footer (index offsets + log count + magic)
pub(crate) fn write_footer<W: Write>(
    w: &mut W,
    ref_index_offset: u64,
    log_index_offset: u64,
    log_count: u64,
) -> IoResult<()> {
    w.write_u64::<LittleEndian>(ref_index_offset)?;
    w.write_u64::<LittleEndian>(log_index_offset)?;
    w.write_u64::<LittleEndian>(log_count)?;
    w.write_u32::<LittleEndian>(TABLE_MAGIC)?;
    Ok(())
}

/// Convenience: read footer, returning
/// (ref_index_offset, log_index_offset, log_count, magic)
pub(crate) fn read_footer<R: Read + Seek>(r: &mut R) -> IoResult<(u64, u64, u64, u32)> {
    let filesize = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(footer_pos(filesize)))?;
    let ref_index_offset = r.read_u64::<LittleEndian>()?;
    let log_index_offset = r.read_u64::<LittleEndian>()?;
    let log_count = r.read_u64::<LittleEndian>()?;
    let magic = r.read_u32::<LittleEndian>()?;
    Ok((ref_index_offset, log_index_offset, log_count, magic))
}
