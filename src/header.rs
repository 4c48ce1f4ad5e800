//! Fixed-layout header scalars and the decrypt-then-parse entry point.
//!
//! ```text
//! word 0  magic (not validated)
//! word 1  field4 (opaque)
//! word 2  node count
//! word 3  string table offset   word 4  string table length
//! word 5  node table offset     word 6  node table length
//! word 7  file table offset     word 8  file count
//! word 9  key ^ 0xF3F35353
//! ```
//! All fields are little-endian. Offsets and lengths are stored as signed
//! 32-bit values; negative values are rejected as corrupt.

use std::io::{self, Cursor, Read, Write};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;

use crate::crypto::{self, KEY_MASK};
use crate::error::{ArchiveError, Result};
use crate::table::FILE_RECORD_SIZE;

/// Size of the scalar block at the start of the header (10 words).
pub const HEADER_SIZE: usize = 40;
/// On-disk size of one `(next, prev)` trie node.
pub const NODE_RECORD_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderInfo {
    pub magic:               u32,
    pub field4:              i32,
    pub node_count:          u32,
    pub string_table_offset: u32,
    pub string_table_length: u32,
    pub node_table_offset:   u32,
    pub node_table_length:   u32,
    pub file_table_offset:   u32,
    pub file_count:          u32,
    /// Recovered key (already unmasked).
    pub key:                 u32,
}

impl HeaderInfo {
    /// Parse the scalar block. The key word is unmasked on the way in.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        let field4 = reader.read_i32::<LittleEndian>()?;
        let node_count = non_negative("node count", reader.read_i32::<LittleEndian>()?)?;
        let string_table_offset = non_negative("string table offset", reader.read_i32::<LittleEndian>()?)?;
        let string_table_length = non_negative("string table length", reader.read_i32::<LittleEndian>()?)?;
        let node_table_offset = non_negative("node table offset", reader.read_i32::<LittleEndian>()?)?;
        let node_table_length = non_negative("node table length", reader.read_i32::<LittleEndian>()?)?;
        let file_table_offset = non_negative("file table offset", reader.read_i32::<LittleEndian>()?)?;
        let file_count = non_negative("file count", reader.read_i32::<LittleEndian>()?)?;
        let key = reader.read_u32::<LittleEndian>()? ^ KEY_MASK;
        Ok(Self {
            magic,
            field4,
            node_count,
            string_table_offset,
            string_table_length,
            node_table_offset,
            node_table_length,
            file_table_offset,
            file_count,
            key,
        })
    }

    /// Write the scalar block with the key masked, as it appears on disk.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_i32::<LittleEndian>(self.field4)?;
        writer.write_u32::<LittleEndian>(self.node_count)?;
        writer.write_u32::<LittleEndian>(self.string_table_offset)?;
        writer.write_u32::<LittleEndian>(self.string_table_length)?;
        writer.write_u32::<LittleEndian>(self.node_table_offset)?;
        writer.write_u32::<LittleEndian>(self.node_table_length)?;
        writer.write_u32::<LittleEndian>(self.file_table_offset)?;
        writer.write_u32::<LittleEndian>(self.file_count)?;
        writer.write_u32::<LittleEndian>(self.key ^ KEY_MASK)?;
        Ok(())
    }

    /// Word ranges covered by the key: string table first, then node table.
    pub fn protected_words(&self) -> [Range<usize>; 2] {
        [
            crypto::byte_region_to_words(self.string_table_offset, self.string_table_length),
            crypto::byte_region_to_words(self.node_table_offset, self.node_table_length),
        ]
    }

    pub fn string_table_range(&self) -> Range<usize> {
        let start = self.string_table_offset as usize;
        start..start + self.string_table_length as usize
    }

    pub fn node_table_range(&self) -> Range<usize> {
        let start = self.node_table_offset as usize;
        start..start + self.node_count as usize * NODE_RECORD_SIZE
    }

    pub fn file_table_range(&self) -> Range<usize> {
        let start = self.file_table_offset as usize;
        start..start + self.file_count as usize * FILE_RECORD_SIZE
    }

    /// Check every declared region against a header of `len` bytes.
    pub fn validate(&self, len: usize) -> Result<()> {
        check_region("string table", self.string_table_range(), len)?;
        check_region(
            "node table",
            self.node_table_offset as usize
                ..self.node_table_offset as usize + self.node_table_length as usize,
            len,
        )?;
        if (self.node_count as usize) * NODE_RECORD_SIZE > self.node_table_length as usize {
            return Err(ArchiveError::corrupt_header(format!(
                "{} nodes do not fit in a node table of {} B",
                self.node_count, self.node_table_length
            )));
        }
        check_region("file table", self.file_table_range(), len)?;
        Ok(())
    }
}

/// Header bytes with the protected regions decrypted, plus the parsed scalars.
#[derive(Debug, Clone)]
pub struct DecodedHeader {
    pub info:  HeaderInfo,
    pub bytes: Vec<u8>,
}

/// Decrypt and parse a raw header file image.
///
/// `raw` itself is not modified; the decrypted image is a fresh buffer.
pub fn decode(raw: &[u8]) -> Result<DecodedHeader> {
    if raw.len() < HEADER_SIZE {
        return Err(ArchiveError::corrupt_header(format!(
            "header is {} B, need at least {HEADER_SIZE}",
            raw.len()
        )));
    }
    let info = HeaderInfo::read(Cursor::new(raw))?;
    info.validate(raw.len())?;

    let mut bytes = raw.to_vec();
    let key = crypto::decrypt_header(&mut bytes, &info.protected_words())
        .map_err(|e| ArchiveError::corrupt_header(e.to_string()))?;
    debug_assert_eq!(key, info.key);

    Ok(DecodedHeader { info, bytes })
}

fn non_negative(field: &str, value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ArchiveError::corrupt_header(format!("{field} is negative ({value})")))
}

fn check_region(name: &str, range: Range<usize>, len: usize) -> Result<()> {
    if range.end > len {
        return Err(ArchiveError::corrupt_header(format!(
            "{name} spans {}..{} but header is {len} B",
            range.start, range.end
        )));
    }
    Ok(())
}
