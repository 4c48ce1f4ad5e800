//! Reading and in-place rewriting of entry payloads in the data file.
//!
//! Data file slot layout for compressed entries:
//!
//! ```text
//! +0x00  8 B    opaque
//! +0x08  u32    uncompressed size (mirror of the file table)
//! +0x0C  u32    compressed size   (mirror of the file table)
//! +0x10  32 B   opaque
//! +0x30  ...    zstd frame, `compressed_size` bytes
//! ```
//!
//! Stored entries are `compressed_size` raw bytes at `offset`, no prefix.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::codec::{get_codec, Codec, CodecId, ZstdCodec};
use crate::error::{ArchiveError, Result};
use crate::table::{self, FileEntry};

/// Size of the per-entry prefix in front of every compressed stream.
pub const PREFIX_SIZE: u64 = 0x30;
/// Offset of the mirrored `(uncompressed, compressed)` size pair within the prefix.
pub const PREFIX_SIZES_FIELD: u64 = 8;

/// Decode one entry from `data`, whose total length is `data_len`.
pub fn read_entry<R: Read + Seek>(data: &mut R, data_len: u64, entry: &FileEntry) -> Result<Vec<u8>> {
    let compressed = u64::from(entry.compressed_size);
    let start = if entry.is_compressed() { entry.offset + PREFIX_SIZE } else { entry.offset };

    // The slot check mirrors the file table; the prefix check guards the actual read.
    if entry.offset + compressed > data_len || start + compressed > data_len {
        return Err(corrupt(entry, format!(
            "slot {}+{} runs past data file of {data_len} B",
            entry.offset, compressed
        )));
    }

    data.seek(SeekFrom::Start(start))?;
    let mut raw = vec![0u8; entry.compressed_size as usize];
    data.read_exact(&mut raw)?;

    let codec = get_codec(CodecId::from_type_tag(entry.type_tag));
    codec
        .decompress(&raw, entry.decoded_size() as usize)
        .map_err(|e| corrupt(entry, e.to_string()))
}

/// A replacement that has been compressed and checked against its slot but
/// not yet written anywhere.
///
/// Committing is split into a header step and a data step; neither is
/// journaled, so a failure between them leaves the two files disagreeing.
#[derive(Debug, Clone)]
pub struct StagedReplacement {
    pub name:              String,
    pub offset:            u64,
    pub header_offset:     usize,
    pub uncompressed_size: u32,
    pub compressed:        Vec<u8>,
}

/// Compress `data` for `entry` and verify it fits the entry's existing slot.
pub fn stage_replacement(entry: &FileEntry, data: &[u8], level: i32) -> Result<StagedReplacement> {
    let name = entry.display_name();
    if !entry.is_replaceable() {
        return Err(ArchiveError::NotReplaceable { name, type_tag: entry.type_tag });
    }

    let compressed = ZstdCodec
        .compress(data, level)
        .map_err(|e| ArchiveError::PayloadCorrupt { name: name.clone(), reason: e.to_string() })?;

    let capacity = entry.compressed_size as usize;
    let uncompressed_size = u32::try_from(data.len()).ok().filter(|_| compressed.len() <= capacity);
    let Some(uncompressed_size) = uncompressed_size else {
        return Err(ArchiveError::PayloadTooLarge { name, compressed: compressed.len(), capacity });
    };

    Ok(StagedReplacement {
        name,
        offset: entry.offset,
        header_offset: entry.header_offset,
        uncompressed_size,
        compressed,
    })
}

impl StagedReplacement {
    pub fn compressed_size(&self) -> u32 {
        // Bounded by the slot's u32 size in `stage_replacement`.
        self.compressed.len() as u32
    }

    /// Patch the entry's size fields inside a header image.
    pub fn commit_header(&self, header: &mut [u8]) -> Result<()> {
        table::patch_sizes(header, self.header_offset, self.compressed_size(), self.uncompressed_size)
    }

    /// Write the size mirror and the compressed stream into the entry's slot.
    pub fn commit_data<W: Write + Seek>(&self, data: &mut W) -> Result<()> {
        data.seek(SeekFrom::Start(self.offset + PREFIX_SIZES_FIELD))?;
        data.write_u32::<LittleEndian>(self.uncompressed_size)?;
        data.write_u32::<LittleEndian>(self.compressed_size())?;
        data.seek(SeekFrom::Start(self.offset + PREFIX_SIZE))?;
        data.write_all(&self.compressed)?;
        data.flush()?;
        Ok(())
    }

    /// Bring an in-memory entry in line with what was committed.
    pub fn apply_to(&self, entry: &mut FileEntry) {
        entry.compressed_size = self.compressed_size();
        entry.uncompressed_size = self.uncompressed_size;
    }
}

fn corrupt(entry: &FileEntry, reason: String) -> ArchiveError {
    ArchiveError::PayloadCorrupt { name: entry.display_name(), reason }
}
