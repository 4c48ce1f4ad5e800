//! File table: one fixed 24-byte record per contained file.
//!
//! Record layout (little-endian, no padding):
//! `offset: i64 | compressed_size: i32 | uncompressed_size: i32 | type: i32 | id: i32`

use std::io::{Cursor, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::{ArchiveError, Result};
use crate::header::HeaderInfo;

pub const FILE_RECORD_SIZE: usize = 24;

/// Field offsets within a record, relative to its start.
const COMPRESSED_SIZE_FIELD:   usize = 8;
const UNCOMPRESSED_SIZE_FIELD: usize = 12;

/// Entry type tags.
pub const TYPE_STORED:      i32 = 0;
pub const TYPE_REPLACEABLE: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub id:                i32,
    pub offset:            u64,
    pub compressed_size:   u32,
    pub uncompressed_size: u32,
    pub type_tag:          i32,
    /// Byte offset of this record inside the header file.
    pub header_offset:     usize,
    /// Filled in while the trie index is walked; `None` for orphaned records.
    pub filename:          Option<String>,
}

impl FileEntry {
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.type_tag != TYPE_STORED
    }

    #[inline]
    pub fn is_replaceable(&self) -> bool {
        self.type_tag == TYPE_REPLACEABLE
    }

    /// Size of the decoded payload.
    pub fn decoded_size(&self) -> u32 {
        if self.is_compressed() { self.uncompressed_size } else { self.compressed_size }
    }

    /// Resolved filename, or a synthetic `#<id>` label for diagnostics.
    pub fn display_name(&self) -> String {
        match &self.filename {
            Some(n) => n.clone(),
            None    => format!("#{}", self.id),
        }
    }
}

/// Parse `info.file_count` records starting at `info.file_table_offset`.
pub fn parse_file_table(header: &[u8], info: &HeaderInfo) -> Result<Vec<FileEntry>> {
    let range = info.file_table_range();
    if range.end > header.len() {
        return Err(ArchiveError::corrupt_header(format!(
            "file table of {} records truncated at {} B",
            info.file_count,
            header.len()
        )));
    }

    let mut cursor = Cursor::new(header);
    cursor.seek(SeekFrom::Start(range.start as u64))?;

    let mut entries = Vec::with_capacity(info.file_count as usize);
    for index in 0..info.file_count as usize {
        let header_offset = cursor.position() as usize;
        let offset = cursor.read_i64::<LittleEndian>()?;
        let compressed_size = cursor.read_i32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_i32::<LittleEndian>()?;
        let type_tag = cursor.read_i32::<LittleEndian>()?;
        let id = cursor.read_i32::<LittleEndian>()?;

        let bad = |what: &str, v: i64| {
            ArchiveError::corrupt_header(format!("file record {index}: {what} is negative ({v})"))
        };
        entries.push(FileEntry {
            id,
            offset:            u64::try_from(offset).map_err(|_| bad("offset", offset))?,
            compressed_size:   u32::try_from(compressed_size)
                .map_err(|_| bad("compressed size", compressed_size.into()))?,
            uncompressed_size: u32::try_from(uncompressed_size)
                .map_err(|_| bad("uncompressed size", uncompressed_size.into()))?,
            type_tag,
            header_offset,
            filename: None,
        });
    }
    Ok(entries)
}

/// Overwrite the size fields of the record at `header_offset`.
pub fn patch_sizes(header: &mut [u8], header_offset: usize, compressed: u32, uncompressed: u32) -> Result<()> {
    let end = header_offset + FILE_RECORD_SIZE;
    if end > header.len() {
        return Err(ArchiveError::corrupt_header(format!(
            "record at {header_offset} runs past header end ({} B)",
            header.len()
        )));
    }
    let record = &mut header[header_offset..end];
    LittleEndian::write_u32(&mut record[COMPRESSED_SIZE_FIELD..], compressed);
    LittleEndian::write_u32(&mut record[UNCOMPRESSED_SIZE_FIELD..], uncompressed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn info(offset: u32, count: u32) -> HeaderInfo {
        HeaderInfo {
            magic:               0,
            field4:              0,
            node_count:          0,
            string_table_offset: 0,
            string_table_length: 0,
            node_table_offset:   0,
            node_table_length:   0,
            file_table_offset:   offset,
            file_count:          count,
            key:                 0,
        }
    }

    fn record(buf: &mut Vec<u8>, offset: i64, csize: i32, usize_: i32, ty: i32, id: i32) {
        buf.write_i64::<LittleEndian>(offset).unwrap();
        buf.write_i32::<LittleEndian>(csize).unwrap();
        buf.write_i32::<LittleEndian>(usize_).unwrap();
        buf.write_i32::<LittleEndian>(ty).unwrap();
        buf.write_i32::<LittleEndian>(id).unwrap();
    }

    #[test]
    fn parses_records_and_their_header_offsets() {
        let mut buf = vec![0xEE; 8];
        record(&mut buf, 0, 10, 10, 0, 0);
        record(&mut buf, 0x1000, 64, 300, 2, 1);

        let entries = parse_file_table(&buf, &info(8, 2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].header_offset, 8);
        assert!(!entries[0].is_compressed());
        assert_eq!(entries[0].decoded_size(), 10);

        let e = &entries[1];
        assert_eq!(e.header_offset, 8 + FILE_RECORD_SIZE);
        assert_eq!(e.offset, 0x1000);
        assert_eq!((e.compressed_size, e.uncompressed_size), (64, 300));
        assert!(e.is_replaceable());
        assert_eq!(e.decoded_size(), 300);
        assert_eq!(e.display_name(), "#1");
    }

    #[test]
    fn truncated_table_is_corrupt() {
        let mut buf = Vec::new();
        record(&mut buf, 0, 1, 1, 0, 0);
        buf.truncate(20);
        assert!(matches!(parse_file_table(&buf, &info(0, 1)), Err(ArchiveError::CorruptHeader(_))));
    }

    #[test]
    fn negative_size_is_corrupt() {
        let mut buf = Vec::new();
        record(&mut buf, 0, -1, 1, 0, 0);
        assert!(matches!(parse_file_table(&buf, &info(0, 1)), Err(ArchiveError::CorruptHeader(_))));
    }

    #[test]
    fn patch_sizes_touches_only_size_fields() {
        let mut buf = Vec::new();
        record(&mut buf, 77, 10, 20, 2, 5);
        patch_sizes(&mut buf, 0, 6, 42).unwrap();
        let e = &parse_file_table(&buf, &info(0, 1)).unwrap()[0];
        assert_eq!((e.offset, e.compressed_size, e.uncompressed_size, e.type_tag, e.id), (77, 6, 42, 2, 5));
    }
}
