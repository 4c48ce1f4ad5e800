//! Compression boundary.
//!
//! An entry's type tag selects the codec: `0` is stored verbatim, anything
//! else is a Zstandard frame. Decompression always knows the exact output
//! size up front (it comes from the file table), so codecs decode into a
//! buffer of precisely that size and treat any other outcome as corruption.

use std::io;
use thiserror::Error;

use crate::table::TYPE_STORED;

// ── CodecId ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    Stored,
    Zstd,
}

impl CodecId {
    pub fn from_type_tag(tag: i32) -> Self {
        if tag == TYPE_STORED { CodecId::Stored } else { CodecId::Zstd }
    }

    /// Diagnostic label.
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Stored => "stored",
            CodecId::Zstd   => "zstd",
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Decoded {actual} B, expected {expected} B")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    /// Worst-case compressed size for `len` input bytes.
    fn compress_bound(&self, len: usize) -> usize;
    /// Highest level accepted by [`Codec::compress`].
    fn max_level(&self) -> i32;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct StoredCodec;
impl Codec for StoredCodec {
    fn codec_id(&self) -> CodecId { CodecId::Stored }
    fn compress_bound(&self, len: usize) -> usize { len }
    fn max_level(&self) -> i32 { 0 }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError> {
        check_size(expected_size, data.len())?;
        Ok(data.to_vec())
    }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }

    fn compress_bound(&self, len: usize) -> usize {
        zstd::zstd_safe::compress_bound(len)
    }

    fn max_level(&self) -> i32 {
        *zstd::compression_level_range().end()
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        let mut scratch = vec![0u8; self.compress_bound(data.len())];
        let written = zstd::bulk::compress_to_buffer(data, &mut scratch, level)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        scratch.truncate(written);
        Ok(scratch)
    }

    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError> {
        let out = zstd::bulk::decompress(data, expected_size)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        check_size(expected_size, out.len())?;
        Ok(out)
    }
}

fn check_size(expected: usize, actual: usize) -> Result<(), CodecError> {
    if expected != actual {
        return Err(CodecError::SizeMismatch { expected, actual });
    }
    Ok(())
}

// ── Factory ──────────────────────────────────────────────────────────────────

pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::Stored => Box::new(StoredCodec),
        CodecId::Zstd   => Box::new(ZstdCodec),
    }
}
