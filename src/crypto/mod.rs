//! Word-XOR protection of the header's string and node tables.
//!
//! The header is treated as an array of little-endian `u32` words. Word 9
//! stores `key ^ KEY_MASK`; once decrypted the slot is overwritten with
//! `KEY_MASK` itself, which doubles as a "plaintext" marker. Only the two
//! regions handed to [`decrypt_header`] are XORed with the key, everything
//! else (scalar fields, file table) is stored in the clear.
//!
//! XOR is its own inverse, so [`encrypt_header`] is the same walk with the
//! key slot written the other way round.

use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Mask applied to the stored key, and the sentinel left behind after decryption.
pub const KEY_MASK: u32 = 0xF3F3_5353;

/// Word index of the masked key.
pub const KEY_WORD: usize = 9;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Header too short for key slot ({0} words)")]
    TooShort(usize),
    #[error("Protected region words {start}..{end} exceed header of {words} words")]
    RegionOutOfBounds { start: usize, end: usize, words: usize },
}

/// Convert a byte `offset`/`len` pair into the word range it covers.
///
/// Both values are truncated to whole words, so a trailing partial word is
/// never touched.
pub fn byte_region_to_words(offset: u32, len: u32) -> Range<usize> {
    let start = (offset / 4) as usize;
    start..start + (len / 4) as usize
}

#[inline]
pub fn word_count(buf: &[u8]) -> usize {
    buf.len() / 4
}

pub fn read_word(buf: &[u8], index: usize) -> u32 {
    LittleEndian::read_u32(&buf[index * 4..index * 4 + 4])
}

pub fn write_word(buf: &mut [u8], index: usize, value: u32) {
    LittleEndian::write_u32(&mut buf[index * 4..index * 4 + 4], value);
}

/// XOR every word of `words` with `key`.
pub fn apply_key(buf: &mut [u8], words: Range<usize>, key: u32) -> Result<(), CryptoError> {
    let total = word_count(buf);
    if words.start > words.end || words.end > total {
        return Err(CryptoError::RegionOutOfBounds {
            start: words.start,
            end:   words.end,
            words: total,
        });
    }
    for i in words {
        let w = read_word(buf, i);
        write_word(buf, i, w ^ key);
    }
    Ok(())
}

/// Recover the key, reset its slot to [`KEY_MASK`] and decrypt `regions`.
///
/// Bounds are checked for every region before any byte is modified, so on
/// error `buf` is left untouched.
pub fn decrypt_header(buf: &mut [u8], regions: &[Range<usize>]) -> Result<u32, CryptoError> {
    check_layout(buf, regions)?;
    let key = read_word(buf, KEY_WORD) ^ KEY_MASK;
    write_word(buf, KEY_WORD, KEY_MASK);
    for r in regions {
        apply_key(buf, r.clone(), key)?;
    }
    Ok(key)
}

/// Inverse of [`decrypt_header`]: protect `regions` with `key` and store the masked key.
pub fn encrypt_header(buf: &mut [u8], regions: &[Range<usize>], key: u32) -> Result<(), CryptoError> {
    check_layout(buf, regions)?;
    for r in regions {
        apply_key(buf, r.clone(), key)?;
    }
    write_word(buf, KEY_WORD, key ^ KEY_MASK);
    Ok(())
}

fn check_layout(buf: &[u8], regions: &[Range<usize>]) -> Result<(), CryptoError> {
    let total = word_count(buf);
    if total <= KEY_WORD {
        return Err(CryptoError::TooShort(total));
    }
    for r in regions {
        if r.start > r.end || r.end > total {
            return Err(CryptoError::RegionOutOfBounds { start: r.start, end: r.end, words: total });
        }
    }
    Ok(())
}
