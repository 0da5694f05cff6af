//! Decodes the string-pool chunk shared by AXML and ARSC (`ResStringPool`).
//!
//! Grounded on the teacher's `nom_parser::StringPoolChunk`/
//! `parser::string_table`, generalized to the full variable-length prefix
//! grammar of the spec (two-length UTF-8 strings, one-length UTF-16
//! strings, both with the high-bit continuation byte/word) and to the
//! lenient-decode contract: out-of-range or malformed entries return `""`
//! rather than propagating an error.

use std::cell::RefCell;

use nom::multi::count;
use nom::number::complete::le_u32;
use nom::sequence::tuple;
use nom::IResult;

use crate::chunk::{ChunkHeader, DecodeOptions};
use crate::error::{Error, Result};
use crate::logger::Logger;

const UTF8_FLAG: u32 = 0x100;

/// A decoded, indexable pool of strings. Holds a non-owning view into the
/// owning buffer (the AXML or ARSC chunk it was parsed from).
pub struct StringPool<'a> {
    is_utf8: bool,
    data: &'a [u8],
    offsets: Vec<u32>,
    cache: RefCell<Vec<Option<String>>>,
    eager: bool,
}

impl<'a> StringPool<'a> {
    /// Parses a `StringPool` chunk starting at `chunk`. `chunk` must begin
    /// with the chunk's own `ChunkHeader`.
    pub fn parse(chunk: &'a [u8], opts: DecodeOptions, logger: &dyn Logger) -> Result<Self> {
        let (_header, string_count, _style_count, flags, strings_start, _styles_start) =
            parse_header(chunk)?;

        // The fixed string-pool header is 28 bytes: 8 (ChunkHeader) + 5*u32.
        const STRING_POOL_HEADER_SIZE: usize = 28;
        let offsets_buf = chunk
            .get(STRING_POOL_HEADER_SIZE..STRING_POOL_HEADER_SIZE + 4 * string_count as usize)
            .ok_or_else(|| Error::StringPool("string pool offsets table truncated".into()))?;
        let (_, offsets) = count(le_u32::<_, nom::error::Error<&[u8]>>, string_count as usize)(
            offsets_buf,
        )
        .map_err(|e| Error::StringPool(e.to_string()))?;

        let data = chunk.get(strings_start as usize..).unwrap_or(&[]);
        let is_utf8 = (flags & UTF8_FLAG) != 0;

        let mut cache = vec![None; offsets.len()];
        if opts.eager_strings {
            for (i, slot) in cache.iter_mut().enumerate() {
                *slot = Some(decode_at(data, offsets[i], is_utf8, logger));
            }
        }

        Ok(Self {
            is_utf8,
            data,
            offsets,
            cache: RefCell::new(cache),
            eager: opts.eager_strings,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Looks up a string by ordinal. Out-of-range indices return `""`,
    /// never an error, per the string-pool bounds invariant.
    pub fn get(&self, index: u32) -> String {
        let index = index as usize;
        if index >= self.offsets.len() {
            return String::new();
        }
        if let Some(s) = &self.cache.borrow()[index] {
            return s.clone();
        }
        let decoded = decode_at(self.data, self.offsets[index], self.is_utf8, &crate::logger::NoopLogger);
        if !self.eager {
            self.cache.borrow_mut()[index] = Some(decoded.clone());
        }
        decoded
    }

    pub fn all(&self) -> Vec<String> {
        (0..self.offsets.len() as u32).map(|i| self.get(i)).collect()
    }
}

#[allow(clippy::type_complexity)]
fn parse_header(chunk: &[u8]) -> Result<(ChunkHeader, u32, u32, u32, u32, u32)> {
    let (input, header) =
        ChunkHeader::parse(chunk).map_err(|e| Error::ChunkHeader(e.to_string()))?;
    let (_, (string_count, style_count, flags, strings_start, styles_start)) =
        tuple((le_u32, le_u32, le_u32, le_u32, le_u32))(input)
            .map_err(|e: nom::Err<nom::error::Error<&[u8]>>| Error::StringPool(e.to_string()))?;
    Ok((
        header,
        string_count,
        style_count,
        flags,
        strings_start,
        styles_start,
    ))
}

fn decode_at(data: &[u8], offset: u32, is_utf8: bool, logger: &dyn Logger) -> String {
    let offset = offset as usize;
    if offset >= data.len() {
        logger.warn(&format!("string pool: offset {offset} beyond data length {}", data.len()));
        return String::new();
    }
    let buf = &data[offset..];
    let result = if is_utf8 {
        decode_utf8_string(buf)
    } else {
        decode_utf16_string(buf)
    };
    match result {
        Some(s) => s,
        None => {
            logger.warn("string pool: malformed string payload, substituting empty string");
            String::new()
        }
    }
}

/// UTF-8 strings carry two variable-length lengths (UTF-16 char count, then
/// UTF-8 byte count), then exactly that many payload bytes, then a null
/// terminator not counted in the length.
fn decode_utf8_string(buf: &[u8]) -> Option<String> {
    let (_utf16_len, skip1) = decode_length_1byte(buf)?;
    let buf = buf.get(skip1..)?;
    let (byte_count, skip2) = decode_length_1byte(buf)?;
    let buf = buf.get(skip2..)?;
    if byte_count > 0x7FFF {
        return None;
    }
    let bytes = buf.get(..byte_count as usize)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

/// UTF-16 strings carry one variable-length length (in UTF-16 code units),
/// then that many 16-bit units, then a null terminator.
fn decode_utf16_string(buf: &[u8]) -> Option<String> {
    let (char_count, skip) = decode_length_2byte(buf)?;
    let buf = buf.get(skip..)?;
    if char_count > 0x7FFF_FFFF {
        return None;
    }
    let byte_count = (char_count as usize).checked_mul(2)?;
    let bytes = buf.get(..byte_count)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    Some(String::from_utf16_lossy(&units))
}

/// Decodes a one-byte-unit length prefix: one byte if the high bit is
/// clear, else `((byte0 & 0x7F) << 8) | byte1`.
fn decode_length_1byte(buf: &[u8]) -> Option<(u32, usize)> {
    let b0 = *buf.first()?;
    if b0 & 0x80 == 0 {
        Some((b0 as u32, 1))
    } else {
        let b1 = *buf.get(1)?;
        Some(((((b0 & 0x7F) as u32) << 8) | b1 as u32, 2))
    }
}

/// Decodes a one-16-bit-unit length prefix: one u16 if the high bit is
/// clear, else `((word0 & 0x7FFF) << 16) | word1`.
fn decode_length_2byte(buf: &[u8]) -> Option<(u32, usize)> {
    let w0 = u16::from_le_bytes([*buf.first()?, *buf.get(1)?]);
    if w0 & 0x8000 == 0 {
        Some((w0 as u32, 2))
    } else {
        let w1 = u16::from_le_bytes([*buf.get(2)?, *buf.get(3)?]);
        Some(((((w0 & 0x7FFF) as u32) << 16) | w1 as u32, 4))
    }
}
