use nom::number::complete::{le_u16, le_u32};
use nom::sequence::tuple;
use nom::IResult;

use crate::error::Error;

/// The universal 8-byte framing unit shared by AXML and ARSC: `{ type,
/// header_size, total_size }`. Every chunk in both formats begins with one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub typ: u16,
    pub header_size: u16,
    pub total_size: u32,
}

impl ChunkHeader {
    pub const SIZE: usize = 8;

    pub fn parse(input: &[u8]) -> IResult<&[u8], ChunkHeader> {
        let (input, (typ, header_size, total_size)) = tuple((le_u16, le_u16, le_u32))(input)?;
        Ok((
            input,
            ChunkHeader {
                typ,
                header_size,
                total_size,
            },
        ))
    }

    /// Validates the containment invariant from the spec: `total_size >=
    /// header_size >= 8`, and the chunk must fit inside `buffer_len` bytes
    /// starting at `offset`.
    pub fn validate(&self, offset: usize, buffer_len: usize) -> Result<(), Error> {
        if self.header_size < Self::SIZE as u16 || self.total_size < self.header_size as u32 {
            return Err(Error::CorruptChunk(format!(
                "chunk at offset {offset}: header_size={} total_size={}",
                self.header_size, self.total_size
            )));
        }
        if offset.saturating_add(self.total_size as usize) > buffer_len {
            return Err(Error::CorruptChunk(format!(
                "chunk at offset {offset} with total_size {} overruns buffer of length {buffer_len}",
                self.total_size
            )));
        }
        Ok(())
    }
}

/// Realigns `offset` up to the next 4-byte boundary, per the chunk
/// discipline shared by AXML and ARSC.
pub fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

pub struct ChunkType;

impl ChunkType {
    pub const NULL: u16 = 0x0000;
    pub const STRING_POOL: u16 = 0x0001;
    pub const TABLE: u16 = 0x0002;
    pub const XML: u16 = 0x0003;

    pub const XML_START_NAMESPACE: u16 = 0x0100;
    pub const XML_END_NAMESPACE: u16 = 0x0101;
    pub const XML_START_ELEMENT: u16 = 0x0102;
    pub const XML_END_ELEMENT: u16 = 0x0103;
    pub const XML_CDATA: u16 = 0x0104;
    pub const XML_LAST_CHUNK: u16 = 0x017f;
    pub const XML_RESOURCE_MAP: u16 = 0x0180;

    pub const TABLE_PACKAGE: u16 = 0x0200;
    pub const TABLE_TYPE: u16 = 0x0201;
    pub const TABLE_SPEC: u16 = 0x0202;
    pub const TABLE_LIBRARY: u16 = 0x0203;
    pub const TABLE_OVERLAYABLE: u16 = 0x0204;
    pub const TABLE_OVERLAYABLE_POLICY: u16 = 0x0205;
    pub const TABLE_STAGED_ALIAS: u16 = 0x0206;
}

/// Construction-time knob threading through `StringPool`/`AxmlDecoder`/
/// `ArscDecoder`: decode every pooled string eagerly (default, matches the
/// teacher and the reference implementation) or lazily on first `get`.
#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    pub eager_strings: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            eager_strings: true,
        }
    }
}
