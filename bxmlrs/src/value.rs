//! The tagged `TypedValue` shared by AXML attributes and ARSC resource
//! entries (`Res_value` in the platform headers).
//!
//! Grounded on the teacher's `nom_parser::ResValue`/`ResType`, replacing its
//! `data_type: u8` plus an ad-hoc `as_string` method with the tagged variant
//! the spec calls for (Design Note 9), so the data_type/data split only
//! needs to be interpreted once no matter which decoder produced it.

use nom::combinator::map;
use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::sequence::tuple;
use nom::IResult;

use crate::string_pool::StringPool;

pub struct DataType;

impl DataType {
    pub const NULL: u8 = 0x00;
    pub const REFERENCE: u8 = 0x01;
    pub const ATTRIBUTE: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const FLOAT: u8 = 0x04;
    pub const DIMENSION: u8 = 0x05;
    pub const FRACTION: u8 = 0x06;
    pub const DYNAMIC_REFERENCE: u8 = 0x07;
    pub const DYNAMIC_ATTRIBUTE: u8 = 0x08;
    pub const INT_DEC: u8 = 0x10;
    pub const INT_HEX: u8 = 0x11;
    pub const INT_BOOLEAN: u8 = 0x12;
    pub const COLOR_ARGB8: u8 = 0x1c;
    pub const COLOR_RGB8: u8 = 0x1d;
    pub const COLOR_ARGB4: u8 = 0x1e;
    pub const COLOR_RGB4: u8 = 0x1f;
}

/// The raw, still-tagged form of a `Res_value`: `{ size, res0, data_type,
/// data }`. `size`/`res0` are carried for completeness but unused past
/// parsing, matching the teacher's `ResValue`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawValue {
    pub size: u16,
    pub data_type: u8,
    pub data: u32,
}

impl RawValue {
    pub const SIZE: usize = 8;

    pub fn parse(input: &[u8]) -> IResult<&[u8], RawValue> {
        map(
            tuple((le_u16, le_u8, le_u8, le_u32)),
            |(size, _res0, data_type, data)| RawValue {
                size,
                data_type,
                data,
            },
        )(input)
    }

    pub fn decode(&self) -> TypedValue {
        match self.data_type {
            DataType::NULL => TypedValue::Null,
            DataType::REFERENCE | DataType::DYNAMIC_REFERENCE => TypedValue::Reference(self.data),
            DataType::STRING => TypedValue::String(self.data),
            DataType::INT_DEC => TypedValue::Int(self.data as i32),
            DataType::INT_HEX
            | DataType::COLOR_ARGB8
            | DataType::COLOR_RGB8
            | DataType::COLOR_ARGB4
            | DataType::COLOR_RGB4 => TypedValue::Hex(self.data),
            DataType::INT_BOOLEAN => TypedValue::Bool(self.data != 0),
            DataType::FLOAT => TypedValue::Float(f32::from_bits(self.data)),
            DataType::DIMENSION | DataType::FRACTION | DataType::ATTRIBUTE => {
                TypedValue::Raw(self.data)
            }
            DataType::DYNAMIC_ATTRIBUTE => TypedValue::Raw(self.data),
            _ => TypedValue::Null,
        }
    }
}

/// Tagged decode of a [`RawValue`], per Design Note 9.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    Null,
    Reference(u32),
    String(u32),
    Int(i32),
    Hex(u32),
    Bool(bool),
    Float(f32),
    Raw(u32),
}

impl TypedValue {
    /// Canonical string form for an AXML attribute value, per the §4.3
    /// decoding table: references and hex-ish types print bare `0x..`.
    pub fn to_axml_string(&self, pool: &StringPool) -> String {
        match self {
            TypedValue::Null => String::new(),
            TypedValue::Reference(v) | TypedValue::Hex(v) | TypedValue::Raw(v) => {
                format!("0x{v:x}")
            }
            TypedValue::String(idx) => pool.get(*idx),
            TypedValue::Int(v) => v.to_string(),
            TypedValue::Bool(v) => v.to_string(),
            TypedValue::Float(v) => format!("{v:.2}"),
        }
    }

    /// Canonical string form for an ARSC resource entry, matching the
    /// teacher's `ResValue::as_string` prefixing (`@res/`, `@attr/`, `@dyn/`)
    /// used while chasing resource references.
    pub fn to_arsc_string(&self, pool: &StringPool) -> String {
        match self {
            TypedValue::Null => String::new(),
            TypedValue::Reference(v) => format!("@res/0x{v:x}"),
            TypedValue::Hex(v) => format!("0x{v:X}"),
            TypedValue::Raw(v) => format!("@attr/0x{v:x}"),
            TypedValue::String(idx) => pool.get(*idx),
            TypedValue::Int(v) => v.to_string(),
            TypedValue::Bool(v) => v.to_string(),
            TypedValue::Float(v) => format!("{v:.2}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bool_and_dec() {
        let raw = RawValue {
            size: 8,
            data_type: DataType::INT_BOOLEAN,
            data: 1,
        };
        assert_eq!(raw.decode(), TypedValue::Bool(true));

        let raw = RawValue {
            size: 8,
            data_type: DataType::INT_DEC,
            data: 42,
        };
        assert_eq!(raw.decode(), TypedValue::Int(42));
    }

    #[test]
    fn decodes_float_bits() {
        let raw = RawValue {
            size: 8,
            data_type: DataType::FLOAT,
            data: 1.5f32.to_bits(),
        };
        assert_eq!(raw.decode(), TypedValue::Float(1.5));
    }

    #[test]
    fn unknown_type_becomes_null() {
        let raw = RawValue {
            size: 8,
            data_type: 0xFE,
            data: 0,
        };
        assert_eq!(raw.decode(), TypedValue::Null);
    }

    #[test]
    fn parse_reads_exactly_eight_bytes() {
        let mut buf = vec![8, 0, 0, DataType::INT_DEC];
        buf.extend_from_slice(&7u32.to_le_bytes());
        buf.push(0xAA); // trailing byte belongs to the next structure
        let (rest, raw) = RawValue::parse(&buf).unwrap();
        assert_eq!(raw.decode(), TypedValue::Int(7));
        assert_eq!(rest, &[0xAA]);
    }
}
