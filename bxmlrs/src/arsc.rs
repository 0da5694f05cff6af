//! Decodes a compiled resource table (`resources.arsc`): packages, their
//! type-spec/type-table chunks, and the per-entry typed values they index.
//!
//! Grounded on the teacher's `arsc_parser::Arsc::parse` chunk walk (global
//! string pool, `TABLE_PACKAGE` dispatch, type/key string pool offsets) and
//! `nom_parser::{PackageChunkHeader, TypeChunkHeader, TableEntry,
//! TableMapEntry}` for the exact field layouts, generalized to collect every
//! configuration variant of an entry rather than only the first.

use std::collections::HashMap;

use nom::multi::count;
use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::sequence::tuple;
use nom::IResult;

use crate::chunk::{align4, ChunkHeader, ChunkType};
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::string_pool::StringPool;
use crate::value::{RawValue, TypedValue};

const COMPLEX_FLAG: u16 = 0x0001;
const PACKAGE_NAME_UNITS: usize = 128;

#[derive(Clone, Debug)]
enum EntryValue {
    Simple(TypedValue),
    /// Map (complex) entries are recognised but not traversed: the spec
    /// leaves full name/value map resolution out of scope.
    Complex { parent_ref: u32, count: u32 },
}

#[derive(Clone, Debug)]
struct ResourceEntry {
    key_string_id: u32,
    value: EntryValue,
}

struct TypeTable {
    entries: Vec<Option<ResourceEntry>>,
}

struct Package<'a> {
    #[allow(dead_code)]
    name: String,
    key_strings: StringPool<'a>,
    #[allow(dead_code)]
    type_strings: StringPool<'a>,
    type_instances: HashMap<u8, Vec<TypeTable>>,
}

/// A decoded resource table. Holds non-owning views into the ARSC buffer via
/// its string pools; everything else (entry offsets, typed values) is
/// resolved into owned, lifetime-free data at construction time.
pub struct ArscDecoder<'a> {
    global_strings: StringPool<'a>,
    packages: HashMap<u8, Package<'a>>,
}

impl<'a> ArscDecoder<'a> {
    pub fn parse(buffer: &'a [u8], logger: &dyn Logger) -> Result<Self> {
        let opts = crate::chunk::DecodeOptions::default();
        let (_, outer) =
            ChunkHeader::parse(buffer).map_err(|e| Error::ChunkHeader(e.to_string()))?;
        outer.validate(0, buffer.len())?;

        let mut global_strings: Option<StringPool> = None;
        let mut packages: HashMap<u8, Package> = HashMap::new();

        let mut offset = (outer.header_size as usize).max(ChunkHeader::SIZE + 4);
        while offset + ChunkHeader::SIZE <= buffer.len() {
            let chunk = &buffer[offset..];
            let (_, header) =
                ChunkHeader::parse(chunk).map_err(|e| Error::ChunkHeader(e.to_string()))?;
            header.validate(offset, buffer.len())?;
            let slice = &buffer[offset..offset + header.total_size as usize];

            match header.typ {
                ChunkType::STRING_POOL => {
                    global_strings = Some(StringPool::parse(slice, opts, logger)?);
                }
                ChunkType::TABLE_PACKAGE => {
                    let (id, package) = parse_package(slice, offset, buffer, logger)?;
                    if packages.contains_key(&id) {
                        logger.warn(&format!("arsc: duplicate package id {id}, ignoring"));
                    } else {
                        packages.insert(id, package);
                    }
                }
                _ => {
                    logger.warn(&format!(
                        "arsc: unknown outer chunk type 0x{:x} at offset {offset}, skipping",
                        header.typ
                    ));
                }
            }

            if header.total_size == 0 {
                break;
            }
            offset = align4(offset + header.total_size as usize);
        }

        let global_strings = global_strings
            .ok_or_else(|| Error::Generic("arsc: no global string pool found".into()))?;

        Ok(Self {
            global_strings,
            packages,
        })
    }

    /// Decomposes `res_id` as `(package_id << 24) | (type_id << 16) |
    /// entry_index` and returns every `(key_name, decoded_value)` pair found
    /// across all configuration variants of that type, in parse order.
    pub fn lookup(&self, res_id: u32) -> Vec<(String, String)> {
        let package_id = (res_id >> 24) as u8;
        let type_id = ((res_id >> 16) & 0xFF) as u8;
        let entry_index = (res_id & 0xFFFF) as usize;

        let Some(package) = self.packages.get(&package_id) else {
            return Vec::new();
        };
        let Some(instances) = package.type_instances.get(&type_id) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for table in instances {
            let Some(Some(entry)) = table.entries.get(entry_index) else {
                continue;
            };
            let key = package.key_strings.get(entry.key_string_id);
            let value = match &entry.value {
                EntryValue::Simple(tv) => tv.to_arsc_string(&self.global_strings),
                EntryValue::Complex { .. } => String::new(),
            };
            results.push((key, value));
        }
        results
    }
}

fn parse_package<'a>(
    slice: &'a [u8],
    package_offset: usize,
    buffer: &'a [u8],
    logger: &dyn Logger,
) -> Result<(u8, Package<'a>)> {
    let (_, package_header) =
        ChunkHeader::parse(slice).map_err(|e| Error::PackageHeader(e.to_string()))?;
    let fixed = slice
        .get(ChunkHeader::SIZE..)
        .ok_or_else(|| Error::PackageHeader("package header truncated".into()))?;
    let (_, (id, name_units, type_strings_off, _last_public_type, key_strings_off, _last_public_key)) =
        parse_package_fixed(fixed)
            .map_err(|e: nom::Err<nom::error::Error<&[u8]>>| Error::PackageHeader(e.to_string()))?;

    let id = id as u8;
    let name = decode_fixed_utf16(&name_units);
    let type_strings_off = type_strings_off as usize;
    let key_strings_off = key_strings_off as usize;

    let opts = crate::chunk::DecodeOptions::default();

    let type_strings_abs = package_offset + type_strings_off;
    let (_, type_pool_header) = ChunkHeader::parse(&buffer[type_strings_abs..])
        .map_err(|e| Error::PackageHeader(format!("type strings pool: {e}")))?;
    let type_strings = StringPool::parse(
        &buffer[type_strings_abs..type_strings_abs + type_pool_header.total_size as usize],
        opts,
        logger,
    )?;

    let key_strings_abs = package_offset + key_strings_off;
    let (_, key_pool_header) = ChunkHeader::parse(&buffer[key_strings_abs..])
        .map_err(|e| Error::PackageHeader(format!("key strings pool: {e}")))?;
    let key_strings = StringPool::parse(
        &buffer[key_strings_abs..key_strings_abs + key_pool_header.total_size as usize],
        opts,
        logger,
    )?;

    let mut cursor = key_strings_abs + key_pool_header.total_size as usize;
    let package_end = package_offset + package_header.total_size as usize;

    let mut type_specs: HashMap<u8, Vec<u32>> = HashMap::new();
    let mut type_instances: HashMap<u8, Vec<TypeTable>> = HashMap::new();

    while cursor + ChunkHeader::SIZE <= package_end && cursor + ChunkHeader::SIZE <= buffer.len() {
        let chunk = &buffer[cursor..];
        let (_, header) =
            ChunkHeader::parse(chunk).map_err(|e| Error::ChunkHeader(e.to_string()))?;
        header.validate(cursor, buffer.len())?;
        let chunk_slice = &buffer[cursor..cursor + header.total_size as usize];

        match header.typ {
            ChunkType::TABLE_SPEC => {
                let (spec_id, flags) = parse_type_spec(chunk_slice)?;
                type_specs.insert(spec_id, flags);
            }
            ChunkType::TABLE_TYPE => match parse_type_table(chunk_slice) {
                Ok((type_id, table)) if type_id != 0 => {
                    type_instances.entry(type_id).or_default().push(table);
                }
                Ok(_) => logger.warn("arsc: type table with id 0, skipping"),
                Err(e) => return Err(e),
            },
            _ => {
                logger.debug(&format!(
                    "arsc: skipping package-inner chunk type 0x{:x}",
                    header.typ
                ));
            }
        }

        if header.total_size == 0 {
            break;
        }
        cursor = align4(cursor + header.total_size as usize);
    }

    Ok((
        id,
        Package {
            name,
            key_strings,
            type_strings,
            type_instances,
        },
    ))
}

#[allow(clippy::type_complexity)]
fn parse_package_fixed(input: &[u8]) -> IResult<&[u8], (u32, Vec<u16>, u32, u32, u32, u32)> {
    tuple((
        le_u32,
        count(le_u16, PACKAGE_NAME_UNITS),
        le_u32,
        le_u32,
        le_u32,
        le_u32,
    ))(input)
}

fn decode_fixed_utf16(units: &[u16]) -> String {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// `{ id, res0, res1, entry_count }`.
fn parse_type_spec_fixed(input: &[u8]) -> IResult<&[u8], (u8, u8, u16, u32)> {
    tuple((le_u8, le_u8, le_u16, le_u32))(input)
}

/// `{ id, res0, res1, entry_count, entry_flags[entry_count] }`.
fn parse_type_spec(slice: &[u8]) -> Result<(u8, Vec<u32>)> {
    let body = slice
        .get(ChunkHeader::SIZE..)
        .ok_or_else(|| Error::TableEntry("type spec header truncated".into()))?;
    let (rest, (id, _res0, _res1, entry_count)) = parse_type_spec_fixed(body)
        .map_err(|e: nom::Err<nom::error::Error<&[u8]>>| Error::TableEntry(e.to_string()))?;
    let (_, flags) = count(le_u32::<_, nom::error::Error<&[u8]>>, entry_count as usize)(rest)
        .map_err(|e| Error::TableEntry(e.to_string()))?;
    Ok((id, flags))
}

/// `{ id, flags, res1, entry_count, entries_start }`.
fn parse_type_table_fixed(input: &[u8]) -> IResult<&[u8], (u8, u8, u16, u32, u32)> {
    tuple((le_u8, le_u8, le_u16, le_u32, le_u32))(input)
}

/// The config blob's own length is its first `u32`; the rest is skipped,
/// matching the teacher's `type_chunk_config` (the per-field config layout
/// isn't needed for entry decoding).
fn parse_type_table_config(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, total_len) = le_u32(input)?;
    let body_len = (total_len as usize).saturating_sub(4);
    nom::bytes::complete::take(body_len)(input)
}

/// `{ id, flags, res1, entry_count, entries_start, config_blob,
/// entry_offsets[entry_count], entries }`.
fn parse_type_table(slice: &[u8]) -> Result<(u8, TypeTable)> {
    let body = slice
        .get(ChunkHeader::SIZE..)
        .ok_or_else(|| Error::TableEntry("type table header truncated".into()))?;
    let (rest, (id, flags, _res1, entry_count, entries_start)) = parse_type_table_fixed(body)
        .map_err(|e: nom::Err<nom::error::Error<&[u8]>>| Error::TableEntry(e.to_string()))?;
    let (rest, _config) = parse_type_table_config(rest)
        .map_err(|e: nom::Err<nom::error::Error<&[u8]>>| Error::TableEntry(e.to_string()))?;
    let (_, offsets) = count(le_u32::<_, nom::error::Error<&[u8]>>, entry_count as usize)(rest)
        .map_err(|e| Error::TableEntry(e.to_string()))?;

    let entries_region = slice
        .get(entries_start as usize..)
        .ok_or_else(|| Error::TableEntry("type table entries region truncated".into()))?;

    let mut entries: Vec<Option<ResourceEntry>> = vec![None; entry_count as usize];
    match flags {
        0 => {
            for (i, &raw_offset) in offsets.iter().enumerate() {
                if raw_offset == 0xFFFF_FFFF {
                    continue;
                }
                entries[i] = parse_resource_entry(entries_region, raw_offset as usize)?;
            }
        }
        1 => {
            for &packed in &offsets {
                let slot = (packed & 0xFFFF) as usize;
                let byte_offset = ((packed >> 16) as usize) * 4;
                if slot >= entries.len() {
                    continue;
                }
                entries[slot] = parse_resource_entry(entries_region, byte_offset)?;
            }
        }
        other => return Err(Error::UnsupportedEntryEncoding(other)),
    }

    Ok((id, TypeTable { entries }))
}

fn parse_resource_entry_fixed(input: &[u8]) -> IResult<&[u8], (u16, u16, u32)> {
    tuple((le_u16, le_u16, le_u32))(input)
}

fn parse_complex_map_header(input: &[u8]) -> IResult<&[u8], (u32, u32)> {
    tuple((le_u32, le_u32))(input)
}

/// `{ size, flags, key_string_id }` followed by either a `TypedValue` or, if
/// `COMPLEX_FLAG` is set, `{ parent_ref, count, map_entries[count] }` (the
/// map entries themselves are skipped, per the complex-entry non-goal).
fn parse_resource_entry(region: &[u8], offset: usize) -> Result<Option<ResourceEntry>> {
    let Some(header_region) = region.get(offset..) else {
        return Ok(None);
    };
    let Ok((body, (_size, flags, key_string_id))) = parse_resource_entry_fixed(header_region)
    else {
        return Ok(None);
    };

    if flags & COMPLEX_FLAG != 0 {
        let (_, (parent_ref, count)) = parse_complex_map_header(body)
            .map_err(|e: nom::Err<nom::error::Error<&[u8]>>| {
                Error::TableEntry(format!("complex entry map header truncated: {e}"))
            })?;
        Ok(Some(ResourceEntry {
            key_string_id,
            value: EntryValue::Complex { parent_ref, count },
        }))
    } else {
        let (_, raw) = RawValue::parse(body).map_err(|e: nom::Err<nom::error::Error<&[u8]>>| {
            Error::TableEntry(format!("resource entry value truncated: {e}"))
        })?;
        Ok(Some(ResourceEntry {
            key_string_id,
            value: EntryValue::Simple(raw.decode()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;

    fn string_pool(strings: &[&str]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for s in strings {
            offsets.push(data.len() as u32);
            data.push(s.chars().count() as u8);
            data.push(s.len() as u8);
            data.extend_from_slice(s.as_bytes());
            data.push(0);
        }
        let header_size = 28u32;
        let strings_start = header_size + 4 * strings.len() as u32;
        let total_size = strings_start + data.len() as u32;

        let mut chunk = Vec::new();
        chunk.extend_from_slice(&1u16.to_le_bytes());
        chunk.extend_from_slice(&(header_size as u16).to_le_bytes());
        chunk.extend_from_slice(&total_size.to_le_bytes());
        chunk.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        chunk.extend_from_slice(&0u32.to_le_bytes());
        chunk.extend_from_slice(&0x100u32.to_le_bytes());
        chunk.extend_from_slice(&strings_start.to_le_bytes());
        chunk.extend_from_slice(&0u32.to_le_bytes());
        for o in &offsets {
            chunk.extend_from_slice(&o.to_le_bytes());
        }
        chunk.extend_from_slice(&data);
        chunk
    }

    fn pad4(buf: &mut Vec<u8>) {
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
    }

    /// Builds a minimal one-package, one-type, one-entry resources.arsc.
    fn build_arsc() -> Vec<u8> {
        let mut doc = Vec::new();
        // Outer TABLE header: ChunkHeader + package_count.
        doc.extend_from_slice(&2u16.to_le_bytes());
        doc.extend_from_slice(&12u16.to_le_bytes());
        doc.extend_from_slice(&0u32.to_le_bytes()); // total size, patched later
        doc.extend_from_slice(&1u32.to_le_bytes()); // package_count

        let global_pool = string_pool(&["app_name"]);
        doc.extend_from_slice(&global_pool);
        pad4(&mut doc);

        let mut package = Vec::new();
        // Package header: ChunkHeader(8) + id(4) + name(256) + type_strings(4)
        // + last_public_type(4) + key_strings(4) + last_public_key(4).
        package.extend_from_slice(&0x0200u16.to_le_bytes());
        package.extend_from_slice(&0u16.to_le_bytes()); // header_size, patched later
        package.extend_from_slice(&0u32.to_le_bytes()); // total size, patched later
        package.extend_from_slice(&0x7Fu32.to_le_bytes()); // id
        let mut name = "com.example".encode_utf16().collect::<Vec<u16>>();
        name.resize(PACKAGE_NAME_UNITS, 0);
        for u in &name {
            package.extend_from_slice(&u.to_le_bytes());
        }
        let header_size = package.len() as u16 + 16; // + the 4 trailing u32 fields
        let type_strings_off = header_size as u32;

        let type_pool = string_pool(&["string"]);
        let key_pool = string_pool(&["app_name"]);
        let key_strings_off = type_strings_off + type_pool.len() as u32;

        package.extend_from_slice(&type_strings_off.to_le_bytes());
        package.extend_from_slice(&0u32.to_le_bytes()); // last_public_type
        package.extend_from_slice(&key_strings_off.to_le_bytes());
        package.extend_from_slice(&0u32.to_le_bytes()); // last_public_key

        package[2..4].copy_from_slice(&header_size.to_le_bytes());

        package.extend_from_slice(&type_pool);
        package.extend_from_slice(&key_pool);

        // TABLE_TYPE_SPEC: id=1, entry_count=1, flags=[0].
        let spec_start = package.len();
        package.extend_from_slice(&0x0202u16.to_le_bytes());
        package.extend_from_slice(&16u16.to_le_bytes());
        package.extend_from_slice(&0u32.to_le_bytes()); // total size, patched
        package.push(1); // id
        package.push(0);
        package.extend_from_slice(&0u16.to_le_bytes());
        package.extend_from_slice(&1u32.to_le_bytes()); // entry_count
        package.extend_from_slice(&0u32.to_le_bytes()); // flags[0]
        let spec_total = (package.len() - spec_start) as u32;
        package[spec_start + 4..spec_start + 8].copy_from_slice(&spec_total.to_le_bytes());

        // TABLE_TYPE: id=1, flags=0 (dense), entry_count=1.
        let type_start = package.len();
        package.extend_from_slice(&0x0201u16.to_le_bytes());
        package.extend_from_slice(&0u16.to_le_bytes()); // header_size, patched
        package.extend_from_slice(&0u32.to_le_bytes()); // total size, patched
        package.push(1); // id
        package.push(0); // flags = dense
        package.extend_from_slice(&0u16.to_le_bytes());
        package.extend_from_slice(&1u32.to_le_bytes()); // entry_count
        package.extend_from_slice(&0u32.to_le_bytes()); // entries_start, patched
        package.extend_from_slice(&4u32.to_le_bytes()); // config blob len = 4 (empty)
        let header_size = (package.len() - type_start) as u16;
        package.extend_from_slice(&0u32.to_le_bytes()); // entry offset[0] = 0
        let entries_start = (package.len() - type_start) as u32;

        // ResourceEntry: size=8, flags=0, key_string_id=0, then TypedValue
        // INT_DEC(16) data=42.
        package.extend_from_slice(&8u16.to_le_bytes());
        package.extend_from_slice(&0u16.to_le_bytes());
        package.extend_from_slice(&0u32.to_le_bytes());
        package.extend_from_slice(&8u16.to_le_bytes());
        package.push(0);
        package.push(0x10);
        package.extend_from_slice(&42u32.to_le_bytes());

        let type_total = (package.len() - type_start) as u32;
        package[type_start + 2..type_start + 4].copy_from_slice(&header_size.to_le_bytes());
        package[type_start + 4..type_start + 8].copy_from_slice(&type_total.to_le_bytes());
        package[type_start + 12..type_start + 16].copy_from_slice(&entries_start.to_le_bytes());

        let package_total = package.len() as u32;
        package[4..8].copy_from_slice(&package_total.to_le_bytes());

        doc.extend_from_slice(&package);

        let total = doc.len() as u32;
        doc[4..8].copy_from_slice(&total.to_le_bytes());
        doc
    }

    #[test]
    fn looks_up_simple_entry() {
        let arsc = build_arsc();
        let decoder = ArscDecoder::parse(&arsc, &NoopLogger).unwrap();
        let res_id = (0x7Fu32 << 24) | (1u32 << 16) | 0;
        let results = decoder.lookup(res_id);
        assert_eq!(results, vec![("app_name".to_string(), "42".to_string())]);
    }

    #[test]
    fn unknown_resource_id_returns_empty() {
        let arsc = build_arsc();
        let decoder = ArscDecoder::parse(&arsc, &NoopLogger).unwrap();
        assert!(decoder.lookup(0xFF010000).is_empty());
    }
}
