//! Indexes and extracts entries from the ZIP envelope around an APK.
//!
//! APKs routinely bend the ZIP spec to frustrate generic unzippers:
//! multiple End-Of-Central-Directory signatures, local/central file-header
//! size fields that disagree, duplicate entry names. This reader
//! deliberately does not delegate to a general-purpose ZIP crate -- it
//! reproduces the platform loader's tolerance for these quirks, grounded on
//! `examples/original_source/parser/zip_parser.py` (`ZipFile.__init__`'s
//! backward EOCD scan and the Local/CentralDirectory field layouts).

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::DeflateDecoder;

use crate::error::{Error, Result};
use crate::logger::{Logger, NoopLogger};

const EOCD_SIG: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const CENTDIR_SIG: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
const LOCAL_SIG: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

const EOCD_MIN_SIZE: usize = 22;
const CENTDIR_FIXED_SIZE: usize = 46;
const LOCAL_FIXED_SIZE: usize = 30;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

#[derive(Clone, Debug)]
struct CentralDirEntry {
    compression_method: u16,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
}

struct EndOfCentralDirectory {
    total_entries: u16,
    central_dir_offset: u32,
}

/// Owns the entire APK byte buffer and indexes its central directory.
/// Local headers are located and decompressed on demand in [`ZipReader::read`].
pub struct ZipReader {
    data: Vec<u8>,
    names: Vec<Vec<u8>>,
    entries: HashMap<Vec<u8>, CentralDirEntry>,
}

impl ZipReader {
    pub fn open(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| Error::File(e.to_string()))?;
        Self::from_bytes(data, &NoopLogger)
    }

    pub fn from_bytes(data: Vec<u8>, logger: &dyn Logger) -> Result<Self> {
        let eocd = find_eocd(&data)?;
        let mut names = Vec::with_capacity(eocd.total_entries as usize);
        let mut entries = HashMap::with_capacity(eocd.total_entries as usize);

        let mut offset = eocd.central_dir_offset as usize;
        for i in 0..eocd.total_entries {
            let entry = match parse_central_dir_entry(&data, offset) {
                Ok((entry, name, next_offset)) => {
                    offset = next_offset;
                    (entry, name)
                }
                Err(e) => {
                    logger.warn(&format!(
                        "central directory truncated after {i} of {} entries: {e}",
                        eocd.total_entries
                    ));
                    break;
                }
            };
            let (entry, name) = entry;
            // First occurrence wins; matches the Android installer.
            if !entries.contains_key(&name) {
                names.push(name.clone());
                entries.insert(name, entry);
            }
        }

        Ok(Self {
            data,
            names,
            entries,
        })
    }

    /// Entry names in central-directory order (first occurrence only).
    pub fn names(&self) -> &[Vec<u8>] {
        &self.names
    }

    pub fn has(&self, name: &[u8]) -> bool {
        self.entries.contains_key(name)
    }

    /// The raw, still-compressed APK byte buffer backing this reader.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads and decompresses an entry's contents.
    pub fn read(&self, name: &[u8]) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::EntryNotFound(String::from_utf8_lossy(name).into_owned()))?;

        let raw = local_file_payload(&self.data, entry)?;
        decompress(raw, entry.compression_method)
    }

    /// The central directory's declared `uncompressed_size` for `name`,
    /// without decompressing the entry. Callers that only need to validate
    /// `read(name).len()` against the advertised size can use this instead.
    pub fn read_raw_len(&self, name: &[u8]) -> Result<u32> {
        self.entries
            .get(name)
            .map(|entry| entry.uncompressed_size)
            .ok_or_else(|| Error::EntryNotFound(String::from_utf8_lossy(name).into_owned()))
    }
}

fn find_eocd(data: &[u8]) -> Result<EndOfCentralDirectory> {
    let mut search_end = data.len();
    loop {
        let haystack = &data[..search_end];
        let pos = rfind(haystack, &EOCD_SIG).ok_or(Error::NotAZipFile)?;
        let tail_len = haystack.len() - pos;
        if tail_len >= EOCD_MIN_SIZE {
            return parse_eocd(data, pos);
        }
        // Tail too short to hold the fixed EOCD fields (an anti-analysis
        // appended fake signature); drop it and keep scanning backward.
        if pos == 0 {
            return Err(Error::NotAZipFile);
        }
        search_end = pos;
    }
}

fn parse_eocd(data: &[u8], pos: usize) -> Result<EndOfCentralDirectory> {
    let fields = data
        .get(pos + 4..pos + EOCD_MIN_SIZE)
        .ok_or(Error::NotAZipFile)?;
    let total_entries = u16::from_le_bytes([fields[6], fields[7]]);
    let central_dir_offset = u32::from_le_bytes([fields[12], fields[13], fields[14], fields[15]]);
    Ok(EndOfCentralDirectory {
        total_entries,
        central_dir_offset,
    })
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Parses one CentralDirectory record at `offset`, returning the entry, its
/// name, and the offset of the next record.
fn parse_central_dir_entry(
    data: &[u8],
    offset: usize,
) -> Result<(CentralDirEntry, Vec<u8>, usize)> {
    let header = data
        .get(offset..offset + CENTDIR_FIXED_SIZE)
        .ok_or_else(|| Error::Generic("central directory record truncated".into()))?;
    if header[..4] != CENTDIR_SIG {
        return Err(Error::Generic(format!(
            "central directory signature mismatch at offset {offset}"
        )));
    }

    let compression_method = u16::from_le_bytes([header[10], header[11]]);
    let compressed_size = u32::from_le_bytes([header[20], header[21], header[22], header[23]]);
    let uncompressed_size = u32::from_le_bytes([header[24], header[25], header[26], header[27]]);
    let name_len = u16::from_le_bytes([header[28], header[29]]) as usize;
    let extra_len = u16::from_le_bytes([header[30], header[31]]) as usize;
    let comment_len = u16::from_le_bytes([header[32], header[33]]) as usize;
    let local_header_offset =
        u32::from_le_bytes([header[42], header[43], header[44], header[45]]);

    let name_start = offset + CENTDIR_FIXED_SIZE;
    let name = data
        .get(name_start..name_start + name_len)
        .ok_or_else(|| Error::Generic("central directory name truncated".into()))?
        .to_vec();

    let next_offset = name_start + name_len + extra_len + comment_len;

    Ok((
        CentralDirEntry {
            compression_method,
            compressed_size,
            uncompressed_size,
            local_header_offset,
        },
        name,
        next_offset,
    ))
}

/// Locates an entry's compressed payload via its local file header.
///
/// Critical quirk: bounds the payload using the LocalFileHeader's own
/// `extra_field_len` (to find where data starts) but the CentralDirectory's
/// `compressed_size` (to find where it ends), since the two records'
/// extra fields differ in Android-built APKs. When the central directory's
/// method is not DEFLATE, Android treats the entry as STORED regardless of
/// the declared method, so the payload is bounded by `uncompressed_size`
/// instead.
fn local_file_payload<'a>(data: &'a [u8], entry: &CentralDirEntry) -> Result<&'a [u8]> {
    let offset = entry.local_header_offset as usize;
    let header = data
        .get(offset..offset + LOCAL_FIXED_SIZE)
        .ok_or_else(|| Error::Generic("local file header truncated".into()))?;
    if header[..4] != LOCAL_SIG {
        return Err(Error::Generic(format!(
            "local file header signature mismatch at offset {offset}"
        )));
    }
    let name_len = u16::from_le_bytes([header[26], header[27]]) as usize;
    let extra_len = u16::from_le_bytes([header[28], header[29]]) as usize;

    let data_start = offset + LOCAL_FIXED_SIZE + name_len + extra_len;
    let data_len = if entry.compression_method == METHOD_DEFLATE {
        entry.compressed_size as usize
    } else {
        entry.uncompressed_size as usize
    };

    data.get(data_start..data_start + data_len)
        .ok_or_else(|| Error::Generic("local file payload truncated".into()))
}

fn decompress(raw: &[u8], method: u16) -> Result<Vec<u8>> {
    match method {
        METHOD_STORED => Ok(raw.to_vec()),
        METHOD_DEFLATE => {
            let mut decoder = DeflateDecoder::new(raw);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Error::Decompress(e.to_string()))?;
            Ok(out)
        }
        other => Err(Error::UnsupportedMethod(other)),
    }
}
