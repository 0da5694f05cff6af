use thiserror::Error;

/// Fatal and per-entry failures produced by the decoders.
///
/// Lenient failures (invalid UTF-8/16 payloads, out-of-range string
/// indices, unknown chunk types, missing attributes, resource lookup
/// misses) are never represented here -- they are absorbed at the call
/// site and reported through the [`crate::logger::Logger`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to open file: {0}")]
    File(String),

    #[error("not a zip file: no end-of-central-directory record found")]
    NotAZipFile,

    #[error("zip entry not found: {0}")]
    EntryNotFound(String),

    #[error("unsupported compression method: {0}")]
    UnsupportedMethod(u16),

    #[error("zip decompression failed: {0}")]
    Decompress(String),

    #[error("failed to parse chunk header: {0}")]
    ChunkHeader(String),

    #[error("chunk is corrupt: {0}")]
    CorruptChunk(String),

    #[error("failed to parse string pool: {0}")]
    StringPool(String),

    #[error("failed to parse start element: {0}")]
    StartElement(String),

    #[error("unmatched end tag: expected `{expected}`, found `{found}`")]
    UnmatchedEndTag { expected: String, found: String },

    #[error("failed to parse attribute: {0}")]
    Attribute(String),

    #[error("failed to parse package header: {0}")]
    PackageHeader(String),

    #[error("unsupported entry offset encoding: flags={0}")]
    UnsupportedEntryEncoding(u8),

    #[error("failed to parse table entry: {0}")]
    TableEntry(String),

    #[error("{0}")]
    Generic(String),
}

pub type Result<T> = std::result::Result<T, Error>;
