//! Error types for the geoip2 library

use std::fmt;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, MmdbError>;

/// Structural problems found while parsing an MMDB file
///
/// Every variant means the file is corrupt or untrusted. They are never
/// recovered from: the current operation is aborted and the error surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The `\xAB\xCD\xEFMaxMind.com` marker is not in the last 128KB
    NoMetadataMarker,
    /// A required metadata key is missing
    IncompleteMetadata(String),
    /// Metadata is present but holds an unusable value
    InvalidMetadata(String),
    /// Reserved or unrecognized type tag in the data section
    UnknownType(u8),
    /// A declared length runs past the end of the buffer
    TruncatedRecord {
        /// Offset where the read started
        offset: usize,
        /// Bytes the record claims to need
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },
    /// Pointer chain deeper than the decoder allows
    PointerLoop,
    /// Containers nested deeper than the decoder allows
    NestingTooDeep,
    /// One decode produced more values than the decoder allows
    TooManyValues,
    /// Payload size is not valid for the type (e.g. an 8-byte float)
    InvalidSize {
        /// Type tag of the value
        type_id: u8,
        /// Declared payload size
        size: usize,
    },
    /// String payload is not valid UTF-8
    InvalidUtf8(usize),
    /// A map key decoded to something other than a string
    InvalidMapKey(usize),
    /// Search tree references a node or data offset outside the file
    CorruptSearchTree(String),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::NoMetadataMarker => write!(f, "MMDB metadata marker not found"),
            FormatError::IncompleteMetadata(key) => {
                write!(f, "Required metadata field '{}' not found", key)
            }
            FormatError::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
            FormatError::UnknownType(t) => write!(f, "Unknown data type {}", t),
            FormatError::TruncatedRecord {
                offset,
                needed,
                available,
            } => write!(
                f,
                "Record at offset {} needs {} bytes but only {} remain",
                offset, needed, available
            ),
            FormatError::PointerLoop => write!(f, "Pointer chain too deep (loop?)"),
            FormatError::NestingTooDeep => write!(f, "Data structures nested too deeply"),
            FormatError::TooManyValues => write!(f, "Record expands to too many values"),
            FormatError::InvalidSize { type_id, size } => {
                write!(f, "Invalid size {} for data type {}", size, type_id)
            }
            FormatError::InvalidUtf8(offset) => {
                write!(f, "Invalid UTF-8 in string at offset {}", offset)
            }
            FormatError::InvalidMapKey(offset) => {
                write!(f, "Map key at offset {} is not a string", offset)
            }
            FormatError::CorruptSearchTree(msg) => write!(f, "Corrupt search tree: {}", msg),
        }
    }
}

impl std::error::Error for FormatError {}

/// Main error type for database operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmdbError {
    /// I/O errors while opening or reading the file
    Io(String),

    /// The file is structurally invalid
    Format(FormatError),

    /// Query text is not an IP address
    InvalidAddress(String),

    /// IPv6 query against an IPv4-only database
    AddressFamily(String),

    /// Operation on a database after `close()`
    Closed,

    /// A decoded value could not be rendered as JSON
    Serialization(String),
}

impl fmt::Display for MmdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmdbError::Io(msg) => write!(f, "I/O error: {}", msg),
            MmdbError::Format(err) => write!(f, "Format error: {}", err),
            MmdbError::InvalidAddress(addr) => write!(f, "Invalid IP address: {}", addr),
            MmdbError::AddressFamily(msg) => write!(f, "Address family mismatch: {}", msg),
            MmdbError::Closed => write!(f, "Database is closed"),
            MmdbError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for MmdbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MmdbError::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MmdbError {
    fn from(err: std::io::Error) -> Self {
        MmdbError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MmdbError {
    fn from(err: serde_json::Error) -> Self {
        MmdbError::Serialization(err.to_string())
    }
}

impl From<FormatError> for MmdbError {
    fn from(err: FormatError) -> Self {
        MmdbError::Format(err)
    }
}
