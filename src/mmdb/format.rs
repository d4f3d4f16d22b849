//! MMDB Binary Format Parsing
//!
//! Locates the metadata block at the end of the file, decodes it once into
//! a typed [`Metadata`], and derives the [`MmdbHeader`] layout needed for
//! lookups. Everything else stays in the byte buffer.
//!
//! Layout:
//! ```text
//! [search tree][16 zero bytes][data section]["\xAB\xCD\xEFMaxMind.com"][metadata map]
//! ```

use super::types::{
    IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER,
};
use crate::data_section::{DataDecoder, DataMap, DataValue};
use crate::error::FormatError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Metadata is appended last and is small; only the tail is searched
const METADATA_SEARCH_SIZE: usize = 128 * 1024;

/// Only major version 2 of the binary format exists
const SUPPORTED_MAJOR_VERSION: u16 = 2;

/// Typed database metadata, decoded once at open
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28 or 32)
    pub record_size: u16,
    /// IP version of the tree (4 or 6)
    pub ip_version: u16,
    /// Database type, e.g. "GeoIP2-City"
    pub database_type: String,
    /// Locale codes the records may contain names for
    pub languages: Vec<String>,
    /// Binary format major version
    pub binary_format_major_version: u16,
    /// Binary format minor version
    pub binary_format_minor_version: u16,
    /// Build time as seconds since the Unix epoch
    pub build_epoch: u64,
    /// Description keyed by language code
    pub description: BTreeMap<String, String>,
}

impl Metadata {
    /// Build typed metadata from the decoded metadata map
    pub fn from_value(value: &DataValue) -> Result<Self, FormatError> {
        let map = value
            .as_map()
            .ok_or_else(|| FormatError::InvalidMetadata("Metadata is not a map".to_string()))?;

        let node_count = required_uint(map, "node_count")?;
        let node_count = u32::try_from(node_count).map_err(|_| {
            FormatError::InvalidMetadata(format!("node_count {} exceeds 32 bits", node_count))
        })?;
        let record_size = RecordSize::from_bits(required_uint(map, "record_size")?)?;
        let ip_version = IpVersion::from_number(required_uint(map, "ip_version")?)?;
        let major = required_uint(map, "binary_format_major_version")?;
        let minor = optional_uint(map, "binary_format_minor_version")?.unwrap_or(0);
        let minor = u16::try_from(minor).map_err(|_| {
            FormatError::InvalidMetadata(format!(
                "binary_format_minor_version {} exceeds 16 bits",
                minor
            ))
        })?;
        if major != SUPPORTED_MAJOR_VERSION as u64 {
            return Err(FormatError::InvalidMetadata(format!(
                "Unsupported binary format major version {}",
                major
            )));
        }

        Ok(Metadata {
            node_count,
            record_size: record_size.bits(),
            ip_version: ip_version.number(),
            database_type: optional_string(map, "database_type")?.unwrap_or_default(),
            languages: optional_strings(map, "languages")?,
            binary_format_major_version: SUPPORTED_MAJOR_VERSION,
            binary_format_minor_version: minor,
            build_epoch: optional_uint(map, "build_epoch")?.unwrap_or(0),
            description: optional_descriptions(map, "description")?,
        })
    }
}

/// Search tree layout derived from the metadata
///
/// Contains only the information needed for IP lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmdbHeader {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: RecordSize,
    /// IP version (4 or 6)
    pub ip_version: IpVersion,
    /// Size of the search tree in bytes
    pub tree_size: usize,
    /// Offset of the first data section byte (after the separator)
    pub data_section_start: usize,
    /// Offset of the metadata marker (end of the data section)
    pub metadata_start: usize,
}

impl MmdbHeader {
    /// Parse the file's metadata and derive the tree layout
    pub fn from_file(data: &[u8]) -> Result<(Self, Metadata), FormatError> {
        let marker_offset = find_metadata_marker(data)?;
        let metadata = Metadata::from_value(&decode_metadata_at(data, marker_offset)?)?;

        let record_size = RecordSize::from_bits(metadata.record_size as u64)?;
        let ip_version = IpVersion::from_number(metadata.ip_version as u64)?;
        let tree_size = metadata.node_count as usize * record_size.node_bytes();
        let data_section_start = tree_size + DATA_SECTION_SEPARATOR_SIZE;

        // A bogus node_count would otherwise send tree reads into the data or past EOF
        if data_section_start > marker_offset {
            return Err(FormatError::InvalidMetadata(format!(
                "Search tree of {} nodes ({} bytes) does not fit before metadata at offset {}",
                metadata.node_count, tree_size, marker_offset
            )));
        }

        let header = MmdbHeader {
            node_count: metadata.node_count,
            record_size,
            ip_version,
            tree_size,
            data_section_start,
            metadata_start: marker_offset,
        };
        Ok((header, metadata))
    }
}

/// Decode the full metadata map, including non-standard keys
pub fn decode_metadata(data: &[u8]) -> Result<DataValue, FormatError> {
    let marker_offset = find_metadata_marker(data)?;
    decode_metadata_at(data, marker_offset)
}

fn decode_metadata_at(data: &[u8], marker_offset: usize) -> Result<DataValue, FormatError> {
    // Pointers inside the metadata are relative to the byte after the marker
    let metadata_bytes = &data[marker_offset + METADATA_MARKER.len()..];
    DataDecoder::new(metadata_bytes).decode(0)
}

/// Find the metadata marker in an MMDB file
///
/// The marker appears somewhere in the last 128KB of the file and the
/// metadata comes right after it. If there are multiple markers (a data
/// record may happen to contain the same bytes), the LAST one is used.
pub fn find_metadata_marker(data: &[u8]) -> Result<usize, FormatError> {
    let search_start = data.len().saturating_sub(METADATA_SEARCH_SIZE);
    memchr::memmem::rfind(&data[search_start..], METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or(FormatError::NoMetadataMarker)
}

// Helper functions to extract values from the metadata map

fn required_uint(map: &DataMap, key: &str) -> Result<u64, FormatError> {
    optional_uint(map, key)?.ok_or_else(|| FormatError::IncompleteMetadata(key.to_string()))
}

fn optional_uint(map: &DataMap, key: &str) -> Result<Option<u64>, FormatError> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            FormatError::InvalidMetadata(format!("Field '{}' is not an unsigned integer", key))
        }),
    }
}

fn optional_string(map: &DataMap, key: &str) -> Result<Option<String>, FormatError> {
    match map.get(key) {
        None => Ok(None),
        Some(DataValue::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(FormatError::InvalidMetadata(format!(
            "Field '{}' is not a string",
            key
        ))),
    }
}

fn optional_strings(map: &DataMap, key: &str) -> Result<Vec<String>, FormatError> {
    let not_strings =
        || FormatError::InvalidMetadata(format!("Field '{}' is not an array of strings", key));
    match map.get(key) {
        None => Ok(Vec::new()),
        Some(DataValue::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(not_strings))
            .collect(),
        Some(_) => Err(not_strings()),
    }
}

fn optional_descriptions(map: &DataMap, key: &str) -> Result<BTreeMap<String, String>, FormatError> {
    let not_strings =
        || FormatError::InvalidMetadata(format!("Field '{}' is not a map of strings", key));
    match map.get(key) {
        None => Ok(BTreeMap::new()),
        Some(DataValue::Map(entries)) => entries
            .iter()
            .map(|(lang, text)| {
                text.as_str()
                    .map(|t| (lang.to_string(), t.to_string()))
                    .ok_or_else(not_strings)
            })
            .collect(),
        Some(_) => Err(not_strings()),
    }
}
