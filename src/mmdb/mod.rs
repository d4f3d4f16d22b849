//! MaxMind DB (MMDB) Format
//!
//! The MMDB format uses a binary search tree for efficient IP address
//! lookups. Data is stored in the MMDB data section format, decoded by
//! `crate::data_section::DataDecoder`.
//!
//! ## Architecture
//!
//! - **types**: MMDB-specific types and constants
//! - **format**: Metadata marker search, metadata decoding and section bounds
//! - **tree**: Search tree traversal for IP lookups

pub mod format;
pub mod tree;
pub mod types;

pub use format::{decode_metadata, find_metadata_marker, Metadata, MmdbHeader};
pub use tree::{Ipv4Start, SearchTree, TreeMatch};
pub use types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
