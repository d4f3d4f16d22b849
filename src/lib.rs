//! geoip2 - Fast, read-only MaxMind DB reader
//!
//! Reads MaxMind DB (`.mmdb`) files such as GeoIP2 / GeoLite2 City, Country,
//! ASN, Anonymous-IP and Connection-Type databases, and looks up the record
//! for an IPv4 or IPv6 address locally, with no network access.
//!
//! # Quick Start
//!
//! ```no_run
//! use geoip2::Database;
//!
//! let db = Database::open("GeoLite2-City.mmdb")?;
//!
//! match db.lookup("81.2.69.142")? {
//!     Some(result) => {
//!         // Decode only what you need...
//!         let city = result.get_value(&["city".into(), "names".into(), "en".into()])?;
//!         println!("City: {:?}", city);
//!
//!         // ...or the whole record
//!         println!("{}", result.to_json()?);
//!     }
//!     None => println!("Not in database"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  MMDB File                           │
//! ├──────────────────────────────────────┤
//! │  1. Search Tree (binary trie)        │
//! │  2. 16-byte zero separator           │
//! │  3. Data Section (typed values)      │
//! │  4. "\xAB\xCD\xEFMaxMind.com"        │
//! │  5. Metadata (one map)               │
//! └──────────────────────────────────────┘
//! ```
//!
//! - [`source`]: the bytes, memory-mapped or owned
//! - [`mmdb`]: metadata location and decoding, search tree traversal
//! - [`data_section`]: the typed value decoder
//! - [`database`]: the public [`Database`] / [`LookupResult`] API
//!
//! Malformed files surface as [`FormatError`]s; no input makes the reader
//! panic or read out of bounds.
//!
//! # Thread Safety
//!
//! An open [`Database`] is immutable and `Send + Sync`. Share it behind an
//! `Arc` (or scoped threads) and query from as many threads as you like.

#![warn(missing_docs)]

/// Typed value decoder for the data section and metadata
pub mod data_section;

/// Database facade: open, lookup, metadata, close
pub mod database;

/// Error types
pub mod error;

/// MMDB format: metadata, layout and search tree
pub mod mmdb;

/// Memory-mapped or owned file bytes
pub mod source;

pub use crate::data_section::{DataMap, DataValue, PathElement};
pub use crate::database::{Database, DatabaseOpener, DatabaseOptions, LookupResult};
pub use crate::error::{FormatError, MmdbError, Result};
pub use crate::mmdb::{IpVersion, Metadata, RecordSize};
pub use crate::source::StorageMode;
