//! Database API
//!
//! [`Database`] is the entry point: open an MMDB file (memory-mapped or
//! read into memory), look up IP addresses, and read metadata. Lookups
//! return a [`LookupResult`] that borrows the database and decodes its
//! record on demand, either whole ([`LookupResult::to_h`]) or by path
//! ([`LookupResult::get_value`]).

use crate::data_section::{DataDecoder, DataValue, PathElement};
use crate::error::{MmdbError, Result};
use crate::mmdb::{self, Ipv4Start, Metadata, MmdbHeader, SearchTree};
use crate::source::{ByteSource, StorageMode};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

/// Options for opening a database
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    /// Path to the database file
    pub path: PathBuf,

    /// How the file's bytes are held
    pub mode: StorageMode,
}

/// Builder for opening databases with custom configuration
///
/// Created via `Database::from(path)`.
///
/// # Examples
///
/// ```no_run
/// use geoip2::{Database, StorageMode};
///
/// // Defaults (memory-mapped)
/// let db = Database::from("GeoLite2-City.mmdb").open()?;
///
/// // Read the whole file up front
/// let db = Database::from("GeoLite2-City.mmdb.gz")
///     .mode(StorageMode::Memory)
///     .open()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct DatabaseOpener {
    options: DatabaseOptions,
}

impl DatabaseOpener {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            options: DatabaseOptions {
                path: path.into(),
                ..Default::default()
            },
        }
    }

    /// Choose the storage strategy
    ///
    /// Default: [`StorageMode::Mmap`]
    pub fn mode(mut self, mode: StorageMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Load the whole file into memory (shorthand for `mode(StorageMode::Memory)`)
    pub fn in_memory(self) -> Self {
        self.mode(StorageMode::Memory)
    }

    /// Open the database with configured options
    pub fn open(self) -> Result<Database> {
        Database::open_with_options(self.options)
    }
}

/// Everything that exists only while the database is open
#[derive(Debug)]
struct OpenState {
    source: ByteSource,
    header: MmdbHeader,
    metadata: Metadata,
    ipv4_start: Ipv4Start,
}

impl OpenState {
    fn data_section(&self) -> &[u8] {
        let data = self.source.as_slice();
        &data[self.header.data_section_start..self.header.metadata_start]
    }
}

/// A read-only MaxMind DB
///
/// Immutable once opened, so it can be shared across threads (`&Database`
/// or `Arc<Database>`) and queried concurrently without locking.
///
/// # Examples
///
/// ```no_run
/// use geoip2::Database;
///
/// let db = Database::open("GeoLite2-City.mmdb")?;
///
/// if let Some(result) = db.lookup("81.2.69.142")? {
///     let city = result.get_value(&["city".into(), "names".into(), "en".into()])?;
///     println!("{:?} ({}/{})", city, result.network().0, result.prefix_len());
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Database {
    state: Option<OpenState>,
}

impl Database {
    /// Open a database file using memory mapping
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from(path.as_ref()).open()
    }

    /// Create a builder for opening a database with custom options
    #[allow(clippy::should_implement_trait)]
    pub fn from(path: impl Into<PathBuf>) -> DatabaseOpener {
        DatabaseOpener::new(path)
    }

    /// Open database with custom options (lower-level API)
    ///
    /// Most users should use `Database::from()` builder instead.
    pub fn open_with_options(options: DatabaseOptions) -> Result<Self> {
        let source = ByteSource::open(&options.path, options.mode)?;
        Self::from_source(source)
    }

    /// Create a database from bytes already in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_source(ByteSource::Owned(data))
    }

    fn from_source(source: ByteSource) -> Result<Self> {
        let (header, metadata) = MmdbHeader::from_file(source.as_slice())?;
        let ipv4_start = SearchTree::new(source.as_slice(), &header).find_ipv4_start()?;

        Ok(Self {
            state: Some(OpenState {
                source,
                header,
                metadata,
                ipv4_start,
            }),
        })
    }

    fn state(&self) -> Result<&OpenState> {
        self.state.as_ref().ok_or(MmdbError::Closed)
    }

    /// Look up an IP address given as text
    ///
    /// Accepts IPv4 dotted-quad and any IPv6 notation (including embedded
    /// IPv4 such as `::81.2.69.142`). Returns `Ok(None)` when the database
    /// has no record for the address.
    pub fn lookup(&self, ip: &str) -> Result<Option<LookupResult<'_>>> {
        // Check for closed first so a bad address doesn't mask it
        self.state()?;
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| MmdbError::InvalidAddress(ip.to_string()))?;
        self.lookup_ip(addr)
    }

    /// Look up an already-parsed IP address
    pub fn lookup_ip(&self, addr: IpAddr) -> Result<Option<LookupResult<'_>>> {
        let state = self.state()?;

        let tree = SearchTree::new(state.source.as_slice(), &state.header)
            .with_ipv4_start(state.ipv4_start);
        let found = match tree.lookup(addr)? {
            Some(found) => found,
            None => return Ok(None),
        };

        Ok(Some(LookupResult {
            data_section: state.data_section(),
            offset: found.data_offset,
            prefix_len: found.prefix_len,
            addr,
        }))
    }

    /// Typed database metadata
    pub fn metadata(&self) -> Result<&Metadata> {
        Ok(&self.state()?.metadata)
    }

    /// The full metadata map as stored, including non-standard keys
    pub fn metadata_value(&self) -> Result<DataValue> {
        Ok(mmdb::decode_metadata(self.state()?.source.as_slice())?)
    }

    /// Size of the underlying file (decompressed) in bytes
    pub fn size(&self) -> Result<usize> {
        Ok(self.state()?.source.len())
    }

    /// Storage strategy in use
    pub fn storage_mode(&self) -> Result<StorageMode> {
        Ok(self.state()?.source.mode())
    }

    /// Release the file mapping or buffer
    ///
    /// Later calls to `lookup`, `lookup_ip` or `metadata` fail with
    /// [`MmdbError::Closed`]. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.state = None;
    }

    /// True after [`close`](Self::close)
    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }
}

/// The record found for one address
///
/// Borrows the database it came from, so the database cannot be closed
/// while a result is alive. Decoding is deferred until asked for.
#[derive(Clone, Copy)]
pub struct LookupResult<'db> {
    data_section: &'db [u8],
    offset: usize,
    prefix_len: u8,
    addr: IpAddr,
}

impl std::fmt::Debug for LookupResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupResult")
            .field("addr", &self.addr)
            .field("offset", &self.offset)
            .field("prefix_len", &self.prefix_len)
            .finish()
    }
}

impl<'db> LookupResult<'db> {
    /// Decode only the value at `path` within this record
    ///
    /// Returns `Ok(None)` if a key is missing, an index is out of range, or
    /// the path runs into a non-container. An empty path returns the whole
    /// record.
    ///
    /// ```no_run
    /// # use geoip2::{Database, PathElement};
    /// # let db = Database::open("GeoLite2-City.mmdb")?;
    /// # let result = db.lookup("81.2.69.142")?.unwrap();
    /// let iso = result.get_value(&["subdivisions".into(), PathElement::Index(0), "iso_code".into()])?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn get_value(&self, path: &[PathElement<'_>]) -> Result<Option<DataValue>> {
        Ok(DataDecoder::new(self.data_section).lookup_path(self.offset, path)?)
    }

    /// Decode the whole record
    pub fn to_h(&self) -> Result<DataValue> {
        Ok(DataDecoder::new(self.data_section).decode(self.offset)?)
    }

    /// Decode the whole record as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_h()?)?)
    }

    /// Offset of the record within the data section
    ///
    /// Addresses in the same network share an offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Prefix length of the matched network
    ///
    /// Counted in bits of the queried address: an IPv4 query reports an
    /// IPv4 prefix even in an IPv6 database.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// The matched network: the queried address masked to `prefix_len`
    pub fn network(&self) -> (IpAddr, u8) {
        let network = match self.addr {
            IpAddr::V4(addr) => {
                let mask = u32::MAX
                    .checked_shl(32 - self.prefix_len as u32)
                    .unwrap_or(0);
                IpAddr::V4(Ipv4Addr::from(u32::from(addr) & mask))
            }
            IpAddr::V6(addr) => {
                let mask = u128::MAX
                    .checked_shl(128 - self.prefix_len as u32)
                    .unwrap_or(0);
                IpAddr::V6(Ipv6Addr::from(u128::from(addr) & mask))
            }
        };
        (network, self.prefix_len)
    }
}
