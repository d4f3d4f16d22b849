//! Database byte storage
//!
//! An opened database reads all of its bytes through a [`ByteSource`]: either
//! a read-only memory map of the file or an owned buffer. Both are immutable
//! once created, so slices handed out can be shared across threads freely.
//!
//! Memory mode also accepts gzip-compressed files (`*.gz`), which are
//! inflated once at open.

use crate::error::{MmdbError, Result};
use flate2::read::GzDecoder;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// How the file's bytes are held in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Map the file read-only; pages are loaded lazily by the OS
    #[default]
    Mmap,
    /// Read the whole file into an owned buffer
    Memory,
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mmap" => Ok(StorageMode::Mmap),
            "memory" | "mem" => Ok(StorageMode::Memory),
            other => Err(format!(
                "Unknown storage mode '{}' (expected 'mmap' or 'memory')",
                other
            )),
        }
    }
}

/// Read-only byte buffer backing an open database
pub enum ByteSource {
    /// Owned bytes (memory mode, or bytes supplied by the caller)
    Owned(Vec<u8>),
    /// Memory-mapped file
    Mmap(Mmap),
}

impl ByteSource {
    /// Open `path` with the given storage mode
    ///
    /// Gzip files can't be mapped, so a `.gz` path is always decompressed
    /// into memory.
    pub fn open(path: &Path, mode: StorageMode) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| MmdbError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

        if is_gzip(path) {
            return Self::inflate(file, path);
        }

        match mode {
            StorageMode::Mmap => {
                // SAFETY: the map is read-only and every access is bounds-checked;
                // the file must not be truncated while the database is open.
                let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                    MmdbError::Io(format!("Failed to mmap {}: {}", path.display(), e))
                })?;
                Ok(ByteSource::Mmap(mmap))
            }
            StorageMode::Memory => {
                let mut buf = Vec::new();
                let mut file = file;
                file.read_to_end(&mut buf).map_err(|e| {
                    MmdbError::Io(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Ok(ByteSource::Owned(buf))
            }
        }
    }

    fn inflate(file: File, path: &Path) -> Result<Self> {
        let mut buf = Vec::new();
        GzDecoder::new(file).read_to_end(&mut buf).map_err(|e| {
            MmdbError::Io(format!("Failed to decompress {}: {}", path.display(), e))
        })?;
        Ok(ByteSource::Owned(buf))
    }

    /// All bytes
    pub fn as_slice(&self) -> &[u8] {
        match self {
            ByteSource::Owned(v) => v.as_slice(),
            ByteSource::Mmap(m) => &m[..],
        }
    }

    /// Total size in bytes
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True when the source holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage strategy actually in use
    pub fn mode(&self) -> StorageMode {
        match self {
            ByteSource::Owned(_) => StorageMode::Memory,
            ByteSource::Mmap(_) => StorageMode::Mmap,
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("mode", &self.mode())
            .field("len", &self.len())
            .finish()
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}
