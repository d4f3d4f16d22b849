//! MMDB Search Tree Traversal
//!
//! Implements binary search tree traversal for IP address lookups.
//! The tree uses a compact binary representation where each node contains
//! two records (left and right) that point to either:
//! - Another node (continue traversal)
//! - A data section offset (found)
//! - A "not found" marker
//!
//! Nodes are never materialized; records are read straight out of the
//! byte buffer by index arithmetic.

use super::format::MmdbHeader;
use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use crate::error::{FormatError, MmdbError};
use std::net::IpAddr;

/// Bits walked from the root of an IPv6 tree to reach the IPv4 subtree (::/96)
const IPV4_SUBTREE_DEPTH: u8 = 96;

/// Result of a tree walk that reached data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMatch {
    /// Offset into the data section (relative to data section start)
    pub data_offset: usize,
    /// Network prefix length, in bits of the queried address family
    pub prefix_len: u8,
}

/// Where IPv4 lookups begin in this tree
///
/// For IPv6 trees this is the record reached after 96 zero bits, which may
/// already be terminal (data or empty). Computed once when the database is
/// opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Start {
    /// Record value to continue from (a node index or a terminal record)
    pub record: u32,
    /// Bits consumed to get there
    pub depth: u8,
}

impl Ipv4Start {
    /// Start at the tree root (IPv4 trees)
    pub const ROOT: Ipv4Start = Ipv4Start {
        record: 0,
        depth: 0,
    };
}

/// Search tree for IP address lookups
pub struct SearchTree<'a> {
    /// The tree bytes (start of the file up to the data section separator)
    tree: &'a [u8],
    /// Parsed header information
    header: &'a MmdbHeader,
    /// Starting record for IPv4 queries
    ipv4_start: Ipv4Start,
}

impl<'a> SearchTree<'a> {
    /// Create a search tree over the whole file buffer
    pub fn new(data: &'a [u8], header: &'a MmdbHeader) -> Self {
        let tree_end = header.tree_size.min(data.len());
        Self {
            tree: &data[..tree_end],
            header,
            ipv4_start: Ipv4Start::ROOT,
        }
    }

    /// Use a precomputed IPv4 starting point
    pub fn with_ipv4_start(mut self, start: Ipv4Start) -> Self {
        self.ipv4_start = start;
        self
    }

    /// Find the IPv4 start node in an IPv6 tree
    ///
    /// IPv4 addresses live under ::/96 in IPv6 trees, so we follow the left
    /// record up to 96 times, stopping early if a terminal record shows up.
    pub fn find_ipv4_start(&self) -> Result<Ipv4Start, FormatError> {
        if self.header.ip_version == IpVersion::V4 {
            return Ok(Ipv4Start::ROOT);
        }

        let mut record = 0u32;
        let mut depth = 0u8;
        while depth < IPV4_SUBTREE_DEPTH && record < self.header.node_count {
            record = self.read_record(record, 0)?;
            depth += 1;
        }

        Ok(Ipv4Start { record, depth })
    }

    /// Look up an IP address
    ///
    /// Returns `Ok(None)` when the address has no data in this tree.
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<TreeMatch>, MmdbError> {
        let found = match (ip, self.header.ip_version) {
            (IpAddr::V6(_), IpVersion::V4) => {
                return Err(MmdbError::AddressFamily(format!(
                    "Cannot look up IPv6 address {} in an IPv4-only database",
                    ip
                )))
            }
            (IpAddr::V4(addr), IpVersion::V4) => {
                self.walk(u32::from(addr) as u128, IpVersion::V4.bit_count(), 0)?
            }
            (IpAddr::V4(addr), IpVersion::V6) => self.walk(
                u32::from(addr) as u128,
                IpVersion::V4.bit_count(),
                self.ipv4_start.record,
            )?,
            (IpAddr::V6(addr), IpVersion::V6) => {
                self.walk(u128::from(addr), IpVersion::V6.bit_count(), 0)?
            }
        };
        Ok(found)
    }

    /// Walk `bit_count` low bits of `bits`, most significant first
    ///
    /// Stops as soon as a terminal record is read. Running out of bits while
    /// still pointing at a node means not found.
    fn walk(
        &self,
        bits: u128,
        bit_count: u8,
        start: u32,
    ) -> Result<Option<TreeMatch>, FormatError> {
        let node_count = self.header.node_count;
        let mut record = start;
        let mut depth = 0u8;

        while record < node_count && depth < bit_count {
            let bit = ((bits >> (bit_count - 1 - depth)) & 1) as u8;
            record = self.read_record(record, bit)?;
            depth += 1;
        }

        if record <= node_count {
            return Ok(None);
        }

        let data_offset = self.calculate_data_offset(record)?;
        Ok(Some(TreeMatch {
            data_offset,
            prefix_len: depth,
        }))
    }

    /// Read a record from a node
    ///
    /// Each node contains two records. `side` determines which:
    /// - 0 = left record (for IP bit 0)
    /// - 1 = right record (for IP bit 1)
    fn read_record(&self, node: u32, side: u8) -> Result<u32, FormatError> {
        if node >= self.header.node_count {
            return Err(FormatError::CorruptSearchTree(format!(
                "Node index {} exceeds node count {}",
                node, self.header.node_count
            )));
        }

        let node_bytes = self.header.record_size.node_bytes();
        let offset = node as usize * node_bytes;
        let b = self.tree.get(offset..offset + node_bytes).ok_or_else(|| {
            FormatError::CorruptSearchTree(format!(
                "Node {} at offset {} exceeds tree size {}",
                node,
                offset,
                self.tree.len()
            ))
        })?;

        let be24 = |x: &[u8]| (x[0] as u32) << 16 | (x[1] as u32) << 8 | x[2] as u32;

        let record = match (self.header.record_size, side) {
            (RecordSize::Bits24, 0) => be24(&b[0..3]),
            (RecordSize::Bits24, _) => be24(&b[3..6]),
            // Middle byte holds the high nibble of each record: [left 24][hi_l|hi_r][right 24]
            (RecordSize::Bits28, 0) => ((b[3] as u32 & 0xF0) << 20) | be24(&b[0..3]),
            (RecordSize::Bits28, _) => ((b[3] as u32 & 0x0F) << 24) | be24(&b[4..7]),
            (RecordSize::Bits32, 0) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            (RecordSize::Bits32, _) => u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
        };
        Ok(record)
    }

    /// Calculate data section offset from record value
    ///
    /// data_offset = (record - node_count) - 16, where 16 is the separator size.
    /// The result must land inside the data section.
    fn calculate_data_offset(&self, record: u32) -> Result<usize, FormatError> {
        let node_count = self.header.node_count;
        let offset = (record as usize)
            .checked_sub(node_count as usize + DATA_SECTION_SEPARATOR_SIZE)
            .ok_or_else(|| {
                FormatError::CorruptSearchTree(format!(
                    "Record {} points into the data section separator (node_count = {})",
                    record, node_count
                ))
            })?;

        let data_section_len = self.header.metadata_start - self.header.data_section_start;
        if offset >= data_section_len {
            return Err(FormatError::CorruptSearchTree(format!(
                "Data pointer {} exceeds data section size {}",
                offset, data_section_len
            )));
        }

        Ok(offset)
    }
}
