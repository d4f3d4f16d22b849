//! Test-only MMDB writer
//!
//! Builds small but complete MaxMind DB files in memory: an arena-allocated
//! search tree, a data section, and a metadata map. Supports all three record
//! sizes, IPv4 and IPv6 trees, and IPv4 aliasing (`::ffff:0:0/96`,
//! `2002::/16`) like the GeoIP2 databases.

#![allow(dead_code)]

use geoip2::{DataMap, DataValue};
use std::net::IpAddr;

pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodePointer {
    Node(u32),
    Data(usize),
    Empty,
}

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    left: NodePointer,
    right: NodePointer,
}

/// In-memory MMDB builder
pub struct MmdbWriter {
    ip_version: u16,
    record_size: u16,
    database_type: String,
    languages: Vec<String>,
    description: Vec<(String, String)>,
    build_epoch: u64,
    extra_metadata: Vec<(String, DataValue)>,
    alias_ipv4: bool,
    nodes: Vec<TreeNode>,
    data: Vec<u8>,
}

impl MmdbWriter {
    pub fn new(ip_version: u16, record_size: u16) -> Self {
        assert!(ip_version == 4 || ip_version == 6);
        assert!(matches!(record_size, 24 | 28 | 32));
        Self {
            ip_version,
            record_size,
            database_type: "Test".to_string(),
            languages: vec!["en".to_string()],
            description: vec![("en".to_string(), "Test database".to_string())],
            build_epoch: 1_700_000_000,
            extra_metadata: Vec::new(),
            alias_ipv4: false,
            nodes: vec![TreeNode {
                left: NodePointer::Empty,
                right: NodePointer::Empty,
            }],
            data: Vec::new(),
        }
    }

    pub fn database_type(mut self, database_type: &str) -> Self {
        self.database_type = database_type.to_string();
        self
    }

    pub fn languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Point `::ffff:0:0/96` and `2002::/16` at the IPv4 subtree when building
    pub fn alias_ipv4(mut self) -> Self {
        self.alias_ipv4 = true;
        self
    }

    /// Add a non-standard metadata key
    pub fn metadata(mut self, key: &str, value: DataValue) -> Self {
        self.extra_metadata.push((key.to_string(), value));
        self
    }

    /// Append an encoded value to the data section, returning its offset
    pub fn add_value(&mut self, value: &DataValue) -> usize {
        let offset = self.data.len();
        encode_value(value, &mut self.data);
        offset
    }

    /// Append raw bytes to the data section, returning their offset
    pub fn add_raw(&mut self, bytes: &[u8]) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Encode `value` and map `cidr` to it
    ///
    /// Insert broader networks before narrower ones: a later insert replaces
    /// everything beneath its prefix.
    pub fn insert(&mut self, cidr: &str, value: &DataValue) -> usize {
        let offset = self.add_value(value);
        self.insert_offset(cidr, offset);
        offset
    }

    /// Map `cidr` to an existing data offset
    pub fn insert_offset(&mut self, cidr: &str, offset: usize) {
        let (bits, prefix_len) = self.parse_cidr(cidr);
        self.set_pointer(bits, prefix_len, NodePointer::Data(offset));
    }

    fn tree_bits(&self) -> u8 {
        if self.ip_version == 4 {
            32
        } else {
            128
        }
    }

    /// Address bits left-aligned to the tree width, and the prefix in tree bits
    fn parse_cidr(&self, cidr: &str) -> (u128, u8) {
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix.parse::<u8>().expect("bad prefix"))),
            None => (cidr, None),
        };
        let addr: IpAddr = addr.parse().expect("bad address");

        match (addr, self.ip_version) {
            (IpAddr::V4(v4), 4) => (u32::from(v4) as u128, prefix.unwrap_or(32)),
            // IPv4 networks live under ::/96 in an IPv6 tree
            (IpAddr::V4(v4), _) => (u32::from(v4) as u128, prefix.unwrap_or(32) + 96),
            (IpAddr::V6(v6), 6) => (u128::from(v6), prefix.unwrap_or(128)),
            (IpAddr::V6(_), _) => panic!("IPv6 network {} in an IPv4 tree", cidr),
        }
    }

    fn bit_at(&self, bits: u128, depth: u8) -> bool {
        (bits >> (self.tree_bits() - 1 - depth)) & 1 == 1
    }

    fn child(&self, node: u32, right: bool) -> NodePointer {
        let node = &self.nodes[node as usize];
        if right {
            node.right
        } else {
            node.left
        }
    }

    fn set_child(&mut self, node: u32, right: bool, pointer: NodePointer) {
        let node = &mut self.nodes[node as usize];
        if right {
            node.right = pointer;
        } else {
            node.left = pointer;
        }
    }

    /// Walk `depth` bits from the root, splitting leaves into nodes as needed
    fn ensure_node(&mut self, bits: u128, depth: u8) -> u32 {
        let mut node = 0u32;
        for d in 0..depth {
            let right = self.bit_at(bits, d);
            node = match self.child(node, right) {
                NodePointer::Node(next) => next,
                leaf => {
                    let next = self.nodes.len() as u32;
                    self.nodes.push(TreeNode {
                        left: leaf,
                        right: leaf,
                    });
                    self.set_child(node, right, NodePointer::Node(next));
                    next
                }
            };
        }
        node
    }

    fn set_pointer(&mut self, bits: u128, prefix_len: u8, pointer: NodePointer) {
        assert!(prefix_len > 0, "prefix length must be at least 1");
        let parent = self.ensure_node(bits, prefix_len - 1);
        let right = self.bit_at(bits, prefix_len - 1);
        self.set_child(parent, right, pointer);
    }

    /// Serialize the complete database file
    pub fn build(mut self) -> Vec<u8> {
        if self.alias_ipv4 && self.ip_version == 6 {
            let ipv4_root = self.ensure_node(0, 96);
            let v4_mapped: u128 = 0xffff << 32;
            let six_to_four: u128 = 0x2002 << 112;
            self.set_pointer(v4_mapped, 96, NodePointer::Node(ipv4_root));
            self.set_pointer(six_to_four, 16, NodePointer::Node(ipv4_root));
        }

        let node_count = self.nodes.len() as u32;
        let record = |pointer: NodePointer| -> u32 {
            match pointer {
                NodePointer::Node(index) => index,
                NodePointer::Empty => node_count,
                NodePointer::Data(offset) => node_count + 16 + offset as u32,
            }
        };

        let mut out = Vec::new();
        for node in &self.nodes {
            let (left, right) = (record(node.left), record(node.right));
            match self.record_size {
                24 => {
                    out.extend_from_slice(&left.to_be_bytes()[1..]);
                    out.extend_from_slice(&right.to_be_bytes()[1..]);
                }
                28 => {
                    out.extend_from_slice(&left.to_be_bytes()[1..]);
                    out.push((((left >> 24) & 0x0F) << 4) as u8 | ((right >> 24) & 0x0F) as u8);
                    out.extend_from_slice(&right.to_be_bytes()[1..]);
                }
                _ => {
                    out.extend_from_slice(&left.to_be_bytes());
                    out.extend_from_slice(&right.to_be_bytes());
                }
            }
        }

        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(METADATA_MARKER);

        let mut metadata = DataMap::new();
        metadata.insert("node_count", DataValue::Uint32(node_count));
        metadata.insert("record_size", DataValue::Uint16(self.record_size));
        metadata.insert("ip_version", DataValue::Uint16(self.ip_version));
        metadata.insert("database_type", DataValue::String(self.database_type.clone()));
        metadata.insert(
            "languages",
            DataValue::Array(
                self.languages
                    .iter()
                    .map(|l| DataValue::String(l.clone()))
                    .collect(),
            ),
        );
        metadata.insert("binary_format_major_version", DataValue::Uint16(2));
        metadata.insert("binary_format_minor_version", DataValue::Uint16(0));
        metadata.insert("build_epoch", DataValue::Uint64(self.build_epoch));
        metadata.insert(
            "description",
            DataValue::Map(
                self.description
                    .iter()
                    .map(|(lang, text)| (lang.clone(), DataValue::String(text.clone())))
                    .collect(),
            ),
        );
        for (key, value) in &self.extra_metadata {
            metadata.insert(key.as_str(), value.clone());
        }
        encode_value(&DataValue::Map(metadata), &mut out);

        out
    }
}

/// Write a control byte (plus extended type and size bytes)
pub fn encode_control(type_id: u8, size: usize, out: &mut Vec<u8>) {
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, vec![])
    } else if size < 29 + 256 {
        (29, vec![(size - 29) as u8])
    } else if size < 285 + 65536 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65821) as u32).to_be_bytes()[1..].to_vec())
    };

    if type_id <= 7 {
        out.push(type_id << 5 | size_bits);
    } else {
        out.push(size_bits);
        out.push(type_id - 7);
    }
    out.extend(extra);
}

fn encode_uint(type_id: u8, n: u128, out: &mut Vec<u8>) {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    encode_control(type_id, bytes.len() - skip, out);
    out.extend_from_slice(&bytes[skip..]);
}

/// Encode one value in MMDB data section format
pub fn encode_value(value: &DataValue, out: &mut Vec<u8>) {
    match value {
        DataValue::String(s) => {
            encode_control(2, s.len(), out);
            out.extend_from_slice(s.as_bytes());
        }
        DataValue::Double(d) => {
            encode_control(3, 8, out);
            out.extend_from_slice(&d.to_be_bytes());
        }
        DataValue::Bytes(b) => {
            encode_control(4, b.len(), out);
            out.extend_from_slice(b);
        }
        DataValue::Uint16(n) => encode_uint(5, *n as u128, out),
        DataValue::Uint32(n) => encode_uint(6, *n as u128, out),
        DataValue::Map(map) => {
            encode_control(7, map.len(), out);
            for (key, value) in map.iter() {
                encode_value(&DataValue::String(key.to_string()), out);
                encode_value(value, out);
            }
        }
        DataValue::Int32(n) => {
            encode_control(8, 4, out);
            out.extend_from_slice(&n.to_be_bytes());
        }
        DataValue::Uint64(n) => encode_uint(9, *n as u128, out),
        DataValue::Uint128(n) => encode_uint(10, *n, out),
        DataValue::Array(items) => {
            encode_control(11, items.len(), out);
            for item in items {
                encode_value(item, out);
            }
        }
        DataValue::Bool(b) => encode_control(14, *b as usize, out),
        DataValue::Float(f) => {
            encode_control(15, 4, out);
            out.extend_from_slice(&f.to_be_bytes());
        }
    }
}

/// Encode a pointer to `offset`, using the smallest size class
pub fn pointer(offset: usize) -> Vec<u8> {
    if offset < 2048 {
        vec![0x20 | (offset >> 8) as u8, offset as u8]
    } else if offset < 526_336 {
        let v = offset - 2048;
        vec![0x28 | (v >> 16) as u8, (v >> 8) as u8, v as u8]
    } else if offset < 134_744_064 {
        let v = offset - 526_336;
        vec![0x30 | (v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8]
    } else {
        let mut out = vec![0x38];
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out
    }
}

/// Convert JSON into a data value the way GeoIP2 databases type things
///
/// Non-negative integers become `Uint32` (or `Uint64` when larger),
/// negative integers `Int32`, other numbers `Double`.
pub fn value(json: serde_json::Value) -> DataValue {
    match json {
        serde_json::Value::Null => DataValue::Bytes(vec![]),
        serde_json::Value::Bool(b) => DataValue::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                match u32::try_from(u) {
                    Ok(small) => DataValue::Uint32(small),
                    Err(_) => DataValue::Uint64(u),
                }
            } else if let Some(i) = n.as_i64() {
                DataValue::Int32(i as i32)
            } else {
                DataValue::Double(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => DataValue::String(s),
        serde_json::Value::Array(items) => DataValue::Array(items.into_iter().map(value).collect()),
        serde_json::Value::Object(map) => {
            DataValue::Map(map.into_iter().map(|(k, v)| (k, value(v))).collect())
        }
    }
}

/// GeoIP2-City shaped database
///
/// `81.2.69.142/31` is London; loopback and RFC 1918 space are absent.
pub fn city_db(record_size: u16) -> Vec<u8> {
    let mut w = MmdbWriter::new(6, record_size)
        .database_type("GeoIP2-City")
        .languages(&["de", "en", "es", "fr", "ja", "pt-BR", "ru", "zh-CN"])
        .alias_ipv4();

    let gb = serde_json::json!({
        "geoname_id": 2635167,
        "iso_code": "GB",
        "names": {"de": "Vereinigtes Königreich", "en": "United Kingdom"}
    });
    let europe = serde_json::json!({
        "code": "EU",
        "geoname_id": 6255148,
        "names": {"de": "Europa", "en": "Europe"}
    });

    w.insert(
        "81.2.69.142/31",
        &value(serde_json::json!({
            "city": {"geoname_id": 2643743, "names": {"de": "London", "en": "London", "ru": "Лондон"}},
            "continent": europe,
            "country": gb,
            "location": {
                "accuracy_radius": 10,
                "latitude": 51.5142,
                "longitude": -0.0931,
                "time_zone": "Europe/London"
            },
            "registered_country": {
                "geoname_id": 6252001,
                "iso_code": "US",
                "names": {"en": "United States"}
            },
            "subdivisions": [
                {"geoname_id": 6269131, "iso_code": "ENG", "names": {"en": "England"}}
            ]
        })),
    );

    w.insert(
        "2.125.160.216/29",
        &value(serde_json::json!({
            "city": {"geoname_id": 2655045, "names": {"en": "Boxford"}},
            "continent": europe,
            "country": gb,
            "subdivisions": [
                {"geoname_id": 6269131, "iso_code": "ENG", "names": {"en": "England"}},
                {"geoname_id": 3333217, "iso_code": "WBK", "names": {"en": "West Berkshire"}}
            ]
        })),
    );

    w.insert(
        "216.160.83.56/29",
        &value(serde_json::json!({
            "city": {"geoname_id": 5803556, "names": {"en": "Milton"}},
            "continent": {"code": "NA", "geoname_id": 6255149, "names": {"en": "North America"}},
            "country": {"geoname_id": 6252001, "iso_code": "US", "names": {"en": "United States"}},
            "location": {"latitude": 47.2513, "longitude": -122.3149, "metro_code": 819}
        })),
    );

    w.insert(
        "2001:480::/32",
        &value(serde_json::json!({
            "city": {"geoname_id": 5391811, "names": {"en": "San Diego"}},
            "country": {"geoname_id": 6252001, "iso_code": "US", "names": {"en": "United States"}}
        })),
    );

    w.build()
}

/// GeoIP2-Anonymous-IP shaped database
pub fn anonymous_ip_db() -> Vec<u8> {
    let mut w = MmdbWriter::new(6, 24)
        .database_type("GeoIP2-Anonymous-IP")
        .alias_ipv4();
    w.insert(
        "::1.2.0.0/112",
        &value(serde_json::json!({"is_anonymous": true, "is_anonymous_vpn": true})),
    );
    w.insert(
        "::65.0.0.0/109",
        &value(serde_json::json!({"is_anonymous": true, "is_tor_exit_node": true})),
    );
    w.insert(
        "::71.160.223.0/120",
        &value(serde_json::json!({"is_anonymous": true, "is_hosting_provider": true})),
    );
    w.build()
}

/// GeoIP2-Connection-Type shaped database
pub fn connection_type_db() -> Vec<u8> {
    let mut w = MmdbWriter::new(6, 24)
        .database_type("GeoIP2-Connection-Type")
        .alias_ipv4();
    let cable = w.add_value(&value(serde_json::json!({"connection_type": "Cable/DSL"})));
    let dialup = w.add_value(&value(serde_json::json!({"connection_type": "Dialup"})));
    let cellular = w.add_value(&value(serde_json::json!({"connection_type": "Cellular"})));

    w.insert_offset("::1.0.1.0/120", cable);
    w.insert_offset("::96.1.0.0/112", cable);
    w.insert_offset("::1.0.32.0/115", dialup);
    w.insert_offset("::1.0.128.0/113", dialup);
    w.insert_offset("::207.179.48.0/116", cellular);
    w.insert_offset("::108.96.0.0/107", cellular);
    w.build()
}

/// GeoIP2-Country shaped database
pub fn country_db() -> Vec<u8> {
    let mut w = MmdbWriter::new(6, 32)
        .database_type("GeoIP2-Country")
        .alias_ipv4();
    let japan = w.add_value(&value(serde_json::json!({
        "continent": {"code": "AS", "geoname_id": 6255147, "names": {"en": "Asia"}},
        "country": {"geoname_id": 1861060, "iso_code": "JP", "names": {"en": "Japan", "ja": "日本"}}
    })));
    w.insert_offset("2001:218::/32", japan);
    w.insert_offset("2001:240::/32", japan);
    w.insert(
        "::89.160.20.128/121",
        &value(serde_json::json!({
            "continent": {"code": "EU", "geoname_id": 6255148, "names": {"en": "Europe"}},
            "country": {"geoname_id": 2661886, "iso_code": "SE", "names": {"en": "Sweden"}}
        })),
    );
    w.build()
}
