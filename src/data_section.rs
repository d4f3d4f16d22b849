//! Data section decoding
//!
//! Implements the MaxMind DB data type specification used for both the
//! per-network records and the metadata block.
//!
//! # Supported Types
//!
//! - **Pointer** (1): Reference to another data item, resolved transparently
//! - **String** (2): UTF-8 text data
//! - **Double** (3): 64-bit floating point (IEEE 754)
//! - **Bytes** (4): Raw byte arrays
//! - **Uint16** (5) / **Uint32** (6): Unsigned integers
//! - **Map** (7): Key-value pairs (string keys)
//! - **Int32** (8): Signed 32-bit integers
//! - **Uint64** (9) / **Uint128** (10): Unsigned integers
//! - **Array** (11): Ordered lists of values
//! - **Bool** (14): Boolean values
//! - **Float** (15): 32-bit floating point (IEEE 754)
//!
//! Types 12 (data cache container) and 13 (end marker) are reserved and
//! rejected when they appear as values.
//!
//! # Format
//!
//! Control byte(s) followed by data. The control byte encodes the type
//! (3 bits) and the payload size (5 bits). Type 0 means "extended": the
//! next byte holds `type - 7`. Sizes 29, 30 and 31 take 1, 2 or 3 extra
//! bytes.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::error::FormatError;
use rustc_hash::FxHashMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Maximum number of pointers followed while resolving one value
const MAX_POINTER_DEPTH: usize = 32;

/// Maximum map/array nesting depth
const MAX_NESTING_DEPTH: usize = 512;

/// Maximum number of values materialized by one decode
///
/// Pointers let containers share children, so output size is not bounded
/// by input size.
const MAX_DECODED_VALUES: usize = 1 << 20;

const TYPE_POINTER: u8 = 1;
const TYPE_STRING: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_BYTES: u8 = 4;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_INT32: u8 = 8;
const TYPE_UINT64: u8 = 9;
const TYPE_UINT128: u8 = 10;
const TYPE_ARRAY: u8 = 11;
const TYPE_BOOL: u8 = 14;
const TYPE_FLOAT: u8 = 15;

/// A decoded data section value
///
/// Closed set of MMDB value types. Pointers never appear here; the decoder
/// resolves them to the value they reference.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map in file order
    Map(DataMap),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Unsigned integer value widened to u64
    ///
    /// Returns `None` for non-integers, negative `Int32` values and
    /// `Uint128` values that do not fit.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(n) => Some(*n as u64),
            DataValue::Uint32(n) => Some(*n as u64),
            DataValue::Uint64(n) => Some(*n),
            DataValue::Uint128(n) => u64::try_from(*n).ok(),
            DataValue::Int32(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Floating point value (either width)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Double(d) => Some(*d),
            DataValue::Float(f) => Some(*f as f64),
            _ => None,
        }
    }

    /// Boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Map contents, if this is a map
    pub fn as_map(&self) -> Option<&DataMap> {
        match self {
            DataValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Array contents, if this is an array
    pub fn as_array(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Follow a path through already-decoded maps and arrays
    ///
    /// Same semantics as [`DataDecoder::lookup_path`], applied to a
    /// materialized value.
    pub fn get_path(&self, path: &[PathElement<'_>]) -> Option<&DataValue> {
        let mut current = self;
        for element in path {
            current = match (element, current) {
                (PathElement::Key(key), DataValue::Map(map)) => map.get(key)?,
                (PathElement::Index(i), DataValue::Array(items)) => {
                    items.get(resolve_index(*i, items.len())?)?
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DataValue::String(s) => serializer.serialize_str(s),
            DataValue::Double(d) => serializer.serialize_f64(*d),
            DataValue::Bytes(b) => {
                let mut seq = serializer.serialize_seq(Some(b.len()))?;
                for byte in b {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            DataValue::Uint16(n) => serializer.serialize_u16(*n),
            DataValue::Uint32(n) => serializer.serialize_u32(*n),
            DataValue::Map(m) => m.serialize(serializer),
            DataValue::Int32(n) => serializer.serialize_i32(*n),
            DataValue::Uint64(n) => serializer.serialize_u64(*n),
            // JSON numbers stop at u64; wider values become decimal strings
            DataValue::Uint128(n) => match u64::try_from(*n) {
                Ok(small) => serializer.serialize_u64(small),
                Err(_) => serializer.serialize_str(&n.to_string()),
            },
            DataValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            DataValue::Bool(b) => serializer.serialize_bool(*b),
            DataValue::Float(f) => serializer.serialize_f32(*f),
        }
    }
}

/// Map with string keys that keeps entries in file order
///
/// Keys are unique. Inserting an existing key replaces its value in place,
/// which gives "last occurrence wins" when a map in the file repeats a key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataMap {
    entries: Vec<(String, DataValue)>,
}

impl DataMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key, returning the previous value if the key existed
    pub fn insert(&mut self, key: impl Into<String>, value: DataValue) -> Option<DataValue> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Value for a key
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in file order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, DataValue)> for DataMap {
    fn from_iter<I: IntoIterator<Item = (String, DataValue)>>(iter: I) -> Self {
        let mut map = DataMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for DataMap {
    type Item = (String, DataValue);
    type IntoIter = std::vec::IntoIter<(String, DataValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for DataMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// One step of a lookup path: a map key or an array index
///
/// Negative indexes count from the end of the array (`-1` is the last
/// element).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathElement<'a> {
    /// Map key
    Key(&'a str),
    /// Array index
    Index(i64),
}

impl<'a> From<&'a str> for PathElement<'a> {
    fn from(key: &'a str) -> Self {
        PathElement::Key(key)
    }
}

impl<'a> From<&'a String> for PathElement<'a> {
    fn from(key: &'a String) -> Self {
        PathElement::Key(key.as_str())
    }
}

impl From<usize> for PathElement<'_> {
    fn from(index: usize) -> Self {
        PathElement::Index(index as i64)
    }
}

impl From<i64> for PathElement<'_> {
    fn from(index: i64) -> Self {
        PathElement::Index(index)
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 {
        (len as i64).checked_add(index)?
    } else {
        index
    };
    if resolved < 0 || resolved >= len as i64 {
        None
    } else {
        Some(resolved as usize)
    }
}

/// Decoded control byte(s)
enum Header {
    /// Pointer to an absolute offset in the buffer
    Pointer(usize),
    /// Any other value; the cursor sits at the payload
    Value { type_id: u8, size: usize },
}

/// Data section decoder
///
/// Decodes values from a data section (or metadata) buffer. Pointer
/// targets are offsets from the start of `buffer`. All reads are bounds
/// checked; malformed input yields a [`FormatError`].
#[derive(Debug, Clone, Copy)]
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder for a data section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Length of the underlying buffer
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the underlying buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Decode the value at `offset`, resolving pointers
    pub fn decode(&self, offset: usize) -> Result<DataValue, FormatError> {
        let mut cursor = offset;
        let mut budget = MAX_DECODED_VALUES;
        self.decode_at(&mut cursor, 0, 0, &mut budget)
    }

    /// Decode the value at `offset` and report how many bytes it occupies
    ///
    /// A pointer occupies only its own bytes, not the target's.
    pub fn decode_with_size(&self, offset: usize) -> Result<(DataValue, usize), FormatError> {
        let mut cursor = offset;
        let mut budget = MAX_DECODED_VALUES;
        let value = self.decode_at(&mut cursor, 0, 0, &mut budget)?;
        Ok((value, cursor - offset))
    }

    /// Decode only the value found by following `path` from `offset`
    ///
    /// Sibling entries along the way are skipped without being decoded.
    /// Returns `Ok(None)` when a key is missing, an index is out of range,
    /// or the path expects a map/array where the data has something else.
    /// A repeated map key resolves to its last occurrence.
    pub fn lookup_path(
        &self,
        offset: usize,
        path: &[PathElement<'_>],
    ) -> Result<Option<DataValue>, FormatError> {
        let mut cursor = offset;
        let mut pointers = 0;

        for (depth, element) in path.iter().enumerate() {
            let (type_id, size) = self.resolve_header(&mut cursor, &mut pointers)?;
            match (element, type_id) {
                (PathElement::Key(wanted), TYPE_MAP) => {
                    let mut found = None;
                    for _ in 0..size {
                        let key = self.decode_key(&mut cursor, pointers)?;
                        if key == *wanted {
                            found = Some(cursor);
                        }
                        self.skip(&mut cursor, depth + 1)?;
                    }
                    match found {
                        Some(position) => cursor = position,
                        None => return Ok(None),
                    }
                }
                (PathElement::Index(index), TYPE_ARRAY) => {
                    let index = match resolve_index(*index, size) {
                        Some(i) => i,
                        None => return Ok(None),
                    };
                    for _ in 0..index {
                        self.skip(&mut cursor, depth + 1)?;
                    }
                }
                _ => return Ok(None),
            }
        }

        let mut budget = MAX_DECODED_VALUES;
        self.decode_at(&mut cursor, path.len(), pointers, &mut budget)
            .map(Some)
    }

    /// Read the control byte(s) at the cursor
    fn read_header(&self, cursor: &mut usize) -> Result<Header, FormatError> {
        let ctrl = self.take(cursor, 1)?[0];
        let mut type_id = ctrl >> 5;

        if type_id == TYPE_POINTER {
            return self.read_pointer(cursor, ctrl).map(Header::Pointer);
        }

        if type_id == 0 {
            let ext = self.take(cursor, 1)?[0];
            type_id = ext.checked_add(7).ok_or(FormatError::UnknownType(ext))?;
            if type_id < TYPE_INT32 {
                return Err(FormatError::UnknownType(type_id));
            }
        }

        let size = self.read_size(cursor, ctrl & 0x1F)?;
        Ok(Header::Value { type_id, size })
    }

    /// Read headers until a non-pointer value is reached
    fn resolve_header(
        &self,
        cursor: &mut usize,
        pointers: &mut usize,
    ) -> Result<(u8, usize), FormatError> {
        loop {
            match self.read_header(cursor)? {
                Header::Pointer(target) => {
                    *pointers += 1;
                    if *pointers > MAX_POINTER_DEPTH {
                        return Err(FormatError::PointerLoop);
                    }
                    *cursor = target;
                }
                Header::Value { type_id, size } => return Ok((type_id, size)),
            }
        }
    }

    fn read_pointer(&self, cursor: &mut usize, ctrl: u8) -> Result<usize, FormatError> {
        let size_class = (ctrl >> 3) & 0x3;
        let high = (ctrl & 0x7) as usize;

        let target = match size_class {
            0 => {
                let b = self.take(cursor, 1)?;
                (high << 8) | b[0] as usize
            }
            1 => {
                let b = self.take(cursor, 2)?;
                ((high << 16) | (b[0] as usize) << 8 | b[1] as usize) + 2048
            }
            2 => {
                let b = self.take(cursor, 3)?;
                ((high << 24) | (b[0] as usize) << 16 | (b[1] as usize) << 8 | b[2] as usize)
                    + 526_336
            }
            _ => {
                let b = self.take(cursor, 4)?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
            }
        };

        Ok(target)
    }

    fn read_size(&self, cursor: &mut usize, size_bits: u8) -> Result<usize, FormatError> {
        match size_bits {
            0..=28 => Ok(size_bits as usize),
            29 => Ok(29 + self.take(cursor, 1)?[0] as usize),
            30 => {
                let b = self.take(cursor, 2)?;
                Ok(285 + u16::from_be_bytes([b[0], b[1]]) as usize)
            }
            _ => {
                let b = self.take(cursor, 3)?;
                Ok(65_821 + ((b[0] as usize) << 16 | (b[1] as usize) << 8 | b[2] as usize))
            }
        }
    }

    /// Bounds-checked slice of `len` bytes at the cursor
    fn take(&self, cursor: &mut usize, len: usize) -> Result<&'a [u8], FormatError> {
        let start = *cursor;
        let available = self.buffer.len().saturating_sub(start);
        if len > available {
            return Err(FormatError::TruncatedRecord {
                offset: start,
                needed: len,
                available,
            });
        }
        *cursor = start + len;
        Ok(&self.buffer[start..start + len])
    }

    fn decode_at(
        &self,
        cursor: &mut usize,
        nesting: usize,
        pointers: usize,
        budget: &mut usize,
    ) -> Result<DataValue, FormatError> {
        if nesting > MAX_NESTING_DEPTH {
            return Err(FormatError::NestingTooDeep);
        }

        match self.read_header(cursor)? {
            Header::Pointer(target) => {
                if pointers >= MAX_POINTER_DEPTH {
                    return Err(FormatError::PointerLoop);
                }
                // Follow the pointer; the caller's cursor stays after the pointer bytes
                let mut target_cursor = target;
                self.decode_at(&mut target_cursor, nesting, pointers + 1, budget)
            }
            Header::Value { type_id, size } => {
                *budget = budget.checked_sub(1).ok_or(FormatError::TooManyValues)?;
                self.decode_value(cursor, type_id, size, nesting, pointers, budget)
            }
        }
    }

    fn decode_value(
        &self,
        cursor: &mut usize,
        type_id: u8,
        size: usize,
        nesting: usize,
        pointers: usize,
        budget: &mut usize,
    ) -> Result<DataValue, FormatError> {
        match type_id {
            TYPE_STRING => {
                let start = *cursor;
                let bytes = self.take(cursor, size)?;
                let s = std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8(start))?;
                Ok(DataValue::String(s.to_owned()))
            }
            TYPE_DOUBLE => {
                check_size(type_id, size, 8, true)?;
                let b = self.take(cursor, 8)?;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(b);
                Ok(DataValue::Double(f64::from_be_bytes(bytes)))
            }
            TYPE_BYTES => Ok(DataValue::Bytes(self.take(cursor, size)?.to_vec())),
            TYPE_UINT16 => {
                check_size(type_id, size, 2, false)?;
                Ok(DataValue::Uint16(self.read_uint(cursor, size)? as u16))
            }
            TYPE_UINT32 => {
                check_size(type_id, size, 4, false)?;
                Ok(DataValue::Uint32(self.read_uint(cursor, size)? as u32))
            }
            TYPE_MAP => self.decode_map(cursor, size, nesting, pointers, budget),
            TYPE_INT32 => {
                check_size(type_id, size, 4, false)?;
                // Short encodings are zero-padded, so only a full 4 bytes can be negative
                Ok(DataValue::Int32(self.read_uint(cursor, size)? as u32 as i32))
            }
            TYPE_UINT64 => {
                check_size(type_id, size, 8, false)?;
                Ok(DataValue::Uint64(self.read_uint(cursor, size)? as u64))
            }
            TYPE_UINT128 => {
                check_size(type_id, size, 16, false)?;
                Ok(DataValue::Uint128(self.read_uint(cursor, size)?))
            }
            TYPE_ARRAY => {
                let remaining = self.buffer.len().saturating_sub(*cursor);
                let mut items = Vec::with_capacity(size.min(remaining));
                for _ in 0..size {
                    items.push(self.decode_at(cursor, nesting + 1, pointers, budget)?);
                }
                Ok(DataValue::Array(items))
            }
            TYPE_BOOL => {
                check_size(type_id, size, 1, false)?;
                Ok(DataValue::Bool(size == 1))
            }
            TYPE_FLOAT => {
                check_size(type_id, size, 4, true)?;
                let b = self.take(cursor, 4)?;
                Ok(DataValue::Float(f32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            }
            other => Err(FormatError::UnknownType(other)),
        }
    }

    fn decode_map(
        &self,
        cursor: &mut usize,
        count: usize,
        nesting: usize,
        pointers: usize,
        budget: &mut usize,
    ) -> Result<DataValue, FormatError> {
        let remaining = self.buffer.len().saturating_sub(*cursor);
        let capacity = count.min(remaining);
        let mut entries: Vec<(String, DataValue)> = Vec::with_capacity(capacity);
        let mut index: FxHashMap<&'a str, usize> = FxHashMap::default();
        index.reserve(capacity);

        for _ in 0..count {
            let key = self.decode_key(cursor, pointers)?;
            let value = self.decode_at(cursor, nesting + 1, pointers, budget)?;
            match index.get(key) {
                // Repeated key: last occurrence wins, first position is kept
                Some(&slot) => entries[slot].1 = value,
                None => {
                    index.insert(key, entries.len());
                    entries.push((key.to_owned(), value));
                }
            }
        }

        Ok(DataValue::Map(DataMap { entries }))
    }

    /// Decode a map key without allocating
    fn decode_key(&self, cursor: &mut usize, pointers: usize) -> Result<&'a str, FormatError> {
        let key_offset = *cursor;
        let mut pointers = pointers;
        let (type_id, size) = match self.read_header(cursor)? {
            Header::Value { type_id, size } => (type_id, size),
            Header::Pointer(target) => {
                // Keys are frequently shared; only the pointer bytes are consumed here
                let mut target_cursor = target;
                pointers += 1;
                if pointers > MAX_POINTER_DEPTH {
                    return Err(FormatError::PointerLoop);
                }
                let (type_id, size) = self.resolve_header(&mut target_cursor, &mut pointers)?;
                if type_id != TYPE_STRING {
                    return Err(FormatError::InvalidMapKey(key_offset));
                }
                let start = target_cursor;
                let bytes = self.take(&mut target_cursor, size)?;
                return std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8(start));
            }
        };

        if type_id != TYPE_STRING {
            return Err(FormatError::InvalidMapKey(key_offset));
        }
        let start = *cursor;
        let bytes = self.take(cursor, size)?;
        std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8(start))
    }

    /// Advance the cursor past one value without materializing it
    ///
    /// Pointers are not followed: skipping a pointer consumes only its bytes.
    fn skip(&self, cursor: &mut usize, nesting: usize) -> Result<(), FormatError> {
        if nesting > MAX_NESTING_DEPTH {
            return Err(FormatError::NestingTooDeep);
        }

        match self.read_header(cursor)? {
            Header::Pointer(_) => Ok(()),
            Header::Value { type_id, size } => match type_id {
                TYPE_MAP => {
                    for _ in 0..size {
                        self.skip(cursor, nesting + 1)?;
                        self.skip(cursor, nesting + 1)?;
                    }
                    Ok(())
                }
                TYPE_ARRAY => {
                    for _ in 0..size {
                        self.skip(cursor, nesting + 1)?;
                    }
                    Ok(())
                }
                TYPE_BOOL => Ok(()),
                TYPE_STRING | TYPE_DOUBLE | TYPE_BYTES | TYPE_UINT16 | TYPE_UINT32
                | TYPE_INT32 | TYPE_UINT64 | TYPE_UINT128 | TYPE_FLOAT => {
                    self.take(cursor, size).map(|_| ())
                }
                other => Err(FormatError::UnknownType(other)),
            },
        }
    }

    fn read_uint(&self, cursor: &mut usize, size: usize) -> Result<u128, FormatError> {
        let bytes = self.take(cursor, size)?;
        Ok(bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }
}

/// Validate a payload size: exactly `max` when `exact`, otherwise at most `max`
fn check_size(type_id: u8, size: usize, max: usize, exact: bool) -> Result<(), FormatError> {
    let valid = if exact { size == max } else { size <= max };
    if valid {
        Ok(())
    } else {
        Err(FormatError::InvalidSize { type_id, size })
    }
}
