//! Netlink attribute (rtattr/nlattr) decoding.
//!
//! Attributes are `{len: u16, type: u16}` headers followed by a payload,
//! each record padded to [`NLA_ALIGNTO`]. The declared length counts the
//! header and the payload but not the padding: cursors advance by the
//! aligned length, accessors only ever see the declared payload.

use tracing::warn;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Netlink attribute header (mirrors struct nlattr / struct rtattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Check if this is a nested attribute.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nla_len as usize).saturating_sub(NLA_HDRLEN)
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes. The buffer need not be aligned.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: NLA_HDRLEN,
                actual: data.len(),
            })
    }
}

/// A decoded attribute: its raw type and declared payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr<'a> {
    attr_type: u16,
    payload: &'a [u8],
}

impl<'a> Attr<'a> {
    /// Wrap a type and payload.
    pub fn new(attr_type: u16, payload: &'a [u8]) -> Self {
        Self { attr_type, payload }
    }

    /// Type exactly as it appears on the wire, flag bits included.
    pub fn raw_type(&self) -> u16 {
        self.attr_type
    }

    /// Type with the nested/byte-order flag bits cleared.
    pub fn kind(&self) -> u16 {
        self.attr_type & NLA_TYPE_MASK
    }

    /// Whether the producer set `NLA_F_NESTED`.
    pub fn is_nested(&self) -> bool {
        self.attr_type & NLA_F_NESTED != 0
    }

    /// Payload bytes, padding excluded.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty (a flag attribute).
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn u8(&self) -> Result<u8> {
        get::u8(self.payload)
    }

    pub fn u16(&self) -> Result<u16> {
        get::u16_ne(self.payload)
    }

    pub fn u32(&self) -> Result<u32> {
        get::u32_ne(self.payload)
    }

    pub fn u64(&self) -> Result<u64> {
        get::u64_ne(self.payload)
    }

    pub fn i32(&self) -> Result<i32> {
        get::i32_ne(self.payload)
    }

    pub fn u16_be(&self) -> Result<u16> {
        get::u16_be(self.payload)
    }

    pub fn u32_be(&self) -> Result<u32> {
        get::u32_be(self.payload)
    }

    /// Payload as a (possibly NUL-terminated) string.
    pub fn str(&self) -> Result<&'a str> {
        get::string(self.payload)
    }

    /// Iterate the attributes nested inside this one.
    pub fn nested(&self) -> AttrIter<'a> {
        AttrIter::new(self.payload)
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Stops at the first record that does not fit; [`deficit`](Self::deficit)
/// then reports the bytes left over.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.data.len() < NLA_HDRLEN
    }

    /// Bytes not consumed by complete records.
    pub fn deficit(&self) -> usize {
        self.data.len()
    }

    /// Declared length of the record that stopped iteration, if any.
    fn blocking_len(&self) -> Option<u16> {
        NlAttr::from_bytes(self.data).ok().map(|a| a.nla_len)
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Attr<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLA_HDRLEN {
            return None;
        }

        let attr = NlAttr::from_bytes(self.data).ok()?;

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > self.data.len() {
            return None;
        }

        let payload = &self.data[NLA_HDRLEN..len];
        let aligned_len = nla_align(len);

        // Move to next attribute
        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Attr::new(attr.nla_type, payload))
    }
}

fn report_deficit(iter: &AttrIter<'_>) {
    if iter.deficit() != 0 {
        warn!(
            deficit = iter.deficit(),
            rta_len = iter.blocking_len(),
            "attribute list has trailing bytes"
        );
    }
}

/// Attributes of one list indexed by type.
///
/// Only the first occurrence of a type is kept; later duplicates are
/// ignored, as are types above the table's maximum.
#[derive(Debug, Clone)]
pub struct AttrTable<'a> {
    slots: Vec<Option<Attr<'a>>>,
}

impl<'a> AttrTable<'a> {
    /// Index a flat attribute list.
    pub fn parse(max_type: u16, data: &'a [u8]) -> Self {
        Self::parse_flags(max_type, data, 0)
    }

    /// Index a flat attribute list, clearing `flags` from each type first
    /// (e.g. `NLA_F_NESTED` to index nests by their plain type).
    ///
    /// Trailing bytes that do not form a record are reported, not fatal.
    pub fn parse_flags(max_type: u16, data: &'a [u8], flags: u16) -> Self {
        let mut slots = vec![None; max_type as usize + 1];
        let mut iter = AttrIter::new(data);
        for attr in iter.by_ref() {
            let kind = attr.raw_type() & !flags;
            if let Some(slot) = slots.get_mut(kind as usize)
                && slot.is_none()
            {
                *slot = Some(attr);
            }
        }
        report_deficit(&iter);
        Self { slots }
    }

    /// Index the attributes nested inside `attr`.
    pub fn parse_nested(max_type: u16, attr: Attr<'a>) -> Self {
        Self::parse(max_type, attr.payload())
    }

    /// Index a compat nest: `attr` carries a `len`-byte struct followed,
    /// optionally, by a nest whose children are indexed.
    ///
    /// Returns the leading struct bytes and the (possibly empty) table.
    pub fn parse_nested_compat(
        max_type: u16,
        attr: Attr<'a>,
        len: usize,
    ) -> Result<(&'a [u8], Self)> {
        let payload = attr.payload();
        if payload.len() < len {
            return Err(Error::Truncated {
                expected: len,
                actual: payload.len(),
            });
        }
        let head = &payload[..len];
        let inner = payload
            .get(nla_align(len)..)
            .and_then(|rest| AttrIter::new(rest).next());
        match inner {
            Some(nest) => Ok((head, Self::parse_nested(max_type, nest))),
            None => Ok((head, Self::parse(max_type, &[]))),
        }
    }

    /// Look up an attribute by type.
    pub fn get(&self, attr_type: u16) -> Option<Attr<'a>> {
        self.slots.get(attr_type as usize).copied().flatten()
    }

    /// Check whether a type is present.
    pub fn contains(&self, attr_type: u16) -> bool {
        self.get(attr_type).is_some()
    }

    /// Highest indexable type.
    pub fn max_type(&self) -> u16 {
        (self.slots.len() - 1) as u16
    }
}

/// Return the first attribute of exactly `attr_type` in a flat list.
pub fn find_one(attr_type: u16, data: &[u8]) -> Option<Attr<'_>> {
    let mut iter = AttrIter::new(data);
    let found = iter.by_ref().find(|a| a.raw_type() == attr_type);
    if found.is_none() {
        report_deficit(&iter);
    }
    found
}

/// Collect up to `max` attributes in wire order, skipping types above `max`.
pub fn parse_by_index(max: usize, data: &[u8]) -> Vec<Attr<'_>> {
    let mut iter = AttrIter::new(data);
    let attrs = iter
        .by_ref()
        .filter(|a| a.raw_type() as usize <= max)
        .take(max)
        .collect();
    report_deficit(&iter);
    attrs
}

/// Helper functions for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    /// Extract a u8 value.
    pub fn u8(data: &[u8]) -> Result<u8> {
        data.first()
            .copied()
            .ok_or_else(|| Error::InvalidAttribute("empty u8 attribute".into()))
    }

    /// Extract a u16 value (native endian).
    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        array(data, "u16").map(u16::from_ne_bytes)
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        array(data, "u32").map(u32::from_ne_bytes)
    }

    /// Extract a u64 value (native endian).
    pub fn u64_ne(data: &[u8]) -> Result<u64> {
        array(data, "u64").map(u64::from_ne_bytes)
    }

    /// Extract a u16 value (big endian / network order).
    pub fn u16_be(data: &[u8]) -> Result<u16> {
        array(data, "u16").map(u16::from_be_bytes)
    }

    /// Extract a u32 value (big endian / network order).
    pub fn u32_be(data: &[u8]) -> Result<u32> {
        array(data, "u32").map(u32::from_be_bytes)
    }

    /// Extract an i32 value (native endian).
    pub fn i32_ne(data: &[u8]) -> Result<i32> {
        array(data, "i32").map(i32::from_ne_bytes)
    }

    /// Extract a null-terminated string.
    pub fn string(data: &[u8]) -> Result<&str> {
        // Find null terminator or use whole buffer
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }

    fn array<const N: usize>(data: &[u8], what: &str) -> Result<[u8; N]> {
        data.get(..N)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| Error::InvalidAttribute(format!("truncated {} attribute", what)))
    }
}
