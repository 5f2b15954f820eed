//! Message builder for constructing netlink messages.
//!
//! A [`MessageBuilder`] owns one in-progress message inside a fixed capacity.
//! The header's `nlmsg_len` always equals the bytes written so far, so the
//! message can be sent at any point. Appends that would overflow the
//! capacity fail with [`Error::MessageFull`] and leave the message untouched.

use zerocopy::{Immutable, IntoBytes};

use super::attr::{NLA_F_NESTED, NLA_HDRLEN, NlAttr, nla_align};
use super::error::{Error, Result};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Default capacity of a request message.
pub const DEFAULT_CAPACITY: usize = 32768;

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
#[must_use = "a nest must be closed with nest_end"]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// Token for a compat nest: an outer attribute carrying a struct followed by
/// an inner nest.
#[derive(Debug, Clone, Copy)]
#[must_use = "a compat nest must be closed with nest_compat_end"]
pub struct CompatNestToken {
    outer: usize,
    inner: NestToken,
}

fn check_room(capacity: usize, current: usize, add: usize) -> Result<()> {
    let required = current + add;
    if required > capacity {
        return Err(Error::MessageFull { capacity, required });
    }
    Ok(())
}

/// Append one padded attribute record to `buf`.
fn put_attr(buf: &mut Vec<u8>, capacity: usize, attr_type: u16, data: &[u8]) -> Result<()> {
    let record = NLA_HDRLEN + data.len();
    if record > u16::MAX as usize {
        return Err(Error::InvalidAttribute(format!(
            "attribute {} payload of {} bytes does not fit a u16 length",
            attr_type,
            data.len()
        )));
    }
    let start = nla_align(buf.len());
    check_room(capacity, start, nla_align(record))?;

    buf.resize(start, 0);
    buf.extend_from_slice(NlAttr::new(attr_type, data.len()).as_bytes());
    buf.extend_from_slice(data);
    buf.resize(start + nla_align(record), 0);
    Ok(())
}

/// Write the length of the attribute at `offset`. Lengths beyond the u16
/// field are rejected and nothing is written.
fn patch_attr_len(buf: &mut [u8], offset: usize, len: usize) -> Result<()> {
    let len = u16::try_from(len).map_err(|_| {
        Error::InvalidAttribute(format!(
            "nested attribute of {} bytes does not fit a u16 length",
            len
        ))
    })?;
    buf[offset..offset + 2].copy_from_slice(&len.to_ne_bytes());
    Ok(())
}

fn attr_len_at(buf: &[u8], offset: usize) -> usize {
    u16::from_ne_bytes([buf[offset], buf[offset + 1]]) as usize
}

/// Builder for constructing netlink messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
    capacity: usize,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self::with_header(NlMsgHdr::new(msg_type, flags))
    }

    /// Create a builder bounded to `capacity` bytes.
    ///
    /// Capacities below the header size are raised to the header size.
    pub fn with_capacity(msg_type: u16, flags: u16, capacity: usize) -> Self {
        let mut builder = Self::new(msg_type, flags);
        builder.capacity = capacity.max(NLMSG_HDRLEN);
        builder
    }

    /// Create a builder from an existing header. Only type, flags, seq and
    /// pid are taken; the length always reflects the buffer.
    pub fn with_header(header: NlMsgHdr) -> Self {
        let mut buf = vec![0u8; NLMSG_HDRLEN];
        buf[..std::mem::size_of::<NlMsgHdr>()].copy_from_slice(header.as_bytes());
        let mut builder = Self {
            buf,
            capacity: DEFAULT_CAPACITY,
        };
        builder.sync_len();
        builder
    }

    fn sync_len(&mut self) {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
    }

    /// Get the current message length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the message is empty (header only).
    pub fn is_empty(&self) -> bool {
        self.buf.len() == NLMSG_HDRLEN
    }

    /// Maximum length of the message.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append raw bytes to the message (with alignment padding).
    ///
    /// For fixed-schema structs that precede the attribute section.
    pub fn append_raw(&mut self, data: &[u8]) -> Result<()> {
        let start = nlmsg_align(self.buf.len());
        check_room(self.capacity, start, nlmsg_align(data.len()))?;
        self.buf.resize(start, 0);
        self.buf.extend_from_slice(data);
        self.buf.resize(start + nlmsg_align(data.len()), 0);
        self.sync_len();
        Ok(())
    }

    /// Append a fixed-size wire struct to the message.
    pub fn append_struct<T: IntoBytes + Immutable>(&mut self, data: &T) -> Result<()> {
        self.append_raw(data.as_bytes())
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        put_attr(&mut self.buf, self.capacity, attr_type, data)?;
        self.sync_len();
        Ok(())
    }

    /// Append a u8 attribute.
    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) -> Result<()> {
        self.append_attr(attr_type, &[value])
    }

    /// Append an empty (flag) attribute with no payload.
    pub fn append_attr_empty(&mut self, attr_type: u16) -> Result<()> {
        self.append_attr(attr_type, &[])
    }

    /// Append a u16 attribute (native endian).
    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u32 attribute (native endian).
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u64 attribute (native endian).
    pub fn append_attr_u64(&mut self, attr_type: u16, value: u64) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u16 attribute (big endian / network order).
    pub fn append_attr_u16_be(&mut self, attr_type: u16, value: u16) -> Result<()> {
        self.append_attr(attr_type, &value.to_be_bytes())
    }

    /// Append a u32 attribute (big endian / network order).
    pub fn append_attr_u32_be(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.append_attr(attr_type, &value.to_be_bytes())
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) -> Result<()> {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0); // null terminator
        self.append_attr(attr_type, &data)
    }

    /// Append an attribute tree built separately.
    pub fn append_attr_buf(&mut self, attrs: &AttrBuf) -> Result<()> {
        let start = nla_align(self.buf.len());
        check_room(self.capacity, start, nla_align(attrs.buf.len()))?;
        self.buf.resize(start, 0);
        self.buf.extend_from_slice(&attrs.buf);
        self.buf.resize(start + nla_align(attrs.buf.len()), 0);
        self.sync_len();
        Ok(())
    }

    /// Start a nested attribute. Returns a token to finalize it.
    ///
    /// OR `NLA_F_NESTED` into `attr_type` for families that require the flag.
    pub fn nest_start(&mut self, attr_type: u16) -> Result<NestToken> {
        let offset = nla_align(self.buf.len());
        self.append_attr(attr_type, &[])?;
        Ok(NestToken { offset })
    }

    /// End a nested attribute started with `nest_start`.
    ///
    /// Returns the nest's final length. A nest that outgrew the u16 length
    /// field is removed along with its children and
    /// [`Error::InvalidAttribute`] is returned.
    pub fn nest_end(&mut self, token: NestToken) -> Result<usize> {
        let len = self.buf.len() - token.offset;
        if let Err(e) = patch_attr_len(&mut self.buf, token.offset, len) {
            self.rollback(token.offset);
            return Err(e);
        }
        Ok(len)
    }

    fn rollback(&mut self, offset: usize) {
        self.buf.truncate(offset);
        self.sync_len();
    }

    /// Start a compat nest: an attribute whose payload is `data` followed by
    /// a nest of the same type.
    pub fn nest_compat_start(&mut self, attr_type: u16, data: &[u8]) -> Result<CompatNestToken> {
        let outer = nla_align(self.buf.len());
        let snapshot = self.buf.len();
        self.append_attr(attr_type, data)?;
        match self.nest_start(attr_type) {
            Ok(inner) => Ok(CompatNestToken { outer, inner }),
            Err(e) => {
                self.rollback(snapshot);
                Err(e)
            }
        }
    }

    /// End a compat nest. The outer attribute grows to cover the inner nest;
    /// an inner nest left empty is dropped.
    ///
    /// Fails like [`nest_end`](Self::nest_end) when the outer attribute no
    /// longer fits its length field; the whole compat nest is removed.
    pub fn nest_compat_end(&mut self, token: CompatNestToken) -> Result<()> {
        let inner_len = self.buf.len() - token.inner.offset;
        if inner_len == NLA_HDRLEN {
            self.rollback(token.inner.offset);
        }
        let outer_len = self.buf.len() - token.outer;
        let patched = patch_attr_len(&mut self.buf, token.outer, outer_len).and_then(|()| {
            if inner_len == NLA_HDRLEN {
                Ok(())
            } else {
                patch_attr_len(&mut self.buf, token.inner.offset, inner_len)
            }
        });
        if patched.is_err() {
            self.rollback(token.outer);
        }
        patched
    }

    /// Get the header as currently written.
    pub fn header(&self) -> NlMsgHdr {
        // The buffer always starts with a full header.
        NlMsgHdr::from_bytes(&self.buf).unwrap_or_default()
    }

    /// Set the message flags.
    pub fn set_flags(&mut self, flags: u16) {
        self.buf[6..8].copy_from_slice(&flags.to_ne_bytes());
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        let bytes = seq.to_ne_bytes();
        self.buf[8..12].copy_from_slice(&bytes);
    }

    /// Set the port ID.
    pub fn set_pid(&mut self, pid: u32) {
        let bytes = pid.to_ne_bytes();
        self.buf[12..16].copy_from_slice(&bytes);
    }

    /// Finalize and return the message bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Mutable access for stamping a batch in place.
    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// A standalone attribute with a bounded tree of children, built outside any
/// message and appended later with [`MessageBuilder::append_attr_buf`].
#[derive(Debug, Clone)]
pub struct AttrBuf {
    buf: Vec<u8>,
    capacity: usize,
}

impl AttrBuf {
    /// Create an empty attribute of `attr_type`, bounded to `capacity` bytes
    /// including its own header.
    ///
    /// The capacity is clamped to what the u16 length field can describe, so
    /// the tree can never outgrow its own header.
    pub fn new(attr_type: u16, capacity: usize) -> Self {
        Self {
            buf: NlAttr::new(attr_type, 0).as_bytes().to_vec(),
            capacity: capacity.clamp(NLA_HDRLEN, u16::MAX as usize),
        }
    }

    /// Append a child attribute.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        put_attr(&mut self.buf, self.capacity, attr_type, data)?;
        let len = self.buf.len();
        patch_attr_len(&mut self.buf, 0, len)
    }

    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) -> Result<()> {
        self.append_attr(attr_type, &[value])
    }

    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    pub fn append_attr_u64(&mut self, attr_type: u16, value: u64) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Start a nested child. The child is marked `NLA_F_NESTED`.
    pub fn nest_start(&mut self, attr_type: u16) -> Result<NestToken> {
        let offset = nla_align(self.buf.len());
        self.append_attr(attr_type | NLA_F_NESTED, &[])?;
        Ok(NestToken { offset })
    }

    /// End a nested child started with `nest_start`.
    pub fn nest_end(&mut self, token: NestToken) -> Result<usize> {
        let len = self.buf.len() - token.offset;
        patch_attr_len(&mut self.buf, token.offset, len)?;
        Ok(len)
    }

    /// Declared length, header included.
    pub fn len(&self) -> usize {
        attr_len_at(&self.buf, 0)
    }

    /// Whether no children were appended.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == NLA_HDRLEN
    }

    /// Children, without the outer header.
    pub fn payload(&self) -> &[u8] {
        &self.buf[NLA_HDRLEN..]
    }

    /// The whole attribute.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
