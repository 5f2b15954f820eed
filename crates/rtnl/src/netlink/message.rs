//! Netlink message header and framing.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::AttrIter;
use super::error::{Error, Result};

/// Netlink message header alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

/// Netlink message header (mirrors struct nlmsghdr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Length of message including header.
    pub nlmsg_len: u32,
    /// Message type.
    pub nlmsg_type: u16,
    /// Additional flags.
    pub nlmsg_flags: u16,
    /// Sequence number.
    pub nlmsg_seq: u32,
    /// Sending process port ID.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Create a new message header.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            nlmsg_seq: 0,
            nlmsg_pid: 0,
        }
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nlmsg_len as usize).saturating_sub(NLMSG_HDRLEN)
    }

    /// Check if this is an error message.
    pub fn is_error(&self) -> bool {
        self.nlmsg_type == NlMsgType::ERROR
    }

    /// Check if this is a done message.
    pub fn is_done(&self) -> bool {
        self.nlmsg_type == NlMsgType::DONE
    }

    /// Check if this message has the multi flag.
    pub fn is_multi(&self) -> bool {
        self.nlmsg_flags & NLM_F_MULTI != 0
    }

    /// Check if the kernel flagged an interrupted (inconsistent) dump.
    pub fn is_dump_interrupted(&self) -> bool {
        self.nlmsg_flags & NLM_F_DUMP_INTR != 0
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse header from bytes. The buffer need not be aligned.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: NLMSG_HDRLEN,
                actual: data.len(),
            })
    }
}

/// Standard netlink message types.
pub struct NlMsgType;

impl NlMsgType {
    /// No operation, message must be discarded.
    pub const NOOP: u16 = 1;
    /// Error message or ACK.
    pub const ERROR: u16 = 2;
    /// End of multipart message.
    pub const DONE: u16 = 3;
    /// Data lost, request resend.
    pub const OVERRUN: u16 = 4;

    /// Types below this value are reserved for control messages.
    pub const MIN_TYPE: u16 = 0x10;

    // Link messages
    pub const RTM_NEWLINK: u16 = 16;
    pub const RTM_DELLINK: u16 = 17;
    pub const RTM_GETLINK: u16 = 18;
    pub const RTM_SETLINK: u16 = 19;

    // Address messages
    pub const RTM_NEWADDR: u16 = 20;
    pub const RTM_DELADDR: u16 = 21;
    pub const RTM_GETADDR: u16 = 22;

    // Route messages
    pub const RTM_NEWROUTE: u16 = 24;
    pub const RTM_DELROUTE: u16 = 25;
    pub const RTM_GETROUTE: u16 = 26;

    // Neighbor messages
    pub const RTM_NEWNEIGH: u16 = 28;
    pub const RTM_DELNEIGH: u16 = 29;
    pub const RTM_GETNEIGH: u16 = 30;

    // Qdisc messages
    pub const RTM_NEWQDISC: u16 = 36;
    pub const RTM_DELQDISC: u16 = 37;
    pub const RTM_GETQDISC: u16 = 38;

    // Link statistics
    pub const RTM_NEWSTATS: u16 = 92;
    pub const RTM_GETSTATS: u16 = 94;

    // Netns messages
    pub const RTM_NEWNSID: u16 = 88;
    pub const RTM_DELNSID: u16 = 89;
    pub const RTM_GETNSID: u16 = 90;

    /// Human-readable name for the message types this crate knows.
    pub fn name(msg_type: u16) -> Option<&'static str> {
        Some(match msg_type {
            Self::NOOP => "NOOP",
            Self::ERROR => "ERROR",
            Self::DONE => "DONE",
            Self::OVERRUN => "OVERRUN",
            Self::RTM_NEWLINK => "NEWLINK",
            Self::RTM_DELLINK => "DELLINK",
            Self::RTM_NEWADDR => "NEWADDR",
            Self::RTM_DELADDR => "DELADDR",
            Self::RTM_NEWROUTE => "NEWROUTE",
            Self::RTM_DELROUTE => "DELROUTE",
            Self::RTM_NEWNEIGH => "NEWNEIGH",
            Self::RTM_DELNEIGH => "DELNEIGH",
            Self::RTM_NEWQDISC => "NEWQDISC",
            Self::RTM_DELQDISC => "DELQDISC",
            Self::RTM_NEWNSID => "NEWNSID",
            Self::RTM_DELNSID => "DELNSID",
            _ => return None,
        })
    }
}

/// Netlink message flags.
pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
pub const NLM_F_ECHO: u16 = 0x08;
pub const NLM_F_DUMP_INTR: u16 = 0x10;
pub const NLM_F_DUMP_FILTERED: u16 = 0x20;

// Modifiers to GET request
pub const NLM_F_ROOT: u16 = 0x100;
pub const NLM_F_MATCH: u16 = 0x200;
pub const NLM_F_ATOMIC: u16 = 0x400;
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;

// Modifiers to NEW request
pub const NLM_F_REPLACE: u16 = 0x100;
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;
pub const NLM_F_APPEND: u16 = 0x800;

// Flags on ERROR/ACK messages
pub const NLM_F_CAPPED: u16 = 0x100;
pub const NLM_F_ACK_TLVS: u16 = 0x200;

/// One framed message inside a receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Header, copied out of the buffer.
    pub header: NlMsgHdr,
    /// Payload (declared length minus header).
    pub payload: &'a [u8],
    /// The whole message, header included, without trailing padding.
    pub bytes: &'a [u8],
    /// Byte offset of the message within the buffer.
    pub offset: usize,
}

/// Iterator over netlink messages in a buffer.
///
/// Iteration stops at the first record whose declared length is
/// inconsistent with the remaining bytes; that record is yielded as
/// [`Error::Framing`]. Once iteration ends, [`remnant`](Self::remnant)
/// reports the bytes that did not form a message.
pub struct MessageIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> MessageIter<'a> {
    /// Create a new message iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }

    /// Bytes left unconsumed.
    pub fn remnant(&self) -> usize {
        self.data.len() - self.offset
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<Frame<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let rest = &self.data[self.offset..];
        if rest.len() < NLMSG_HDRLEN {
            return None;
        }

        let header = match NlMsgHdr::from_bytes(rest) {
            Ok(h) => h,
            Err(e) => return Some(Err(e)),
        };

        let msg_len = header.nlmsg_len as usize;
        if msg_len < NLMSG_HDRLEN || msg_len > rest.len() {
            self.failed = true;
            return Some(Err(Error::Framing(format!(
                "malformed message: len={} with {} bytes left",
                msg_len,
                rest.len()
            ))));
        }

        let frame = Frame {
            header,
            payload: &rest[NLMSG_HDRLEN..msg_len],
            bytes: &rest[..msg_len],
            offset: self.offset,
        };
        self.offset += nlmsg_align(msg_len).min(rest.len());

        Some(Ok(frame))
    }
}

/// Netlink error message payload (struct nlmsgerr).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgError {
    /// Error code (negative errno or 0 for ACK).
    pub error: i32,
    /// Original message header that caused the error.
    pub msg: NlMsgHdr,
}

impl NlMsgError {
    /// Size of the fixed part.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Parse error message from payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            })
    }

    /// Check if this is an ACK (no error).
    pub fn is_ack(&self) -> bool {
        self.error == 0
    }

    /// Get attributes after the error message (extended ACK).
    ///
    /// Unless the kernel capped the echo (`NLM_F_CAPPED` on the outer
    /// header), the whole offending request sits between the fixed part
    /// and the attributes.
    pub fn attrs<'a>(&self, outer_flags: u16, payload: &'a [u8]) -> AttrIter<'a> {
        AttrIter::new(self.attrs_bytes(outer_flags, payload))
    }

    /// Raw bytes of the extended-ACK attribute section.
    pub fn attrs_bytes<'a>(&self, outer_flags: u16, payload: &'a [u8]) -> &'a [u8] {
        let mut offset = Self::SIZE;
        if outer_flags & NLM_F_CAPPED == 0 {
            offset += self.msg.payload_len();
        }
        payload.get(offset..).unwrap_or(&[])
    }
}
