//! Extended acknowledgement (error detail) parsing and reporting.
//!
//! When a socket opts into `NETLINK_EXT_ACK`, the kernel appends TLVs to
//! ERROR (and DONE) messages: a human-readable message and an offset into
//! the offending request. They are present only if `NLM_F_ACK_TLVS` is set
//! on the outer header.

use tracing::{error, warn};

use super::attr::AttrTable;
use super::message::{NLM_F_ACK_TLVS, NLM_F_CAPPED, NlMsgError, NlMsgHdr};

/// Extended-ack attribute types (enum nlmsgerr_attrs).
pub const NLMSGERR_ATTR_UNUSED: u16 = 0;
pub const NLMSGERR_ATTR_MSG: u16 = 1;
pub const NLMSGERR_ATTR_OFFS: u16 = 2;
pub const NLMSGERR_ATTR_COOKIE: u16 = 3;
pub const NLMSGERR_ATTR_MAX: u16 = NLMSGERR_ATTR_COOKIE;

/// Diagnostic detail attached to an ERROR/ACK or DONE message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExtAck {
    /// Error code carried by the message (0 for an ACK).
    pub error: i32,
    /// Kernel message text.
    pub message: Option<String>,
    /// Byte offset into the offending request.
    pub offset: Option<u32>,
    /// Header of the offending request, unless the kernel capped the echo.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub offending: Option<NlMsgHdr>,
}

impl ExtAck {
    /// Parse the TLVs of an ERROR message.
    ///
    /// Returns `None` when the kernel did not attach any (`NLM_F_ACK_TLVS`
    /// unset). An offset pointing beyond the message is reset to 0.
    pub fn from_error(header: &NlMsgHdr, payload: &[u8]) -> Option<Self> {
        if header.nlmsg_flags & NLM_F_ACK_TLVS == 0 {
            return None;
        }
        let err = NlMsgError::from_bytes(payload).ok()?;
        let capped = header.nlmsg_flags & NLM_F_CAPPED != 0;

        let mut ack = Self {
            error: err.error,
            offending: (!capped).then_some(err.msg),
            ..Default::default()
        };

        let tlvs = err.attrs_bytes(header.nlmsg_flags, payload);
        let table = AttrTable::parse(NLMSGERR_ATTR_MAX, tlvs);
        ack.message = table
            .get(NLMSGERR_ATTR_MSG)
            .and_then(|a| a.str().ok())
            .map(str::to_owned);
        ack.offset = table
            .get(NLMSGERR_ATTR_OFFS)
            .and_then(|a| a.u32().ok())
            .map(|off| {
                if off > header.nlmsg_len {
                    warn!(offset = off, "invalid offset for NLMSGERR_ATTR_OFFS");
                    0
                } else {
                    off
                }
            });
        Some(ack)
    }

    /// Parse the TLVs that follow the status code of a DONE message.
    pub fn from_done(header: &NlMsgHdr, payload: &[u8]) -> Option<Self> {
        if header.nlmsg_flags & NLM_F_ACK_TLVS == 0 {
            return None;
        }
        let code = i32::from_ne_bytes(payload.get(..4)?.try_into().ok()?);
        let table = AttrTable::parse(NLMSGERR_ATTR_MAX, &payload[4..]);
        Some(Self {
            error: code,
            message: table
                .get(NLMSGERR_ATTR_MSG)
                .and_then(|a| a.str().ok())
                .map(str::to_owned),
            offset: None,
            offending: None,
        })
    }

    /// Whether the kernel sent non-empty message text.
    pub fn has_message(&self) -> bool {
        self.message.as_deref().is_some_and(|m| !m.is_empty())
    }

    /// Whether the acknowledged request failed.
    pub fn is_error(&self) -> bool {
        self.error != 0
    }
}

/// Hook invoked with the detail of every ERROR/ACK the talk engine sees.
///
/// Returns `true` when the ack was reported as an error, which suppresses
/// the generic kernel-error line.
pub trait ExtAckHandler: Send + Sync {
    fn report(&self, ack: &ExtAck) -> bool;
}

impl<F> ExtAckHandler for F
where
    F: Fn(&ExtAck) -> bool + Send + Sync,
{
    fn report(&self, ack: &ExtAck) -> bool {
        self(ack)
    }
}

/// Default reporter: logs kernel text as `Error: ...` or `Warning: ...`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExtAck;

impl ExtAckHandler for LogExtAck {
    fn report(&self, ack: &ExtAck) -> bool {
        let Some(msg) = ack.message.as_deref().filter(|m| !m.is_empty()) else {
            return false;
        };
        let stop = if msg.ends_with('.') { "" } else { "." };
        if ack.is_error() {
            error!(errno = -ack.error, "Error: {}{}", msg, stop);
            true
        } else {
            warn!("Warning: {}{}", msg, stop);
            false
        }
    }
}
