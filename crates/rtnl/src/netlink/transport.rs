//! The seam between the conversation engines and a netlink endpoint.
//!
//! [`NetlinkSocket`](super::socket::NetlinkSocket) is the real implementation;
//! tests drive the engines with a scripted kernel instead.

use std::future::Future;

use bytes::Bytes;

use super::error::Result;
use super::socket::Protocol;

/// One received datagram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Datagram {
    /// Raw bytes, possibly several netlink messages.
    pub data: Bytes,
    /// Port id of the sender; 0 for the kernel.
    pub sender: u32,
    /// The kernel reported MSG_TRUNC: `data` is incomplete.
    pub truncated: bool,
    /// Network namespace id from the ancillary data, if the socket listens
    /// to all namespaces and the kernel attached one.
    pub nsid: Option<i32>,
}

impl Datagram {
    /// A complete datagram sent by the kernel.
    pub fn from_kernel(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Mark the datagram as truncated.
    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    /// Attach a namespace id.
    pub fn with_nsid(mut self, nsid: i32) -> Self {
        self.nsid = Some(nsid);
        self
    }

    /// Set the sender port.
    pub fn with_sender(mut self, sender: u32) -> Self {
        self.sender = sender;
        self
    }
}

/// A netlink endpoint: send segments as one datagram, receive datagrams.
pub trait Transport: Send + Sync {
    /// Netlink protocol of the endpoint.
    fn protocol(&self) -> Protocol;

    /// Locally bound port id.
    fn port_id(&self) -> u32;

    /// Send `segments` back to back as a single datagram to the kernel.
    fn send_segments(&self, segments: &[&[u8]]) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next datagram. A zero-length read is
    /// [`Error::Eof`](super::error::Error::Eof).
    fn recv(&self) -> impl Future<Output = Result<Datagram>> + Send;

    /// Peek at a queued datagram without consuming it or waiting.
    fn peek_pending(&self) -> Result<Option<Bytes>>;

    /// Release the endpoint. Must be idempotent.
    fn close(&mut self) {}
}
