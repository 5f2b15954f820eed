//! One netlink conversation: a transport plus the state the engines share.
//!
//! The request/reply, dump and listen engines are implemented as methods on
//! [`Connection`] in their own modules ([`talk`](super::talk),
//! [`dump`](super::dump), [`listen`](super::listen)).
//!
//! # Example
//!
//! ```ignore
//! use rtnl::netlink::{Connection, Protocol};
//!
//! let conn = Connection::new(Protocol::Route)?;
//! for link in conn.get_links().await? {
//!     println!("{}: {}", link.index, link.name.as_deref().unwrap_or("?"));
//! }
//! ```

use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::trace;

use super::config::Config;
use super::error::{Error, Result};
use super::extack::{ExtAckHandler, LogExtAck};
use super::socket::{NetlinkSocket, Protocol};
use super::transport::{Datagram, Transport};

type CaptureSink = Mutex<Box<dyn Write + Send>>;

/// A netlink conversation over a [`Transport`].
pub struct Connection<T: Transport = NetlinkSocket> {
    transport: T,
    seq: AtomicU32,
    dump_seq: AtomicU32,
    config: Config,
    ext_ack: Box<dyn ExtAckHandler>,
    capture: Option<CaptureSink>,
}

impl Connection<NetlinkSocket> {
    /// Open a socket for `protocol` with default settings.
    pub fn new(protocol: Protocol) -> Result<Self> {
        Self::with_config(protocol, Config::default())
    }

    /// Open a socket for `protocol` with explicit settings.
    pub fn with_config(protocol: Protocol, config: Config) -> Result<Self> {
        let socket = NetlinkSocket::open(protocol, &config)?;
        Ok(Self::from_transport(socket, config))
    }
}

impl<T: Transport> Connection<T> {
    /// Wrap an already open transport.
    ///
    /// The sequence counter starts from the current unix time so that
    /// replies to an earlier process on a reused port are not mistaken
    /// for ours.
    pub fn from_transport(transport: T, config: Config) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        Self {
            transport,
            seq: AtomicU32::new(seed),
            dump_seq: AtomicU32::new(0),
            config,
            ext_ack: Box::new(LogExtAck),
            capture: None,
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Protocol of the underlying transport.
    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }

    /// Locally bound port id.
    pub fn port_id(&self) -> u32 {
        self.transport.port_id()
    }

    /// Settings this connection was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Increment the sequence counter and return the new value.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Last sequence number handed out.
    pub fn seq(&self) -> u32 {
        self.seq.load(Ordering::Relaxed)
    }

    /// Sequence number of the outstanding dump request.
    pub fn dump_seq(&self) -> u32 {
        self.dump_seq.load(Ordering::Relaxed)
    }

    pub(crate) fn start_dump(&self) -> u32 {
        let seq = self.next_seq();
        self.dump_seq.store(seq, Ordering::Relaxed);
        seq
    }

    /// Replace the extended-ack reporter.
    pub fn set_ext_ack_handler(&mut self, handler: impl ExtAckHandler + 'static) {
        self.ext_ack = Box::new(handler);
    }

    pub(crate) fn ext_ack_handler(&self) -> &dyn ExtAckHandler {
        self.ext_ack.as_ref()
    }

    /// Stop (or resume) logging kernel errors.
    pub fn set_suppress_errors(&mut self, suppress: bool) {
        self.config.suppress_errors = suppress;
    }

    pub(crate) fn errors_suppressed(&self) -> bool {
        self.config.suppress_errors
    }

    /// Tee every datagram received by the dump engine to `writer`.
    pub fn set_capture(&mut self, writer: impl Write + Send + 'static) {
        self.capture = Some(Mutex::new(Box::new(writer)));
    }

    /// Stop capturing and return the sink.
    pub fn take_capture(&mut self) -> Option<Box<dyn Write + Send>> {
        self.capture
            .take()
            .map(|sink| sink.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn capture_datagram(&self, data: &[u8]) -> Result<()> {
        if let Some(sink) = &self.capture {
            let mut writer = sink.lock().unwrap_or_else(|e| e.into_inner());
            writer.write_all(data)?;
        }
        Ok(())
    }

    /// Close the transport. Safe to call more than once.
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Send `segments` as one datagram.
    pub(crate) async fn send_segments(&self, segments: &[&[u8]]) -> Result<()> {
        trace!(
            segments = segments.len(),
            bytes = segments.iter().map(|s| s.len()).sum::<usize>(),
            "netlink send"
        );
        self.transport.send_segments(segments).await
    }

    /// Receive one datagram, bounded by the configured deadline if any.
    pub(crate) async fn recv(&self) -> Result<Datagram> {
        let datagram = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, self.transport.recv())
                .await
                .map_err(|_| Error::Timeout)??,
            None => self.transport.recv().await?,
        };
        trace!(
            bytes = datagram.data.len(),
            sender = datagram.sender,
            truncated = datagram.truncated,
            "netlink recv"
        );
        Ok(datagram)
    }
}

impl<T: Transport> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("protocol", &self.protocol())
            .field("port_id", &self.port_id())
            .field("seq", &self.seq())
            .field("dump_seq", &self.dump_seq())
            .field("capturing", &self.capture.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::netlink::fixtures::MockKernel;

    #[test]
    fn test_seq_increments() {
        let conn = Connection::from_transport(MockKernel::new(100), Config::default());
        let first = conn.next_seq();
        assert_eq!(conn.next_seq(), first.wrapping_add(1));
        assert_eq!(conn.seq(), first.wrapping_add(1));
    }

    #[test]
    fn test_dump_seq_is_recorded() {
        let conn = Connection::from_transport(MockKernel::new(100), Config::default());
        let seq = conn.start_dump();
        assert_eq!(conn.dump_seq(), seq);
        assert_eq!(conn.seq(), seq);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut conn = Connection::from_transport(MockKernel::new(100), Config::default());
        conn.close();
        conn.close();
        assert!(conn.transport().is_closed());
    }

    #[test]
    fn test_capture_sink() {
        let mut conn = Connection::from_transport(MockKernel::new(1), Config::default());
        conn.set_capture(Vec::new());
        conn.capture_datagram(&[1, 2, 3]).unwrap();
        assert!(conn.take_capture().is_some());
        // no sink: nothing to do
        conn.capture_datagram(&[4]).unwrap();
    }

    #[tokio::test]
    async fn test_recv_eof_on_empty_queue() {
        let conn = Connection::from_transport(MockKernel::new(1), Config::default());
        assert!(matches!(conn.recv().await, Err(Error::Eof)));
    }

    #[tokio::test]
    async fn test_recv_deadline() {
        let kernel = MockKernel::new(1).stalled();
        let config = Config::default().timeout(Duration::from_millis(20));
        let conn = Connection::from_transport(kernel, config);
        assert!(matches!(conn.recv().await, Err(Error::Timeout)));
    }
}
