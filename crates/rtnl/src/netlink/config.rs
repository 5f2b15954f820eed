//! Socket and conversation settings.

use std::time::Duration;

/// Default receive buffer size (1 MiB).
pub const DEFAULT_RCVBUF: usize = 1024 * 1024;

/// Default send buffer size.
pub const DEFAULT_SNDBUF: usize = 32768;

/// Settings threaded into [`NetlinkSocket::open`](super::socket::NetlinkSocket::open)
/// and [`Connection::with_config`](super::connection::Connection::with_config).
///
/// ```ignore
/// let config = Config::default()
///     .rcvbuf(4 * 1024 * 1024)
///     .groups(rtnetlink_groups::nl_mgrp(RTNLGRP_LINK))
///     .listen_all_nsid(true);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SO_RCVBUF for the socket.
    pub rcvbuf: usize,
    /// SO_SNDBUF for the socket.
    pub sndbuf: usize,
    /// Legacy multicast group bitmask bound at open.
    pub groups: u32,
    /// Groups joined with NETLINK_ADD_MEMBERSHIP after bind (for ids > 32).
    pub memberships: Vec<u32>,
    /// Request extended ACKs (best-effort).
    pub ext_ack: bool,
    /// Receive notifications from all peer namespaces, tagged with nsid.
    pub listen_all_nsid: bool,
    /// Do not report kernel errors through the log.
    pub suppress_errors: bool,
    /// Bound on each receive; `None` blocks until the kernel answers.
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rcvbuf: DEFAULT_RCVBUF,
            sndbuf: DEFAULT_SNDBUF,
            groups: 0,
            memberships: Vec::new(),
            ext_ack: true,
            listen_all_nsid: false,
            suppress_errors: false,
            timeout: None,
        }
    }
}

impl Config {
    /// Set the receive buffer size.
    pub fn rcvbuf(mut self, bytes: usize) -> Self {
        self.rcvbuf = bytes;
        self
    }

    /// Set the send buffer size.
    pub fn sndbuf(mut self, bytes: usize) -> Self {
        self.sndbuf = bytes;
        self
    }

    /// Set the multicast group bitmask.
    pub fn groups(mut self, mask: u32) -> Self {
        self.groups = mask;
        self
    }

    /// Join a multicast group by id after binding.
    pub fn membership(mut self, group: u32) -> Self {
        self.memberships.push(group);
        self
    }

    pub fn ext_ack(mut self, enabled: bool) -> Self {
        self.ext_ack = enabled;
        self
    }

    pub fn listen_all_nsid(mut self, enabled: bool) -> Self {
        self.listen_all_nsid = enabled;
        self
    }

    pub fn suppress_errors(mut self, enabled: bool) -> Self {
        self.suppress_errors = enabled;
        self
    }

    /// Bound every receive by `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
