//! Low-level async netlink socket operations.

use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};

use bytes::{Bytes, BytesMut};
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tracing::debug;

use super::config::Config;
use super::error::{Error, Result};
use super::transport::{Datagram, Transport};

const SOL_NETLINK: libc::c_int = 270;
const NETLINK_LISTEN_ALL_NSID: libc::c_int = 8;

/// Netlink protocol families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Routing/device hook (ip, tc, etc.)
    Route,
    /// Generic netlink
    Generic,
    /// Socket diagnostics (ss)
    SockDiag,
    /// Netfilter
    Netfilter,
    /// Kernel connector
    Connector,
    /// Kobject uevent
    KobjectUevent,
}

impl Protocol {
    /// Protocol number passed to socket(2).
    pub fn number(self) -> isize {
        match self {
            Protocol::Route => protocols::NETLINK_ROUTE,
            Protocol::Generic => protocols::NETLINK_GENERIC,
            Protocol::SockDiag => protocols::NETLINK_SOCK_DIAG,
            Protocol::Netfilter => protocols::NETLINK_NETFILTER,
            Protocol::Connector => protocols::NETLINK_CONNECTOR,
            Protocol::KobjectUevent => protocols::NETLINK_KOBJECT_UEVENT,
        }
    }
}

/// Async netlink socket.
pub struct NetlinkSocket {
    /// The underlying async file descriptor; `None` once closed.
    fd: Option<AsyncFd<Socket>>,
    /// Local port ID (assigned by kernel).
    port_id: u32,
    /// Protocol this socket uses.
    protocol: Protocol,
}

impl NetlinkSocket {
    /// Create a new netlink socket for the given protocol with default settings.
    pub fn new(protocol: Protocol) -> Result<Self> {
        Self::open(protocol, &Config::default())
    }

    /// Open, size, bind and address a netlink socket.
    ///
    /// Fails if the buffer sizes cannot be set or the bind fails. Extended
    /// ACK is requested best-effort.
    pub fn open(protocol: Protocol, config: &Config) -> Result<Self> {
        let mut socket = Socket::new(protocol.number())?;
        let raw = socket.as_raw_fd();

        setsockopt_int(raw, libc::SOL_SOCKET, libc::SO_SNDBUF, config.sndbuf)?;
        setsockopt_int(raw, libc::SOL_SOCKET, libc::SO_RCVBUF, config.rcvbuf)?;

        if config.ext_ack {
            // Older kernels reject the option.
            socket.set_ext_ack(true).ok();
        }

        let mut addr = SocketAddr::new(0, config.groups);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let port_id = addr.port_number();

        for group in &config.memberships {
            socket.add_membership(*group)?;
        }
        if config.listen_all_nsid {
            setsockopt_int(raw, SOL_NETLINK, NETLINK_LISTEN_ALL_NSID, 1)?;
        }

        socket.set_non_blocking(true)?;
        let fd = AsyncFd::new(socket)?;

        debug!(?protocol, port_id, groups = config.groups, "netlink socket open");

        Ok(Self {
            fd: Some(fd),
            port_id,
            protocol,
        })
    }

    fn async_fd(&self) -> Result<&AsyncFd<Socket>> {
        self.fd.as_ref().ok_or(Error::Closed)
    }

    /// Get the local port ID.
    pub fn port_id(&self) -> u32 {
        self.port_id
    }

    /// Get the protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.fd.is_none()
    }

    /// Close the descriptor. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.fd.take().is_some() {
            debug!(port_id = self.port_id, "netlink socket closed");
        }
    }

    /// Subscribe to multicast groups.
    pub fn add_membership(&mut self, group: u32) -> Result<()> {
        let fd = self.fd.as_mut().ok_or(Error::Closed)?;
        fd.get_mut().add_membership(group)?;
        Ok(())
    }

    /// Unsubscribe from multicast groups.
    pub fn drop_membership(&mut self, group: u32) -> Result<()> {
        let fd = self.fd.as_mut().ok_or(Error::Closed)?;
        fd.get_mut().drop_membership(group)?;
        Ok(())
    }

    /// Send a single message.
    pub async fn send(&self, msg: &[u8]) -> Result<()> {
        self.send_iov(&[msg]).await
    }

    /// Send segments as one datagram.
    pub async fn send_iov(&self, segments: &[&[u8]]) -> Result<()> {
        let fd = self.async_fd()?;
        loop {
            let mut guard = fd.ready(Interest::WRITABLE).await?;

            match guard.try_io(|inner| sys::send_segments(inner.get_ref().as_raw_fd(), segments)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive one datagram sized to fit.
    pub async fn recv_datagram(&self) -> Result<Datagram> {
        let fd = self.async_fd()?;
        loop {
            let mut guard = fd.ready(Interest::READABLE).await?;

            match guard.try_io(|inner| sys::recv_datagram(inner.get_ref().as_raw_fd())) {
                Ok(result) => {
                    let datagram = result?;
                    if datagram.data.is_empty() {
                        return Err(Error::Eof);
                    }
                    return Ok(datagram);
                }
                Err(_would_block) => continue,
            }
        }
    }
}

impl Transport for NetlinkSocket {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn port_id(&self) -> u32 {
        self.port_id
    }

    async fn send_segments(&self, segments: &[&[u8]]) -> Result<()> {
        self.send_iov(segments).await
    }

    async fn recv(&self) -> Result<Datagram> {
        self.recv_datagram().await
    }

    fn peek_pending(&self) -> Result<Option<Bytes>> {
        let fd = self.async_fd()?;
        match sys::peek(fd.get_ref().as_raw_fd()) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        NetlinkSocket::close(self);
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_ref().map_or(-1, |fd| fd.get_ref().as_raw_fd())
    }
}

fn setsockopt_int(fd: RawFd, level: libc::c_int, name: libc::c_int, value: usize) -> Result<()> {
    let value = libc::c_int::try_from(value)
        .map_err(|_| Error::Io(io::Error::from(io::ErrorKind::InvalidInput)))?;
    // SAFETY: value outlives the call and the length matches its type.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            (&value as *const libc::c_int).cast(),
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

/// Raw syscalls. Every function retries on EINTR and hands EAGAIN back as
/// `WouldBlock` so `AsyncFd::try_io` can clear readiness.
mod sys {
    use super::*;

    fn retry<F: FnMut() -> isize>(mut f: F) -> io::Result<usize> {
        loop {
            let n = f();
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Size of the next queued datagram.
    fn pending_len(fd: RawFd, flags: libc::c_int) -> io::Result<usize> {
        // SAFETY: a zero-length read never touches the buffer.
        retry(|| unsafe {
            libc::recv(fd, std::ptr::null_mut(), 0, flags | libc::MSG_PEEK | libc::MSG_TRUNC)
        })
    }

    pub(super) fn send_segments(fd: RawFd, segments: &[&[u8]]) -> io::Result<()> {
        // SAFETY: sockaddr_nl is plain data.
        let mut kernel: libc::sockaddr_nl = unsafe { mem::zeroed() };
        kernel.nl_family = libc::AF_NETLINK as libc::sa_family_t;

        let mut iov: Vec<libc::iovec> = segments
            .iter()
            .map(|s| libc::iovec {
                iov_base: s.as_ptr() as *mut libc::c_void,
                iov_len: s.len(),
            })
            .collect();

        // SAFETY: msghdr is plain data; every pointer set below outlives the call.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = (&mut kernel as *mut libc::sockaddr_nl).cast();
        msg.msg_namelen = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
        msg.msg_iov = iov.as_mut_ptr();
        msg.msg_iovlen = iov.len() as _;

        // SAFETY: msg points at live iovecs and address.
        retry(|| unsafe { libc::sendmsg(fd, &msg, 0) })?;
        Ok(())
    }

    pub(super) fn recv_datagram(fd: RawFd) -> io::Result<Datagram> {
        let len = pending_len(fd, 0)?;
        let mut buf = BytesMut::zeroed(len);

        // SAFETY: sockaddr_nl is plain data.
        let mut sender: libc::sockaddr_nl = unsafe { mem::zeroed() };
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        let mut control = [0u64; 8];

        // SAFETY: msghdr is plain data; every pointer set below outlives the call.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = (&mut sender as *mut libc::sockaddr_nl).cast();
        msg.msg_namelen = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = mem::size_of_val(&control) as _;

        // SAFETY: msg points at live buffers of the declared sizes.
        let n = retry(|| unsafe { libc::recvmsg(fd, &mut msg, 0) })?;
        buf.truncate(n);

        Ok(Datagram {
            data: buf.freeze(),
            sender: sender.nl_pid,
            truncated: msg.msg_flags & libc::MSG_TRUNC != 0,
            nsid: nsid_from_control(&msg),
        })
    }

    fn nsid_from_control(msg: &libc::msghdr) -> Option<i32> {
        let mut nsid = None;
        // SAFETY: msg was filled by recvmsg; the CMSG macros stay within
        // msg_controllen.
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(msg);
            while !cmsg.is_null() {
                let hdr = &*cmsg;
                if hdr.cmsg_level == SOL_NETLINK
                    && hdr.cmsg_type == NETLINK_LISTEN_ALL_NSID
                    && hdr.cmsg_len as usize >= libc::CMSG_LEN(mem::size_of::<i32>() as u32) as usize
                {
                    nsid = Some(std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const i32));
                }
                cmsg = libc::CMSG_NXTHDR(msg, cmsg);
            }
        }
        nsid
    }

    pub(super) fn peek(fd: RawFd) -> io::Result<Bytes> {
        let len = pending_len(fd, libc::MSG_DONTWAIT)?;
        let mut buf = BytesMut::zeroed(len);
        // SAFETY: buf is len bytes long.
        let n = retry(|| unsafe {
            libc::recv(
                fd,
                buf.as_mut_ptr().cast(),
                buf.len(),
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        })?;
        buf.truncate(n);
        Ok(buf.freeze())
    }
}

/// Multicast groups for NETLINK_ROUTE.
pub mod rtnetlink_groups {
    pub const RTNLGRP_LINK: u32 = 1;
    pub const RTNLGRP_NOTIFY: u32 = 2;
    pub const RTNLGRP_NEIGH: u32 = 3;
    pub const RTNLGRP_TC: u32 = 4;
    pub const RTNLGRP_IPV4_IFADDR: u32 = 5;
    pub const RTNLGRP_IPV4_MROUTE: u32 = 6;
    pub const RTNLGRP_IPV4_ROUTE: u32 = 7;
    pub const RTNLGRP_IPV4_RULE: u32 = 8;
    pub const RTNLGRP_IPV6_IFADDR: u32 = 9;
    pub const RTNLGRP_IPV6_MROUTE: u32 = 10;
    pub const RTNLGRP_IPV6_ROUTE: u32 = 11;
    pub const RTNLGRP_IPV6_IFINFO: u32 = 12;
    pub const RTNLGRP_IPV6_PREFIX: u32 = 18;
    pub const RTNLGRP_IPV6_RULE: u32 = 19;
    pub const RTNLGRP_NSID: u32 = 28;

    /// Legacy bind-time bitmask bit for a group id (groups 1..=32).
    pub const fn nl_mgrp(group: u32) -> u32 {
        if group == 0 || group > 32 {
            0
        } else {
            1 << (group - 1)
        }
    }
}
