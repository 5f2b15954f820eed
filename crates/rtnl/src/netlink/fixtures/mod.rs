//! Netlink message fixtures for testing.
//!
//! Canned kernel messages and a scripted [`MockKernel`] transport, so the
//! engines can be exercised without a netlink socket.
//!
//! The fixtures are provided as functions that return `Vec<u8>` so each test
//! owns (and may corrupt) its own copy.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::error::{Error, Result};
use super::extack::NLMSGERR_ATTR_MSG;
use super::message::{
    MessageIter, NLM_F_ACK_TLVS, NLM_F_CAPPED, NLM_F_MULTI, NLM_F_REQUEST, NLMSG_HDRLEN,
    NlMsgHdr, NlMsgType, nlmsg_align,
};
use super::socket::Protocol;
use super::transport::{Datagram, Transport};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Datagram> + Send>;

enum Queued {
    Datagram(Datagram),
    Errno(i32),
}

/// A scripted kernel.
///
/// Every send is recorded; if a responder is installed it sees the bytes of
/// the send and returns the datagrams to queue for receiving. An empty queue
/// reads as EOF unless the kernel is [stalled](MockKernel::stalled).
pub struct MockKernel {
    port: u32,
    protocol: Protocol,
    queue: Mutex<VecDeque<Queued>>,
    responder: Mutex<Option<Responder>>,
    sent: Mutex<Vec<Vec<u8>>>,
    stalled: bool,
    closed: bool,
}

impl MockKernel {
    /// A route-protocol kernel that bound us to `port`.
    pub fn new(port: u32) -> Self {
        Self {
            port,
            protocol: Protocol::Route,
            queue: Mutex::new(VecDeque::new()),
            responder: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            stalled: false,
            closed: false,
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Answer every send with the datagrams `responder` returns.
    pub fn respond_with(
        self,
        responder: impl FnMut(&[u8]) -> Vec<Datagram> + Send + 'static,
    ) -> Self {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
        self
    }

    /// Never answer once the queue runs dry.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Queue a datagram.
    pub fn push(&self, datagram: Datagram) {
        self.queue.lock().unwrap().push_back(Queued::Datagram(datagram));
    }

    /// Queue a receive failure.
    pub fn push_errno(&self, errno: i32) {
        self.queue.lock().unwrap().push_back(Queued::Errno(errno));
    }

    /// Every send so far, segments joined.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Whether every queued datagram has been received.
    pub fn is_drained(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for MockKernel {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn port_id(&self) -> u32 {
        self.port
    }

    async fn send_segments(&self, segments: &[&[u8]]) -> Result<()> {
        let request = segments.concat();
        if let Some(responder) = self.responder.lock().unwrap().as_mut() {
            let replies = responder(&request);
            let mut queue = self.queue.lock().unwrap();
            queue.extend(replies.into_iter().map(Queued::Datagram));
        }
        self.sent.lock().unwrap().push(request);
        Ok(())
    }

    async fn recv(&self) -> Result<Datagram> {
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(Queued::Datagram(datagram)) => Ok(datagram),
            Some(Queued::Errno(errno)) => Err(Error::Io(io::Error::from_raw_os_error(errno))),
            None if self.stalled => std::future::pending().await,
            None => Err(Error::Eof),
        }
    }

    fn peek_pending(&self) -> Result<Option<Bytes>> {
        Ok(match self.queue.lock().unwrap().front() {
            Some(Queued::Datagram(datagram)) => Some(datagram.data.clone()),
            _ => None,
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// A cloneable in-memory writer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A message with an arbitrary payload, padded to the message alignment.
pub fn message(msg_type: u16, flags: u16, seq: u32, pid: u32, payload: &[u8]) -> Vec<u8> {
    let header = NlMsgHdr {
        nlmsg_len: (NLMSG_HDRLEN + payload.len()) as u32,
        nlmsg_type: msg_type,
        nlmsg_flags: flags,
        nlmsg_seq: seq,
        nlmsg_pid: pid,
    };
    let mut data = header.as_bytes().to_vec();
    data.extend_from_slice(payload);
    data.resize(nlmsg_align(data.len()), 0);
    data
}

/// Join messages into one datagram.
pub fn concat(messages: &[Vec<u8>]) -> Vec<u8> {
    messages.concat()
}

/// Header of the request the kernel echoes back in an ERROR message.
fn echoed_request(seq: u32, pid: u32) -> NlMsgHdr {
    NlMsgHdr {
        nlmsg_len: NLMSG_HDRLEN as u32,
        nlmsg_type: NlMsgType::RTM_NEWLINK,
        nlmsg_flags: NLM_F_REQUEST,
        nlmsg_seq: seq,
        nlmsg_pid: pid,
    }
}

/// An ERROR message carrying `code` (0 is an ACK).
pub fn error(seq: u32, pid: u32, code: i32) -> Vec<u8> {
    let mut payload = code.to_ne_bytes().to_vec();
    payload.extend_from_slice(echoed_request(seq, pid).as_bytes());
    message(NlMsgType::ERROR, 0, seq, pid, &payload)
}

pub fn ack(seq: u32, pid: u32) -> Vec<u8> {
    error(seq, pid, 0)
}

/// An ERROR message with an NLMSGERR_ATTR_MSG diagnostic and a capped echo.
pub fn error_with_ext_ack(seq: u32, pid: u32, code: i32, text: &str) -> Vec<u8> {
    let mut payload = code.to_ne_bytes().to_vec();
    payload.extend_from_slice(echoed_request(seq, pid).as_bytes());
    payload.extend_from_slice(&attr(NLMSGERR_ATTR_MSG, &nul_terminated(text)));
    message(NlMsgType::ERROR, NLM_F_CAPPED | NLM_F_ACK_TLVS, seq, pid, &payload)
}

/// The DONE message closing a dump.
pub fn done(seq: u32, pid: u32, code: i32) -> Vec<u8> {
    message(NlMsgType::DONE, NLM_F_MULTI, seq, pid, &code.to_ne_bytes())
}

/// DONE with an NLMSGERR_ATTR_MSG diagnostic after the code.
pub fn done_with_ext_ack(seq: u32, pid: u32, code: i32, text: &str) -> Vec<u8> {
    let mut payload = code.to_ne_bytes().to_vec();
    payload.extend_from_slice(&attr(NLMSGERR_ATTR_MSG, &nul_terminated(text)));
    message(NlMsgType::DONE, NLM_F_MULTI | NLM_F_ACK_TLVS, seq, pid, &payload)
}

/// A dump part: RTM_NEWLINK with an ifinfomsg and IFLA_IFNAME.
pub fn newlink(seq: u32, pid: u32, index: u32, name: &str) -> Vec<u8> {
    let mut payload = vec![0u8; 16];
    payload[4..8].copy_from_slice(&index.to_ne_bytes());
    payload.extend_from_slice(&attr(3, &nul_terminated(name)));
    message(NlMsgType::RTM_NEWLINK, NLM_F_MULTI, seq, pid, &payload)
}

/// Sequence number of the first message in a request.
pub fn request_seq(request: &[u8]) -> u32 {
    NlMsgHdr::from_bytes(request).unwrap().nlmsg_seq
}

/// Sequence numbers of every message in a batched request.
pub fn request_seqs(request: &[u8]) -> Vec<u32> {
    MessageIter::new(request)
        .map(|frame| frame.unwrap().header.nlmsg_seq)
        .collect()
}

fn attr(attr_type: u16, payload: &[u8]) -> Vec<u8> {
    let len = 4 + payload.len();
    let mut data = Vec::with_capacity(nlmsg_align(len));
    data.extend_from_slice(&(len as u16).to_ne_bytes());
    data.extend_from_slice(&attr_type.to_ne_bytes());
    data.extend_from_slice(payload);
    data.resize(nlmsg_align(len), 0);
    data
}

fn nul_terminated(text: &str) -> Vec<u8> {
    let mut data = text.as_bytes().to_vec();
    data.push(0);
    data
}

/// Link message payload for the loopback interface.
/// Captured from: ip link show lo
pub fn link_loopback() -> Vec<u8> {
    vec![
        // ifinfomsg: family=0, pad=0, type=772 (ARPHRD_LOOPBACK), index=1, flags=0x49 (UP|LOOPBACK|RUNNING), change=0
        0x00, 0x00, // family, pad
        0x04, 0x03, // type = 772 (ARPHRD_LOOPBACK)
        0x01, 0x00, 0x00, 0x00, // index = 1
        0x49, 0x00, 0x00, 0x00, // flags = IFF_UP | IFF_LOOPBACK | IFF_RUNNING
        0x00, 0x00, 0x00, 0x00, // change = 0
        // IFLA_IFNAME = "lo"
        0x07, 0x00, // len = 7
        0x03, 0x00, // type = IFLA_IFNAME (3)
        b'l', b'o', 0x00, 0x00, // "lo\0" + padding
        // IFLA_MTU = 65536
        0x08, 0x00, // len = 8
        0x04, 0x00, // type = IFLA_MTU (4)
        0x00, 0x00, 0x01, 0x00, // mtu = 65536
        // IFLA_TXQLEN = 1000
        0x08, 0x00, // len = 8
        0x0d, 0x00, // type = IFLA_TXQLEN (13)
        0xe8, 0x03, 0x00, 0x00, // txqlen = 1000
        // IFLA_OPERSTATE = 0 (UNKNOWN)
        0x05, 0x00, // len = 5
        0x10, 0x00, // type = IFLA_OPERSTATE (16)
        0x00, 0x00, 0x00, 0x00, // operstate = 0 + padding
    ]
}

/// Link message payload for one end of a veth pair.
/// Captured from: ip link show veth0
pub fn link_veth() -> Vec<u8> {
    vec![
        // ifinfomsg: family=0, type=1 (ARPHRD_ETHER), index=6, flags=0x11043 (UP|BROADCAST|RUNNING|MULTICAST|LOWER_UP)
        0x00, 0x00, // family, pad
        0x01, 0x00, // type = 1 (ARPHRD_ETHER)
        0x06, 0x00, 0x00, 0x00, // index = 6
        0x43, 0x10, 0x01, 0x00, // flags = 0x11043
        0x00, 0x00, 0x00, 0x00, // change = 0
        // IFLA_IFNAME = "veth0"
        0x0a, 0x00, // len = 10
        0x03, 0x00, // type = IFLA_IFNAME (3)
        b'v', b'e', b't', b'h', b'0', 0x00, 0x00, 0x00, // "veth0\0" + padding
        // IFLA_LINK = 5 (peer)
        0x08, 0x00, // len = 8
        0x05, 0x00, // type = IFLA_LINK (5)
        0x05, 0x00, 0x00, 0x00, // link = 5
        // IFLA_OPERSTATE = 6 (UP)
        0x05, 0x00, // len = 5
        0x10, 0x00, // type = IFLA_OPERSTATE (16)
        0x06, 0x00, 0x00, 0x00, // operstate = 6 + padding
        // IFLA_LINKINFO { IFLA_INFO_KIND = "veth" }
        0x10, 0x00, // len = 16
        0x12, 0x00, // type = IFLA_LINKINFO (18)
        0x09, 0x00, // len = 9
        0x01, 0x00, // type = IFLA_INFO_KIND (1)
        b'v', b'e', b't', b'h', 0x00, 0x00, 0x00, 0x00, // "veth\0" + padding
    ]
}

/// Generic netlink reply to CTRL_CMD_GETFAMILY for "nlctrl".
/// Captured from: genl ctrl get name nlctrl
pub fn genl_family_nlctrl() -> Vec<u8> {
    vec![
        // genlmsghdr: cmd=1 (CTRL_CMD_NEWFAMILY), version=2, reserved=0
        0x01, 0x02, 0x00, 0x00,
        // CTRL_ATTR_FAMILY_NAME = "nlctrl"
        0x0b, 0x00, // len = 11
        0x02, 0x00, // type = CTRL_ATTR_FAMILY_NAME (2)
        b'n', b'l', b'c', b't', b'r', b'l', 0x00, 0x00, // "nlctrl\0" + padding
        // CTRL_ATTR_FAMILY_ID = 0x10
        0x06, 0x00, // len = 6
        0x01, 0x00, // type = CTRL_ATTR_FAMILY_ID (1)
        0x10, 0x00, 0x00, 0x00, // id = 16 + padding
        // CTRL_ATTR_VERSION = 2
        0x08, 0x00, // len = 8
        0x03, 0x00, // type = CTRL_ATTR_VERSION (3)
        0x02, 0x00, 0x00, 0x00, // version = 2
        // CTRL_ATTR_HDRSIZE = 0
        0x08, 0x00, // len = 8
        0x04, 0x00, // type = CTRL_ATTR_HDRSIZE (4)
        0x00, 0x00, 0x00, 0x00, // hdrsize = 0
        // CTRL_ATTR_MAXATTR = 10
        0x08, 0x00, // len = 8
        0x05, 0x00, // type = CTRL_ATTR_MAXATTR (5)
        0x0a, 0x00, 0x00, 0x00, // maxattr = 10
        // CTRL_ATTR_MCAST_GROUPS { 1: { ID = 16, NAME = "notify" } }
        0x1c, 0x00, // len = 28
        0x07, 0x80, // type = CTRL_ATTR_MCAST_GROUPS (7) | NLA_F_NESTED
        0x18, 0x00, // len = 24
        0x01, 0x80, // type = 1 | NLA_F_NESTED
        0x08, 0x00, // len = 8
        0x02, 0x00, // type = CTRL_ATTR_MCAST_GRP_ID (2)
        0x10, 0x00, 0x00, 0x00, // id = 16
        0x0b, 0x00, // len = 11
        0x01, 0x00, // type = CTRL_ATTR_MCAST_GRP_NAME (1)
        b'n', b'o', b't', b'i', b'f', b'y', 0x00, 0x00, // "notify\0" + padding
    ]
}
