//! Dump engine: request and drain a multi-part "list all" response.
//!
//! The kernel may spread a dump over any number of datagrams. Messages are
//! matched on sender, port and the dump sequence number, handed to one or
//! more callbacks, and the pass ends at `NLMSG_DONE`.

use bytes::Bytes;
use tracing::{debug, error, warn};

use super::attr::AttrIter;
use super::builder::MessageBuilder;
use super::connection::Connection;
use super::error::{Error, Result};
use super::extack::ExtAck;
use super::message::{
    MessageIter, NLM_F_DUMP, NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgError, NlMsgHdr, nlmsg_align,
};
use super::socket::Protocol;
use super::transport::Transport;
use super::types::link::{IFLA_EXT_MASK, IfInfoMsg, IfStatsMsg, RTEXT_FILTER_VF};

/// Room left for caller attributes in [`Connection::dump_request_fn`].
const FILTER_ROOM: usize = 1024;

/// A message delivered to a dump or listen callback.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    /// Port id of the sender (0 for the kernel).
    pub sender: u32,
    /// Header, with the filter's clear-flags already removed.
    pub header: NlMsgHdr,
    /// Payload after the header.
    pub payload: &'a [u8],
    /// The whole message as received.
    pub bytes: &'a [u8],
}

impl<'a> Message<'a> {
    /// Message type.
    pub fn msg_type(&self) -> u16 {
        self.header.nlmsg_type
    }

    /// Attributes following a fixed family header of `hdr_len` bytes.
    pub fn attrs(&self, hdr_len: usize) -> AttrIter<'a> {
        AttrIter::new(self.payload.get(nlmsg_align(hdr_len)..).unwrap_or(&[]))
    }
}

/// Callback invoked for each dumped message. An error stops the dump and is
/// returned unchanged.
pub type DumpCallback<'f> = Box<dyn FnMut(&Message<'_>) -> Result<()> + Send + 'f>;

/// One consumer of a dump pass.
pub struct DumpFilter<'f> {
    callback: DumpCallback<'f>,
    clear_flags: u16,
}

impl<'f> DumpFilter<'f> {
    pub fn new(callback: impl FnMut(&Message<'_>) -> Result<()> + Send + 'f) -> Self {
        Self {
            callback: Box::new(callback),
            clear_flags: 0,
        }
    }

    /// Clear these header flags before the callback sees the message.
    pub fn clear_flags(mut self, flags: u16) -> Self {
        self.clear_flags = flags;
        self
    }
}

impl<T: Transport> Connection<T> {
    /// Request a dump of `msg_type` objects of `family`.
    pub async fn dump_request(&self, family: u8, msg_type: u16) -> Result<()> {
        let mut msg = MessageBuilder::new(msg_type, NLM_F_DUMP | NLM_F_REQUEST);
        msg.append_raw(&[family])?;
        self.send_dump(msg).await
    }

    /// Request a link-style wildcard dump carrying an `IFLA_EXT_MASK`
    /// (`RTEXT_FILTER_*`) filter.
    pub async fn dump_request_filter(
        &self,
        family: u8,
        msg_type: u16,
        ext_filter_mask: u32,
    ) -> Result<()> {
        let mut msg = MessageBuilder::new(msg_type, NLM_F_DUMP | NLM_F_REQUEST);
        msg.append_struct(&IfInfoMsg::new().with_family(family))?;
        msg.append_attr_u32(IFLA_EXT_MASK, ext_filter_mask)?;
        self.send_dump(msg).await
    }

    /// Request a wildcard dump with the default VF filter.
    pub async fn dump_request_all(&self, family: u8, msg_type: u16) -> Result<()> {
        self.dump_request_filter(family, msg_type, RTEXT_FILTER_VF)
            .await
    }

    /// Request a dump whose family header is `req`, sent as a second
    /// segment of the same datagram.
    pub async fn dump_request_with(&self, msg_type: u16, req: &[u8]) -> Result<()> {
        let mut hdr = NlMsgHdr::new(msg_type, NLM_F_DUMP | NLM_F_REQUEST);
        hdr.nlmsg_len = (NLMSG_HDRLEN + req.len()) as u32;
        hdr.nlmsg_seq = self.start_dump();
        self.send_segments(&[hdr.as_bytes(), req]).await
    }

    /// Send a caller-built dump request, stamping flags, port and sequence.
    pub async fn dump_request_msg(&self, mut msg: MessageBuilder) -> Result<()> {
        let flags = msg.header().nlmsg_flags;
        msg.set_flags(flags | NLM_F_DUMP | NLM_F_REQUEST);
        self.send_dump(msg).await
    }

    /// Request a wildcard dump and let `add_filter` append attributes to it.
    /// Nothing is sent if `add_filter` fails.
    pub async fn dump_request_fn<F>(&self, family: u8, msg_type: u16, add_filter: F) -> Result<()>
    where
        F: FnOnce(&mut MessageBuilder) -> Result<()>,
    {
        let capacity = NLMSG_HDRLEN + IfInfoMsg::SIZE + FILTER_ROOM;
        let mut msg =
            MessageBuilder::with_capacity(msg_type, NLM_F_DUMP | NLM_F_REQUEST, capacity);
        msg.append_struct(&IfInfoMsg::new().with_family(family))?;
        add_filter(&mut msg)?;
        self.send_dump(msg).await
    }

    /// Request a statistics dump (`if_stats_msg` with `filter_mask`).
    pub async fn dump_stats_request(&self, family: u8, msg_type: u16, filter_mask: u32) -> Result<()> {
        let mut msg = MessageBuilder::new(msg_type, NLM_F_DUMP | NLM_F_REQUEST);
        msg.append_struct(&IfStatsMsg::new(family, filter_mask))?;
        self.send_dump(msg).await
    }

    async fn send_dump(&self, mut msg: MessageBuilder) -> Result<()> {
        msg.set_pid(0);
        msg.set_seq(self.start_dump());
        self.send_segments(&[msg.as_bytes()]).await
    }

    /// Drain the outstanding dump into `callback`.
    pub async fn dump_filter<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&Message<'_>) -> Result<()> + Send,
    {
        self.dump_filter_list(&mut [DumpFilter::new(callback)])
            .await
    }

    /// Drain the outstanding dump, clearing `clear_flags` from each header
    /// before the callback sees it.
    pub async fn dump_filter_flags<F>(&self, callback: F, clear_flags: u16) -> Result<()>
    where
        F: FnMut(&Message<'_>) -> Result<()> + Send,
    {
        self.dump_filter_list(&mut [DumpFilter::new(callback).clear_flags(clear_flags)])
            .await
    }

    /// Drain the outstanding dump, handing every message to every filter.
    pub async fn dump_filter_list(&self, filters: &mut [DumpFilter<'_>]) -> Result<()> {
        let port = self.port_id();

        loop {
            let datagram = self.recv().await?;
            self.capture_datagram(&datagram.data)?;

            let dump_seq = self.dump_seq();
            let mut done = None;
            let mut interrupted = false;
            let mut remnant = 0;

            for filter in filters.iter_mut() {
                let mut iter = MessageIter::new(&datagram.data);
                for frame in iter.by_ref() {
                    let frame = match frame {
                        Ok(frame) => frame,
                        Err(_) if datagram.truncated => break,
                        Err(e) => return Err(e),
                    };

                    let mut header = frame.header;
                    header.nlmsg_flags &= !filter.clear_flags;

                    if datagram.sender != 0
                        || header.nlmsg_pid != port
                        || header.nlmsg_seq != dump_seq
                    {
                        debug!(
                            sender = datagram.sender,
                            pid = header.nlmsg_pid,
                            seq = header.nlmsg_seq,
                            dump_seq,
                            "skipping unrelated message"
                        );
                        continue;
                    }

                    if header.is_dump_interrupted() {
                        interrupted = true;
                    }

                    if header.is_done() {
                        // handled once below, not per filter
                        done.get_or_insert((frame.header, frame.payload));
                        break;
                    }

                    if header.is_error() {
                        return self.dump_error(&header, frame.payload);
                    }

                    let msg = Message {
                        sender: datagram.sender,
                        header,
                        payload: frame.payload,
                        bytes: frame.bytes,
                    };
                    (filter.callback)(&msg)?;
                }
                remnant = iter.remnant();
            }

            if let Some((header, payload)) = done {
                self.dump_done(&header, payload)?;
                if interrupted {
                    warn!("Dump was interrupted and may be inconsistent.");
                }
                return Ok(());
            }

            if datagram.truncated {
                warn!(bytes = datagram.data.len(), "message truncated");
                continue;
            }

            if remnant != 0 {
                return Err(Error::Framing(format!("remnant of size {}", remnant)));
            }
        }
    }

    /// Send `msg` as a dump and collect every reply message.
    pub async fn dump(&self, msg: MessageBuilder) -> Result<Vec<Bytes>> {
        self.dump_request_msg(msg).await?;
        let mut out = Vec::new();
        self.dump_filter(|m| {
            out.push(Bytes::copy_from_slice(m.bytes));
            Ok(())
        })
        .await?;
        Ok(out)
    }

    fn dump_done(&self, header: &NlMsgHdr, payload: &[u8]) -> Result<()> {
        let code = payload
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .map(i32::from_ne_bytes)
            .ok_or_else(|| {
                error!("DONE truncated");
                Error::Truncated {
                    expected: 4,
                    actual: payload.len(),
                }
            })?;

        let ack = ExtAck::from_done(header, payload);
        let reported = ack
            .as_ref()
            .is_some_and(|ack| self.ext_ack_handler().report(ack));

        if code >= 0 {
            return Ok(());
        }

        let errno = code.saturating_abs();
        if !reported && !self.errors_suppressed() {
            match errno {
                libc::ENOENT | libc::EOPNOTSUPP => {}
                libc::EMSGSIZE => error!("Error: Buffer too small for object."),
                _ => error!(
                    errno,
                    "RTNETLINK answers: {}",
                    std::io::Error::from_raw_os_error(errno)
                ),
            }
        }
        Err(Error::from_errno_with_ext_ack(code, ack.and_then(|a| a.message)))
    }

    fn dump_error(&self, header: &NlMsgHdr, payload: &[u8]) -> Result<()> {
        let err = NlMsgError::from_bytes(payload).map_err(|_| {
            error!("ERROR truncated");
            Error::Truncated {
                expected: NlMsgError::SIZE,
                actual: payload.len(),
            }
        })?;
        let errno = err.error.saturating_abs();

        if self.protocol() == Protocol::SockDiag
            && matches!(errno, libc::ENOENT | libc::EOPNOTSUPP)
        {
            debug!(errno, "no sockets to dump");
            return Ok(());
        }

        let ack = ExtAck::from_error(header, payload);
        if !self.errors_suppressed() {
            let reported = ack
                .as_ref()
                .is_some_and(|ack| self.ext_ack_handler().report(ack));
            if !reported {
                error!(
                    errno,
                    "RTNETLINK answers: {}",
                    std::io::Error::from_raw_os_error(errno)
                );
            }
        }
        Err(Error::from_errno_with_ext_ack(
            err.error,
            ack.and_then(|a| a.message),
        ))
    }
}
