//! Synchronous request/reply engine.
//!
//! A batch of requests is stamped with consecutive sequence numbers and sent
//! as one datagram. Replies are matched on sender, port and a sequence window
//! covering the batch; anything else on the socket is skipped.

use bytes::Bytes;
use tracing::{debug, error, warn};

use super::builder::MessageBuilder;
use super::connection::Connection;
use super::error::{Error, Result};
use super::extack::{ExtAck, ExtAckHandler};
use super::message::{MessageIter, NLM_F_ACK, NlMsgError, NlMsgHdr, NlMsgType};
use super::socket::Protocol;
use super::transport::Transport;

struct TalkOptions<'h> {
    want_answer: bool,
    suppress: bool,
    handler: &'h dyn ExtAckHandler,
}

/// Whether `msg_seq` falls in the `batch` sequence numbers ending at `last`.
fn in_window(last: u32, batch: u32, msg_seq: u32) -> bool {
    last.wrapping_sub(msg_seq) < batch
}

impl<T: Transport> Connection<T> {
    /// Send a request and wait for the kernel's ACK.
    pub async fn talk(&self, msg: MessageBuilder) -> Result<()> {
        let opts = TalkOptions {
            want_answer: false,
            suppress: self.errors_suppressed(),
            handler: self.ext_ack_handler(),
        };
        self.talk_inner(&mut [msg], &opts).await.map(drop)
    }

    /// Send a request and return the first reply verbatim.
    ///
    /// The reply is a slice of the received datagram, header included.
    pub async fn talk_answer(&self, msg: MessageBuilder) -> Result<Bytes> {
        let opts = TalkOptions {
            want_answer: true,
            suppress: self.errors_suppressed(),
            handler: self.ext_ack_handler(),
        };
        self.talk_inner(&mut [msg], &opts)
            .await?
            .ok_or_else(|| Error::InvalidMessage("no reply".into()))
    }

    /// Send several requests in one datagram and wait until the last one is
    /// acknowledged. The first kernel error ends the batch.
    pub async fn talk_batch(&self, mut msgs: Vec<MessageBuilder>) -> Result<()> {
        let opts = TalkOptions {
            want_answer: false,
            suppress: self.errors_suppressed(),
            handler: self.ext_ack_handler(),
        };
        self.talk_inner(&mut msgs, &opts).await.map(drop)
    }

    /// Like [`talk`](Self::talk), reporting extended acks through `handler`
    /// instead of the connection's reporter.
    pub async fn talk_extack(&self, msg: MessageBuilder, handler: &dyn ExtAckHandler) -> Result<()> {
        let opts = TalkOptions {
            want_answer: false,
            suppress: self.errors_suppressed(),
            handler,
        };
        self.talk_inner(&mut [msg], &opts).await.map(drop)
    }

    /// Like [`talk`](Self::talk) without logging a kernel error.
    pub async fn talk_suppressed(&self, msg: MessageBuilder) -> Result<()> {
        let opts = TalkOptions {
            want_answer: false,
            suppress: true,
            handler: self.ext_ack_handler(),
        };
        self.talk_inner(&mut [msg], &opts).await.map(drop)
    }

    /// Send a prebuilt message without waiting for anything.
    pub async fn send(&self, msg: &[u8]) -> Result<()> {
        self.send_segments(&[msg]).await
    }

    /// Send, then check (without blocking or consuming) whether the kernel
    /// already queued an error for it.
    pub async fn send_check(&self, msg: &[u8]) -> Result<()> {
        self.send(msg).await?;

        let Some(pending) = self.transport().peek_pending()? else {
            return Ok(());
        };
        for frame in MessageIter::new(&pending) {
            let Ok(frame) = frame else { break };
            if frame.header.nlmsg_type != NlMsgType::ERROR {
                continue;
            }
            let err = NlMsgError::from_bytes(frame.payload).map_err(|_| {
                error!("ERROR truncated");
                Error::Truncated {
                    expected: NlMsgError::SIZE,
                    actual: frame.payload.len(),
                }
            })?;
            if err.is_ack() {
                return Ok(());
            }
            return Err(Error::from_errno(err.error));
        }
        Ok(())
    }

    async fn talk_inner(
        &self,
        msgs: &mut [MessageBuilder],
        opts: &TalkOptions<'_>,
    ) -> Result<Option<Bytes>> {
        if msgs.is_empty() {
            return Err(Error::InvalidMessage("empty request batch".into()));
        }

        let mut seq = 0;
        for msg in msgs.iter_mut() {
            seq = self.next_seq();
            msg.set_seq(seq);
            if !opts.want_answer {
                let flags = msg.header().nlmsg_flags;
                msg.set_flags(flags | NLM_F_ACK);
            }
        }
        let batch = msgs.len() as u32;

        let segments: Vec<&[u8]> = msgs.iter().map(|m| m.as_bytes()).collect();
        self.send_segments(&segments).await?;

        let port = self.port_id();
        loop {
            let datagram = self.recv().await?;
            if datagram.truncated {
                warn!(bytes = datagram.data.len(), "message truncated");
                continue;
            }

            let mut iter = MessageIter::new(&datagram.data);
            for frame in iter.by_ref() {
                let frame = frame?;
                let header = frame.header;

                if datagram.sender != 0
                    || header.nlmsg_pid != port
                    || !in_window(seq, batch, header.nlmsg_seq)
                {
                    debug!(
                        sender = datagram.sender,
                        pid = header.nlmsg_pid,
                        seq = header.nlmsg_seq,
                        expected = seq,
                        "skipping unrelated message"
                    );
                    continue;
                }

                let answer = || datagram.data.slice(frame.offset..frame.offset + frame.bytes.len());

                if header.is_error() {
                    let err = NlMsgError::from_bytes(frame.payload).map_err(|_| {
                        error!("ERROR truncated");
                        Error::Truncated {
                            expected: NlMsgError::SIZE,
                            actual: frame.payload.len(),
                        }
                    })?;
                    let ack = ExtAck::from_error(&header, frame.payload).unwrap_or(ExtAck {
                        error: err.error,
                        ..Default::default()
                    });

                    if err.is_ack() {
                        opts.handler.report(&ack);
                        if opts.want_answer {
                            return Ok(Some(answer()));
                        }
                        if header.nlmsg_seq == seq {
                            return Ok(None);
                        }
                        continue;
                    }

                    self.report_kernel_error(&header, &ack, opts);
                    return Err(Error::from_errno_with_ext_ack(err.error, ack.message));
                }

                if opts.want_answer {
                    return Ok(Some(answer()));
                }

                warn!(
                    msg_type = header.nlmsg_type,
                    seq = header.nlmsg_seq,
                    "unexpected reply"
                );
            }

            if iter.remnant() != 0 {
                return Err(Error::Framing(format!("remnant of size {}", iter.remnant())));
            }
        }
    }

    fn report_kernel_error(&self, header: &NlMsgHdr, ack: &ExtAck, opts: &TalkOptions<'_>) {
        if opts.suppress || self.protocol() == Protocol::SockDiag {
            return;
        }
        if opts.handler.report(ack) {
            return;
        }
        error!(
            errno = -ack.error,
            seq = header.nlmsg_seq,
            "RTNETLINK answers: {}",
            std::io::Error::from_raw_os_error(ack.error.saturating_abs())
        );
    }
}
