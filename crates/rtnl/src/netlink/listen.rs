//! Listener engine for multicast notifications.

use tracing::warn;

use super::connection::Connection;
use super::dump::Message;
use super::error::{Error, Result};
use super::message::{MessageIter, NlMsgHdr};
use super::transport::Transport;

/// Per-datagram metadata handed to a listen handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenContext {
    /// Originating namespace id, -1 when unknown.
    pub nsid: i32,
}

impl Default for ListenContext {
    fn default() -> Self {
        Self { nsid: -1 }
    }
}

impl<T: Transport> Connection<T> {
    /// Receive notifications until the handler fails or the socket does.
    ///
    /// Overruns (`ENOBUFS`) mean notifications were dropped; they are logged
    /// and listening continues. EOF and every other error end the loop.
    pub async fn listen<F>(&self, mut handler: F) -> Result<()>
    where
        F: FnMut(&ListenContext, &Message<'_>) -> Result<()> + Send,
    {
        loop {
            let datagram = match self.recv().await {
                Ok(datagram) => datagram,
                Err(Error::Io(e)) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    warn!("netlink receive overrun, notifications lost");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let ctx = ListenContext {
                nsid: datagram.nsid.unwrap_or(-1),
            };

            let mut iter = MessageIter::new(&datagram.data);
            while let Some(frame) = iter.next() {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(Error::Framing(_)) if datagram.truncated => {
                        let rest = &datagram.data[datagram.data.len() - iter.remnant()..];
                        let declared = NlMsgHdr::from_bytes(rest).map_or(0, |h| h.nlmsg_len);
                        return Err(Error::Truncated {
                            expected: declared as usize,
                            actual: rest.len(),
                        });
                    }
                    Err(e) => return Err(e),
                };
                let msg = Message {
                    sender: datagram.sender,
                    header: frame.header,
                    payload: frame.payload,
                    bytes: frame.bytes,
                };
                handler(&ctx, &msg)?;
            }

            if datagram.truncated {
                warn!(bytes = datagram.data.len(), "message truncated");
                continue;
            }
            if iter.remnant() != 0 {
                return Err(Error::Framing(format!("remnant of size {}", iter.remnant())));
            }
        }
    }
}
