//! Offline replay of captured dumps.
//!
//! A capture is the raw byte stream of dump datagrams, as teed by
//! [`Connection::set_capture`](super::connection::Connection::set_capture):
//! netlink messages back to back, each padded to the message alignment.
//! Replay walks that stream and hands every message to a handler, the way a
//! live dump would.

use std::io::Read;

use tracing::debug;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;

use super::dump::Message;
use super::error::{Error, Result};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Largest message a capture may contain.
pub const MAX_RECORD_LEN: usize = 16384;

/// Result type for winnow parsers.
type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

fn parse_u32_ne(input: &mut &[u8]) -> PResult<u32> {
    let bytes: &[u8] = take(4usize).parse_next(input)?;
    bytes
        .try_into()
        .map(u32::from_ne_bytes)
        .map_err(|_| ErrMode::Cut(ContextError::new()))
}

/// One padded message; returns the message without its padding.
fn parse_record<'a>(input: &mut &'a [u8]) -> PResult<&'a [u8]> {
    let len = parse_u32_ne(&mut &input[..]).map(|l| l as usize)?;
    if !(NLMSG_HDRLEN..=MAX_RECORD_LEN).contains(&len) {
        return Err(ErrMode::Cut(ContextError::new()));
    }
    let record: &[u8] = take(len).parse_next(input)?;
    let _: &[u8] = take(nlmsg_align(len) - len).parse_next(input)?;
    Ok(record)
}

/// Describe why the record at `rest` could not be read.
fn record_error(rest: &[u8], offset: usize) -> Error {
    if rest.len() < NLMSG_HDRLEN {
        return Error::Truncated {
            expected: NLMSG_HDRLEN,
            actual: rest.len(),
        };
    }
    let len = NlMsgHdr::from_bytes(rest).map_or(0, |h| h.nlmsg_len as usize);
    if !(NLMSG_HDRLEN..=MAX_RECORD_LEN).contains(&len) {
        return Error::Framing(format!("malformed message: len={} @{}", len, offset));
    }
    Error::Truncated {
        expected: nlmsg_align(len),
        actual: rest.len(),
    }
}

/// Replay every message in `data` through `handler`.
///
/// Returns the number of messages delivered. Stops at the first handler
/// error, malformed length or truncated record. Empty input is a clean end.
pub fn replay<F>(data: &[u8], mut handler: F) -> Result<usize>
where
    F: FnMut(&Message<'_>) -> Result<()>,
{
    let mut input = data;
    let mut count = 0;

    while !input.is_empty() {
        let offset = data.len() - input.len();
        let bytes = parse_record(&mut input).map_err(|_| record_error(&data[offset..], offset))?;
        let header = NlMsgHdr::from_bytes(bytes)?;
        let msg = Message {
            sender: 0,
            header,
            payload: &bytes[NLMSG_HDRLEN..],
            bytes,
        };
        handler(&msg)?;
        count += 1;
    }

    debug!(count, bytes = data.len(), "capture replayed");
    Ok(count)
}

/// Read a capture from `reader` and replay it.
pub fn replay_reader<R, F>(mut reader: R, handler: F) -> Result<usize>
where
    R: Read,
    F: FnMut(&Message<'_>) -> Result<()>,
{
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    replay(&data, handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::config::Config;
    use crate::netlink::connection::Connection;
    use crate::netlink::fixtures::{self, MockKernel};
    use crate::netlink::message::NlMsgType;
    use crate::netlink::transport::Datagram;
    use crate::netlink::types::link::LinkMessage;

    #[test]
    fn test_replay_messages() {
        let data = fixtures::concat(&[
            fixtures::newlink(1, 0, 1, "lo"),
            fixtures::newlink(1, 0, 2, "eth0"),
            fixtures::done(1, 0, 0),
        ]);

        let mut types = Vec::new();
        let count = replay(&data, |msg| {
            types.push(msg.msg_type());
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 3);
        assert_eq!(
            types,
            vec![NlMsgType::RTM_NEWLINK, NlMsgType::RTM_NEWLINK, NlMsgType::DONE]
        );
    }

    #[test]
    fn test_empty_capture() {
        assert_eq!(replay(&[], |_| Ok(())).unwrap(), 0);
    }

    #[test]
    fn test_truncated_header() {
        let mut data = fixtures::newlink(1, 0, 1, "lo");
        data.extend_from_slice(&[0; 10]);
        let err = replay(&data, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::Truncated { expected: 16, actual: 10 }));
    }

    #[test]
    fn test_truncated_payload() {
        let mut data = fixtures::newlink(1, 0, 1, "lo");
        data.truncate(data.len() - 4);
        let err = replay(&data, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn test_oversized_record_is_malformed() {
        let mut data = fixtures::message(NlMsgType::RTM_NEWLINK, 0, 1, 0, &[]);
        data[0..4].copy_from_slice(&(MAX_RECORD_LEN as u32 + 4).to_ne_bytes());
        data.resize(MAX_RECORD_LEN + 8, 0);
        let err = replay(&data, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }

    #[test]
    fn test_handler_error_stops_replay() {
        let data = fixtures::concat(&[
            fixtures::newlink(1, 0, 1, "lo"),
            fixtures::newlink(1, 0, 2, "eth0"),
        ]);
        let mut calls = 0;
        let err = replay(&data, |_| {
            calls += 1;
            Err(Error::InvalidMessage("stop".into()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_tee_then_replay() {
        let kernel = MockKernel::new(300).respond_with(|req| {
            let seq = fixtures::request_seq(req);
            vec![
                Datagram::from_kernel(fixtures::concat(&[
                    fixtures::newlink(seq, 300, 1, "lo"),
                    fixtures::newlink(seq, 300, 2, "eth0"),
                ])),
                Datagram::from_kernel(fixtures::done(seq, 300, 0)),
            ]
        });
        let mut conn = Connection::from_transport(kernel, Config::default());
        let sink = fixtures::SharedBuf::default();
        conn.set_capture(sink.clone());

        conn.dump_request(0, NlMsgType::RTM_GETLINK).await.unwrap();
        conn.dump_filter(|_| Ok(())).await.unwrap();

        let mut names = Vec::new();
        replay_reader(sink.contents().as_slice(), |msg| {
            if msg.msg_type() == NlMsgType::RTM_NEWLINK {
                names.push(LinkMessage::parse(msg.payload)?.name.unwrap_or_default());
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(names, vec!["lo", "eth0"]);
    }
}
