//! Netlink transport, conversation engines and attribute codec.
//!
//! - [`message`], [`attr`] and [`builder`] encode and decode messages and
//!   their type-length-value attributes.
//! - [`NetlinkSocket`] is the kernel endpoint behind the [`Transport`] seam.
//! - [`Connection`] drives the request/reply (`talk*`), dump (`dump_*`) and
//!   listen engines over a transport.

pub mod attr;
pub mod builder;
pub mod capture;
pub mod config;
pub mod connection;
pub mod dump;
mod error;
pub mod extack;
pub mod filter;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod genl;
pub mod listen;
pub mod message;
mod socket;
mod talk;
pub mod transport;
pub mod types;

pub use attr::{Attr, AttrIter, AttrTable, NlAttr, find_one};
pub use builder::{AttrBuf, CompatNestToken, MessageBuilder, NestToken};
pub use config::Config;
pub use connection::Connection;
pub use dump::{DumpFilter, Message};
pub use error::{Error, Result};
pub use extack::{ExtAck, ExtAckHandler, LogExtAck};
pub use listen::ListenContext;
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use socket::{NetlinkSocket, Protocol, rtnetlink_groups};
pub use transport::{Datagram, Transport};
