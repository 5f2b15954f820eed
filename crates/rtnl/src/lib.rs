//! Async netlink transport and attribute codec for Linux network configuration.
//!
//! This crate implements the message layer that `ip`-style tools are built
//! on: framing, sequence correlation for requests and multi-part dumps,
//! extended-ack error reporting, and the nested attribute encoder/decoder.
//!
//! # Features
//!
//! - `serde` - `Serialize` for typed views such as [`LinkMessage`](netlink::types::link::LinkMessage)
//! - `integration` - tests against the running kernel (need privileges)
//!
//! # Example
//!
//! ```ignore
//! use rtnl::netlink::{Connection, Protocol};
//!
//! #[tokio::main]
//! async fn main() -> rtnl::Result<()> {
//!     let conn = Connection::new(Protocol::Route)?;
//!
//!     let links = conn.get_links().await?;
//!     for link in links {
//!         println!("{}: {}", link.index, link.name.unwrap_or_default());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Monitoring
//!
//! ```ignore
//! use rtnl::netlink::{Config, Connection, Protocol, rtnetlink_groups::*};
//!
//! let config = Config::default().membership(RTNLGRP_LINK);
//! let conn = Connection::with_config(Protocol::Route, config)?;
//! conn.listen(|ctx, msg| {
//!     println!("nsid {} type {}", ctx.nsid, msg.msg_type());
//!     Ok(())
//! })
//! .await?;
//! ```

pub mod netlink;

// Re-export common types at crate root for convenience
pub use netlink::{Connection, Error, Protocol, Result};
