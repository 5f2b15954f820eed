//! Object-selection criteria for listings.
//!
//! A [`Filter`] is plain query state built from user arguments and checked
//! against each dumped object. Unset criteria match everything.
//!
//! # Example
//!
//! ```ignore
//! use rtnl::netlink::filter::Filter;
//!
//! let filter = Filter::new().name("eth0").up(true);
//! let links = conn.get_links().await?;
//! for link in links.iter().filter(|l| filter.matches_link(l)) {
//!     println!("{}", link.name_or("?"));
//! }
//! ```

use std::net::IpAddr;

use super::types::link::LinkMessage;

/// Selection criteria for dumped objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    ifindex: Option<u32>,
    family: Option<u8>,
    prefix: Option<(IpAddr, u8)>,
    table: Option<u32>,
    state_mask: Option<u32>,
    protocol: Option<u8>,
    name: Option<String>,
    up: bool,
}

impl Filter {
    /// Create an empty filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only objects on this interface index.
    pub fn ifindex(mut self, ifindex: u32) -> Self {
        self.ifindex = Some(ifindex);
        self
    }

    /// Only objects of this address family (AF_*).
    pub fn family(mut self, family: u8) -> Self {
        self.family = Some(family);
        self
    }

    /// Only addresses inside `addr/len`.
    pub fn prefix(mut self, addr: IpAddr, len: u8) -> Self {
        self.prefix = Some((addr, len));
        self
    }

    /// Only routes in this table.
    pub fn table(mut self, table: u32) -> Self {
        self.table = Some(table);
        self
    }

    /// Only objects whose state has a bit in `mask` (e.g. NUD_* for neighbors).
    pub fn state_mask(mut self, mask: u32) -> Self {
        self.state_mask = Some(mask);
        self
    }

    /// Only objects installed by this protocol (RTPROT_*).
    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Only the interface with this name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Only interfaces that are administratively up.
    pub fn up(mut self, up: bool) -> Self {
        self.up = up;
        self
    }

    /// Whether any criterion is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches_ifindex(&self, ifindex: u32) -> bool {
        self.ifindex.is_none_or(|want| want == ifindex)
    }

    pub fn matches_family(&self, family: u8) -> bool {
        // AF_UNSPEC selects every family
        self.family
            .is_none_or(|want| want == libc::AF_UNSPEC as u8 || want == family)
    }

    pub fn matches_table(&self, table: u32) -> bool {
        self.table.is_none_or(|want| want == table)
    }

    pub fn matches_state(&self, state: u32) -> bool {
        self.state_mask.is_none_or(|mask| state & mask != 0)
    }

    pub fn matches_protocol(&self, protocol: u8) -> bool {
        self.protocol.is_none_or(|want| want == protocol)
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.as_deref().is_none_or(|want| want == name)
    }

    /// Whether `addr` falls inside the prefix. Addresses of a different
    /// family never match a set prefix.
    pub fn matches_addr(&self, addr: &IpAddr) -> bool {
        match &self.prefix {
            Some((net, len)) => prefix_match(net, addr, *len),
            None => true,
        }
    }

    /// Check a link against index, name and the up flag.
    pub fn matches_link(&self, link: &LinkMessage) -> bool {
        self.matches_ifindex(link.index)
            && self.matches_name(link.name.as_deref().unwrap_or_default())
            && (!self.up || link.is_up())
    }
}

/// Compare the first `bits` bits of two addresses of the same family.
pub fn prefix_match(a: &IpAddr, b: &IpAddr, bits: u8) -> bool {
    let (a, b): (Vec<u8>, Vec<u8>) = match (a, b) {
        (IpAddr::V4(a), IpAddr::V4(b)) => (a.octets().to_vec(), b.octets().to_vec()),
        (IpAddr::V6(a), IpAddr::V6(b)) => (a.octets().to_vec(), b.octets().to_vec()),
        _ => return false,
    };
    let bits = (bits as usize).min(a.len() * 8);
    let (whole, rest) = (bits / 8, bits % 8);

    if a[..whole] != b[..whole] {
        return false;
    }
    if rest == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rest);
    a[whole] & mask == b[whole] & mask
}
