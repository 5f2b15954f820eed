//! Link (network interface) message types and operations.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::netlink::attr::AttrTable;
use crate::netlink::builder::MessageBuilder;
use crate::netlink::connection::Connection;
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
use crate::netlink::transport::Transport;

/// Interface info message (struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    /// Address family (usually AF_UNSPEC).
    pub ifi_family: u8,
    /// Padding.
    pub __ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    /// Interface index.
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Change mask.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new interface info message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: i32) -> Self {
        self.ifi_index = index;
        self
    }

    /// Set the address family.
    pub fn with_family(mut self, family: u8) -> Self {
        self.ifi_family = family;
        self
    }

    /// Set `flags` within `change`.
    pub fn with_flags(mut self, flags: u32, change: u32) -> Self {
        self.ifi_flags = flags;
        self.ifi_change = change;
        self
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from the front of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(msg, _)| msg)
            .map_err(|_| Error::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            })
    }
}

/// Link statistics request header (struct if_stats_msg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfStatsMsg {
    pub family: u8,
    pub pad1: u8,
    pub pad2: u16,
    pub ifindex: u32,
    /// IFLA_STATS_FILTER_BIT(*) mask of requested groups.
    pub filter_mask: u32,
}

impl IfStatsMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a wildcard stats request header.
    pub fn new(family: u8, filter_mask: u32) -> Self {
        Self {
            family,
            filter_mask,
            ..Default::default()
        }
    }
}

// Interface link attributes (IFLA_*)
pub const IFLA_ADDRESS: u16 = 1;
pub const IFLA_BROADCAST: u16 = 2;
pub const IFLA_IFNAME: u16 = 3;
pub const IFLA_MTU: u16 = 4;
pub const IFLA_LINK: u16 = 5;
pub const IFLA_QDISC: u16 = 6;
pub const IFLA_MASTER: u16 = 10;
pub const IFLA_TXQLEN: u16 = 13;
pub const IFLA_OPERSTATE: u16 = 16;
pub const IFLA_LINKINFO: u16 = 18;
pub const IFLA_EXT_MASK: u16 = 29;
pub const IFLA_CARRIER: u16 = 33;
pub const IFLA_MAX: u16 = 61;

/// IFLA_EXT_MASK bit asking for VF information.
pub const RTEXT_FILTER_VF: u32 = 1 << 0;
pub const RTEXT_FILTER_BRVLAN: u32 = 1 << 1;
pub const RTEXT_FILTER_SKIP_STATS: u32 = 1 << 3;

/// Interface flags (IFF_*).
pub mod iff {
    pub const UP: u32 = 0x1;
    pub const BROADCAST: u32 = 0x2;
    pub const LOOPBACK: u32 = 0x8;
    pub const POINTOPOINT: u32 = 0x10;
    pub const RUNNING: u32 = 0x40;
    pub const NOARP: u32 = 0x80;
    pub const PROMISC: u32 = 0x100;
    pub const MULTICAST: u32 = 0x1000;
    pub const LOWER_UP: u32 = 0x10000;
}

/// Operational state (IF_OPER_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum OperState {
    #[default]
    Unknown,
    NotPresent,
    Down,
    LowerLayerDown,
    Testing,
    Dormant,
    Up,
}

impl From<u8> for OperState {
    fn from(val: u8) -> Self {
        match val {
            1 => Self::NotPresent,
            2 => Self::Down,
            3 => Self::LowerLayerDown,
            4 => Self::Testing,
            5 => Self::Dormant,
            6 => Self::Up,
            _ => Self::Unknown,
        }
    }
}

impl OperState {
    /// Name as printed by `ip link`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotPresent => "NOTPRESENT",
            Self::Down => "DOWN",
            Self::LowerLayerDown => "LOWERLAYERDOWN",
            Self::Testing => "TESTING",
            Self::Dormant => "DORMANT",
            Self::Up => "UP",
        }
    }
}

/// A parsed RTM_NEWLINK payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LinkMessage {
    /// Interface index.
    pub index: u32,
    /// Device flags (IFF_*).
    pub flags: u32,
    /// Device type (ARPHRD_*).
    pub link_type: u16,
    /// Interface name (IFLA_IFNAME).
    pub name: Option<String>,
    /// MTU (IFLA_MTU).
    pub mtu: Option<u32>,
    /// Transmit queue length (IFLA_TXQLEN).
    pub txqlen: Option<u32>,
    /// Operational state (IFLA_OPERSTATE).
    pub operstate: Option<OperState>,
    /// Master device index (IFLA_MASTER).
    pub master: Option<u32>,
    /// Lower device index for stacked devices (IFLA_LINK).
    pub link: Option<u32>,
    /// Link kind from IFLA_LINKINFO, e.g. "veth".
    pub kind: Option<String>,
}

/// IFLA_INFO_KIND inside IFLA_LINKINFO.
const IFLA_INFO_KIND: u16 = 1;

impl LinkMessage {
    /// Parse an ifinfomsg followed by its attributes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let ifi = IfInfoMsg::from_bytes(payload)?;
        let attrs = AttrTable::parse(IFLA_MAX, &payload[IfInfoMsg::SIZE..]);

        let kind = match attrs.get(IFLA_LINKINFO) {
            Some(info) => AttrTable::parse_nested(IFLA_INFO_KIND, info)
                .get(IFLA_INFO_KIND)
                .map(|a| a.str().map(str::to_string))
                .transpose()?,
            None => None,
        };

        Ok(Self {
            index: ifi.ifi_index as u32,
            flags: ifi.ifi_flags,
            link_type: ifi.ifi_type,
            name: attrs
                .get(IFLA_IFNAME)
                .map(|a| a.str().map(str::to_string))
                .transpose()?,
            mtu: attrs.get(IFLA_MTU).map(|a| a.u32()).transpose()?,
            txqlen: attrs.get(IFLA_TXQLEN).map(|a| a.u32()).transpose()?,
            operstate: attrs
                .get(IFLA_OPERSTATE)
                .map(|a| a.u8().map(OperState::from))
                .transpose()?,
            master: attrs.get(IFLA_MASTER).map(|a| a.u32()).transpose()?,
            link: attrs.get(IFLA_LINK).map(|a| a.u32()).transpose()?,
            kind,
        })
    }

    /// Parse a whole RTM_NEWLINK message, header included.
    pub fn from_message(bytes: &[u8]) -> Result<Self> {
        let header = NlMsgHdr::from_bytes(bytes)?;
        if header.nlmsg_type != NlMsgType::RTM_NEWLINK {
            return Err(Error::InvalidMessage(format!(
                "expected RTM_NEWLINK, got type {}",
                header.nlmsg_type
            )));
        }
        let end = (header.nlmsg_len as usize).min(bytes.len());
        Self::parse(bytes.get(NLMSG_HDRLEN..end).unwrap_or_default())
    }

    /// Whether the administrative UP flag is set.
    pub fn is_up(&self) -> bool {
        self.flags & iff::UP != 0
    }

    /// Whether this is a loopback device.
    pub fn is_loopback(&self) -> bool {
        self.flags & iff::LOOPBACK != 0
    }

    /// Get the interface name, or a default placeholder.
    pub fn name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(default)
    }
}

/// Map "no such device" onto the interface that was asked for.
fn interface_error(name: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |e| match e.errno() {
        Some(libc::ENODEV) => Error::InterfaceNotFound {
            name: name.to_string(),
        },
        _ => e,
    }
}

/// RTM_*LINK request addressed by interface name.
fn link_request(msg_type: u16, ifi: IfInfoMsg, name: &str) -> Result<MessageBuilder> {
    let mut msg = MessageBuilder::new(msg_type, NLM_F_REQUEST);
    msg.append_struct(&ifi)?;
    msg.append_attr_str(IFLA_IFNAME, name)?;
    Ok(msg)
}

impl<T: Transport> Connection<T> {
    /// Get all network interfaces.
    ///
    /// # Example
    ///
    /// ```ignore
    /// for link in conn.get_links().await? {
    ///     println!("{}: {}", link.index, link.name_or("?"));
    /// }
    /// ```
    pub async fn get_links(&self) -> Result<Vec<LinkMessage>> {
        self.dump_request_filter(libc::AF_UNSPEC as u8, NlMsgType::RTM_GETLINK, RTEXT_FILTER_VF)
            .await?;

        let mut links = Vec::new();
        self.dump_filter(|msg| {
            if msg.msg_type() == NlMsgType::RTM_NEWLINK {
                links.push(LinkMessage::parse(msg.payload)?);
            }
            Ok(())
        })
        .await?;
        Ok(links)
    }

    /// Look up one interface by name.
    pub async fn get_link_by_name(&self, name: &str) -> Result<LinkMessage> {
        let mut msg = link_request(NlMsgType::RTM_GETLINK, IfInfoMsg::new(), name)?;
        msg.append_attr_u32(IFLA_EXT_MASK, RTEXT_FILTER_VF)?;

        let answer = self
            .talk_answer(msg)
            .await
            .map_err(interface_error(name))?;
        LinkMessage::from_message(&answer)
    }

    /// Set the administrative state of an interface.
    ///
    /// ```ignore
    /// conn.set_link_state("eth0", true).await?;
    /// ```
    pub async fn set_link_state(&self, name: &str, up: bool) -> Result<()> {
        let flags = if up { iff::UP } else { 0 };
        let ifi = IfInfoMsg::new().with_flags(flags, iff::UP);
        let msg = link_request(NlMsgType::RTM_SETLINK, ifi, name)?;
        self.talk(msg).await.map_err(interface_error(name))
    }

    /// Set the MTU of an interface.
    pub async fn set_link_mtu(&self, name: &str, mtu: u32) -> Result<()> {
        let mut msg = link_request(NlMsgType::RTM_SETLINK, IfInfoMsg::new(), name)?;
        msg.append_attr_u32(IFLA_MTU, mtu)?;
        self.talk(msg).await.map_err(interface_error(name))
    }

    /// Delete an interface.
    pub async fn del_link(&self, name: &str) -> Result<()> {
        let msg = link_request(NlMsgType::RTM_DELLINK, IfInfoMsg::new(), name)?;
        self.talk(msg).await.map_err(interface_error(name))
    }
}
