//! Generic Netlink (GENL) header and family resolution.
//!
//! GENL messages have an additional header after the standard netlink header:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ nlmsghdr (16 bytes)                     │
//! │   nlmsg_len, nlmsg_type (family_id),    │
//! │   nlmsg_flags, nlmsg_seq, nlmsg_pid     │
//! ├─────────────────────────────────────────┤
//! │ genlmsghdr (4 bytes)                    │
//! │   cmd (u8), version (u8), reserved (u16)│
//! ├─────────────────────────────────────────┤
//! │ Attributes (TLV format)                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Family ids are assigned dynamically; [`Connection::resolve_family`] asks
//! the control family for them.

use std::collections::HashMap;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{AttrTable, NLA_F_NESTED};
use super::builder::MessageBuilder;
use super::connection::Connection;
use super::error::{Error, Result};
use super::message::{NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgHdr};
use super::transport::Transport;

/// Generic Netlink message header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GenlMsgHdr {
    /// Command identifier (family-specific)
    pub cmd: u8,
    /// Interface version
    pub version: u8,
    /// Reserved for future use
    pub reserved: u16,
}

/// Size of the GENL header in bytes.
pub const GENL_HDRLEN: usize = std::mem::size_of::<GenlMsgHdr>();

impl GenlMsgHdr {
    /// Create a new GENL header with the given command and version.
    #[inline]
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Error::Truncated {
                expected: GENL_HDRLEN,
                actual: data.len(),
            })
    }

    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }
}

// Control family constants (fixed, not dynamically assigned)
pub const GENL_ID_CTRL: u16 = 0x10;

pub const CTRL_CMD_NEWFAMILY: u8 = 1;
pub const CTRL_CMD_GETFAMILY: u8 = 3;

pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;
pub const CTRL_ATTR_VERSION: u16 = 3;
pub const CTRL_ATTR_HDRSIZE: u16 = 4;
pub const CTRL_ATTR_MAXATTR: u16 = 5;
pub const CTRL_ATTR_OPS: u16 = 6;
pub const CTRL_ATTR_MCAST_GROUPS: u16 = 7;
const CTRL_ATTR_MAX: u16 = 10;

pub const CTRL_ATTR_MCAST_GRP_NAME: u16 = 1;
pub const CTRL_ATTR_MCAST_GRP_ID: u16 = 2;

/// Information about a Generic Netlink family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyInfo {
    /// Dynamically assigned family ID (used as nlmsg_type).
    pub id: u16,
    pub name: String,
    /// Family version.
    pub version: u8,
    /// Header size (additional bytes after genlmsghdr).
    pub hdr_size: u32,
    /// Maximum attribute number.
    pub max_attr: u32,
    /// Multicast groups: name -> group ID.
    pub mcast_groups: HashMap<String, u32>,
}

impl FamilyInfo {
    /// Parse a CTRL_CMD_NEWFAMILY payload (genlmsghdr and attributes).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        GenlMsgHdr::from_bytes(payload)?;
        let attrs = AttrTable::parse_flags(CTRL_ATTR_MAX, &payload[GENL_HDRLEN..], NLA_F_NESTED);

        let id = attrs
            .get(CTRL_ATTR_FAMILY_ID)
            .ok_or_else(|| Error::InvalidMessage("missing family ID".into()))?
            .u16()?;

        let mut info = FamilyInfo {
            id,
            ..Default::default()
        };
        if let Some(name) = attrs.get(CTRL_ATTR_FAMILY_NAME) {
            info.name = name.str()?.to_string();
        }
        if let Some(version) = attrs.get(CTRL_ATTR_VERSION) {
            info.version = version.u32()? as u8;
        }
        if let Some(hdr_size) = attrs.get(CTRL_ATTR_HDRSIZE) {
            info.hdr_size = hdr_size.u32()?;
        }
        if let Some(max_attr) = attrs.get(CTRL_ATTR_MAXATTR) {
            info.max_attr = max_attr.u32()?;
        }
        if let Some(groups) = attrs.get(CTRL_ATTR_MCAST_GROUPS) {
            // an array of nests indexed 1..n
            for group in groups.nested() {
                let grp = AttrTable::parse_flags(CTRL_ATTR_MCAST_GRP_ID, group.payload(), NLA_F_NESTED);
                if let (Some(name), Some(id)) =
                    (grp.get(CTRL_ATTR_MCAST_GRP_NAME), grp.get(CTRL_ATTR_MCAST_GRP_ID))
                {
                    info.mcast_groups.insert(name.str()?.to_string(), id.u32()?);
                }
            }
        }
        Ok(info)
    }

    /// Group id for a multicast group name.
    pub fn mcast_group(&self, name: &str) -> Option<u32> {
        self.mcast_groups.get(name).copied()
    }
}

impl<T: Transport> Connection<T> {
    /// Ask the control family for the id and layout of family `name`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let conn = Connection::new(Protocol::Generic)?;
    /// let family = conn.resolve_family("nlctrl").await?;
    /// println!("{} = {}", family.name, family.id);
    /// ```
    pub async fn resolve_family(&self, name: &str) -> Result<FamilyInfo> {
        let mut msg = MessageBuilder::new(GENL_ID_CTRL, NLM_F_REQUEST);
        msg.append_struct(&GenlMsgHdr::new(CTRL_CMD_GETFAMILY, 1))?;
        msg.append_attr_str(CTRL_ATTR_FAMILY_NAME, name)?;

        let answer = self.talk_answer(msg).await.map_err(|e| match e.errno() {
            Some(libc::ENOENT) => Error::FamilyNotFound {
                name: name.to_string(),
            },
            _ => e,
        })?;

        let header = NlMsgHdr::from_bytes(&answer)?;
        if header.nlmsg_type != GENL_ID_CTRL {
            return Err(Error::InvalidMessage(format!(
                "unexpected reply type {} to CTRL_CMD_GETFAMILY",
                header.nlmsg_type
            )));
        }
        let end = (header.nlmsg_len as usize).min(answer.len());
        FamilyInfo::parse(answer.get(NLMSG_HDRLEN..end).unwrap_or_default())
    }
}
