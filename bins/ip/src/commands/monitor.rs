//! ip monitor - watch for netlink events.

use std::io::{self, Write};

use clap::{Args, ValueEnum};
use rtnl::Result;
use rtnl::netlink::rtnetlink_groups::*;
use rtnl::netlink::types::link::LinkMessage;
use rtnl::netlink::{Config, ListenContext, Message, NlMsgType};
use serde_json::json;

use crate::output::{OutputFormat, OutputOptions, print_link_text, write_json};

/// Event types that can be monitored.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum EventType {
    /// Link state changes (interfaces up/down, created, deleted).
    Link,
    /// Address changes (added, removed, modified).
    Address,
    /// Routing table changes.
    Route,
    /// Neighbor (ARP/NDP) cache changes.
    Neigh,
    /// Namespace id changes.
    Nsid,
    /// All event types.
    All,
}

impl EventType {
    fn groups(self) -> &'static [u32] {
        match self {
            EventType::Link => &[RTNLGRP_LINK],
            EventType::Address => &[RTNLGRP_IPV4_IFADDR, RTNLGRP_IPV6_IFADDR],
            EventType::Route => &[RTNLGRP_IPV4_ROUTE, RTNLGRP_IPV6_ROUTE],
            EventType::Neigh => &[RTNLGRP_NEIGH],
            EventType::Nsid => &[RTNLGRP_NSID],
            EventType::All => &[
                RTNLGRP_LINK,
                RTNLGRP_IPV4_IFADDR,
                RTNLGRP_IPV6_IFADDR,
                RTNLGRP_IPV4_ROUTE,
                RTNLGRP_IPV6_ROUTE,
                RTNLGRP_NEIGH,
                RTNLGRP_NSID,
            ],
        }
    }
}

#[derive(Args)]
pub struct MonitorCmd {
    /// Event types to monitor.
    #[arg(default_value = "all")]
    objects: Vec<EventType>,

    /// Receive events from every network namespace.
    #[arg(long)]
    all_nsid: bool,
}

impl MonitorCmd {
    pub async fn run(&self, config: Config, format: OutputFormat, opts: &OutputOptions) -> Result<()> {
        let mut config = config.listen_all_nsid(self.all_nsid);
        for object in &self.objects {
            for &group in object.groups() {
                config = config.membership(group);
            }
        }
        let conn = crate::connect(config)?;

        let opts = *opts;
        conn.listen(move |ctx, msg| {
            let mut stdout = io::stdout().lock();
            match format {
                OutputFormat::Text => print_event_text(&mut stdout, ctx, msg)?,
                OutputFormat::Json => write_json(&mut stdout, &event_json(ctx, msg)?, &opts)?,
            }
            stdout.flush()?;
            Ok(())
        })
        .await
    }
}

fn print_event_text<W: Write>(w: &mut W, ctx: &ListenContext, msg: &Message<'_>) -> Result<()> {
    if ctx.nsid >= 0 {
        write!(w, "[nsid {}] ", ctx.nsid)?;
    }
    match msg.msg_type() {
        NlMsgType::RTM_NEWLINK => print_link_text(w, &LinkMessage::parse(msg.payload)?)?,
        NlMsgType::RTM_DELLINK => {
            write!(w, "Deleted ")?;
            print_link_text(w, &LinkMessage::parse(msg.payload)?)?;
        }
        other => writeln!(
            w,
            "{} ({} bytes)",
            NlMsgType::name(other).unwrap_or("UNKNOWN"),
            msg.payload.len()
        )?,
    }
    Ok(())
}

fn event_json(ctx: &ListenContext, msg: &Message<'_>) -> Result<serde_json::Value> {
    let mut obj = match msg.msg_type() {
        NlMsgType::RTM_NEWLINK | NlMsgType::RTM_DELLINK => {
            let link = LinkMessage::parse(msg.payload)?;
            json!({ "link": serde_json::to_value(link).unwrap_or_default() })
        }
        _ => json!({}),
    };
    obj["event"] = json!(NlMsgType::name(msg.msg_type()).unwrap_or("UNKNOWN"));
    if ctx.nsid >= 0 {
        obj["nsid"] = json!(ctx.nsid);
    }
    Ok(obj)
}
