//! Text and JSON rendering shared by the commands.

use std::io::{self, Write};

use rtnl::netlink::types::link::{LinkMessage, iff};
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// Output options.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Pretty print (for JSON).
    pub pretty: bool,
}

/// Write `value` as one JSON document followed by a newline.
pub fn write_json<W: Write, T: Serialize>(w: &mut W, value: &T, opts: &OutputOptions) -> io::Result<()> {
    if opts.pretty {
        serde_json::to_writer_pretty(&mut *w, value)?;
    } else {
        serde_json::to_writer(&mut *w, value)?;
    }
    writeln!(w)
}

/// Interface flags in `ip link` order.
pub fn format_link_flags(flags: u32) -> String {
    const NAMES: &[(u32, &str)] = &[
        (iff::LOOPBACK, "LOOPBACK"),
        (iff::BROADCAST, "BROADCAST"),
        (iff::POINTOPOINT, "POINTOPOINT"),
        (iff::MULTICAST, "MULTICAST"),
        (iff::NOARP, "NOARP"),
        (iff::PROMISC, "PROMISC"),
        (iff::UP, "UP"),
        (iff::LOWER_UP, "LOWER_UP"),
    ];
    NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(",")
}

fn link_type_name(link_type: u16) -> &'static str {
    match link_type {
        1 => "ether",      // ARPHRD_ETHER
        772 => "loopback", // ARPHRD_LOOPBACK
        776 => "sit",      // ARPHRD_SIT
        778 => "gre",      // ARPHRD_IPGRE
        65534 => "none",   // ARPHRD_NONE
        _ => "unknown",
    }
}

/// Two-line `ip link show` rendering.
pub fn print_link_text<W: Write>(w: &mut W, link: &LinkMessage) -> io::Result<()> {
    write!(
        w,
        "{}: {}: <{}> mtu {} state {}",
        link.index,
        link.name_or("?"),
        format_link_flags(link.flags),
        link.mtu.unwrap_or(0),
        link.operstate.map(|s| s.name()).unwrap_or("UNKNOWN"),
    )?;
    if let Some(master) = link.master {
        write!(w, " master {}", master)?;
    }
    if let Some(qlen) = link.txqlen {
        write!(w, " qlen {}", qlen)?;
    }
    writeln!(w)?;

    write!(w, "    link/{}", link_type_name(link.link_type))?;
    if let Some(kind) = &link.kind {
        write!(w, " {}", kind)?;
    }
    writeln!(w)
}

/// Print a list of links in the chosen format.
pub fn print_links<W: Write>(
    w: &mut W,
    links: &[LinkMessage],
    format: OutputFormat,
    opts: &OutputOptions,
) -> io::Result<()> {
    match format {
        OutputFormat::Text => {
            for link in links {
                print_link_text(w, link)?;
            }
            Ok(())
        }
        OutputFormat::Json => write_json(w, &links, opts),
    }
}
