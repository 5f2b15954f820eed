//! Dump engine against the kernel.

use rtnl::Result;
use rtnl::netlink::attr::find_one;
use rtnl::netlink::types::link::{IFLA_IFNAME, IfInfoMsg};
use rtnl::netlink::{Config, Connection, NlMsgType, Protocol};

#[tokio::test]
async fn test_dump_links_finds_loopback() -> Result<()> {
    let conn = Connection::new(Protocol::Route)?;
    conn.dump_request(libc::AF_UNSPEC as u8, NlMsgType::RTM_GETLINK)
        .await?;

    let mut names = Vec::new();
    conn.dump_filter(|msg| {
        if let Some(name) = find_one(IFLA_IFNAME, &msg.payload[IfInfoMsg::SIZE..]) {
            names.push(name.str()?.to_string());
        }
        Ok(())
    })
    .await?;

    assert!(names.iter().any(|n| n == "lo"), "lo missing from {:?}", names);
    Ok(())
}

#[tokio::test]
async fn test_get_links_small_rcvbuf() -> Result<()> {
    // a tiny receive buffer still yields complete dumps
    let conn = Connection::with_config(Protocol::Route, Config::default().rcvbuf(4096))?;
    let links = conn.get_links().await?;
    let lo = links.iter().find(|l| l.name.as_deref() == Some("lo"));
    assert!(lo.is_some_and(|l| l.is_loopback()));
    Ok(())
}

#[tokio::test]
async fn test_dump_is_repeatable() -> Result<()> {
    let conn = Connection::new(Protocol::Route)?;
    let first = conn.get_links().await?;
    let second = conn.get_links().await?;
    assert_eq!(first.len(), second.len());
    assert!(conn.dump_seq() > 0);
    Ok(())
}
