//! Generic netlink family resolution.

use rtnl::Result;
use rtnl::netlink::genl::GENL_ID_CTRL;
use rtnl::netlink::{Connection, Protocol};

#[tokio::test]
async fn test_resolve_nlctrl() -> Result<()> {
    let conn = Connection::new(Protocol::Generic)?;
    let family = conn.resolve_family("nlctrl").await?;
    assert_eq!(family.id, GENL_ID_CTRL);
    assert_eq!(family.name, "nlctrl");
    assert!(family.mcast_group("notify").is_some());
    Ok(())
}

#[tokio::test]
async fn test_resolve_unknown_family() -> Result<()> {
    let mut conn = Connection::new(Protocol::Generic)?;
    conn.set_suppress_errors(true);
    let err = conn.resolve_family("no-such-family").await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}
