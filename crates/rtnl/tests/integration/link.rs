//! Link changes through the talk engine. Root only.

use rtnl::Result;
use rtnl::netlink::{Connection, Error, Protocol};

use crate::common::DummyLink;

#[tokio::test]
async fn test_set_state_and_mtu() -> Result<()> {
    require_root!();

    let dummy = DummyLink::new("st")?;
    let conn = Connection::new(Protocol::Route)?;

    conn.set_link_state(dummy.name(), true).await?;
    conn.set_link_mtu(dummy.name(), 1400).await?;

    let link = conn.get_link_by_name(dummy.name()).await?;
    assert!(link.is_up());
    assert_eq!(link.mtu, Some(1400));
    assert_eq!(link.kind.as_deref(), Some("dummy"));

    conn.set_link_state(dummy.name(), false).await?;
    assert!(!conn.get_link_by_name(dummy.name()).await?.is_up());
    Ok(())
}

#[tokio::test]
async fn test_del_link() -> Result<()> {
    require_root!();

    let dummy = DummyLink::new("dl")?;
    let mut conn = Connection::new(Protocol::Route)?;
    conn.del_link(dummy.name()).await?;

    conn.set_suppress_errors(true);
    let err = conn.get_link_by_name(dummy.name()).await.unwrap_err();
    assert!(matches!(err, Error::InterfaceNotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn test_bad_mtu_carries_ext_ack() -> Result<()> {
    require_root!();

    let dummy = DummyLink::new("mt")?;
    let mut conn = Connection::new(Protocol::Route)?;
    conn.set_suppress_errors(true);

    let err = conn.set_link_mtu(dummy.name(), 1).await.unwrap_err();
    assert_eq!(err.errno(), Some(libc::EINVAL));
    Ok(())
}
