//! Common test utilities for integration tests.

use std::io;
use std::process::Command;

use rtnl::Result;

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// A dummy interface created with `ip link add`, deleted on drop.
pub struct DummyLink {
    name: String,
}

impl DummyLink {
    /// Create a dummy interface with a name unique to this process.
    pub fn new(tag: &str) -> Result<Self> {
        let name = format!("rt{}{}", tag, std::process::id() % 100_000);
        let status = Command::new("ip")
            .args(["link", "add", &name, "type", "dummy"])
            .status()
            .map_err(|e| rtnl::Error::Io(io::Error::from(e.kind())))?;

        if !status.success() {
            return Err(rtnl::Error::InvalidMessage(format!(
                "failed to create dummy link: {}",
                name
            )));
        }
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for DummyLink {
    fn drop(&mut self) {
        let _ = Command::new("ip")
            .args(["link", "del", &self.name])
            .output();
    }
}

/// Skip the test if not running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}
