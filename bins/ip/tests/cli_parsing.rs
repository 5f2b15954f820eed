//! CLI argument parsing tests for the ip command.
//!
//! These tests verify that command-line arguments are correctly parsed
//! without requiring network access or root privileges.

use assert_cmd::Command;
use predicates::prelude::*;

fn ip_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ip"))
}

/// A captured link dump: one RTM_NEWLINK for `lo`, then DONE.
fn loopback_capture() -> Vec<u8> {
    let mut data = vec![
        // nlmsghdr: len=48, type=RTM_NEWLINK (16), flags=NLM_F_MULTI, seq=1, pid=0
        0x30, 0x00, 0x00, 0x00, // len = 48
        0x10, 0x00, // type = RTM_NEWLINK (16)
        0x02, 0x00, // flags = NLM_F_MULTI
        0x01, 0x00, 0x00, 0x00, // seq = 1
        0x00, 0x00, 0x00, 0x00, // pid = 0
        // ifinfomsg: family=0, type=772 (ARPHRD_LOOPBACK), index=1, flags=0x49 (UP|LOOPBACK|RUNNING)
        0x00, 0x00, // family, pad
        0x04, 0x03, // type = 772
        0x01, 0x00, 0x00, 0x00, // index = 1
        0x49, 0x00, 0x00, 0x00, // flags
        0x00, 0x00, 0x00, 0x00, // change = 0
        // IFLA_IFNAME = "lo"
        0x07, 0x00, // len = 7
        0x03, 0x00, // type = IFLA_IFNAME (3)
        b'l', b'o', 0x00, 0x00, // "lo\0" + padding
        // IFLA_MTU = 65536
        0x08, 0x00, // len = 8
        0x04, 0x00, // type = IFLA_MTU (4)
        0x00, 0x00, 0x01, 0x00, // mtu = 65536
    ];
    data.extend_from_slice(&[
        // nlmsghdr: len=20, type=DONE (3), flags=NLM_F_MULTI, seq=1, pid=0
        0x14, 0x00, 0x00, 0x00, // len = 20
        0x03, 0x00, // type = NLMSG_DONE (3)
        0x02, 0x00, // flags = NLM_F_MULTI
        0x01, 0x00, 0x00, 0x00, // seq = 1
        0x00, 0x00, 0x00, 0x00, // pid = 0
        0x00, 0x00, 0x00, 0x00, // status = 0
    ]);
    data
}

mod global_flags {
    use super::*;

    #[test]
    fn test_help() {
        ip_cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Network configuration tool"))
            .stdout(predicate::str::contains("--rcvbuf"));
    }

    #[test]
    fn test_version() {
        ip_cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("ip"));
    }

    #[test]
    fn test_invalid_subcommand() {
        ip_cmd()
            .arg("invalid_command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn test_rcvbuf_must_be_numeric() {
        ip_cmd()
            .args(["--rcvbuf", "lots", "link", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }
}

mod link_command {
    use super::*;

    #[test]
    fn test_link_help() {
        ip_cmd()
            .args(["link", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Manage network interfaces"));
    }

    #[test]
    fn test_link_set_help() {
        ip_cmd()
            .args(["link", "set", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--up"))
            .stdout(predicate::str::contains("--down"))
            .stdout(predicate::str::contains("--mtu"));
    }

    #[test]
    fn test_link_set_up_and_down_conflict() {
        ip_cmd()
            .args(["link", "set", "eth0", "--up", "--down"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot be used with"));
    }

    #[test]
    fn test_link_del_requires_dev() {
        ip_cmd()
            .args(["link", "del"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("required"));
    }

    #[test]
    fn test_link_set_requires_dev() {
        ip_cmd().args(["link", "set", "--up"]).assert().failure();
    }

    #[test]
    fn test_link_alias_l() {
        ip_cmd()
            .args(["l", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Manage network interfaces"));
    }
}

mod showdump {
    use super::*;

    #[test]
    fn test_showdump_text() {
        ip_cmd()
            .args(["link", "showdump"])
            .write_stdin(loopback_capture())
            .assert()
            .success()
            .stdout(predicate::str::contains("1: lo: <LOOPBACK,UP> mtu 65536"))
            .stdout(predicate::str::contains("link/loopback"));
    }

    #[test]
    fn test_showdump_json() {
        ip_cmd()
            .args(["-j", "link", "showdump"])
            .write_stdin(loopback_capture())
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""name":"lo""#))
            .stdout(predicate::str::contains(r#""mtu":65536"#));
    }

    #[test]
    fn test_showdump_empty_input() {
        ip_cmd()
            .args(["link", "showdump"])
            .write_stdin(Vec::new())
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn test_showdump_truncated() {
        let mut data = loopback_capture();
        data.truncate(30);
        ip_cmd()
            .args(["link", "showdump"])
            .write_stdin(data)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Error: message truncated"));
    }

    #[test]
    fn test_showdump_malformed_is_fatal() {
        let mut data = loopback_capture();
        data[0] = 0x04;
        ip_cmd()
            .args(["link", "showdump"])
            .write_stdin(data)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("malformed message"));
    }

    #[test]
    fn test_showdump_missing_file() {
        ip_cmd()
            .args(["link", "showdump", "/nonexistent/capture"])
            .assert()
            .code(1)
            .stderr(predicate::str::starts_with("Error:"));
    }
}

mod monitor_command {
    use super::*;

    #[test]
    fn test_monitor_help() {
        ip_cmd()
            .args(["monitor", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--all-nsid"));
    }

    #[test]
    fn test_monitor_rejects_unknown_object() {
        ip_cmd()
            .args(["monitor", "bogus"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }
}
