//! Integration tests for perfpinger CLI functionality
//!
//! None of these get as far as opening a socket, so they run unprivileged
//! and offline.

#![allow(clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn perfpinger() -> Command {
    Command::cargo_bin("perfpinger").expect("Failed to find perfpinger binary")
}

fn host_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_help_output() {
    perfpinger()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Concurrent ICMP echo probing"))
        .stdout(predicate::str::contains("<HOSTFILE>"))
        .stdout(predicate::str::contains("--socket-mode"))
        .stdout(predicate::str::contains("--json"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_version_output() {
    let output = perfpinger().arg("--version").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("perfpinger "));
    if cfg!(debug_assertions) {
        assert!(stdout.contains("-UNRELEASED"));
    }
}

#[test]
fn test_missing_arguments_rejected() {
    perfpinger()
        .arg("hosts.txt")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<SIZE>"));
}

#[test]
fn test_missing_host_file() {
    perfpinger()
        .args(["/nonexistent/perfpinger-hosts.txt", "32", "1000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read host file"));
}

#[test]
fn test_host_file_without_hosts() {
    let file = host_file("# only a comment\n\n   \n");
    perfpinger()
        .arg(file.path())
        .args(["32", "1000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("contains no hosts"));
}

#[test]
fn test_ipv6_host_rejected() {
    let file = host_file("2001:db8::1\n");
    perfpinger()
        .arg(file.path())
        .args(["32", "1000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IPv6 targets are not supported"));
}

#[test]
fn test_zero_interval_rejected() {
    let file = host_file("192.0.2.1\n");
    perfpinger()
        .arg(file.path())
        .args(["32", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"))
        .stderr(predicate::str::contains("interval"));
}

#[test]
fn test_oversized_payload_rejected() {
    let file = host_file("192.0.2.1\n");
    perfpinger()
        .arg(file.path())
        .args(["70000", "1000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("exceeds the maximum"));
}

#[test]
fn test_invalid_socket_mode_rejected() {
    let file = host_file("192.0.2.1\n");
    perfpinger()
        .arg(file.path())
        .args(["32", "1000", "--socket-mode", "stream"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
