//! End-to-end coverage of `ncproxyd --test-conf`: a valid configuration
//! document exits clean without starting the reactor, and a malformed
//! one is rejected with a non-zero status.

use assert_cmd::prelude::*;
use std::io::Write;
use std::process::{Command, Output};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config file");
    file.write_all(contents.as_bytes()).expect("write temp config file");
    file
}

fn run(args: &[&str]) -> Output {
    #[allow(deprecated)]
    let mut command = Command::cargo_bin("ncproxyd").expect("locate ncproxyd binary");
    command.args(args);
    command.output().expect("failed to run ncproxyd")
}

fn combined_utf8(output: &Output) -> String {
    let mut data = output.stdout.clone();
    data.extend_from_slice(&output.stderr);
    String::from_utf8(data).expect("ncproxyd output should be valid UTF-8")
}

#[test]
fn test_conf_accepts_a_valid_document() {
    let config = write_config(
        "cache:\n  \
         listen: 127.0.0.1:11211\n  \
         dist_type: ketama\n  \
         hash: fnv1a_32\n  \
         servers:\n    \
         - 127.0.0.1:11311:1\n    \
         - 127.0.0.1:11312:1\n",
    );

    let output = run(&["--config", config.path().to_str().unwrap(), "--test-conf"]);
    assert!(output.status.success(), "expected success, got: {}", combined_utf8(&output));
    assert!(combined_utf8(&output).contains("is valid"));
}

#[test]
fn test_conf_rejects_an_unknown_hash_algorithm() {
    let config = write_config(
        "cache:\n  \
         listen: 127.0.0.1:11211\n  \
         dist_type: ketama\n  \
         hash: sha256\n  \
         servers: [127.0.0.1:11311:1]\n",
    );

    let output = run(&["--config", config.path().to_str().unwrap(), "--test-conf"]);
    assert!(!output.status.success());
    assert!(combined_utf8(&output).contains("unknown hash algorithm"));
}

#[test]
fn test_conf_rejects_a_missing_file() {
    let output = run(&["--config", "/nonexistent/ncproxy.yaml", "--test-conf"]);
    assert!(!output.status.success());
}

#[test]
fn missing_required_config_flag_shows_usage() {
    let output = run(&[]);
    assert!(!output.status.success());
    assert!(combined_utf8(&output).contains("Usage"));
}
