mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;

use common::{config_file, mcstack};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn mcstack_without_subcommand() -> TestResult {
    mcstack()
        .assert()
        .failure()
        .stderr(predicate::str::contains("USAGE"));
    Ok(())
}

#[test]
fn mcstack_synth() -> TestResult {
    mcstack()
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains("AWS::EC2::Instance"))
        .stdout(predicate::str::contains("McServerPublicIp"))
        .stdout(predicate::str::contains("3.112.23.0/29"));
    Ok(())
}

#[test]
fn mcstack_synth_is_deterministic() -> TestResult {
    let first = mcstack().arg("synth").output()?;
    let second = mcstack().arg("synth").output()?;
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    Ok(())
}

#[test]
fn mcstack_synth_to_file() -> TestResult {
    let out = std::env::temp_dir().join(format!("mcstack-synth-{}.json", std::process::id()));
    mcstack()
        .args(&["synth", "--out"])
        .arg(&out)
        .assert()
        .success();

    let template: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out)?)?;
    assert_eq!(template["Resources"]["McEc2"]["Type"], "AWS::EC2::Instance");
    fs::remove_file(out)?;
    Ok(())
}

#[test]
fn mcstack_userdata() -> TestResult {
    mcstack()
        .arg("userdata")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("#!/bin/bash"))
        .stdout(predicate::str::contains("sleep 40"))
        .stdout(predicate::str::contains("java -Xmx1300M -Xms1300M -jar server.jar nogui"));
    Ok(())
}

#[test]
fn mcstack_checked_userdata() -> TestResult {
    mcstack()
        .args(&["--checked", "userdata"])
        .assert()
        .success()
        .stdout(predicate::str::contains("set -Eeuo pipefail"))
        .stdout(predicate::str::contains("/var/lib/mcstack/ready"))
        .stdout(predicate::str::contains("sleep 40").not());
    Ok(())
}

#[test]
fn mcstack_config_overrides() -> TestResult {
    let config = config_file(
        "overrides",
        r#"{ "instance": { "size": "medium" }, "server": { "memory-mb": 2048 } }"#,
    );
    mcstack()
        .arg("--config")
        .arg(&config)
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains("t3.medium"));
    mcstack()
        .arg("--config")
        .arg(&config)
        .arg("userdata")
        .assert()
        .success()
        .stdout(predicate::str::contains("-Xmx2048M"));
    fs::remove_file(config)?;
    Ok(())
}

#[test]
fn mcstack_public_vpc_block() -> TestResult {
    let config = config_file("public", r#"{ "network": { "cidr": "8.8.0.0/16" } }"#);
    mcstack()
        .arg("--config")
        .arg(&config)
        .arg("synth")
        .assert()
        .failure()
        .stderr(predicate::str::contains("8.8.0.0/16"));
    fs::remove_file(config)?;
    Ok(())
}

#[test]
fn mcstack_vpc_block_past_private_space() -> TestResult {
    let config = config_file("wide", r#"{ "network": { "cidr": "192.168.0.0/15" } }"#);
    mcstack()
        .arg("--config")
        .arg(&config)
        .arg("synth")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a private address block"))
        .stdout(predicate::str::contains("CidrBlock").not());
    fs::remove_file(config)?;
    Ok(())
}

#[test]
fn mcstack_unreadable_config() -> TestResult {
    mcstack()
        .args(&["--config", "/nonexistent/mcstack.json", "synth"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Couldn't read"));
    Ok(())
}

#[test]
fn mcstack_bad_stack_name() -> TestResult {
    mcstack()
        .args(&["--stack", "1nvalid_name", "synth"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid stack name"));
    Ok(())
}

#[test]
fn mcstack_destroy_needs_confirmation() -> TestResult {
    mcstack()
        .arg("destroy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
    Ok(())
}

#[test]
fn mcstack_completions() -> TestResult {
    mcstack()
        .args(&["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mcstack"));
    Ok(())
}
