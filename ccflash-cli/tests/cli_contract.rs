//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("ccflash")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ccflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ccflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn completions_write_script_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ccflash"));
}

#[test]
fn list_ports_json_returns_valid_json() {
    // In environments without serial ports this still exercises the JSON path.
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("list-ports --json should emit valid JSON");
    assert!(parsed.is_array());
}

#[test]
fn info_json_error_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("not_exists.hex");

    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg("--json")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn info_json_reports_hex_image_stats() {
    let dir = tempdir().expect("tempdir should be created");
    let hex = dir.path().join("fw.hex");
    fs::write(&hex, ":0100000011EE\n:00000001FF\n").expect("write fw.hex");

    let mut cmd = cli_cmd();
    let output = cmd
        .arg("info")
        .arg("--json")
        .arg(hex.as_os_str())
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let info: serde_json::Value =
        serde_json::from_str(&String::from_utf8_lossy(&output.stdout)).expect("valid JSON");
    assert_eq!(info["format"], "intel-hex");
    assert_eq!(info["size"], 1);
    assert_eq!(info["data_packets"], 1);
    assert_eq!(info["total_steps"], 5);
}

#[test]
fn info_json_reports_raw_image_stats() {
    let dir = tempdir().expect("tempdir should be created");
    let bin = dir.path().join("fw.bin");
    fs::write(&bin, vec![0xA5u8; 600]).expect("write fw.bin");

    let mut cmd = cli_cmd();
    let output = cmd
        .arg("info")
        .arg("--bin")
        .arg("--json")
        .arg(bin.as_os_str())
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let info: serde_json::Value =
        serde_json::from_str(&String::from_utf8_lossy(&output.stdout)).expect("valid JSON");
    assert_eq!(info["format"], "raw");
    assert_eq!(info["size"], 600);
    assert_eq!(info["data_packets"], 3); // 252 + 252 + 96
    assert_eq!(info["final_packet_size"], 96);
    assert_eq!(info["total_steps"], 7);
}

#[test]
fn flash_rejects_malformed_hex_before_touching_any_port() {
    let dir = tempdir().expect("tempdir should be created");
    let hex = dir.path().join("bad.hex");
    fs::write(&hex, "not a hex file\n").expect("write bad.hex");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("flash")
        .arg(hex.as_os_str())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("failed to load firmware image"));
}

#[test]
fn flash_rejects_missing_image() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir.path().join("missing.hex");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("flash")
        .arg(missing.as_os_str())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load firmware image"));
}

#[test]
fn invalid_baud_exits_with_usage_error() {
    let mut cmd = cli_cmd();
    cmd.args(["--baud", "fast", "list-ports"])
        .assert()
        .failure()
        .code(2);
}
