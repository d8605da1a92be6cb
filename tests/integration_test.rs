//! Integration tests for the linux-commander binary

use std::process::Command;

fn commander() -> Command {
    Command::new(env!("CARGO_BIN_EXE_linux-commander"))
}

/// Test that the help command works
#[test]
fn test_help_command() {
    let output = commander()
        .arg("--help")
        .output()
        .expect("Failed to execute help command");

    assert!(output.status.success(), "Help command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage: linux-commander"), "Should show usage");
    assert!(stdout.contains("--host"), "Should show host option");
    assert!(stdout.contains("--dry-run"), "Should show dry-run option");
    assert!(stdout.contains("config"), "Should show config command");
}

/// Test that the version command works
#[test]
fn test_version_command() {
    let output = commander()
        .arg("--version")
        .output()
        .expect("Failed to execute version command");

    assert!(output.status.success(), "Version command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "Should show version");
}

/// Dry run shows the translation rules of a freshly created data file
#[test]
fn test_dry_run_creates_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let data_file = dir.path().join("data").join("store.json");
    let log_file = dir.path().join("logs").join("commander.log");

    let output = commander()
        .args(["--dry-run", "--config-file"])
        .arg(dir.path().join("missing.toml"))
        .arg("--data-file")
        .arg(&data_file)
        .env("LCMD_LOG_FILE_PATH", &log_file)
        .output()
        .expect("Failed to execute dry run");

    assert!(output.status.success(), "Dry run should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Current configuration"), "Should show configuration");
    assert!(stdout.contains("ansible-playbook"), "Should list built-in rules");
    assert!(data_file.is_file(), "Should create the data file");
    assert!(log_file.is_file(), "Should write to the log file");
}
