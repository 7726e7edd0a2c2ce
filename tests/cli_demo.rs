//! CLI integration tests for the demo and benchmark modes.

use std::process::Command;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_batch_pipeline")
}

fn line_value<'a>(stdout: &'a str, key: &str) -> &'a str {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .unwrap_or_else(|| panic!("{key} line missing"))
        .trim()
}

#[test]
fn demo_cli_collects_every_task() {
    // Run the demo binary with default settings.
    let output = Command::new(bin())
        .output()
        .expect("failed to run demo binary");

    // Demo should exit cleanly.
    assert!(
        output.status.success(),
        "demo exited with non-zero status: {:?}",
        output.status
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("PIPELINE SUMMARY"),
        "pipeline summary missing from output"
    );
    assert_eq!(line_value(&stdout, "tasks_total="), "20");
    assert_eq!(line_value(&stdout, "processed="), "20");
    assert_eq!(line_value(&stdout, "collected="), "20");
    assert_eq!(line_value(&stdout, "batch_signals="), "4");
    assert_eq!(line_value(&stdout, "missing_ids="), "[]");
}

#[test]
fn bench_cli_prints_one_complete_row() {
    let output = Command::new(bin())
        .args(["bench", "12", "3", "4", "0"])
        .output()
        .expect("failed to run bench");
    assert!(output.status.success(), "bench failed: {:?}", output.status);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "expected header and one row: {stdout}");
    assert!(lines[0].starts_with("tasks,workers,batch_size"));
    let row: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(&row[..3], &["12", "3", "4"]);
    assert_eq!(row.last(), Some(&"true"));
}

#[test]
fn unknown_command_exits_with_usage() {
    let output = Command::new(bin())
        .arg("frobnicate")
        .output()
        .expect("failed to run binary");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage:"));
}

#[test]
fn zero_workers_is_a_config_error() {
    let output = Command::new(bin())
        .args(["bench", "5", "0"])
        .output()
        .expect("failed to run bench");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("worker_count must be > 0"));
}
