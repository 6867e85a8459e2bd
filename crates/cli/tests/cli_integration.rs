//! CLI integration tests.
//!
//! Uses `assert_cmd` to spawn the `seedlab` binary and verify exit codes,
//! stdout content, and stderr content.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const SAMPLE: [&str; 8] = [
    "5.234", "5.189", "5.267", "5.221", "5.198", "5.245", "5.212", "5.278",
];

fn seedlab() -> Command {
    let mut cmd = cargo_bin_cmd!("seedlab");
    cmd.env_remove("SEEDLAB_LOG").env_remove("RUST_LOG");
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().expect("run seedlab");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

// ──────────────────────────────────────────────
// 1. Help
// ──────────────────────────────────────────────

#[test]
fn help_lists_subcommands() {
    seedlab()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Seed-testing laboratory tooling"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("pms"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    seedlab().assert().failure();
}

// ──────────────────────────────────────────────
// 2. stats
// ──────────────────────────────────────────────

#[test]
fn stats_text_reports_summary() {
    seedlab()
        .arg("stats")
        .args(SAMPLE)
        .assert()
        .success()
        .stdout(predicate::str::contains("count                     8"))
        .stdout(predicate::str::contains("5.2305"))
        .stdout(predicate::str::contains("0.6061"));
}

#[test]
fn stats_json_reports_decimal_strings() {
    let json = stdout_json(seedlab().args(["--output", "json", "stats"]).args(SAMPLE));
    assert_eq!(json["count"], 8);
    assert_eq!(json["mean"], "5.2305");
    assert_eq!(json["std_dev"], "0.0317");
    assert_eq!(json["coefficient_of_variation"], "0.6061");
}

#[test]
fn stats_rejects_non_positive_weight() {
    seedlab()
        .args(["stats", "5.1", "-2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be positive"));
}

#[test]
fn stats_json_error_is_structured() {
    let output = seedlab()
        .args(["--output", "json", "stats", "0"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert!(err["error"].as_str().unwrap().contains("positive"));
}

#[test]
fn quiet_suppresses_error_output() {
    seedlab()
        .args(["--quiet", "stats", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 3. pms
// ──────────────────────────────────────────────

#[test]
fn pms_consistent_sample_is_accepted() {
    let json = stdout_json(
        seedlab()
            .args(["--output", "json", "pms", "--per-batch", "8"])
            .args(SAMPLE),
    );
    assert_eq!(json["readiness"]["status"], "accepted");
    assert_eq!(json["readiness"]["batch"], 1);
    assert_eq!(json["readiness"]["coefficient_of_variation"], "0.6061");
    assert_eq!(json["replicates"].as_array().unwrap().len(), 8);
    assert!(json["replicates"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["validity"] == "valid"));
    assert_eq!(json["analysis"]["state"], "IN_PROGRESS");
    assert_eq!(json["analysis"]["detail"]["kind"], "pms");
    assert_eq!(json["refused"].as_array().unwrap().len(), 0);
}

#[test]
fn pms_refuses_weighings_after_acceptance() {
    let json = stdout_json(
        seedlab()
            .args(["--output", "json", "pms", "--per-batch", "8"])
            .args(SAMPLE)
            .arg("5.2"),
    );
    let refused = json["refused"].as_array().unwrap();
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0]["weight"], "5.2");
    assert!(refused[0]["reason"]
        .as_str()
        .unwrap()
        .contains("needs no more replicates"));
}

#[test]
fn pms_partial_batch_is_not_ready() {
    seedlab()
        .args(["pms", "--per-batch", "8"])
        .args(&SAMPLE[..3])
        .assert()
        .success()
        .stdout(predicate::str::contains("Indeterminate"))
        .stdout(predicate::str::contains("readiness: not ready"))
        .stdout(predicate::str::contains("state: IN_PROGRESS"));
}

#[test]
fn pms_finalize_requires_rounded_weight() {
    seedlab()
        .args(["pms", "--per-batch", "8", "--finalize"])
        .args(SAMPLE)
        .assert()
        .failure()
        .stderr(predicate::str::contains("lacks evidence"));
}

#[test]
fn pms_analyst_finalize_awaits_approval() {
    let json = stdout_json(
        seedlab()
            .args([
                "--output",
                "json",
                "pms",
                "--per-batch",
                "8",
                "--rounded",
                "52.3",
                "--finalize",
            ])
            .args(SAMPLE),
    );
    assert_eq!(json["analysis"]["state"], "PENDING_APPROVAL");
    assert_eq!(json["analysis"]["detail"]["derived_weight_rounded"], "52.3");
    assert!(json["analysis"]["finished_at"].is_string());
}

#[test]
fn pms_administrator_finalize_approves() {
    let json = stdout_json(
        seedlab()
            .args([
                "--output",
                "json",
                "pms",
                "--per-batch",
                "8",
                "--rounded",
                "52.3",
                "--finalize",
                "--role",
                "administrator",
            ])
            .args(SAMPLE),
    );
    assert_eq!(json["analysis"]["state"], "APPROVED");
}

#[test]
fn pms_rejects_oversized_batch() {
    seedlab()
        .args(["pms", "--per-batch", "20", "5.1"])
        .assert()
        .failure();
}

// ──────────────────────────────────────────────
// 4. configuration
// ──────────────────────────────────────────────

#[test]
fn config_prints_defaults() {
    seedlab()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_replicates = 16"))
        .stdout(predicate::str::contains("[logging]"));
}

#[test]
fn config_file_overrides_policy() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seedlab.toml");
    fs::write(&path, "[pms]\nmax_replicates = 4\n").unwrap();

    let json = stdout_json(
        seedlab()
            .args(["--output", "json", "--config"])
            .arg(&path)
            .arg("config"),
    );
    assert_eq!(json["pms"]["max_replicates"], 4);
    assert_eq!(json["pms"]["standard_cv_threshold"], "4.0");
}

#[test]
fn config_cap_limits_intake() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seedlab.toml");
    fs::write(&path, "[pms]\nmax_replicates = 2\n").unwrap();

    // 1.0 and 2.0 are far too variable to ever satisfy a batch of two
    let json = stdout_json(
        seedlab()
            .args(["--output", "json", "--config"])
            .arg(&path)
            .args(["pms", "--per-batch", "2", "1.0", "2.0", "3.0"]),
    );
    assert_eq!(json["replicates"].as_array().unwrap().len(), 2);
    assert_eq!(json["readiness"]["status"], "forced_at_cap");
    let refused = json["refused"].as_array().unwrap();
    assert_eq!(refused.len(), 1);
    assert!(refused[0]["reason"]
        .as_str()
        .unwrap()
        .contains("maximum of 2 replicates"));
}

#[test]
fn invalid_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seedlab.toml");
    fs::write(&path, "[pms]\nmax_replicates = 40\n").unwrap();

    seedlab()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_replicates"));
}

#[test]
fn missing_config_file_fails() {
    seedlab()
        .args(["--config", "/nonexistent/seedlab.toml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read"));
}
