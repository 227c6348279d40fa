//! Smoke tests -- verify the binary runs and the subcommands are wired up.

use std::io::Write;

use assert_cmd::Command;

fn geoburst() -> Command {
    let mut cmd = Command::cargo_bin("geoburst").unwrap();
    // Keep host configuration out of the way.
    cmd.env_remove("GEOBURST_CONFIG");
    cmd
}

#[test]
fn test_cli_help() {
    geoburst()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("density hotspot detection"));
}

#[test]
fn test_cli_version() {
    geoburst()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("geoburst"));
}

#[test]
fn test_serve_subcommand_exists() {
    geoburst()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--forward-to"));
}

#[test]
fn test_simulate_subcommand_exists() {
    geoburst()
        .args(["simulate", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--total-packets"));
}

#[test]
fn test_bench_subcommand_exists() {
    geoburst().args(["bench", "--help"]).assert().success();
}

#[test]
fn test_config_show_uses_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[detector]\neps = 0.0125\n\n[partition]\nmode = \"grid\"\ncell_size = 2.0").unwrap();

    geoburst()
        .arg("--config")
        .arg(file.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicates::str::contains("eps = 0.0125"))
        .stdout(predicates::str::contains("mode = \"grid\""));
}

#[test]
fn test_broken_env_config_warns_and_falls_back() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[detector\neps = ").unwrap();

    geoburst()
        .env("GEOBURST_CONFIG", file.path())
        .env_remove("RUST_LOG")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicates::str::contains("eps = 0.005"))
        .stderr(predicates::str::contains("GEOBURST_CONFIG set but file could not be loaded"));
}

#[test]
fn test_invalid_config_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[detector]\nmin_samples = 0").unwrap();

    geoburst()
        .arg("--config")
        .arg(file.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("min_samples"));
}

#[test]
fn test_bench_rejects_zero_workers() {
    geoburst()
        .args(["bench", "--workers", "0", "--total-packets", "10"])
        .assert()
        .failure();
}
