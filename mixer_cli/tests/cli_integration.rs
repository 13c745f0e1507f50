use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

// Minimal valid config for the simulator with fast acks and a fast tick.
fn write_config(dir: &TempDir, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[channel]
kind = "sim"
sim_latency_ms = 1

[protocol]
ack_timeout_ms = 100

[runner]
tick_hz = 1000
{extra}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_recipe(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("recipe.toml");
    fs::write(&path, body).unwrap();
    path
}

const SHOT: &str = r#"
name = "shot"

[[steps]]
action = "tare"

[[steps]]
action = "dispense"
pump = 1
grams = 20

[[steps]]
action = "wait"
duration_ms = 5
"#;

const SLOW: &str = r#"
name = "slow"

[[steps]]
action = "wait"
duration_ms = 5000
"#;

fn mixer(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("mixer").unwrap();
    cmd.env_remove("MIXER_SIM_SILENT")
        .env_remove("MIXER_SIM_NOISE")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run"], 2, "required", "stderr")]
#[case(&["self-check"], 0, "OK", "stdout")]
#[case(&["health"], 0, "healthy (sim)", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let assert = mixer(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn runs_recipe_against_simulator() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let recipe = write_recipe(&dir, SHOT);
    mixer(&cfg)
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .assert()
        .success()
        .stdout(predicate::str::contains("recipe 'shot' complete: 3/3 steps, 2 commands"));
}

#[rstest]
#[case::silent("MIXER_SIM_SILENT", "1", 4, "did not acknowledge step 1 (tare)")]
#[case::noise("MIXER_SIM_NOISE", "x", 5, "with 'x' instead of 't'")]
fn machine_faults_map_to_exit_codes(
    #[case] var: &str,
    #[case] value: &str,
    #[case] code: i32,
    #[case] needle: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let recipe = write_recipe(&dir, SHOT);
    mixer(&cfg)
        .env(var, value)
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .assert()
        .code(code)
        .stdout(predicate::str::contains(needle));
}

#[rstest]
fn discard_mode_tolerates_noise() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    // rewrite with the mismatch policy under [protocol]
    let text = fs::read_to_string(&cfg)
        .unwrap()
        .replace("ack_timeout_ms = 100", "ack_timeout_ms = 100\non_mismatch = \"discard\"");
    fs::write(&cfg, text).unwrap();
    let recipe = write_recipe(&dir, SHOT);
    mixer(&cfg)
        .env("MIXER_SIM_NOISE", "x")
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .assert()
        .success()
        .stdout(predicate::str::contains("complete"));
}

#[rstest]
fn max_run_override_aborts() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let recipe = write_recipe(&dir, SLOW);
    mixer(&cfg)
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .arg("--max-run-ms")
        .arg("20")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("max run time"));
}

#[rstest]
fn continue_on_failure_reports_failed_steps() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let recipe = write_recipe(&dir, SHOT);
    mixer(&cfg)
        .env("MIXER_SIM_SILENT", "1")
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .arg("--continue-on-failure")
        .assert()
        .success()
        .stdout(predicate::str::contains("step 1 (tare) failed"))
        .stdout(predicate::str::contains("step 2 (dispense) failed"));
}

#[rstest]
fn continue_on_failure_still_stops_on_stray_ack() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let recipe = write_recipe(&dir, SHOT);
    mixer(&cfg)
        .env("MIXER_SIM_NOISE", "x")
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .arg("--continue-on-failure")
        .assert()
        .code(5)
        .stdout(predicate::str::contains("with 'x' instead of 't'"));
}

#[rstest]
fn json_success_line() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let recipe = write_recipe(&dir, SHOT);
    let out = mixer(&cfg)
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"recipe\""))
        .unwrap_or_else(|| panic!("no result line; stdout was: {stdout}"));
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert!(v.get("timestamp").and_then(|x| x.as_u64()).is_some());
    assert!(v.get("duration_ms").and_then(|x| x.as_u64()).is_some());
    assert_eq!(v["recipe"], "shot");
    assert_eq!(v["state"], "Completed");
    assert_eq!(v["completed"], 3);
    assert_eq!(v["commands_sent"], 2);
    assert!(v["failures"].as_array().is_some_and(|a| a.is_empty()));
    assert!(v.get("abort_reason").is_none());
}

#[rstest]
fn json_line_lists_continued_failures() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let recipe = write_recipe(&dir, SHOT);
    let out = mixer(&cfg)
        .env("MIXER_SIM_SILENT", "1")
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .arg("--continue-on-failure")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"recipe\""))
        .unwrap_or_else(|| panic!("no result line; stdout was: {stdout}"));
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["state"], "Completed");
    let failures = v["failures"].as_array().expect("failures array");
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0]["step"], 1);
    assert_eq!(failures[0]["action"], "tare");
    assert_eq!(failures[0]["kind"], "AckTimeout");
    assert_eq!(failures[1]["step"], 2);
    assert!(v.get("abort_reason").is_none());
}

#[rstest]
fn json_error_object() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let recipe = write_recipe(&dir, SHOT);
    let out = mixer(&cfg)
        .env("MIXER_SIM_SILENT", "1")
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .assert()
        .code(4)
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or_else(|| panic!("no error line; stdout was: {stdout}"));
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["reason"], "AckTimeout");
    assert_eq!(v["details"]["step"], 1);
    assert_eq!(v["details"]["action"], "tare");
    assert_eq!(v["details"]["ack_timeout_ms"], 100);
}

#[rstest]
fn invalid_recipe_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let recipe = write_recipe(
        &dir,
        "name = \"bad\"\n[[steps]]\naction = \"dispense\"\npump = 1\ngrams = 0\n",
    );
    mixer(&cfg)
        .arg("run")
        .arg("--recipe")
        .arg(&recipe)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("recipe could not be loaded"));
}

#[rstest]
fn device_without_path_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[channel]\nkind = \"device\"\n").unwrap();
    mixer(&cfg)
        .arg("self-check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Configuration is invalid"));
}

#[rstest]
fn missing_device_fails_self_check() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("no-such-tty");
    let cfg = dir.path().join("cfg.toml");
    fs::write(
        &cfg,
        format!("[channel]\nkind = \"device\"\npath = {:?}\n", missing.display().to_string()),
    )
    .unwrap();
    mixer(&cfg)
        .arg("self-check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Failed to open the device channel"));
}
