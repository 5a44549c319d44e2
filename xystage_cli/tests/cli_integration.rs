use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

// Simulated controller with fast polling so motion commands finish quickly
fn write_config(dir: &TempDir, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[serial]
port = "sim0"
response_timeout_ms = 50

[motion]
motion_timeout_ms = 2000
homing_timeout_ms = 2000
poll_interval_ms = 1

[logging]
level = "warn"
{extra}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn xystage(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("xystage").unwrap();
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["resolve", "--well", "H12"], 0, "x=99.000 y=63.000", "stdout")]
#[case(&["resolve", "--well", "a1", "--position", "top-right"], 0, "x=2.240 y=-2.240", "stdout")]
#[case(&["resolve", "--well", "Z99"], 3, "not on this plate", "stderr")]
#[case(&["resolve", "--well", "A1", "--position", "middle"], 2, "expected one of", "stderr")]
#[case(&["move-well", "--well", "B1"], 0, "at B1 center: x=0.000 y=9.000", "stdout")]
#[case(&["move-xy", "--x", "-1.5", "--y", "4"], 0, "at x=-1.500 y=4.000", "stdout")]
#[case(&["position"], 0, "x=0.000 y=0.000 well=A1", "stdout")]
#[case(&["home"], 0, "stage ready", "stdout")]
#[case(&["stop"], 0, "stop sent", "stdout")]
#[case(&["self-check"], 0, "OK: DS102 SIM", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let assert = xystage(&cfg).args(args).assert().code(exit_code);
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

#[test]
fn wells_lists_96_labels_row_major() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let out = xystage(&cfg).arg("wells").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let labels: Vec<&str> = stdout.lines().collect();
    assert_eq!(labels.len(), 96);
    assert_eq!(labels[..3], ["A1", "A2", "A3"]);
    assert_eq!(labels[12], "B1");
    assert_eq!(labels[95], "H12");
}

#[test]
fn wells_follow_plate_preset_as_json() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[plate]\npreset = \"384\"\n");
    let out = xystage(&cfg).args(["--json", "wells"]).output().unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["plate"], "384-well plate");
    assert_eq!(v["wells"].as_array().map(|a| a.len()), Some(384));
    assert_eq!(v["wells"][383], "P24");
}

#[test]
fn configured_origin_shifts_resolution() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[plate]\norigin_x = 14.38\norigin_y = 11.24\n");
    let out = xystage(&cfg)
        .args(["--json", "resolve", "--well", "A1"])
        .output()
        .unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["x"], 14.38);
    assert_eq!(v["y"], 11.24);
    assert_eq!(v["position"], "center");
}

#[test]
fn json_error_has_reason_and_code() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let out = xystage(&cfg)
        .args(["--json", "move-well", "--well", "Q1"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["reason"], "InvalidWell");
    assert_eq!(v["code"], 3);
}

#[test]
fn soft_limits_reject_with_range_code() {
    let dir = tempdir().unwrap();
    let cfg = write_config(
        &dir,
        "[limits]\nenabled = true\nx_min = 0.0\nx_max = 50.0\ny_min = 0.0\ny_max = 50.0\n",
    );
    xystage(&cfg)
        .args(["move-well", "--well", "H12"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("outside the soft travel limits"));
}

#[rstest]
#[case("XYSTAGE_TEST_SIM_SILENT", "1", 8, "Could not connect")]
#[case("XYSTAGE_TEST_SIM_NO_PORT", "1", 8, "no such device")]
#[case("XYSTAGE_TEST_SIM_FAIL_HOMING", "E03", 4, "cannot move")]
fn stage_faults_map_to_exit_codes(
    #[case] var: &str,
    #[case] value: &str,
    #[case] code: i32,
    #[case] needle: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    xystage(&cfg)
        .env(var, value)
        .args(["move-xy", "--x", "1", "--y", "1"])
        .assert()
        .code(code)
        .stderr(predicate::str::contains(needle));
}

#[test]
fn failed_homing_surfaces_from_home_command() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    xystage(&cfg)
        .env("XYSTAGE_TEST_SIM_FAIL_HOMING", "E03")
        .arg("home")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Homing failed"));
}

#[test]
fn visit_plan_runs_every_stop() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let plan = dir.path().join("plan.csv");
    fs::write(
        &plan,
        "well,position,dwell_ms\nA1,center,0\nB2,top_left,5\nH12,bottom_right,0\n",
    )
    .unwrap();
    xystage(&cfg)
        .arg("visit")
        .arg("--plan")
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains("[1/3] A1 center"))
        .stdout(predicate::str::contains("[3/3] H12 bottom_right: x=101.240 y=65.240"));
}

#[test]
fn visit_plan_with_bad_header_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let plan = dir.path().join("plan.csv");
    fs::write(&plan, "label,where\nA1,center\n").unwrap();
    xystage(&cfg)
        .arg("visit")
        .arg("--plan")
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers in visit plan CSV"));
}

#[test]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[serial]\nport = \"\"\n").unwrap();
    xystage(&cfg)
        .arg("wells")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("serial.port must not be empty"));
}

#[test]
fn missing_config_file_fails() {
    let mut cmd = Command::cargo_bin("xystage").unwrap();
    cmd.arg("--config")
        .arg("/nonexistent/xystage.toml")
        .arg("wells")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not read the config file"));
}
