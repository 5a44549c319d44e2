use rstest::rstest;
use xystage_config::{PlatePreset, load_toml};

const MINIMAL: &str = r#"
[serial]
port = "/dev/ttyUSB0"
"#;

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(MINIMAL).expect("parse TOML");
    cfg.validate().expect("minimal config should pass");
    assert_eq!(cfg.serial.baud_rate, 38_400);
    assert_eq!(cfg.serial.response_timeout_ms, 1_000);
    assert_eq!(cfg.motion.motion_timeout_ms, 30_000);
    assert_eq!(cfg.motion.homing_timeout_ms, 60_000);
    assert_eq!(cfg.motion.origin_type, 3);
    assert_eq!(cfg.motion.speed_table, 8);
    assert!(!cfg.limits.enabled);
    assert!(cfg.plate.preset.is_none());
}

#[test]
fn missing_serial_section_is_a_parse_error() {
    assert!(load_toml("[motion]\npoll_interval_ms = 10\n").is_err());
}

#[test]
fn preset_names_parse() {
    let toml = r#"
[serial]
port = "COM3"

[plate]
preset = "384"
origin_x = 12.0
origin_y = 8.5
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.plate.preset, Some(PlatePreset::Wells384));
    assert_eq!(cfg.plate.origin_x, 12.0);
}

#[test]
fn explicit_geometry_without_preset_requires_all_fields() {
    let toml = r#"
[serial]
port = "COM3"

[plate]
rows = 4
cols = 6
well_spacing_x = 19.3
well_spacing_y = 19.3
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("diameter missing");
    assert!(format!("{err}").contains("plate.well_diameter is required"));
}

#[test]
fn plate_section_with_origin_only_keeps_default_geometry() {
    let toml = format!("{MINIMAL}\n[plate]\norigin_x = 14.38\norigin_y = 11.24\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("origin-only plate section is valid");
    assert!(cfg.plate.preset.is_none());
    assert!(!cfg.plate.has_explicit_geometry());
}

#[test]
fn missing_plate_section_validates() {
    let cfg = load_toml(MINIMAL).expect("parse TOML");
    assert!(!cfg.plate.has_explicit_geometry());
    assert!(cfg.plate.validate().is_ok());
}

#[rstest]
#[case("[plate]\npreset = \"96\"\nrows = 0\n", "plate.rows must be >= 1")]
#[case("[plate]\npreset = \"96\"\ncols = 0\n", "plate.cols must be >= 1")]
#[case("[plate]\npreset = \"96\"\nwell_diameter = -1.0\n", "plate.well_diameter must be a positive number")]
#[case("[plate]\npreset = \"96\"\nwell_spacing_x = 0.0\n", "plate.well_spacing_x must be a positive number")]
#[case("[motion]\npoll_interval_ms = 0\n", "motion.poll_interval_ms must be >= 1")]
#[case("[motion]\npoll_interval_ms = 100\nmotion_timeout_ms = 50\n", "motion.motion_timeout_ms must be >=")]
#[case("[motion]\nspeed_table = 10\n", "motion.speed_table must be in [0, 9]")]
#[case("[limits]\nenabled = true\nx_min = 10.0\nx_max = 5.0\ny_max = 1.0\n", "limits.x_min must be < limits.x_max")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be one of")]
fn rejects_invalid_values(#[case] section: &str, #[case] needle: &str) {
    let toml = format!("{MINIMAL}\n{section}");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "expected {needle:?} in {err}"
    );
}

#[test]
fn disabled_limits_are_not_checked() {
    let toml = format!("{MINIMAL}\n[limits]\nx_min = 10.0\nx_max = 5.0\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("disabled limits ignored");
}

#[test]
fn empty_port_rejected() {
    let cfg = load_toml("[serial]\nport = \"  \"\n").expect("parse TOML");
    let err = cfg.validate().expect_err("empty port");
    assert!(format!("{err}").contains("serial.port must not be empty"));
}
