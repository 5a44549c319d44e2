use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use rstest::rstest;
use xystage_core::{
    EDGE_OFFSET_FRACTION, GeometryError, PlateConfig, PlateGeometry, WellId, WellPosition,
};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[rstest]
#[case("A1", WellPosition::Center, 0.0, 0.0)]
#[case("B1", WellPosition::Center, 0.0, 9.0)]
#[case("A2", WellPosition::Center, 9.0, 0.0)]
#[case("A1", WellPosition::TopRight, 2.24, -2.24)]
#[case("A1", WellPosition::BottomLeft, -2.24, 2.24)]
#[case("C5", WellPosition::Left, 33.76, 18.0)]
#[case("H12", WellPosition::Center, 99.0, 63.0)]
fn standard_96_well_plate(
    #[case] label: &str,
    #[case] position: WellPosition,
    #[case] x: f64,
    #[case] y: f64,
) {
    let geo = PlateGeometry::new(PlateConfig::STANDARD_96_WELL).unwrap();
    let p = geo.resolve(label, position).unwrap();
    assert!(close(p.x, x) && close(p.y, y), "{label} {position}: got {p}");
}

#[rstest]
#[case("Z99")]
#[case("I1")]
#[case("A13")]
#[case("well")]
fn invalid_wells_are_rejected(#[case] label: &str) {
    let geo = PlateGeometry::default();
    assert!(matches!(
        geo.resolve(label, WellPosition::Center),
        Err(GeometryError::InvalidWell { .. })
    ));
}

#[rstest]
#[case(PlateConfig::STANDARD_24_WELL, 24)]
#[case(PlateConfig::STANDARD_96_WELL, 96)]
#[case(PlateConfig::STANDARD_384_WELL, 384)]
fn presets_validate_and_enumerate(#[case] cfg: PlateConfig, #[case] count: usize) {
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.name(), format!("{count}-well plate"));
    let geo = PlateGeometry::new(cfg).unwrap();
    assert_eq!(geo.list_wells().len(), count);
    assert_eq!(geo.list_wells().count(), count);
}

#[test]
fn list_wells_96_is_row_major() {
    let labels: Vec<String> = PlateGeometry::default()
        .list_wells()
        .map(|w| w.to_string())
        .collect();
    assert_eq!(labels.len(), 96);
    assert_eq!(&labels[..3], ["A1", "A2", "A3"]);
    assert_eq!(labels[11], "A12");
    assert_eq!(labels[12], "B1");
    assert_eq!(labels[95], "H12");
}

#[rstest]
#[case(PlateConfig { rows: 0, ..PlateConfig::STANDARD_96_WELL })]
#[case(PlateConfig { cols: 0, ..PlateConfig::STANDARD_96_WELL })]
#[case(PlateConfig { well_spacing_x: 0.0, ..PlateConfig::STANDARD_96_WELL })]
#[case(PlateConfig { well_spacing_y: -9.0, ..PlateConfig::STANDARD_96_WELL })]
#[case(PlateConfig { well_diameter: f64::NAN, ..PlateConfig::STANDARD_96_WELL })]
#[case(PlateConfig { origin_x: f64::INFINITY, ..PlateConfig::STANDARD_96_WELL })]
fn reconfigure_rejects_invalid_and_keeps_previous(#[case] bad: PlateConfig) {
    let geo = PlateGeometry::default();
    assert!(matches!(
        geo.reconfigure(bad),
        Err(GeometryError::InvalidConfig(_))
    ));
    assert_eq!(*geo.config(), PlateConfig::STANDARD_96_WELL);
}

#[test]
fn set_origin_shifts_every_well() {
    let geo = PlateGeometry::default();
    let before = geo.resolve("D7", WellPosition::Center).unwrap();
    let origin = geo.set_origin(14.38, 11.24);
    assert_eq!((origin.x, origin.y), (14.38, 11.24));
    let after = geo.resolve("D7", WellPosition::Center).unwrap();
    assert!(close(after.x - before.x, 14.38));
    assert!(close(after.y - before.y, 11.24));
    assert_eq!(geo.config().rows, 8);
}

#[test]
fn snapshot_taken_before_swap_is_unaffected() {
    let geo = PlateGeometry::default();
    let snap = geo.config();
    geo.reconfigure(PlateConfig::STANDARD_384_WELL).unwrap();
    assert_eq!(snap.rows, 8);
    assert_eq!(geo.config().rows, 16);
    assert!(geo.resolve("P24", WellPosition::Center).is_ok());
}

#[test]
fn concurrent_readers_never_see_mixed_configs() {
    // Each config puts A2 at a distinct x; a torn read would mix origin and spacing.
    let geo = Arc::new(PlateGeometry::default());
    let a = PlateConfig::STANDARD_96_WELL;
    let b = PlateConfig {
        origin_x: 100.0,
        well_spacing_x: 4.5,
        ..PlateConfig::STANDARD_96_WELL
    };
    let writer = {
        let geo = Arc::clone(&geo);
        let (a, b) = (a.clone(), b.clone());
        thread::spawn(move || {
            for i in 0..2_000 {
                let next = if i % 2 == 0 { b.clone() } else { a.clone() };
                geo.reconfigure(next).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let geo = Arc::clone(&geo);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    let x = geo.resolve("A2", WellPosition::Center).unwrap().x;
                    assert!(x == 9.0 || x == 104.5, "torn read: {x}");
                }
            })
        })
        .collect();
    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
}

fn arb_plate() -> impl Strategy<Value = PlateConfig> {
    (
        1u32..40,
        1u32..40,
        0.5f64..30.0,
        0.5f64..30.0,
        0.1f64..20.0,
        -200.0f64..200.0,
        -200.0f64..200.0,
    )
        .prop_map(|(rows, cols, sx, sy, d, ox, oy)| PlateConfig {
            rows,
            cols,
            well_spacing_x: sx,
            well_spacing_y: sy,
            well_diameter: d,
            origin_x: ox,
            origin_y: oy,
        })
}

fn arb_plate_and_well() -> impl Strategy<Value = (PlateConfig, WellId)> {
    arb_plate().prop_flat_map(|cfg| {
        let (rows, cols) = (cfg.rows, cfg.cols);
        (Just(cfg), 1..=rows, 1..=cols).prop_map(|(cfg, r, c)| (cfg, WellId::new(r, c)))
    })
}

proptest! {
    #[test]
    fn center_is_exact_grid_point((cfg, well) in arb_plate_and_well()) {
        let geo = PlateGeometry::new(cfg.clone()).unwrap();
        let p = geo.resolve(&well.to_string(), WellPosition::Center).unwrap();
        prop_assert_eq!(p.x, cfg.origin_x + f64::from(well.col - 1) * cfg.well_spacing_x);
        prop_assert_eq!(p.y, cfg.origin_y + f64::from(well.row - 1) * cfg.well_spacing_y);
    }

    #[test]
    fn edge_offsets_have_fixed_magnitude_and_named_sign(
        (cfg, well) in arb_plate_and_well(),
        idx in 0usize..WellPosition::ALL.len(),
    ) {
        let position = WellPosition::ALL[idx];
        let geo = PlateGeometry::new(cfg.clone()).unwrap();
        let c = geo.resolve_well(&well, WellPosition::Center).unwrap();
        let p = geo.resolve_well(&well, position).unwrap();
        let off = EDGE_OFFSET_FRACTION * cfg.well_diameter / 2.0;
        let name = position.as_str();
        let expect_x = if name.contains("left") { -off } else if name.contains("right") { off } else { 0.0 };
        let expect_y = if name.contains("top") { -off } else if name.contains("bottom") { off } else { 0.0 };
        prop_assert!((p.x - c.x - expect_x).abs() < 1e-9);
        prop_assert!((p.y - c.y - expect_y).abs() < 1e-9);
    }

    #[test]
    fn resolve_is_pure((cfg, well) in arb_plate_and_well()) {
        let geo = PlateGeometry::new(cfg).unwrap();
        let label = well.to_string();
        prop_assert_eq!(
            geo.resolve(&label, WellPosition::BottomRight).unwrap(),
            geo.resolve(&label, WellPosition::BottomRight).unwrap()
        );
    }

    #[test]
    fn well_at_inverts_center((cfg, well) in arb_plate_and_well()) {
        let geo = PlateGeometry::new(cfg).unwrap();
        let c = geo.resolve_well(&well, WellPosition::Center).unwrap();
        prop_assert_eq!(geo.well_at(c.x, c.y), Some(well));
    }

    #[test]
    fn labels_round_trip_case_insensitively((cfg, well) in arb_plate_and_well()) {
        let geo = PlateGeometry::new(cfg).unwrap();
        let lower = format!("  {}\t", well.to_string().to_lowercase());
        prop_assert_eq!(geo.parse_well(&lower).unwrap(), well);
    }

    #[test]
    fn parser_never_panics(s in "\\PC{0,12}") {
        let _ = s.parse::<WellId>();
    }
}
