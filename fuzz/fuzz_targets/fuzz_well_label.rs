#![no_main]
use libfuzzer_sys::fuzz_target;
use xystage_core::{PlateGeometry, WellPosition};

fuzz_target!(|data: &str| {
    let geo = PlateGeometry::default();
    if let Ok(id) = geo.parse_well(data) {
        // anything accepted must render back to an equivalent label
        let again = geo.parse_well(&id.to_string()).expect("canonical label parses");
        assert_eq!(again, id);
        let p = geo.resolve(data, WellPosition::TopLeft).expect("parsed well resolves");
        assert!(p.x.is_finite() && p.y.is_finite());
    }
});
