#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate must reject bad input without panicking, and any
    // config that validates must yield a usable plate geometry.
    if let Ok(cfg) = toml::from_str::<xystage_config::Config>(data) {
        if cfg.validate().is_ok() {
            let plate = xystage_core::PlateConfig::from(&cfg.plate);
            assert!(xystage_core::PlateGeometry::new(plate).is_ok());
        }
    }
});
