//! Shipped Configuration Tests
//!
//! Checks that `config/digidata.toml` loads, validates and builds a working
//! board layout against the simulated driver.
//!
//! ## Test Coverage
//!
//! 1. **Load and validate**: sample file parses with every section filled
//! 2. **Board from config**: aliases resolve and single-shot I/O works
//! 3. **Bad board section**: alias loops are reported at validation time

use std::sync::Arc;

use daq_driver_digidata::{Digidata, MockDriver};
use digidata_daq::config::{AppConfig, DEFAULT_CONFIG_PATH};
use serial_test::serial;

#[test]
#[serial]
fn test_shipped_config_is_valid() {
    let config = AppConfig::load_from(DEFAULT_CONFIG_PATH).unwrap();
    config.validate().unwrap();

    assert_eq!(config.device.debug_level, "none");
    assert!(config.board.analog_inputs.contains_key("Vm"));
    assert_eq!(config.board.digital_outputs["trigger"], 0);
    assert_eq!(config.board_config().chunks_per_second, Some(20));
}

#[test]
#[serial]
fn test_board_from_shipped_config() {
    let config = AppConfig::load_from(DEFAULT_CONFIG_PATH).unwrap();
    let mock = Arc::new(MockDriver::new());
    let device = Digidata::open_first_with(mock.clone()).unwrap();
    let board = config.board_config().build(device).unwrap();

    assert_eq!(board.resolve("command").unwrap(), "Vc");
    // AO 0 loops back to AI 0: 50 units * 0.02 V = 1 V, read back at 0.01 V/unit.
    board.write("command", 50.0).unwrap();
    let measured = board.read("voltage").unwrap();
    assert!((measured - 100.0).abs() < 0.1, "{measured}");

    board.write("trigger", 1.0).unwrap();
    assert_eq!(mock.digital_outputs(0), Some(1));
}

#[test]
fn test_alias_loop_rejected() {
    let mut config = AppConfig::default();
    config.board.aliases.insert("a".to_string(), "b".to_string());
    config.board.aliases.insert("b".to_string(), "a".to_string());

    let err = config.validate().unwrap_err();
    assert!(err.to_lowercase().contains("alias"), "{err}");
}
