//! Digidata Hardware Smoke Test Suite
//!
//! Smoke tests against a real Digidata 1322A through `AxDD132x.dll`.
//!
//! # Environment Variables
//!
//! Required:
//! - `DIGIDATA_SMOKE_TEST=1` - Enable the test suite
//!
//! Optional:
//! - `DIGIDATA_ADAPTOR` / `DIGIDATA_TARGET` - Board address (default: first board found)
//! - `AXDD132X_LIB_DIR` - Directory holding `AxDD132x.lib`
//!
//! # Running
//!
//! ```bash
//! export DIGIDATA_SMOKE_TEST=1
//! cargo nextest run --profile hardware --features hardware -p daq-driver-digidata -- hardware_smoke
//! ```
//!
//! # Test Coverage
//!
//! | Test | Description |
//! |------|-------------|
//! | `device_discovery_test` | Enumerate boards and open one |
//! | `device_info_test` | Identity strings and buffer sizes are populated |
//! | `calibration_data_test` | Stored calibration reads back with a DAC count |
//! | `analog_input_single_read_test` | Read AI0 as counts and volts |
//! | `short_acquisition_test` | 1000 scans on AI0 stop at the terminal count |

#![cfg(feature = "hardware")]

use std::env;
use std::time::Duration;

use daq_driver_digidata::{
    Acquisition, BufferList, Digidata, Protocol, ProtocolFlags, Scaling,
};

// =============================================================================
// Test Configuration
// =============================================================================

/// Check if smoke test is enabled via environment variable
fn smoke_test_enabled() -> bool {
    env::var("DIGIDATA_SMOKE_TEST")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Board address from the environment, if set
fn board_address() -> Option<(u8, u8)> {
    let adaptor = env::var("DIGIDATA_ADAPTOR").ok()?.parse().ok()?;
    let target = env::var("DIGIDATA_TARGET").ok()?.parse().ok()?;
    Some((adaptor, target))
}

fn open_device() -> Digidata {
    let device = match board_address() {
        Some((adaptor, target)) => Digidata::open(adaptor, target),
        None => Digidata::open_first(),
    };
    device.expect("Failed to open Digidata")
}

/// Skip test with message if smoke test not enabled
macro_rules! skip_if_disabled {
    () => {
        if !smoke_test_enabled() {
            println!("Digidata smoke test skipped (set DIGIDATA_SMOKE_TEST=1 to enable)");
            return;
        }
    };
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn device_discovery_test() {
    skip_if_disabled!();

    let devices = Digidata::find_devices(8).expect("Enumeration failed");
    println!("Found {} device(s)", devices.len());
    for info in &devices {
        println!("  {info}");
    }
    assert!(!devices.is_empty(), "No Digidata found on the SCSI bus");

    let device = open_device();
    println!("Opened adaptor {}, target {}", device.adaptor(), device.target());
}

#[test]
fn device_info_test() {
    skip_if_disabled!();

    let info = open_device().info().expect("Failed to read device info");
    println!("{info:#?}");
    assert!(!info.name.is_empty());
    assert!(info.input_buffer_size > 0);
    assert!(info.min_clock_ticks <= info.max_clock_ticks);
}

#[test]
fn calibration_data_test() {
    skip_if_disabled!();

    let calibration = open_device()
        .calibration_data()
        .expect("Failed to read calibration data");
    println!("{calibration:#?}");
    assert!(calibration.dac_count > 0);
}

#[test]
fn analog_input_single_read_test() {
    skip_if_disabled!();

    let counts = open_device().read_ai(0).expect("Failed to read AI0");
    println!("AI0: {counts} counts = {:.4} V", Scaling::BOARD.counts_to_volts(counts));
}

#[test]
fn short_acquisition_test() {
    skip_if_disabled!();

    let device = open_device();
    let protocol = Protocol::builder()
        .sample_interval_us(100.0)
        .ai_channels(&[0])
        .flags(ProtocolFlags::STOP_ON_TC)
        .terminal_count(1000)
        .build()
        .expect("Invalid protocol");
    let input = BufferList::new(1000, 4).expect("Failed to allocate buffers");

    let mut acquisition =
        Acquisition::new(&device, protocol, Some(input), None).expect("Protocol rejected");
    acquisition.start().expect("Failed to start");
    let position = acquisition
        .wait_for_completion(Duration::from_secs(5))
        .expect("Acquisition did not complete");
    let data = acquisition.finish().expect("Failed to finish");

    println!("Acquired {position} samples, start {:?}", data.start_time);
    assert_eq!(data.input.len(), 1000);
}
