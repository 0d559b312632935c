//! Digidata Device Lifecycle Test Suite
//!
//! Exercises the safe device layer end to end against the simulated driver.
//!
//! # Test Coverage
//!
//! | Test | Description |
//! |------|-------------|
//! | `test_discovery_and_open` | Enumerate boards, open by address and first |
//! | `test_exclusive_open` | A second open of the same board fails |
//! | `test_protocol_roundtrip` | Set a protocol, read it back unchanged |
//! | `test_single_shot_io` | AO→AI loopback, digital words, telegraphs |
//! | `test_power_on_outputs` | Store and reload power-on defaults |
//! | `test_calibration` | Calibrate and read back calibration data |
//! | `test_terminal` | Terminal echo and baud rate |
//! | `test_diagnostics` | Debug level, threshold, SCSI terminator, rescan |
//! | `test_reset_restores_power_on_outputs` | Reset applies stored defaults |

use std::sync::Arc;

use daq_driver_digidata::{
    AoChannel, DebugLevel, Digidata, DigidataError, EquipmentStatus, MockDriver, OutputPulse,
    OutputPulseType, PowerOnOutputs, Protocol, ProtocolFlags, Triggering,
};

// =============================================================================
// Helpers
// =============================================================================

fn open_mock() -> (Arc<MockDriver>, Digidata) {
    let mock = Arc::new(MockDriver::new());
    let device = Digidata::open_first_with(mock.clone()).expect("open simulated board");
    (mock, device)
}

// =============================================================================
// Discovery
// =============================================================================

#[test]
fn test_discovery_and_open() {
    let mock = Arc::new(MockDriver::with_boards(3));

    let devices = Digidata::find_devices_with(mock.clone(), 8).unwrap();
    assert_eq!(devices.len(), 3);
    assert_eq!(
        devices.iter().map(|d| d.target).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(Digidata::find_devices_with(mock.clone(), 2).unwrap().len(), 2);

    let device = Digidata::open_with(mock.clone(), 1, 2).unwrap();
    let info = device.info().unwrap();
    assert_eq!(info.serial_number, 132_202);
    assert_eq!(info.name, "Digidata 1322A (simulated)");
    assert_eq!(device.driver_name(), "mock");
    assert!(info.to_string().contains("adaptor 1, target 2"));

    let first = Digidata::open_first_with(mock.clone()).unwrap();
    assert_eq!(first.target(), 0);
    assert_eq!(mock.open_handles(), 2);
}

#[test]
fn test_exclusive_open() {
    let (mock, device) = open_mock();
    let second = Digidata::open_with(mock.clone(), 1, 0);
    assert!(matches!(second, Err(DigidataError::Driver { operation: "open_device", .. })));

    drop(device);
    assert!(Digidata::open_with(mock, 1, 0).is_ok());
}

// =============================================================================
// Protocol
// =============================================================================

#[test]
fn test_protocol_roundtrip() {
    let (_mock, device) = open_mock();
    let protocol = Protocol::builder()
        .sample_interval_us(25.0)
        .ai_channels(&[0, 3, 15])
        .ao_channels(&[AoChannel::Analog(1), AoChannel::Digital, AoChannel::Null])
        .flags(ProtocolFlags::STOP_ON_TC)
        .triggering(Triggering::External)
        .terminal_count(30_000)
        .output_pulse(OutputPulse {
            kind: OutputPulseType::AdcLevel,
            positive: true,
            channel: 3,
            threshold: 1000,
            hysteresis: 50,
        })
        .chunks_per_second(10)
        .build()
        .unwrap();

    device.set_protocol(&protocol).unwrap();
    assert_eq!(device.protocol().unwrap(), protocol);
}

#[test]
fn test_invalid_protocol_rejected_before_driver() {
    let (_mock, device) = open_mock();
    let mut protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
    protocol.ai_channels = vec![16];
    assert!(matches!(
        device.set_protocol(&protocol),
        Err(DigidataError::InvalidChannel { channel: 16, .. })
    ));
    protocol.ai_channels = vec![0; 65];
    assert!(matches!(
        device.set_protocol(&protocol),
        Err(DigidataError::ScanListTooLong { len: 65, max: 64 })
    ));
}

// =============================================================================
// Single-shot I/O
// =============================================================================

#[test]
fn test_single_shot_io() {
    let (mock, device) = open_mock();

    device.write_ao(2, -1234).unwrap();
    assert_eq!(device.read_ai(2).unwrap(), -1234);
    assert_eq!(mock.analog_output(0, 2), Some(-1234));

    mock.set_ai_level(2, 77);
    assert_eq!(device.read_ai(2).unwrap(), 77);

    mock.set_digital_inputs(0xA5);
    assert_eq!(device.read_di().unwrap(), 0xA5);
    device.write_do(0x0F0F).unwrap();
    assert_eq!(mock.digital_outputs(0), Some(0x0F0F));

    mock.set_telegraph(4, 500);
    mock.set_telegraph(5, -500);
    assert_eq!(device.read_telegraphs(4, 2).unwrap(), vec![500, -500]);
}

#[test]
fn test_power_on_outputs() {
    let (_mock, device) = open_mock();
    let outputs = PowerOnOutputs::new(0b11, &[1000, -1000, 5]).unwrap();
    device.set_power_on_outputs(&outputs).unwrap();
    assert_eq!(device.power_on_outputs().unwrap(), outputs);
}

#[test]
fn test_reset_restores_power_on_outputs() {
    let (mock, device) = open_mock();
    device
        .set_power_on_outputs(&PowerOnOutputs::new(0x3, &[0, 2000]).unwrap())
        .unwrap();
    device.write_ao(1, -5).unwrap();
    device.write_do(0xFF).unwrap();

    device.reset().unwrap();
    assert_eq!(mock.analog_output(0, 1), Some(2000));
    assert_eq!(mock.digital_outputs(0), Some(0x3));
}

// =============================================================================
// Calibration and diagnostics
// =============================================================================

#[test]
fn test_calibration() {
    let (_mock, device) = open_mock();
    let calibrated = device.calibrate().unwrap();
    assert_eq!(calibrated.dac_count, 2);
    assert_eq!(calibrated.dacs().count(), 2);
    assert_eq!(calibrated.equipment_status, EquipmentStatus::empty());
    assert_eq!(device.calibration_data().unwrap(), calibrated);
}

#[test]
fn test_terminal() {
    let (mock, device) = open_mock();
    device.dterm_write("ID?\r").unwrap();
    assert_eq!(device.dterm_read().unwrap(), "ID?\r");
    assert_eq!(device.dterm_read().unwrap(), "");

    device.dterm_set_baud_rate(19200).unwrap();
    assert_eq!(mock.terminal_baud_rate(0), Some(19200));
    assert!(device.dterm_set_baud_rate(12345).is_err());
    assert!(device.dterm_write("bad\0text").is_err());
}

#[test]
fn test_diagnostics() {
    let (mock, device) = open_mock();

    device.set_debug_level(DebugLevel::ShowAll).unwrap();
    assert_eq!(mock.debug_level(0), Some(0));

    device.update_threshold_level(1200, 40).unwrap();
    assert_eq!(mock.threshold_level(0), Some((1200, 40)));

    mock.set_scsi_terminator(0);
    assert_eq!(device.scsi_terminator_status().unwrap(), 0);

    Digidata::rescan_bus_with(mock.clone()).unwrap();
    assert_eq!(mock.rescan_count(), 1);

    assert!(device.last_error_text().unwrap().is_empty());
}
