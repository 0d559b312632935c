//! Digidata Error Handling Test Suite
//!
//! Validates that driver failures surface as typed errors with the driver's
//! own description attached, and that resources are released on error paths.
//!
//! # Test Coverage
//!
//! | Test | Description |
//! |------|-------------|
//! | `test_device_not_found` | Open an empty address, open with no boards |
//! | `test_injected_errors_carry_detail` | Driver code and last-error text reach the caller |
//! | `test_transport_errors` | SCSI band codes are classified as transport errors |
//! | `test_vendor_driver_not_built_in` | Default-feature builds report a typed error instead of calling the DLL |
//! | `test_enumeration_failure` | Failures before a handle exists carry no detail |
//! | `test_protocol_rejected_while_running` | Set protocol during acquisition fails cleanly |
//! | `test_closed_device` | Calls after close fail without reaching the driver |
//! | `test_failed_acquisition_releases_buffers` | Rejected protocol leaves the board usable |

use std::sync::Arc;

use axdd132x_sys as sys;
use daq_driver_digidata::{
    Acquisition, BufferList, Digidata, DigidataError, ErrorCode, MockDriver, MockOperation,
    Protocol, SdkDriver,
};

fn open_mock() -> (Arc<MockDriver>, Digidata) {
    let mock = Arc::new(MockDriver::new());
    let device = Digidata::open_first_with(mock.clone()).expect("open simulated board");
    (mock, device)
}

#[test]
fn test_device_not_found() {
    let mock = Arc::new(MockDriver::new());
    let err = Digidata::open_with(mock, 4, 4).unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("adaptor 4, target 4"));

    let err = Digidata::open_first_with(Arc::new(MockDriver::with_boards(0))).unwrap_err();
    assert!(matches!(err, DigidataError::NoDevices));
}

#[test]
fn test_injected_errors_carry_detail() {
    let (mock, device) = open_mock();

    let cases = [
        (MockOperation::ReadAnalog, sys::DD132X_ERROR_READDATA, ErrorCode::ReadData),
        (MockOperation::WriteDigital, sys::DD132X_ERROR_WRITEDATA, ErrorCode::WriteData),
        (MockOperation::TerminalRead, sys::DD132X_ERROR_DTERM_READ, ErrorCode::TerminalRead),
    ];
    for (operation, raw, expected) in cases {
        mock.inject_error(operation, raw);
        let err = match operation {
            MockOperation::ReadAnalog => device.read_ai(0).map(drop).unwrap_err(),
            MockOperation::WriteDigital => device.write_do(1).unwrap_err(),
            _ => device.dterm_read().map(drop).unwrap_err(),
        };
        assert_eq!(err.code(), Some(expected));
        let message = err.to_string();
        assert!(message.contains(expected.description()), "{message}");
        assert!(message.contains("Simulated board"), "{message}");
    }

    // one-shot: the next call succeeds
    assert!(device.read_ai(0).is_ok());
    assert!(device.last_error_text().unwrap().contains("terminal read failed"));
}

#[test]
fn test_transport_errors() {
    let (mock, device) = open_mock();
    mock.inject_error(MockOperation::StartAcquisition, sys::DD132X_ERROR_ASPIERROR + 2);
    let protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
    device.set_protocol(&protocol).unwrap();

    let err = device.start_acquisition().unwrap_err();
    assert!(err.is_transport());
    assert_eq!(err.code(), Some(ErrorCode::Transport(2)));
    assert!(!device.is_acquiring().unwrap());
}

#[test]
fn test_vendor_driver_not_built_in() {
    if sys::SDK_LINKED {
        return;
    }
    assert!(matches!(Digidata::rescan_bus(), Err(DigidataError::DriverUnavailable)));
    assert!(matches!(Digidata::find_devices(u32::MAX), Err(DigidataError::DriverUnavailable)));
    assert!(matches!(Digidata::open(1, 0), Err(DigidataError::DriverUnavailable)));
    assert!(matches!(Digidata::open_first(), Err(DigidataError::DriverUnavailable)));

    // The backend itself refuses too, so a handle can never be obtained.
    let err = Digidata::open_with(Arc::new(SdkDriver), 1, 0).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::CantComplete));
}

#[test]
fn test_enumeration_failure() {
    let mock = Arc::new(MockDriver::new());
    mock.inject_error(MockOperation::FindDevices, sys::DD132X_ERROR_ASPINOTFOUND);
    match Digidata::find_devices_with(mock, 4) {
        Err(DigidataError::Driver { code, detail, .. }) => {
            assert_eq!(code, ErrorCode::AspiNotFound);
            assert!(detail.is_none());
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_protocol_rejected_while_running() {
    let (_mock, device) = open_mock();
    let protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
    device.set_protocol(&protocol).unwrap();
    device.start_acquisition().unwrap();

    let err = device.set_protocol(&protocol).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::SetAiProtocol));

    let err = device.calibrate().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::Calibration));
    device.stop_acquisition().unwrap();
    assert!(device.calibrate().is_ok());
}

#[test]
fn test_closed_device() {
    let (mock, device) = open_mock();
    let clone = device.clone();
    device.close().unwrap();
    assert_eq!(mock.open_handles(), 0);
    assert!(clone.is_closed());
    assert!(matches!(clone.read_ai(0), Err(DigidataError::DeviceClosed)));
    assert!(matches!(clone.is_acquiring(), Err(DigidataError::DeviceClosed)));
}

#[test]
fn test_failed_acquisition_releases_buffers() {
    let (mock, device) = open_mock();
    mock.inject_error(MockOperation::SetProtocol, sys::DD132X_ERROR_SETAIPROTOCOL);

    let protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
    let input = BufferList::new(64, 2).unwrap();
    let err = Acquisition::new(&device, protocol.clone(), Some(input), None).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::SetAiProtocol));

    let input = BufferList::new(64, 2).unwrap();
    let acquisition = Acquisition::new(&device, protocol, Some(input), None).unwrap();
    drop(acquisition);
    assert!(!device.is_acquiring().unwrap());
}
