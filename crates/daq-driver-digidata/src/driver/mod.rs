//! Backend seam between the safe layer and the vendor driver.
//!
//! [`DriverApi`] mirrors the `DD132X_*` control surface one call for one,
//! but in Rust terms: records go in and out by value, and a failed call
//! yields the raw error code the driver wrote. The safe layer in
//! [`crate::device`] owns handle lifetime, locking and error translation,
//! so a backend only has to forward calls.
//!
//! Two backends ship with the crate:
//!
//! - [`SdkDriver`] calls `axdd132x-sys` (the real DLL with the `hardware`
//!   feature, panicking stubs otherwise).
//! - [`MockDriver`] simulates a board in memory for tests and demos.

mod mock;
mod sdk;

pub use mock::{MockDriver, MockOperation};
pub use sdk::SdkDriver;

use std::ffi::CStr;
use std::os::raw::c_int;

use axdd132x_sys::{
    DD132X_CalibrationData, DD132X_Info, DD132X_PowerOnData, DD132X_Protocol,
    DD132X_StartAcqInfo,
};

/// Outcome of a raw driver call: the error is the code written to `pnError`.
pub type RawResult<T> = std::result::Result<T, c_int>;

/// Backend-neutral device handle.
///
/// For [`SdkDriver`] this is the `HDD132X` pointer value; for
/// [`MockDriver`] it is an index into its open-handle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

/// The `DD132X_*` entry points, one method per call.
///
/// Methods taking a handle may assume it came from [`DriverApi::open_device`]
/// on the same backend and has not been closed.
pub trait DriverApi: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &'static str;

    fn rescan_scsi_bus(&self) -> RawResult<()>;

    /// Enumerate up to `max_devices` boards.
    fn find_devices(&self, max_devices: u32) -> RawResult<Vec<DD132X_Info>>;

    /// Open a board, optionally loading a RAMware image first.
    fn open_device(&self, adaptor: u8, target: u8, ramware: Option<&[u8]>) -> RawResult<RawHandle>;

    fn close_device(&self, handle: RawHandle) -> RawResult<()>;

    fn get_device_info(&self, handle: RawHandle) -> RawResult<DD132X_Info>;

    fn reset(&self, handle: RawHandle) -> RawResult<()>;

    fn download_ramware(&self, handle: RawHandle, image: &[u8]) -> RawResult<()>;

    /// Hand a protocol to the driver.
    ///
    /// # Safety
    ///
    /// The `DATABUFFER` chains referenced by `protocol` are written to (AI)
    /// and read from (AO) asynchronously. They must stay valid until the
    /// acquisition is stopped and another protocol without buffers has been
    /// set, or the device has been closed.
    unsafe fn set_protocol(&self, handle: RawHandle, protocol: &DD132X_Protocol) -> RawResult<()>;

    fn get_protocol(&self, handle: RawHandle) -> RawResult<DD132X_Protocol>;

    fn start_acquisition(&self, handle: RawHandle) -> RawResult<()>;

    fn stop_acquisition(&self, handle: RawHandle) -> RawResult<()>;

    fn pause_acquisition(&self, handle: RawHandle, pause: bool) -> RawResult<()>;

    fn is_acquiring(&self, handle: RawHandle) -> bool;

    fn is_paused(&self, handle: RawHandle) -> bool;

    /// `None` when the driver returns FALSE.
    fn time_at_start_of_acquisition(&self, handle: RawHandle) -> Option<DD132X_StartAcqInfo>;

    fn start_read_last(&self, handle: RawHandle) -> RawResult<()>;

    /// Fill `samples` with the most recent samples.
    fn read_last(&self, handle: RawHandle, samples: &mut [i16]) -> RawResult<()>;

    fn acquisition_position(&self, handle: RawHandle) -> RawResult<i64>;

    fn num_samples_output(&self, handle: RawHandle) -> RawResult<i64>;

    fn get_ai_value(&self, handle: RawHandle, channel: u32) -> RawResult<i16>;

    fn get_di_values(&self, handle: RawHandle) -> RawResult<u32>;

    fn put_ao_value(&self, handle: RawHandle, channel: u32, value: i16) -> RawResult<()>;

    fn put_do_values(&self, handle: RawHandle, values: u32) -> RawResult<()>;

    /// Read `values.len()` telegraph channels starting at `first_channel`.
    fn get_telegraphs(&self, handle: RawHandle, first_channel: u32, values: &mut [i16]) -> RawResult<()>;

    fn set_power_on_outputs(&self, handle: RawHandle, data: &DD132X_PowerOnData) -> RawResult<()>;

    fn get_power_on_outputs(&self, handle: RawHandle) -> RawResult<DD132X_PowerOnData>;

    fn calibrate(&self, handle: RawHandle) -> RawResult<DD132X_CalibrationData>;

    fn get_calibration_data(&self, handle: RawHandle) -> RawResult<DD132X_CalibrationData>;

    fn get_scsi_term_status(&self, handle: RawHandle) -> RawResult<u8>;

    /// Read up to `max_len` bytes (terminator included) from the terminal.
    fn dterm_read(&self, handle: RawHandle, max_len: usize) -> RawResult<Vec<u8>>;

    fn dterm_write(&self, handle: RawHandle, text: &CStr) -> RawResult<()>;

    fn dterm_set_baud_rate(&self, handle: RawHandle, baud_rate: u32) -> RawResult<()>;

    /// Text describing the last error on `handle`.
    fn get_last_error_text(&self, handle: RawHandle, max_len: usize) -> RawResult<String>;

    fn set_debug_msg_level(&self, handle: RawHandle, level: u32) -> RawResult<()>;

    /// FALSE from the driver maps to `false`.
    fn update_threshold_level(&self, handle: RawHandle, threshold: u16, hysteresis: u16) -> bool;
}

/// Decode a NUL-terminated byte buffer filled by the driver.
pub(crate) fn c_buffer_to_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_buffer_to_string() {
        assert_eq!(c_buffer_to_string(b"Axon\0garbage"), "Axon");
        assert_eq!(c_buffer_to_string(b"no terminator"), "no terminator");
        assert_eq!(c_buffer_to_string(b"\0"), "");
    }

    #[test]
    fn test_drivers_are_object_safe() {
        let drivers: Vec<Box<dyn DriverApi>> = vec![Box::new(MockDriver::new()), Box::new(SdkDriver)];
        assert_eq!(drivers[0].name(), "mock");
        assert_eq!(drivers[1].name(), "axdd132x");
    }
}
