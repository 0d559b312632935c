//! Core device abstraction for the Digidata 1322A.
//!
//! This module provides the main [`Digidata`] type, which wraps a driver
//! handle with RAII semantics and exposes every driver operation as a safe
//! method returning [`Result`].

use std::ffi::CString;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use axdd132x_sys as sys;
use axdd132x_sys::{record_length, DD132X_Info, DD132X_Protocol};

use crate::acquisition::StartTime;
use crate::calibration::{CalibrationData, PowerOnOutputs};
use crate::driver::{c_buffer_to_string, DriverApi, RawHandle, RawResult, SdkDriver};
use crate::error::{DigidataError, Result};
use crate::protocol::{Protocol, AI_CHANNELS, AO_CHANNELS};

/// Buffer size used when fetching the driver's last error text.
const ERROR_TEXT_LEN: usize = 256;
/// Buffer size used for terminal reads.
const TERMINAL_READ_LEN: usize = 256;
/// Telegraph inputs share the analog input channels.
const TELEGRAPH_CHANNELS: u32 = AI_CHANNELS;

/// Verbosity of the driver's own diagnostic messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugLevel {
    ShowAll,
    ShowLess,
    #[default]
    ShowNone,
}

impl DebugLevel {
    fn to_raw(self) -> u32 {
        let level = match self {
            Self::ShowAll => sys::DD132X_MSG_SHOWALL,
            Self::ShowLess => sys::DD132X_MSG_SHOWLESS,
            Self::ShowNone => sys::DD132X_MSG_SHOWNONE,
        };
        level as u32
    }
}

impl std::str::FromStr for DebugLevel {
    type Err = DigidataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" | "show_all" => Ok(Self::ShowAll),
            "less" | "show_less" => Ok(Self::ShowLess),
            "none" | "show_none" => Ok(Self::ShowNone),
            other => Err(DigidataError::InvalidConfig {
                message: format!("unknown debug level '{other}' (expected all, less or none)"),
            }),
        }
    }
}

/// Identity of a board as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// SCSI adaptor number
    pub adaptor: u8,
    /// SCSI target number
    pub target: u8,
    pub image_type: u8,
    pub reset_type: u8,
    pub manufacturer: String,
    pub name: String,
    pub product_version: String,
    pub firmware_version: String,
    /// On-board input buffer size in samples
    pub input_buffer_size: u32,
    /// On-board output buffer size in samples
    pub output_buffer_size: u32,
    pub serial_number: u32,
    pub clock_resolution: u32,
    pub min_clock_ticks: u32,
    pub max_clock_ticks: u32,
}

impl DeviceInfo {
    pub(crate) fn from_raw(raw: &DD132X_Info) -> Result<Self> {
        check_length("DD132X_Info", record_length::<DD132X_Info>(), raw.uLength)?;
        Ok(Self {
            adaptor: raw.byAdaptor,
            target: raw.byTarget,
            image_type: raw.byImageType,
            reset_type: raw.byResetType,
            manufacturer: c_buffer_to_string(&raw.szManufacturer),
            name: c_buffer_to_string(&raw.szName),
            product_version: c_buffer_to_string(&raw.szProductVersion),
            firmware_version: c_buffer_to_string(&raw.szFirmwareVersion),
            input_buffer_size: raw.uInputBufferSize,
            output_buffer_size: raw.uOutputBufferSize,
            serial_number: raw.uSerialNumber,
            clock_resolution: raw.uClockResolution,
            min_clock_ticks: raw.uMinClockTicks,
            max_clock_ticks: raw.uMaxClockTicks,
        })
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (serial {}, firmware {}) at adaptor {}, target {}",
            self.manufacturer, self.name, self.serial_number, self.firmware_version, self.adaptor, self.target
        )
    }
}

/// Reject a record whose length stamp does not match its Rust layout.
pub(crate) fn check_length(record: &'static str, expected: u32, actual: u32) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        warn!(record, expected, actual, "Driver returned record with unexpected length");
        Err(DigidataError::RecordLength {
            record,
            expected,
            actual,
        })
    }
}

/// Internal state shared between clones of a device.
struct DeviceInner {
    driver: Arc<dyn DriverApi>,
    handle: RawHandle,
    adaptor: u8,
    target: u8,
    /// Cached device info.
    info: RwLock<Option<DeviceInfo>>,
    /// Serialises driver calls on this handle; the driver makes no
    /// thread-safety promises.
    ffi_lock: parking_lot::Mutex<()>,
    closed: AtomicBool,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        debug!(adaptor = self.adaptor, target = self.target, "Closing Digidata device");
        if let Err(code) = self.driver.close_device(self.handle) {
            warn!(
                adaptor = self.adaptor,
                target = self.target,
                code,
                "Error closing Digidata device"
            );
        }
    }
}

/// The DLL backend, or [`DigidataError::DriverUnavailable`] when it is not
/// linked in.
fn vendor_driver() -> Result<Arc<dyn DriverApi>> {
    if sys::SDK_LINKED {
        Ok(Arc::new(SdkDriver))
    } else {
        Err(DigidataError::DriverUnavailable)
    }
}

/// A safe wrapper around an open Digidata board.
///
/// The handle is closed when the last clone is dropped, or earlier through
/// [`Digidata::close`]. Clones share the handle, so one clone can poll an
/// acquisition while another reads the digital inputs.
///
/// # Thread Safety
///
/// `Digidata` is `Send` and `Sync`. Every driver call on a handle takes an
/// internal lock, so calls from different threads never overlap.
#[derive(Clone)]
pub struct Digidata {
    inner: Arc<DeviceInner>,
}

impl Digidata {
    /// Ask the driver to rescan the SCSI bus for boards.
    pub fn rescan_bus() -> Result<()> {
        Self::rescan_bus_with(vendor_driver()?)
    }

    pub fn rescan_bus_with(driver: Arc<dyn DriverApi>) -> Result<()> {
        driver
            .rescan_scsi_bus()
            .map_err(|code| DigidataError::driver("rescan_bus", code, None))
    }

    /// Enumerate up to `max_devices` boards.
    pub fn find_devices(max_devices: u32) -> Result<Vec<DeviceInfo>> {
        Self::find_devices_with(vendor_driver()?, max_devices)
    }

    pub fn find_devices_with(driver: Arc<dyn DriverApi>, max_devices: u32) -> Result<Vec<DeviceInfo>> {
        let raw = driver
            .find_devices(max_devices)
            .map_err(|code| DigidataError::driver("find_devices", code, None))?;
        debug!(driver = driver.name(), found = raw.len(), "Enumerated Digidata devices");
        raw.iter().map(DeviceInfo::from_raw).collect()
    }

    /// Open the board at `adaptor`/`target` through the vendor driver.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use daq_driver_digidata::Digidata;
    ///
    /// let device = Digidata::open(1, 0)?;
    /// println!("{}", device.info()?);
    /// # Ok::<(), daq_driver_digidata::DigidataError>(())
    /// ```
    pub fn open(adaptor: u8, target: u8) -> Result<Self> {
        Self::open_with(vendor_driver()?, adaptor, target)
    }

    /// Open a board through an explicit backend.
    pub fn open_with(driver: Arc<dyn DriverApi>, adaptor: u8, target: u8) -> Result<Self> {
        Self::open_inner(driver, adaptor, target, None)
    }

    /// Open a board, loading the given RAMware image first.
    pub fn open_with_ramware(driver: Arc<dyn DriverApi>, adaptor: u8, target: u8, image: &[u8]) -> Result<Self> {
        if image.is_empty() {
            return Err(DigidataError::InvalidConfig {
                message: "RAMware image is empty".to_string(),
            });
        }
        Self::open_inner(driver, adaptor, target, Some(image))
    }

    /// Open the first board the driver reports.
    pub fn open_first() -> Result<Self> {
        Self::open_first_with(vendor_driver()?)
    }

    pub fn open_first_with(driver: Arc<dyn DriverApi>) -> Result<Self> {
        let devices = Self::find_devices_with(driver.clone(), 1)?;
        let first = devices.first().ok_or(DigidataError::NoDevices)?;
        Self::open_with(driver, first.adaptor, first.target)
    }

    fn open_inner(driver: Arc<dyn DriverApi>, adaptor: u8, target: u8, ramware: Option<&[u8]>) -> Result<Self> {
        let handle = driver.open_device(adaptor, target, ramware).map_err(|code| {
            if code == sys::DD132X_ERROR_NOTDD132X {
                DigidataError::DeviceNotFound { adaptor, target }
            } else {
                DigidataError::driver("open_device", code, None)
            }
        })?;

        info!(
            driver = driver.name(),
            adaptor,
            target,
            ramware = ramware.map(<[u8]>::len),
            "Opened Digidata device"
        );

        Ok(Self {
            inner: Arc::new(DeviceInner {
                driver,
                handle,
                adaptor,
                target,
                info: RwLock::new(None),
                ffi_lock: parking_lot::Mutex::new(()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Close the handle now. Later calls on any clone fail with
    /// [`DigidataError::DeviceClosed`].
    pub fn close(&self) -> Result<()> {
        let _guard = self.inner.ffi_lock.lock();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(adaptor = self.inner.adaptor, target = self.inner.target, "Closing Digidata device");
        self.inner
            .driver
            .close_device(self.inner.handle)
            .map_err(|code| DigidataError::driver("close_device", code, None))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn adaptor(&self) -> u8 {
        self.inner.adaptor
    }

    pub fn target(&self) -> u8 {
        self.inner.target
    }

    /// Name of the backend serving this device.
    pub fn driver_name(&self) -> &'static str {
        self.inner.driver.name()
    }

    /// Run one driver call under the FFI lock, translating a failure code
    /// into an error carrying the driver's last error text.
    fn call<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn DriverApi, RawHandle) -> RawResult<T>,
    ) -> Result<T> {
        let _guard = self.inner.ffi_lock.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(DigidataError::DeviceClosed);
        }
        let driver = self.inner.driver.as_ref();
        let handle = self.inner.handle;
        f(driver, handle).map_err(|code| {
            let detail = driver
                .get_last_error_text(handle, ERROR_TEXT_LEN)
                .ok()
                .filter(|text| !text.is_empty());
            debug!(operation, code, ?detail, "Driver call failed");
            DigidataError::driver(operation, code, detail)
        })
    }

    /// Like [`Self::call`] for calls without an error out-parameter.
    fn query<T>(&self, f: impl FnOnce(&dyn DriverApi, RawHandle) -> T) -> Result<T> {
        let _guard = self.inner.ffi_lock.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(DigidataError::DeviceClosed);
        }
        Ok(f(self.inner.driver.as_ref(), self.inner.handle))
    }

    // --- identity -------------------------------------------------------

    /// Device identity, fetched once and cached.
    pub fn info(&self) -> Result<DeviceInfo> {
        if let Some(info) = self.inner.info.read().as_ref() {
            return Ok(info.clone());
        }
        self.refresh_info()
    }

    /// Re-read the device identity from the driver.
    pub fn refresh_info(&self) -> Result<DeviceInfo> {
        let raw = self.call("get_device_info", |d, h| d.get_device_info(h))?;
        let info = DeviceInfo::from_raw(&raw)?;
        *self.inner.info.write() = Some(info.clone());
        Ok(info)
    }

    pub fn reset(&self) -> Result<()> {
        self.call("reset", |d, h| d.reset(h))?;
        *self.inner.info.write() = None;
        info!(adaptor = self.inner.adaptor, target = self.inner.target, "Reset Digidata device");
        Ok(())
    }

    pub fn download_ramware(&self, image: &[u8]) -> Result<()> {
        if image.is_empty() {
            return Err(DigidataError::InvalidConfig {
                message: "RAMware image is empty".to_string(),
            });
        }
        self.call("download_ramware", |d, h| d.download_ramware(h, image))?;
        *self.inner.info.write() = None;
        info!(bytes = image.len(), "Downloaded RAMware");
        Ok(())
    }

    // --- protocol -------------------------------------------------------

    /// Configure acquisition without attaching any buffers.
    ///
    /// Use this for read-last streaming; buffered acquisitions go through
    /// [`crate::Acquisition`].
    pub fn set_protocol(&self, protocol: &Protocol) -> Result<()> {
        let raw = protocol.to_raw()?;
        debug!(
            interval_us = protocol.sample_interval_us,
            ai = ?protocol.ai_channels,
            ao = ?protocol.ao_channels,
            "Setting protocol"
        );
        // SAFETY: to_raw leaves both buffer pointers null
        unsafe { self.set_raw_protocol(&raw) }
    }

    /// # Safety
    ///
    /// Buffer chains referenced by `raw` must outlive their attachment; see
    /// [`DriverApi::set_protocol`].
    pub(crate) unsafe fn set_raw_protocol(&self, raw: &DD132X_Protocol) -> Result<()> {
        // SAFETY: forwarded from the caller
        self.call("set_protocol", |d, h| unsafe { d.set_protocol(h, raw) })
    }

    /// The protocol currently held by the driver.
    pub fn protocol(&self) -> Result<Protocol> {
        let raw = self.call("get_protocol", |d, h| d.get_protocol(h))?;
        check_length("DD132X_Protocol", record_length::<DD132X_Protocol>(), raw.uLength)?;
        Protocol::from_raw(&raw)
    }

    // --- acquisition control ---------------------------------------------

    pub fn start_acquisition(&self) -> Result<()> {
        self.call("start_acquisition", |d, h| d.start_acquisition(h))?;
        info!(adaptor = self.inner.adaptor, target = self.inner.target, "Acquisition started");
        Ok(())
    }

    pub fn stop_acquisition(&self) -> Result<()> {
        self.call("stop_acquisition", |d, h| d.stop_acquisition(h))?;
        info!(adaptor = self.inner.adaptor, target = self.inner.target, "Acquisition stopped");
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.call("pause_acquisition", |d, h| d.pause_acquisition(h, true))
    }

    pub fn resume(&self) -> Result<()> {
        self.call("pause_acquisition", |d, h| d.pause_acquisition(h, false))
    }

    pub fn is_acquiring(&self) -> Result<bool> {
        self.query(|d, h| d.is_acquiring(h))
    }

    pub fn is_paused(&self) -> Result<bool> {
        self.query(|d, h| d.is_paused(h))
    }

    /// Wall-clock time and counter bracket of the last acquisition start.
    pub fn start_time(&self) -> Result<StartTime> {
        let raw = self
            .query(|d, h| d.time_at_start_of_acquisition(h))?
            .ok_or(DigidataError::OperationFailed {
                operation: "time_at_start_of_acquisition",
            })?;
        StartTime::from_raw(&raw)
    }

    // --- monitoring -------------------------------------------------------

    /// Samples acquired since the start of the acquisition.
    pub fn acquisition_position(&self) -> Result<i64> {
        self.call("acquisition_position", |d, h| d.acquisition_position(h))
    }

    /// Samples output since the start of the acquisition.
    pub fn samples_output(&self) -> Result<i64> {
        self.call("num_samples_output", |d, h| d.num_samples_output(h))
    }

    /// Start a buffer-less acquisition for [`Self::read_last`].
    pub fn start_read_last(&self) -> Result<()> {
        self.call("start_read_last", |d, h| d.start_read_last(h))?;
        info!(adaptor = self.inner.adaptor, target = self.inner.target, "Read-last acquisition started");
        Ok(())
    }

    /// The most recent `count` samples.
    pub fn read_last(&self, count: usize) -> Result<Vec<i16>> {
        let mut samples = vec![0; count];
        self.read_last_into(&mut samples)?;
        Ok(samples)
    }

    pub fn read_last_into(&self, samples: &mut [i16]) -> Result<()> {
        self.call("read_last", |d, h| d.read_last(h, samples))
    }

    // --- single-shot I/O --------------------------------------------------

    /// Read one analog input in counts.
    pub fn read_ai(&self, channel: u32) -> Result<i16> {
        check_channel(channel, AI_CHANNELS)?;
        self.call("get_ai_value", |d, h| d.get_ai_value(h, channel))
    }

    /// Read the digital input word.
    pub fn read_di(&self) -> Result<u32> {
        self.call("get_di_values", |d, h| d.get_di_values(h))
    }

    /// Write one analog output in counts.
    pub fn write_ao(&self, channel: u32, value: i16) -> Result<()> {
        check_channel(channel, AO_CHANNELS)?;
        self.call("put_ao_value", |d, h| d.put_ao_value(h, channel, value))
    }

    /// Write the digital output word.
    pub fn write_do(&self, values: u32) -> Result<()> {
        self.call("put_do_values", |d, h| d.put_do_values(h, values))
    }

    /// Read `count` telegraph channels starting at `first_channel`.
    pub fn read_telegraphs(&self, first_channel: u32, count: usize) -> Result<Vec<i16>> {
        let end = u64::from(first_channel) + count as u64;
        if end > u64::from(TELEGRAPH_CHANNELS) {
            return Err(DigidataError::InvalidChannel {
                channel: end.saturating_sub(1).min(u64::from(u32::MAX)) as u32,
                max: TELEGRAPH_CHANNELS,
            });
        }
        let mut values = vec![0; count];
        self.call("get_telegraphs", |d, h| d.get_telegraphs(h, first_channel, &mut values))?;
        Ok(values)
    }

    // --- EEPROM and calibration -------------------------------------------

    pub fn set_power_on_outputs(&self, outputs: &PowerOnOutputs) -> Result<()> {
        let raw = outputs.to_raw();
        self.call("set_power_on_outputs", |d, h| d.set_power_on_outputs(h, &raw))
    }

    pub fn power_on_outputs(&self) -> Result<PowerOnOutputs> {
        let raw = self.call("get_power_on_outputs", |d, h| d.get_power_on_outputs(h))?;
        check_length(
            "DD132X_PowerOnData",
            record_length::<sys::DD132X_PowerOnData>(),
            raw.uLength,
        )?;
        Ok(PowerOnOutputs::from_raw(&raw))
    }

    /// Run the board's self-calibration.
    pub fn calibrate(&self) -> Result<CalibrationData> {
        let raw = self.call("calibrate", |d, h| d.calibrate(h))?;
        check_length(
            "DD132X_CalibrationData",
            record_length::<sys::DD132X_CalibrationData>(),
            raw.uLength,
        )?;
        info!(status = { raw.uEquipmentStatus }, "Calibration complete");
        Ok(CalibrationData::from_raw(&raw))
    }

    /// Calibration stored on the board.
    pub fn calibration_data(&self) -> Result<CalibrationData> {
        let raw = self.call("get_calibration_data", |d, h| d.get_calibration_data(h))?;
        check_length(
            "DD132X_CalibrationData",
            record_length::<sys::DD132X_CalibrationData>(),
            raw.uLength,
        )?;
        Ok(CalibrationData::from_raw(&raw))
    }

    pub fn scsi_terminator_status(&self) -> Result<u8> {
        self.call("get_scsi_term_status", |d, h| d.get_scsi_term_status(h))
    }

    // --- terminal port ------------------------------------------------------

    /// Read whatever text is pending on the terminal port.
    pub fn dterm_read(&self) -> Result<String> {
        let bytes = self.call("dterm_read", |d, h| d.dterm_read(h, TERMINAL_READ_LEN))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn dterm_write(&self, text: &str) -> Result<()> {
        let text = CString::new(text).map_err(|_| DigidataError::InvalidConfig {
            message: "terminal text contains a NUL byte".to_string(),
        })?;
        self.call("dterm_write", |d, h| d.dterm_write(h, &text))
    }

    pub fn dterm_set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        self.call("dterm_set_baud_rate", |d, h| d.dterm_set_baud_rate(h, baud_rate))
    }

    // --- diagnostics ------------------------------------------------------

    /// The driver's description of the last error on this handle.
    pub fn last_error_text(&self) -> Result<String> {
        self.call("get_last_error_text", |d, h| d.get_last_error_text(h, ERROR_TEXT_LEN))
    }

    pub fn set_debug_level(&self, level: DebugLevel) -> Result<()> {
        self.call("set_debug_msg_level", |d, h| d.set_debug_msg_level(h, level.to_raw()))
    }

    /// Update the output pulse threshold and hysteresis while running.
    pub fn update_threshold_level(&self, threshold: u16, hysteresis: u16) -> Result<()> {
        if self.query(|d, h| d.update_threshold_level(h, threshold, hysteresis))? {
            Ok(())
        } else {
            Err(DigidataError::OperationFailed {
                operation: "update_threshold_level",
            })
        }
    }
}

fn check_channel(channel: u32, max: u32) -> Result<()> {
    if channel < max {
        Ok(())
    } else {
        Err(DigidataError::InvalidChannel { channel, max })
    }
}

impl fmt::Debug for Digidata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Digidata")
            .field("driver", &self.inner.driver.name())
            .field("adaptor", &self.inner.adaptor)
            .field("target", &self.inner.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}
