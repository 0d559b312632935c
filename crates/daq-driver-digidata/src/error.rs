//! Error types for Digidata operations.
//!
//! The driver reports failures as a numeric code written through an out
//! parameter. [`ErrorCode`] gives those codes names; [`DigidataError`] adds
//! the failures the safe layer detects on its own.

use std::fmt;
use std::os::raw::c_int;

use axdd132x_sys as sys;
use thiserror::Error;

/// Result type alias for Digidata operations.
pub type Result<T> = std::result::Result<T, DigidataError>;

/// A driver error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AspiNotFound,
    OutOfMemory,
    NotDd132x,
    RamwareOpen,
    RamwareRead,
    RamwareWrite,
    RamwareStart,
    SetAiProtocol,
    SetAoProtocol,
    StartAcquisition,
    StopAcquisition,
    PauseAcquisition,
    ReadData,
    WriteData,
    Calibration,
    Diagnostics,
    TerminalRead,
    TerminalWrite,
    TerminalBusy,
    TerminalSetBaud,
    /// Low-level transport failure; the value is the status above the
    /// transport base code.
    Transport(i32),
    /// Internal catch-all.
    CantComplete,
    /// A code outside every documented band.
    Unknown(i32),
}

impl ErrorCode {
    /// Classify a raw driver code.
    pub fn from_raw(code: c_int) -> Self {
        match code {
            sys::DD132X_ERROR_ASPINOTFOUND => Self::AspiNotFound,
            sys::DD132X_ERROR_OUTOFMEMORY => Self::OutOfMemory,
            sys::DD132X_ERROR_NOTDD132X => Self::NotDd132x,
            sys::DD132X_ERROR_RAMWAREOPEN => Self::RamwareOpen,
            sys::DD132X_ERROR_RAMWAREREAD => Self::RamwareRead,
            sys::DD132X_ERROR_RAMWAREWRITE => Self::RamwareWrite,
            sys::DD132X_ERROR_RAMWARESTART => Self::RamwareStart,
            sys::DD132X_ERROR_SETAIPROTOCOL => Self::SetAiProtocol,
            sys::DD132X_ERROR_SETAOPROTOCOL => Self::SetAoProtocol,
            sys::DD132X_ERROR_STARTACQ => Self::StartAcquisition,
            sys::DD132X_ERROR_STOPACQ => Self::StopAcquisition,
            sys::DD132X_ERROR_PAUSEACQ => Self::PauseAcquisition,
            sys::DD132X_ERROR_READDATA => Self::ReadData,
            sys::DD132X_ERROR_WRITEDATA => Self::WriteData,
            sys::DD132X_ERROR_CALIBRATION => Self::Calibration,
            sys::DD132X_ERROR_DIAGNOSTICS => Self::Diagnostics,
            sys::DD132X_ERROR_DTERM_READ => Self::TerminalRead,
            sys::DD132X_ERROR_DTERM_WRITE => Self::TerminalWrite,
            sys::DD132X_ERROR_DTERM_BUSY => Self::TerminalBusy,
            sys::DD132X_ERROR_DTERM_SETBAUD => Self::TerminalSetBaud,
            sys::DD132X_ERROR_CANTCOMPLETE => Self::CantComplete,
            c if sys::is_transport_error(c) => Self::Transport(c - sys::DD132X_ERROR_ASPIERROR),
            c => Self::Unknown(c),
        }
    }

    /// The raw driver code.
    pub fn code(self) -> c_int {
        match self {
            Self::AspiNotFound => sys::DD132X_ERROR_ASPINOTFOUND,
            Self::OutOfMemory => sys::DD132X_ERROR_OUTOFMEMORY,
            Self::NotDd132x => sys::DD132X_ERROR_NOTDD132X,
            Self::RamwareOpen => sys::DD132X_ERROR_RAMWAREOPEN,
            Self::RamwareRead => sys::DD132X_ERROR_RAMWAREREAD,
            Self::RamwareWrite => sys::DD132X_ERROR_RAMWAREWRITE,
            Self::RamwareStart => sys::DD132X_ERROR_RAMWARESTART,
            Self::SetAiProtocol => sys::DD132X_ERROR_SETAIPROTOCOL,
            Self::SetAoProtocol => sys::DD132X_ERROR_SETAOPROTOCOL,
            Self::StartAcquisition => sys::DD132X_ERROR_STARTACQ,
            Self::StopAcquisition => sys::DD132X_ERROR_STOPACQ,
            Self::PauseAcquisition => sys::DD132X_ERROR_PAUSEACQ,
            Self::ReadData => sys::DD132X_ERROR_READDATA,
            Self::WriteData => sys::DD132X_ERROR_WRITEDATA,
            Self::Calibration => sys::DD132X_ERROR_CALIBRATION,
            Self::Diagnostics => sys::DD132X_ERROR_DIAGNOSTICS,
            Self::TerminalRead => sys::DD132X_ERROR_DTERM_READ,
            Self::TerminalWrite => sys::DD132X_ERROR_DTERM_WRITE,
            Self::TerminalBusy => sys::DD132X_ERROR_DTERM_BUSY,
            Self::TerminalSetBaud => sys::DD132X_ERROR_DTERM_SETBAUD,
            Self::Transport(status) => sys::DD132X_ERROR_ASPIERROR + status,
            Self::CantComplete => sys::DD132X_ERROR_CANTCOMPLETE,
            Self::Unknown(code) => code,
        }
    }

    /// Short human readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::AspiNotFound => "ASPI layer not found",
            Self::OutOfMemory => "out of memory",
            Self::NotDd132x => "device is not a Digidata 132x",
            Self::RamwareOpen => "could not open RAMware image",
            Self::RamwareRead => "could not read RAMware image",
            Self::RamwareWrite => "could not write RAMware to the device",
            Self::RamwareStart => "could not start RAMware",
            Self::SetAiProtocol => "analog input protocol rejected",
            Self::SetAoProtocol => "analog output protocol rejected",
            Self::StartAcquisition => "could not start acquisition",
            Self::StopAcquisition => "could not stop acquisition",
            Self::PauseAcquisition => "could not pause acquisition",
            Self::ReadData => "data read failed",
            Self::WriteData => "data write failed",
            Self::Calibration => "calibration failed",
            Self::Diagnostics => "diagnostics failed",
            Self::TerminalRead => "terminal read failed",
            Self::TerminalWrite => "terminal write failed",
            Self::TerminalBusy => "terminal busy",
            Self::TerminalSetBaud => "could not set terminal baud rate",
            Self::Transport(_) => "SCSI transport error",
            Self::CantComplete => "operation could not complete",
            Self::Unknown(_) => "unknown error",
        }
    }

    /// Whether the failure came from the SCSI transport rather than the board.
    pub fn is_transport(self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(status) => write!(f, "{} (status {})", self.description(), status),
            _ => write!(f, "{} ({})", self.description(), self.code()),
        }
    }
}

/// Errors that can occur when working with a Digidata board.
#[derive(Error, Debug)]
pub enum DigidataError {
    /// The driver rejected an operation.
    #[error("{operation} failed: {code}{}", detail_suffix(.detail))]
    Driver {
        operation: &'static str,
        code: ErrorCode,
        /// Text from `GetLastErrorText`, when a handle was available.
        detail: Option<String>,
    },

    /// Enumeration found nothing.
    #[error("No Digidata devices found")]
    NoDevices,

    /// No device at the requested address.
    #[error("No Digidata device at adaptor {adaptor}, target {target}")]
    DeviceNotFound { adaptor: u8, target: u8 },

    /// Channel number outside the board's range.
    #[error("Invalid channel {channel}: board has {max} channels")]
    InvalidChannel { channel: u32, max: u32 },

    /// A scan list holds more entries than the board supports.
    #[error("Scan list has {len} entries, maximum is {max}")]
    ScanListTooLong { len: usize, max: usize },

    /// Invalid configuration or parameter.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The handle was closed through another clone.
    #[error("Device is closed")]
    DeviceClosed,

    /// Built without the vendor driver (`hardware` feature off).
    #[error("AxDD132x driver support is not built in; enable the `hardware` feature")]
    DriverUnavailable,

    /// A record came back with an unexpected length stamp.
    #[error("{record} reports length {actual}, expected {expected}")]
    RecordLength {
        record: &'static str,
        expected: u32,
        actual: u32,
    },

    /// A call without an error out-parameter returned FALSE.
    #[error("{operation} failed")]
    OperationFailed { operation: &'static str },

    /// Waiting on the board took too long.
    #[error("Timed out after {waited_ms} ms waiting for {operation}")]
    Timeout { operation: &'static str, waited_ms: u64 },

    /// Board layer: the name is not a configured channel or alias.
    #[error("Unknown channel '{name}'")]
    UnknownChannel { name: String },

    /// Board layer: aliases refer to each other in a cycle.
    #[error("Alias '{name}' resolves to itself")]
    AliasLoop { name: String },

    /// Writing a recording failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

impl DigidataError {
    /// Build a driver error from a raw code.
    pub(crate) fn driver(operation: &'static str, code: c_int, detail: Option<String>) -> Self {
        Self::Driver {
            operation,
            code: ErrorCode::from_raw(code),
            detail,
        }
    }

    /// The driver error code, if this error came from the driver.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this is a "device not found" type error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoDevices | Self::DeviceNotFound { .. })
    }

    /// Check if the error came from the SCSI transport.
    pub fn is_transport(&self) -> bool {
        self.code().is_some_and(ErrorCode::is_transport)
    }
}
