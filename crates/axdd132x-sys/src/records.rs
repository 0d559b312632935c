//! Packed records exchanged with the driver.
//!
//! Every record mirrors a `#pragma pack(1)` structure from `AxDD132x.h` and
//! starts with a `uLength` field. The driver compares that field against the
//! size it was compiled with, so the `Default` impls stamp it the same way
//! the C++ constructors do: zero everything, then write the size.

use std::mem::size_of;
use std::ptr;

use crate::constants::{DD132X_MAXAOCHANNELS, DD132X_SCANLIST_SIZE};
use crate::types::{ADC_VALUE, BYTE, DWORD, LONGLONG, UINT, WORD};

/// Byte size of a record as the `UINT` stored in its length field.
#[inline]
pub const fn record_length<T>() -> UINT {
    size_of::<T>() as UINT
}

/// Win32 `SYSTEMTIME`.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SYSTEMTIME {
    pub wYear: WORD,
    pub wMonth: WORD,
    pub wDayOfWeek: WORD,
    pub wDay: WORD,
    pub wHour: WORD,
    pub wMinute: WORD,
    pub wSecond: WORD,
    pub wMilliseconds: WORD,
}

/// One node of the driver's sample buffer list.
///
/// Declared outside the packed block, so it keeps natural C alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DATABUFFER {
    /// Number of samples in this buffer.
    pub uNumSamples: UINT,
    /// Flags describing the data buffer.
    pub uFlags: UINT,
    /// The buffer containing the data.
    pub pnData: *mut ADC_VALUE,
    /// Flags split out from the data buffer.
    pub psDataFlags: *mut BYTE,
    /// Next buffer in the list.
    pub pNextBuffer: *mut DATABUFFER,
    /// Previous buffer in the list.
    pub pPrevBuffer: *mut DATABUFFER,
}

impl Default for DATABUFFER {
    fn default() -> Self {
        Self {
            uNumSamples: 0,
            uFlags: 0,
            pnData: ptr::null_mut(),
            psDataFlags: ptr::null_mut(),
            pNextBuffer: ptr::null_mut(),
            pPrevBuffer: ptr::null_mut(),
        }
    }
}

/// Device identity record filled by `DD132X_FindDevices` and
/// `DD132X_GetDeviceInfo`.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct DD132X_Info {
    pub uLength: UINT,
    pub byAdaptor: BYTE,
    pub byTarget: BYTE,
    pub byImageType: BYTE,
    pub byResetType: BYTE,
    pub szManufacturer: [u8; 16],
    pub szName: [u8; 32],
    pub szProductVersion: [u8; 8],
    pub szFirmwareVersion: [u8; 16],
    pub uInputBufferSize: UINT,
    pub uOutputBufferSize: UINT,
    pub uSerialNumber: UINT,
    pub uClockResolution: UINT,
    pub uMinClockTicks: UINT,
    pub uMaxClockTicks: UINT,
    pub byUnused: [BYTE; 280],
}

impl Default for DD132X_Info {
    fn default() -> Self {
        // SAFETY: every field is an integer or byte array, all-zero is valid.
        let mut info: Self = unsafe { std::mem::zeroed() };
        info.uLength = record_length::<Self>();
        info.byAdaptor = BYTE::MAX;
        info.byTarget = BYTE::MAX;
        info
    }
}

/// Acquisition settings (`DD132X_SetProtocol` / `DD132X_GetProtocol`).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct DD132X_Protocol {
    /// Size of this structure in bytes.
    pub uLength: UINT,
    /// Sample interval in us.
    pub dSampleInterval: f64,
    /// Boolean flags that control options.
    pub dwFlags: DWORD,
    pub eTriggering: crate::constants::DD132X_Triggering,
    pub eAIDataBits: crate::constants::DD132X_AIDataBits,

    pub uAIChannels: UINT,
    pub anAIChannels: [i32; DD132X_SCANLIST_SIZE],
    pub pAIBuffers: *mut DATABUFFER,
    pub uAIBuffers: UINT,

    pub uAOChannels: UINT,
    pub anAOChannels: [i32; DD132X_SCANLIST_SIZE],
    pub pAOBuffers: *mut DATABUFFER,
    pub uAOBuffers: UINT,

    pub uTerminalCount: LONGLONG,

    pub eOutputPulseType: crate::constants::DD132X_OutputPulseType,
    /// TRUE = positive.
    pub bOutputPulsePolarity: i16,
    pub nOutputPulseChannel: i16,
    pub wOutputPulseThreshold: WORD,
    pub wOutputPulseHystDelta: WORD,

    pub uChunksPerSecond: UINT,
    pub byUnused: [BYTE; 248],
}

impl Default for DD132X_Protocol {
    fn default() -> Self {
        // SAFETY: integers, floats and raw pointers are all valid when zeroed
        // (null buffer pointers).
        let mut protocol: Self = unsafe { std::mem::zeroed() };
        protocol.uLength = record_length::<Self>();
        protocol.uChunksPerSecond = 20;
        protocol
    }
}

/// Power-on defaults stored in the board's EEPROM.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DD132X_PowerOnData {
    pub uLength: UINT,
    pub dwDigitalOuts: DWORD,
    pub anAnalogOuts: [i16; DD132X_MAXAOCHANNELS],
}

impl Default for DD132X_PowerOnData {
    fn default() -> Self {
        Self {
            uLength: record_length::<Self>(),
            dwDigitalOuts: 0,
            anAnalogOuts: [0; DD132X_MAXAOCHANNELS],
        }
    }
}

/// Calibration / diagnostic data. The driver requires an even size.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct DD132X_CalibrationData {
    /// Size of this structure in bytes.
    pub uLength: UINT,
    /// Bit mask of equipment status flags.
    pub uEquipmentStatus: UINT,
    /// ADC 0 gain-ratio
    pub dADCGainRatio: f64,
    /// ADC 0 zero offset
    pub nADCOffset: i16,
    /// Unused space for more ADCs
    pub byUnused1: [BYTE; 46],

    /// Total number of DACs on board
    pub wNumberOfDACs: WORD,
    pub byUnused2: [BYTE; 6],
    pub anDACOffset: [i16; DD132X_MAXAOCHANNELS],
    pub adDACGainRatio: [f64; DD132X_MAXAOCHANNELS],
    pub byUnused4: [BYTE; 24],
}

impl Default for DD132X_CalibrationData {
    fn default() -> Self {
        // SAFETY: integers, floats and byte arrays, all-zero is valid.
        let mut data: Self = unsafe { std::mem::zeroed() };
        data.uLength = record_length::<Self>();
        data
    }
}

/// Start-of-acquisition timing: wall clock plus high resolution counter
/// snapshots taken before and after the start command.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DD132X_StartAcqInfo {
    /// Size of this structure in bytes.
    pub uLength: UINT,
    pub m_StartTime: SYSTEMTIME,
    pub m_n64PreStartAcq: i64,
    pub m_n64PostStartAcq: i64,
}

impl Default for DD132X_StartAcqInfo {
    fn default() -> Self {
        Self {
            uLength: record_length::<Self>(),
            m_StartTime: SYSTEMTIME::default(),
            m_n64PreStartAcq: 0,
            m_n64PostStartAcq: 0,
        }
    }
}

// Layouts the driver was compiled against.
const _: () = assert!(size_of::<SYSTEMTIME>() == 16);
const _: () = assert!(size_of::<DD132X_Info>() == 384);
const _: () = assert!(size_of::<DD132X_Protocol>() == 824 + 2 * size_of::<*mut DATABUFFER>());
const _: () = assert!(size_of::<DD132X_PowerOnData>() == 40);
const _: () = assert!(size_of::<DD132X_CalibrationData>() == 256);
const _: () = assert!(size_of::<DD132X_StartAcqInfo>() == 36);
