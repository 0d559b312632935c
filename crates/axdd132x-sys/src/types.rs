//! Win32 scalar aliases used by the header, and the device handle.

use std::os::raw::{c_int, c_uint};

pub type UINT = c_uint;
pub type BYTE = u8;
pub type WORD = u16;
pub type DWORD = u32;
pub type BOOL = c_int;
pub type LONGLONG = i64;

/// One 16-bit ADC/DAC sample.
pub type ADC_VALUE = i16;

pub const TRUE: BOOL = 1;
pub const FALSE: BOOL = 0;

/// Opaque driver-side device object.
#[repr(C)]
pub struct HDD132X__ {
    _unused: [u8; 0],
}

/// Handle returned by `DD132X_OpenDevice`. Null on failure.
pub type HDD132X = *mut HDD132X__;
