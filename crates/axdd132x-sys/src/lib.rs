//! Low-level FFI bindings for the Axon Digidata 1322A driver (`AxDD132x.dll`).
//!
//! This crate mirrors the vendor header `AxDD132x.h`: the packed records the
//! driver reads and writes, the flag and error constants, and the exported
//! `WINAPI` entry points.
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` as they are direct FFI bindings.
//! For a safe wrapper, use the `daq-driver-digidata` crate instead.
//!
//! Records are `#[repr(C, packed)]`. Never take a reference to one of their
//! fields; copy the value out (`{ info.uSerialNumber }`) or use
//! `ptr::addr_of!`.
//!
//! # Features
//!
//! - `axdd132x-sdk`: Link against `AxDD132x.lib`. Without this feature every
//!   entry point is a stub that panics when called, so dependent crates can
//!   build and run their simulated paths anywhere.
//!
//! # Example (unsafe)
//!
//! ```no_run
//! use axdd132x_sys::*;
//!
//! unsafe {
//!     let mut info = DD132X_Info::default();
//!     let mut error = 0;
//!     let found = DD132X_FindDevices(&mut info, 1, &mut error);
//!     if found > 0 {
//!         let device = DD132X_OpenDevice(info.byAdaptor, info.byTarget, &mut error);
//!         if !device.is_null() {
//!             println!("Serial number {}", { info.uSerialNumber });
//!             DD132X_CloseDevice(device, &mut error);
//!         }
//!     }
//! }
//! ```

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]
#![allow(unsafe_code)]
#![allow(clippy::all)]

mod constants;
mod functions;
mod records;
mod types;

pub use constants::*;
pub use functions::*;
pub use records::*;
pub use types::*;

/// Whether the entry points resolve to `AxDD132x.dll` (`axdd132x-sdk`) or
/// to panicking stubs.
pub const SDK_LINKED: bool = cfg!(feature = "axdd132x-sdk");

/// Whether `code` falls in the transport (ASPI) band of error codes.
///
/// The driver reports SCSI/ASPI failures as `DD132X_ERROR_ASPIERROR + n`.
pub const fn is_transport_error(code: std::os::raw::c_int) -> bool {
    code >= DD132X_ERROR_ASPIERROR && code < DD132X_ERROR_CANTCOMPLETE
}
