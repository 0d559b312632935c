//! Safe Rust driver for the Axon Digidata 1322A.
//!
//! This crate wraps the vendor driver bindings from `axdd132x-sys` with
//! typed records, proper error handling and RAII resource management.
//!
//! # Architecture
//!
//! ## Device Access
//! - [`Digidata`] - Board handle, closed when the last clone drops
//! - [`DeviceInfo`] - Identity reported by the driver
//!
//! ## Backends
//! - [`DriverApi`] - The seam between the safe layer and a driver
//! - [`SdkDriver`] - Forwards to `AxDD132x.dll` (feature `hardware`)
//! - [`MockDriver`] - Simulated boards with analog loopback
//!
//! ## Acquisition
//! - [`Protocol`] - Sampling, scan lists, trigger and stop conditions
//! - [`BufferList`] - Host sample rings handed to the driver
//! - [`Acquisition`] - Buffered acquisition guard
//! - [`ReadLast`] - Buffer-less polling of the newest samples
//!
//! ## Named Channels
//! - [`Board`] / [`BoardConfig`] - Channels with gains and aliases
//! - [`Recording`] - Scaled signals, saved as CSV
//!
//! # Examples
//!
//! ## Single-Sample I/O
//!
//! ```no_run
//! use daq_driver_digidata::Digidata;
//!
//! # fn example() -> daq_driver_digidata::Result<()> {
//! let device = Digidata::open_first()?;
//! println!("Board: {}", device.info()?);
//!
//! device.write_ao(0, 16384)?;
//! println!("AI0: {} counts", device.read_ai(0)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Named Acquisition
//!
//! ```
//! use std::sync::Arc;
//! use daq_driver_digidata::{Board, Digidata, MockDriver};
//!
//! # fn example() -> daq_driver_digidata::Result<()> {
//! let device = Digidata::open_first_with(Arc::new(MockDriver::new()))?;
//! let board = Board::new(device);
//! board.set_analog_input("Vm", 0, 0.01)?;
//! board.set_analog_output("Vc", 0, 0.02)?;
//!
//! let step: Vec<f64> = (0..1000).map(|i| if i < 500 { -70.0 } else { -20.0 }).collect();
//! let recording = board.acquire(&["Vm"], &[("Vc", step.as_slice())], 100.0)?;
//! println!("{} scans", recording.len());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod acquisition;
pub mod board;
pub mod buffer;
pub mod calibration;
pub mod device;
pub mod driver;
pub mod error;
pub mod protocol;

pub use acquisition::{AcquiredData, Acquisition, ReadLast, StartTime, DEFAULT_POLL_INTERVAL};
pub use board::{AnalogInput, AnalogOutput, Board, BoardConfig, Recording};
pub use buffer::BufferList;
pub use calibration::{CalibrationData, EquipmentStatus, PowerOnOutputs, Scaling};
pub use device::{DebugLevel, DeviceInfo, Digidata};
pub use driver::{DriverApi, MockDriver, MockOperation, RawHandle, RawResult, SdkDriver};
pub use error::{DigidataError, ErrorCode, Result};
pub use protocol::{
    AiDataBits, AoChannel, OutputPulse, OutputPulseType, Protocol, ProtocolBuilder, ProtocolFlags,
    Triggering, AI_CHANNELS, AO_CHANNELS, DEFAULT_CHUNKS_PER_SECOND, SCAN_LIST_SIZE,
};
