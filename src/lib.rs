//! # digidata-daq
//!
//! Application layer for the `digidata` command-line tool: configuration
//! loading and tracing setup around the [`daq_driver_digidata`] driver.
//!
//! - [`config`]: layered TOML and environment configuration (Figment)
//! - [`logging`]: `tracing-subscriber` initialization from that configuration

pub mod config;
pub mod logging;

pub use daq_driver_digidata as driver;
