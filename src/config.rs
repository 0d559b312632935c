//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/digidata.toml` (base configuration)
//! 2. Environment variables prefixed with `DIGIDATA_`, with `__` between
//!    section and key (e.g. `DIGIDATA_DEVICE__MOCK=true`)
//!
//! Every section has defaults, so a missing file yields a usable
//! configuration.
//!
//! # Example
//! ```no_run
//! use digidata_daq::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), figment::Error>(())
//! ```

use std::path::{Path, PathBuf};

use daq_driver_digidata::{BoardConfig, DebugLevel, DEFAULT_CHUNKS_PER_SECOND};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::logging::OutputFormat;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/digidata.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Which board to open and how
    #[serde(default)]
    pub device: DeviceConfig,
    /// Named channel layout
    #[serde(default)]
    pub board: BoardConfig,
    /// Acquisition defaults
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Device selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// SCSI adaptor; with `target`, selects a board. Otherwise the first
    /// board found is used.
    #[serde(default)]
    pub adaptor: Option<u8>,
    #[serde(default)]
    pub target: Option<u8>,
    /// RAMware image loaded when the board is opened
    #[serde(default)]
    pub ramware: Option<PathBuf>,
    /// Driver message verbosity (all, less, none)
    #[serde(default = "default_debug_level")]
    pub debug_level: String,
    /// Use simulated boards instead of the vendor driver
    #[serde(default)]
    pub mock: bool,
    /// Number of simulated boards
    #[serde(default = "default_mock_boards")]
    pub mock_boards: usize,
}

/// Acquisition defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Time between scans in microseconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_us: f64,
    /// Driver buffer chunks per second
    #[serde(default = "default_chunks")]
    pub chunks_per_second: u32,
    /// Output directory for recordings
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

// Default value functions
fn default_name() -> String {
    "Digidata DAQ".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_debug_level() -> String {
    "none".to_string()
}

fn default_mock_boards() -> usize {
    1
}

fn default_scan_interval() -> f64 {
    100.0
}

fn default_chunks() -> u32 {
    DEFAULT_CHUNKS_PER_SECOND
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adaptor: None,
            target: None,
            ramware: None,
            debug_level: default_debug_level(),
            mock: false,
            mock_boards: default_mock_boards(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            scan_interval_us: default_scan_interval(),
            chunks_per_second: default_chunks(),
            output_dir: default_output_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/digidata.toml` and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DIGIDATA_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        self.application.log_format.parse::<OutputFormat>()?;
        self.device
            .debug_level
            .parse::<DebugLevel>()
            .map_err(|e| e.to_string())?;

        if self.device.adaptor.is_some() != self.device.target.is_some() {
            return Err("device.adaptor and device.target must be given together".to_string());
        }
        if self.device.mock && self.device.mock_boards == 0 {
            return Err("device.mock_boards must be at least 1".to_string());
        }

        if !(self.acquisition.scan_interval_us.is_finite() && self.acquisition.scan_interval_us > 0.0) {
            return Err(format!(
                "Invalid scan_interval_us {}. Must be positive",
                self.acquisition.scan_interval_us
            ));
        }
        if self.acquisition.chunks_per_second == 0 {
            return Err("Invalid chunks_per_second 0. Must be positive".to_string());
        }

        // Duplicate channel names, bad channels, alias loops
        self.board.validate().map_err(|e| e.to_string())
    }

    /// Board layout with acquisition defaults applied
    pub fn board_config(&self) -> BoardConfig {
        let mut board = self.board.clone();
        board
            .chunks_per_second
            .get_or_insert(self.acquisition.chunks_per_second);
        board
    }
}
