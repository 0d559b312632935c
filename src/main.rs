//! CLI Entry Point for digidata
//!
//! Command-line access to Axon Digidata 1322A boards:
//! - Enumerate boards and read their identity and calibration
//! - Single-shot analog and digital I/O, telegraphs, power-on outputs
//! - Serial terminal passthrough
//! - Named-channel recordings saved as CSV
//!
//! # Usage
//!
//! ```bash
//! digidata --mock list
//! digidata read-ai 0 --volts
//! digidata acquire --input Vm --output Vc=0.5 --scans 20000 --out run.csv
//! ```
//!
//! Without the `hardware` feature only the simulated boards (`--mock`) are
//! available.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use daq_driver_digidata::{
    CalibrationData, DebugLevel, Digidata, DriverApi, MockDriver, PowerOnOutputs, Protocol,
    ReadLast, Scaling, SdkDriver, AI_CHANNELS,
};
use digidata_daq::config::{AppConfig, DEFAULT_CONFIG_PATH};
use digidata_daq::logging;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "digidata")]
#[command(about = "Axon Digidata 1322A acquisition tool", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use simulated boards instead of the vendor driver
    #[arg(long, global = true)]
    mock: bool,

    /// SCSI adaptor of the board to open
    #[arg(long, global = true, requires = "target")]
    adaptor: Option<u8>,

    /// SCSI target of the board to open
    #[arg(long, global = true, requires = "adaptor")]
    target: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List boards on the SCSI bus
    List {
        /// Maximum number of boards to report
        #[arg(long, default_value_t = 8)]
        max: u32,

        /// Rescan the bus first
        #[arg(long)]
        rescan: bool,
    },

    /// Show identity of the selected board
    Info,

    /// Show acquisition state and diagnostics
    Status,

    /// Run the on-board calibration and print the result
    Calibrate,

    /// Print the stored calibration
    Calibration,

    /// Read one analog input
    ReadAi {
        channel: u32,

        /// Print volts instead of counts
        #[arg(long)]
        volts: bool,
    },

    /// Read the digital inputs
    ReadDi,

    /// Write one analog output
    WriteAo {
        channel: u32,

        /// Level in counts, or volts with --volts
        #[arg(allow_negative_numbers = true)]
        value: f64,

        #[arg(long)]
        volts: bool,
    },

    /// Write the digital output word (decimal or 0x-prefixed hex)
    WriteDo {
        #[arg(value_parser = parse_word)]
        value: u32,
    },

    /// Read the telegraph channels
    Telegraphs {
        #[arg(long, default_value_t = 0)]
        first: u32,

        #[arg(long, default_value_t = AI_CHANNELS as usize)]
        count: usize,
    },

    /// Outputs applied when the board powers up
    PowerOn {
        #[command(subcommand)]
        action: PowerOnCommand,
    },

    /// Serial terminal passthrough
    Term {
        #[command(subcommand)]
        action: TermCommand,
    },

    /// Set the digital input threshold and hysteresis
    Threshold { level: u16, hysteresis: u16 },

    /// Snapshot the newest samples of a free-running acquisition
    Scope {
        /// Input channels, comma separated
        #[arg(long, value_delimiter = ',', default_value = "0")]
        channels: Vec<u8>,

        #[arg(long, default_value_t = 1000)]
        scans: usize,

        /// Time between scans in microseconds (default from config)
        #[arg(long)]
        interval_us: Option<f64>,
    },

    /// Record named inputs, optionally holding outputs at constant levels
    Acquire {
        /// Input names from the board configuration
        #[arg(long = "input", required = true)]
        inputs: Vec<String>,

        /// Output levels as NAME=VALUE, in the output's own units
        #[arg(long = "output")]
        outputs: Vec<String>,

        #[arg(long, default_value_t = 10_000)]
        scans: usize,

        /// Time between scans in microseconds (default from config)
        #[arg(long)]
        interval_us: Option<f64>,

        /// CSV file (default: a timestamped file in the output directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PowerOnCommand {
    /// Print the stored power-on outputs
    Show,
    /// Store new power-on outputs
    Set {
        /// Digital output word
        #[arg(long, value_parser = parse_word, default_value = "0")]
        digital: u32,

        /// Analog levels in counts, starting at AO 0
        #[arg(allow_negative_numbers = true)]
        analog: Vec<i16>,
    },
}

#[derive(Subcommand)]
enum TermCommand {
    /// Send text to the serial port
    Write { text: String },
    /// Read pending text from the serial port
    Read,
    /// Set the serial baud rate
    Baud { rate: u32 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if cli.mock {
        config.device.mock = true;
    }
    if let (Some(adaptor), Some(target)) = (cli.adaptor, cli.target) {
        config.device.adaptor = Some(adaptor);
        config.device.target = Some(target);
    }
    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("Invalid configuration")?;
    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;
    debug!(name = %config.application.name, mock = config.device.mock, "Configuration loaded");

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            flag.store(true, Ordering::Relaxed);
        }
    });

    // Driver calls block, so keep them off the async workers.
    let command = cli.command;
    tokio::task::spawn_blocking(move || run(command, &config, cancel))
        .await
        .context("Command task failed")?
}

fn run(command: Commands, config: &AppConfig, cancel: Arc<AtomicBool>) -> Result<()> {
    let driver = select_driver(config)?;
    let open = || open_device(driver.clone(), config);

    match command {
        Commands::List { max, rescan } => list(driver.clone(), max, rescan),
        Commands::Info => {
            let info = open()?.info()?;
            println!("{info}");
            println!("  product version:  {}", info.product_version);
            println!("  image type:       {}", info.image_type);
            println!("  reset type:       {}", info.reset_type);
            println!(
                "  buffer sizes:     {} in / {} out samples",
                info.input_buffer_size, info.output_buffer_size
            );
            println!(
                "  clock:            {} resolution, {}..{} ticks",
                info.clock_resolution, info.min_clock_ticks, info.max_clock_ticks
            );
            Ok(())
        }
        Commands::Status => status(&open()?),
        Commands::Calibrate => {
            let device = open()?;
            info!("Calibrating");
            print_calibration(&device.calibrate()?);
            Ok(())
        }
        Commands::Calibration => {
            print_calibration(&open()?.calibration_data()?);
            Ok(())
        }
        Commands::ReadAi { channel, volts } => {
            let counts = open()?.read_ai(channel)?;
            if volts {
                println!("{:.4}", Scaling::BOARD.counts_to_volts(counts));
            } else {
                println!("{counts}");
            }
            Ok(())
        }
        Commands::ReadDi => {
            println!("0x{:04X}", open()?.read_di()?);
            Ok(())
        }
        Commands::WriteAo {
            channel,
            value,
            volts,
        } => {
            let counts = if volts {
                Scaling::BOARD.volts_to_counts(value)
            } else {
                counts_from(value)?
            };
            open()?.write_ao(channel, counts)?;
            info!(channel, counts, "Analog output written");
            Ok(())
        }
        Commands::WriteDo { value } => {
            open()?.write_do(value)?;
            info!("Digital outputs written: 0x{value:04X}");
            Ok(())
        }
        Commands::Telegraphs { first, count } => {
            let values = open()?.read_telegraphs(first, count)?;
            for (channel, value) in (first..).zip(values) {
                println!(
                    "{channel:>2}: {value:>6} ({:.3} V)",
                    Scaling::BOARD.counts_to_volts(value)
                );
            }
            Ok(())
        }
        Commands::PowerOn { action } => power_on(&open()?, action),
        Commands::Term { action } => terminal(&open()?, action),
        Commands::Threshold { level, hysteresis } => {
            open()?.update_threshold_level(level, hysteresis)?;
            info!(level, hysteresis, "Threshold updated");
            Ok(())
        }
        Commands::Scope {
            channels,
            scans,
            interval_us,
        } => scope(
            &open()?,
            config,
            &channels,
            scans,
            interval_us.unwrap_or(config.acquisition.scan_interval_us),
            &cancel,
        ),
        Commands::Acquire {
            inputs,
            outputs,
            scans,
            interval_us,
            out,
        } => acquire(
            open()?,
            config,
            &inputs,
            &outputs,
            scans,
            interval_us.unwrap_or(config.acquisition.scan_interval_us),
            out,
            cancel,
        ),
    }
}

fn select_driver(config: &AppConfig) -> Result<Arc<dyn DriverApi>> {
    if config.device.mock {
        info!(boards = config.device.mock_boards, "Using simulated boards");
        return Ok(Arc::new(MockDriver::with_boards(config.device.mock_boards)));
    }
    if !cfg!(feature = "hardware") {
        bail!("built without the `hardware` feature; pass --mock or set device.mock = true");
    }
    Ok(Arc::new(SdkDriver))
}

fn open_device(driver: Arc<dyn DriverApi>, config: &AppConfig) -> Result<Digidata> {
    let (adaptor, target) = match (config.device.adaptor, config.device.target) {
        (Some(adaptor), Some(target)) => (adaptor, target),
        _ => {
            let found = Digidata::find_devices_with(driver.clone(), 1)?;
            let first = found.first().context("No Digidata found on the SCSI bus")?;
            (first.adaptor, first.target)
        }
    };

    let device = match &config.device.ramware {
        Some(path) => {
            let image = std::fs::read(path)
                .with_context(|| format!("Failed to read RAMware image {}", path.display()))?;
            Digidata::open_with_ramware(driver, adaptor, target, &image)?
        }
        None => Digidata::open_with(driver, adaptor, target)?,
    };

    let level: DebugLevel = config.device.debug_level.parse()?;
    device.set_debug_level(level)?;
    Ok(device)
}

fn list(driver: Arc<dyn DriverApi>, max: u32, rescan: bool) -> Result<()> {
    if rescan {
        Digidata::rescan_bus_with(driver.clone())?;
    }
    let devices = Digidata::find_devices_with(driver, max)?;
    if devices.is_empty() {
        println!("No boards found");
    }
    for info in devices {
        println!("{info}");
    }
    Ok(())
}

fn status(device: &Digidata) -> Result<()> {
    println!("acquiring:        {}", device.is_acquiring()?);
    println!("paused:           {}", device.is_paused()?);
    println!("samples acquired: {}", device.acquisition_position()?);
    println!("samples output:   {}", device.samples_output()?);
    println!("SCSI terminator:  {}", device.scsi_terminator_status()?);
    let last_error = device.last_error_text()?;
    if !last_error.is_empty() {
        println!("last error:       {last_error}");
    }
    Ok(())
}

fn print_calibration(calibration: &CalibrationData) {
    println!("equipment status: {:?}", calibration.equipment_status);
    println!(
        "ADC:              gain ratio {:.6}, offset {}",
        calibration.adc_gain_ratio, calibration.adc_offset
    );
    for (dac, (offset, gain)) in calibration.dacs().enumerate() {
        println!("DAC {dac}:            gain ratio {gain:.6}, offset {offset}");
    }
}

fn power_on(device: &Digidata, action: PowerOnCommand) -> Result<()> {
    match action {
        PowerOnCommand::Show => {
            let outputs = device.power_on_outputs()?;
            println!("digital: 0x{:04X}", outputs.digital);
            println!("analog:  {:?}", outputs.analog);
        }
        PowerOnCommand::Set { digital, analog } => {
            let outputs = PowerOnOutputs::new(digital, &analog)?;
            device.set_power_on_outputs(&outputs)?;
            info!(digital, analog = ?analog, "Power-on outputs stored");
        }
    }
    Ok(())
}

fn terminal(device: &Digidata, action: TermCommand) -> Result<()> {
    match action {
        TermCommand::Write { text } => device.dterm_write(&text)?,
        TermCommand::Read => print!("{}", device.dterm_read()?),
        TermCommand::Baud { rate } => {
            device.dterm_set_baud_rate(rate)?;
            info!(rate, "Terminal baud rate set");
        }
    }
    Ok(())
}

fn scope(
    device: &Digidata,
    config: &AppConfig,
    channels: &[u8],
    scans: usize,
    scan_interval_us: f64,
    cancel: &AtomicBool,
) -> Result<()> {
    let protocol = Protocol::builder()
        .sample_interval_us(scan_interval_us / channels.len().max(1) as f64)
        .ai_channels(channels)
        .chunks_per_second(config.acquisition.chunks_per_second)
        .build()?;

    let read_last = ReadLast::start(device, &protocol)?;
    // Let the window fill before taking the snapshot.
    let window = Duration::from_secs_f64(scans as f64 * scan_interval_us * 1e-6);
    let deadline = std::time::Instant::now() + window;
    while std::time::Instant::now() < deadline && !cancel.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(10));
    }
    let samples = read_last.read_scans(scans)?;
    read_last.stop()?;

    for (k, channel) in channels.iter().enumerate() {
        let volts: Vec<f64> = samples
            .iter()
            .skip(k)
            .step_by(channels.len())
            .map(|&counts| Scaling::BOARD.counts_to_volts(counts))
            .collect();
        let min = volts.iter().copied().fold(f64::INFINITY, f64::min);
        let max = volts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = volts.iter().sum::<f64>() / volts.len().max(1) as f64;
        println!("AI {channel:>2}: min {min:.4} V, max {max:.4} V, mean {mean:.4} V");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn acquire(
    device: Digidata,
    config: &AppConfig,
    inputs: &[String],
    outputs: &[String],
    scans: usize,
    scan_interval_us: f64,
    out: Option<PathBuf>,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let board = config.board_config().build(device)?;
    board.set_cancel_flag(cancel.clone());

    let levels = outputs
        .iter()
        .map(|spec| parse_level(spec))
        .collect::<Result<Vec<_>>>()?;
    let waveforms: Vec<Vec<f64>> = levels.iter().map(|(_, level)| vec![*level; scans]).collect();
    let outputs: Vec<(&str, &[f64])> = levels
        .iter()
        .zip(&waveforms)
        .map(|((name, _), waveform)| (name.as_str(), waveform.as_slice()))
        .collect();
    let inputs: Vec<&str> = inputs.iter().map(String::as_str).collect();

    info!(inputs = ?inputs, scans, scan_interval_us, "Recording");
    let recording = if outputs.is_empty() {
        board.record(&inputs, scans, scan_interval_us)?
    } else {
        board.acquire(&inputs, &outputs, scan_interval_us)?
    };
    if cancel.load(Ordering::Relaxed) {
        warn!(scans = recording.len(), "Recording interrupted");
    }

    let path = out.unwrap_or_else(|| {
        config.acquisition.output_dir.join(format!(
            "recording_{}.csv",
            Local::now().format("%Y%m%d_%H%M%S")
        ))
    });
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    recording.save_csv(&path)?;
    println!("Saved {} scans to {}", recording.len(), path.display());
    Ok(())
}

fn parse_level(spec: &str) -> Result<(String, f64)> {
    let (name, value) = spec
        .split_once('=')
        .with_context(|| format!("Expected NAME=VALUE, got '{spec}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid level for output '{name}'"))?;
    Ok((name.trim().to_string(), value))
}

fn parse_word(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid word '{text}': {e}"))
}

fn counts_from(value: f64) -> Result<i16> {
    if value.fract() != 0.0 || value < f64::from(i16::MIN) || value > f64::from(i16::MAX) {
        bail!("{value} is not a valid count; use --volts for a level in volts");
    }
    Ok(value as i16)
}
