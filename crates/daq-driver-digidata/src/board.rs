//! Named channels on top of a [`Digidata`].
//!
//! A [`Board`] maps names to analog inputs, analog outputs and digital
//! output bits, each with a gain, and runs whole acquisitions in physical
//! units:
//!
//! - input gains are in volts per unit, so a reading is `volts / gain`;
//! - output gains are in volts per unit, so a command is `value * gain` volts;
//! - digital output waveforms set their bit wherever the value is non-zero.
//!
//! Aliases give additional names to channels and may chain.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::acquisition::Acquisition;
use crate::buffer::BufferList;
use crate::calibration::Scaling;
use crate::device::Digidata;
use crate::error::{DigidataError, Result};
use crate::protocol::{AoChannel, Protocol, ProtocolFlags, AI_CHANNELS, AO_CHANNELS, DEFAULT_CHUNKS_PER_SECOND};

/// Upper bound on the nodes in each buffer ring.
const MAX_RING_BUFFERS: usize = 16;
/// Bits in the digital output word.
const DIGITAL_OUTPUT_BITS: u8 = 16;
/// Slack added to the expected duration before a wait times out.
const WAIT_MARGIN: Duration = Duration::from_secs(2);

/// A named analog input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogInput {
    pub channel: u8,
    /// Volts per unit.
    pub gain: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// A named analog output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogOutput {
    pub channel: u8,
    /// Volts per unit.
    pub gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Output {
    Analog(AnalogOutput),
    Digital(u8),
}

/// Board layout as read from configuration.
///
/// ```toml
/// [analog_inputs.Vm]
/// channel = 0
/// gain = 0.01
///
/// [analog_outputs.Ic]
/// channel = 0
/// gain = 0.002
///
/// [digital_outputs]
/// shutter = 3
///
/// [aliases]
/// V = "Vm"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub analog_inputs: BTreeMap<String, AnalogInput>,
    pub analog_outputs: BTreeMap<String, AnalogOutput>,
    /// Name to bit of the digital output word.
    pub digital_outputs: BTreeMap<String, u8>,
    /// Alias to channel (or alias) name.
    pub aliases: BTreeMap<String, String>,
    pub chunks_per_second: Option<u32>,
}

impl BoardConfig {
    /// Parse a board layout from TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DigidataError::InvalidConfig {
            message: format!("board configuration: {e}"),
        })
    }

    /// Check names and channel numbers without touching hardware.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        let names = self
            .analog_inputs
            .keys()
            .chain(self.analog_outputs.keys())
            .chain(self.digital_outputs.keys());
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(DigidataError::InvalidConfig {
                    message: format!("channel name '{name}' is used more than once"),
                });
            }
        }
        for alias in self.aliases.keys() {
            if seen.contains(alias.as_str()) {
                return Err(DigidataError::InvalidConfig {
                    message: format!("alias '{alias}' shadows a channel"),
                });
            }
        }
        // Building an unattached board runs every per-channel check.
        self.populate(&mut Layout::default())
    }

    /// A board over `device` with this layout.
    pub fn build(&self, device: Digidata) -> Result<Board> {
        self.validate()?;
        let board = Board::new(device);
        {
            let mut layout = board.layout.lock();
            self.populate(&mut layout)?;
        }
        if let Some(chunks) = self.chunks_per_second {
            board.set_chunks_per_second(chunks)?;
        }
        Ok(board)
    }

    fn populate(&self, layout: &mut Layout) -> Result<()> {
        for (name, input) in &self.analog_inputs {
            layout.add_input(name, *input)?;
        }
        for (name, output) in &self.analog_outputs {
            layout.add_output(name, Output::Analog(*output))?;
        }
        for (name, &bit) in &self.digital_outputs {
            layout.add_output(name, Output::Digital(bit))?;
        }
        layout.add_aliases(&self.aliases)
    }
}

#[derive(Debug, Default)]
struct Layout {
    inputs: BTreeMap<String, AnalogInput>,
    outputs: BTreeMap<String, Output>,
    aliases: HashMap<String, String>,
    chunks_per_second: Option<u32>,
}

fn check_gain(name: &str, gain: f64) -> Result<()> {
    if gain.is_finite() && gain != 0.0 {
        Ok(())
    } else {
        Err(DigidataError::InvalidConfig {
            message: format!("gain of '{name}' must be finite and non-zero, got {gain}"),
        })
    }
}

impl Layout {
    fn add_input(&mut self, name: &str, input: AnalogInput) -> Result<()> {
        if u32::from(input.channel) >= AI_CHANNELS {
            return Err(DigidataError::InvalidChannel {
                channel: input.channel.into(),
                max: AI_CHANNELS,
            });
        }
        check_gain(name, input.gain)?;
        if let (Some(min), Some(max)) = (input.min, input.max) {
            if min >= max {
                return Err(DigidataError::InvalidConfig {
                    message: format!("range of '{name}' is empty: {min} >= {max}"),
                });
            }
        }
        let full_scale = Scaling::BOARD.full_scale_volts;
        for bound in [input.min, input.max].into_iter().flatten() {
            if (bound * input.gain).abs() > full_scale {
                return Err(DigidataError::InvalidConfig {
                    message: format!("range of '{name}' exceeds ±{full_scale} V at gain {}", input.gain),
                });
            }
        }
        self.inputs.insert(name.to_string(), input);
        Ok(())
    }

    fn add_output(&mut self, name: &str, output: Output) -> Result<()> {
        match output {
            Output::Analog(analog) => {
                if u32::from(analog.channel) >= AO_CHANNELS {
                    return Err(DigidataError::InvalidChannel {
                        channel: analog.channel.into(),
                        max: AO_CHANNELS,
                    });
                }
                check_gain(name, analog.gain)?;
            }
            Output::Digital(bit) => {
                if bit >= DIGITAL_OUTPUT_BITS {
                    return Err(DigidataError::InvalidChannel {
                        channel: bit.into(),
                        max: DIGITAL_OUTPUT_BITS.into(),
                    });
                }
            }
        }
        self.outputs.insert(name.to_string(), output);
        Ok(())
    }

    fn check_not_channel(&self, alias: &str) -> Result<()> {
        if self.inputs.contains_key(alias) || self.outputs.contains_key(alias) {
            return Err(DigidataError::InvalidConfig {
                message: format!("alias '{alias}' shadows a channel"),
            });
        }
        Ok(())
    }

    fn add_alias(&mut self, alias: &str, target: &str) -> Result<()> {
        self.check_not_channel(alias)?;
        let previous = self.aliases.insert(alias.to_string(), target.to_string());
        if let Err(e) = self.resolve(alias) {
            match previous {
                Some(previous) => self.aliases.insert(alias.to_string(), previous),
                None => self.aliases.remove(alias),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Add a set of aliases that may refer to each other in any order.
    fn add_aliases(&mut self, aliases: &BTreeMap<String, String>) -> Result<()> {
        aliases.keys().try_for_each(|alias| self.check_not_channel(alias))?;
        self.aliases
            .extend(aliases.iter().map(|(alias, target)| (alias.clone(), target.clone())));
        aliases.keys().try_for_each(|alias| self.resolve(alias).map(drop))
    }

    /// Follow aliases to a channel name.
    fn resolve<'a>(&'a self, name: &'a str) -> Result<&'a str> {
        let mut current = name;
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(current) {
                Some(target) => current = target.as_str(),
                None => {
                    return if self.inputs.contains_key(current) || self.outputs.contains_key(current) {
                        Ok(current)
                    } else {
                        Err(DigidataError::UnknownChannel {
                            name: name.to_string(),
                        })
                    };
                }
            }
        }
        Err(DigidataError::AliasLoop {
            name: name.to_string(),
        })
    }

    fn input(&self, name: &str) -> Result<AnalogInput> {
        let resolved = self.resolve(name)?;
        self.inputs
            .get(resolved)
            .copied()
            .ok_or_else(|| DigidataError::UnknownChannel { name: name.to_string() })
    }

    fn output(&self, name: &str) -> Result<Output> {
        let resolved = self.resolve(name)?;
        self.outputs
            .get(resolved)
            .copied()
            .ok_or_else(|| DigidataError::UnknownChannel { name: name.to_string() })
    }
}

/// Signals from one acquisition, in physical units.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    /// Host time at which the acquisition started, if the driver reported it.
    pub start_time: Option<NaiveDateTime>,
    /// Time between consecutive scans, in microseconds.
    pub scan_interval_us: f64,
    /// Inputs in request order, then outputs.
    pub signals: Vec<(String, Vec<f64>)>,
}

impl Recording {
    /// Scans per signal.
    pub fn len(&self) -> usize {
        self.signals.first().map_or(0, |(_, values)| values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signal(&self, name: &str) -> Option<&[f64]> {
        self.signals
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Time of each scan relative to the start, in seconds.
    pub fn times(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| i as f64 * self.scan_interval_us / 1e6)
            .collect()
    }

    /// Write a `t` column followed by one column per signal.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        let mut header = vec!["t".to_string()];
        header.extend(self.signals.iter().map(|(name, _)| name.clone()));
        csv.write_record(&header)?;

        for (i, t) in self.times().into_iter().enumerate() {
            let mut row = Vec::with_capacity(self.signals.len() + 1);
            row.push(t.to_string());
            for (_, values) in &self.signals {
                row.push(values.get(i).map(f64::to_string).unwrap_or_default());
            }
            csv.write_record(&row)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_csv(std::io::BufWriter::new(file))?;
        info!(path = %path.as_ref().display(), scans = self.len(), "Saved recording");
        Ok(())
    }
}

/// Named-channel access to a board.
pub struct Board {
    device: Digidata,
    scaling: Scaling,
    layout: Mutex<Layout>,
    /// Last digital output word written through this board.
    digital_word: Mutex<u32>,
    cancel: Mutex<Option<Arc<AtomicBool>>>,
}

impl Board {
    pub fn new(device: Digidata) -> Self {
        Self {
            device,
            scaling: Scaling::BOARD,
            layout: Mutex::new(Layout::default()),
            digital_word: Mutex::new(0),
            cancel: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &Digidata {
        &self.device
    }

    /// Flag that ends a running acquisition early when set. The recording
    /// then holds only the scans completed so far.
    pub fn set_cancel_flag(&self, flag: Arc<AtomicBool>) {
        *self.cancel.lock() = Some(flag);
    }

    pub fn set_analog_input(&self, name: &str, channel: u8, gain: f64) -> Result<()> {
        self.layout.lock().add_input(
            name,
            AnalogInput {
                channel,
                gain,
                min: None,
                max: None,
            },
        )
    }

    /// Declare the expected range of an input, in its own units.
    pub fn set_input_range(&self, name: &str, min: f64, max: f64) -> Result<()> {
        let mut layout = self.layout.lock();
        let resolved = layout.resolve(name)?.to_string();
        let mut input = layout.input(&resolved)?;
        input.min = Some(min);
        input.max = Some(max);
        layout.add_input(&resolved, input)
    }

    pub fn set_analog_output(&self, name: &str, channel: u8, gain: f64) -> Result<()> {
        self.layout
            .lock()
            .add_output(name, Output::Analog(AnalogOutput { channel, gain }))
    }

    pub fn set_digital_output(&self, name: &str, bit: u8) -> Result<()> {
        self.layout.lock().add_output(name, Output::Digital(bit))
    }

    /// Make `alias` another name for `target`.
    ///
    /// # Errors
    ///
    /// [`DigidataError::AliasLoop`] if the alias would resolve to itself,
    /// [`DigidataError::UnknownChannel`] if the chain ends nowhere,
    /// [`DigidataError::InvalidConfig`] if `alias` is already a channel name.
    pub fn set_alias(&self, alias: &str, target: &str) -> Result<()> {
        self.layout.lock().add_alias(alias, target)
    }

    /// The channel name `name` refers to.
    pub fn resolve(&self, name: &str) -> Result<String> {
        self.layout.lock().resolve(name).map(str::to_string)
    }

    pub fn set_chunks_per_second(&self, chunks: u32) -> Result<()> {
        if chunks == 0 {
            return Err(DigidataError::InvalidConfig {
                message: "chunks per second must be positive".to_string(),
            });
        }
        self.layout.lock().chunks_per_second = Some(chunks);
        Ok(())
    }

    /// Single-shot read of a named input, in its units.
    pub fn read(&self, name: &str) -> Result<f64> {
        let input = self.layout.lock().input(name)?;
        let counts = self.device.read_ai(input.channel.into())?;
        Ok(self.scaling.counts_to_volts(counts) / input.gain)
    }

    /// Single-shot write of a named output, in its units.
    pub fn write(&self, name: &str, value: f64) -> Result<()> {
        let output = self.layout.lock().output(name)?;
        match output {
            Output::Analog(analog) => {
                let counts = self.scaling.volts_to_counts(value * analog.gain);
                self.device.write_ao(analog.channel.into(), counts)
            }
            Output::Digital(bit) => {
                let mut word = self.digital_word.lock();
                let next = if value != 0.0 { *word | (1 << bit) } else { *word & !(1 << bit) };
                self.device.write_do(next)?;
                *word = next;
                Ok(())
            }
        }
    }

    /// Record `inputs` while playing `outputs`, one value per scan.
    ///
    /// The outputs set the length of the acquisition and must all have the
    /// same length. `scan_interval_us` is the time between scans.
    pub fn acquire(&self, inputs: &[&str], outputs: &[(&str, &[f64])], scan_interval_us: f64) -> Result<Recording> {
        let Some((_, first)) = outputs.first() else {
            return Err(DigidataError::InvalidConfig {
                message: "at least one output is needed to set the acquisition length".to_string(),
            });
        };
        let scans = first.len();
        if let Some((name, values)) = outputs.iter().find(|(_, values)| values.len() != scans) {
            return Err(DigidataError::InvalidConfig {
                message: format!(
                    "output '{name}' has {} samples, expected {scans} like the others",
                    values.len()
                ),
            });
        }
        self.run(inputs, outputs, scans, scan_interval_us)
    }

    /// Record `inputs` for `scans` scans without driving any output.
    pub fn record(&self, inputs: &[&str], scans: usize, scan_interval_us: f64) -> Result<Recording> {
        self.run(inputs, &[], scans, scan_interval_us)
    }

    fn run(&self, inputs: &[&str], outputs: &[(&str, &[f64])], scans: usize, scan_interval_us: f64) -> Result<Recording> {
        if inputs.is_empty() {
            return Err(DigidataError::InvalidConfig {
                message: "at least one input is required".to_string(),
            });
        }
        if scans == 0 {
            return Err(DigidataError::InvalidConfig {
                message: "acquisition needs at least one scan".to_string(),
            });
        }
        if !(scan_interval_us.is_finite() && scan_interval_us > 0.0) {
            return Err(DigidataError::InvalidConfig {
                message: format!("scan interval must be positive, got {scan_interval_us} us"),
            });
        }

        let (input_specs, analog_outputs, digital_outputs, chunks) = {
            let layout = self.layout.lock();
            let input_specs = inputs
                .iter()
                .map(|name| layout.input(name))
                .collect::<Result<Vec<_>>>()?;
            let mut analog = Vec::new();
            let mut digital = Vec::new();
            for &(name, values) in outputs {
                match layout.output(name)? {
                    Output::Analog(spec) => analog.push((spec, values)),
                    Output::Digital(bit) => digital.push((bit, values)),
                }
            }
            (input_specs, analog, digital, layout.chunks_per_second)
        };

        let mut ao_channels: Vec<AoChannel> = analog_outputs
            .iter()
            .map(|(spec, _)| AoChannel::Analog(spec.channel))
            .collect();
        if !digital_outputs.is_empty() {
            ao_channels.push(AoChannel::Digital);
        }

        let n_ai = input_specs.len();
        let total_input = scans * n_ai;
        let protocol = Protocol::builder()
            .sample_interval_us(scan_interval_us / n_ai as f64)
            .ai_channels(&input_specs.iter().map(|i| i.channel).collect::<Vec<_>>())
            .ao_channels(&ao_channels)
            .flags(ProtocolFlags::STOP_ON_TC)
            .terminal_count(total_input as i64)
            .chunks_per_second(chunks.unwrap_or(DEFAULT_CHUNKS_PER_SECOND))
            .build()?;

        let output = if ao_channels.is_empty() {
            None
        } else {
            let samples = self.interleave_outputs(&analog_outputs, &digital_outputs, scans);
            let count = ring_buffers(samples.len());
            Some(BufferList::from_samples(samples, count)?)
        };
        let input = BufferList::new(total_input, ring_buffers(total_input))?;

        debug!(inputs = ?inputs, scans, scan_interval_us, "Starting board acquisition");
        let mut acquisition = Acquisition::new(&self.device, protocol, Some(input), output)?;
        if let Some(flag) = self.cancel.lock().clone() {
            acquisition.set_cancel_flag(flag);
        }
        acquisition.start()?;
        let expected = Duration::from_secs_f64(scans as f64 * scan_interval_us * 1e-6);
        acquisition.wait_for_completion(expected + WAIT_MARGIN)?;
        let data = acquisition.finish()?;
        let completed = data.input.len() / n_ai;
        if completed < scans {
            info!(completed, scans, "Acquisition ended early");
        }

        let mut signals: Vec<(String, Vec<f64>)> = inputs
            .iter()
            .zip(&input_specs)
            .enumerate()
            .map(|(k, (name, spec))| {
                let values = data
                    .input
                    .iter()
                    .take(completed * n_ai)
                    .skip(k)
                    .step_by(n_ai)
                    .map(|&counts| self.scaling.counts_to_volts(counts) / spec.gain)
                    .collect();
                (name.to_string(), values)
            })
            .collect();
        signals.extend(
            outputs
                .iter()
                .map(|(name, values)| (name.to_string(), values[..completed].to_vec())),
        );

        Ok(Recording {
            start_time: data.start_time.and_then(|s| s.wall_clock),
            scan_interval_us,
            signals,
        })
    }

    /// Output samples interleaved by scan: analog channels in order, then
    /// the digital word if any digital output is driven.
    fn interleave_outputs(
        &self,
        analog: &[(AnalogOutput, &[f64])],
        digital: &[(u8, &[f64])],
        scans: usize,
    ) -> Vec<i16> {
        let per_scan = analog.len() + usize::from(!digital.is_empty());
        let base_word = *self.digital_word.lock();
        let mut samples = Vec::with_capacity(scans * per_scan);
        for scan in 0..scans {
            for (spec, values) in analog {
                samples.push(self.scaling.volts_to_counts(values[scan] * spec.gain));
            }
            if !digital.is_empty() {
                let word = digital.iter().fold(base_word, |word, (bit, values)| {
                    if values[scan] != 0.0 {
                        word | (1 << bit)
                    } else {
                        word & !(1 << bit)
                    }
                });
                // The digital word occupies the low 16 bits of the sample.
                samples.push(word as u16 as i16);
            }
        }
        samples
    }
}

fn ring_buffers(samples: usize) -> usize {
    samples.clamp(1, MAX_RING_BUFFERS)
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = self.layout.lock();
        f.debug_struct("Board")
            .field("device", &self.device)
            .field("inputs", &layout.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &layout.outputs.keys().collect::<Vec<_>>())
            .field("aliases", &layout.aliases)
            .finish()
    }
}
