//! Acquisition protocol configuration.
//!
//! A [`Protocol`] describes how the board samples: the interval between
//! individual conversions, the analog input and output scan lists, when to
//! start and when to stop. The driver consumes it as a `DD132X_Protocol`
//! record; [`Protocol::to_raw`] and [`Protocol::from_raw`] convert between
//! the two.
//!
//! # Example
//!
//! ```
//! use daq_driver_digidata::{AoChannel, Protocol, ProtocolFlags};
//!
//! let protocol = Protocol::builder()
//!     .sample_interval_us(50.0)
//!     .ai_channels(&[0, 1])
//!     .ao_channels(&[AoChannel::Analog(0)])
//!     .flags(ProtocolFlags::STOP_ON_TC)
//!     .terminal_count(20_000)
//!     .build()?;
//! assert_eq!(protocol.scan_interval_us(), 100.0);
//! # Ok::<(), daq_driver_digidata::DigidataError>(())
//! ```

use std::os::raw::c_int;

use bitflags::bitflags;

use axdd132x_sys as sys;
use axdd132x_sys::DD132X_Protocol;

use crate::error::{DigidataError, Result};

/// Number of analog input channels on the board.
pub const AI_CHANNELS: u32 = sys::DD132X_MAXAICHANNELS as u32;
/// Number of analog output channels addressable by the driver.
pub const AO_CHANNELS: u32 = sys::DD132X_MAXAOCHANNELS as u32;
/// Maximum entries in either scan list.
pub const SCAN_LIST_SIZE: usize = sys::DD132X_SCANLIST_SIZE;

/// Default chunk rate, matching the driver's own default.
pub const DEFAULT_CHUNKS_PER_SECOND: u32 = 20;

bitflags! {
    /// Options carried in the protocol's flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProtocolFlags: u32 {
        /// Stop once the terminal count has been reached.
        const STOP_ON_TC = sys::DD132X_PROTOCOL_STOPONTC;
    }
}

/// How an acquisition starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Triggering {
    #[default]
    Immediate,
    External,
    Line,
}

impl Triggering {
    fn to_raw(self) -> c_int {
        match self {
            Self::Immediate => sys::DD132X_StartImmediately,
            Self::External => sys::DD132X_ExternalStart,
            Self::Line => sys::DD132X_LineTrigger,
        }
    }

    fn from_raw(raw: c_int) -> Result<Self> {
        match raw {
            sys::DD132X_StartImmediately => Ok(Self::Immediate),
            sys::DD132X_ExternalStart => Ok(Self::External),
            sys::DD132X_LineTrigger => Ok(Self::Line),
            other => Err(invalid(format!("unknown triggering mode {other}"))),
        }
    }
}

/// What the low bits of each input sample carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiDataBits {
    /// All 16 bits are ADC data.
    #[default]
    Data,
    /// Bit 0 flags the external start.
    ExternalStart,
    /// Bit 0 flags the line trigger.
    Line,
    /// Bit 0 carries the tag input.
    Tag,
    /// Bit 0 tag, bit 1 external start.
    TagExternalStart,
    /// Bit 0 tag, bit 1 line trigger.
    TagLine,
}

impl AiDataBits {
    fn to_raw(self) -> c_int {
        match self {
            Self::Data => sys::DD132X_Bit0Data,
            Self::ExternalStart => sys::DD132X_Bit0ExtStart,
            Self::Line => sys::DD132X_Bit0Line,
            Self::Tag => sys::DD132X_Bit0Tag,
            Self::TagExternalStart => sys::DD132X_Bit0Tag_Bit1ExtStart,
            Self::TagLine => sys::DD132X_Bit0Tag_Bit1Line,
        }
    }

    fn from_raw(raw: c_int) -> Result<Self> {
        match raw {
            sys::DD132X_Bit0Data => Ok(Self::Data),
            sys::DD132X_Bit0ExtStart => Ok(Self::ExternalStart),
            sys::DD132X_Bit0Line => Ok(Self::Line),
            sys::DD132X_Bit0Tag => Ok(Self::Tag),
            sys::DD132X_Bit0Tag_Bit1ExtStart => Ok(Self::TagExternalStart),
            sys::DD132X_Bit0Tag_Bit1Line => Ok(Self::TagLine),
            other => Err(invalid(format!("unknown AI data bits mode {other}"))),
        }
    }
}

/// One entry of the analog output scan list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AoChannel {
    /// A DAC channel.
    Analog(u8),
    /// The digital output word, sequenced like an analog channel.
    Digital,
    /// A placeholder slot that outputs nothing.
    Null,
}

impl AoChannel {
    fn to_raw(self) -> i32 {
        match self {
            Self::Analog(channel) => i32::from(channel),
            Self::Digital => sys::DD132X_PROTOCOL_DIGITALOUTPUT,
            Self::Null => sys::DD132X_PROTOCOL_NULLOUTPUT,
        }
    }

    fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            sys::DD132X_PROTOCOL_DIGITALOUTPUT => Ok(Self::Digital),
            sys::DD132X_PROTOCOL_NULLOUTPUT => Ok(Self::Null),
            n if (0..AO_CHANNELS as i32).contains(&n) => Ok(Self::Analog(n as u8)),
            other => Err(invalid(format!("unknown AO scan list entry {other:#x}"))),
        }
    }
}

/// Source of the output pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPulseType {
    #[default]
    None,
    /// Pulse when an ADC channel crosses a threshold.
    AdcLevel,
    /// Pulse follows bit 0 of the DAC stream.
    DacBit0,
}

/// Output pulse settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPulse {
    pub kind: OutputPulseType,
    /// `true` for a positive-going pulse.
    pub positive: bool,
    /// ADC channel watched in [`OutputPulseType::AdcLevel`] mode.
    pub channel: i16,
    pub threshold: u16,
    pub hysteresis: u16,
}

impl Default for OutputPulse {
    fn default() -> Self {
        Self {
            kind: OutputPulseType::None,
            positive: true,
            channel: 0,
            threshold: 0,
            hysteresis: 0,
        }
    }
}

/// Acquisition settings handed to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    /// Time between consecutive conversions, in microseconds. Channels in a
    /// scan list are sampled one after another at this interval.
    pub sample_interval_us: f64,
    pub flags: ProtocolFlags,
    pub triggering: Triggering,
    pub ai_data_bits: AiDataBits,
    pub ai_channels: Vec<u8>,
    pub ao_channels: Vec<AoChannel>,
    /// Sample count at which a `STOP_ON_TC` acquisition ends.
    pub terminal_count: i64,
    pub output_pulse: OutputPulse,
    pub chunks_per_second: u32,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            sample_interval_us: 100.0,
            flags: ProtocolFlags::empty(),
            triggering: Triggering::default(),
            ai_data_bits: AiDataBits::default(),
            ai_channels: Vec::new(),
            ao_channels: Vec::new(),
            terminal_count: 0,
            output_pulse: OutputPulse::default(),
            chunks_per_second: DEFAULT_CHUNKS_PER_SECOND,
        }
    }
}

fn invalid(message: String) -> DigidataError {
    DigidataError::InvalidConfig { message }
}

impl Protocol {
    /// Create a new builder for a protocol.
    pub fn builder() -> ProtocolBuilder {
        ProtocolBuilder {
            protocol: Self::default(),
        }
    }

    /// Check the settings against the board's limits.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_interval_us.is_finite() && self.sample_interval_us > 0.0) {
            return Err(invalid(format!(
                "sample interval must be positive, got {} us",
                self.sample_interval_us
            )));
        }
        if self.chunks_per_second == 0 {
            return Err(invalid("chunks per second must be positive".to_string()));
        }
        if self.terminal_count < 0 {
            return Err(invalid(format!(
                "terminal count must not be negative, got {}",
                self.terminal_count
            )));
        }
        for len in [self.ai_channels.len(), self.ao_channels.len()] {
            if len > SCAN_LIST_SIZE {
                return Err(DigidataError::ScanListTooLong {
                    len,
                    max: SCAN_LIST_SIZE,
                });
            }
        }
        if let Some(&channel) = self.ai_channels.iter().find(|&&c| u32::from(c) >= AI_CHANNELS) {
            return Err(DigidataError::InvalidChannel {
                channel: channel.into(),
                max: AI_CHANNELS,
            });
        }
        for entry in &self.ao_channels {
            if let AoChannel::Analog(channel) = *entry {
                if u32::from(channel) >= AO_CHANNELS {
                    return Err(DigidataError::InvalidChannel {
                        channel: channel.into(),
                        max: AO_CHANNELS,
                    });
                }
            }
        }
        Ok(())
    }

    /// Time for one pass over the input scan list, in microseconds.
    pub fn scan_interval_us(&self) -> f64 {
        self.sample_interval_us * self.ai_channels.len().max(1) as f64
    }

    /// Conversions per second.
    pub fn sample_rate_hz(&self) -> f64 {
        1e6 / self.sample_interval_us
    }

    /// Whether the acquisition ends on its own at the terminal count.
    pub fn stops_on_terminal_count(&self) -> bool {
        self.flags.contains(ProtocolFlags::STOP_ON_TC) && self.terminal_count > 0
    }

    /// Record form, with no buffers attached.
    pub fn to_raw(&self) -> Result<DD132X_Protocol> {
        self.validate()?;
        let mut raw = DD132X_Protocol::default();
        raw.dSampleInterval = self.sample_interval_us;
        raw.dwFlags = self.flags.bits();
        raw.eTriggering = self.triggering.to_raw();
        raw.eAIDataBits = self.ai_data_bits.to_raw();

        let mut ai = [0i32; SCAN_LIST_SIZE];
        for (slot, &channel) in ai.iter_mut().zip(&self.ai_channels) {
            *slot = i32::from(channel);
        }
        raw.uAIChannels = self.ai_channels.len() as u32;
        raw.anAIChannels = ai;

        let mut ao = [0i32; SCAN_LIST_SIZE];
        for (slot, channel) in ao.iter_mut().zip(&self.ao_channels) {
            *slot = channel.to_raw();
        }
        raw.uAOChannels = self.ao_channels.len() as u32;
        raw.anAOChannels = ao;

        raw.uTerminalCount = self.terminal_count;
        raw.eOutputPulseType = match self.output_pulse.kind {
            OutputPulseType::None => sys::DD132X_NoOutputPulse,
            OutputPulseType::AdcLevel => sys::DD132X_ADC_level_Triggered,
            OutputPulseType::DacBit0 => sys::DD132X_DAC_bit0_Triggered,
        };
        raw.bOutputPulsePolarity = i16::from(self.output_pulse.positive);
        raw.nOutputPulseChannel = self.output_pulse.channel;
        raw.wOutputPulseThreshold = self.output_pulse.threshold;
        raw.wOutputPulseHystDelta = self.output_pulse.hysteresis;
        raw.uChunksPerSecond = self.chunks_per_second;
        Ok(raw)
    }

    /// Typed form of a record read back from the driver. Buffer pointers
    /// are ignored.
    pub fn from_raw(raw: &DD132X_Protocol) -> Result<Self> {
        let n_ai = raw.uAIChannels as usize;
        let n_ao = raw.uAOChannels as usize;
        for len in [n_ai, n_ao] {
            if len > SCAN_LIST_SIZE {
                return Err(DigidataError::ScanListTooLong {
                    len,
                    max: SCAN_LIST_SIZE,
                });
            }
        }
        let ai_raw = { raw.anAIChannels };
        let ai_channels = ai_raw[..n_ai]
            .iter()
            .map(|&c| {
                u8::try_from(c)
                    .ok()
                    .filter(|&c| u32::from(c) < AI_CHANNELS)
                    .ok_or_else(|| invalid(format!("unknown AI scan list entry {c}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let ao_raw = { raw.anAOChannels };
        let ao_channels = ao_raw[..n_ao]
            .iter()
            .map(|&c| AoChannel::from_raw(c))
            .collect::<Result<Vec<_>>>()?;

        let kind = match raw.eOutputPulseType {
            sys::DD132X_NoOutputPulse => OutputPulseType::None,
            sys::DD132X_ADC_level_Triggered => OutputPulseType::AdcLevel,
            sys::DD132X_DAC_bit0_Triggered => OutputPulseType::DacBit0,
            other => return Err(invalid(format!("unknown output pulse type {other}"))),
        };

        Ok(Self {
            sample_interval_us: raw.dSampleInterval,
            flags: ProtocolFlags::from_bits_retain(raw.dwFlags),
            triggering: Triggering::from_raw(raw.eTriggering)?,
            ai_data_bits: AiDataBits::from_raw(raw.eAIDataBits)?,
            ai_channels,
            ao_channels,
            terminal_count: raw.uTerminalCount,
            output_pulse: OutputPulse {
                kind,
                positive: raw.bOutputPulsePolarity != 0,
                channel: raw.nOutputPulseChannel,
                threshold: raw.wOutputPulseThreshold,
                hysteresis: raw.wOutputPulseHystDelta,
            },
            chunks_per_second: raw.uChunksPerSecond,
        })
    }
}

/// Builder for [`Protocol`].
#[derive(Debug, Clone)]
pub struct ProtocolBuilder {
    protocol: Protocol,
}

impl ProtocolBuilder {
    /// Set the interval between conversions in microseconds.
    pub fn sample_interval_us(mut self, interval: f64) -> Self {
        self.protocol.sample_interval_us = interval;
        self
    }

    pub fn flags(mut self, flags: ProtocolFlags) -> Self {
        self.protocol.flags = flags;
        self
    }

    pub fn triggering(mut self, triggering: Triggering) -> Self {
        self.protocol.triggering = triggering;
        self
    }

    pub fn ai_data_bits(mut self, bits: AiDataBits) -> Self {
        self.protocol.ai_data_bits = bits;
        self
    }

    /// Set the analog input scan list.
    pub fn ai_channels(mut self, channels: &[u8]) -> Self {
        self.protocol.ai_channels = channels.to_vec();
        self
    }

    /// Set the analog output scan list.
    pub fn ao_channels(mut self, channels: &[AoChannel]) -> Self {
        self.protocol.ao_channels = channels.to_vec();
        self
    }

    pub fn terminal_count(mut self, count: i64) -> Self {
        self.protocol.terminal_count = count;
        self
    }

    pub fn output_pulse(mut self, pulse: OutputPulse) -> Self {
        self.protocol.output_pulse = pulse;
        self
    }

    pub fn chunks_per_second(mut self, chunks: u32) -> Self {
        self.protocol.chunks_per_second = chunks;
        self
    }

    /// Build the protocol.
    pub fn build(self) -> Result<Protocol> {
        self.protocol.validate()?;
        Ok(self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
        assert_eq!(protocol.chunks_per_second, 20);
        assert_eq!(protocol.triggering, Triggering::Immediate);
        assert!(!protocol.stops_on_terminal_count());
        assert!((protocol.sample_rate_hz() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_settings() {
        assert!(Protocol::builder().sample_interval_us(0.0).build().is_err());
        assert!(Protocol::builder().sample_interval_us(f64::NAN).build().is_err());
        assert!(Protocol::builder().chunks_per_second(0).build().is_err());
        assert!(matches!(
            Protocol::builder().ai_channels(&[16]).build(),
            Err(DigidataError::InvalidChannel { channel: 16, .. })
        ));
        assert!(matches!(
            Protocol::builder().ai_channels(&[0; 65]).build(),
            Err(DigidataError::ScanListTooLong { len: 65, max: 64 })
        ));
        assert!(Protocol::builder().ai_channels(&[0; 64]).build().is_ok());
        assert!(Protocol::builder()
            .ao_channels(&[AoChannel::Analog(16)])
            .build()
            .is_err());
    }

    #[test]
    fn test_raw_record_fields() {
        let protocol = Protocol::builder()
            .sample_interval_us(25.0)
            .ai_channels(&[3, 1])
            .ao_channels(&[AoChannel::Analog(1), AoChannel::Digital, AoChannel::Null])
            .flags(ProtocolFlags::STOP_ON_TC)
            .terminal_count(1000)
            .build()
            .unwrap();
        let raw = protocol.to_raw().unwrap();
        assert_eq!(raw.uLength as usize, std::mem::size_of::<DD132X_Protocol>());
        assert_eq!({ raw.uAIChannels }, 2);
        let (ai, ao) = (raw.anAIChannels, raw.anAOChannels);
        assert_eq!(ai[..2], [3, 1]);
        assert_eq!(ao[..3], [1, 0x40, 0x50]);
        assert_eq!({ raw.dwFlags }, 1);
        assert_eq!({ raw.uChunksPerSecond }, 20);
        assert_eq!({ raw.bOutputPulsePolarity }, 1);
        assert!({ raw.pAIBuffers }.is_null());

        assert_eq!(Protocol::from_raw(&raw).unwrap(), protocol);
    }

    #[test]
    fn test_from_raw_rejects_garbage() {
        let mut raw = DD132X_Protocol::default();
        raw.uAIChannels = 65;
        assert!(Protocol::from_raw(&raw).is_err());

        let mut raw = DD132X_Protocol::default();
        raw.uAOChannels = 1;
        let mut ao = [0; SCAN_LIST_SIZE];
        ao[0] = 0x33;
        raw.anAOChannels = ao;
        assert!(Protocol::from_raw(&raw).is_err());
    }
}
