//! Calibration data, power-on defaults and count/volt scaling.

use bitflags::bitflags;

use axdd132x_sys as sys;
use axdd132x_sys::{DD132X_CalibrationData, DD132X_PowerOnData};

use crate::error::{DigidataError, Result};

bitflags! {
    /// Equipment status bits reported alongside calibration data.
    ///
    /// `DAC3` keeps the driver's published value, which overlaps `DAC0 | DAC1`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EquipmentStatus: u32 {
        const TERMINATOR = sys::DD132X_STATUS_TERMINATOR;
        const DRAM = sys::DD132X_STATUS_DRAM;
        const EEPROM = sys::DD132X_STATUS_EEPROM;
        const IN_SCAN_LIST = sys::DD132X_STATUS_INSCANLIST;
        const OUT_SCAN_LIST = sys::DD132X_STATUS_OUTSCANLIST;
        const CALIBRATION_MUX = sys::DD132X_STATUS_CALIBRATION_MUX;
        const INPUT_FIFO = sys::DD132X_STATUS_INPUT_FIFO;
        const OUTPUT_FIFO = sys::DD132X_STATUS_OUTPUT_FIFO;
        const LINE_FREQ_GEN = sys::DD132X_STATUS_LINEFREQ_GEN;
        const FPGA = sys::DD132X_STATUS_FPGA;
        const ADC0 = sys::DD132X_STATUS_ADC0;
        const DAC0 = sys::DD132X_STATUS_DAC0;
        const DAC1 = sys::DD132X_STATUS_DAC1;
        const DAC2 = sys::DD132X_STATUS_DAC2;
        const DAC3 = sys::DD132X_STATUS_DAC3;
        const DAC4 = sys::DD132X_STATUS_DAC4;
        const DAC5 = sys::DD132X_STATUS_DAC5;
        const DAC6 = sys::DD132X_STATUS_DAC6;
        const DAC7 = sys::DD132X_STATUS_DAC7;
        const DAC8 = sys::DD132X_STATUS_DAC8;
        const DAC9 = sys::DD132X_STATUS_DAC9;
        const DACA = sys::DD132X_STATUS_DACA;
        const DACB = sys::DD132X_STATUS_DACB;
        const DACC = sys::DD132X_STATUS_DACC;
        const DACD = sys::DD132X_STATUS_DACD;
        const DACE = sys::DD132X_STATUS_DACE;
        const DACF = sys::DD132X_STATUS_DACF;
    }
}

/// Per-converter calibration of one board.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationData {
    pub equipment_status: EquipmentStatus,
    pub adc_gain_ratio: f64,
    pub adc_offset: i16,
    /// Number of DACs on the board; only that many entries below are meaningful.
    pub dac_count: u16,
    pub dac_offsets: [i16; sys::DD132X_MAXAOCHANNELS],
    pub dac_gain_ratios: [f64; sys::DD132X_MAXAOCHANNELS],
}

impl CalibrationData {
    pub(crate) fn from_raw(raw: &DD132X_CalibrationData) -> Self {
        Self {
            equipment_status: EquipmentStatus::from_bits_retain(raw.uEquipmentStatus),
            adc_gain_ratio: raw.dADCGainRatio,
            adc_offset: raw.nADCOffset,
            dac_count: raw.wNumberOfDACs,
            dac_offsets: raw.anDACOffset,
            dac_gain_ratios: raw.adDACGainRatio,
        }
    }

    /// `(offset, gain ratio)` for each DAC present on the board.
    pub fn dacs(&self) -> impl Iterator<Item = (i16, f64)> + '_ {
        let n = usize::from(self.dac_count).min(sys::DD132X_MAXAOCHANNELS);
        self.dac_offsets[..n]
            .iter()
            .copied()
            .zip(self.dac_gain_ratios[..n].iter().copied())
    }
}

/// Output levels the board applies at power on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerOnOutputs {
    pub digital: u32,
    pub analog: [i16; sys::DD132X_MAXAOCHANNELS],
}

impl PowerOnOutputs {
    /// Build from a digital word and up to 16 analog levels; missing
    /// channels default to zero.
    pub fn new(digital: u32, analog: &[i16]) -> Result<Self> {
        if analog.len() > sys::DD132X_MAXAOCHANNELS {
            return Err(DigidataError::InvalidChannel {
                channel: analog.len() as u32 - 1,
                max: sys::DD132X_MAXAOCHANNELS as u32,
            });
        }
        let mut levels = [0; sys::DD132X_MAXAOCHANNELS];
        levels[..analog.len()].copy_from_slice(analog);
        Ok(Self {
            digital,
            analog: levels,
        })
    }

    pub(crate) fn from_raw(raw: &DD132X_PowerOnData) -> Self {
        Self {
            digital: raw.dwDigitalOuts,
            analog: raw.anAnalogOuts,
        }
    }

    pub(crate) fn to_raw(self) -> DD132X_PowerOnData {
        DD132X_PowerOnData {
            dwDigitalOuts: self.digital,
            anAnalogOuts: self.analog,
            ..DD132X_PowerOnData::default()
        }
    }
}

/// Linear conversion between converter counts and volts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    /// Volts at full scale.
    pub full_scale_volts: f64,
    /// Counts at full scale.
    pub full_scale_counts: f64,
}

impl Scaling {
    /// The Digidata 1322A convention: ±10 V over ±32767 counts.
    pub const BOARD: Self = Self {
        full_scale_volts: 10.0,
        full_scale_counts: 32767.0,
    };

    pub fn counts_to_volts(&self, counts: i16) -> f64 {
        f64::from(counts) * self.full_scale_volts / self.full_scale_counts
    }

    /// Nearest count for `volts`, clamped to the `i16` range.
    pub fn volts_to_counts(&self, volts: f64) -> i16 {
        let counts = (volts * self.full_scale_counts / self.full_scale_volts).round();
        if counts.is_nan() {
            0
        } else {
            counts.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
        }
    }
}

impl Default for Scaling {
    fn default() -> Self {
        Self::BOARD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_scaling() {
        let s = Scaling::BOARD;
        assert_eq!(s.volts_to_counts(10.0), 32767);
        assert_eq!(s.volts_to_counts(-10.0), -32767);
        assert_eq!(s.volts_to_counts(0.0), 0);
        assert!((s.counts_to_volts(32767) - 10.0).abs() < 1e-12);
        assert!((s.counts_to_volts(16384) - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_scaling_clamps() {
        let s = Scaling::BOARD;
        assert_eq!(s.volts_to_counts(50.0), i16::MAX);
        assert_eq!(s.volts_to_counts(-50.0), i16::MIN);
        assert_eq!(s.volts_to_counts(f64::NAN), 0);
    }

    #[test]
    fn test_equipment_status_keeps_unknown_bits() {
        let status = EquipmentStatus::from_bits_retain(0x8000_0001);
        assert!(status.contains(EquipmentStatus::TERMINATOR));
        assert_eq!(status.bits(), 0x8000_0001);
        assert!(EquipmentStatus::DAC3.contains(EquipmentStatus::DAC0 | EquipmentStatus::DAC1));
    }

    #[test]
    fn test_power_on_outputs_bounds() {
        let outputs = PowerOnOutputs::new(0b101, &[100, -100]).unwrap();
        assert_eq!(outputs.analog[1], -100);
        assert_eq!(outputs.analog[2], 0);
        let raw = outputs.to_raw();
        assert_eq!({ raw.uLength }, 40);
        assert_eq!(PowerOnOutputs::from_raw(&raw), outputs);

        assert!(PowerOnOutputs::new(0, &[0; 17]).is_err());
        assert!(PowerOnOutputs::new(0, &[0; 16]).is_ok());
    }

    #[test]
    fn test_calibration_dacs_limited_by_count() {
        let mut raw = DD132X_CalibrationData::default();
        raw.wNumberOfDACs = 2;
        let mut offsets = [0; 16];
        offsets[1] = -3;
        raw.anDACOffset = offsets;
        raw.adDACGainRatio = [1.5; 16];
        let cal = CalibrationData::from_raw(&raw);
        let dacs: Vec<_> = cal.dacs().collect();
        assert_eq!(dacs, vec![(0, 1.5), (-3, 1.5)]);
    }
}
