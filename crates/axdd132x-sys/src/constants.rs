//! Constants from `AxDD132x.h`.

use std::os::raw::c_int;

use crate::types::{DWORD, UINT};

pub const DD132X_MAXAICHANNELS: usize = 16;
pub const DD132X_MAXAOCHANNELS: usize = 16;
pub const DD132X_SCANLIST_SIZE: usize = 64;

// Values used in the dwFlags field
pub const DD132X_PROTOCOL_STOPONTC: DWORD = 0x0000_0001;

// DD1320 special cases for the analog output sequence.
pub const DD132X_PROTOCOL_DIGITALOUTPUT: c_int = 0x0040;
pub const DD132X_PROTOCOL_NULLOUTPUT: c_int = 0x0050;

pub type DD132X_Triggering = c_int;
pub const DD132X_StartImmediately: DD132X_Triggering = 0;
pub const DD132X_ExternalStart: DD132X_Triggering = 1;
pub const DD132X_LineTrigger: DD132X_Triggering = 2;

pub type DD132X_AIDataBits = c_int;
pub const DD132X_Bit0Data: DD132X_AIDataBits = 0;
pub const DD132X_Bit0ExtStart: DD132X_AIDataBits = 1;
pub const DD132X_Bit0Line: DD132X_AIDataBits = 2;
pub const DD132X_Bit0Tag: DD132X_AIDataBits = 3;
pub const DD132X_Bit0Tag_Bit1ExtStart: DD132X_AIDataBits = 4;
pub const DD132X_Bit0Tag_Bit1Line: DD132X_AIDataBits = 5;

pub type DD132X_OutputPulseType = c_int;
pub const DD132X_NoOutputPulse: DD132X_OutputPulseType = 0;
pub const DD132X_ADC_level_Triggered: DD132X_OutputPulseType = 1;
pub const DD132X_DAC_bit0_Triggered: DD132X_OutputPulseType = 2;

// uEquipmentStatus bits. DAC3 carries the header's value verbatim even
// though it overlaps DAC0|DAC1.
pub const DD132X_STATUS_TERMINATOR: UINT = 0x0000_0001;
pub const DD132X_STATUS_DRAM: UINT = 0x0000_0002;
pub const DD132X_STATUS_EEPROM: UINT = 0x0000_0004;
pub const DD132X_STATUS_INSCANLIST: UINT = 0x0000_0008;
pub const DD132X_STATUS_OUTSCANLIST: UINT = 0x0000_0010;
pub const DD132X_STATUS_CALIBRATION_MUX: UINT = 0x0000_0020;
pub const DD132X_STATUS_INPUT_FIFO: UINT = 0x0000_0040;
pub const DD132X_STATUS_OUTPUT_FIFO: UINT = 0x0000_0080;
pub const DD132X_STATUS_LINEFREQ_GEN: UINT = 0x0000_0100;
pub const DD132X_STATUS_FPGA: UINT = 0x0000_0200;
pub const DD132X_STATUS_ADC0: UINT = 0x0000_0400;
pub const DD132X_STATUS_DAC0: UINT = 0x0000_0800;
pub const DD132X_STATUS_DAC1: UINT = 0x0000_1000;
pub const DD132X_STATUS_DAC2: UINT = 0x0000_2000;
pub const DD132X_STATUS_DAC3: UINT = 0x0000_3000;
pub const DD132X_STATUS_DAC4: UINT = 0x0000_4000;
pub const DD132X_STATUS_DAC5: UINT = 0x0001_0000;
pub const DD132X_STATUS_DAC6: UINT = 0x0002_0000;
pub const DD132X_STATUS_DAC7: UINT = 0x0004_0000;
pub const DD132X_STATUS_DAC8: UINT = 0x0008_0000;
pub const DD132X_STATUS_DAC9: UINT = 0x0010_0000;
pub const DD132X_STATUS_DACA: UINT = 0x0020_0000;
pub const DD132X_STATUS_DACB: UINT = 0x0040_0000;
pub const DD132X_STATUS_DACC: UINT = 0x0080_0000;
pub const DD132X_STATUS_DACD: UINT = 0x0100_0000;
pub const DD132X_STATUS_DACE: UINT = 0x0200_0000;
pub const DD132X_STATUS_DACF: UINT = 0x0400_0000;

// Constants for SetDebugMsgLevel()
pub const DD132X_MSG_SHOWALL: c_int = 0;
pub const DD132X_MSG_SHOWLESS: c_int = 1;
pub const DD132X_MSG_SHOWNONE: c_int = 2;

// Error codes
pub const DD132X_ERROR_ASPINOTFOUND: c_int = 1;
pub const DD132X_ERROR_OUTOFMEMORY: c_int = 2;
pub const DD132X_ERROR_NOTDD132X: c_int = 3;
pub const DD132X_ERROR_RAMWAREOPEN: c_int = 4;
pub const DD132X_ERROR_RAMWAREREAD: c_int = 5;
pub const DD132X_ERROR_RAMWAREWRITE: c_int = 6;
pub const DD132X_ERROR_RAMWARESTART: c_int = 7;
pub const DD132X_ERROR_SETAIPROTOCOL: c_int = 8;
pub const DD132X_ERROR_SETAOPROTOCOL: c_int = 9;
pub const DD132X_ERROR_STARTACQ: c_int = 10;
pub const DD132X_ERROR_STOPACQ: c_int = 11;
pub const DD132X_ERROR_PAUSEACQ: c_int = 12;
pub const DD132X_ERROR_READDATA: c_int = 13;
pub const DD132X_ERROR_WRITEDATA: c_int = 14;
pub const DD132X_ERROR_CALIBRATION: c_int = 15;
pub const DD132X_ERROR_DIAGNOSTICS: c_int = 16;
pub const DD132X_ERROR_DTERM_READ: c_int = 17;
pub const DD132X_ERROR_DTERM_WRITE: c_int = 18;
pub const DD132X_ERROR_DTERM_BUSY: c_int = 19;
pub const DD132X_ERROR_DTERM_SETBAUD: c_int = 20;

/// Base of the low-level transport (ASPI) error band.
pub const DD132X_ERROR_ASPIERROR: c_int = 1000;

/// Internal catch-all error.
pub const DD132X_ERROR_CANTCOMPLETE: c_int = 9999;
