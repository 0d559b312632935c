//! In-memory simulated Digidata boards.
//!
//! The simulation is an approximation of the real driver, good enough to
//! drive the safe layer end to end:
//!
//! - every analog output `n` is wired back to analog input `n`, both for
//!   single-shot writes and for waveforms played during an acquisition;
//! - each position query of a running acquisition advances it by a fixed
//!   number of samples and fills the input buffer ring;
//! - acquisitions with `STOPONTC` halt at the terminal count;
//! - the terminal port echoes whatever was written to it.

use std::collections::{HashMap, VecDeque};
use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_int;
use std::ptr;

use parking_lot::Mutex;

use axdd132x_sys as sys;
use axdd132x_sys::{
    record_length, DATABUFFER, DD132X_CalibrationData, DD132X_Info, DD132X_PowerOnData,
    DD132X_Protocol, DD132X_StartAcqInfo, SYSTEMTIME,
};
use chrono::{Datelike, Local, Timelike};

use super::{DriverApi, RawHandle, RawResult};
use crate::error::ErrorCode;

const CHANNELS: usize = sys::DD132X_MAXAICHANNELS;
const DEFAULT_SAMPLES_PER_POLL: i64 = 256;
const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Operations that can be made to fail with [`MockDriver::inject_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    RescanBus,
    FindDevices,
    OpenDevice,
    CloseDevice,
    Reset,
    DownloadRamware,
    SetProtocol,
    StartAcquisition,
    StopAcquisition,
    PauseAcquisition,
    StartReadLast,
    ReadLast,
    AcquisitionPosition,
    ReadAnalog,
    ReadDigital,
    WriteAnalog,
    WriteDigital,
    Telegraphs,
    PowerOnOutputs,
    Calibrate,
    TerminalRead,
    TerminalWrite,
    TerminalBaudRate,
}

/// One contiguous piece of a buffer ring.
#[derive(Clone, Copy)]
struct Segment {
    data: *mut i16,
    len: usize,
}

/// Protocol record plus the buffer rings it points at.
struct StoredProtocol {
    raw: DD132X_Protocol,
    ai: Vec<Segment>,
    ao: Vec<Segment>,
}

// SAFETY: the raw pointers are only dereferenced while the state lock is
// held, and DriverApi::set_protocol requires the caller to keep the buffer
// chains alive until they are detached.
unsafe impl Send for StoredProtocol {}

impl StoredProtocol {
    fn empty() -> Self {
        Self {
            raw: DD132X_Protocol::default(),
            ai: Vec::new(),
            ao: Vec::new(),
        }
    }

    fn ring_slot(ring: &[Segment], index: i64) -> Option<*mut i16> {
        let total: usize = ring.iter().map(|s| s.len).sum();
        if total == 0 || index < 0 {
            return None;
        }
        let mut offset = (index as usize) % total;
        for segment in ring {
            if offset < segment.len {
                // SAFETY: offset is within the segment
                return Some(unsafe { segment.data.add(offset) });
            }
            offset -= segment.len;
        }
        None
    }

    fn write_ai(&self, index: i64, value: i16) {
        if let Some(slot) = Self::ring_slot(&self.ai, index) {
            // SAFETY: slot points into a live input buffer
            unsafe { slot.write(value) };
        }
    }

    fn read_ao(&self, index: i64) -> Option<i16> {
        // SAFETY: slot points into a live output buffer
        Self::ring_slot(&self.ao, index).map(|slot| unsafe { slot.read() })
    }
}

/// Walk a `DATABUFFER` chain for at most `count` nodes.
///
/// # Safety
///
/// `head` must be null or point to a valid chain.
unsafe fn collect_ring(head: *mut DATABUFFER, count: u32) -> Vec<Segment> {
    let mut ring = Vec::new();
    let mut node = head;
    for _ in 0..count {
        if node.is_null() {
            break;
        }
        let buffer = unsafe { ptr::read(node) };
        if !buffer.pnData.is_null() {
            ring.push(Segment {
                data: buffer.pnData,
                len: buffer.uNumSamples as usize,
            });
        }
        node = buffer.pNextBuffer;
    }
    ring
}

/// Settings shared by every simulated board.
struct Environment {
    ai_levels: [Option<i16>; CHANNELS],
    digital_inputs: u32,
    telegraphs: [i16; CHANNELS],
    samples_per_poll: i64,
    scsi_terminator: u8,
    ticks: i64,
}

struct SimBoard {
    info: DD132X_Info,
    open: bool,
    protocol: StoredProtocol,
    protocol_set: bool,
    acquiring: bool,
    paused: bool,
    read_last: bool,
    position: i64,
    output: i64,
    start: Option<DD132X_StartAcqInfo>,
    analog_out: [i16; CHANNELS],
    digital_out: u32,
    power_on: DD132X_PowerOnData,
    calibration: DD132X_CalibrationData,
    terminal: VecDeque<u8>,
    baud_rate: u32,
    debug_level: u32,
    threshold: (u16, u16),
    last_error: String,
}

fn fill_text(dst: &mut [u8], text: &str) {
    let n = text.len().min(dst.len().saturating_sub(1));
    dst[..n].copy_from_slice(&text.as_bytes()[..n]);
}

impl SimBoard {
    fn new(index: usize) -> Self {
        let mut info = DD132X_Info::default();
        info.byAdaptor = 1;
        info.byTarget = index as u8;
        info.byImageType = 1;
        fill_text(&mut info.szManufacturer, "Axon Instruments");
        fill_text(&mut info.szName, "Digidata 1322A (simulated)");
        fill_text(&mut info.szProductVersion, "1.0");
        fill_text(&mut info.szFirmwareVersion, "1.14");
        info.uInputBufferSize = 512 * 1024;
        info.uOutputBufferSize = 512 * 1024;
        info.uSerialNumber = 132_200 + index as u32;
        info.uClockResolution = 1;
        info.uMinClockTicks = 4;
        info.uMaxClockTicks = 1_000_000;

        let mut calibration = DD132X_CalibrationData::default();
        calibration.dADCGainRatio = 1.0;
        calibration.wNumberOfDACs = 2;
        calibration.adDACGainRatio = [1.0; sys::DD132X_MAXAOCHANNELS];

        Self {
            info,
            open: false,
            protocol: StoredProtocol::empty(),
            protocol_set: false,
            acquiring: false,
            paused: false,
            read_last: false,
            position: 0,
            output: 0,
            start: None,
            analog_out: [0; CHANNELS],
            digital_out: 0,
            power_on: DD132X_PowerOnData::default(),
            calibration,
            terminal: VecDeque::new(),
            baud_rate: 9600,
            debug_level: sys::DD132X_MSG_SHOWNONE as u32,
            threshold: (0, 0),
            last_error: String::new(),
        }
    }

    fn address(&self) -> (u8, u8) {
        (self.info.byAdaptor, self.info.byTarget)
    }

    fn analog_level(&self, env: &Environment, channel: i32) -> i16 {
        match usize::try_from(channel) {
            Ok(ch) if ch < CHANNELS => env.ai_levels[ch].unwrap_or(self.analog_out[ch]),
            _ => 0,
        }
    }

    /// Value of global input sample `index`.
    fn ai_sample(&self, env: &Environment, index: i64) -> i16 {
        let raw = self.protocol.raw;
        let n_ai = i64::from(raw.uAIChannels.max(1));
        let n_ao = i64::from(raw.uAOChannels);
        let ai_channels = { raw.anAIChannels };
        let ao_channels = { raw.anAOChannels };
        let channel = ai_channels[(index % n_ai) as usize];

        if n_ao > 0 && !self.read_last {
            let scan = index / n_ai;
            let slot = ao_channels[..n_ao as usize].iter().position(|&c| c == channel);
            if let Some(value) = slot.and_then(|s| self.protocol.read_ao(scan * n_ao + s as i64)) {
                return value;
            }
        }
        self.analog_level(env, channel)
    }

    fn advance(&mut self, env: &Environment) {
        if !self.acquiring || self.paused || self.read_last {
            return;
        }
        let raw = self.protocol.raw;
        let terminal_count = raw.uTerminalCount;
        let stop_on_tc = raw.dwFlags & sys::DD132X_PROTOCOL_STOPONTC != 0 && terminal_count > 0;

        let mut target = self.position + env.samples_per_poll;
        if stop_on_tc {
            target = target.min(terminal_count);
        }
        for index in self.position..target {
            let value = self.ai_sample(env, index);
            self.protocol.write_ai(index, value);
        }
        self.position = target;

        let n_ai = i64::from(raw.uAIChannels.max(1));
        self.output = (target / n_ai) * i64::from(raw.uAOChannels);

        if stop_on_tc && target >= terminal_count {
            self.acquiring = false;
        }
    }

    fn stop(&mut self) {
        self.acquiring = false;
        self.paused = false;
        self.read_last = false;
    }
}

struct MockState {
    boards: Vec<SimBoard>,
    handles: HashMap<usize, usize>,
    next_handle: usize,
    env: Environment,
    failures: HashMap<MockOperation, c_int>,
    rescans: u32,
}

/// A simulated set of Digidata boards.
///
/// # Example
///
/// ```
/// use daq_driver_digidata::{Digidata, MockDriver};
/// use std::sync::Arc;
///
/// let mock = Arc::new(MockDriver::new());
/// mock.set_ai_level(3, 1234);
/// let device = Digidata::open_first_with(mock.clone())?;
/// assert_eq!(device.read_ai(3)?, 1234);
/// # Ok::<(), daq_driver_digidata::DigidataError>(())
/// ```
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    /// One simulated board at adaptor 1, target 0.
    pub fn new() -> Self {
        Self::with_boards(1)
    }

    /// `count` boards on adaptor 1, targets `0..count`.
    pub fn with_boards(count: usize) -> Self {
        Self {
            state: Mutex::new(MockState {
                boards: (0..count).map(SimBoard::new).collect(),
                handles: HashMap::new(),
                next_handle: 1,
                env: Environment {
                    ai_levels: [None; CHANNELS],
                    digital_inputs: 0,
                    telegraphs: [0; CHANNELS],
                    samples_per_poll: DEFAULT_SAMPLES_PER_POLL,
                    scsi_terminator: 1,
                    ticks: 0,
                },
                failures: HashMap::new(),
                rescans: 0,
            }),
        }
    }

    /// Drive analog input `channel` to a fixed level, overriding loopback.
    pub fn set_ai_level(&self, channel: usize, value: i16) {
        if let Some(level) = self.state.lock().env.ai_levels.get_mut(channel) {
            *level = Some(value);
        }
    }

    pub fn set_digital_inputs(&self, values: u32) {
        self.state.lock().env.digital_inputs = values;
    }

    pub fn set_telegraph(&self, channel: usize, value: i16) {
        if let Some(slot) = self.state.lock().env.telegraphs.get_mut(channel) {
            *slot = value;
        }
    }

    /// Samples a running acquisition advances per position query.
    pub fn set_samples_per_poll(&self, samples: i64) {
        self.state.lock().env.samples_per_poll = samples.max(1);
    }

    pub fn set_scsi_terminator(&self, status: u8) {
        self.state.lock().env.scsi_terminator = status;
    }

    /// Make the next call of `operation` fail with `code`.
    pub fn inject_error(&self, operation: MockOperation, code: c_int) {
        self.state.lock().failures.insert(operation, code);
    }

    /// Static level last written to analog output `channel` of `board`.
    pub fn analog_output(&self, board: usize, channel: usize) -> Option<i16> {
        let state = self.state.lock();
        state.boards.get(board)?.analog_out.get(channel).copied()
    }

    pub fn digital_outputs(&self, board: usize) -> Option<u32> {
        self.state.lock().boards.get(board).map(|b| b.digital_out)
    }

    pub fn threshold_level(&self, board: usize) -> Option<(u16, u16)> {
        self.state.lock().boards.get(board).map(|b| b.threshold)
    }

    pub fn debug_level(&self, board: usize) -> Option<u32> {
        self.state.lock().boards.get(board).map(|b| b.debug_level)
    }

    pub fn terminal_baud_rate(&self, board: usize) -> Option<u32> {
        self.state.lock().boards.get(board).map(|b| b.baud_rate)
    }

    pub fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn rescan_count(&self) -> u32 {
        self.state.lock().rescans
    }

    fn take_failure(&self, operation: MockOperation) -> RawResult<()> {
        match self.state.lock().failures.remove(&operation) {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    /// Run `f` against the board behind `handle`, recording failures as the
    /// board's last error text.
    fn with_board<T>(
        &self,
        handle: RawHandle,
        operation: Option<MockOperation>,
        f: impl FnOnce(&mut SimBoard, &mut Environment) -> RawResult<T>,
    ) -> RawResult<T> {
        let mut guard = self.state.lock();
        let MockState {
            boards,
            handles,
            env,
            failures,
            ..
        } = &mut *guard;
        let index = *handles.get(&handle.0).ok_or(sys::DD132X_ERROR_CANTCOMPLETE)?;
        let board = boards.get_mut(index).ok_or(sys::DD132X_ERROR_CANTCOMPLETE)?;

        let result = match operation.and_then(|op| failures.remove(&op)) {
            Some(code) => Err(code),
            None => f(board, env),
        };
        if let Err(code) = result {
            board.last_error = format!("Simulated board: {}", ErrorCode::from_raw(code));
        }
        result
    }

    fn peek<T>(&self, handle: RawHandle, f: impl FnOnce(&SimBoard) -> T) -> Option<T> {
        let state = self.state.lock();
        let index = *state.handles.get(&handle.0)?;
        state.boards.get(index).map(f)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockDriver")
            .field("boards", &state.boards.len())
            .field("open_handles", &state.handles.len())
            .finish()
    }
}

fn system_time_now() -> SYSTEMTIME {
    let now = Local::now();
    SYSTEMTIME {
        wYear: now.year() as u16,
        wMonth: now.month() as u16,
        wDayOfWeek: now.weekday().num_days_from_sunday() as u16,
        wDay: now.day() as u16,
        wHour: now.hour() as u16,
        wMinute: now.minute() as u16,
        wSecond: now.second() as u16,
        wMilliseconds: (now.timestamp_subsec_millis() % 1000) as u16,
    }
}

impl DriverApi for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn rescan_scsi_bus(&self) -> RawResult<()> {
        self.take_failure(MockOperation::RescanBus)?;
        self.state.lock().rescans += 1;
        Ok(())
    }

    fn find_devices(&self, max_devices: u32) -> RawResult<Vec<DD132X_Info>> {
        self.take_failure(MockOperation::FindDevices)?;
        let state = self.state.lock();
        Ok(state
            .boards
            .iter()
            .take(max_devices as usize)
            .map(|b| b.info)
            .collect())
    }

    fn open_device(&self, adaptor: u8, target: u8, ramware: Option<&[u8]>) -> RawResult<RawHandle> {
        self.take_failure(MockOperation::OpenDevice)?;
        if ramware.is_some_and(<[u8]>::is_empty) {
            return Err(sys::DD132X_ERROR_RAMWAREREAD);
        }
        let mut state = self.state.lock();
        let index = state
            .boards
            .iter()
            .position(|b| b.address() == (adaptor, target))
            .ok_or(sys::DD132X_ERROR_NOTDD132X)?;
        if state.boards[index].open {
            return Err(sys::DD132X_ERROR_CANTCOMPLETE);
        }
        state.boards[index].open = true;
        let handle = state.next_handle;
        state.next_handle += 1;
        state.handles.insert(handle, index);
        Ok(RawHandle(handle))
    }

    fn close_device(&self, handle: RawHandle) -> RawResult<()> {
        self.take_failure(MockOperation::CloseDevice)?;
        let mut state = self.state.lock();
        let index = state
            .handles
            .remove(&handle.0)
            .ok_or(sys::DD132X_ERROR_CANTCOMPLETE)?;
        if let Some(board) = state.boards.get_mut(index) {
            board.stop();
            board.protocol = StoredProtocol::empty();
            board.protocol_set = false;
            board.open = false;
        }
        Ok(())
    }

    fn get_device_info(&self, handle: RawHandle) -> RawResult<DD132X_Info> {
        self.with_board(handle, None, |board, _| Ok(board.info))
    }

    fn reset(&self, handle: RawHandle) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::Reset), |board, _| {
            board.stop();
            board.analog_out = [0; CHANNELS];
            let power_on = { board.power_on.anAnalogOuts };
            board.analog_out[..power_on.len()].copy_from_slice(&power_on);
            board.digital_out = board.power_on.dwDigitalOuts;
            Ok(())
        })
    }

    fn download_ramware(&self, handle: RawHandle, image: &[u8]) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::DownloadRamware), |board, _| {
            if image.is_empty() {
                return Err(sys::DD132X_ERROR_RAMWAREREAD);
            }
            board.stop();
            Ok(())
        })
    }

    unsafe fn set_protocol(&self, handle: RawHandle, protocol: &DD132X_Protocol) -> RawResult<()> {
        let raw = *protocol;
        self.with_board(handle, Some(MockOperation::SetProtocol), |board, _| {
            if board.acquiring {
                return Err(sys::DD132X_ERROR_SETAIPROTOCOL);
            }
            if raw.uLength != record_length::<DD132X_Protocol>() {
                return Err(sys::DD132X_ERROR_SETAIPROTOCOL);
            }
            let ai_channels = { raw.anAIChannels };
            if raw.uAIChannels as usize > sys::DD132X_SCANLIST_SIZE
                || ai_channels[..raw.uAIChannels as usize]
                    .iter()
                    .any(|&c| !(0..CHANNELS as i32).contains(&c))
            {
                return Err(sys::DD132X_ERROR_SETAIPROTOCOL);
            }
            if raw.uAOChannels as usize > sys::DD132X_SCANLIST_SIZE {
                return Err(sys::DD132X_ERROR_SETAOPROTOCOL);
            }
            // SAFETY: the caller keeps both chains alive while they are attached
            let (ai, ao) = unsafe {
                (
                    collect_ring(raw.pAIBuffers, raw.uAIBuffers),
                    collect_ring(raw.pAOBuffers, raw.uAOBuffers),
                )
            };
            board.protocol = StoredProtocol { raw, ai, ao };
            board.protocol_set = true;
            Ok(())
        })
    }

    fn get_protocol(&self, handle: RawHandle) -> RawResult<DD132X_Protocol> {
        self.with_board(handle, None, |board, _| Ok(board.protocol.raw))
    }

    fn start_acquisition(&self, handle: RawHandle) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::StartAcquisition), |board, env| {
            if !board.protocol_set || board.acquiring {
                return Err(sys::DD132X_ERROR_STARTACQ);
            }
            env.ticks += 1000;
            board.start = Some(DD132X_StartAcqInfo {
                m_StartTime: system_time_now(),
                m_n64PreStartAcq: env.ticks,
                m_n64PostStartAcq: env.ticks + 7,
                ..DD132X_StartAcqInfo::default()
            });
            board.acquiring = true;
            board.paused = false;
            board.read_last = false;
            board.position = 0;
            board.output = 0;
            Ok(())
        })
    }

    fn stop_acquisition(&self, handle: RawHandle) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::StopAcquisition), |board, env| {
            // The board keeps sampling until the stop lands.
            board.advance(env);
            board.stop();
            Ok(())
        })
    }

    fn pause_acquisition(&self, handle: RawHandle, pause: bool) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::PauseAcquisition), |board, _| {
            if !board.acquiring {
                return Err(sys::DD132X_ERROR_PAUSEACQ);
            }
            board.paused = pause;
            Ok(())
        })
    }

    fn is_acquiring(&self, handle: RawHandle) -> bool {
        self.peek(handle, |b| b.acquiring).unwrap_or(false)
    }

    fn is_paused(&self, handle: RawHandle) -> bool {
        self.peek(handle, |b| b.acquiring && b.paused).unwrap_or(false)
    }

    fn time_at_start_of_acquisition(&self, handle: RawHandle) -> Option<DD132X_StartAcqInfo> {
        self.peek(handle, |b| b.start).flatten()
    }

    fn start_read_last(&self, handle: RawHandle) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::StartReadLast), |board, _| {
            if !board.protocol_set || board.acquiring {
                return Err(sys::DD132X_ERROR_STARTACQ);
            }
            board.acquiring = true;
            board.paused = false;
            board.read_last = true;
            board.position = 0;
            Ok(())
        })
    }

    fn read_last(&self, handle: RawHandle, samples: &mut [i16]) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::ReadLast), |board, env| {
            if !board.read_last {
                return Err(sys::DD132X_ERROR_READDATA);
            }
            board.position += env.samples_per_poll;
            let newest = board.position;
            let count = samples.len() as i64;
            for (i, sample) in samples.iter_mut().enumerate() {
                let index = newest - count + i as i64;
                *sample = if index < 0 { 0 } else { board.ai_sample(env, index) };
            }
            Ok(())
        })
    }

    fn acquisition_position(&self, handle: RawHandle) -> RawResult<i64> {
        self.with_board(handle, Some(MockOperation::AcquisitionPosition), |board, env| {
            board.advance(env);
            Ok(board.position)
        })
    }

    fn num_samples_output(&self, handle: RawHandle) -> RawResult<i64> {
        self.with_board(handle, None, |board, _| Ok(board.output))
    }

    fn get_ai_value(&self, handle: RawHandle, channel: u32) -> RawResult<i16> {
        self.with_board(handle, Some(MockOperation::ReadAnalog), |board, env| {
            if channel as usize >= CHANNELS {
                return Err(sys::DD132X_ERROR_READDATA);
            }
            Ok(board.analog_level(env, channel as i32))
        })
    }

    fn get_di_values(&self, handle: RawHandle) -> RawResult<u32> {
        self.with_board(handle, Some(MockOperation::ReadDigital), |_, env| Ok(env.digital_inputs))
    }

    fn put_ao_value(&self, handle: RawHandle, channel: u32, value: i16) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::WriteAnalog), |board, _| {
            let slot = board
                .analog_out
                .get_mut(channel as usize)
                .ok_or(sys::DD132X_ERROR_WRITEDATA)?;
            *slot = value;
            Ok(())
        })
    }

    fn put_do_values(&self, handle: RawHandle, values: u32) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::WriteDigital), |board, _| {
            board.digital_out = values;
            Ok(())
        })
    }

    fn get_telegraphs(&self, handle: RawHandle, first_channel: u32, values: &mut [i16]) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::Telegraphs), |_, env| {
            let first = first_channel as usize;
            let source = env
                .telegraphs
                .get(first..first + values.len())
                .ok_or(sys::DD132X_ERROR_READDATA)?;
            values.copy_from_slice(source);
            Ok(())
        })
    }

    fn set_power_on_outputs(&self, handle: RawHandle, data: &DD132X_PowerOnData) -> RawResult<()> {
        let data = *data;
        self.with_board(handle, Some(MockOperation::PowerOnOutputs), |board, _| {
            if data.uLength != record_length::<DD132X_PowerOnData>() {
                return Err(sys::DD132X_ERROR_WRITEDATA);
            }
            board.power_on = data;
            Ok(())
        })
    }

    fn get_power_on_outputs(&self, handle: RawHandle) -> RawResult<DD132X_PowerOnData> {
        self.with_board(handle, Some(MockOperation::PowerOnOutputs), |board, _| Ok(board.power_on))
    }

    fn calibrate(&self, handle: RawHandle) -> RawResult<DD132X_CalibrationData> {
        self.with_board(handle, Some(MockOperation::Calibrate), |board, _| {
            if board.acquiring {
                return Err(sys::DD132X_ERROR_CALIBRATION);
            }
            Ok(board.calibration)
        })
    }

    fn get_calibration_data(&self, handle: RawHandle) -> RawResult<DD132X_CalibrationData> {
        self.with_board(handle, None, |board, _| Ok(board.calibration))
    }

    fn get_scsi_term_status(&self, handle: RawHandle) -> RawResult<u8> {
        self.with_board(handle, None, |_, env| Ok(env.scsi_terminator))
    }

    fn dterm_read(&self, handle: RawHandle, max_len: usize) -> RawResult<Vec<u8>> {
        self.with_board(handle, Some(MockOperation::TerminalRead), |board, _| {
            let n = board.terminal.len().min(max_len.saturating_sub(1));
            Ok(board.terminal.drain(..n).collect())
        })
    }

    fn dterm_write(&self, handle: RawHandle, text: &CStr) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::TerminalWrite), |board, _| {
            board.terminal.extend(text.to_bytes());
            Ok(())
        })
    }

    fn dterm_set_baud_rate(&self, handle: RawHandle, baud_rate: u32) -> RawResult<()> {
        self.with_board(handle, Some(MockOperation::TerminalBaudRate), |board, _| {
            if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
                return Err(sys::DD132X_ERROR_DTERM_SETBAUD);
            }
            board.baud_rate = baud_rate;
            Ok(())
        })
    }

    fn get_last_error_text(&self, handle: RawHandle, max_len: usize) -> RawResult<String> {
        self.with_board(handle, None, |board, _| {
            let mut text = board.last_error.clone();
            let limit = max_len.saturating_sub(1);
            if text.len() > limit {
                let mut cut = limit;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            Ok(text)
        })
    }

    fn set_debug_msg_level(&self, handle: RawHandle, level: u32) -> RawResult<()> {
        self.with_board(handle, None, |board, _| {
            if level > sys::DD132X_MSG_SHOWNONE as u32 {
                return Err(sys::DD132X_ERROR_CANTCOMPLETE);
            }
            board.debug_level = level;
            Ok(())
        })
    }

    fn update_threshold_level(&self, handle: RawHandle, threshold: u16, hysteresis: u16) -> bool {
        self.with_board(handle, None, |board, _| {
            board.threshold = (threshold, hysteresis);
            Ok(())
        })
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(mock: &MockDriver) -> RawHandle {
        mock.open_device(1, 0, None).unwrap()
    }

    #[test]
    fn test_find_devices_respects_max() {
        let mock = MockDriver::with_boards(3);
        assert_eq!(mock.find_devices(8).unwrap().len(), 3);
        assert_eq!(mock.find_devices(2).unwrap().len(), 2);
        let infos = mock.find_devices(8).unwrap();
        assert_eq!(infos[2].byTarget, 2);
    }

    #[test]
    fn test_open_is_exclusive() {
        let mock = MockDriver::new();
        let handle = open(&mock);
        assert_eq!(mock.open_device(1, 0, None), Err(sys::DD132X_ERROR_CANTCOMPLETE));
        mock.close_device(handle).unwrap();
        assert!(mock.open_device(1, 0, None).is_ok());
    }

    #[test]
    fn test_open_unknown_address() {
        let mock = MockDriver::new();
        assert_eq!(mock.open_device(3, 3, None), Err(sys::DD132X_ERROR_NOTDD132X));
        assert_eq!(mock.open_device(1, 0, Some(&[])), Err(sys::DD132X_ERROR_RAMWAREREAD));
    }

    #[test]
    fn test_injected_error_sets_last_error() {
        let mock = MockDriver::new();
        let handle = open(&mock);
        mock.inject_error(MockOperation::ReadDigital, sys::DD132X_ERROR_READDATA);
        assert_eq!(mock.get_di_values(handle), Err(sys::DD132X_ERROR_READDATA));
        let text = mock.get_last_error_text(handle, 256).unwrap();
        assert!(text.contains("data read failed"));
        // one-shot
        assert!(mock.get_di_values(handle).is_ok());
    }

    #[test]
    fn test_start_requires_protocol() {
        let mock = MockDriver::new();
        let handle = open(&mock);
        assert_eq!(mock.start_acquisition(handle), Err(sys::DD132X_ERROR_STARTACQ));
    }

    #[test]
    fn test_stop_on_terminal_count() {
        let mock = MockDriver::new();
        mock.set_samples_per_poll(100);
        mock.set_ai_level(0, 42);
        let handle = open(&mock);

        let mut data = vec![0i16; 250];
        let mut node = DATABUFFER {
            uNumSamples: data.len() as u32,
            pnData: data.as_mut_ptr(),
            ..DATABUFFER::default()
        };
        let mut protocol = DD132X_Protocol::default();
        protocol.dSampleInterval = 100.0;
        protocol.dwFlags = sys::DD132X_PROTOCOL_STOPONTC;
        protocol.uAIChannels = 1;
        protocol.pAIBuffers = &mut node as *mut DATABUFFER;
        protocol.uAIBuffers = 1;
        protocol.uTerminalCount = 250;

        unsafe { mock.set_protocol(handle, &protocol).unwrap() };
        mock.start_acquisition(handle).unwrap();
        assert_eq!(mock.acquisition_position(handle), Ok(100));
        assert_eq!(mock.acquisition_position(handle), Ok(200));
        assert_eq!(mock.acquisition_position(handle), Ok(250));
        assert!(!mock.is_acquiring(handle));
        assert_eq!(mock.acquisition_position(handle), Ok(250));

        let mut detached = DD132X_Protocol::default();
        detached.uAIChannels = 1;
        unsafe { mock.set_protocol(handle, &detached).unwrap() };
        assert!(data.iter().all(|&v| v == 42));
    }

    #[test]
    fn test_terminal_echo_and_baud() {
        let mock = MockDriver::new();
        let handle = open(&mock);
        let text = std::ffi::CString::new("VER?").unwrap();
        mock.dterm_write(handle, &text).unwrap();
        assert_eq!(mock.dterm_read(handle, 3).unwrap(), b"VE");
        assert_eq!(mock.dterm_read(handle, 64).unwrap(), b"R?");
        assert!(mock.dterm_set_baud_rate(handle, 19200).is_ok());
        assert_eq!(
            mock.dterm_set_baud_rate(handle, 12345),
            Err(sys::DD132X_ERROR_DTERM_SETBAUD)
        );
    }
}
