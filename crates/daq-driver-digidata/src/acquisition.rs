//! Buffered and read-last acquisitions.
//!
//! An [`Acquisition`] owns the buffer rings it attaches to the driver. The
//! rings are detached (the protocol is re-sent without buffers) before the
//! guard releases them, whether it ends through [`Acquisition::finish`] or
//! by being dropped.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use daq_driver_digidata::{Acquisition, BufferList, Digidata, MockDriver, Protocol, ProtocolFlags};
//!
//! let device = Digidata::open_first_with(Arc::new(MockDriver::new()))?;
//! let protocol = Protocol::builder()
//!     .ai_channels(&[0, 1])
//!     .flags(ProtocolFlags::STOP_ON_TC)
//!     .terminal_count(2_000)
//!     .build()?;
//! let input = BufferList::new(2_000, 4)?;
//!
//! let mut acquisition = Acquisition::new(&device, protocol, Some(input), None)?;
//! acquisition.start()?;
//! acquisition.wait_for_completion(Duration::from_secs(5))?;
//! let data = acquisition.finish()?;
//! assert_eq!(data.input.len(), 2_000);
//! # Ok::<(), daq_driver_digidata::DigidataError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, trace, warn};

use axdd132x_sys::{record_length, DD132X_StartAcqInfo};

use crate::buffer::BufferList;
use crate::device::{check_length, Digidata};
use crate::error::{DigidataError, Result};
use crate::protocol::Protocol;

/// Default interval between position polls while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// When an acquisition started, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartTime {
    /// Host wall-clock time of the start. `None` if the driver left the
    /// time unset.
    pub wall_clock: Option<NaiveDateTime>,
    /// Performance counter read just before the start command.
    pub counter_before: i64,
    /// Performance counter read just after the start command.
    pub counter_after: i64,
}

impl StartTime {
    pub(crate) fn from_raw(raw: &DD132X_StartAcqInfo) -> Result<Self> {
        check_length("DD132X_StartAcqInfo", record_length::<DD132X_StartAcqInfo>(), raw.uLength)?;
        let t = raw.m_StartTime;
        let wall_clock = NaiveDate::from_ymd_opt(i32::from(t.wYear), u32::from(t.wMonth), u32::from(t.wDay))
            .and_then(|date| {
                date.and_hms_milli_opt(
                    u32::from(t.wHour),
                    u32::from(t.wMinute),
                    u32::from(t.wSecond),
                    u32::from(t.wMilliseconds),
                )
            });
        Ok(Self {
            wall_clock,
            counter_before: raw.m_n64PreStartAcq,
            counter_after: raw.m_n64PostStartAcq,
        })
    }

    /// Width of the counter bracket around the start command.
    pub fn uncertainty_ticks(&self) -> i64 {
        self.counter_after - self.counter_before
    }
}

/// What a finished acquisition produced.
#[derive(Debug, Clone)]
pub struct AcquiredData {
    /// Newest input samples in acquisition order, interleaved by the input
    /// scan list. At most the size of the input ring.
    pub input: Vec<i16>,
    /// Samples acquired in total.
    pub samples_acquired: i64,
    /// Samples output in total.
    pub samples_output: i64,
    pub start_time: Option<StartTime>,
}

/// A configured acquisition holding its buffer rings.
pub struct Acquisition {
    device: Digidata,
    protocol: Protocol,
    input: Option<BufferList>,
    output: Option<BufferList>,
    attached: bool,
    started: bool,
    poll_interval: Duration,
    cancel: Option<Arc<AtomicBool>>,
}

impl Acquisition {
    /// Send `protocol` to the board with the given rings attached.
    ///
    /// `output` holds the output waveform interleaved by the output scan
    /// list; it is played in a loop until the acquisition stops.
    ///
    /// # Errors
    ///
    /// Returns [`DigidataError::InvalidConfig`] if a ring is given for an
    /// empty scan list (or the input scan list is empty), or the driver's
    /// error if it rejects the protocol.
    pub fn new(
        device: &Digidata,
        protocol: Protocol,
        input: Option<BufferList>,
        output: Option<BufferList>,
    ) -> Result<Self> {
        if protocol.ai_channels.is_empty() {
            return Err(DigidataError::InvalidConfig {
                message: "acquisition needs at least one input channel".to_string(),
            });
        }
        if output.is_some() && protocol.ao_channels.is_empty() {
            return Err(DigidataError::InvalidConfig {
                message: "output buffers given but the output scan list is empty".to_string(),
            });
        }

        let mut acquisition = Self {
            device: device.clone(),
            protocol,
            input,
            output,
            attached: false,
            started: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: None,
        };

        let mut raw = acquisition.protocol.to_raw()?;
        if let Some(input) = acquisition.input.as_mut() {
            let (head, count) = input.chain();
            raw.pAIBuffers = head;
            raw.uAIBuffers = count;
        }
        if let Some(output) = acquisition.output.as_mut() {
            let (head, count) = output.chain();
            raw.pAOBuffers = head;
            raw.uAOBuffers = count;
        }

        // SAFETY: the rings live in `acquisition`, which detaches them before
        // they are dropped; moving the guard does not move their heap storage.
        unsafe { acquisition.device.set_raw_protocol(&raw)? };
        acquisition.attached = true;

        debug!(
            input_samples = acquisition.input.as_ref().map(BufferList::len),
            output_samples = acquisition.output.as_ref().map(BufferList::len),
            "Attached acquisition buffers"
        );
        Ok(acquisition)
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn device(&self) -> &Digidata {
        &self.device
    }

    /// Change how often [`Self::wait_until`] polls.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// A flag that ends any wait early when set.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    pub fn start(&mut self) -> Result<()> {
        self.device.start_acquisition()?;
        self.started = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.device.stop_acquisition()
    }

    pub fn pause(&self) -> Result<()> {
        self.device.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.device.resume()
    }

    pub fn is_running(&self) -> Result<bool> {
        self.device.is_acquiring()
    }

    /// Samples acquired so far.
    pub fn position(&self) -> Result<i64> {
        self.device.acquisition_position()
    }

    pub fn samples_output(&self) -> Result<i64> {
        self.device.samples_output()
    }

    pub fn start_time(&self) -> Result<StartTime> {
        self.device.start_time()
    }

    /// Snapshot of the input ring without stopping.
    pub fn latest_input(&self) -> Result<Vec<i16>> {
        let position = self.position()?;
        Ok(self
            .input
            .as_ref()
            .map(|input| input.latest(position))
            .unwrap_or_default())
    }

    /// Poll until `target` samples are acquired, the board stops, or the
    /// cancel flag is set. Returns the last position seen.
    ///
    /// # Errors
    ///
    /// Returns [`DigidataError::Timeout`] if none of those happen within
    /// `timeout`.
    pub fn wait_until(&self, target: i64, timeout: Duration) -> Result<i64> {
        let started = Instant::now();
        loop {
            let position = self.position()?;
            if position >= target {
                return Ok(position);
            }
            if !self.device.is_acquiring()? {
                debug!(position, target, "Acquisition stopped before target");
                return Ok(position);
            }
            if self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                debug!(position, target, "Wait cancelled");
                return Ok(position);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(DigidataError::Timeout {
                    operation: "acquisition",
                    waited_ms: waited.as_millis() as u64,
                });
            }
            trace!(position, target, "Waiting for samples");
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Wait for a `STOP_ON_TC` acquisition to reach its terminal count.
    pub fn wait_for_completion(&self, timeout: Duration) -> Result<i64> {
        if !self.protocol.stops_on_terminal_count() {
            return Err(DigidataError::InvalidConfig {
                message: "acquisition has no terminal count to wait for".to_string(),
            });
        }
        self.wait_until(self.protocol.terminal_count, timeout)
    }

    /// Stop, detach the rings, and hand back the input samples.
    pub fn finish(mut self) -> Result<AcquiredData> {
        // Counts are read after the stop so they match what the rings hold.
        self.stop_if_running()?;
        let samples_acquired = self.position()?;
        let samples_output = self.samples_output()?;
        let start_time = if self.started { self.start_time().ok() } else { None };
        self.release()?;

        let input = self
            .input
            .take()
            .map(|input| input.latest(samples_acquired))
            .unwrap_or_default();
        debug!(samples_acquired, samples_output, "Acquisition finished");
        Ok(AcquiredData {
            input,
            samples_acquired,
            samples_output,
            start_time,
        })
    }

    fn stop_if_running(&self) -> Result<()> {
        if self.device.is_acquiring()? {
            self.device.stop_acquisition()?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if !self.attached {
            return Ok(());
        }
        self.stop_if_running()?;
        self.device.set_protocol(&self.protocol)?;
        self.attached = false;
        Ok(())
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        if !self.attached {
            return;
        }
        if let Err(e) = self.release() {
            warn!(error = %e, "Error releasing acquisition buffers");
            if self.device.is_closed() {
                return;
            }
            // The driver may still hold the rings; leak them rather than free
            // memory it could write to.
            if let Some(input) = self.input.take() {
                std::mem::forget(input);
            }
            if let Some(output) = self.output.take() {
                std::mem::forget(output);
            }
        }
    }
}

impl std::fmt::Debug for Acquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquisition")
            .field("device", &self.device)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("attached", &self.attached)
            .finish()
    }
}

/// A buffer-less acquisition polled with [`ReadLast::read`].
#[derive(Debug)]
pub struct ReadLast {
    device: Digidata,
    scan_len: usize,
    running: bool,
}

impl ReadLast {
    /// Send `protocol` without buffers and start the acquisition.
    pub fn start(device: &Digidata, protocol: &Protocol) -> Result<Self> {
        if protocol.ai_channels.is_empty() {
            return Err(DigidataError::InvalidConfig {
                message: "read-last acquisition needs at least one input channel".to_string(),
            });
        }
        device.set_protocol(protocol)?;
        device.start_read_last()?;
        Ok(Self {
            device: device.clone(),
            scan_len: protocol.ai_channels.len(),
            running: true,
        })
    }

    /// The newest `count` samples.
    pub fn read(&self, count: usize) -> Result<Vec<i16>> {
        self.device.read_last(count)
    }

    /// The newest `scans` complete passes over the input scan list.
    pub fn read_scans(&self, scans: usize) -> Result<Vec<i16>> {
        self.read(scans * self.scan_len)
    }

    pub fn stop(mut self) -> Result<()> {
        self.running = false;
        self.device.stop_acquisition()
    }
}

impl Drop for ReadLast {
    fn drop(&mut self) {
        if self.running && !self.device.is_closed() {
            if let Err(e) = self.device.stop_acquisition() {
                warn!(error = %e, "Error stopping read-last acquisition");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::protocol::{AoChannel, ProtocolFlags};
    use axdd132x_sys::SYSTEMTIME;

    fn device() -> (Arc<MockDriver>, Digidata) {
        let mock = Arc::new(MockDriver::new());
        let device = Digidata::open_first_with(mock.clone()).unwrap();
        (mock, device)
    }

    #[test]
    fn test_start_time_conversion() {
        let raw = DD132X_StartAcqInfo {
            m_StartTime: SYSTEMTIME {
                wYear: 2024,
                wMonth: 3,
                wDayOfWeek: 0,
                wDay: 17,
                wHour: 13,
                wMinute: 5,
                wSecond: 9,
                wMilliseconds: 250,
            },
            m_n64PreStartAcq: 100,
            m_n64PostStartAcq: 112,
            ..DD132X_StartAcqInfo::default()
        };
        let start = StartTime::from_raw(&raw).unwrap();
        assert_eq!(
            start.wall_clock.unwrap().to_string(),
            "2024-03-17 13:05:09.250"
        );
        assert_eq!(start.uncertainty_ticks(), 12);

        let unset = StartTime::from_raw(&DD132X_StartAcqInfo::default()).unwrap();
        assert!(unset.wall_clock.is_none());
    }

    #[test]
    fn test_requires_input_channels() {
        let (_mock, device) = device();
        let protocol = Protocol::default();
        assert!(Acquisition::new(&device, protocol, None, None).is_err());
    }

    #[test]
    fn test_output_needs_scan_list() {
        let (_mock, device) = device();
        let protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
        let output = BufferList::new(8, 1).unwrap();
        assert!(Acquisition::new(&device, protocol, None, Some(output)).is_err());
    }

    #[test]
    fn test_loopback_waveform() {
        let (mock, device) = device();
        mock.set_samples_per_poll(64);
        let protocol = Protocol::builder()
            .ai_channels(&[0])
            .ao_channels(&[AoChannel::Analog(0)])
            .flags(ProtocolFlags::STOP_ON_TC)
            .terminal_count(100)
            .build()
            .unwrap();
        let waveform: Vec<i16> = (0..100).collect();
        let output = BufferList::from_samples(waveform.clone(), 2).unwrap();
        let input = BufferList::new(100, 4).unwrap();

        let mut acquisition = Acquisition::new(&device, protocol, Some(input), Some(output)).unwrap();
        acquisition.start().unwrap();
        let position = acquisition.wait_for_completion(Duration::from_secs(1)).unwrap();
        assert_eq!(position, 100);

        let data = acquisition.finish().unwrap();
        assert_eq!(data.input, waveform);
        assert_eq!(data.samples_output, 100);
        assert!(data.start_time.is_some());
        assert!(!device.is_acquiring().unwrap());
    }

    #[test]
    fn test_finish_counts_samples_taken_before_stop() {
        let (mock, device) = device();
        mock.set_samples_per_poll(30);
        // Continuous: the board is still sampling when finish is called.
        let protocol = Protocol::builder()
            .ai_channels(&[0])
            .ao_channels(&[AoChannel::Analog(0)])
            .build()
            .unwrap();
        let output = BufferList::from_samples((0..50).collect(), 2).unwrap();
        let input = BufferList::new(40, 2).unwrap();

        let mut acquisition = Acquisition::new(&device, protocol, Some(input), Some(output)).unwrap();
        acquisition.start().unwrap();
        assert_eq!(acquisition.position().unwrap(), 30);

        let data = acquisition.finish().unwrap();
        assert_eq!(data.samples_acquired, 60);
        assert_eq!(data.samples_acquired, device.acquisition_position().unwrap());
        assert_eq!(data.samples_output, 60);
        // Newest 40 of 60 samples, oldest first.
        let expected: Vec<i16> = (20..50).chain(0..10).collect();
        assert_eq!(data.input, expected);
    }

    #[test]
    fn test_drop_stops_and_detaches() {
        let (_mock, device) = device();
        let protocol = Protocol::builder().ai_channels(&[0, 1]).build().unwrap();
        let input = BufferList::new(64, 2).unwrap();
        let mut acquisition = Acquisition::new(&device, protocol, Some(input), None).unwrap();
        acquisition.start().unwrap();
        assert!(device.is_acquiring().unwrap());
        drop(acquisition);
        assert!(!device.is_acquiring().unwrap());
        // the protocol survives, without buffers
        assert_eq!(device.protocol().unwrap().ai_channels, vec![0, 1]);
    }

    #[test]
    fn test_wait_times_out_without_terminal_count() {
        let (mock, device) = device();
        mock.set_samples_per_poll(1);
        let protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
        let mut acquisition = Acquisition::new(&device, protocol, None, None).unwrap();
        acquisition.set_poll_interval(Duration::from_millis(1));
        acquisition.start().unwrap();
        assert!(acquisition.wait_for_completion(Duration::from_millis(10)).is_err());
        assert!(matches!(
            acquisition.wait_until(1_000_000, Duration::from_millis(10)),
            Err(DigidataError::Timeout { .. })
        ));
    }

    #[test]
    fn test_cancel_flag_ends_wait() {
        let (_mock, device) = device();
        let protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
        let mut acquisition = Acquisition::new(&device, protocol, None, None).unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        acquisition.set_cancel_flag(flag);
        acquisition.start().unwrap();
        let position = acquisition.wait_until(i64::MAX, Duration::from_secs(5)).unwrap();
        assert!(position < i64::MAX);
    }

    #[test]
    fn test_read_last_tracks_level() {
        let (mock, device) = device();
        mock.set_ai_level(2, 321);
        let protocol = Protocol::builder().ai_channels(&[2]).build().unwrap();
        let stream = ReadLast::start(&device, &protocol).unwrap();
        assert_eq!(stream.read_scans(4).unwrap(), vec![321; 4]);
        stream.stop().unwrap();
        assert!(!device.is_acquiring().unwrap());
    }
}
