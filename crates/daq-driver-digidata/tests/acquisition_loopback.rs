//! Digidata Acquisition Test Suite
//!
//! Buffered and read-last acquisitions against the simulated driver, whose
//! analog outputs are wired back to the analog inputs of the same number.
//!
//! # Test Coverage
//!
//! | Test | Description |
//! |------|-------------|
//! | `test_stop_on_terminal_count` | Acquisition halts at exactly the terminal count |
//! | `test_multi_channel_loopback` | Interleaved outputs return on matching inputs |
//! | `test_ring_wraps` | Input ring smaller than the acquisition keeps the newest samples |
//! | `test_pause_and_resume` | Paused acquisitions do not advance |
//! | `test_start_time` | Start time and counter bracket are reported |
//! | `test_read_last_streaming` | Read-last follows output changes |
//! | `test_acquisition_guard_from_thread` | Guard and device move across threads |

use std::sync::Arc;
use std::time::Duration;

use daq_driver_digidata::{
    Acquisition, AoChannel, BufferList, Digidata, MockDriver, Protocol, ProtocolFlags, ReadLast,
};

const TIMEOUT: Duration = Duration::from_secs(2);

fn open_mock() -> (Arc<MockDriver>, Digidata) {
    let mock = Arc::new(MockDriver::new());
    let device = Digidata::open_first_with(mock.clone()).expect("open simulated board");
    (mock, device)
}

// =============================================================================
// Buffered acquisition
// =============================================================================

#[test]
fn test_stop_on_terminal_count() {
    let (mock, device) = open_mock();
    mock.set_samples_per_poll(300);
    mock.set_ai_level(4, 99);

    let protocol = Protocol::builder()
        .ai_channels(&[4])
        .flags(ProtocolFlags::STOP_ON_TC)
        .terminal_count(1000)
        .build()
        .unwrap();
    let input = BufferList::new(1000, 5).unwrap();

    let mut acquisition = Acquisition::new(&device, protocol, Some(input), None).unwrap();
    acquisition.start().unwrap();
    assert!(acquisition.is_running().unwrap());

    let position = acquisition.wait_for_completion(TIMEOUT).unwrap();
    assert_eq!(position, 1000);
    assert!(!acquisition.is_running().unwrap());

    let data = acquisition.finish().unwrap();
    assert_eq!(data.samples_acquired, 1000);
    assert_eq!(data.samples_output, 0);
    assert!(data.input.iter().all(|&s| s == 99));
}

#[test]
fn test_multi_channel_loopback() {
    let (_mock, device) = open_mock();
    let scans = 40;

    // AO0 ramps up, AO1 ramps down.
    let mut waveform = Vec::with_capacity(scans * 2);
    for i in 0..scans as i16 {
        waveform.push(i * 10);
        waveform.push(-i * 10);
    }

    let protocol = Protocol::builder()
        .ai_channels(&[1, 0, 7])
        .ao_channels(&[AoChannel::Analog(0), AoChannel::Analog(1)])
        .flags(ProtocolFlags::STOP_ON_TC)
        .terminal_count((scans * 3) as i64)
        .build()
        .unwrap();
    let output = BufferList::from_samples(waveform, 4).unwrap();
    let input = BufferList::new(scans * 3, 4).unwrap();

    let mut acquisition = Acquisition::new(&device, protocol, Some(input), Some(output)).unwrap();
    acquisition.start().unwrap();
    acquisition.wait_for_completion(TIMEOUT).unwrap();
    let data = acquisition.finish().unwrap();

    assert_eq!(data.samples_output, (scans * 2) as i64);
    for (scan, chunk) in data.input.chunks(3).enumerate() {
        let i = scan as i16;
        assert_eq!(chunk, &[-i * 10, i * 10, 0], "scan {scan}");
    }
}

#[test]
fn test_ring_wraps() {
    let (mock, device) = open_mock();
    mock.set_samples_per_poll(7);

    let waveform: Vec<i16> = (0..100).collect();
    let protocol = Protocol::builder()
        .ai_channels(&[0])
        .ao_channels(&[AoChannel::Analog(0)])
        .flags(ProtocolFlags::STOP_ON_TC)
        .terminal_count(100)
        .build()
        .unwrap();
    let output = BufferList::from_samples(waveform, 3).unwrap();
    let input = BufferList::new(30, 3).unwrap();

    let mut acquisition = Acquisition::new(&device, protocol, Some(input), Some(output)).unwrap();
    acquisition.set_poll_interval(Duration::from_millis(1));
    acquisition.start().unwrap();
    acquisition.wait_for_completion(TIMEOUT).unwrap();
    let data = acquisition.finish().unwrap();

    assert_eq!(data.input, (70..100).collect::<Vec<i16>>());
}

#[test]
fn test_pause_and_resume() {
    let (_mock, device) = open_mock();
    let protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
    let mut acquisition = Acquisition::new(&device, protocol, None, None).unwrap();
    acquisition.start().unwrap();

    let before = acquisition.position().unwrap();
    acquisition.pause().unwrap();
    assert!(device.is_paused().unwrap());
    assert_eq!(acquisition.position().unwrap(), before);

    acquisition.resume().unwrap();
    assert!(!device.is_paused().unwrap());
    assert!(acquisition.position().unwrap() > before);

    acquisition.stop().unwrap();
    assert!(!device.is_acquiring().unwrap());
}

#[test]
fn test_start_time() {
    let (_mock, device) = open_mock();
    let protocol = Protocol::builder().ai_channels(&[0]).build().unwrap();
    let mut acquisition = Acquisition::new(&device, protocol, None, None).unwrap();
    acquisition.start().unwrap();

    let start = acquisition.start_time().unwrap();
    assert!(start.wall_clock.is_some());
    assert!(start.uncertainty_ticks() >= 0);
}

// =============================================================================
// Read-last streaming
// =============================================================================

#[test]
fn test_read_last_streaming() {
    let (mock, device) = open_mock();
    let protocol = Protocol::builder().ai_channels(&[0, 1]).build().unwrap();

    device.write_ao(0, 10).unwrap();
    mock.set_ai_level(1, -10);
    let stream = ReadLast::start(&device, &protocol).unwrap();
    assert_eq!(stream.read_scans(3).unwrap().len(), 6);

    let latest = stream.read(4).unwrap();
    assert!(latest.contains(&10));
    assert!(latest.contains(&-10));

    device.write_ao(0, 20).unwrap();
    assert!(stream.read(4).unwrap().contains(&20));

    drop(stream);
    assert!(!device.is_acquiring().unwrap());
}

#[test]
fn test_read_last_requires_mode() {
    let (_mock, device) = open_mock();
    assert!(device.read_last(4).is_err());
}

// =============================================================================
// Threading
// =============================================================================

#[test]
fn test_acquisition_guard_from_thread() {
    let (_mock, device) = open_mock();
    let protocol = Protocol::builder()
        .ai_channels(&[0])
        .flags(ProtocolFlags::STOP_ON_TC)
        .terminal_count(512)
        .build()
        .unwrap();
    let input = BufferList::new(512, 2).unwrap();
    let mut acquisition = Acquisition::new(&device, protocol, Some(input), None).unwrap();
    acquisition.start().unwrap();

    let handle = std::thread::spawn(move || {
        acquisition.wait_for_completion(TIMEOUT).unwrap();
        acquisition.finish().unwrap()
    });
    let data = handle.join().unwrap();
    assert_eq!(data.input.len(), 512);
    assert!(!device.is_acquiring().unwrap());
}
