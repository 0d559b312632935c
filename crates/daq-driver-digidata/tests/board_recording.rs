//! Named-Channel Board Test Suite
//!
//! Runs whole acquisitions through [`Board`] against the simulated driver and
//! checks scaling, aliases and CSV output.
//!
//! # Test Coverage
//!
//! | Test | Description |
//! |------|-------------|
//! | `test_voltage_clamp_step` | Command step on an output comes back scaled on the input |
//! | `test_record_without_outputs` | Input-only recording of constant levels |
//! | `test_digital_output_waveform` | Digital bits follow their waveform |
//! | `test_recording_saved_as_csv` | CSV file holds time column and every signal |
//! | `test_board_from_toml` | Board layout loaded from a TOML document |

use std::sync::Arc;

use daq_driver_digidata::{Board, BoardConfig, Digidata, MockDriver, Scaling};
use tempfile::TempDir;

fn board() -> (Arc<MockDriver>, Board) {
    let mock = Arc::new(MockDriver::new());
    let device = Digidata::open_first_with(mock.clone()).expect("open simulated board");
    (mock, Board::new(device))
}

#[test]
fn test_voltage_clamp_step() {
    let (_mock, board) = board();
    // 10 mV/mV on the input, 20 mV/mV on the command.
    board.set_analog_input("primary", 0, 0.01).unwrap();
    board.set_analog_output("command", 0, 0.02).unwrap();
    board.set_alias("V", "primary").unwrap();
    board.set_alias("Vc", "command").unwrap();

    let step: Vec<f64> = (0..200).map(|i| if i < 100 { -70.0 } else { 10.0 }).collect();
    let recording = board.acquire(&["V"], &[("Vc", step.as_slice())], 50.0).unwrap();

    assert_eq!(recording.len(), 200);
    assert_eq!(recording.scan_interval_us, 50.0);
    let v = recording.signal("V").unwrap();
    // Command volts equal input volts, so the input reads command * 2.
    for (measured, command) in v.iter().zip(&step) {
        assert!((measured - command * 2.0).abs() < 0.1, "{measured} vs {command}");
    }
    assert!((recording.times()[100] - 0.005).abs() < 1e-12);
}

#[test]
fn test_record_without_outputs() {
    let (mock, board) = board();
    board.set_analog_input("a", 2, 1.0).unwrap();
    board.set_analog_input("b", 3, 0.5).unwrap();
    mock.set_ai_level(2, Scaling::BOARD.volts_to_counts(1.0));
    mock.set_ai_level(3, Scaling::BOARD.volts_to_counts(-1.0));

    let recording = board.record(&["a", "b"], 64, 100.0).unwrap();
    assert_eq!(recording.signals.len(), 2);
    assert!(recording.signal("a").unwrap().iter().all(|v| (v - 1.0).abs() < 1e-3));
    assert!(recording.signal("b").unwrap().iter().all(|v| (v + 2.0).abs() < 1e-3));
}

#[test]
fn test_digital_output_waveform() {
    let (_mock, board) = board();
    board.set_analog_input("in", 0, 1.0).unwrap();
    board.set_digital_output("trigger", 1).unwrap();

    let pulse: Vec<f64> = (0..20).map(|i| if (5..10).contains(&i) { 1.0 } else { 0.0 }).collect();
    let recording = board.acquire(&["in"], &[("trigger", pulse.as_slice())], 100.0).unwrap();
    assert_eq!(recording.signal("trigger").unwrap(), pulse.as_slice());
    // AI 0 is not driven by the digital word.
    assert!(recording.signal("in").unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn test_recording_saved_as_csv() {
    let (_mock, board) = board();
    board.set_analog_input("Vm", 0, 1.0).unwrap();
    board.set_analog_output("Ic", 0, 1.0).unwrap();
    let command = [0.5, 1.0, 1.5];

    let recording = board.acquire(&["Vm"], &[("Ic", &command[..])], 1000.0).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("recording.csv");
    recording.save_csv(&path).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["t", "Vm", "Ic"]);

    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 3);
    let t: f64 = rows[2][0].parse().unwrap();
    assert!((t - 0.002).abs() < 1e-12);
    let vm: f64 = rows[1][1].parse().unwrap();
    assert!((vm - 1.0).abs() < 1e-3);
    assert_eq!(&rows[2][2], "1.5");
}

#[test]
fn test_board_from_toml() {
    let config = BoardConfig::from_toml_str(
        r#"
        [analog_inputs.Vm]
        channel = 1
        gain = 0.1

        [analog_outputs.Vc]
        channel = 1
        gain = 0.1

        [aliases]
        voltage = "Vm"
        command = "Vc"
        "#,
    )
    .unwrap();

    let (_mock, board) = board();
    let board = config.build(board.device().clone()).unwrap();
    board.write("command", 20.0).unwrap();
    let measured = board.read("voltage").unwrap();
    assert!((measured - 20.0).abs() < 0.01, "{measured}");

    assert!(BoardConfig::from_toml_str("[analog_inputs.x]\nchannel = \"zero\"").is_err());
}
