use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs};
use tempfile::tempdir;

/// Flat 2000 baseline at 100 Hz with a narrow spike every 600 ms.
fn spike_value(i: u64) -> i32 {
    match (i * 10 + 300) % 600 {
        0 => 2800,
        10 => 3500,
        20 => 2800,
        _ => 2000,
    }
}

fn monitor_input(duration_ms: u64) -> String {
    let mut lines = vec![
        r#"{"status": "online"}"#.to_string(),
        "not json".to_string(),
        r#"{"ecg_value": "abc"}"#.to_string(),
    ];
    for i in 0..duration_ms / 10 {
        lines.push(format!(r#"{{"ecg_value": {}}}"#, spike_value(i)));
    }
    lines.join("\n")
}

fn run_monitor(input: &str, extra: &[&str]) -> Result<Vec<Value>, Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("messages.jsonl");
    fs::write(&path, input)?;
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["monitor", "--input", path.to_str().expect("utf8 path")])
        .args(extra);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output)?;
    Ok(text
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<Vec<Value>, _>>()?)
}

fn kinds<'a>(lines: &'a [Value], kind: &str) -> Vec<&'a Value> {
    lines.iter().filter(|l| l["kind"] == kind).collect()
}

#[test]
fn monitor_emits_samples_beats_and_status() -> Result<(), Box<dyn Error>> {
    let lines = run_monitor(&monitor_input(12_000), &[])?;

    let status = kinds(&lines, "status");
    assert_eq!(status.len(), 1);
    assert_eq!(status[0]["status"], "online");

    let samples = kinds(&lines, "sample");
    assert_eq!(samples.len(), 1200);
    assert_eq!(samples[0]["timestamp_ms"], 0);
    assert_eq!(samples[1199]["timestamp_ms"], 11_990);
    let last = samples[1199];
    assert_eq!(last["bpm"], 100);
    assert_eq!(last["bpm_held"], false);
    assert_eq!(last["signal_quality"].as_u64().map(|q| q <= 100), Some(true));
    let peaks = samples.iter().filter(|s| s["peak_detected"] == true).count();
    assert_eq!(peaks, 20);

    let beats = kinds(&lines, "beat");
    assert_eq!(beats.len(), 1);
    assert_eq!(beats[0]["timestamp_ms"], 10_000);
    assert_eq!(beats[0]["rhythm"]["regularity"], "Regular");
    assert!(beats[0]["intervals"].is_object());
    Ok(())
}

#[test]
fn monitor_can_emit_analysis_only() -> Result<(), Box<dyn Error>> {
    let lines = run_monitor(&monitor_input(12_000), &["--emit", "analysis"])?;
    assert!(kinds(&lines, "sample").is_empty());
    assert_eq!(kinds(&lines, "beat").len(), 1);
    Ok(())
}

#[test]
fn monitor_uses_device_timestamps() -> Result<(), Box<dyn Error>> {
    let input = (0..20)
        .map(|i| format!(r#"{{"ecg_value": 2000, "timestamp": {}}}"#, 5_000 + i * 4))
        .collect::<Vec<_>>()
        .join("\n");
    let lines = run_monitor(&input, &["--fs", "250", "--emit", "samples"])?;
    assert_eq!(lines.len(), 20);
    assert_eq!(lines[19]["timestamp_ms"], 5_076);
    assert_eq!(lines[19]["signal_quality"], 100);
    assert_eq!(lines[19]["bpm"], Value::Null);
    Ok(())
}

#[test]
fn monitor_rejects_invalid_sample_rate() {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["monitor", "--fs", "0"]).write_stdin("");
    cmd.assert().failure();
}
