use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::Path};
use tempfile::tempdir;

/// Flat 2000 baseline at 100 Hz with a narrow spike every 600 ms.
fn spike_train(duration_ms: u64) -> Vec<(u64, i32)> {
    (0..duration_ms / 10)
        .map(|i| {
            let ts = i * 10;
            let value = match (ts + 300) % 600 {
                0 => 2800,
                10 => 3500,
                20 => 2800,
                _ => 2000,
            };
            (ts, value)
        })
        .collect()
}

fn run(args: &[&str]) -> Result<String, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(args);
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(String::from_utf8(output)?)
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

#[test]
fn analyze_plain_series_reports_rate_and_rhythm() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("ecg.txt");
    let text: Vec<String> = spike_train(8_000).iter().map(|(_, v)| v.to_string()).collect();
    fs::write(&input, text.join("\n"))?;

    let summary: Value = serde_json::from_str(&run(&["analyze", "--input", path_str(&input)])?)?;
    assert_eq!(summary["samples"], 800);
    assert_eq!(summary["duration_ms"], 7_990);
    assert_eq!(summary["peaks"], 13);
    assert_eq!(summary["heart_rate"]["current"], 100);
    assert_eq!(summary["bpm"]["bpm"], 100);
    assert_eq!(summary["rhythm"]["regularity"], "Regular");
    assert_eq!(summary["rhythm"]["classification"], "NormalSinus");
    assert!(summary["analysis"].is_object());
    Ok(())
}

#[test]
fn analyze_csv_takes_rate_from_timestamps() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("ecg.csv");
    let mut csv = String::from("timestamp,value\n");
    for (ts, v) in spike_train(8_000) {
        csv.push_str(&format!("{},{}\n", ts, v));
    }
    fs::write(&input, csv)?;

    let summary: Value =
        serde_json::from_str(&run(&["analyze", "--csv", "--input", path_str(&input)])?)?;
    assert_eq!(summary["sample_rate_hz"], 100.0);
    assert_eq!(summary["heart_rate"]["current"], 100);
    Ok(())
}

#[test]
fn analyze_reads_toml_config() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("ecg.txt");
    let text: Vec<String> = spike_train(1_000).iter().map(|(_, v)| v.to_string()).collect();
    fs::write(&input, text.join("\n"))?;
    let config = dir.path().join("pulse.toml");
    fs::write(&config, "[session]\nmin_connected_ms = 500\n\n[beat]\nmin_buffer_len = 50\n")?;

    let without: Value = serde_json::from_str(&run(&["analyze", "--input", path_str(&input)])?)?;
    assert!(without["analysis"].is_null());

    let with: Value = serde_json::from_str(&run(&[
        "analyze",
        "--input",
        path_str(&input),
        "--config",
        path_str(&config),
    ])?)?;
    assert!(with["analysis"].is_object());
    Ok(())
}

#[test]
fn filter_preserves_length() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("ecg.txt");
    let text: Vec<String> = spike_train(500).iter().map(|(_, v)| v.to_string()).collect();
    fs::write(&input, text.join("\n"))?;

    for profile in ["minimal", "medical-grade"] {
        let out = run(&["filter", "--input", path_str(&input), "--profile", profile])?;
        let values: Vec<f64> = out
            .lines()
            .map(|l| l.parse())
            .collect::<Result<_, _>>()?;
        assert_eq!(values.len(), 50);
        assert!(values.iter().all(|v| v.is_finite()));
    }
    Ok(())
}

#[test]
fn to_mv_converts_codes() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.arg("to-mv").write_stdin("0\n4095\n2047.5\n");
    let output = cmd.assert().success().get_output().stdout.clone();
    let values: Vec<f64> = String::from_utf8(output)?
        .lines()
        .map(|l| l.parse())
        .collect::<Result<_, _>>()?;
    assert_eq!(values, vec![-1650.0, 1650.0, 0.0]);
    Ok(())
}

#[test]
fn invalid_config_fails() {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["filter", "--fs", "0"]).write_stdin("1\n2\n");
    cmd.assert().failure();

    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["to-mv", "--max-code", "0"]).write_stdin("1\n");
    cmd.assert().failure();
}
