use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;

use crate::signal::Sample;

/// Column names accepted for the ECG value.
const VALUE_COLUMNS: [&str; 2] = ["value", "ecg_value"];

/// Load a `timestamp,value` CSV recording (timestamps in ms).
pub fn read_recording_csv(path: &Path) -> Result<Vec<Sample>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_recording_csv(file).with_context(|| format!("reading {}", path.display()))
}

/// Same as [`read_recording_csv`] for any reader.
pub fn parse_recording_csv<R: Read>(input: R) -> Result<Vec<Sample>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers = reader.headers()?.clone();
    let timestamp_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("timestamp"))
        .context("missing timestamp column")?;
    let value_idx = headers
        .iter()
        .position(|h| VALUE_COLUMNS.iter().any(|c| h.eq_ignore_ascii_case(c)))
        .context("missing value column")?;

    let mut samples = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.context("reading record")?;
        let timestamp_str = record
            .get(timestamp_idx)
            .ok_or_else(|| anyhow::anyhow!("row {}: missing timestamp", row + 1))?;
        let timestamp: f64 = timestamp_str
            .parse()
            .with_context(|| format!("row {}: parsing timestamp {}", row + 1, timestamp_str))?;
        let value_str = record
            .get(value_idx)
            .ok_or_else(|| anyhow::anyhow!("row {}: missing value", row + 1))?;
        let value: f64 = value_str
            .parse()
            .with_context(|| format!("row {}: parsing value {}", row + 1, value_str))?;
        if !timestamp.is_finite() || timestamp < 0.0 || !value.is_finite() {
            anyhow::bail!("row {}: non-finite or negative entry", row + 1);
        }
        samples.push(Sample::new(value.round() as i32, timestamp.round() as u64));
    }
    if samples.is_empty() {
        anyhow::bail!("recording has no samples");
    }
    Ok(samples)
}

/// Sampling rate implied by the first two timestamps, if they differ.
pub fn estimate_sample_rate(samples: &[Sample]) -> Option<f64> {
    match samples {
        [a, b, ..] if b.timestamp_ms > a.timestamp_ms => {
            Some(1000.0 / (b.timestamp_ms - a.timestamp_ms) as f64)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_recording() {
        let csv = "timestamp,value\n0,2048\n10, 2050\n20,2100.6\n";
        let samples = parse_recording_csv(csv.as_bytes()).unwrap();
        assert_eq!(
            samples,
            vec![
                Sample::new(2048, 0),
                Sample::new(2050, 10),
                Sample::new(2101, 20)
            ]
        );
        assert_eq!(estimate_sample_rate(&samples), Some(100.0));
    }

    #[test]
    fn accepts_reordered_columns() {
        let csv = "ECG_VALUE,Timestamp\n2000,4\n2001,8\n";
        let samples = parse_recording_csv(csv.as_bytes()).unwrap();
        assert_eq!(samples[1], Sample::new(2001, 8));
        assert_eq!(estimate_sample_rate(&samples), Some(250.0));
    }

    #[test]
    fn rejects_bad_rows() {
        assert!(parse_recording_csv("timestamp,value\n0,abc\n".as_bytes()).is_err());
        assert!(parse_recording_csv("time,value\n0,1\n".as_bytes()).is_err());
        assert!(parse_recording_csv("timestamp,value\n".as_bytes()).is_err());
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,value\n0,2000\n10,2001").unwrap();
        let samples = read_recording_csv(file.path()).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(read_recording_csv(Path::new("/nonexistent/recording.csv")).is_err());
    }

    #[test]
    fn single_sample_has_no_rate() {
        assert_eq!(estimate_sample_rate(&[Sample::new(1, 0)]), None);
    }
}
