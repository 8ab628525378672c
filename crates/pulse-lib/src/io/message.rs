//! Inbound device messages, one JSON object per line.
//!
//! Samples look like `{"ecg_value": 2048, "timestamp": 1200}`; the value may
//! also arrive as a numeric string and the timestamp may be missing.
//! Status messages look like `{"status": "battery low"}`.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceMessage {
    Sample {
        value: i32,
        /// Device timestamp in ms; `None` means stamp on arrival.
        timestamp_ms: Option<u64>,
    },
    Status { status: String },
}

/// Parse one message line. Non-numeric ECG values are an error so they never
/// reach the pipeline.
pub fn parse_message(line: &str) -> Result<DeviceMessage> {
    let value: Value = serde_json::from_str(line.trim()).context("message is not JSON")?;
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("message is not a JSON object"))?;

    if let Some(raw) = object.get("ecg_value") {
        let value = ecg_value(raw)?;
        let timestamp_ms = object.get("timestamp").and_then(timestamp_ms);
        return Ok(DeviceMessage::Sample {
            value,
            timestamp_ms,
        });
    }
    if let Some(status) = object.get("status") {
        let status = match status {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Ok(DeviceMessage::Status { status });
    }
    bail!("message has neither ecg_value nor status")
}

/// Integer part of a number or numeric string, like a lenient integer parse.
fn ecg_value(raw: &Value) -> Result<i32> {
    let number = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let number = number
        .filter(|n| n.is_finite())
        .ok_or_else(|| anyhow!("invalid ECG value: {raw}"))?;
    let truncated = number.trunc();
    if truncated < i32::MIN as f64 || truncated > i32::MAX as f64 {
        bail!("ECG value out of range: {raw}");
    }
    Ok(truncated as i32)
}

fn timestamp_ms(raw: &Value) -> Option<u64> {
    match raw {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_sample() {
        assert_eq!(
            parse_message(r#"{"ecg_value": 2048, "timestamp": 1200}"#).unwrap(),
            DeviceMessage::Sample {
                value: 2048,
                timestamp_ms: Some(1200)
            }
        );
    }

    #[test]
    fn accepts_string_values_and_truncates() {
        assert_eq!(
            parse_message(r#"{"ecg_value": " 2051.9"}"#).unwrap(),
            DeviceMessage::Sample {
                value: 2051,
                timestamp_ms: None
            }
        );
    }

    #[test]
    fn unparseable_timestamp_is_left_to_the_caller() {
        let msg = parse_message(r#"{"ecg_value": 1, "timestamp": "2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(
            msg,
            DeviceMessage::Sample {
                value: 1,
                timestamp_ms: None
            }
        );
    }

    #[test]
    fn rejects_non_numeric_values() {
        assert!(parse_message(r#"{"ecg_value": "abc"}"#).is_err());
        assert!(parse_message(r#"{"ecg_value": null}"#).is_err());
        assert!(parse_message(r#"{"ecg_value": [1]}"#).is_err());
        assert!(parse_message(r#"{"ecg_value": 1e12}"#).is_err());
        assert!(parse_message("not json").is_err());
        assert!(parse_message("[1, 2]").is_err());
        assert!(parse_message(r#"{"other": 1}"#).is_err());
    }

    #[test]
    fn parses_status() {
        assert_eq!(
            parse_message(r#"{"status": "battery low"}"#).unwrap(),
            DeviceMessage::Status {
                status: "battery low".into()
            }
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(DeviceMessage::Status {
            status: "online".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["status"], "online");
    }
}
