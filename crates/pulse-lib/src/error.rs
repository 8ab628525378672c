use thiserror::Error;

/// Configuration problems. Nothing else in the pipeline raises; data-shape
/// issues surface as `None` / `InsufficientData` instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive, got {0} Hz")]
    InvalidSampleRate(f64),
    #[error("{name} cutoff must be in (0, fs/2), got {value} Hz")]
    InvalidCutoff { name: &'static str, value: f64 },
    #[error("{0} must be non-zero")]
    EmptyWindow(&'static str),
    #[error("{name} bounds are inverted: ({min}, {max})")]
    InvertedBounds {
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{name} must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
