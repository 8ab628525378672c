pub mod beat;
pub mod clock;
pub mod config;
pub mod detectors;
pub mod error;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod session;
pub mod signal;

pub use beat::*;
pub use config::AnalysisConfig;
pub use detectors::*;
pub use error::ConfigError;
pub use metrics::*;
pub use session::{BeatAnalysis, EcgSession, SampleOutput};
pub use signal::*;
