//! Variance-based signal quality. A noisiness proxy, not an artifact classifier.

use crate::config::QualityConfig;

/// Score the trailing `cfg.window` values on a 0..=100 scale.
///
/// Fewer than `cfg.min_samples` values scores 0; a perfectly flat window scores 100.
pub fn signal_quality(values: &[f64], cfg: &QualityConfig) -> u8 {
    if values.len() < cfg.min_samples.max(1) {
        return 0;
    }
    let recent = &values[values.len().saturating_sub(cfg.window)..];
    let n = recent.len() as f64;
    let mean = recent.iter().sum::<f64>() / n;
    let variance = recent.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (100.0 - variance / cfg.variance_scale).clamp(0.0, 100.0).round() as u8
}
