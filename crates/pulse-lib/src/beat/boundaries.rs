//! Derivative-plus-baseline scans over narrow windows relative to the R peak.
//!
//! Each search is independent of the others and of the streaming detector.

use super::extract::ExtractedBeat;
use crate::config::{Bounds, IntervalConfig, MorphologyConfig};

/// Central difference `(x[i+1] - x[i-1]) / 2`, zero at both ends.
pub fn derivative(values: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; values.len()];
    for i in 1..values.len().saturating_sub(1) {
        out[i] = (values[i + 1] - values[i - 1]) / 2.0;
    }
    out
}

/// Population standard deviation; 0 for an empty slice.
pub fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Isoelectric level from the TP segment, falling back to the median of the
/// whole beat when that segment is too short.
pub fn isoelectric_baseline(beat: &ExtractedBeat, values: &[f64], cfg: &MorphologyConfig) -> f64 {
    let (from, to) = cfg.tp_segment_ms;
    if let Some((s, e)) = beat.window(from, to) {
        if e + 1 - s >= cfg.min_tp_samples.max(1) {
            let segment = &values[s..=e];
            return segment.iter().sum::<f64>() / segment.len() as f64;
        }
    }
    median(values).unwrap_or(0.0)
}

/// Index range of `window` plus `stddev(region) * factor` for it.
pub fn windowed_threshold(
    beat: &ExtractedBeat,
    values: &[f64],
    window: Bounds,
    region: Bounds,
    factor: f64,
) -> Option<(usize, usize, f64)> {
    let (s, e) = beat.window(window.0, window.1)?;
    let (rs, re) = beat.window(region.0, region.1)?;
    let threshold = stddev(&values[rs..=re]) * factor;
    (threshold > 0.0).then_some((s, e, threshold))
}

/// First sample in the P window whose slope exceeds the local threshold.
pub fn find_p_onset(
    beat: &ExtractedBeat,
    values: &[f64],
    deriv: &[f64],
    cfg: &MorphologyConfig,
) -> Option<usize> {
    let (s, e, threshold) =
        windowed_threshold(beat, values, cfg.p_window_ms, cfg.p_window_ms, cfg.p_threshold_factor)?;
    (s..=e).find(|&i| deriv[i] > threshold)
}

/// First steep upstroke in the pre-R window.
pub fn find_qrs_onset(
    beat: &ExtractedBeat,
    values: &[f64],
    deriv: &[f64],
    cfg: &IntervalConfig,
) -> Option<usize> {
    let (s, e, threshold) = windowed_threshold(
        beat,
        values,
        cfg.qrs_onset_window_ms,
        cfg.qrs_region_ms,
        cfg.qrs_threshold_factor,
    )?;
    (s..=e).find(|&i| deriv[i] > threshold)
}

/// First return to baseline in the post-R window.
pub fn find_qrs_offset(
    beat: &ExtractedBeat,
    values: &[f64],
    baseline: f64,
    cfg: &IntervalConfig,
) -> Option<usize> {
    let (s, e, threshold) = windowed_threshold(
        beat,
        values,
        cfg.qrs_offset_window_ms,
        cfg.qrs_region_ms,
        cfg.qrs_threshold_factor,
    )?;
    (s..=e).find(|&i| (values[i] - baseline).abs() < threshold)
}

/// Largest deviation in the T window, then the next return to baseline.
pub fn find_t_offset(
    beat: &ExtractedBeat,
    values: &[f64],
    baseline: f64,
    cfg: &IntervalConfig,
) -> Option<usize> {
    let (s, e, threshold) = windowed_threshold(
        beat,
        values,
        cfg.t_peak_window_ms,
        cfg.t_region_ms,
        cfg.t_threshold_factor,
    )?;
    let peak = (s..=e).max_by(|&a, &b| {
        (values[a] - baseline)
            .abs()
            .total_cmp(&(values[b] - baseline).abs())
    })?;
    if (values[peak] - baseline).abs() < threshold {
        return None;
    }
    (peak + 1..values.len()).find(|&i| (values[i] - baseline).abs() < threshold)
}
