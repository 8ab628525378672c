use crate::{config::AnalysisConfig, signal::Sample};
use serde::{Deserialize, Serialize};

/// One beat cut out of the analysis buffer, time rebased so the R peak sits at t = 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedBeat {
    /// `(relative_ms, value)` pairs, oldest first.
    pub samples: Vec<(i64, f64)>,
    pub r_peak_index: usize,
    /// Nominal spacing between samples (ms).
    pub sample_period_ms: f64,
}

impl ExtractedBeat {
    pub fn from_values(values: &[f64], r_peak_index: usize, sample_period_ms: f64) -> Self {
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let rel = (i as f64 - r_peak_index as f64) * sample_period_ms;
                (rel.round() as i64, v)
            })
            .collect();
        Self {
            samples,
            r_peak_index,
            sample_period_ms,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|&(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Index range for a window relative to the R peak, clipped to the beat.
    /// `None` if the window lies entirely outside it.
    pub fn window(&self, from_ms: f64, to_ms: f64) -> Option<(usize, usize)> {
        if self.samples.is_empty() {
            return None;
        }
        let r = self.r_peak_index as isize;
        let start = r + (from_ms / self.sample_period_ms).round() as isize;
        let end = r + (to_ms / self.sample_period_ms).round() as isize;
        let last = self.samples.len() as isize - 1;
        if end < 0 || start > last || start > end {
            return None;
        }
        Some((start.max(0) as usize, end.min(last) as usize))
    }

    /// Convert an index distance to milliseconds.
    pub fn span_ms(&self, from: usize, to: usize) -> f64 {
        (to as f64 - from as f64) * self.sample_period_ms
    }
}

/// Cut the beat around the global maximum of `buffer`.
///
/// Does not judge whether the maximum is cardiac or artifact; gate on signal
/// quality before calling.
pub fn extract_beat(buffer: &[Sample], cfg: &AnalysisConfig) -> Option<ExtractedBeat> {
    let points: Vec<(u64, f64)> = buffer
        .iter()
        .map(|s| (s.timestamp_ms, s.value as f64))
        .collect();
    extract_beat_from_points(&points, cfg)
}

/// Same as [`extract_beat`] for already-converted (e.g. filtered) points.
pub fn extract_beat_from_points(points: &[(u64, f64)], cfg: &AnalysisConfig) -> Option<ExtractedBeat> {
    if points.len() < cfg.beat.min_buffer_len.max(1) {
        return None;
    }
    let r = points
        .iter()
        .enumerate()
        .fold(0usize, |best, (i, p)| if p.1 > points[best].1 { i } else { best });
    let before = cfg.ms_to_samples(cfg.beat.radius_ms).max(1) as usize;
    let after = cfg.ms_to_samples(cfg.beat.post_ms).max(1) as usize;
    let start = r.saturating_sub(before);
    let end = r.saturating_add(after).min(points.len() - 1);
    let r_ts = points[r].0;
    let samples = points[start..=end]
        .iter()
        .map(|&(ts, v)| (offset_ms(ts, r_ts), v))
        .collect();
    Some(ExtractedBeat {
        samples,
        r_peak_index: r - start,
        sample_period_ms: cfg.sample_period_ms(),
    })
}

/// Signed `ts - origin`, saturating at the `i64` range.
fn offset_ms(ts: u64, origin: u64) -> i64 {
    if ts >= origin {
        i64::try_from(ts - origin).unwrap_or(i64::MAX)
    } else {
        i64::try_from(origin - ts).map_or(i64::MIN, |d| -d)
    }
}
