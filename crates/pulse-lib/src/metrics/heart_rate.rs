use crate::{
    config::HeartRateConfig,
    signal::{HeartRateSample, PeakEvent, RingBuffer},
};
use serde::{Deserialize, Serialize};

/// BPM from two consecutive peaks, if both the spacing and the rate are plausible.
pub fn instantaneous_bpm(prev: &PeakEvent, next: &PeakEvent, cfg: &HeartRateConfig) -> Option<u32> {
    if next.timestamp_ms <= prev.timestamp_ms {
        return None;
    }
    let dt = (next.timestamp_ms - prev.timestamp_ms) as f64;
    let (min_dt, max_dt) = cfg.instant_interval_bounds_ms;
    if !(dt > min_dt && dt < max_dt) {
        return None;
    }
    let bpm = (60_000.0 / dt).round();
    let (min_bpm, max_bpm) = cfg.instant_bpm_bounds;
    (bpm >= min_bpm && bpm <= max_bpm).then_some(bpm as u32)
}

/// Median-interval BPM over the peaks in `(now - window, now]`.
pub fn windowed_bpm(
    peaks: &[PeakEvent],
    now_ms: u64,
    window_ms: u64,
    cfg: &HeartRateConfig,
) -> Option<u32> {
    let cutoff = now_ms.checked_sub(window_ms);
    let mut recent: Vec<u64> = peaks
        .iter()
        .map(|p| p.timestamp_ms)
        .filter(|&ts| ts <= now_ms && cutoff.map_or(true, |c| ts > c))
        .collect();
    recent.sort_unstable();
    let (lo, hi) = cfg.interval_bounds_ms;
    let mut intervals: Vec<f64> = recent
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .filter(|&dt| dt > lo && dt < hi)
        .collect();
    if intervals.is_empty() {
        return None;
    }
    intervals.sort_by(|a, b| a.total_cmp(b));
    let median = intervals[intervals.len() / 2];
    let (min_bpm, max_bpm) = cfg.bpm_clamp;
    Some((60_000.0 / median).round().clamp(min_bpm, max_bpm) as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateStats {
    pub current: Option<u32>,
    pub average: Option<f64>,
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub count: usize,
}

/// What a display should show right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayedBpm {
    pub bpm: Option<u32>,
    /// True when `bpm` is an old value held over a gap.
    pub held: bool,
}

/// Turns peaks into BPM and keeps the running statistics.
///
/// History holds the windowed estimates; instantaneous values are reported
/// but not averaged.
#[derive(Debug, Clone)]
pub struct HeartRateEstimator {
    cfg: HeartRateConfig,
    last_peak: Option<PeakEvent>,
    instantaneous: Option<u32>,
    current: Option<u32>,
    history: RingBuffer<HeartRateSample>,
    last_valid_ms: Option<u64>,
    last_recompute_ms: Option<u64>,
}

impl HeartRateEstimator {
    pub fn new(cfg: HeartRateConfig) -> Self {
        Self {
            cfg,
            last_peak: None,
            instantaneous: None,
            current: None,
            history: RingBuffer::with_capacity(cfg.history_len),
            last_valid_ms: None,
            last_recompute_ms: None,
        }
    }

    pub fn on_peak(&mut self, peak: &PeakEvent) -> Option<u32> {
        let bpm = self
            .last_peak
            .as_ref()
            .and_then(|prev| instantaneous_bpm(prev, peak, &self.cfg));
        self.last_peak = Some(*peak);
        if bpm.is_some() {
            self.instantaneous = bpm;
        }
        bpm
    }

    /// Recompute the windowed estimate and fold a valid result into the history.
    pub fn recompute(&mut self, peaks: &[PeakEvent], now_ms: u64) -> Option<u32> {
        self.last_recompute_ms = Some(now_ms);
        let bpm = windowed_bpm(peaks, now_ms, self.cfg.window_ms, &self.cfg);
        self.current = bpm;
        if let Some(bpm) = bpm {
            self.history.push(HeartRateSample {
                bpm,
                timestamp_ms: now_ms,
            });
            self.last_valid_ms = Some(now_ms);
        }
        bpm
    }

    /// Like [`recompute`](Self::recompute) but at most once per update interval.
    /// Returns `None` when skipped.
    pub fn recompute_if_due(&mut self, peaks: &[PeakEvent], now_ms: u64) -> Option<Option<u32>> {
        self.is_due(now_ms).then(|| self.recompute(peaks, now_ms))
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_recompute_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.cfg.update_interval_ms,
        }
    }

    pub fn instantaneous(&self) -> Option<u32> {
        self.instantaneous
    }

    /// Newest valid estimate; held over gaps rather than dropping to nothing.
    pub fn displayed(&self, now_ms: u64) -> DisplayedBpm {
        let bpm = self.history.last().map(|s| s.bpm);
        let held = match (bpm, self.last_valid_ms) {
            (Some(_), Some(last)) => now_ms.saturating_sub(last) > self.cfg.hold_after_ms,
            _ => false,
        };
        DisplayedBpm { bpm, held }
    }

    pub fn history(&self) -> Vec<HeartRateSample> {
        self.history.snapshot()
    }

    pub fn stats(&self) -> HeartRateStats {
        let count = self.history.len();
        let average = (count > 0)
            .then(|| self.history.iter().map(|s| s.bpm as f64).sum::<f64>() / count as f64);
        HeartRateStats {
            current: self.current,
            average,
            min: self.history.iter().map(|s| s.bpm).min(),
            max: self.history.iter().map(|s| s.bpm).max(),
            count,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.cfg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peaks_at(times: &[u64]) -> Vec<PeakEvent> {
        times
            .iter()
            .map(|&timestamp_ms| PeakEvent {
                timestamp_ms,
                amplitude: 3000.0,
            })
            .collect()
    }

    #[test]
    fn instantaneous_gates_spacing_and_rate() {
        let cfg = HeartRateConfig::default();
        let p = peaks_at(&[0, 600, 900, 3000]);
        assert_eq!(instantaneous_bpm(&p[0], &p[1], &cfg), Some(100));
        // exactly 300 ms is excluded
        assert_eq!(instantaneous_bpm(&p[1], &p[2], &cfg), None);
        assert_eq!(instantaneous_bpm(&p[2], &p[3], &cfg), None);
        assert_eq!(instantaneous_bpm(&p[1], &p[0], &cfg), None);
    }

    #[test]
    fn windowed_estimate_converges_for_regular_peaks() {
        let cfg = HeartRateConfig::default();
        let times: Vec<u64> = (0..30).map(|k| 1_000 + 600 * k).collect();
        let peaks = peaks_at(&times);
        assert_eq!(windowed_bpm(&peaks, 18_500, 10_000, &cfg), Some(100));
    }

    #[test]
    fn windowed_estimate_uses_median() {
        let cfg = HeartRateConfig::default();
        // one long pause and one short extra beat
        let peaks = peaks_at(&[0, 800, 1_600, 2_950, 3_750, 4_550, 4_950, 5_750]);
        assert_eq!(windowed_bpm(&peaks, 6_000, 10_000, &cfg), Some(75));
    }

    #[test]
    fn windowed_estimate_needs_two_peaks_in_window() {
        let cfg = HeartRateConfig::default();
        let peaks = peaks_at(&[0, 600, 20_000]);
        assert_eq!(windowed_bpm(&peaks, 20_000, 10_000, &cfg), None);
        assert_eq!(windowed_bpm(&[], 20_000, 10_000, &cfg), None);
    }

    #[test]
    fn estimator_tracks_stats_and_caps_history() {
        let cfg = HeartRateConfig {
            history_len: 3,
            ..HeartRateConfig::default()
        };
        let mut est = HeartRateEstimator::new(cfg);
        let fast = peaks_at(&[0, 500, 1_000]);
        let slow = peaks_at(&[0, 1_000, 2_000]);
        est.recompute(&fast, 1_000);
        est.recompute(&slow, 2_000);
        est.recompute(&slow, 2_000);
        est.recompute(&slow, 2_000);
        let stats = est.stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.current, Some(60));
        assert_eq!(stats.min, Some(60));
        assert_eq!(stats.max, Some(60));
        assert_eq!(stats.average, Some(60.0));
    }

    #[test]
    fn displayed_value_is_held_over_gaps() {
        let mut est = HeartRateEstimator::new(HeartRateConfig::default());
        assert_eq!(est.displayed(0), DisplayedBpm { bpm: None, held: false });
        est.recompute(&peaks_at(&[0, 600, 1_200]), 1_200);
        assert_eq!(est.recompute(&[], 4_000), None);
        assert_eq!(est.stats().current, None);
        assert_eq!(est.displayed(4_000), DisplayedBpm { bpm: Some(100), held: false });
        assert_eq!(est.displayed(7_000), DisplayedBpm { bpm: Some(100), held: true });
    }

    #[test]
    fn recompute_is_throttled() {
        let mut est = HeartRateEstimator::new(HeartRateConfig::default());
        let peaks = peaks_at(&[0, 600, 1_200]);
        assert_eq!(est.recompute_if_due(&peaks, 1_200), Some(Some(100)));
        assert_eq!(est.recompute_if_due(&peaks, 1_700), None);
        assert_eq!(est.recompute_if_due(&peaks, 2_200), Some(Some(100)));
    }

    #[test]
    fn on_peak_reports_instantaneous_rate() {
        let mut est = HeartRateEstimator::new(HeartRateConfig::default());
        let peaks = peaks_at(&[1_000, 1_750]);
        assert_eq!(est.on_peak(&peaks[0]), None);
        assert_eq!(est.on_peak(&peaks[1]), Some(80));
        assert_eq!(est.instantaneous(), Some(80));
    }
}
