use crate::{
    config::DetectorConfig,
    signal::{PeakEvent, RingBuffer},
};
use serde::{Deserialize, Serialize};

/// Stream the detector listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    #[default]
    Raw,
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdMode {
    /// `mean + k * stddev` over the rolling window.
    #[default]
    Adaptive,
    /// Jumps to a fraction of each accepted peak, relaxes toward a floor otherwise.
    Decaying,
}

/// Detector whose peaks feed the rhythm buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RhythmPeakSource {
    #[default]
    Streaming,
    LocalMaxima,
}

/// Single-sample streaming R-peak detector with a refractory period.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    cfg: DetectorConfig,
    threshold: f64,
    last_peak_ms: Option<u64>,
    window: RingBuffer<f64>,
}

impl PeakDetector {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self {
            cfg,
            threshold: cfg.initial_threshold,
            last_peak_ms: None,
            window: RingBuffer::with_capacity(cfg.window_len),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn last_peak_ms(&self) -> Option<u64> {
        self.last_peak_ms
    }

    /// Feed one sample; returns the peak if this sample qualifies as one.
    pub fn observe(&mut self, value: f64, timestamp_ms: u64) -> Option<PeakEvent> {
        if self.cfg.mode == ThresholdMode::Adaptive && self.window.len() > self.cfg.min_window {
            let (mean, sd) = mean_std(self.window.iter().copied());
            self.threshold = mean + self.cfg.sigma_scale * sd;
        }
        self.window.push(value);

        if value <= self.threshold {
            if self.cfg.mode == ThresholdMode::Decaying {
                self.threshold = (self.threshold * self.cfg.decay).max(self.cfg.threshold_floor);
            }
            return None;
        }
        if !self.refractory_elapsed(timestamp_ms) {
            return None;
        }

        self.last_peak_ms = Some(timestamp_ms);
        if self.cfg.mode == ThresholdMode::Decaying {
            self.threshold = (value * self.cfg.peak_fraction)
                .clamp(self.cfg.threshold_floor, self.cfg.threshold_ceiling);
        }
        Some(PeakEvent {
            timestamp_ms,
            amplitude: value,
        })
    }

    fn refractory_elapsed(&self, timestamp_ms: u64) -> bool {
        match self.last_peak_ms {
            None => true,
            Some(last) => {
                timestamp_ms > last && timestamp_ms - last > self.cfg.refractory_ms
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.cfg);
    }
}

/// Indices of samples strictly greater than both neighbours and above `threshold`.
pub fn find_local_maxima(values: &[f64], threshold: f64) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    (1..values.len() - 1)
        .filter(|&i| {
            let y = values[i];
            y > threshold && y > values[i - 1] && y > values[i + 1]
        })
        .collect()
}

/// Windowed local-maximum detector for continuous-buffer rhythm analysis.
///
/// Each scan looks at the trailing window only; anything within the refractory
/// period of the last accepted peak is treated as a duplicate.
#[derive(Debug, Clone)]
pub struct LocalMaximaTracker {
    window_ms: u64,
    refractory_ms: u64,
    sigma_scale: f64,
    last_accepted_ms: Option<u64>,
}

impl LocalMaximaTracker {
    pub fn new(cfg: &DetectorConfig) -> Self {
        Self {
            window_ms: cfg.local_window_ms,
            refractory_ms: cfg.refractory_ms,
            sigma_scale: cfg.sigma_scale,
            last_accepted_ms: None,
        }
    }

    /// Scan `(timestamp_ms, value)` points (oldest first) and return new peaks.
    pub fn scan(&mut self, points: &[(u64, f64)]) -> Vec<PeakEvent> {
        let Some(&(newest, _)) = points.last() else {
            return Vec::new();
        };
        let cutoff = newest.saturating_sub(self.window_ms);
        let start = points.partition_point(|&(ts, _)| ts < cutoff);
        let recent = &points[start..];
        let values: Vec<f64> = recent.iter().map(|&(_, v)| v).collect();
        let (mean, sd) = mean_std(values.iter().copied());
        let threshold = mean + self.sigma_scale * sd;

        let mut accepted = Vec::new();
        for idx in find_local_maxima(&values, threshold) {
            let (ts, value) = recent[idx];
            let fresh = match self.last_accepted_ms {
                None => true,
                Some(last) => ts > last && ts - last > self.refractory_ms,
            };
            if fresh {
                self.last_accepted_ms = Some(ts);
                accepted.push(PeakEvent {
                    timestamp_ms: ts,
                    amplitude: value,
                });
            }
        }
        accepted
    }

    pub fn reset(&mut self) {
        self.last_accepted_ms = None;
    }
}

/// Population mean and standard deviation.
pub(crate) fn mean_std<I: Iterator<Item = f64> + Clone>(values: I) -> (f64, f64) {
    let (n, sum) = values.clone().fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat baseline with a three-sample QRS spike every `rr_ms`, sampled at 100 Hz.
    fn spike_train(rr_ms: u64, duration_ms: u64) -> Vec<(u64, f64)> {
        (0..duration_ms / 10)
            .map(|i| {
                let ts = i * 10;
                let phase = (ts + rr_ms - 300) % rr_ms;
                let v = match phase {
                    0 => 2800.0,
                    10 => 3500.0,
                    20 => 2800.0,
                    _ => 2000.0,
                };
                (ts, v)
            })
            .collect()
    }

    fn detect_all(detector: &mut PeakDetector, points: &[(u64, f64)]) -> Vec<PeakEvent> {
        points
            .iter()
            .filter_map(|&(ts, v)| detector.observe(v, ts))
            .collect()
    }

    #[test]
    fn adaptive_detector_finds_one_peak_per_beat() {
        let mut detector = PeakDetector::new(DetectorConfig::default());
        let peaks = detect_all(&mut detector, &spike_train(600, 6_000));
        let times: Vec<u64> = peaks.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(times, (0..10).map(|k| 300 + 600 * k).collect::<Vec<_>>());
    }

    #[test]
    fn decaying_detector_follows_peaks() {
        let cfg = DetectorConfig {
            mode: ThresholdMode::Decaying,
            ..DetectorConfig::default()
        };
        let mut detector = PeakDetector::new(cfg);
        // quiet baseline below the floor so relaxation never reaches it
        let points: Vec<(u64, f64)> = spike_train(800, 8_000)
            .into_iter()
            .map(|(ts, v)| (ts, if v == 2000.0 { 500.0 } else { v }))
            .collect();
        let peaks = detect_all(&mut detector, &points);
        assert_eq!(peaks.len(), 10);
        assert!(detector.threshold() >= 1000.0);
        assert!(detector.threshold() <= 3500.0);
    }

    #[test]
    fn decaying_threshold_relaxes_to_floor() {
        let cfg = DetectorConfig {
            mode: ThresholdMode::Decaying,
            ..DetectorConfig::default()
        };
        let mut detector = PeakDetector::new(cfg);
        for i in 0..2_000 {
            detector.observe(0.0, i * 10);
        }
        assert_eq!(detector.threshold(), 1000.0);
    }

    #[test]
    fn never_emits_peaks_closer_than_refractory() {
        for mode in [ThresholdMode::Adaptive, ThresholdMode::Decaying] {
            let mut detector = PeakDetector::new(DetectorConfig {
                mode,
                ..DetectorConfig::default()
            });
            let mut state: u64 = 0x2545_f491_4f6c_dd1d;
            let mut last: Option<u64> = None;
            for i in 0..20_000u64 {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let value = ((state >> 33) % 4096) as f64;
                if let Some(peak) = detector.observe(value, i * 7) {
                    if let Some(prev) = last {
                        assert!(peak.timestamp_ms - prev >= 300, "{prev} -> {}", peak.timestamp_ms);
                    }
                    last = Some(peak.timestamp_ms);
                }
            }
            assert!(last.is_some());
        }
    }

    #[test]
    fn reset_restores_seed_threshold() {
        let mut detector = PeakDetector::new(DetectorConfig::default());
        detect_all(&mut detector, &spike_train(600, 3_000));
        detector.reset();
        assert_eq!(detector.threshold(), 2500.0);
        assert_eq!(detector.last_peak_ms(), None);
    }

    #[test]
    fn local_maxima_requires_strict_neighbours() {
        let idx = find_local_maxima(&[0.0, 5.0, 5.0, 0.0, 3.0, 1.0], 1.0);
        assert_eq!(idx, vec![4]);
    }

    #[test]
    fn tracker_discards_duplicates_across_scans() {
        let mut tracker = LocalMaximaTracker::new(&DetectorConfig::default());
        let train = spike_train(600, 5_000);
        let mut found = Vec::new();
        for end in (1..=train.len()).step_by(5) {
            found.extend(tracker.scan(&train[..end]));
        }
        let times: Vec<u64> = found.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(times, vec![310, 910, 1510, 2110, 2710, 3310, 3910, 4510]);
    }
}
