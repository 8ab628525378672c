//! Per-connection processing state: buffers, detectors, estimators and the
//! periodic beat analysis, driven one sample at a time.

use crate::{
    beat::{
        extract::extract_beat_from_points,
        intervals::{compute_intervals, IntervalKind, IntervalSet, IntervalStatus, RateInfo},
        morphology::{analyze_beat, MorphologyResult},
    },
    clock::{Clock, MonotonicClock},
    config::AnalysisConfig,
    detectors::ecg::{DetectionSource, LocalMaximaTracker, PeakDetector, RhythmPeakSource},
    error::ConfigError,
    filters::SampleFilter,
    metrics::{
        heart_rate::{HeartRateEstimator, HeartRateStats},
        rhythm::{classify_rhythm, RhythmResult},
        sqi::signal_quality,
    },
    signal::{PeakBuffer, PeakEvent, RingBuffer, Sample},
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the session reports for every ingested sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleOutput {
    pub timestamp_ms: u64,
    pub raw_value: i32,
    pub filtered_value: f64,
    pub bpm: Option<u32>,
    pub bpm_held: bool,
    pub signal_quality: u8,
    pub peak_detected: bool,
}

/// Result of one periodic beat analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatAnalysis {
    pub timestamp_ms: u64,
    pub intervals: IntervalSet,
    pub interval_status: BTreeMap<IntervalKind, IntervalStatus>,
    pub morphology: MorphologyResult,
    pub rhythm: RhythmResult,
}

/// Fires every `interval_ms` of sample time, counted from the first poll.
#[derive(Debug, Clone, Copy)]
struct AnalysisTimer {
    interval_ms: u64,
    next_due_ms: Option<u64>,
}

impl AnalysisTimer {
    fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            next_due_ms: None,
        }
    }

    fn poll(&mut self, now_ms: u64) -> bool {
        match self.next_due_ms {
            None => {
                self.next_due_ms = Some(now_ms.saturating_add(self.interval_ms));
                false
            }
            Some(due) if now_ms >= due => {
                self.next_due_ms = Some(now_ms.saturating_add(self.interval_ms));
                true
            }
            Some(_) => false,
        }
    }

    fn reset(&mut self) {
        self.next_due_ms = None;
    }
}

/// One live ECG stream.
///
/// All mutation goes through `&mut self`, so analysis can never observe a
/// half-updated buffer. Dropping the session drops its analysis schedule.
pub struct EcgSession<C: Clock = MonotonicClock> {
    cfg: AnalysisConfig,
    clock: C,
    filter: SampleFilter,
    detector: PeakDetector,
    local_maxima: LocalMaximaTracker,
    heart_rate: HeartRateEstimator,
    display: RingBuffer<Sample>,
    analysis: RingBuffer<Sample>,
    peaks: PeakBuffer,
    rhythm_peaks: PeakBuffer,
    rhythm: RhythmResult,
    quality: u8,
    first_sample_ms: Option<u64>,
    last_sample_ms: Option<u64>,
    timer: AnalysisTimer,
}

impl EcgSession<MonotonicClock> {
    pub fn with_config(cfg: AnalysisConfig) -> Result<Self, ConfigError> {
        Self::new(cfg, MonotonicClock::new())
    }
}

impl<C: Clock> EcgSession<C> {
    pub fn new(cfg: AnalysisConfig, clock: C) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let filter = SampleFilter::from_config(&cfg)?;
        let peak_window = cfg.heart_rate.window_ms;
        let refractory = cfg.detector.refractory_ms;
        info!(
            "ECG session at {} Hz, {:?} filtering, {:?} detection",
            cfg.sample_rate_hz, cfg.filter.profile, cfg.detector.mode
        );
        Ok(Self {
            detector: PeakDetector::new(cfg.detector),
            local_maxima: LocalMaximaTracker::new(&cfg.detector),
            heart_rate: HeartRateEstimator::new(cfg.heart_rate),
            display: RingBuffer::with_capacity(cfg.buffers.display_len),
            analysis: RingBuffer::with_capacity(cfg.buffers.analysis_len),
            peaks: PeakBuffer::new(peak_window, refractory),
            rhythm_peaks: PeakBuffer::new(peak_window, refractory),
            rhythm: RhythmResult::insufficient(),
            quality: 0,
            first_sample_ms: None,
            last_sample_ms: None,
            timer: AnalysisTimer::new(cfg.session.analysis_interval_ms),
            filter,
            clock,
            cfg,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.cfg
    }

    /// Ingest a bare value stamped with the session clock.
    pub fn push_value(&mut self, value: i32) -> SampleOutput {
        let now = self.clock.now_ms();
        self.push_sample(Sample::new(value, now))
    }

    pub fn push_sample(&mut self, sample: Sample) -> SampleOutput {
        let sample = match self.last_sample_ms {
            Some(last) if sample.timestamp_ms < last => {
                debug!(
                    "timestamp {} went backwards, clamping to {}",
                    sample.timestamp_ms, last
                );
                Sample::new(sample.value, last)
            }
            _ => sample,
        };
        let now = sample.timestamp_ms;
        self.first_sample_ms.get_or_insert(now);
        self.last_sample_ms = Some(now);

        self.display.push(sample);
        self.analysis.push(sample);

        let raw: Vec<f64> = self.display.iter().map(|s| s.value as f64).collect();
        let filtered = self.filter.filter(&raw);
        let filtered_value = filtered.last().copied().unwrap_or(sample.value as f64);

        let source_value = match self.cfg.detector.source {
            DetectionSource::Raw => sample.value as f64,
            DetectionSource::Filtered => filtered_value,
        };
        let peak_detected = match self.detector.observe(source_value, now) {
            Some(peak) => self.accept_peak(peak),
            None => false,
        };

        if self.cfg.detector.rhythm_peaks == RhythmPeakSource::LocalMaxima {
            let source = match self.cfg.detector.source {
                DetectionSource::Raw => &raw,
                DetectionSource::Filtered => &filtered,
            };
            let points: Vec<(u64, f64)> = self
                .display
                .iter()
                .zip(source)
                .map(|(s, &v)| (s.timestamp_ms, v))
                .collect();
            let found = self.local_maxima.scan(&points);
            let mut changed = false;
            for peak in found {
                changed |= self.rhythm_peaks.push(peak);
            }
            if changed {
                self.rhythm = classify_rhythm(&self.rhythm_peaks.rr_intervals_ms(), &self.cfg.rhythm);
            }
        }

        self.peaks.expire(now);
        self.rhythm_peaks.expire(now);
        if self.heart_rate.is_due(now) {
            let bpm = self.heart_rate.recompute(&self.peaks.peaks(), now);
            debug!("windowed bpm at {now} ms: {bpm:?}");
        }
        let displayed = self.heart_rate.displayed(now);
        self.quality = signal_quality(&raw, &self.cfg.quality);

        SampleOutput {
            timestamp_ms: now,
            raw_value: sample.value,
            filtered_value,
            bpm: displayed.bpm,
            bpm_held: displayed.held,
            signal_quality: self.quality,
            peak_detected,
        }
    }

    fn accept_peak(&mut self, peak: PeakEvent) -> bool {
        if !self.peaks.push(peak) {
            debug!("peak at {} ms refused by buffer", peak.timestamp_ms);
            return false;
        }
        if let Some(bpm) = self.heart_rate.on_peak(&peak) {
            debug!("instantaneous bpm {bpm}");
        }
        if self.cfg.detector.rhythm_peaks == RhythmPeakSource::Streaming {
            self.rhythm = classify_rhythm(&self.peaks.rr_intervals_ms(), &self.cfg.rhythm);
        }
        true
    }

    /// True once per analysis interval of sample time.
    pub fn due_for_analysis(&mut self) -> bool {
        match self.last_sample_ms {
            Some(now) => self.timer.poll(now),
            None => false,
        }
    }

    /// Analyse the most prominent beat of the analysis buffer.
    ///
    /// Returns `None` while the stream is too young, too noisy, or too short
    /// to hold a beat.
    pub fn analyze(&self) -> Option<BeatAnalysis> {
        let (first, now) = (self.first_sample_ms?, self.last_sample_ms?);
        let connected = now - first;
        if connected < self.cfg.session.min_connected_ms {
            debug!("skipping analysis: connected for {connected} ms");
            return None;
        }
        if self.quality < self.cfg.session.min_quality {
            debug!("skipping analysis: signal quality {}", self.quality);
            return None;
        }

        let samples = self.analysis.snapshot();
        let raw: Vec<f64> = samples.iter().map(|s| s.value as f64).collect();
        let values = if self.cfg.session.filter_before_analysis {
            self.filter.filter(&raw)
        } else {
            raw
        };
        let points: Vec<(u64, f64)> = samples
            .iter()
            .zip(values)
            .map(|(s, v)| (s.timestamp_ms, v))
            .collect();
        let Some(beat) = extract_beat_from_points(&points, &self.cfg) else {
            debug!("skipping analysis: {} samples buffered", points.len());
            return None;
        };

        let morphology = analyze_beat(&beat, &self.cfg);
        let rate = RateInfo {
            rr_ms: self.peaks.last_rr_ms(),
            bpm: self.heart_rate.displayed(now).bpm,
        };
        let intervals = compute_intervals(&beat, &morphology, &rate, &self.cfg);
        let interval_status = intervals.statuses(&self.cfg.intervals);
        info!(
            "beat analysis: PR {:?} QRS {:?} QT {:?} QTc {:?}, {:?}",
            intervals.pr, intervals.qrs, intervals.qt, intervals.qtc, self.rhythm.regularity
        );
        Some(BeatAnalysis {
            timestamp_ms: now,
            intervals,
            interval_status,
            morphology,
            rhythm: self.rhythm,
        })
    }

    pub fn rhythm(&self) -> RhythmResult {
        self.rhythm
    }

    pub fn signal_quality(&self) -> u8 {
        self.quality
    }

    pub fn heart_rate_stats(&self) -> HeartRateStats {
        self.heart_rate.stats()
    }

    pub fn heart_rate(&self) -> &HeartRateEstimator {
        &self.heart_rate
    }

    /// Peaks inside the trailing heart-rate window.
    pub fn peaks(&self) -> Vec<PeakEvent> {
        self.peaks.peaks()
    }

    /// Raw samples currently on display, oldest first.
    pub fn display_samples(&self) -> Vec<Sample> {
        self.display.snapshot()
    }

    /// Forget everything learned from the stream; configuration is kept.
    pub fn reset(&mut self) {
        info!("resetting ECG session");
        self.detector.reset();
        self.local_maxima.reset();
        self.heart_rate.reset();
        self.display.clear();
        self.analysis.clear();
        self.peaks.clear();
        self.rhythm_peaks.clear();
        self.rhythm = RhythmResult::insufficient();
        self.quality = 0;
        self.first_sample_ms = None;
        self.last_sample_ms = None;
        self.timer.reset();
    }
}
