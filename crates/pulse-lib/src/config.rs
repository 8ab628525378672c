//! Every tunable of the pipeline lives here, grouped by purpose.

use crate::{
    detectors::ecg::{DetectionSource, RhythmPeakSource, ThresholdMode},
    error::ConfigError,
    filters::FilterProfile,
    signal::AdcScale,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `(min, max)` pair; meaning of inclusivity is documented where used.
pub type Bounds = (f64, f64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Nominal sampling frequency of the device stream (Hz).
    pub sample_rate_hz: f64,
    pub filter: FilterConfig,
    pub adc: AdcScale,
    pub detector: DetectorConfig,
    pub heart_rate: HeartRateConfig,
    pub quality: QualityConfig,
    pub buffers: BufferConfig,
    pub beat: BeatConfig,
    pub morphology: MorphologyConfig,
    pub intervals: IntervalConfig,
    pub rhythm: RhythmConfig,
    pub session: SessionConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100.0,
            filter: FilterConfig::default(),
            adc: AdcScale::default(),
            detector: DetectorConfig::default(),
            heart_rate: HeartRateConfig::default(),
            quality: QualityConfig::default(),
            buffers: BufferConfig::default(),
            beat: BeatConfig::default(),
            morphology: MorphologyConfig::default(),
            intervals: IntervalConfig::default(),
            rhythm: RhythmConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub profile: FilterProfile,
    /// Baseline-wander high-pass cutoff (Hz).
    pub highpass_hz: f64,
    /// Noise low-pass cutoff (Hz).
    pub lowpass_hz: f64,
    /// Mains frequency to notch out (50 or 60 Hz).
    pub mains_hz: f64,
    /// Pole radius of the notch; zeros sit on the unit circle.
    pub notch_radius: f64,
    /// Median window length (odd).
    pub median_window: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            profile: FilterProfile::MedicalGrade,
            highpass_hz: 0.5,
            lowpass_hz: 40.0,
            mains_hz: 50.0,
            notch_radius: 0.95,
            median_window: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub source: DetectionSource,
    pub mode: ThresholdMode,
    /// Seed threshold before the adaptive statistics warm up.
    pub initial_threshold: f64,
    /// Rolling statistics window (samples).
    pub window_len: usize,
    /// The adaptive threshold is only recomputed with more than this many samples.
    pub min_window: usize,
    pub sigma_scale: f64,
    pub refractory_ms: u64,
    /// Per-sample relaxation factor of the decaying threshold.
    pub decay: f64,
    pub threshold_floor: f64,
    pub threshold_ceiling: f64,
    /// Fraction of an accepted peak that becomes the next decaying threshold.
    pub peak_fraction: f64,
    /// Which detector feeds the rhythm buffer.
    pub rhythm_peaks: RhythmPeakSource,
    /// Trailing window scanned by the local-maximum detector.
    pub local_window_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            source: DetectionSource::Raw,
            mode: ThresholdMode::Adaptive,
            initial_threshold: 2500.0,
            window_len: 50,
            min_window: 10,
            sigma_scale: 1.5,
            refractory_ms: 300,
            decay: 0.995,
            threshold_floor: 1000.0,
            threshold_ceiling: 3500.0,
            peak_fraction: 0.85,
            rhythm_peaks: RhythmPeakSource::Streaming,
            local_window_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRateConfig {
    /// Accepted instantaneous BPM, inclusive.
    pub instant_bpm_bounds: Bounds,
    /// Accepted peak spacing for an instantaneous estimate, exclusive (ms).
    pub instant_interval_bounds_ms: Bounds,
    /// Trailing window of the median estimate (ms); also the peak buffer span.
    pub window_ms: u64,
    /// Intervals outside this open range are dropped before the median (ms).
    pub interval_bounds_ms: Bounds,
    /// Final clamp of the windowed estimate.
    pub bpm_clamp: Bounds,
    pub history_len: usize,
    /// Minimum sample time between windowed recomputations (ms).
    pub update_interval_ms: u64,
    /// After this long without a fresh value the displayed BPM is flagged as held (ms).
    pub hold_after_ms: u64,
}

impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            instant_bpm_bounds: (40.0, 200.0),
            instant_interval_bounds_ms: (300.0, 2000.0),
            window_ms: 10_000,
            interval_bounds_ms: (333.0, 1500.0),
            bpm_clamp: (40.0, 180.0),
            history_len: 100,
            update_interval_ms: 1000,
            hold_after_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_samples: usize,
    pub window: usize,
    /// Variance units per quality point.
    pub variance_scale: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            window: 20,
            variance_scale: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Short display/detection buffer (samples).
    pub display_len: usize,
    /// Long analysis buffer used for beat extraction (samples).
    pub analysis_len: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            display_len: 200,
            analysis_len: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Minimum analysis buffer length before a beat is extracted (samples).
    pub min_buffer_len: usize,
    /// Extent of the extracted window before the R peak (ms).
    pub radius_ms: f64,
    /// Extent after the R peak (ms); reaches into the TP segment.
    pub post_ms: f64,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            min_buffer_len: 200,
            radius_ms: 400.0,
            post_ms: 600.0,
        }
    }
}

/// Windows are in milliseconds relative to the R peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologyConfig {
    /// TP segment used for the isoelectric baseline.
    pub tp_segment_ms: Bounds,
    /// Fewer samples than this in the TP segment falls back to the beat median.
    pub min_tp_samples: usize,
    pub p_window_ms: Bounds,
    pub p_threshold_factor: f64,
    /// Maximum distance from P onset to its peak (ms).
    pub p_peak_search_ms: f64,
    /// Accepted P duration, inclusive (ms).
    pub p_duration_ms: Bounds,
    /// Dip below baseline (device units) that marks a biphasic P wave.
    pub biphasic_dip: f64,
    /// Relative peak position outside this range marks an asymmetric P wave.
    pub asymmetry_bounds: Bounds,
    pub qrs_window_ms: Bounds,
    pub qrs_high_amplitude: f64,
    pub qrs_low_amplitude: f64,
    pub t_window_ms: Bounds,
    /// |T amplitude| at or below this is not a T wave (device units).
    pub t_min_amplitude: f64,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            tp_segment_ms: (400.0, 600.0),
            min_tp_samples: 3,
            p_window_ms: (-300.0, -80.0),
            p_threshold_factor: 0.3,
            p_peak_search_ms: 120.0,
            p_duration_ms: (60.0, 120.0),
            biphasic_dip: 20.0,
            asymmetry_bounds: (0.3, 0.7),
            qrs_window_ms: (-50.0, 50.0),
            qrs_high_amplitude: 1500.0,
            qrs_low_amplitude: 500.0,
            t_window_ms: (100.0, 300.0),
            t_min_amplitude: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub qrs_onset_window_ms: Bounds,
    pub qrs_offset_window_ms: Bounds,
    /// Region whose spread sets the QRS boundary threshold.
    pub qrs_region_ms: Bounds,
    pub qrs_threshold_factor: f64,
    pub t_peak_window_ms: Bounds,
    /// Region whose spread sets the T offset threshold.
    pub t_region_ms: Bounds,
    pub t_threshold_factor: f64,
    /// Plausibility bounds, inclusive (ms).
    pub pr_bounds_ms: Bounds,
    pub qrs_bounds_ms: Bounds,
    pub qt_bounds_ms: Bounds,
    /// RR intervals outside this range are not used for QTc (ms).
    pub rr_bounds_ms: Bounds,
    /// Reference ranges for the Short / Normal / Prolonged labels (ms).
    pub pr_reference_ms: Bounds,
    pub qrs_reference_ms: Bounds,
    pub qt_reference_ms: Bounds,
    pub qtc_reference_ms: Bounds,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            qrs_onset_window_ms: (-80.0, -20.0),
            qrs_offset_window_ms: (20.0, 80.0),
            qrs_region_ms: (-80.0, 80.0),
            qrs_threshold_factor: 0.2,
            t_peak_window_ms: (150.0, 400.0),
            t_region_ms: (100.0, 400.0),
            t_threshold_factor: 0.2,
            pr_bounds_ms: (80.0, 300.0),
            qrs_bounds_ms: (40.0, 200.0),
            qt_bounds_ms: (250.0, 600.0),
            rr_bounds_ms: (300.0, 2000.0),
            pr_reference_ms: (120.0, 200.0),
            qrs_reference_ms: (60.0, 120.0),
            qt_reference_ms: (300.0, 450.0),
            qtc_reference_ms: (350.0, 450.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    /// Fewer RR intervals than this is `InsufficientData`; 2 intervals span 3 beats.
    pub min_intervals: usize,
    /// Only the newest intervals are considered.
    pub max_intervals: usize,
    /// Coefficient of variation below this is regular.
    pub regular_cv: f64,
    /// Coefficient of variation above this is irregular.
    pub irregular_cv: f64,
    pub bradycardia_bpm: f64,
    pub tachycardia_bpm: f64,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            min_intervals: 2,
            max_intervals: 10,
            regular_cv: 0.10,
            irregular_cv: 0.20,
            bradycardia_bpm: 60.0,
            tachycardia_bpm: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cadence of the periodic beat analysis (ms of sample time).
    pub analysis_interval_ms: u64,
    /// Beat analysis is skipped until the stream has run this long (ms).
    pub min_connected_ms: u64,
    /// Beat analysis is skipped below this signal quality.
    pub min_quality: u8,
    /// Run the filter chain over the analysis snapshot before extraction.
    pub filter_before_analysis: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            analysis_interval_ms: 10_000,
            min_connected_ms: 2_000,
            min_quality: 0,
            filter_before_analysis: true,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: AnalysisConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn sample_period_ms(&self) -> f64 {
        1000.0 / self.sample_rate_hz
    }

    /// Convert a duration (ms) to a signed sample offset at the configured rate.
    pub fn ms_to_samples(&self, ms: f64) -> isize {
        (ms / self.sample_period_ms()).round() as isize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fs = self.sample_rate_hz;
        if !(fs.is_finite() && fs > 0.0) {
            return Err(ConfigError::InvalidSampleRate(fs));
        }
        let nyquist = fs / 2.0;
        for (name, value) in [
            ("high-pass", self.filter.highpass_hz),
            ("low-pass", self.filter.lowpass_hz),
        ] {
            if !(value > 0.0 && value < nyquist) {
                return Err(ConfigError::InvalidCutoff { name, value });
            }
        }
        if !(self.filter.mains_hz > 0.0) {
            return Err(ConfigError::InvalidCutoff {
                name: "mains",
                value: self.filter.mains_hz,
            });
        }
        if !(self.filter.notch_radius > 0.0 && self.filter.notch_radius < 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "notch_radius",
                range: "(0, 1)",
                value: self.filter.notch_radius,
            });
        }
        for (name, len) in [
            ("filter.median_window", self.filter.median_window),
            ("detector.window_len", self.detector.window_len),
            ("heart_rate.history_len", self.heart_rate.history_len),
            ("quality.window", self.quality.window),
            ("buffers.display_len", self.buffers.display_len),
            ("buffers.analysis_len", self.buffers.analysis_len),
        ] {
            if len == 0 {
                return Err(ConfigError::EmptyWindow(name));
            }
        }
        for (name, value) in [
            ("beat.radius_ms", self.beat.radius_ms),
            ("beat.post_ms", self.beat.post_ms),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::OutOfRange {
                    name,
                    range: "> 0",
                    value,
                });
            }
        }
        let bounds = [
            ("heart_rate.instant_bpm_bounds", self.heart_rate.instant_bpm_bounds),
            (
                "heart_rate.instant_interval_bounds_ms",
                self.heart_rate.instant_interval_bounds_ms,
            ),
            ("heart_rate.interval_bounds_ms", self.heart_rate.interval_bounds_ms),
            ("heart_rate.bpm_clamp", self.heart_rate.bpm_clamp),
            ("morphology.tp_segment_ms", self.morphology.tp_segment_ms),
            ("morphology.p_window_ms", self.morphology.p_window_ms),
            ("morphology.p_duration_ms", self.morphology.p_duration_ms),
            ("morphology.asymmetry_bounds", self.morphology.asymmetry_bounds),
            ("morphology.qrs_window_ms", self.morphology.qrs_window_ms),
            ("morphology.t_window_ms", self.morphology.t_window_ms),
            ("intervals.qrs_onset_window_ms", self.intervals.qrs_onset_window_ms),
            ("intervals.qrs_offset_window_ms", self.intervals.qrs_offset_window_ms),
            ("intervals.qrs_region_ms", self.intervals.qrs_region_ms),
            ("intervals.t_peak_window_ms", self.intervals.t_peak_window_ms),
            ("intervals.t_region_ms", self.intervals.t_region_ms),
            ("intervals.pr_bounds_ms", self.intervals.pr_bounds_ms),
            ("intervals.qrs_bounds_ms", self.intervals.qrs_bounds_ms),
            ("intervals.qt_bounds_ms", self.intervals.qt_bounds_ms),
            ("intervals.rr_bounds_ms", self.intervals.rr_bounds_ms),
            ("intervals.pr_reference_ms", self.intervals.pr_reference_ms),
            ("intervals.qrs_reference_ms", self.intervals.qrs_reference_ms),
            ("intervals.qt_reference_ms", self.intervals.qt_reference_ms),
            ("intervals.qtc_reference_ms", self.intervals.qtc_reference_ms),
        ];
        for (name, (min, max)) in bounds {
            if min > max {
                return Err(ConfigError::InvertedBounds { name, min, max });
            }
        }
        if self.rhythm.regular_cv > self.rhythm.irregular_cv {
            return Err(ConfigError::InvertedBounds {
                name: "rhythm cv thresholds",
                min: self.rhythm.regular_cv,
                max: self.rhythm.irregular_cv,
            });
        }
        if self.rhythm.bradycardia_bpm > self.rhythm.tachycardia_bpm {
            return Err(ConfigError::InvertedBounds {
                name: "rhythm rate thresholds",
                min: self.rhythm.bradycardia_bpm,
                max: self.rhythm.tachycardia_bpm,
            });
        }
        Ok(())
    }
}
