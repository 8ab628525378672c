use super::{
    boundaries::{derivative, find_p_onset, isoelectric_baseline, windowed_threshold},
    extract::ExtractedBeat,
};
use crate::config::AnalysisConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveShape {
    Normal,
    Biphasic,
    Asymmetric,
    HighAmplitude,
    LowAmplitude,
    Positive,
    Negative,
    Absent,
}

/// Location and character of one wave inside an extracted beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveFeature {
    pub detected: bool,
    /// Deviation from baseline in device units (peak-to-peak for QRS).
    pub amplitude: f64,
    pub amplitude_mv: f64,
    pub duration_ms: Option<f64>,
    pub onset_index: Option<usize>,
    pub peak_index: Option<usize>,
    pub offset_index: Option<usize>,
    pub shape: WaveShape,
}

impl WaveFeature {
    pub fn absent() -> Self {
        Self {
            detected: false,
            amplitude: 0.0,
            amplitude_mv: 0.0,
            duration_ms: None,
            onset_index: None,
            peak_index: None,
            offset_index: None,
            shape: WaveShape::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MorphologyResult {
    /// Isoelectric level the waves were measured against.
    pub baseline: f64,
    pub p_wave: WaveFeature,
    pub qrs_complex: WaveFeature,
    pub t_wave: WaveFeature,
}

pub fn analyze_beat(beat: &ExtractedBeat, cfg: &AnalysisConfig) -> MorphologyResult {
    let values = beat.values();
    let baseline = isoelectric_baseline(beat, &values, &cfg.morphology);
    MorphologyResult {
        baseline,
        p_wave: p_wave(beat, &values, baseline, cfg),
        qrs_complex: qrs_complex(beat, &values, cfg),
        t_wave: t_wave(beat, &values, baseline, cfg),
    }
}

fn p_wave(beat: &ExtractedBeat, values: &[f64], baseline: f64, cfg: &AnalysisConfig) -> WaveFeature {
    let m = &cfg.morphology;
    let deriv = derivative(values);
    let Some(onset) = find_p_onset(beat, values, &deriv, m) else {
        return WaveFeature::absent();
    };
    let Some((_, window_end, threshold)) =
        windowed_threshold(beat, values, m.p_window_ms, m.p_window_ms, m.p_threshold_factor)
    else {
        return WaveFeature::absent();
    };

    let search_end = (onset + cfg.ms_to_samples(m.p_peak_search_ms).max(0) as usize).min(window_end);
    let Some(peak) = (onset..=search_end).max_by(|&a, &b| values[a].total_cmp(&values[b])) else {
        return WaveFeature::absent();
    };
    let amplitude = values[peak] - baseline;
    if amplitude <= threshold {
        return WaveFeature::absent();
    }
    let Some(offset) = (peak + 1..beat.r_peak_index)
        .find(|&i| (values[i] - baseline).abs() <= threshold / 2.0)
    else {
        return WaveFeature::absent();
    };

    let duration = beat.span_ms(onset, offset);
    let (min_dur, max_dur) = m.p_duration_ms;
    let detected = duration >= min_dur && duration <= max_dur;
    let shape = if detected {
        p_shape(values, onset, peak, offset, baseline, cfg)
    } else {
        WaveShape::Absent
    };
    WaveFeature {
        detected,
        amplitude,
        amplitude_mv: cfg.adc.delta_to_mv(amplitude),
        duration_ms: Some(duration),
        onset_index: Some(onset),
        peak_index: Some(peak),
        offset_index: Some(offset),
        shape,
    }
}

fn p_shape(
    values: &[f64],
    onset: usize,
    peak: usize,
    offset: usize,
    baseline: f64,
    cfg: &AnalysisConfig,
) -> WaveShape {
    let m = &cfg.morphology;
    let segment = &values[onset..=offset];
    let mid = segment.len() / 2;
    let dips = |half: &[f64]| half.iter().any(|&v| v < baseline - m.biphasic_dip);
    if dips(&segment[..mid]) || dips(&segment[mid..]) {
        return WaveShape::Biphasic;
    }
    let position = (peak - onset) as f64 / (offset - onset).max(1) as f64;
    let (early, late) = m.asymmetry_bounds;
    if position < early || position > late {
        WaveShape::Asymmetric
    } else {
        WaveShape::Normal
    }
}

fn qrs_complex(beat: &ExtractedBeat, values: &[f64], cfg: &AnalysisConfig) -> WaveFeature {
    let m = &cfg.morphology;
    let Some((s, e)) = beat.window(m.qrs_window_ms.0, m.qrs_window_ms.1) else {
        return WaveFeature::absent();
    };
    let window = &values[s..=e];
    let max = window.iter().copied().fold(f64::MIN, f64::max);
    let min = window.iter().copied().fold(f64::MAX, f64::min);
    let amplitude = max - min;
    let shape = if amplitude > m.qrs_high_amplitude {
        WaveShape::HighAmplitude
    } else if amplitude < m.qrs_low_amplitude {
        WaveShape::LowAmplitude
    } else {
        WaveShape::Normal
    };
    WaveFeature {
        detected: true,
        amplitude,
        amplitude_mv: cfg.adc.delta_to_mv(amplitude),
        duration_ms: None,
        onset_index: None,
        peak_index: Some(beat.r_peak_index),
        offset_index: None,
        shape,
    }
}

fn t_wave(beat: &ExtractedBeat, values: &[f64], baseline: f64, cfg: &AnalysisConfig) -> WaveFeature {
    let m = &cfg.morphology;
    let Some((s, e)) = beat.window(m.t_window_ms.0, m.t_window_ms.1) else {
        return WaveFeature::absent();
    };
    let Some(hi) = (s..=e).max_by(|&a, &b| values[a].total_cmp(&values[b])) else {
        return WaveFeature::absent();
    };
    let Some(lo) = (s..=e).min_by(|&a, &b| values[a].total_cmp(&values[b])) else {
        return WaveFeature::absent();
    };
    let up = values[hi] - baseline;
    let down = values[lo] - baseline;
    let (peak, amplitude, shape) = if up.abs() >= down.abs() {
        (hi, up, WaveShape::Positive)
    } else {
        (lo, down, WaveShape::Negative)
    };
    if amplitude.abs() <= m.t_min_amplitude {
        return WaveFeature::absent();
    }
    WaveFeature {
        detected: true,
        amplitude,
        amplitude_mv: cfg.adc.delta_to_mv(amplitude),
        duration_ms: None,
        onset_index: None,
        peak_index: Some(peak),
        offset_index: None,
        shape,
    }
}
