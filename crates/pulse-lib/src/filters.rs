use crate::{
    config::{AnalysisConfig, FilterConfig},
    error::ConfigError,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Which filter chain to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterProfile {
    /// 3-point moving average, for clean synthetic/demo sources.
    Minimal,
    /// High-pass, low-pass, mains notch and median, in that order.
    #[default]
    MedicalGrade,
}

/// Second-order IIR notch, normalized to unit gain at DC.
#[derive(Debug, Clone, Copy, PartialEq)]
struct NotchCoefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl NotchCoefficients {
    fn new(center_hz: f64, fs: f64, radius: f64) -> Option<Self> {
        let omega = 2.0 * PI * center_hz / fs;
        let cos_omega = omega.cos();
        let zero_dc = 2.0 - 2.0 * cos_omega;
        if zero_dc.abs() < 1e-9 {
            // notch would sit on DC
            return None;
        }
        let pole_dc = 1.0 - 2.0 * radius * cos_omega + radius * radius;
        let gain = pole_dc / zero_dc;
        Some(Self {
            b0: gain,
            b1: -2.0 * cos_omega * gain,
            b2: gain,
            a1: -2.0 * radius * cos_omega,
            a2: radius * radius,
        })
    }
}

/// Multi-stage digital filter. Coefficients are fixed at construction; `filter`
/// is a pure function of its input window.
#[derive(Debug, Clone)]
pub struct SampleFilter {
    profile: FilterProfile,
    highpass_alpha: f64,
    lowpass_alpha: f64,
    notch: Option<NotchCoefficients>,
    median_window: usize,
}

impl SampleFilter {
    pub fn new(cfg: &FilterConfig, fs: f64) -> Result<Self, ConfigError> {
        if !(fs.is_finite() && fs > 0.0) {
            return Err(ConfigError::InvalidSampleRate(fs));
        }
        if !(cfg.highpass_hz > 0.0) {
            return Err(ConfigError::InvalidCutoff {
                name: "high-pass",
                value: cfg.highpass_hz,
            });
        }
        if !(cfg.lowpass_hz > 0.0) {
            return Err(ConfigError::InvalidCutoff {
                name: "low-pass",
                value: cfg.lowpass_hz,
            });
        }
        if cfg.median_window == 0 {
            return Err(ConfigError::EmptyWindow("filter.median_window"));
        }
        let notch = NotchCoefficients::new(cfg.mains_hz, fs, cfg.notch_radius);
        if notch.is_none() {
            debug!(
                "mains {} Hz aliases onto DC at fs {} Hz, notch stage disabled",
                cfg.mains_hz, fs
            );
        }
        Ok(Self {
            profile: cfg.profile,
            highpass_alpha: highpass_alpha(fs, cfg.highpass_hz),
            lowpass_alpha: lowpass_alpha(fs, cfg.lowpass_hz),
            notch,
            median_window: cfg.median_window,
        })
    }

    pub fn from_config(cfg: &AnalysisConfig) -> Result<Self, ConfigError> {
        Self::new(&cfg.filter, cfg.sample_rate_hz)
    }

    pub fn profile(&self) -> FilterProfile {
        self.profile
    }

    /// Filter a window of samples. Output has the same length as the input.
    pub fn filter(&self, samples: &[f64]) -> Vec<f64> {
        match self.profile {
            FilterProfile::Minimal => moving_average3(samples),
            FilterProfile::MedicalGrade => {
                let hp = highpass(samples, self.highpass_alpha);
                let lp = lowpass(&hp, self.lowpass_alpha);
                let notched = match &self.notch {
                    Some(coeffs) => notch(&lp, coeffs),
                    None => lp,
                };
                median(&notched, self.median_window)
            }
        }
    }
}

fn highpass_alpha(fs: f64, cutoff: f64) -> f64 {
    1.0 / (1.0 + 2.0 * PI * cutoff / fs)
}

fn lowpass_alpha(fs: f64, cutoff: f64) -> f64 {
    let w = 2.0 * PI * cutoff / fs;
    w / (1.0 + w)
}

/// `y[i] = a * (y[i-1] + x[i] - x[i-1])`, starting from zero output.
fn highpass(data: &[f64], alpha: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = 0.0;
    let mut prev_x = data[0];
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

/// `y[i] = a * x[i] + (1 - a) * y[i-1]`, seeded with the first sample.
fn lowpass(data: &[f64], alpha: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev = alpha * x + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

fn notch(data: &[f64], c: &NotchCoefficients) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    // steady state for a constant input equal to the first sample
    let (mut x1, mut x2) = (data[0], data[0]);
    let (mut y1, mut y2) = (data[0], data[0]);
    let mut out = Vec::with_capacity(data.len());
    for &x in data {
        let y = c.b0 * x + c.b1 * x1 + c.b2 * x2 - c.a1 * y1 - c.a2 * y2;
        x2 = x1;
        x1 = x;
        y2 = y1;
        y1 = y;
        out.push(y);
    }
    out
}

/// Running median with edge clamping.
fn median(data: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || data.len() < 2 {
        return data.to_vec();
    }
    let half = (window / 2) as isize;
    let last = data.len() as isize - 1;
    let mut scratch = Vec::with_capacity(2 * half as usize + 1);
    (0..data.len() as isize)
        .map(|i| {
            scratch.clear();
            scratch.extend((-half..=half).map(|k| data[(i + k).clamp(0, last) as usize]));
            scratch.sort_by(|a, b| a.total_cmp(b));
            scratch[scratch.len() / 2]
        })
        .collect()
}

/// 3-point moving average; the first and last samples pass through unchanged.
fn moving_average3(data: &[f64]) -> Vec<f64> {
    if data.len() < 3 {
        return data.to_vec();
    }
    let mut out = data.to_vec();
    for i in 1..data.len() - 1 {
        out[i] = (data[i - 1] + data[i] + data[i + 1]) / 3.0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medical(fs: f64) -> SampleFilter {
        SampleFilter::new(&FilterConfig::default(), fs).expect("filter")
    }

    fn rms(data: &[f64]) -> f64 {
        (data.iter().map(|x| x * x).sum::<f64>() / data.len() as f64).sqrt()
    }

    #[test]
    fn preserves_length() {
        let minimal = SampleFilter::new(
            &FilterConfig {
                profile: FilterProfile::Minimal,
                ..FilterConfig::default()
            },
            100.0,
        )
        .expect("filter");
        for n in [1usize, 2, 3, 7, 200] {
            let xs: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin() * 500.0 + 2000.0).collect();
            assert_eq!(medical(100.0).filter(&xs).len(), n);
            assert_eq!(minimal.filter(&xs).len(), n);
        }
        assert!(medical(100.0).filter(&[]).is_empty());
    }

    #[test]
    fn rejects_bad_sample_rate() {
        assert!(matches!(
            SampleFilter::new(&FilterConfig::default(), 0.0),
            Err(ConfigError::InvalidSampleRate(_))
        ));
        assert!(SampleFilter::new(&FilterConfig::default(), -100.0).is_err());
    }

    #[test]
    fn minimal_profile_smooths_interior_only() {
        let out = moving_average3(&[0.0, 3.0, 6.0, 0.0]);
        assert_eq!(out, vec![0.0, 3.0, 3.0, 0.0]);
    }

    #[test]
    fn median_rejects_single_sample_impulse() {
        let out = median(&[1.0, 1.0, 50.0, 1.0, 1.0], 3);
        assert_eq!(out, vec![1.0; 5]);
    }

    #[test]
    fn highpass_removes_constant_offset() {
        let out = medical(100.0).filter(&[2048.0; 300]);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn notch_attenuates_mains() {
        let fs = 1000.0;
        let tone: Vec<f64> = (0..2000)
            .map(|i| (2.0 * PI * 50.0 * i as f64 / fs).sin() * 100.0)
            .collect();
        let coeffs = NotchCoefficients::new(50.0, fs, 0.95).expect("notch");
        let out = notch(&tone, &coeffs);
        assert!(rms(&out[1000..]) < 0.1 * rms(&tone[1000..]));
    }

    #[test]
    fn keeps_spike_position() {
        let mut xs = vec![2000.0; 200];
        xs[99] = 2800.0;
        xs[100] = 3500.0;
        xs[101] = 2800.0;
        let out = medical(100.0).filter(&xs);
        let argmax = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .expect("non-empty");
        // the median stage may flatten the apex by one sample
        assert!((99..=101).contains(&argmax), "apex moved to {argmax}");
    }
}
