use crate::config::RhythmConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regularity {
    Regular,
    SlightlyIrregular,
    Irregular,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateClass {
    Bradycardia,
    Tachycardia,
    NormalSinus,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RhythmResult {
    pub regularity: Regularity,
    pub classification: RateClass,
    /// Coefficient of variation of the RR intervals used.
    pub rr_cv: Option<f64>,
    pub mean_bpm: Option<f64>,
}

impl RhythmResult {
    pub fn insufficient() -> Self {
        Self {
            regularity: Regularity::InsufficientData,
            classification: RateClass::Unknown,
            rr_cv: None,
            mean_bpm: None,
        }
    }
}

impl Default for RhythmResult {
    fn default() -> Self {
        Self::insufficient()
    }
}

/// Population standard deviation over mean.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean == 0.0 {
        return None;
    }
    let sd = (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt();
    Some(sd / mean)
}

/// Classify the newest RR intervals (ms, oldest first). Pure function of its input.
pub fn classify_rhythm(rr_ms: &[f64], cfg: &RhythmConfig) -> RhythmResult {
    let recent = &rr_ms[rr_ms.len().saturating_sub(cfg.max_intervals.max(1))..];
    if recent.len() < cfg.min_intervals.max(1) {
        return RhythmResult::insufficient();
    }
    let Some(cv) = coefficient_of_variation(recent) else {
        return RhythmResult::insufficient();
    };
    let regularity = if cv < cfg.regular_cv {
        Regularity::Regular
    } else if cv <= cfg.irregular_cv {
        Regularity::SlightlyIrregular
    } else {
        Regularity::Irregular
    };
    let mean_rr = recent.iter().sum::<f64>() / recent.len() as f64;
    let bpm = 60_000.0 / mean_rr;
    let classification = if bpm.round() < cfg.bradycardia_bpm {
        RateClass::Bradycardia
    } else if bpm.round() > cfg.tachycardia_bpm {
        RateClass::Tachycardia
    } else {
        RateClass::NormalSinus
    };
    RhythmResult {
        regularity,
        classification,
        rr_cv: Some(cv),
        mean_bpm: Some(bpm),
    }
}
