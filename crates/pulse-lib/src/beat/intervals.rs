use super::{
    boundaries::{derivative, find_p_onset, find_qrs_offset, find_qrs_onset, find_t_offset},
    extract::ExtractedBeat,
    morphology::MorphologyResult,
};
use crate::config::{AnalysisConfig, Bounds, IntervalConfig};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntervalKind {
    Pr,
    Qrs,
    Qt,
    Qtc,
}

impl IntervalKind {
    pub const ALL: [IntervalKind; 4] = [
        IntervalKind::Pr,
        IntervalKind::Qrs,
        IntervalKind::Qt,
        IntervalKind::Qtc,
    ];

    /// Physiological plausibility bounds; values outside are discarded.
    pub fn plausible_bounds(self, cfg: &IntervalConfig) -> Option<Bounds> {
        match self {
            IntervalKind::Pr => Some(cfg.pr_bounds_ms),
            IntervalKind::Qrs => Some(cfg.qrs_bounds_ms),
            IntervalKind::Qt => Some(cfg.qt_bounds_ms),
            IntervalKind::Qtc => None,
        }
    }

    pub fn reference_range(self, cfg: &IntervalConfig) -> Bounds {
        match self {
            IntervalKind::Pr => cfg.pr_reference_ms,
            IntervalKind::Qrs => cfg.qrs_reference_ms,
            IntervalKind::Qt => cfg.qt_reference_ms,
            IntervalKind::Qtc => cfg.qtc_reference_ms,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IntervalKind::Pr => "PR",
            IntervalKind::Qrs => "QRS",
            IntervalKind::Qt => "QT",
            IntervalKind::Qtc => "QTc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalStatus {
    Short,
    Normal,
    Prolonged,
}

/// Rate information available for the QTc correction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateInfo {
    /// Most recent measured RR interval (ms).
    pub rr_ms: Option<f64>,
    /// Windowed heart rate, used when no RR is available.
    pub bpm: Option<u32>,
}

/// Interval measurements in milliseconds; each is `None` when not measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalSet {
    pub pr: Option<f64>,
    pub qrs: Option<f64>,
    pub qt: Option<f64>,
    pub qtc: Option<f64>,
    pub rr: Option<f64>,
}

impl IntervalSet {
    pub fn get(&self, kind: IntervalKind) -> Option<f64> {
        match kind {
            IntervalKind::Pr => self.pr,
            IntervalKind::Qrs => self.qrs,
            IntervalKind::Qt => self.qt,
            IntervalKind::Qtc => self.qtc,
        }
    }

    pub fn status(&self, kind: IntervalKind, cfg: &IntervalConfig) -> Option<IntervalStatus> {
        let value = self.get(kind)?;
        let (lo, hi) = kind.reference_range(cfg);
        Some(if value < lo {
            IntervalStatus::Short
        } else if value > hi {
            IntervalStatus::Prolonged
        } else {
            IntervalStatus::Normal
        })
    }

    /// Status of every measured interval.
    pub fn statuses(&self, cfg: &IntervalConfig) -> BTreeMap<IntervalKind, IntervalStatus> {
        IntervalKind::ALL
            .iter()
            .filter_map(|&kind| self.status(kind, cfg).map(|s| (kind, s)))
            .collect()
    }
}

/// Measure PR, QRS, QT and QTc on one beat.
pub fn compute_intervals(
    beat: &ExtractedBeat,
    morphology: &MorphologyResult,
    rate: &RateInfo,
    cfg: &AnalysisConfig,
) -> IntervalSet {
    let ic = &cfg.intervals;
    let values = beat.values();
    let deriv = derivative(&values);
    let baseline = morphology.baseline;

    let p_onset = find_p_onset(beat, &values, &deriv, &cfg.morphology);
    let qrs_onset = find_qrs_onset(beat, &values, &deriv, ic);
    let qrs_offset = find_qrs_offset(beat, &values, baseline, ic);
    let t_offset = find_t_offset(beat, &values, baseline, ic);

    let span = |from: Option<usize>, to: Option<usize>| match (from, to) {
        (Some(a), Some(b)) if b > a => Some(beat.span_ms(a, b)),
        _ => None,
    };
    let pr = plausible(IntervalKind::Pr, span(p_onset, qrs_onset), ic);
    let qrs = plausible(IntervalKind::Qrs, span(qrs_onset, qrs_offset), ic);
    let qt = plausible(IntervalKind::Qt, span(qrs_onset, t_offset), ic);

    let rr = rate
        .rr_ms
        .filter(|&rr| rr >= ic.rr_bounds_ms.0 && rr <= ic.rr_bounds_ms.1);
    let rr_seconds = rr
        .map(|ms| ms / 1000.0)
        .or_else(|| rate.bpm.filter(|&b| b > 0).map(|b| 60.0 / b as f64));
    let qtc = match (qt, rr_seconds) {
        (Some(qt), Some(rr_s)) => Some((qt / rr_s.sqrt()).round()),
        _ => None,
    };

    IntervalSet {
        pr,
        qrs,
        qt,
        qtc,
        rr,
    }
}

fn plausible(kind: IntervalKind, value: Option<f64>, cfg: &IntervalConfig) -> Option<f64> {
    let value = value?;
    match kind.plausible_bounds(cfg) {
        Some((lo, hi)) if value < lo || value > hi => {
            debug!("discarding implausible {} of {} ms", kind.label(), value);
            None
        }
        _ => Some(value),
    }
}
