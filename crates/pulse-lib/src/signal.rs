use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One raw ADC reading as delivered by the ingestion side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Raw ADC code (device range, e.g. 0..=4095)
    pub value: i32,
    /// Monotonic milliseconds
    pub timestamp_ms: u64,
}

impl Sample {
    pub fn new(value: i32, timestamp_ms: u64) -> Self {
        Self {
            value,
            timestamp_ms,
        }
    }
}

/// Accepted R-peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakEvent {
    pub timestamp_ms: u64,
    pub amplitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub bpm: u32,
    pub timestamp_ms: u64,
}

/// Fixed-capacity FIFO. Pushing onto a full buffer silently drops the oldest entry.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, returning the evicted entry if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + Clone {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Ordered copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// The newest `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }
}

/// Rolling buffer of peaks covering a trailing time window.
///
/// Peaks are kept strictly increasing in time and at least `refractory_ms` apart;
/// anything violating that is refused on insert.
#[derive(Debug, Clone)]
pub struct PeakBuffer {
    peaks: VecDeque<PeakEvent>,
    window_ms: u64,
    refractory_ms: u64,
}

impl PeakBuffer {
    pub fn new(window_ms: u64, refractory_ms: u64) -> Self {
        Self {
            peaks: VecDeque::new(),
            window_ms,
            refractory_ms,
        }
    }

    /// Insert a peak. Returns `false` if it would break ordering or the refractory gap.
    pub fn push(&mut self, peak: PeakEvent) -> bool {
        if let Some(last) = self.peaks.back() {
            if peak.timestamp_ms <= last.timestamp_ms
                || peak.timestamp_ms - last.timestamp_ms < self.refractory_ms
            {
                return false;
            }
        }
        self.peaks.push_back(peak);
        self.evict_before(peak.timestamp_ms.saturating_sub(self.window_ms));
        true
    }

    /// Drop peaks that fell out of the window ending at `now_ms`.
    pub fn expire(&mut self, now_ms: u64) {
        self.evict_before(now_ms.saturating_sub(self.window_ms));
    }

    fn evict_before(&mut self, cutoff_ms: u64) {
        while let Some(front) = self.peaks.front() {
            if front.timestamp_ms < cutoff_ms {
                self.peaks.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn last(&self) -> Option<&PeakEvent> {
        self.peaks.back()
    }

    pub fn peaks(&self) -> Vec<PeakEvent> {
        self.peaks.iter().copied().collect()
    }

    /// Consecutive peak-to-peak intervals in milliseconds, oldest first.
    pub fn rr_intervals_ms(&self) -> Vec<f64> {
        self.peaks
            .iter()
            .zip(self.peaks.iter().skip(1))
            .map(|(a, b)| (b.timestamp_ms - a.timestamp_ms) as f64)
            .collect()
    }

    pub fn last_rr_ms(&self) -> Option<f64> {
        let n = self.peaks.len();
        if n < 2 {
            return None;
        }
        Some((self.peaks[n - 1].timestamp_ms - self.peaks[n - 2].timestamp_ms) as f64)
    }

    pub fn clear(&mut self) {
        self.peaks.clear();
    }
}

/// ADC code to millivolt conversion: `mV = ((value / max_code) * vref - vref / 2) * gain`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcScale {
    pub max_code: f64,
    /// Reference voltage in millivolts
    pub vref_mv: f64,
    pub gain: f64,
}

impl Default for AdcScale {
    fn default() -> Self {
        Self {
            max_code: 4095.0,
            vref_mv: 3300.0,
            gain: 1.0,
        }
    }
}

impl AdcScale {
    /// Absolute reading in mV, rounded to two decimals.
    pub fn to_mv(&self, value: f64) -> f64 {
        round2(((value / self.max_code) * self.vref_mv - self.vref_mv / 2.0) * self.gain)
    }

    /// Amplitude (difference of two codes) in mV; the mid-rail offset cancels.
    pub fn delta_to_mv(&self, delta: f64) -> f64 {
        round2((delta / self.max_code) * self.vref_mv * self.gain)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
