//! Bounded RSSI history.

use std::collections::VecDeque;

use radiolink_core::{RssiSample, RssiStats, SignalQuality};

/// Number of samples kept by [`RssiHistory::new`].
pub const HISTORY_CAPACITY: usize = 100;

/// Classify a reading in dBm. Shorthand for [`SignalQuality::from_dbm`].
pub fn classify(dbm: i16) -> SignalQuality {
    SignalQuality::from_dbm(dbm)
}

/// FIFO of the most recent samples, oldest first.
///
/// Owned and mutated by the monitor loop only. Everyone else reads a
/// [`HistorySnapshot`].
#[derive(Debug, Clone)]
pub struct RssiHistory {
    samples: VecDeque<RssiSample>,
    capacity: usize,
}

impl Default for RssiHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl RssiHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// A history holding at most `capacity` samples (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RssiHistory {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one first when full.
    pub fn push(&mut self, sample: RssiSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&RssiSample> {
        self.samples.back()
    }

    /// Samples in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &RssiSample> {
        self.samples.iter()
    }

    /// Count, mean, min and max over the retained samples; `None` when empty.
    pub fn stats(&self) -> Option<RssiStats> {
        let first = self.samples.front()?;
        let mut sum: i64 = 0;
        let mut min = first.dbm;
        let mut max = first.dbm;
        for s in &self.samples {
            sum += i64::from(s.dbm);
            min = min.min(s.dbm);
            max = max.max(s.dbm);
        }
        let count = self.samples.len();
        Some(RssiStats {
            count,
            avg: sum as f64 / count as f64,
            min,
            max,
        })
    }

    /// An owned copy for publishing to observers.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            samples: self.samples.iter().copied().collect(),
            stats: self.stats(),
        }
    }
}

/// Immutable view of the history at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    /// Samples in arrival order, oldest first.
    pub samples: Vec<RssiSample>,
    pub stats: Option<RssiStats>,
}
