//! Bounded sample storage for the measurement loop.

use std::collections::VecDeque;

/// A fixed-capacity run of samples. Once full, every new sample pushes the
/// oldest one out.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    data: VecDeque<f64>,
    capacity: usize,
}

impl SampleBuffer {
    /// Room for `capacity` samples, at least one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest sample when full.
    pub fn push(&mut self, sample: f64) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(sample);
    }

    /// Samples held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// No samples held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Most samples held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Newest sample.
    pub fn last(&self) -> Option<f64> {
        self.data.back().copied()
    }

    /// Arithmetic mean, `None` while empty.
    pub fn average(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.iter().sum::<f64>() / self.data.len() as f64)
    }

    /// Oldest sample first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }
}
