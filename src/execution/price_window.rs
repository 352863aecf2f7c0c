use crate::models::PriceSample;
use std::collections::VecDeque;

/// Fixed-capacity rolling window of samples for the traded symbol
///
/// Oldest samples are evicted first. Only the control loop writes to it.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    samples: VecDeque<PriceSample>,
    max_samples: usize,
}

impl PriceWindow {
    /// Create a new window
    ///
    /// # Arguments
    /// * `max_samples` - Maximum number of samples to keep
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Add a sample, evicting the oldest if the window is full
    pub fn add_sample(&mut self, sample: PriceSample) {
        self.samples.push_back(sample);

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Replace the contents with a freshly fetched batch (oldest first)
    pub fn replace(&mut self, samples: impl IntoIterator<Item = PriceSample>) {
        self.samples.clear();
        for sample in samples {
            self.add_sample(sample);
        }
    }

    /// Contiguous view, oldest first
    pub fn samples(&mut self) -> &[PriceSample] {
        self.samples.make_contiguous()
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.close).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_samples
    }
}
