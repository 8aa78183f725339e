use crate::consts::DEFAULT_FALSE_POSITIVE_RATE;
use crate::errors::Result;
use crate::filter::BloomFilter;
use serde::{Deserialize, Serialize};

/// Sizing inputs for a new filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub expected_elements: u64,
    #[serde(default = "default_fp_rate")]
    pub false_positive_rate: f64,
}

fn default_fp_rate() -> f64 { DEFAULT_FALSE_POSITIVE_RATE }

impl Default for FilterParams {
    fn default() -> Self {
        Self { expected_elements: 1, false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE }
    }
}

impl FilterParams {
    pub fn new(expected_elements: u64, false_positive_rate: f64) -> Self {
        Self { expected_elements, false_positive_rate }
    }

    pub fn build(&self) -> Result<BloomFilter> {
        BloomFilter::create(self.expected_elements, self.false_positive_rate)
    }
}

/// Reporting snapshot of a filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterInfo {
    pub capacity_bits: usize,
    pub hash_count: u32,
    pub byte_size: usize,
    pub byte_size_human: String,
    pub bits_set: usize,
    /// Accuracy in percent, present when an element count is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl FilterInfo {
    pub fn of(filter: &BloomFilter, elements: Option<u64>) -> Self {
        Self {
            capacity_bits: filter.capacity_bits(),
            hash_count: filter.hash_count(),
            byte_size: filter.byte_size(),
            byte_size_human: filter.byte_size_human(),
            bits_set: filter.bits_set(),
            accuracy: elements.map(|n| filter.estimated_accuracy(n)),
        }
    }
}
