//! Per-signal historical distributions: mean, sample stddev, z-score, percentile rank.

use serde::{Deserialize, Serialize};

use crate::types::round_to;

/// Distribution of one numeric signal over the baseline windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
  pub mean: f64,
  pub stddev: f64,
  /// Ascending.
  pub sorted_values: Vec<f64>,
}

impl Distribution {
  /// Mean and sample standard deviation (n-1), both rounded to 6 decimals.
  /// Stddev is 0 for fewer than two values.
  pub fn from_values(values: &[f64]) -> Self {
    if values.is_empty() {
      return Self {
        mean: 0.0,
        stddev: 0.0,
        sorted_values: Vec::new(),
      };
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let stddev = if values.len() > 1 {
      let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
      (sum_sq / (n - 1.0)).sqrt()
    } else {
      0.0
    };

    let mut sorted_values = values.to_vec();
    sorted_values.sort_by(|a, b| a.total_cmp(b));

    Self {
      mean: round_to(mean, 6),
      stddev: round_to(stddev, 6),
      sorted_values,
    }
  }

  /// `(value - mean) / stddev`, rounded to 4 decimals. A flat history yields 0.
  pub fn z_score(&self, value: f64) -> f64 {
    if self.stddev == 0.0 {
      return 0.0;
    }
    round_to((value - self.mean) / self.stddev, 4)
  }

  /// Share of baseline values `<= value`, as 0..=100 rounded to 2 decimals.
  /// An empty distribution is neutral (50).
  pub fn percentile_rank(&self, value: f64) -> f64 {
    if self.sorted_values.is_empty() {
      return 50.0;
    }
    let below_or_equal = self.sorted_values.partition_point(|v| *v <= value);
    round_to(below_or_equal as f64 / self.sorted_values.len() as f64 * 100.0, 2)
  }

  pub fn len(&self) -> usize {
    self.sorted_values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sorted_values.is_empty()
  }
}
