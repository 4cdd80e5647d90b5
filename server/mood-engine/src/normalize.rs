//! Normalize raw signals against the baseline into z-scores and percentile ranks.

use std::collections::BTreeMap;

use crate::baseline::Baseline;
use crate::types::{NormalizedFeatureSet, SignalSet};

/// For each numeric signal with a baseline distribution, emit `norm.<key>.z` and
/// `norm.<key>.pctl`. Anything else is skipped. The raw set is carried through untouched.
pub fn normalize(signals: SignalSet, baseline: &Baseline) -> NormalizedFeatureSet {
  let mut normalized = BTreeMap::new();

  for (key, signal) in &signals.signals {
    let value = match signal.value.as_f64() {
      Some(v) => v,
      None => continue,
    };
    let dist = match baseline.get(key) {
      Some(d) => d,
      None => continue,
    };
    normalized.insert(NormalizedFeatureSet::z_key(key), dist.z_score(value));
    normalized.insert(NormalizedFeatureSet::pctl_key(key), dist.percentile_rank(value));
  }

  NormalizedFeatureSet {
    raw_signals: signals,
    normalized,
  }
}
