//! Historical baseline: per-signal distributions over trailing daily windows.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::repo::RepoReader;
use crate::signals::{ProviderContext, ProviderRegistry};
use crate::stats::Distribution;
use crate::window;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
  pub distributions: BTreeMap<String, Distribution>,
  pub window_count: usize,
}

impl Baseline {
  pub fn get(&self, signal_key: &str) -> Option<&Distribution> {
    self.distributions.get(signal_key)
  }

  pub fn has(&self, signal_key: &str) -> bool {
    self.distributions.contains_key(signal_key)
  }
}

/// Runs the live provider pipeline over past windows and accumulates numeric values.
pub struct BaselineBuilder<'a> {
  reader: &'a dyn RepoReader,
  registry: &'a ProviderRegistry,
}

impl<'a> BaselineBuilder<'a> {
  pub fn new(reader: &'a dyn RepoReader, registry: &'a ProviderRegistry) -> Self {
    Self { reader, registry }
  }

  /// Baseline over the `days` daily windows ending at the midnight on or before `anchor`.
  ///
  /// The baseline follows the whole repository: no author or branch filter applies. A window
  /// whose history cannot be read is left out rather than counted as a quiet day.
  pub fn build(
    &self,
    repo_path: &Path,
    anchor: DateTime<FixedOffset>,
    days: u32,
    ctx: &ProviderContext<'_>,
  ) -> Baseline {
    let windows = window::trailing_windows(anchor, days);
    let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut read = 0usize;

    for w in &windows {
      let snapshot = match self.reader.build_snapshot(repo_path, w, None, None) {
        Ok(s) => s,
        Err(e) => {
          warn!(window = %w.label, error = %e, "baseline window unreadable, skipping");
          continue;
        }
      };
      read += 1;

      let collected = self.registry.collect(&snapshot, ctx);
      for (key, signal) in collected.signals.signals {
        if let Some(v) = signal.value.as_f64() {
          values.entry(key).or_default().push(v);
        }
      }
    }

    let distributions: BTreeMap<String, Distribution> = values
      .into_iter()
      .map(|(key, vals)| (key, Distribution::from_values(&vals)))
      .collect();

    debug!(signals = distributions.len(), "baseline distributions computed");
    info!(days, windows = read, skipped = windows.len() - read, "baseline built");

    Baseline {
      distributions,
      window_count: read,
    }
  }
}
