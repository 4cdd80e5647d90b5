//! Size and spread of the window's changes.

use std::collections::HashSet;
use std::path::Path;

use crate::error::EngineError;
use crate::signals::{ProviderContext, SignalProvider};
use crate::types::{round_to, RepoSnapshot, Signal, SignalSet};

pub struct ChangeShapeProvider;

impl SignalProvider for ChangeShapeProvider {
  fn id(&self) -> &str {
    "change_shape"
  }

  fn provide(
    &self,
    snapshot: &RepoSnapshot,
    _ctx: &ProviderContext<'_>,
  ) -> Result<SignalSet, EngineError> {
    let commits = snapshot.commits_count;
    let churn_per_commit = if commits > 0 {
      round_to(snapshot.churn as f64 / commits as f64, 2)
    } else {
      0.0
    };

    Ok(
      SignalSet::new(snapshot.window.label.clone())
        .with(Signal::numeric("change.added", snapshot.added as f64, "Total lines added"))
        .with(Signal::numeric("change.deleted", snapshot.deleted as f64, "Total lines deleted"))
        .with(Signal::numeric(
          "change.churn",
          snapshot.churn as f64,
          "Total lines added + deleted",
        ))
        .with(Signal::numeric(
          "change.commits_count",
          commits as f64,
          "Number of commits in window",
        ))
        .with(Signal::numeric(
          "change.files_touched",
          snapshot.files_touched_count as f64,
          "Number of unique files touched",
        ))
        .with(Signal::numeric(
          "change.churn_per_commit",
          churn_per_commit,
          "Average churn per commit",
        ))
        .with(Signal::numeric(
          "change.scatter",
          scatter(&snapshot.files_touched) as f64,
          "Number of unique directories touched",
        )),
    )
  }
}

/// Unique parent directories; root-level files count as `.`.
fn scatter(files: &[String]) -> usize {
  files
    .iter()
    .map(|f| {
      Path::new(f)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string())
    })
    .collect::<HashSet<_>>()
    .len()
}
