//! Follow-up fixes: commits in the days after a window that go back to its files.

use std::collections::HashSet;

use crate::error::EngineError;
use crate::signals::{ProviderContext, SignalProvider};
use crate::types::{round_to, AnalysisWindow, RepoSnapshot, Signal, SignalSet};
use crate::window;

pub struct FollowUpFixProvider;

impl SignalProvider for FollowUpFixProvider {
  fn id(&self) -> &str {
    "follow_up_fix"
  }

  fn provide(
    &self,
    snapshot: &RepoSnapshot,
    ctx: &ProviderContext<'_>,
  ) -> Result<SignalSet, EngineError> {
    let horizon_days = ctx.config.follow_up_horizon_days;
    let label = snapshot.window.label.clone();

    let reader = match ctx.reader {
      Some(r) if snapshot.files_touched_count > 0 => r,
      _ => return Ok(signals(label, horizon_days, 0, 0, 0.0)),
    };

    let horizon = AnalysisWindow {
      start: snapshot.window.end,
      end: window::shift_days(snapshot.window.end, i64::from(horizon_days)).ok_or_else(|| {
        EngineError::provider(self.id(), format!("horizon of {} days is out of range", horizon_days))
      })?,
      label: format!("{}+horizon", snapshot.window.label),
    };
    let later = reader.list_commits(ctx.repo_path, &horizon, None, None)?;

    let window_files: HashSet<&str> = snapshot.files_touched.iter().map(String::as_str).collect();
    let mut touching = 0usize;
    let mut fixes = 0usize;

    for commit in &later {
      if commit.files.iter().any(|f| window_files.contains(f.as_str())) {
        touching += 1;
        if ctx.keywords.fix.is_match(&commit.subject) {
          fixes += 1;
        }
      }
    }

    let density = fixes as f64 / snapshot.churn.max(1) as f64;
    Ok(signals(label, horizon_days, touching, fixes, round_to(density, 6)))
  }
}

fn signals(
  label: String,
  horizon_days: u32,
  touching: usize,
  fixes: usize,
  density: f64,
) -> SignalSet {
  SignalSet::new(label)
    .with(Signal::numeric(
      "followup.horizon_days",
      f64::from(horizon_days),
      "Number of days scanned after window",
    ))
    .with(Signal::numeric(
      "followup.touching_commits",
      touching as f64,
      "Horizon commits touching files from window",
    ))
    .with(Signal::numeric(
      "followup.fix_commits",
      fixes as f64,
      "Horizon commits with fix keywords touching window files",
    ))
    .with(Signal::numeric(
      "followup.fix_density",
      density,
      "Fix commits / max(1, churn)",
    ))
}
