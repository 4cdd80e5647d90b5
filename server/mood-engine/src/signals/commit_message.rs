//! Keyword counts over commit subjects.

use crate::error::EngineError;
use crate::signals::{ProviderContext, SignalProvider};
use crate::types::{round_to, RepoSnapshot, Signal, SignalSet};

pub struct CommitMessageProvider;

impl SignalProvider for CommitMessageProvider {
  fn id(&self) -> &str {
    "commit_message"
  }

  fn provide(
    &self,
    snapshot: &RepoSnapshot,
    ctx: &ProviderContext<'_>,
  ) -> Result<SignalSet, EngineError> {
    let kw = ctx.keywords;
    let mut fix = 0usize;
    let mut revert = 0usize;
    let mut wip = 0usize;

    for commit in &snapshot.commits {
      let subject = commit.subject.as_str();
      if kw.fix.is_match(subject) {
        fix += 1;
      }
      if kw.revert.is_match(subject) {
        revert += 1;
      }
      if kw.wip.is_match(subject) {
        wip += 1;
      }
    }

    let fix_ratio = if snapshot.commits_count > 0 {
      round_to(fix as f64 / snapshot.commits_count as f64, 4)
    } else {
      0.0
    };

    Ok(
      SignalSet::new(snapshot.window.label.clone())
        .with(Signal::numeric(
          "msg.fix_keyword_count",
          fix as f64,
          "Commits matching fix keywords",
        ))
        .with(Signal::numeric(
          "msg.revert_count",
          revert as f64,
          "Commits matching revert keyword",
        ))
        .with(Signal::numeric(
          "msg.wip_count",
          wip as f64,
          "Commits matching WIP keywords",
        ))
        .with(Signal::numeric(
          "msg.fix_ratio",
          fix_ratio,
          "Ratio of fix commits to total commits",
        )),
    )
  }
}
