//! Batched AI enhancement with partial-failure handling.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::ai::{AiEngine, AiInput};
use crate::types::{confounder, AiSummary, MoodResult, RepoSnapshot};

/// Enhanced results plus the last engine error, if any batch failed.
#[derive(Debug, Clone)]
pub struct Enhanced {
  pub results: Vec<MoodResult>,
  pub last_error: Option<String>,
}

/// Send `results` to `engine` in batches of `batch_size` and apply the returned summaries.
///
/// `snapshots[i]` belongs to `results[i]`. The first failing batch stops the run: every window
/// still lacking a summary keeps its heuristic score and gets `ai_unavailable`.
pub fn enhance(
  engine: &dyn AiEngine,
  results: Vec<MoodResult>,
  snapshots: &[RepoSnapshot],
  batch_size: usize,
) -> Enhanced {
  let inputs: Vec<AiInput> = results
    .iter()
    .enumerate()
    .map(|(i, r)| AiInput::new(r, snapshots.get(i)))
    .collect();

  let mut summaries: BTreeMap<String, AiSummary> = BTreeMap::new();
  let mut last_error: Option<String> = None;

  for batch in inputs.chunks(batch_size.max(1)) {
    let outcome = match batch {
      [only] => engine
        .summarize(only)
        .map(|s| BTreeMap::from([(only.window_label.clone(), s)])),
      _ => engine.summarize_batch(batch),
    };

    match outcome {
      Ok(found) => summaries.extend(found),
      Err(e) => {
        warn!(engine = engine.id(), error = %e, "ai batch failed, skipping remaining windows");
        last_error = Some(e.to_string());
        break;
      }
    }
  }

  let failed = last_error.is_some();
  let results: Vec<MoodResult> = results
    .into_iter()
    .map(|result| match summaries.remove(&result.window_label) {
      Some(summary) => result.with_ai_summary(summary),
      None if failed => result.with_confounder(confounder::AI_UNAVAILABLE),
      None => result,
    })
    .collect();

  info!(
    engine = engine.id(),
    windows = results.len(),
    enhanced = results.iter().filter(|r| r.ai_summary.is_some()).count(),
    "ai enhancement done"
  );

  Enhanced {
    results,
    last_error,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::EngineError;
  use crate::types::{MoodLabel, SignalSet};
  use std::sync::Mutex;

  /// Records calls; fails from the `fail_on`th call (1-based) onwards.
  struct ScriptedEngine {
    calls: Mutex<Vec<(&'static str, usize)>>,
    fail_on: Option<usize>,
    delta: i32,
  }

  impl ScriptedEngine {
    fn new(delta: i32, fail_on: Option<usize>) -> Self {
      Self {
        calls: Mutex::new(Vec::new()),
        fail_on,
        delta,
      }
    }

    fn record(&self, kind: &'static str, n: usize) -> Result<(), EngineError> {
      let mut calls = self.calls.lock().unwrap();
      calls.push((kind, n));
      match self.fail_on {
        Some(k) if calls.len() >= k => Err(EngineError::ai("scripted", "HTTP 503: unavailable")),
        _ => Ok(()),
      }
    }

    fn summary(&self) -> AiSummary {
      AiSummary::bounded(vec!["steady".into()], self.delta, 0.05, None)
    }
  }

  impl AiEngine for ScriptedEngine {
    fn id(&self) -> &str {
      "scripted"
    }

    fn summarize(&self, _input: &AiInput) -> Result<AiSummary, EngineError> {
      self.record("single", 1)?;
      Ok(self.summary())
    }

    fn summarize_batch(
      &self,
      inputs: &[AiInput],
    ) -> Result<BTreeMap<String, AiSummary>, EngineError> {
      self.record("batch", inputs.len())?;
      Ok(
        inputs
          .iter()
          .map(|i| (i.window_label.clone(), self.summary()))
          .collect(),
      )
    }
  }

  fn mood(label: &str, score: u8) -> MoodResult {
    MoodResult {
      window_label: label.into(),
      mood_label: MoodLabel::from_score(score),
      mood_score: score,
      confidence: 0.6,
      reasons: vec![],
      confounders: vec![],
      raw_signals: SignalSet::new(label),
      normalized: BTreeMap::new(),
      ai_summary: None,
    }
  }

  fn three() -> Vec<MoodResult> {
    vec![mood("2024-01-01", 60), mood("2024-01-02", 72), mood("2024-01-03", 40)]
  }

  #[test]
  fn batches_of_two_then_one() {
    let engine = ScriptedEngine::new(5, None);
    let out = enhance(&engine, three(), &[], 2);

    assert_eq!(*engine.calls.lock().unwrap(), vec![("batch", 2), ("single", 1)]);
    assert!(out.last_error.is_none());
    let scores: Vec<u8> = out.results.iter().map(|r| r.mood_score).collect();
    assert_eq!(scores, vec![65, 77, 45]);
    assert_eq!(out.results[1].mood_label, MoodLabel::Good);
    assert_eq!(out.results[0].confidence, 0.65);
    assert!(out.results.iter().all(|r| r.ai_summary.is_some()));
  }

  #[test]
  fn batch_size_one_goes_through_single_calls() {
    let engine = ScriptedEngine::new(0, None);
    enhance(&engine, three(), &[], 1);
    assert_eq!(
      *engine.calls.lock().unwrap(),
      vec![("single", 1), ("single", 1), ("single", 1)]
    );
  }

  #[test]
  fn zero_batch_size_is_treated_as_one() {
    let engine = ScriptedEngine::new(0, None);
    enhance(&engine, three(), &[], 0);
    assert_eq!(engine.calls.lock().unwrap().len(), 3);
  }

  #[test]
  fn failure_stops_and_flags_remaining_windows() {
    let engine = ScriptedEngine::new(5, Some(2));
    let out = enhance(&engine, three(), &[], 1);

    assert_eq!(engine.calls.lock().unwrap().len(), 2);
    assert_eq!(out.last_error.as_deref(), Some("ai engine scripted: HTTP 503: unavailable"));

    assert_eq!(out.results[0].mood_score, 65);
    assert!(out.results[0].confounders.is_empty());

    for r in &out.results[1..] {
      assert!(r.ai_summary.is_none());
      assert_eq!(r.confounders, vec![confounder::AI_UNAVAILABLE]);
    }
    assert_eq!(out.results[1].mood_score, 72);
    assert_eq!(out.results[2].mood_score, 40);
  }

  #[test]
  fn ai_unavailable_is_not_duplicated() {
    let engine = ScriptedEngine::new(0, Some(1));
    let already = three()
      .into_iter()
      .map(|r| r.with_confounder(confounder::AI_UNAVAILABLE))
      .collect();
    let out = enhance(&engine, already, &[], 10);
    assert!(out
      .results
      .iter()
      .all(|r| r.confounders == vec![confounder::AI_UNAVAILABLE]));
  }

  #[test]
  fn deltas_stay_in_bounds() {
    let engine = ScriptedEngine::new(10, None);
    let out = enhance(&engine, vec![mood("2024-01-01", 95)], &[], 10);
    assert_eq!(out.results[0].mood_score, 100);
    assert!((0.0..=1.0).contains(&out.results[0].confidence));
  }
}
