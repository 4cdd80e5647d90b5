//! Optional LLM explanations with bounded score/confidence nudges.
//!
//! Engines only ever see metrics: signal values, percentiles, reasons, file extensions and
//! paths. No code, no diffs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::config::AiConfig;
use crate::error::EngineError;
use crate::types::{AiSummary, MoodLabel, MoodResult, ReasonItem, RepoSnapshot, SignalValue};

pub mod http;
pub mod orchestrator;

pub use http::{HttpEngine, Vendor};
pub use orchestrator::{enhance, Enhanced};

pub const MAX_EXTENSIONS: usize = 10;
pub const MAX_TOP_PATHS: usize = 20;

pub trait AiEngine: Send + Sync {
  fn id(&self) -> &str;

  fn summarize(&self, input: &AiInput) -> Result<AiSummary, EngineError>;

  /// Summaries keyed by window label. May omit labels it could not resolve.
  fn summarize_batch(&self, inputs: &[AiInput]) -> Result<BTreeMap<String, AiSummary>, EngineError>;
}

pub fn supported_engines() -> &'static [&'static str] {
  &["openai", "anthropic", "deepseek", "google"]
}

/// Build the engine named `id`. Unknown ids are an `Ai` error.
pub fn create_engine(id: &str, config: &AiConfig) -> Result<Box<dyn AiEngine>, EngineError> {
  let vendor = Vendor::from_id(id).ok_or_else(|| EngineError::ai(id, "unknown engine"))?;
  Ok(Box::new(HttpEngine::new(vendor, config)?))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionCount {
  pub extension: String,
  pub count: usize,
}

/// Metrics-only view of one window handed to an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiInput {
  pub window_label: String,
  pub mood_label: MoodLabel,
  pub mood_score: u8,
  pub confidence: f64,
  pub raw_signals: BTreeMap<String, SignalValue>,
  pub normalized: BTreeMap<String, f64>,
  pub reasons: Vec<ReasonItem>,
  pub confounders: Vec<String>,
  pub commits_count: usize,
  pub extension_histogram: Vec<ExtensionCount>,
  pub top_paths: Vec<String>,
}

impl AiInput {
  pub fn new(result: &MoodResult, snapshot: Option<&RepoSnapshot>) -> Self {
    let files: &[String] = snapshot.map(|s| s.files_touched.as_slice()).unwrap_or(&[]);
    Self {
      window_label: result.window_label.clone(),
      mood_label: result.mood_label,
      mood_score: result.mood_score,
      confidence: result.confidence,
      raw_signals: result
        .raw_signals
        .signals
        .iter()
        .map(|(k, s)| (k.clone(), s.value.clone()))
        .collect(),
      normalized: result.normalized.clone(),
      reasons: result.reasons.clone(),
      confounders: result.confounders.clone(),
      commits_count: snapshot.map(|s| s.commits.len()).unwrap_or(0),
      extension_histogram: extension_histogram(files),
      top_paths: files.iter().take(MAX_TOP_PATHS).cloned().collect(),
    }
  }
}

/// Top extensions by count, ties broken by name. Extensionless files count as `no_ext`.
pub fn extension_histogram(files: &[String]) -> Vec<ExtensionCount> {
  let mut counts: BTreeMap<String, usize> = BTreeMap::new();
  for file in files {
    let ext = Path::new(file)
      .extension()
      .map(|e| e.to_string_lossy().into_owned())
      .filter(|e| !e.is_empty())
      .unwrap_or_else(|| "no_ext".to_string());
    *counts.entry(ext).or_default() += 1;
  }

  let mut histogram: Vec<ExtensionCount> = counts
    .into_iter()
    .map(|(extension, count)| ExtensionCount { extension, count })
    .collect();
  // BTreeMap order is by name already; a stable sort keeps it for equal counts.
  histogram.sort_by(|a, b| b.count.cmp(&a.count));
  histogram.truncate(MAX_EXTENSIONS);
  histogram
}

/// Parse the model's text content into a JSON object.
pub fn parse_object(engine: &str, content: &str) -> Result<serde_json::Map<String, Value>, EngineError> {
  match serde_json::from_str::<Value>(content.trim()) {
    Ok(Value::Object(map)) => Ok(map),
    _ => Err(EngineError::ai(engine, "response is not valid JSON")),
  }
}

/// Summary from a decoded response object. Accepts snake_case and camelCase keys, clamps both
/// deltas, drops non-string bullets and ignores unknown label overrides.
pub fn summary_from_json(data: &serde_json::Map<String, Value>) -> AiSummary {
  let field = |snake: &str, camel: &str| data.get(snake).or_else(|| data.get(camel));

  let bullets = field("explanation_bullets", "explanationBullets")
    .and_then(Value::as_array)
    .map(|items| {
      items
        .iter()
        .filter_map(|b| b.as_str().map(str::to_string))
        .collect()
    })
    .unwrap_or_default();

  let score_delta = field("score_delta", "scoreDelta")
    .and_then(number)
    .map(|v| v.trunc().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
    .unwrap_or(0);

  let confidence_delta = field("confidence_delta", "confidenceDelta")
    .and_then(number)
    .unwrap_or(0.0);

  let label_override = field("label_override", "labelOverride")
    .and_then(Value::as_str)
    .and_then(MoodLabel::from_str_loose);

  AiSummary::bounded(bullets, score_delta, confidence_delta, label_override)
}

/// Batch response: one entry per input label, empty summary where the model left a gap.
pub fn batch_from_json(
  engine: &str,
  content: &str,
  inputs: &[AiInput],
) -> Result<BTreeMap<String, AiSummary>, EngineError> {
  let object = parse_object(engine, content)?;
  Ok(
    inputs
      .iter()
      .map(|input| {
        let summary = match object.get(&input.window_label) {
          Some(Value::Object(entry)) => summary_from_json(entry),
          _ => AiSummary::default(),
        };
        (input.window_label.clone(), summary)
      })
      .collect(),
  )
}

fn number(v: &Value) -> Option<f64> {
  match v {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Signal, SignalSet};
  use serde_json::json;

  fn obj(v: Value) -> serde_json::Map<String, Value> {
    match v {
      Value::Object(m) => m,
      _ => panic!("not an object"),
    }
  }

  fn input(label: &str) -> AiInput {
    let result = MoodResult {
      window_label: label.into(),
      mood_label: MoodLabel::Medium,
      mood_score: 60,
      confidence: 0.7,
      reasons: vec![],
      confounders: vec![],
      raw_signals: SignalSet::new(label),
      normalized: BTreeMap::new(),
      ai_summary: None,
    };
    AiInput::new(&result, None)
  }

  #[test]
  fn parses_snake_case_and_clamps() {
    let s = summary_from_json(&obj(json!({
      "explanation_bullets": ["Churn spiked", 42, "Reverts present"],
      "score_delta": 25,
      "confidence_delta": -0.5,
    })));
    assert_eq!(s.bullets, vec!["Churn spiked", "Reverts present"]);
    assert_eq!(s.score_delta, 10);
    assert_eq!(s.confidence_delta, -0.1);
    assert_eq!(s.label_override, None);
  }

  #[test]
  fn parses_camel_case_and_label_override() {
    let s = summary_from_json(&obj(json!({
      "explanationBullets": ["ok"],
      "scoreDelta": -3.7,
      "confidenceDelta": 0.05,
      "labelOverride": "good",
    })));
    assert_eq!(s.score_delta, -3);
    assert_eq!(s.confidence_delta, 0.05);
    assert_eq!(s.label_override, Some(MoodLabel::Good));
  }

  #[test]
  fn unknown_label_and_bad_types_are_ignored() {
    let s = summary_from_json(&obj(json!({
      "explanation_bullets": "not a list",
      "score_delta": "4",
      "label_override": "ecstatic",
    })));
    assert!(s.bullets.is_empty());
    assert_eq!(s.score_delta, 4);
    assert_eq!(s.label_override, None);
  }

  #[test]
  fn non_object_content_is_an_error() {
    assert!(parse_object("openai", "Sure! Here is the JSON").is_err());
    assert!(parse_object("openai", "[1, 2]").is_err());
    assert!(parse_object("openai", " {\"score_delta\": 1} ").is_ok());
  }

  #[test]
  fn batch_fills_gaps_with_empty_summaries() {
    let inputs = vec![input("2024-01-15"), input("2024-01-16")];
    let content = json!({
      "2024-01-15": {"explanation_bullets": ["a"], "score_delta": 2},
      "2024-01-17": {"score_delta": 9},
    })
    .to_string();
    let map = batch_from_json("openai", &content, &inputs).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map["2024-01-15"].score_delta, 2);
    assert_eq!(map["2024-01-16"], AiSummary::default());
  }

  #[test]
  fn histogram_orders_by_count_then_name() {
    let files: Vec<String> = [
      "src/a.rs", "src/b.rs", "README", "Makefile", "docs/x.md", "c.toml", "d.toml", "e.rs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let h = extension_histogram(&files);
    let pairs: Vec<_> = h.iter().map(|e| (e.extension.as_str(), e.count)).collect();
    assert_eq!(
      pairs,
      vec![("rs", 3), ("no_ext", 2), ("toml", 2), ("md", 1)]
    );
  }

  #[test]
  fn histogram_keeps_top_ten() {
    let files: Vec<String> = (0..15).map(|i| format!("f.e{:02}", i)).collect();
    assert_eq!(extension_histogram(&files).len(), MAX_EXTENSIONS);
  }

  #[test]
  fn input_carries_metrics_and_top_paths() {
    let window = crate::signals::test_support::window();
    let files: Vec<String> = (0..25).map(|i| format!("src/f{}.rs", i)).collect();
    let snapshot = RepoSnapshot {
      files_touched_count: files.len(),
      files_touched: files,
      ..RepoSnapshot::empty(window)
    };
    let mut expected = input("2024-01-15");
    expected.raw_signals.insert("change.churn".into(), SignalValue::Number(12.0));
    let mood = MoodResult {
      window_label: "2024-01-15".into(),
      mood_label: MoodLabel::Good,
      mood_score: 80,
      confidence: 0.8,
      reasons: vec![],
      confounders: vec!["provider_skipped:x".into()],
      raw_signals: SignalSet::new("2024-01-15").with(Signal::numeric("change.churn", 12.0, "")),
      normalized: BTreeMap::new(),
      ai_summary: None,
    };

    let built = AiInput::new(&mood, Some(&snapshot));
    assert_eq!(built.top_paths.len(), MAX_TOP_PATHS);
    assert_eq!(built.top_paths[0], "src/f0.rs");
    assert_eq!(built.raw_signals, expected.raw_signals);
    assert_eq!(built.confounders, vec!["provider_skipped:x"]);

    let json = serde_json::to_value(&built).unwrap();
    assert_eq!(json["mood_label"], "good");
    assert_eq!(json["extension_histogram"][0]["extension"], "rs");
  }

  #[test]
  fn factory_knows_supported_engines() {
    for id in supported_engines() {
      let engine = create_engine(id, &AiConfig::default()).unwrap();
      assert_eq!(engine.id(), *id);
    }
    assert!(create_engine("llama", &AiConfig::default()).is_err());
  }
}
