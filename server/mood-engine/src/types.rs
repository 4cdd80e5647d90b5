//! Core types for the mood engine (domain models + JSON contracts).

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Confounders
// ---------------------------------------------------------------------------

/// Flags that lower the reliability of a window's result.
pub mod confounder {
  pub const AI_UNAVAILABLE: &str = "ai_unavailable";
  pub const PROVIDER_SKIPPED_PREFIX: &str = "provider_skipped:";
  pub const LARGE_REFACTOR_SUSPECTED: &str = "large_refactor_suspected";
  pub const FORMATTING_OR_RENAME_SUSPECTED: &str = "formatting_or_rename_suspected";
  /// The window's history could not be read; its signals describe an empty day.
  pub const SNAPSHOT_UNAVAILABLE: &str = "snapshot_unavailable";

  pub fn provider_skipped(provider_id: &str) -> String {
    format!("{}{}", PROVIDER_SKIPPED_PREFIX, provider_id)
  }
}

// ---------------------------------------------------------------------------
// Windows and repository snapshots
// ---------------------------------------------------------------------------

/// A half-open time interval `[start, end)`, labelled by its local start date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisWindow {
  pub start: DateTime<FixedOffset>,
  pub end: DateTime<FixedOffset>,
  pub label: String,
}

impl AnalysisWindow {
  pub fn duration_seconds(&self) -> i64 {
    (self.end - self.start).num_seconds()
  }

  pub fn contains(&self, ts: &DateTime<FixedOffset>) -> bool {
    *ts >= self.start && *ts < self.end
  }
}

impl Serialize for AnalysisWindow {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeStruct;
    let mut s = serializer.serialize_struct("AnalysisWindow", 4)?;
    s.serialize_field("start", &self.start.to_rfc3339())?;
    s.serialize_field("end", &self.end.to_rfc3339())?;
    s.serialize_field("label", &self.label)?;
    s.serialize_field("duration_seconds", &self.duration_seconds())?;
    s.end()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitInfo {
  pub hash: String,
  pub author_name: String,
  pub author_email: String,
  pub authored_at: DateTime<FixedOffset>,
  pub subject: String,
  pub insertions: u64,
  pub deletions: u64,
  pub files: Vec<String>,
}

/// Aggregated view of one window's commits.
#[derive(Debug, Clone, Serialize)]
pub struct RepoSnapshot {
  pub window: AnalysisWindow,
  pub commits: Vec<CommitInfo>,
  /// Unique paths in first-seen order.
  pub files_touched: Vec<String>,
  pub commits_count: usize,
  pub files_touched_count: usize,
  pub added: u64,
  pub deleted: u64,
  pub churn: u64,
}

impl RepoSnapshot {
  pub fn from_commits(window: AnalysisWindow, commits: Vec<CommitInfo>) -> Self {
    let mut files_touched: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut added = 0;
    let mut deleted = 0;

    for commit in &commits {
      added += commit.insertions;
      deleted += commit.deletions;
      for file in &commit.files {
        if seen.insert(file.clone()) {
          files_touched.push(file.clone());
        }
      }
    }

    Self {
      window,
      commits_count: commits.len(),
      files_touched_count: files_touched.len(),
      files_touched,
      commits,
      added,
      deleted,
      churn: added + deleted,
    }
  }

  pub fn empty(window: AnalysisWindow) -> Self {
    Self::from_commits(window, Vec::new())
  }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
  Numeric,
  Boolean,
  String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
  Number(f64),
  Bool(bool),
  Text(String),
}

impl SignalValue {
  pub fn signal_type(&self) -> SignalType {
    match self {
      Self::Number(_) => SignalType::Numeric,
      Self::Bool(_) => SignalType::Boolean,
      Self::Text(_) => SignalType::String,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Number(v) => Some(*v),
      _ => None,
    }
  }
}

/// One named metric extracted from a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
  pub key: String,
  #[serde(rename = "type")]
  pub kind: SignalType,
  pub value: SignalValue,
  pub description: String,
}

impl Signal {
  pub fn new(key: impl Into<String>, value: SignalValue, description: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      kind: value.signal_type(),
      value,
      description: description.into(),
    }
  }

  pub fn numeric(key: impl Into<String>, value: f64, description: impl Into<String>) -> Self {
    Self::new(key, SignalValue::Number(value), description)
  }

  pub fn is_numeric(&self) -> bool {
    self.kind == SignalType::Numeric
  }
}

/// Signals for one window, keyed by signal key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSet {
  pub window_label: String,
  pub signals: BTreeMap<String, Signal>,
}

impl SignalSet {
  pub fn new(window_label: impl Into<String>) -> Self {
    Self {
      window_label: window_label.into(),
      signals: BTreeMap::new(),
    }
  }

  pub fn with(mut self, signal: Signal) -> Self {
    self.insert(signal);
    self
  }

  pub fn insert(&mut self, signal: Signal) {
    self.signals.insert(signal.key.clone(), signal);
  }

  pub fn get(&self, key: &str) -> Option<&Signal> {
    self.signals.get(key)
  }

  pub fn has(&self, key: &str) -> bool {
    self.signals.contains_key(key)
  }

  /// Numeric value of `key`, if present and numeric.
  pub fn number(&self, key: &str) -> Option<f64> {
    self.get(key).and_then(|s| s.value.as_f64())
  }

  /// Merge `other` into this set. Keys from `other` win; this set's label is kept.
  pub fn merge(mut self, other: SignalSet) -> Self {
    self.signals.extend(other.signals);
    self
  }

  pub fn len(&self) -> usize {
    self.signals.len()
  }

  pub fn is_empty(&self) -> bool {
    self.signals.is_empty()
  }
}

/// Raw signals plus their `norm.<key>.z` / `norm.<key>.pctl` entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedFeatureSet {
  pub raw_signals: SignalSet,
  pub normalized: BTreeMap<String, f64>,
}

impl NormalizedFeatureSet {
  pub fn z_key(signal_key: &str) -> String {
    format!("norm.{}.z", signal_key)
  }

  pub fn pctl_key(signal_key: &str) -> String {
    format!("norm.{}.pctl", signal_key)
  }

  pub fn z_score(&self, signal_key: &str) -> Option<f64> {
    self.normalized.get(&Self::z_key(signal_key)).copied()
  }

  pub fn percentile(&self, signal_key: &str) -> Option<f64> {
    self.normalized.get(&Self::pctl_key(signal_key)).copied()
  }
}

// ---------------------------------------------------------------------------
// Mood results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodLabel {
  Bad,
  Medium,
  Good,
}

impl MoodLabel {
  pub fn from_score(score: u8) -> Self {
    match score {
      0..=44 => Self::Bad,
      45..=74 => Self::Medium,
      _ => Self::Good,
    }
  }

  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "bad" => Some(Self::Bad),
      "medium" => Some(Self::Medium),
      "good" => Some(Self::Good),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Positive,
  Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonItem {
  pub signal_key: String,
  pub direction: Direction,
  pub magnitude: f64,
  pub summary: String,
}

impl ReasonItem {
  pub fn negative(signal_key: &str, magnitude: f64, summary: &str) -> Self {
    Self {
      signal_key: signal_key.into(),
      direction: Direction::Negative,
      magnitude,
      summary: summary.into(),
    }
  }

  pub fn positive(signal_key: &str, magnitude: f64, summary: &str) -> Self {
    Self {
      signal_key: signal_key.into(),
      direction: Direction::Positive,
      magnitude,
      summary: summary.into(),
    }
  }
}

/// Bounded adjustment and explanation returned by an AI engine.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct AiSummary {
  #[serde(rename = "explanation_bullets")]
  pub bullets: Vec<String>,
  /// Within [-10, 10].
  pub score_delta: i32,
  /// Within [-0.1, 0.1].
  pub confidence_delta: f64,
  pub label_override: Option<MoodLabel>,
}

pub const MAX_SCORE_DELTA: i32 = 10;
pub const MAX_CONFIDENCE_DELTA: f64 = 0.1;

impl AiSummary {
  /// Build a summary with deltas clamped into their allowed ranges.
  pub fn bounded(
    bullets: Vec<String>,
    score_delta: i32,
    confidence_delta: f64,
    label_override: Option<MoodLabel>,
  ) -> Self {
    let confidence_delta = if confidence_delta.is_finite() {
      confidence_delta.clamp(-MAX_CONFIDENCE_DELTA, MAX_CONFIDENCE_DELTA)
    } else {
      0.0
    };
    Self {
      bullets,
      score_delta: score_delta.clamp(-MAX_SCORE_DELTA, MAX_SCORE_DELTA),
      confidence_delta,
      label_override,
    }
  }
}

/// Final per-window result. Treated as a value: adjustments build a new instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodResult {
  pub window_label: String,
  pub mood_label: MoodLabel,
  pub mood_score: u8,
  pub confidence: f64,
  pub reasons: Vec<ReasonItem>,
  pub confounders: Vec<String>,
  pub raw_signals: SignalSet,
  pub normalized: BTreeMap<String, f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ai_summary: Option<AiSummary>,
}

impl MoodResult {
  /// Copy with `confounder` appended unless already present.
  pub fn with_confounder(&self, confounder: &str) -> Self {
    let mut next = self.clone();
    if !next.confounders.iter().any(|c| c == confounder) {
      next.confounders.push(confounder.to_string());
    }
    next
  }

  /// Copy with the AI adjustment applied and the summary attached.
  pub fn with_ai_summary(&self, summary: AiSummary) -> Self {
    let score = (i32::from(self.mood_score) + summary.score_delta).clamp(0, 100) as u8;
    let confidence = round_to((self.confidence + summary.confidence_delta).clamp(0.0, 1.0), 2);
    let label = summary
      .label_override
      .unwrap_or_else(|| MoodLabel::from_score(score));

    Self {
      mood_label: label,
      mood_score: score,
      confidence,
      ai_summary: Some(summary),
      ..self.clone()
    }
  }
}

/// Round `value` to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
  let factor = 10f64.powi(places);
  (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Requests and result documents
// ---------------------------------------------------------------------------

/// What to analyze. Unset bounds are resolved by the window planner.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
  pub since: Option<DateTime<FixedOffset>>,
  pub until: Option<DateTime<FixedOffset>>,
  pub days: Option<u32>,
  pub author: Option<String>,
  pub branch: Option<String>,
  pub timezone: Option<FixedOffset>,
  pub baseline_days: u32,
  /// Overrides `Config::follow_up_horizon_days` when set.
  pub follow_up_horizon_days: Option<u32>,
  pub ai_enabled: bool,
  pub ai_engine: String,
  pub output_format: String,
}

impl Default for AnalysisRequest {
  fn default() -> Self {
    Self {
      since: None,
      until: None,
      days: None,
      author: None,
      branch: None,
      timezone: None,
      baseline_days: 56,
      follow_up_horizon_days: None,
      ai_enabled: false,
      ai_engine: "openai".into(),
      output_format: "json".into(),
    }
  }
}

impl AnalysisRequest {
  pub fn summary(&self, follow_up_horizon_days: u32) -> RequestSummary {
    RequestSummary {
      since: self.since.map(|t| t.to_rfc3339()),
      until: self.until.map(|t| t.to_rfc3339()),
      days: self.days,
      author: self.author.clone(),
      branch: self.branch.clone(),
      timezone: self.timezone.map(|tz| tz.to_string()),
      baseline_days: self.baseline_days,
      follow_up_horizon_days,
      ai_enabled: self.ai_enabled,
      ai_engine: self.ai_engine.clone(),
      output_format: self.output_format.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
  pub since: Option<String>,
  pub until: Option<String>,
  pub days: Option<u32>,
  pub author: Option<String>,
  pub branch: Option<String>,
  pub timezone: Option<String>,
  pub baseline_days: u32,
  pub follow_up_horizon_days: u32,
  pub ai_enabled: bool,
  pub ai_engine: String,
  pub output_format: String,
}

pub const SCHEMA_VERSION: &str = "1.0";

/// The emitted result document.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
  pub schema_version: String,
  pub repo_id: String,
  pub analyzed_at: String,
  pub request_summary: RequestSummary,
  pub windows: Vec<MoodResult>,
}
