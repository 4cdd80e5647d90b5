//! Deterministic heuristic scoring: a fixed rule table over percentiles and raw counts.

use crate::types::{confounder, round_to, MoodLabel, MoodResult, NormalizedFeatureSet, ReasonItem};

pub const BASE_SCORE: i32 = 70;
pub const MAX_REASONS: usize = 6;

const CHURN: &str = "change.churn";
const SCATTER: &str = "change.scatter";
const FILES_TOUCHED: &str = "change.files_touched";
const COMMITS: &str = "change.commits_count";
const FIX_DENSITY: &str = "followup.fix_density";
const REVERTS: &str = "msg.revert_count";
const WIP: &str = "msg.wip_count";

/// Providers whose absence costs confidence.
const KEY_PROVIDERS: [&str; 3] = ["change_shape", "follow_up_fix", "commit_message"];

/// Score one window. `confounders` carries flags raised earlier in the pipeline.
pub fn score(features: &NormalizedFeatureSet, confounders: &[String]) -> MoodResult {
  let mut score = BASE_SCORE;
  let mut reasons: Vec<ReasonItem> = Vec::new();
  let mut penalize = |points: i32, key: &str, summary: &str, reasons: &mut Vec<ReasonItem>| {
    score -= points;
    reasons.push(ReasonItem::negative(key, f64::from(points), summary));
  };

  let churn_pctl = features.percentile(CHURN);
  let fix_pctl = features.percentile(FIX_DENSITY);

  match churn_pctl {
    Some(p) if p >= 95.0 => penalize(20, CHURN, "Churn at p95+", &mut reasons),
    Some(p) if p >= 90.0 => penalize(12, CHURN, "Churn at p90-p95", &mut reasons),
    _ => {}
  }

  if features.percentile(SCATTER).is_some_and(|p| p >= 90.0) {
    penalize(10, SCATTER, "High scatter at p90+", &mut reasons);
  }

  match fix_pctl {
    Some(p) if p >= 95.0 => penalize(25, FIX_DENSITY, "Follow-up fix density at p95+", &mut reasons),
    Some(p) if p >= 90.0 => {
      penalize(15, FIX_DENSITY, "Follow-up fix density at p90-p95", &mut reasons)
    }
    _ => {}
  }

  if raw(features, REVERTS).is_some_and(|n| n > 0.0) {
    penalize(15, REVERTS, "Reverts detected", &mut reasons);
  }

  if let (Some(wip), Some(commits)) = (raw(features, WIP), raw(features, COMMITS)) {
    if commits > 0.0 && wip / commits >= 0.3 {
      penalize(8, WIP, "High WIP ratio (>= 0.3)", &mut reasons);
    }
  }

  if churn_pctl.is_some_and(|p| p <= 25.0) && fix_pctl.is_some_and(|p| p <= 25.0) {
    score += 5;
    reasons.push(ReasonItem::positive(CHURN, 5.0, "Low churn and low fix density"));
  }

  let score = score.clamp(0, 100) as u8;

  // Stable sort keeps rule order among equal magnitudes.
  reasons.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
  reasons.truncate(MAX_REASONS);

  MoodResult {
    window_label: features.raw_signals.window_label.clone(),
    mood_label: MoodLabel::from_score(score),
    mood_score: score,
    confidence: compute_confidence(features, confounders),
    reasons,
    confounders: detect_confounders(features, confounders),
    raw_signals: features.raw_signals.clone(),
    normalized: features.normalized.clone(),
    ai_summary: None,
  }
}

/// 0.6 base, adjusted for sample size, follow-up coverage, skipped key providers and
/// unreadable history.
pub fn compute_confidence(features: &NormalizedFeatureSet, confounders: &[String]) -> f64 {
  let mut confidence: f64 = 0.6;
  let commits = raw(features, COMMITS);

  if commits.is_some_and(|n| n >= 3.0) {
    confidence += 0.1;
  }
  if features.percentile(FIX_DENSITY).is_some() {
    confidence += 0.1;
  }
  if commits.is_some_and(|n| n <= 1.0) {
    confidence -= 0.2;
  }
  for id in KEY_PROVIDERS {
    let flag = confounder::provider_skipped(id);
    if confounders.contains(&flag) {
      confidence -= 0.1;
    }
  }
  if confounders.iter().any(|c| c == confounder::SNAPSHOT_UNAVAILABLE) {
    confidence -= 0.3;
  }

  round_to(confidence.clamp(0.0, 1.0), 2)
}

/// `existing` plus any refactor/formatting suspicion, deduplicated in first-seen order.
pub fn detect_confounders(features: &NormalizedFeatureSet, existing: &[String]) -> Vec<String> {
  let churn = features.percentile(CHURN);
  let fix = features.percentile(FIX_DENSITY);
  let files = features.percentile(FILES_TOUCHED);
  let high_churn = churn.is_some_and(|p| p >= 95.0);

  let mut found: Vec<&str> = existing.iter().map(String::as_str).collect();
  if high_churn && fix.is_some_and(|p| p <= 50.0) {
    found.push(confounder::LARGE_REFACTOR_SUSPECTED);
  }
  if high_churn && files.is_some_and(|p| p >= 90.0) && fix.map_or(true, |p| p <= 25.0) {
    found.push(confounder::FORMATTING_OR_RENAME_SUSPECTED);
  }

  let mut out: Vec<String> = Vec::with_capacity(found.len());
  for flag in found {
    if !out.iter().any(|c| c == flag) {
      out.push(flag.to_string());
    }
  }
  out
}

fn raw(features: &NormalizedFeatureSet, key: &str) -> Option<f64> {
  features.raw_signals.number(key)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Direction, Signal, SignalSet};
  use std::collections::BTreeMap;

  fn features(raw: &[(&str, f64)], pctl: &[(&str, f64)]) -> NormalizedFeatureSet {
    let mut signals = SignalSet::new("2024-01-15");
    for (k, v) in raw {
      signals.insert(Signal::numeric(*k, *v, ""));
    }
    let mut normalized = BTreeMap::new();
    for (k, v) in pctl {
      normalized.insert(NormalizedFeatureSet::pctl_key(k), *v);
      normalized.insert(NormalizedFeatureSet::z_key(k), 0.0);
    }
    NormalizedFeatureSet {
      raw_signals: signals,
      normalized,
    }
  }

  #[test]
  fn high_churn_is_medium() {
    let result = score(&features(&[(COMMITS, 5.0)], &[(CHURN, 96.0)]), &[]);
    assert_eq!(result.mood_score, 50);
    assert_eq!(result.mood_label, MoodLabel::Medium);
    assert_eq!(result.reasons.len(), 1);
    assert_eq!(result.reasons[0].summary, "Churn at p95+");
    assert_eq!(result.reasons[0].direction, Direction::Negative);
  }

  #[test]
  fn revert_is_medium_with_confidence() {
    let result = score(&features(&[(COMMITS, 5.0), (REVERTS, 1.0)], &[]), &[]);
    assert_eq!(result.mood_score, 55);
    assert_eq!(result.mood_label, MoodLabel::Medium);
    assert_eq!(result.confidence, 0.7);
  }

  #[test]
  fn confidence_rounds_after_every_penalty() {
    let skipped: Vec<String> = KEY_PROVIDERS
      .iter()
      .map(|id| confounder::provider_skipped(id))
      .collect();
    let f = features(&[(COMMITS, 0.0)], &[]);
    assert_eq!(compute_confidence(&f, &skipped), 0.1);
    assert_eq!(compute_confidence(&f, &[]), 0.4);

    let busy = features(&[(COMMITS, 9.0)], &[(FIX_DENSITY, 10.0)]);
    assert_eq!(compute_confidence(&busy, &[]), 0.8);
  }

  #[test]
  fn unreadable_window_loses_confidence_and_keeps_its_flag() {
    let f = features(&[(COMMITS, 0.0)], &[(FIX_DENSITY, 100.0)]);
    let flags = vec![confounder::SNAPSHOT_UNAVAILABLE.to_string()];
    let result = score(&f, &flags);
    assert_eq!(result.confidence, 0.2);
    assert_eq!(result.confounders, flags);
  }

  #[test]
  fn quiet_day_is_good() {
    let result = score(&features(&[], &[(CHURN, 20.0), (FIX_DENSITY, 15.0)]), &[]);
    assert_eq!(result.mood_score, 75);
    assert_eq!(result.mood_label, MoodLabel::Good);
    assert_eq!(result.reasons[0].direction, Direction::Positive);
  }

  #[test]
  fn brackets_are_exclusive() {
    let result = score(&features(&[], &[(CHURN, 92.0), (FIX_DENSITY, 97.0)]), &[]);
    assert_eq!(result.mood_score, 70 - 12 - 25);
    let summaries: Vec<_> = result.reasons.iter().map(|r| r.summary.as_str()).collect();
    assert_eq!(
      summaries,
      vec!["Follow-up fix density at p95+", "Churn at p90-p95"]
    );
  }

  #[test]
  fn wip_ratio_needs_commits() {
    let result = score(&features(&[(WIP, 2.0), (COMMITS, 0.0)], &[]), &[]);
    assert_eq!(result.mood_score, 70);

    let result = score(&features(&[(WIP, 3.0), (COMMITS, 10.0)], &[]), &[]);
    assert_eq!(result.mood_score, 62);

    let result = score(&features(&[(WIP, 2.0), (COMMITS, 10.0)], &[]), &[]);
    assert_eq!(result.mood_score, 70);
  }

  #[test]
  fn everything_bad_clamps_and_keeps_six_sorted_reasons() {
    let result = score(
      &features(
        &[(COMMITS, 2.0), (REVERTS, 3.0), (WIP, 2.0)],
        &[(CHURN, 99.0), (SCATTER, 95.0), (FIX_DENSITY, 99.0)],
      ),
      &[],
    );
    // 70 - 20 - 10 - 25 - 15 - 8
    assert_eq!(result.mood_score, 0);
    assert_eq!(result.mood_label, MoodLabel::Bad);
    assert!(result.reasons.len() <= MAX_REASONS);
    let mags: Vec<f64> = result.reasons.iter().map(|r| r.magnitude).collect();
    assert_eq!(mags, vec![25.0, 20.0, 15.0, 10.0, 8.0]);
  }

  #[test]
  fn confidence_adjustments() {
    let f = features(&[(COMMITS, 1.0)], &[(FIX_DENSITY, 50.0)]);
    // 0.6 + 0.1 (follow-up) - 0.2 (one commit)
    assert_eq!(compute_confidence(&f, &[]), 0.5);

    let skipped = vec![
      confounder::provider_skipped("change_shape"),
      confounder::provider_skipped("commit_message"),
      confounder::provider_skipped("custom"),
    ];
    assert_eq!(compute_confidence(&f, &skipped), 0.3);

    let f = features(&[(COMMITS, 4.0)], &[(FIX_DENSITY, 50.0)]);
    assert_eq!(compute_confidence(&f, &[]), 0.8);
  }

  #[test]
  fn confidence_never_negative() {
    let f = features(&[(COMMITS, 0.0)], &[]);
    let all = KEY_PROVIDERS
      .iter()
      .map(|id| confounder::provider_skipped(id))
      .collect::<Vec<_>>();
    assert_eq!(compute_confidence(&f, &all), 0.1);
    let result = score(&f, &all);
    assert!((0.0..=1.0).contains(&result.confidence));
  }

  #[test]
  fn refactor_and_formatting_suspicions() {
    let f = features(&[], &[(CHURN, 97.0), (FIX_DENSITY, 20.0), (FILES_TOUCHED, 93.0)]);
    let flags = detect_confounders(&f, &["provider_skipped:x".to_string()]);
    assert_eq!(
      flags,
      vec![
        "provider_skipped:x",
        confounder::LARGE_REFACTOR_SUSPECTED,
        confounder::FORMATTING_OR_RENAME_SUSPECTED,
      ]
    );

    // Without follow-up data only the formatting rule can fire.
    let f = features(&[], &[(CHURN, 97.0), (FILES_TOUCHED, 93.0)]);
    assert_eq!(
      detect_confounders(&f, &[]),
      vec![confounder::FORMATTING_OR_RENAME_SUSPECTED]
    );
  }

  #[test]
  fn existing_confounders_are_deduplicated() {
    let f = features(&[], &[(CHURN, 97.0), (FIX_DENSITY, 40.0)]);
    let existing = vec![
      confounder::LARGE_REFACTOR_SUSPECTED.to_string(),
      "provider_skipped:a".to_string(),
      "provider_skipped:a".to_string(),
    ];
    assert_eq!(
      detect_confounders(&f, &existing),
      vec![confounder::LARGE_REFACTOR_SUSPECTED, "provider_skipped:a"]
    );
  }

  #[test]
  fn scoring_is_deterministic() {
    let f = features(
      &[(COMMITS, 4.0), (REVERTS, 1.0)],
      &[(CHURN, 91.0), (SCATTER, 90.0)],
    );
    let a = score(&f, &["provider_skipped:x".to_string()]);
    let b = score(&f, &["provider_skipped:x".to_string()]);
    assert_eq!(a, b);
  }
}
