//! Core engine: validates the repository, resolves the baseline, scores each window and
//! optionally hands the results to an AI engine.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::ai::{self, AiEngine};
use crate::baseline::{Baseline, BaselineBuilder};
use crate::cache::BaselineCache;
use crate::config::{Config, KeywordMatchers};
use crate::error::EngineError;
use crate::fingerprint;
use crate::normalize;
use crate::repo::{GitRepoReader, RepoReader};
use crate::score;
use crate::signals::{ProviderContext, ProviderRegistry};
use crate::types::*;
use crate::window;

/// The mood engine. Stateless across calls; every `analyze` starts from scratch.
pub struct Engine {
  config: Config,
  reader: Box<dyn RepoReader>,
  registry: ProviderRegistry,
  ai_engine: Option<Box<dyn AiEngine>>,
  use_cache: bool,
}

impl Engine {
  pub fn new(config: Config) -> Self {
    Self {
      config: config.resolved(),
      reader: Box::new(GitRepoReader::new()),
      registry: ProviderRegistry::with_defaults(),
      ai_engine: None,
      use_cache: true,
    }
  }

  pub fn with_defaults() -> Self {
    Self::new(Config::default())
  }

  pub fn with_reader(mut self, reader: Box<dyn RepoReader>) -> Self {
    self.reader = reader;
    self
  }

  pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
    self.registry = registry;
    self
  }

  /// Use `engine` instead of building one from the request's engine id.
  pub fn with_ai_engine(mut self, engine: Box<dyn AiEngine>) -> Self {
    self.ai_engine = Some(engine);
    self
  }

  /// Always rebuild the baseline; never touch the cache file.
  pub fn without_cache(mut self) -> Self {
    self.use_cache = false;
    self
  }

  pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
    &mut self.registry
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn analyze(
    &self,
    repo_path: &Path,
    request: &AnalysisRequest,
  ) -> Result<AnalysisResult, EngineError> {
    self.analyze_at(repo_path, request, Utc::now())
  }

  /// Analyze with an explicit "now". Only `RepoInvalid` (and an unusable config) abort the run.
  pub fn analyze_at(
    &self,
    repo_path: &Path,
    request: &AnalysisRequest,
    now: DateTime<Utc>,
  ) -> Result<AnalysisResult, EngineError> {
    self.reader.validate(repo_path)?;

    let mut config = self.config.clone();
    if let Some(days) = request.follow_up_horizon_days {
      config.follow_up_horizon_days = days;
    }
    check_request(request, &config)?;
    let keywords = KeywordMatchers::from_config(&config.keywords)?;
    let ctx = ProviderContext {
      repo_path,
      config: &config,
      keywords: &keywords,
      reader: Some(self.reader.as_ref()),
    };

    let windows = window::plan(request, now);
    info!(
      repo = %repo_path.display(),
      windows = windows.len(),
      baseline_days = request.baseline_days,
      "analysis started"
    );

    let tz = request.timezone.unwrap_or_else(window::utc);
    let anchor = windows
      .first()
      .map(|w| w.start)
      .unwrap_or_else(|| now.with_timezone(&tz));
    let baseline = self.resolve_baseline(repo_path, anchor, request.baseline_days, &ctx);

    let mut results = Vec::with_capacity(windows.len());
    let mut snapshots = Vec::with_capacity(windows.len());
    for w in &windows {
      let read = self.reader.build_snapshot(
        repo_path,
        w,
        request.author.as_deref(),
        request.branch.as_deref(),
      );
      let (snapshot, unreadable) = match read {
        Ok(s) => (s, false),
        Err(e) => {
          warn!(window = %w.label, error = %e, "cannot read window, scoring it as empty");
          (RepoSnapshot::empty(w.clone()), true)
        }
      };

      let mut collected = self.registry.collect(&snapshot, &ctx);
      if unreadable {
        collected
          .confounders
          .push(confounder::SNAPSHOT_UNAVAILABLE.to_string());
      }
      let features = normalize::normalize(collected.signals, &baseline);
      results.push(score::score(&features, &collected.confounders));
      snapshots.push(snapshot);
    }

    if request.ai_enabled {
      results = self.apply_ai(request, &config, results, &snapshots);
    }

    Ok(AnalysisResult {
      schema_version: SCHEMA_VERSION.to_string(),
      repo_id: fingerprint::repo_id(repo_path),
      analyzed_at: now.to_rfc3339(),
      request_summary: request.summary(config.follow_up_horizon_days),
      windows: results,
    })
  }

  fn resolve_baseline(
    &self,
    repo_path: &Path,
    anchor: DateTime<chrono::FixedOffset>,
    days: u32,
    ctx: &ProviderContext<'_>,
  ) -> Baseline {
    let ids = self.registry.ids();
    let cache = self.use_cache.then(|| BaselineCache::for_repo(repo_path));

    if let Some(hit) = cache.as_ref().and_then(|c| c.load(days, &ids, ctx.config)) {
      info!(windows = hit.window_count, "baseline loaded from cache");
      return hit;
    }

    let baseline =
      BaselineBuilder::new(self.reader.as_ref(), &self.registry).build(repo_path, anchor, days, ctx);
    if let Some(c) = &cache {
      c.save(&baseline, days, &ids, ctx.config);
    }
    baseline
  }

  fn apply_ai(
    &self,
    request: &AnalysisRequest,
    config: &Config,
    results: Vec<MoodResult>,
    snapshots: &[RepoSnapshot],
  ) -> Vec<MoodResult> {
    if !config.ai.has_credential() {
      info!("ai enabled but no api key configured, skipping");
      return results;
    }

    let built;
    let engine: &dyn AiEngine = match &self.ai_engine {
      Some(e) => e.as_ref(),
      None => match ai::create_engine(&request.ai_engine, &config.ai) {
        Ok(e) => {
          built = e;
          built.as_ref()
        }
        Err(e) => {
          warn!(engine = %request.ai_engine, error = %e, "ai engine unavailable, skipping");
          return results;
        }
      },
    };

    let enhanced = ai::enhance(engine, results, snapshots, config.ai.batch_size);
    if let Some(err) = &enhanced.last_error {
      warn!(engine = engine.id(), error = %err, "ai enhancement incomplete");
    }
    enhanced.results
  }
}

/// Day counts and explicit ranges must stay within `window::MAX_DAYS`.
fn check_request(request: &AnalysisRequest, config: &Config) -> Result<(), EngineError> {
  if let Some(days) = request.days {
    window::check_days("days", days)?;
  }
  window::check_days("baseline_days", request.baseline_days)?;
  window::check_days("follow_up_horizon_days", config.follow_up_horizon_days)?;

  if let (Some(since), Some(until)) = (request.since, request.until) {
    let span = (until - since).num_days();
    if span > i64::from(window::MAX_DAYS) {
      return Err(EngineError::validation(
        "since",
        &format!("range of {} days exceeds the maximum of {}", span, window::MAX_DAYS),
      ));
    }
  }
  Ok(())
}
