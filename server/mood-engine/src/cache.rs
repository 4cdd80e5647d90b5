//! Best-effort on-disk cache for the baseline.
//!
//! One JSON file per repository. A blob is only reused when its key matches the current
//! baseline inputs exactly; every I/O or parse problem is a miss.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::baseline::Baseline;
use crate::config::Config;
use crate::error::EngineError;
use crate::fingerprint;

pub const CACHE_DIR: &str = "mood-engine";
pub const CACHE_FILE: &str = "cache-baseline.json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheBlob {
  cache_key: String,
  cached_at: String,
  baseline: Baseline,
}

#[derive(Debug, Clone)]
pub struct BaselineCache {
  path: PathBuf,
}

impl BaselineCache {
  /// `<repo>/.git/mood-engine/` when the git dir exists and is writable, else a per-repo
  /// temp directory.
  pub fn for_repo(repo_path: &Path) -> Self {
    let git_dir = repo_path.join(".git");
    let in_repo = git_dir.join(CACHE_DIR);
    let target = if in_repo.is_dir() { &in_repo } else { &git_dir };
    let dir = if git_dir.is_dir() && is_writable(target) {
      in_repo
    } else {
      std::env::temp_dir()
        .join(CACHE_DIR)
        .join(fingerprint::repo_id(repo_path))
    };
    Self::at(dir.join(CACHE_FILE))
  }

  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Cached baseline for these inputs, or `None` on any mismatch or read problem.
  pub fn load(&self, baseline_days: u32, provider_ids: &[String], config: &Config) -> Option<Baseline> {
    let key = match fingerprint::cache_key(baseline_days, provider_ids, config) {
      Ok(k) => k,
      Err(e) => {
        debug!(error = %e, "cache key unavailable");
        return None;
      }
    };

    let raw = match fs::read_to_string(&self.path) {
      Ok(raw) => raw,
      Err(e) => {
        debug!(path = %self.path.display(), error = %e, "baseline cache miss");
        return None;
      }
    };

    let blob: CacheBlob = match serde_json::from_str(&raw) {
      Ok(b) => b,
      Err(e) => {
        debug!(path = %self.path.display(), error = %e, "baseline cache unreadable");
        return None;
      }
    };

    if blob.cache_key != key {
      debug!(path = %self.path.display(), "baseline cache stale");
      return None;
    }

    debug!(path = %self.path.display(), cached_at = %blob.cached_at, "baseline cache hit");
    Some(blob.baseline)
  }

  /// Persist `baseline`. Failures are logged and swallowed.
  pub fn save(&self, baseline: &Baseline, baseline_days: u32, provider_ids: &[String], config: &Config) {
    if let Err(e) = self.try_save(baseline, baseline_days, provider_ids, config) {
      debug!(path = %self.path.display(), error = %e, "baseline cache not written");
    }
  }

  fn try_save(
    &self,
    baseline: &Baseline,
    baseline_days: u32,
    provider_ids: &[String],
    config: &Config,
  ) -> Result<(), EngineError> {
    let blob = CacheBlob {
      cache_key: fingerprint::cache_key(baseline_days, provider_ids, config)?,
      cached_at: Utc::now().to_rfc3339(),
      baseline: baseline.clone(),
    };
    if let Some(dir) = self.path.parent() {
      fs::create_dir_all(dir)?;
    }
    fs::write(&self.path, serde_json::to_vec_pretty(&blob)?)?;
    Ok(())
  }
}

fn is_writable(dir: &Path) -> bool {
  fs::metadata(dir)
    .map(|m| !m.permissions().readonly())
    .unwrap_or(false)
}
