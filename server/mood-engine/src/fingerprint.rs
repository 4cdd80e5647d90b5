//! Stable content hashes: the baseline cache key and the repository id.

use std::path::Path;

use serde_json::json;

use crate::config::Config;
use crate::error::EngineError;

/// Cache key for a baseline built with these inputs.
///
/// Key components: baseline day count + sorted provider ids + the serialized config (the API key
/// never serializes, so rotating it keeps the cache warm). Full blake3 hex digest.
pub fn cache_key(
  baseline_days: u32,
  provider_ids: &[String],
  config: &Config,
) -> Result<String, EngineError> {
  let mut providers = provider_ids.to_vec();
  providers.sort();

  let payload = json!({
    "baseline_days": baseline_days,
    "providers": providers,
    "config": config,
  });
  let bytes = serde_json::to_vec(&payload)?;
  Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Repository id for the result document: first 32 hex chars of blake3(canonical path).
pub fn repo_id(repo_path: &Path) -> String {
  let canonical = repo_path
    .canonicalize()
    .unwrap_or_else(|_| repo_path.to_path_buf());
  let hex = blake3::hash(canonical.to_string_lossy().as_bytes()).to_hex();
  hex[..32].to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn same_inputs_same_key() {
    let config = Config::default();
    let a = cache_key(56, &ids(&["change_shape", "commit_message"]), &config).unwrap();
    let b = cache_key(56, &ids(&["change_shape", "commit_message"]), &config).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
  }

  #[test]
  fn provider_order_does_not_matter() {
    let config = Config::default();
    let a = cache_key(56, &ids(&["commit_message", "change_shape"]), &config).unwrap();
    let b = cache_key(56, &ids(&["change_shape", "commit_message"]), &config).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn days_providers_and_config_all_change_the_key() {
    let config = Config::default();
    let base = cache_key(56, &ids(&["change_shape"]), &config).unwrap();

    assert_ne!(base, cache_key(28, &ids(&["change_shape"]), &config).unwrap());
    assert_ne!(
      base,
      cache_key(56, &ids(&["change_shape", "follow_up_fix"]), &config).unwrap()
    );

    let mut changed = Config::default();
    changed.follow_up_horizon_days = 7;
    assert_ne!(base, cache_key(56, &ids(&["change_shape"]), &changed).unwrap());
  }

  #[test]
  fn api_key_does_not_change_the_key() {
    let plain = Config::default();
    let mut keyed = Config::default();
    keyed.ai.api_key = Some("sk-rotated".into());
    assert_eq!(
      cache_key(56, &ids(&["change_shape"]), &plain).unwrap(),
      cache_key(56, &ids(&["change_shape"]), &keyed).unwrap()
    );
  }

  #[test]
  fn repo_id_is_32_hex_chars() {
    let dir = tempfile::tempdir().unwrap();
    let id = repo_id(dir.path());
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(id, repo_id(dir.path()));
  }
}
