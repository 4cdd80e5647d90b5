//! Engine configuration with sane defaults.
//!
//! Every recognized option is a field here; anything missing from a TOML file falls back to
//! the `Default` impls. The serialized form (minus the API key) is part of the baseline cache
//! key, so any change here invalidates cached baselines.

use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;

pub const DEFAULT_FIX_PATTERN: &str = r"\b(fix|bug|hotfix|patch|typo|oops)\b";
pub const DEFAULT_REVERT_PATTERN: &str = r"\b(revert)\b";
pub const DEFAULT_WIP_PATTERN: &str = r"\b(wip|tmp|debug|hack)\b";

/// Tunables threaded through providers, the baseline cache and the AI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Days scanned after each window for follow-up fixes.
  pub follow_up_horizon_days: u32,
  pub keywords: KeywordConfig,
  pub ai: AiConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      follow_up_horizon_days: 3,
      keywords: KeywordConfig::default(),
      ai: AiConfig::default(),
    }
  }
}

/// Commit-subject keyword patterns. Matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
  pub fix_pattern: String,
  pub revert_pattern: String,
  pub wip_pattern: String,
}

impl Default for KeywordConfig {
  fn default() -> Self {
    Self {
      fix_pattern: DEFAULT_FIX_PATTERN.into(),
      revert_pattern: DEFAULT_REVERT_PATTERN.into(),
      wip_pattern: DEFAULT_WIP_PATTERN.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
  /// Engine id: openai | anthropic | deepseek | google.
  pub engine: String,
  /// Never serialized; kept out of cache keys and any emitted document.
  #[serde(skip_serializing)]
  pub api_key: Option<String>,
  pub model: Option<String>,
  pub base_url: Option<String>,
  pub timeout_seconds: u64,
  /// Windows per batch request.
  pub batch_size: usize,
}

impl Default for AiConfig {
  fn default() -> Self {
    Self {
      engine: "openai".into(),
      api_key: None,
      model: None,
      base_url: None,
      timeout_seconds: 30,
      batch_size: 10,
    }
  }
}

impl AiConfig {
  /// True when a non-blank API key is configured.
  pub fn has_credential(&self) -> bool {
    self
      .api_key
      .as_deref()
      .map(|k| !k.trim().is_empty())
      .unwrap_or(false)
  }
}

impl Config {
  pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
    let config: Config = toml::from_str(raw).map_err(|e| EngineError::config(e.to_string()))?;
    Ok(config.resolved())
  }

  pub fn load(path: &Path) -> Result<Self, EngineError> {
    let raw = std::fs::read_to_string(path)
      .map_err(|e| EngineError::config(format!("cannot read {}: {}", path.display(), e)))?;
    Self::from_toml_str(&raw)
  }

  /// Replace invalid keyword patterns with the built-in defaults and clamp the batch size.
  ///
  /// An invalid pattern is not fatal: the provider keeps working with its default and a
  /// warning names the offending key.
  pub fn resolved(mut self) -> Self {
    let kw = &mut self.keywords;
    fallback_if_invalid("keywords.fix_pattern", &mut kw.fix_pattern, DEFAULT_FIX_PATTERN);
    fallback_if_invalid("keywords.revert_pattern", &mut kw.revert_pattern, DEFAULT_REVERT_PATTERN);
    fallback_if_invalid("keywords.wip_pattern", &mut kw.wip_pattern, DEFAULT_WIP_PATTERN);
    if self.ai.batch_size == 0 {
      self.ai.batch_size = 1;
    }
    self
  }
}

fn fallback_if_invalid(field: &str, pattern: &mut String, default: &str) {
  if let Err(e) = compile(pattern) {
    warn!(field, error = %e, "invalid keyword pattern, using built-in default");
    *pattern = default.to_string();
  }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
  RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Compiled keyword patterns, built once per analysis run.
#[derive(Debug, Clone)]
pub struct KeywordMatchers {
  pub fix: Regex,
  pub revert: Regex,
  pub wip: Regex,
}

impl KeywordMatchers {
  /// Compile the configured patterns, falling back per pattern to the built-in default.
  pub fn from_config(keywords: &KeywordConfig) -> Result<Self, EngineError> {
    Ok(Self {
      fix: compile_or_default(&keywords.fix_pattern, DEFAULT_FIX_PATTERN)?,
      revert: compile_or_default(&keywords.revert_pattern, DEFAULT_REVERT_PATTERN)?,
      wip: compile_or_default(&keywords.wip_pattern, DEFAULT_WIP_PATTERN)?,
    })
  }
}

fn compile_or_default(pattern: &str, default: &str) -> Result<Regex, EngineError> {
  match compile(pattern) {
    Ok(re) => Ok(re),
    Err(e) => {
      warn!(pattern, error = %e, "invalid keyword pattern, using built-in default");
      compile(default).map_err(|e| EngineError::config(format!("default pattern: {}", e)))
    }
  }
}
