//! Structured error types for the mood engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  /// Path missing or not inside a git repository. Fatal for the whole analysis.
  #[error("invalid repository: {path}: {reason}")]
  RepoInvalid { path: String, reason: String },

  #[error("git: {0}")]
  Git(#[from] git2::Error),

  /// A signal provider could not produce its signals for a window.
  #[error("provider {id}: {reason}")]
  Provider { id: String, reason: String },

  /// AI engine failure: missing credential, transport, HTTP status or malformed response.
  #[error("ai engine {engine}: {reason}")]
  Ai { engine: String, reason: String },

  #[error("config: {0}")]
  Config(String),

  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl EngineError {
  pub fn repo_invalid(path: impl Into<String>, reason: &str) -> Self {
    Self::RepoInvalid {
      path: path.into(),
      reason: reason.to_string(),
    }
  }

  pub fn provider(id: &str, reason: impl Into<String>) -> Self {
    Self::Provider {
      id: id.to_string(),
      reason: reason.into(),
    }
  }

  pub fn ai(engine: &str, reason: impl Into<String>) -> Self {
    Self::Ai {
      engine: engine.to_string(),
      reason: reason.into(),
    }
  }

  pub fn config(msg: impl Into<String>) -> Self {
    Self::Config(msg.into())
  }

  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}
