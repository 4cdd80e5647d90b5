//! Mood Engine: a per-day "mood proxy" for a git repository.
//!
//! Plans daily windows, extracts commit-activity signals through pluggable providers,
//! normalizes them against the repository's own trailing baseline, scores each day with a
//! fixed rule table and optionally lets an LLM nudge the result within tight bounds.
//!
//! Heuristic only: it measures churn, fixes and reverts, not how anyone feels.

pub mod ai;
pub mod baseline;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod normalize;
pub mod repo;
pub mod score;
pub mod signals;
pub mod stats;
pub mod types;
pub mod window;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use repo::{GitRepoReader, RepoReader};
pub use signals::{ProviderRegistry, SignalProvider};
pub use types::{AnalysisRequest, AnalysisResult, MoodLabel, MoodResult};
