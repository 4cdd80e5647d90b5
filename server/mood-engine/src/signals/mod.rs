//! Pluggable signal extraction.
//!
//! Each provider turns a window's `RepoSnapshot` into a `SignalSet`. The registry runs them in
//! registration order and merges their output; a provider that fails contributes nothing and
//! leaves a `provider_skipped:<id>` confounder behind.

use std::path::Path;

use tracing::warn;

use crate::config::{Config, KeywordMatchers};
use crate::error::EngineError;
use crate::repo::RepoReader;
use crate::types::{confounder, RepoSnapshot, SignalSet};

pub mod change_shape;
pub mod commit_message;
pub mod follow_up;

pub use change_shape::ChangeShapeProvider;
pub use commit_message::CommitMessageProvider;
pub use follow_up::FollowUpFixProvider;

/// Everything a provider may read besides the snapshot itself.
#[derive(Clone, Copy)]
pub struct ProviderContext<'a> {
  pub repo_path: &'a Path,
  pub config: &'a Config,
  pub keywords: &'a KeywordMatchers,
  /// Absent when the provider must work from the snapshot alone.
  pub reader: Option<&'a dyn RepoReader>,
}

pub trait SignalProvider: Send + Sync {
  fn id(&self) -> &str;

  fn provide(&self, snapshot: &RepoSnapshot, ctx: &ProviderContext<'_>)
    -> Result<SignalSet, EngineError>;
}

/// Merged output of one registry pass.
#[derive(Debug, Clone)]
pub struct Collected {
  pub signals: SignalSet,
  pub confounders: Vec<String>,
}

/// Ordered, id-keyed provider list.
#[derive(Default)]
pub struct ProviderRegistry {
  providers: Vec<Box<dyn SignalProvider>>,
}

impl ProviderRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// change_shape, commit_message, follow_up_fix.
  pub fn with_defaults() -> Self {
    let mut registry = Self::new();
    registry.register(Box::new(ChangeShapeProvider));
    registry.register(Box::new(CommitMessageProvider));
    registry.register(Box::new(FollowUpFixProvider));
    registry
  }

  /// Add a provider. Re-registering an id replaces the earlier entry in place.
  pub fn register(&mut self, provider: Box<dyn SignalProvider>) {
    match self.providers.iter_mut().find(|p| p.id() == provider.id()) {
      Some(slot) => *slot = provider,
      None => self.providers.push(provider),
    }
  }

  pub fn ids(&self) -> Vec<String> {
    self.providers.iter().map(|p| p.id().to_string()).collect()
  }

  pub fn len(&self) -> usize {
    self.providers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.providers.is_empty()
  }

  /// Run every provider against `snapshot`, isolating failures.
  pub fn collect(&self, snapshot: &RepoSnapshot, ctx: &ProviderContext<'_>) -> Collected {
    let mut signals = SignalSet::new(snapshot.window.label.clone());
    let mut confounders: Vec<String> = Vec::new();

    for provider in &self.providers {
      match provider.provide(snapshot, ctx) {
        Ok(set) => signals = signals.merge(set),
        Err(e) => {
          warn!(
            provider = provider.id(),
            window = %snapshot.window.label,
            error = %e,
            "signal provider failed, skipping"
          );
          let flag = confounder::provider_skipped(provider.id());
          if !confounders.contains(&flag) {
            confounders.push(flag);
          }
        }
      }
    }

    Collected {
      signals,
      confounders,
    }
  }
}


#[cfg(test)]
mod tests {
  use super::test_support::*;
  use super::*;

  fn run(registry: &ProviderRegistry) -> Collected {
    let config = Config::default();
    let keywords = matchers();
    let ctx = ProviderContext {
      repo_path: Path::new("."),
      config: &config,
      keywords: &keywords,
      reader: None,
    };
    registry.collect(&RepoSnapshot::empty(window()), &ctx)
  }

  #[test]
  fn defaults_are_registered_in_order() {
    let registry = ProviderRegistry::with_defaults();
    assert_eq!(
      registry.ids(),
      vec!["change_shape", "commit_message", "follow_up_fix"]
    );
  }

  #[test]
  fn re_registering_overwrites_in_place() {
    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(StaticProvider { id: "a", signals: vec![("x", 1.0)] }));
    registry.register(Box::new(StaticProvider { id: "b", signals: vec![("y", 2.0)] }));
    registry.register(Box::new(StaticProvider { id: "a", signals: vec![("x", 9.0)] }));

    assert_eq!(registry.ids(), vec!["a", "b"]);
    let collected = run(&registry);
    assert_eq!(collected.signals.number("x"), Some(9.0));
  }

  #[test]
  fn failing_provider_is_skipped_without_losing_others() {
    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(StaticProvider { id: "a", signals: vec![("x", 1.0)] }));
    registry.register(Box::new(FailingProvider("broken")));
    registry.register(Box::new(StaticProvider { id: "c", signals: vec![("z", 3.0)] }));

    let collected = run(&registry);
    assert_eq!(collected.signals.number("x"), Some(1.0));
    assert_eq!(collected.signals.number("z"), Some(3.0));
    assert_eq!(collected.confounders, vec!["provider_skipped:broken"]);

    // A second pass starts clean.
    let again = run(&registry);
    assert_eq!(again.confounders, vec!["provider_skipped:broken"]);
  }

  #[test]
  fn later_providers_win_on_key_collision() {
    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(StaticProvider { id: "a", signals: vec![("k", 1.0)] }));
    registry.register(Box::new(StaticProvider { id: "b", signals: vec![("k", 2.0)] }));
    let collected = run(&registry);
    assert_eq!(collected.signals.number("k"), Some(2.0));
    assert_eq!(collected.signals.window_label, "2024-01-15");
  }

  #[test]
  fn default_providers_on_empty_window() {
    let collected = run(&ProviderRegistry::with_defaults());
    assert!(collected.confounders.is_empty());
    assert_eq!(collected.signals.number("change.churn"), Some(0.0));
    assert_eq!(collected.signals.number("msg.fix_ratio"), Some(0.0));
    assert_eq!(collected.signals.number("followup.fix_density"), Some(0.0));
    assert_eq!(collected.signals.number("followup.horizon_days"), Some(3.0));
  }
}
