//! Repository access: the `RepoReader` seam and its `git2` implementation.

use std::path::Path;

use chrono::{DateTime, FixedOffset};
use git2::{Commit, ErrorCode, Oid, Repository, Sort};
use tracing::debug;

use crate::error::EngineError;
use crate::types::{AnalysisWindow, CommitInfo, RepoSnapshot};
use crate::window::utc;

/// Read-only view of a repository's history.
pub trait RepoReader: Send + Sync {
  /// Fails with `RepoInvalid` when `path` is missing or not inside a repository.
  fn validate(&self, path: &Path) -> Result<(), EngineError>;

  /// Commits authored inside `window`, newest first.
  ///
  /// Implementations may stop walking once history is clearly older than the window. In
  /// `GitRepoReader`, a commit reachable only through more than [`SKEW_LOOKAHEAD`] consecutive
  /// older-dated commits is missed.
  fn list_commits(
    &self,
    path: &Path,
    window: &AnalysisWindow,
    author: Option<&str>,
    branch: Option<&str>,
  ) -> Result<Vec<CommitInfo>, EngineError>;

  fn build_snapshot(
    &self,
    path: &Path,
    window: &AnalysisWindow,
    author: Option<&str>,
    branch: Option<&str>,
  ) -> Result<RepoSnapshot, EngineError> {
    let commits = self.list_commits(path, window, author, branch)?;
    Ok(RepoSnapshot::from_commits(window.clone(), commits))
  }
}

/// Consecutive commits older than the window tolerated before the walk stops.
pub const SKEW_LOOKAHEAD: usize = 32;

/// Reads history straight from the object database. No `git` binary involved.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitRepoReader;

impl GitRepoReader {
  pub fn new() -> Self {
    Self
  }

  fn open(path: &Path) -> Result<Repository, EngineError> {
    Repository::discover(path)
      .map_err(|_| EngineError::repo_invalid(path.display().to_string(), "not a git repository"))
  }

  /// Tip to walk from: the revspec when given, else HEAD. `None` for an unborn HEAD.
  fn tip(repo: &Repository, branch: Option<&str>) -> Result<Option<Oid>, EngineError> {
    if let Some(spec) = branch {
      let commit = repo.revparse_single(spec)?.peel_to_commit()?;
      return Ok(Some(commit.id()));
    }
    match repo.head() {
      Ok(head) => Ok(head.target()),
      Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  fn commit_info(repo: &Repository, commit: &Commit<'_>) -> Result<CommitInfo, EngineError> {
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
      Some(commit.parent(0)?.tree()?)
    } else {
      None
    };

    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    let stats = diff.stats()?;

    let files = diff
      .deltas()
      .filter_map(|delta| {
        delta
          .new_file()
          .path()
          .or_else(|| delta.old_file().path())
          .map(|p| p.to_string_lossy().into_owned())
      })
      .collect();

    let author = commit.author();
    Ok(CommitInfo {
      hash: commit.id().to_string(),
      author_name: author.name().unwrap_or_default().to_string(),
      author_email: author.email().unwrap_or_default().to_string(),
      authored_at: to_datetime(author.when()),
      subject: commit.summary().unwrap_or_default().to_string(),
      insertions: stats.insertions() as u64,
      deletions: stats.deletions() as u64,
      files,
    })
  }
}

impl RepoReader for GitRepoReader {
  fn validate(&self, path: &Path) -> Result<(), EngineError> {
    if !path.exists() {
      return Err(EngineError::repo_invalid(
        path.display().to_string(),
        "path does not exist",
      ));
    }
    let repo = Self::open(path)?;
    if repo.is_bare() {
      return Err(EngineError::repo_invalid(
        path.display().to_string(),
        "bare repositories are not supported",
      ));
    }
    Ok(())
  }

  fn list_commits(
    &self,
    path: &Path,
    window: &AnalysisWindow,
    author: Option<&str>,
    branch: Option<&str>,
  ) -> Result<Vec<CommitInfo>, EngineError> {
    let repo = Self::open(path)?;
    let tip = match Self::tip(&repo, branch)? {
      Some(oid) => oid,
      None => return Ok(Vec::new()),
    };

    let mut revwalk = repo.revwalk()?;
    revwalk.push(tip)?;
    revwalk.set_sorting(Sort::TIME)?;

    let author_filter = author.map(|a| a.to_lowercase());
    let mut commits = Vec::new();
    let mut stale = 0usize;

    for oid in revwalk {
      let commit = repo.find_commit(oid?)?;

      // Walk is committer-time ordered. A skewed commit older than the window may still have
      // in-window ancestors, so only a run of stale commits ends the walk.
      if commit.time().seconds() < window.start.timestamp() {
        stale += 1;
        if stale > SKEW_LOOKAHEAD {
          break;
        }
        continue;
      }
      stale = 0;

      let authored_at = to_datetime(commit.author().when());
      if !window.contains(&authored_at) {
        continue;
      }

      if let Some(needle) = &author_filter {
        let sig = commit.author();
        let name = sig.name().unwrap_or_default().to_lowercase();
        let email = sig.email().unwrap_or_default().to_lowercase();
        if !name.contains(needle.as_str()) && !email.contains(needle.as_str()) {
          continue;
        }
      }

      commits.push(Self::commit_info(&repo, &commit)?);
    }

    debug!(window = %window.label, commits = commits.len(), "listed commits");
    Ok(commits)
  }
}

fn to_datetime(time: git2::Time) -> DateTime<FixedOffset> {
  let offset = FixedOffset::east_opt(time.offset_minutes() * 60).unwrap_or_else(utc);
  DateTime::from_timestamp(time.seconds(), 0)
    .unwrap_or_default()
    .with_timezone(&offset)
}
