//! GitHub pull request types, shaped after the `gh` CLI `--json` output.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fields requested from `gh search prs --json`.
pub const SEARCH_FIELDS: &str = "author,repository,state,updatedAt,url,title";

/// Fields requested from `gh pr view --json`. The search API doesn't support
/// these, so they are fetched separately per PR.
pub const DETAIL_FIELDS: &str = "author,closed,state,updatedAt,title";

/// Which of the user's PRs a search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SearchRole {
  Authored,
  Assigned,
  ReviewRequested,
}

impl SearchRole {
  pub const ALL: [SearchRole; 3] = [
    SearchRole::Authored,
    SearchRole::Assigned,
    SearchRole::ReviewRequested,
  ];

  /// `gh search prs` flag selecting this role.
  pub fn gh_flag(self) -> &'static str {
    match self {
      SearchRole::Authored => "--author",
      SearchRole::Assigned => "--assignee",
      SearchRole::ReviewRequested => "--review-requested",
    }
  }

  /// Stable name used in cache keys and logs.
  pub fn as_str(self) -> &'static str {
    match self {
      SearchRole::Authored => "own",
      SearchRole::Assigned => "assigned",
      SearchRole::ReviewRequested => "review-requested",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
  pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name_with_owner: Option<String>,
}

/// Remote-owned snapshot of a pull request.
///
/// Overwritten wholesale on every refresh; the engine never mutates
/// individual fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestFields {
  pub url: String,
  pub title: String,
  pub author: Author,
  /// Only search results carry the repository; detail lookups keep the
  /// previously stored value.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub repository: Option<Repository>,
  /// `gh search prs` reports lowercase states, `gh pr view` uppercase.
  /// Always compare through the `is_*` accessors.
  pub state: String,
  #[serde(default)]
  pub closed: bool,
  pub updated_at: String,
}

impl PullRequestFields {
  /// Remote reports the PR merged and closed.
  pub fn is_merged_and_closed(&self) -> bool {
    self.state.eq_ignore_ascii_case("merged") && self.closed
  }

  /// Remote reports the PR closed without being merged.
  pub fn is_closed_not_merged(&self) -> bool {
    self.state.eq_ignore_ascii_case("closed") && self.closed
  }

  pub fn updated_timestamp(&self) -> Result<i64> {
    github_datetime_to_timestamp(&self.updated_at)
  }

  /// Overlay a detail lookup onto this snapshot. `url` and `repository` are
  /// not part of the detail field set and keep their current values.
  pub fn apply_details(&mut self, details: PullRequestDetails) {
    self.author = details.author;
    self.closed = details.closed;
    self.state = details.state;
    self.updated_at = details.updated_at;
    self.title = details.title;
  }
}

/// The per-PR fields not covered by the search (`gh pr view`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestDetails {
  pub author: Author,
  pub closed: bool,
  pub state: String,
  pub updated_at: String,
  pub title: String,
}

/// Parse GitHub's `2023-12-01T10:45:55Z` timestamp format into unix seconds.
pub fn github_datetime_to_timestamp(s: &str) -> Result<i64> {
  NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
    .map(|dt| dt.and_utc().timestamp())
    .map_err(|e| Error::BadTimestamp(format!("{s:?}: {e}")))
}
