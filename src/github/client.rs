//! Remote query gateway, driving the `gh` CLI.

use serde::de::DeserializeOwned;
use std::future::Future;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

use super::types::{PullRequestDetails, PullRequestFields, SearchRole, DETAIL_FIELDS, SEARCH_FIELDS};

/// Remote query capability the engine reconciles against.
///
/// The engine is generic over this seam so tests can substitute a scripted
/// gateway; the real implementation shells out to `gh`. Both operations may
/// fail or be slow, and a failure aborts the refresh cycle that issued it.
pub trait Gateway: Clone + Send + Sync {
  /// Search the user's open PRs for one role. Returns partial records; the
  /// search API doesn't support all fields.
  fn search_prs(
    &self,
    role: SearchRole,
  ) -> impl Future<Output = Result<Vec<PullRequestFields>>> + Send;

  /// Fetch the remaining per-PR fields not covered by the search.
  fn view_pr(&self, url: &str) -> impl Future<Output = Result<PullRequestDetails>> + Send;
}

/// Gateway implementation invoking the `gh` CLI.
#[derive(Clone)]
pub struct GhClient {
  user: String,
}

impl GhClient {
  pub fn new(user: &str) -> Self {
    Self {
      user: user.to_string(),
    }
  }

  async fn run_gh<T: DeserializeOwned>(&self, context: &str, args: &[&str]) -> Result<T> {
    debug!(context, "Running gh command");

    let output = Command::new("gh")
      .args(args)
      .output()
      .await
      .map_err(|e| Error::GatewayCallFailed {
        context: context.to_string(),
        message: format!("failed to spawn gh: {e}"),
      })?;

    if !output.status.success() {
      return Err(Error::GatewayCallFailed {
        context: context.to_string(),
        message: String::from_utf8_lossy(&output.stderr).into_owned(),
      });
    }

    serde_json::from_slice(&output.stdout).map_err(|e| Error::GatewayCallFailed {
      context: context.to_string(),
      message: format!("unparseable gh output: {e}"),
    })
  }
}

impl Gateway for GhClient {
  async fn search_prs(&self, role: SearchRole) -> Result<Vec<PullRequestFields>> {
    self
      .run_gh(
        &format!("search {} PRs", role.as_str()),
        &[
          "search",
          "prs",
          role.gh_flag(),
          &self.user,
          "--state",
          "open",
          "--json",
          SEARCH_FIELDS,
        ],
      )
      .await
  }

  async fn view_pr(&self, url: &str) -> Result<PullRequestDetails> {
    self
      .run_gh(
        &format!("view PR {url}"),
        &["pr", "view", url, "--json", DETAIL_FIELDS],
      )
      .await
  }
}
