//! Cached GitHub client that wraps the gateway with transparent caching.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use tracing::debug;

use crate::cache::CacheStorage;
use crate::error::Result;

use super::client::Gateway;
use super::types::{
  github_datetime_to_timestamp, PullRequestDetails, PullRequestFields, SearchRole, DETAIL_FIELDS,
  SEARCH_FIELDS,
};

/// TTL for role search results.
const SEARCH_TTL_SECONDS: i64 = 600;

/// Gateway client with transparent result caching.
///
/// Same API as the underlying gateway. The remote side is rate-limited, so
/// every query goes through the result cache; detail lookups pick a TTL tier
/// from how recently the PR last moved.
pub struct CachedGhClient<G: Gateway> {
  inner: G,
  cache: CacheStorage,
  user: String,
}

impl<G: Gateway> CachedGhClient<G> {
  pub fn new(inner: G, cache: CacheStorage, user: &str) -> Self {
    Self {
      inner,
      cache,
      user: user.to_string(),
    }
  }

  /// Fetch-or-populate one cache key. The cache transaction is held across
  /// the gateway call, so two refreshes cannot interleave their
  /// read-compute-write on the same key.
  async fn cached_fetch<T, F, Fut>(
    &self,
    key: &str,
    ttl_seconds: i64,
    use_cache: bool,
    fetch: F,
  ) -> Result<T>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let tx = self.cache.transact().await;

    if use_cache {
      if let Some(raw) = tx.get(key)? {
        debug!(key, ttl_seconds, "Using cached gateway result");
        return Ok(serde_json::from_slice(&raw)?);
      }
    } else {
      debug!(key, "Bypassing cache read");
      tx.remove(key)?;
    }

    debug!(key, ttl_seconds, "Querying gateway");
    let value = fetch().await?;
    if use_cache {
      tx.set(key, &serde_json::to_vec(&value)?, ttl_seconds)?;
    }
    Ok(value)
  }

  /// Search the user's open PRs for one role, cached.
  pub async fn search_prs(&self, role: SearchRole) -> Result<Vec<PullRequestFields>> {
    let key = format!("search.{}.{}.{}", role.as_str(), self.user, SEARCH_FIELDS);
    let inner = self.inner.clone();
    self
      .cached_fetch(&key, SEARCH_TTL_SECONDS, true, move || async move {
        inner.search_prs(role).await
      })
      .await
  }

  /// Detail lookup for the fields the search doesn't return.
  ///
  /// `updated_at` is the freshest known remote timestamp and selects the TTL
  /// tier. `use_cache = false` forces a gateway round trip and drops the
  /// stored entry, for callers that know the cached value just went stale.
  pub async fn view_pr(
    &self,
    url: &str,
    updated_at: &str,
    use_cache: bool,
  ) -> Result<PullRequestDetails> {
    let updated_seconds_ago = (Utc::now().timestamp() - github_datetime_to_timestamp(updated_at)?).abs();
    let key = format!("view.{url}.{DETAIL_FIELDS}");
    let inner = self.inner.clone();
    let url = url.to_string();
    self
      .cached_fetch(
        &key,
        detail_ttl_seconds(updated_seconds_ago),
        use_cache,
        move || async move { inner.view_pr(&url).await },
      )
      .await
  }

  /// Drop every cache entry referencing `url` (substring match).
  pub async fn invalidate_pr(&self, url: &str) -> Result<usize> {
    let tx = self.cache.transact().await;
    tx.invalidate_matching(url)
  }
}

/// Cache TTL tier for a detail lookup, by how long ago the PR last moved.
///
/// Items that have been quiet for a long time are unlikely to need fresh
/// data, which bounds call volume without making active items stale.
pub fn detail_ttl_seconds(updated_seconds_ago: i64) -> i64 {
  if updated_seconds_ago > 86_400 * 365 {
    14_400
  } else if updated_seconds_ago > 86_400 * 7 {
    3_600
  } else if updated_seconds_ago > 86_400 * 2 {
    1_800
  } else {
    600
  }
}
