//! Status reconciliation engine.
//!
//! Merges gateway results into the item store and drives the triage state
//! machine. Each merge or mutation is one atomic store transaction: it either
//! fully applies (fields updated, invariant validated, persisted) or not at
//! all. A gateway failure aborts the refresh cycle; merges committed earlier
//! in the same cycle stay committed.

use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::github::cached_client::CachedGhClient;
use crate::github::client::Gateway;
use crate::github::types::{PullRequestFields, SearchRole};

use super::item::{validate_identifier, ReviewItem, WorkboardFields};
use super::status::ReviewStatus;
use super::store::ItemStore;

/// Soft-deleted records are physically removed this long after deletion.
const DELETE_AFTER_SECONDS: i64 = 86_400 * 30;
/// How long a reviewed PR may stay unmerged before it pops back up.
const BRING_BACK_TO_REVIEW_SECONDS: i64 = 3_600 * 4;
/// Length of a timed snooze.
const SNOOZE_SECONDS: i64 = 86_400;

/// Time source seam; the state machine is driven by explicit timestamps so
/// its transitions stay testable.
pub trait Clock: Send + Sync {
  fn now_ts(&self) -> i64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_ts(&self) -> i64 {
    Utc::now().timestamp()
  }
}

pub struct Engine<G: Gateway> {
  gh: CachedGhClient<G>,
  store: ItemStore,
  clock: Box<dyn Clock>,
}

/// Guard a user-supplied PR URL before any state is touched.
fn validate_action_url(url: &str) -> Result<()> {
  if url.len() > 300 {
    return Err(Error::InvalidInput(format!(
      "PR URL longer than 300 characters: {url:.50}..."
    )));
  }
  validate_identifier(url)
}

impl<G: Gateway> Engine<G> {
  pub fn new(gh: CachedGhClient<G>, store: ItemStore) -> Self {
    Self {
      gh,
      store,
      clock: Box::new(SystemClock),
    }
  }

  #[allow(dead_code)]
  pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// One full refresh cycle, followed by the ordered, render-ready view.
  pub async fn refresh_and_list(&self) -> Result<Vec<ReviewItem>> {
    let mut seen = BTreeSet::new();

    for role in SearchRole::ALL {
      let results = self.gh.search_prs(role).await?;
      debug!(
        role = role.as_str(),
        count = results.len(),
        "Search returned PRs"
      );
      for pr in results {
        if seen.contains(&pr.url) {
          continue;
        }
        let url = pr.url.clone();
        self.fetch_details_and_merge(pr, true).await?;
        seen.insert(url);
      }
    }

    // PRs absent from every search (typically merged or closed by now) keep
    // reconciling until their lifecycle ends, so a merge is still detected
    // without re-querying every known PR remotely. The record set iterates
    // in identifier order, keeping cycles reproducible.
    let stored: Vec<(String, PullRequestFields)> = {
      let tx = self.store.transact()?;
      tx.records()?
        .into_iter()
        .map(|(url, item)| (url, item.github_fields))
        .collect()
    };
    for (url, fields) in stored {
      if seen.contains(&url) {
        continue;
      }
      self.fetch_details_and_merge(fields, true).await?;
      seen.insert(url);
    }

    self.list()
  }

  /// The sorted, soft-delete-filtered view of the record set.
  ///
  /// PRs with the latest remote changes are displayed on top, grouped by
  /// status priority; records lacking a local `last_change` use `i64::MAX`
  /// as the tie-break sentinel.
  pub fn list(&self) -> Result<Vec<ReviewItem>> {
    let records = {
      let tx = self.store.transact()?;
      tx.records()?
    };

    let mut items = Vec::with_capacity(records.len());
    for item in records
      .into_values()
      .filter(|item| item.workboard_fields.status != ReviewStatus::Deleted)
    {
      let updated = item.github_fields.updated_timestamp()?;
      items.push((updated, item));
    }

    items.sort_by_key(|(updated, item)| {
      (
        item.workboard_fields.status.sort_priority(),
        std::cmp::Reverse(*updated),
        std::cmp::Reverse(item.workboard_fields.last_change.unwrap_or(i64::MAX)),
      )
    });

    Ok(items.into_iter().map(|(_, item)| item).collect())
  }

  /// URL of the PR the user last acted on, if any.
  pub fn last_selected(&self) -> Result<Option<String>> {
    let tx = self.store.transact()?;
    tx.last_selected()
  }

  /// Fetch the fields the search doesn't cover, then merge. The gateway
  /// round trip completes before the record-set transaction opens, so no
  /// store lock is held while waiting on the remote side.
  async fn fetch_details_and_merge(
    &self,
    mut fields: PullRequestFields,
    use_cache: bool,
  ) -> Result<()> {
    let bypass = {
      let tx = self.store.transact()?;
      tx.avoid_cache(&fields.url)?
    };

    let details = self
      .gh
      .view_pr(&fields.url, &fields.updated_at, use_cache && !bypass)
      .await?;
    fields.apply_details(details);
    self.merge(fields)
  }

  /// Merge one remote snapshot into the store: one atomic transaction from
  /// load to persist.
  fn merge(&self, fields: PullRequestFields) -> Result<()> {
    let now = self.clock.now_ts();
    let tx = self.store.transact()?;
    let mut records = tx.records()?;

    let url = fields.url.clone();
    let entry = records.entry(url.clone()).or_insert_with(|| ReviewItem {
      github_fields: fields.clone(),
      workboard_fields: WorkboardFields::new(ReviewStatus::Unknown, None),
    });
    entry.github_fields = fields;
    if entry.workboard_fields.last_change.is_none() {
      // First observation: order by the remote's own timestamp until a
      // local transition happens.
      entry.workboard_fields.last_change = Some(entry.github_fields.updated_timestamp()?);
    }

    advance_status(&url, entry, now);

    if entry.workboard_fields.status == ReviewStatus::Deleted
      && entry
        .workboard_fields
        .delete_after
        .is_some_and(|t| t <= now)
    {
      info!(url = url.as_str(), "Deleting PR from the record set");
      records.remove(&url);
    }

    tx.put_records(&records)
  }

  /// Mark a PR as needing the user's review.
  pub fn mark_must_review(&self, url: &str) -> Result<()> {
    info!(url, "Marking PR as must-review");
    self.mutate(url, |wb, now| {
      wb.set_status(ReviewStatus::MustReview, now);
    })
  }

  /// Mark a PR as reviewed and expected to merge. If it merges it is removed
  /// from the board; if it is still unmerged after the deadline it comes
  /// back as must-review.
  pub fn mark_reviewed_delete_on_merge(&self, url: &str) -> Result<()> {
    info!(url, "Marking PR as reviewed-delete-on-merge");
    self.mutate(url, |wb, now| {
      wb.set_status(ReviewStatus::ReviewedDeleteOnMerge, now);
      wb.bring_back_to_review_if_not_merged_until = Some(now + BRING_BACK_TO_REVIEW_SECONDS);
    })
  }

  /// Hide a PR until someone mentions the user.
  pub fn snooze_until_mentioned(&self, url: &str) -> Result<()> {
    info!(url, "Snoozing PR until user is mentioned");
    self.mutate(url, |wb, now| {
      wb.set_status(ReviewStatus::SnoozedUntilMentioned, now);
    })
  }

  /// Hide a PR for one day.
  pub fn snooze_until_time(&self, url: &str) -> Result<()> {
    info!(url, "Snoozing PR for 1 day");
    self.mutate(url, |wb, now| {
      wb.set_status(ReviewStatus::SnoozedUntilTime, now);
      wb.snooze_until = Some(now + SNOOZE_SECONDS);
    })
  }

  /// Soft-delete a PR.
  ///
  /// The record cannot simply be removed: a cached search result may re-add
  /// it on the next refresh. The status is updated instead and the entry is
  /// physically removed once `delete_after` passes.
  pub fn delete(&self, url: &str) -> Result<()> {
    info!(url, "Marking PR as deleted");
    self.mutate(url, |wb, now| {
      wb.set_status(ReviewStatus::Deleted, now);
      wb.delete_after = Some(now + DELETE_AFTER_SECONDS);
    })
  }

  /// Hide a PR until the remote sees another update.
  ///
  /// The PR is refetched without the cache first: the user's own action just
  /// changed `updatedAt`, and snoozing against a stale snapshot would make
  /// the snooze immediately look expired.
  pub async fn snooze_until_update(&self, url: &str) -> Result<()> {
    validate_action_url(url)?;

    let fields = {
      let tx = self.store.transact()?;
      let records = tx.records()?;
      records
        .get(url)
        .ok_or_else(|| Error::RecordNotFound {
          url: url.to_string(),
        })?
        .github_fields
        .clone()
    };
    self.fetch_details_and_merge(fields, false).await?;

    let now = self.clock.now_ts();
    let tx = self.store.transact()?;
    let mut records = tx.records()?;
    let item = records.get_mut(url).ok_or_else(|| Error::RecordNotFound {
      url: url.to_string(),
    })?;

    let snapshot = item.github_fields.updated_at.clone();
    info!(
      url,
      snapshot = snapshot.as_str(),
      "Snoozing PR until updatedAt changes"
    );
    item
      .workboard_fields
      .set_status(ReviewStatus::SnoozedUntilUpdate, now);
    item.workboard_fields.snooze_until_updated_at_changed_from = Some(snapshot);

    tx.put_records(&records)?;
    tx.set_last_selected(url)
  }

  /// The user just changed the PR remotely (commented, pushed, merged, ...):
  /// drop every cache entry mentioning it and bypass the cache on the next
  /// few detail fetches so upcoming refreshes see the latest state.
  pub async fn mark_touched(&self, url: &str) -> Result<()> {
    validate_action_url(url)?;
    info!(url, "Uncaching PR so upcoming refreshes fetch fresh state");

    self.gh.invalidate_pr(url).await?;

    let tx = self.store.transact()?;
    tx.set_avoid_cache(url)?;
    tx.set_last_selected(url)
  }

  fn mutate(&self, url: &str, apply: impl FnOnce(&mut WorkboardFields, i64)) -> Result<()> {
    validate_action_url(url)?;

    let now = self.clock.now_ts();
    let tx = self.store.transact()?;
    let mut records = tx.records()?;
    let item = records.get_mut(url).ok_or_else(|| Error::RecordNotFound {
      url: url.to_string(),
    })?;

    apply(&mut item.workboard_fields, now);

    tx.put_records(&records)?;
    tx.set_last_selected(url)
  }
}

/// Advance a record through the refresh-pass state machine.
///
/// Checks run in fixed order; a later check can override an earlier one
/// within the same pass.
fn advance_status(url: &str, item: &mut ReviewItem, now: i64) {
  let gh = &item.github_fields;
  let wb = &mut item.workboard_fields;

  if gh.is_merged_and_closed()
    && !matches!(wb.status, ReviewStatus::Deleted | ReviewStatus::Merged)
  {
    if wb.status == ReviewStatus::ReviewedDeleteOnMerge {
      info!(url, "PR was merged after review, scheduling removal");
      wb.set_status(ReviewStatus::Deleted, now);
      wb.delete_after = Some(now + DELETE_AFTER_SECONDS);
    } else {
      info!(url, "Marking PR as merged");
      wb.set_status(ReviewStatus::Merged, now);
    }
  }

  if wb.status == ReviewStatus::ReviewedDeleteOnMerge
    && wb
      .bring_back_to_review_if_not_merged_until
      .is_some_and(|t| t <= now)
  {
    info!(url, "PR was not merged in time, bringing it back to review");
    wb.set_status(ReviewStatus::MustReview, now);
  }

  if gh.is_closed_not_merged()
    && !matches!(wb.status, ReviewStatus::Deleted | ReviewStatus::Closed)
  {
    info!(url, "Marking PR as closed");
    wb.set_status(ReviewStatus::Closed, now);
  }

  if wb.status == ReviewStatus::SnoozedUntilTime && wb.snooze_until.is_some_and(|t| t <= now) {
    info!(url, "Snooze time passed, unsnoozing PR");
    wb.set_status(ReviewStatus::MustReview, now);
  }

  if wb.status == ReviewStatus::SnoozedUntilUpdate {
    if let Some(snapshot) = &wb.snooze_until_updated_at_changed_from {
      if *snapshot != gh.updated_at {
        info!(
          url,
          from = snapshot.as_str(),
          to = gh.updated_at.as_str(),
          "Snoozed PR was updated, unsnoozing it"
        );
        wb.set_status(ReviewStatus::UpdatedAfterSnooze, now);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheStorage;
  use crate::db::Database;
  use crate::github::types::{Author, PullRequestDetails, Repository};
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicI64, Ordering};
  use std::sync::{Arc, Mutex};

  const BASE_TS: i64 = 1_701_427_555; // 2023-12-01T10:45:55Z
  const DAY: i64 = 86_400;

  fn ts_string(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
      .unwrap()
      .format("%Y-%m-%dT%H:%M:%SZ")
      .to_string()
  }

  fn search_fields(url: &str, updated_at: &str) -> PullRequestFields {
    PullRequestFields {
      url: url.to_string(),
      title: "A change".to_string(),
      author: Author {
        login: "octocat".to_string(),
      },
      repository: Some(Repository {
        name: "widgets".to_string(),
        name_with_owner: Some("acme/widgets".to_string()),
      }),
      state: "open".to_string(),
      closed: false,
      updated_at: updated_at.to_string(),
    }
  }

  #[derive(Default)]
  struct FakeState {
    search: BTreeMap<&'static str, Vec<PullRequestFields>>,
    details: BTreeMap<String, PullRequestDetails>,
    view_calls: Vec<String>,
    fail_view: BTreeSet<String>,
  }

  #[derive(Clone, Default)]
  struct FakeGateway {
    state: Arc<Mutex<FakeState>>,
  }

  impl FakeGateway {
    fn add_open_pr(&self, role: SearchRole, url: &str, updated_ts: i64) {
      let updated_at = ts_string(updated_ts);
      let mut state = self.state.lock().unwrap();
      state
        .search
        .entry(role.as_str())
        .or_default()
        .push(search_fields(url, &updated_at));
      state.details.insert(
        url.to_string(),
        PullRequestDetails {
          author: Author {
            login: "octocat".to_string(),
          },
          closed: false,
          state: "OPEN".to_string(),
          updated_at,
          title: "A change".to_string(),
        },
      );
    }

    fn set_remote_state(&self, url: &str, remote_state: &str, closed: bool, updated_ts: i64) {
      let mut state = self.state.lock().unwrap();
      let details = state.details.get_mut(url).unwrap();
      details.state = remote_state.to_string();
      details.closed = closed;
      details.updated_at = ts_string(updated_ts);
    }

    fn clear_searches(&self) {
      self.state.lock().unwrap().search.clear();
    }

    fn add_details_only(&self, url: &str, remote_state: &str, closed: bool, updated_ts: i64) {
      self.state.lock().unwrap().details.insert(
        url.to_string(),
        PullRequestDetails {
          author: Author {
            login: "octocat".to_string(),
          },
          closed,
          state: remote_state.to_string(),
          updated_at: ts_string(updated_ts),
          title: "A change".to_string(),
        },
      );
    }

    fn fail_view(&self, url: &str) {
      self.state.lock().unwrap().fail_view.insert(url.to_string());
    }

    fn view_calls(&self) -> Vec<String> {
      self.state.lock().unwrap().view_calls.clone()
    }
  }

  impl Gateway for FakeGateway {
    async fn search_prs(&self, role: SearchRole) -> Result<Vec<PullRequestFields>> {
      let state = self.state.lock().unwrap();
      Ok(state.search.get(role.as_str()).cloned().unwrap_or_default())
    }

    async fn view_pr(&self, url: &str) -> Result<PullRequestDetails> {
      let mut state = self.state.lock().unwrap();
      state.view_calls.push(url.to_string());
      if state.fail_view.contains(url) {
        return Err(Error::GatewayCallFailed {
          context: format!("view PR {url}"),
          message: "boom".to_string(),
        });
      }
      state
        .details
        .get(url)
        .cloned()
        .ok_or_else(|| Error::GatewayCallFailed {
          context: format!("view PR {url}"),
          message: "no such PR".to_string(),
        })
    }
  }

  #[derive(Clone)]
  struct ManualClock(Arc<AtomicI64>);

  impl Clock for ManualClock {
    fn now_ts(&self) -> i64 {
      self.0.load(Ordering::SeqCst)
    }
  }

  struct TestBoard {
    _dir: tempfile::TempDir,
    gateway: FakeGateway,
    clock: Arc<AtomicI64>,
    engine: Engine<FakeGateway>,
    // Second handle onto the same database file, for inspecting records the
    // list view filters out.
    inspect: ItemStore,
  }

  impl TestBoard {
    fn now(&self) -> i64 {
      self.clock.load(Ordering::SeqCst)
    }

    fn advance(&self, seconds: i64) {
      self.clock.fetch_add(seconds, Ordering::SeqCst);
    }

    fn stored(&self, url: &str) -> Option<ReviewItem> {
      let tx = self.inspect.transact().unwrap();
      tx.records().unwrap().get(url).cloned()
    }
  }

  fn board() -> TestBoard {
    let dir = tempfile::tempdir().unwrap();
    let gateway = FakeGateway::default();
    let clock = Arc::new(AtomicI64::new(BASE_TS + DAY));

    let cache = CacheStorage::open(dir.path()).unwrap();
    let store = ItemStore::new(Database::open(dir.path()).unwrap());
    let gh = CachedGhClient::new(gateway.clone(), cache, "octocat");
    let engine =
      Engine::new(gh, store).with_clock(Box::new(ManualClock(clock.clone())));

    let inspect = ItemStore::new(Database::open(dir.path()).unwrap());
    TestBoard {
      _dir: dir,
      gateway,
      clock,
      engine,
      inspect,
    }
  }

  const URL: &str = "https://github.com/acme/widgets/pull/1";

  #[tokio::test]
  async fn first_observation_starts_unknown() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);

    let items = board.engine.refresh_and_list().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].workboard_fields.status, ReviewStatus::Unknown);
    // Ordered by the remote's own timestamp until a local transition happens.
    assert_eq!(items[0].workboard_fields.last_change, Some(BASE_TS));
  }

  #[tokio::test]
  async fn pr_in_several_roles_is_merged_once_per_cycle() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);
    board.gateway.add_open_pr(SearchRole::Assigned, URL, BASE_TS);

    board.engine.refresh_and_list().await.unwrap();
    assert_eq!(board.gateway.view_calls(), vec![URL.to_string()]);
  }

  #[tokio::test]
  async fn refreshing_twice_changes_nothing() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);

    let first = board.engine.refresh_and_list().await.unwrap();
    let second = board.engine.refresh_and_list().await.unwrap();
    assert_eq!(first, second);
  }

  #[tokio::test]
  async fn merged_pr_transitions_to_merged() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);
    board.engine.refresh_and_list().await.unwrap();

    board
      .gateway
      .set_remote_state(URL, "MERGED", true, BASE_TS + DAY);
    board.engine.mark_touched(URL).await.unwrap();
    let items = board.engine.refresh_and_list().await.unwrap();

    assert_eq!(items[0].workboard_fields.status, ReviewStatus::Merged);
    assert_eq!(items[0].workboard_fields.last_change, Some(board.now()));
  }

  #[tokio::test]
  async fn closed_pr_transitions_to_closed() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::ReviewRequested, URL, BASE_TS);
    board.engine.refresh_and_list().await.unwrap();

    board
      .gateway
      .set_remote_state(URL, "CLOSED", true, BASE_TS + DAY);
    board.engine.mark_touched(URL).await.unwrap();
    let items = board.engine.refresh_and_list().await.unwrap();

    assert_eq!(items[0].workboard_fields.status, ReviewStatus::Closed);
  }

  #[tokio::test]
  async fn reviewed_pr_is_soft_deleted_on_merge_then_swept() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);
    board.engine.refresh_and_list().await.unwrap();

    board.engine.mark_reviewed_delete_on_merge(URL).unwrap();
    board
      .gateway
      .set_remote_state(URL, "MERGED", true, BASE_TS + DAY);
    board.engine.mark_touched(URL).await.unwrap();

    let items = board.engine.refresh_and_list().await.unwrap();
    assert!(items.is_empty(), "soft-deleted PRs must not render");

    let stored = board.stored(URL).unwrap();
    assert_eq!(stored.workboard_fields.status, ReviewStatus::Deleted);
    assert_eq!(
      stored.workboard_fields.delete_after,
      Some(board.now() + 2_592_000)
    );

    // Once delete_after passes and the PR is revisited (it no longer shows
    // up in any open search), the record is physically removed.
    board.gateway.clear_searches();
    board.advance(30 * DAY + 1);
    board.engine.refresh_and_list().await.unwrap();
    assert!(board.stored(URL).is_none());
  }

  #[tokio::test]
  async fn unmerged_reviewed_pr_comes_back_after_deadline() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);
    board.engine.refresh_and_list().await.unwrap();

    board.engine.mark_reviewed_delete_on_merge(URL).unwrap();
    board.advance(4 * 3_600 + 1);
    let items = board.engine.refresh_and_list().await.unwrap();

    assert_eq!(items[0].workboard_fields.status, ReviewStatus::MustReview);
    assert_eq!(
      items[0]
        .workboard_fields
        .bring_back_to_review_if_not_merged_until,
      None
    );
  }

  #[tokio::test]
  async fn timed_snooze_expires_into_must_review() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);
    board.engine.refresh_and_list().await.unwrap();

    board.engine.snooze_until_time(URL).unwrap();
    let stored = board.stored(URL).unwrap();
    assert_eq!(
      stored.workboard_fields.snooze_until,
      Some(board.now() + DAY)
    );

    // Still snoozed right before the deadline.
    board.advance(DAY - 1);
    let items = board.engine.refresh_and_list().await.unwrap();
    assert_eq!(
      items[0].workboard_fields.status,
      ReviewStatus::SnoozedUntilTime
    );

    board.advance(2);
    let items = board.engine.refresh_and_list().await.unwrap();
    assert_eq!(items[0].workboard_fields.status, ReviewStatus::MustReview);
    assert_eq!(items[0].workboard_fields.snooze_until, None);
  }

  #[tokio::test]
  async fn update_snooze_takes_a_fresh_snapshot_and_waits_for_changes() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);
    board.engine.refresh_and_list().await.unwrap();

    // Snoozing must refetch the PR bypassing the cache; the detail lookup
    // was cached by the refresh, so a second gateway call proves the bypass.
    let calls_before = board.gateway.view_calls().len();
    board.engine.snooze_until_update(URL).await.unwrap();
    assert_eq!(board.gateway.view_calls().len(), calls_before + 1);

    let stored = board.stored(URL).unwrap();
    assert_eq!(
      stored.workboard_fields.status,
      ReviewStatus::SnoozedUntilUpdate
    );
    assert_eq!(
      stored.workboard_fields.snooze_until_updated_at_changed_from,
      Some(ts_string(BASE_TS))
    );

    // Same updatedAt on the next refresh: stays snoozed.
    let items = board.engine.refresh_and_list().await.unwrap();
    assert_eq!(
      items[0].workboard_fields.status,
      ReviewStatus::SnoozedUntilUpdate
    );

    // A remote update ends the snooze.
    board
      .gateway
      .set_remote_state(URL, "OPEN", false, BASE_TS + 2 * DAY);
    board.engine.mark_touched(URL).await.unwrap();
    let items = board.engine.refresh_and_list().await.unwrap();
    assert_eq!(
      items[0].workboard_fields.status,
      ReviewStatus::UpdatedAfterSnooze
    );
    assert_eq!(
      items[0].workboard_fields.snooze_until_updated_at_changed_from,
      None
    );
  }

  #[tokio::test]
  async fn missing_prs_keep_reconciling() {
    let board = board();

    // A PR known locally but absent from every open search (it merged a
    // while ago). The sweep must still fetch its details and advance it.
    let mut records = crate::workboard::item::RecordSet::new();
    records.insert(
      URL.to_string(),
      ReviewItem {
        github_fields: search_fields(URL, &ts_string(BASE_TS)),
        workboard_fields: WorkboardFields::new(ReviewStatus::Unknown, Some(BASE_TS)),
      },
    );
    {
      let tx = board.inspect.transact().unwrap();
      tx.put_records(&records).unwrap();
    }
    board.gateway.add_details_only(URL, "MERGED", true, BASE_TS + DAY);

    let items = board.engine.refresh_and_list().await.unwrap();
    assert_eq!(items[0].workboard_fields.status, ReviewStatus::Merged);
    assert_eq!(board.gateway.view_calls(), vec![URL.to_string()]);
  }

  #[tokio::test]
  async fn gateway_failure_aborts_cycle_but_keeps_earlier_merges() {
    let board = board();
    let other = "https://github.com/acme/widgets/pull/2";
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);
    board.gateway.add_open_pr(SearchRole::Authored, other, BASE_TS);
    board.gateway.fail_view(other);

    let err = board.engine.refresh_and_list().await.unwrap_err();
    assert!(matches!(err, Error::GatewayCallFailed { .. }));

    // The first PR's merge committed before the failure and stays.
    assert!(board.stored(URL).is_some());
    assert!(board.stored(other).is_none());
  }

  #[tokio::test]
  async fn mutations_on_unknown_prs_fail_cleanly() {
    let board = board();
    assert!(matches!(
      board.engine.mark_must_review(URL),
      Err(Error::RecordNotFound { .. })
    ));
    assert!(matches!(
      board.engine.delete("github.com/no/scheme"),
      Err(Error::InvalidInput(_))
    ));
  }

  #[tokio::test]
  async fn mutations_record_the_last_selected_pr() {
    let board = board();
    board.gateway.add_open_pr(SearchRole::Authored, URL, BASE_TS);
    board.engine.refresh_and_list().await.unwrap();

    assert_eq!(board.engine.last_selected().unwrap(), None);
    board.engine.mark_must_review(URL).unwrap();
    assert_eq!(board.engine.last_selected().unwrap(), Some(URL.to_string()));
  }

  #[tokio::test]
  async fn list_orders_by_priority_then_recency() {
    let board = board();
    let merged = "https://github.com/acme/widgets/pull/1";
    let review_old = "https://github.com/acme/widgets/pull/2";
    let review_new = "https://github.com/acme/widgets/pull/3";
    let snoozed = "https://github.com/acme/widgets/pull/4";

    for (url, ts) in [
      (merged, BASE_TS - 5 * DAY),
      (review_old, BASE_TS - DAY),
      (review_new, BASE_TS),
      (snoozed, BASE_TS),
    ] {
      board.gateway.add_open_pr(SearchRole::Authored, url, ts);
    }
    board.engine.refresh_and_list().await.unwrap();

    board.engine.mark_must_review(review_old).unwrap();
    board.engine.mark_must_review(review_new).unwrap();
    board.engine.snooze_until_time(snoozed).unwrap();
    board
      .gateway
      .set_remote_state(merged, "MERGED", true, BASE_TS - 5 * DAY);
    board.engine.mark_touched(merged).await.unwrap();

    let items = board.engine.refresh_and_list().await.unwrap();
    let urls: Vec<&str> = items.iter().map(|i| i.github_fields.url.as_str()).collect();

    // Merged floats to the top despite being the oldest; within the
    // must-review bucket the more recently updated PR wins; active snoozes
    // sink to the bottom.
    assert_eq!(urls, vec![merged, review_new, review_old, snoozed]);
  }

  #[test]
  fn advance_status_is_idempotent_at_fixed_time() {
    let mut item = ReviewItem {
      github_fields: search_fields(URL, &ts_string(BASE_TS)),
      workboard_fields: WorkboardFields::new(ReviewStatus::Unknown, Some(BASE_TS)),
    };
    item.github_fields.state = "merged".to_string();
    item.github_fields.closed = true;

    advance_status(URL, &mut item, BASE_TS + DAY);
    let after_first = item.clone();
    advance_status(URL, &mut item, BASE_TS + DAY);
    assert_eq!(item, after_first);
    assert_eq!(item.workboard_fields.status, ReviewStatus::Merged);
  }

  #[test]
  fn advance_status_leaves_deleted_records_alone() {
    let mut item = ReviewItem {
      github_fields: search_fields(URL, &ts_string(BASE_TS)),
      workboard_fields: WorkboardFields::new(ReviewStatus::Deleted, Some(BASE_TS)),
    };
    item.workboard_fields.delete_after = Some(BASE_TS + DELETE_AFTER_SECONDS);
    item.github_fields.state = "merged".to_string();
    item.github_fields.closed = true;

    advance_status(URL, &mut item, BASE_TS + DAY);
    assert_eq!(item.workboard_fields.status, ReviewStatus::Deleted);
  }

  #[test]
  fn advance_status_does_not_unsnooze_early() {
    let mut item = ReviewItem {
      github_fields: search_fields(URL, &ts_string(BASE_TS)),
      workboard_fields: WorkboardFields::new(ReviewStatus::SnoozedUntilTime, Some(BASE_TS)),
    };
    item.workboard_fields.snooze_until = Some(BASE_TS + DAY);

    advance_status(URL, &mut item, BASE_TS + DAY - 1);
    assert_eq!(
      item.workboard_fields.status,
      ReviewStatus::SnoozedUntilTime
    );

    advance_status(URL, &mut item, BASE_TS + DAY);
    assert_eq!(item.workboard_fields.status, ReviewStatus::MustReview);
    assert_eq!(item.workboard_fields.snooze_until, None);
  }
}
