//! The authoritative record set, stored under one well-known key and
//! read-modify-written atomically.

use tracing::{info, warn};

use crate::db::{Database, DbTransaction};
use crate::error::Result;

use super::item::{validate_records, RecordSet};
use super::status::ReviewStatus;

/// Key holding the serialized identifier → record map.
const RECORDS_KEY: &str = "pull_requests";
/// Prefix for the cache-bypass marker of a PR the user just touched remotely.
const AVOID_CACHE_PREFIX: &str = "avoid-cache.";
/// URL of the PR the user last acted on.
const LAST_SELECTED_KEY: &str = "last-selected-pr-url";

/// Seconds the cache-bypass marker stays up after a touch.
const AVOID_CACHE_TTL_SECONDS: i64 = 300;
/// Seconds the last-selected marker stays up.
const LAST_SELECTED_TTL_SECONDS: i64 = 3_600 * 4;

pub struct ItemStore {
  db: Database,
}

impl ItemStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  pub fn transact(&self) -> Result<StoreTransaction<'_>> {
    Ok(StoreTransaction {
      tx: self.db.transact()?,
    })
  }
}

/// Exclusive access to the item store for one read-modify-write sequence.
pub struct StoreTransaction<'a> {
  tx: DbTransaction<'a>,
}

impl StoreTransaction<'_> {
  /// Load the record set, applying the legacy status migration at this
  /// boundary so the engine only ever sees current variants.
  pub fn records(&self) -> Result<RecordSet> {
    let mut records: RecordSet = self.tx.get(RECORDS_KEY)?.unwrap_or_default();

    for (url, item) in &mut records {
      if item.workboard_fields.status == ReviewStatus::LegacySnoozed {
        if item
          .workboard_fields
          .snooze_until_updated_at_changed_from
          .is_some()
        {
          info!(url = url.as_str(), "Migrating legacy `snoozed` status value");
          item.workboard_fields.status = ReviewStatus::SnoozedUntilUpdate;
        } else {
          warn!(
            url = url.as_str(),
            "Legacy `snoozed` status without an update snapshot, resetting"
          );
          item.workboard_fields.status = ReviewStatus::Unknown;
        }
      }
    }

    Ok(records)
  }

  /// Validate and persist the whole record set.
  pub fn put_records(&self, records: &RecordSet) -> Result<()> {
    validate_records(records)?;
    self.tx.set(RECORDS_KEY, records, None)
  }

  /// Whether detail fetches for this PR should bypass the cache right now.
  pub fn avoid_cache(&self, url: &str) -> Result<bool> {
    self.tx.contains(&format!("{AVOID_CACHE_PREFIX}{url}"))
  }

  pub fn set_avoid_cache(&self, url: &str) -> Result<()> {
    self.tx.set(
      &format!("{AVOID_CACHE_PREFIX}{url}"),
      &true,
      Some(AVOID_CACHE_TTL_SECONDS),
    )
  }

  pub fn set_last_selected(&self, url: &str) -> Result<()> {
    self
      .tx
      .set(LAST_SELECTED_KEY, &url, Some(LAST_SELECTED_TTL_SECONDS))
  }

  pub fn last_selected(&self) -> Result<Option<String>> {
    self.tx.get(LAST_SELECTED_KEY)
  }
}
