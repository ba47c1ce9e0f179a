//! The stored record for one tracked pull request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::error::{Error, Result};
use crate::github::types::PullRequestFields;

use super::status::ReviewStatus;

/// The authoritative record set, keyed by PR URL. A BTreeMap keeps iteration
/// and serialization in identifier order, which makes refresh cycles
/// reproducible.
pub type RecordSet = BTreeMap<String, ReviewItem>;

/// One item record: remote snapshot plus workboard metadata, nothing else.
///
/// `deny_unknown_fields` keeps render-only or otherwise derived fields out
/// of storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReviewItem {
  pub github_fields: PullRequestFields,
  pub workboard_fields: WorkboardFields,
}

/// Locally owned triage metadata layered onto a PR.
///
/// The auxiliary fields are only present while their status makes them
/// meaningful; [`WorkboardFields::set_status`] drops the ones that stop
/// being legal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkboardFields {
  pub status: ReviewStatus,
  /// Unix seconds of the most recent status transition; drives display
  /// order.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_change: Option<i64>,
  /// Absolute unsnooze time (snoozed-until-time only).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub snooze_until: Option<i64>,
  /// Remote `updatedAt` snapshot taken when snoozing until update; a
  /// differing value on a later refresh means the PR was touched again.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub snooze_until_updated_at_changed_from: Option<String>,
  /// Deadline for an expected merge (reviewed-delete-on-merge only).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bring_back_to_review_if_not_merged_until: Option<i64>,
  /// Physical removal time (deleted only).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub delete_after: Option<i64>,
}

impl WorkboardFields {
  pub fn new(status: ReviewStatus, last_change: Option<i64>) -> Self {
    Self {
      status,
      last_change,
      snooze_until: None,
      snooze_until_updated_at_changed_from: None,
      bring_back_to_review_if_not_merged_until: None,
      delete_after: None,
    }
  }

  /// Move to `status` at time `now`, dropping auxiliary fields that are not
  /// legal for the new status. Callers set the fields the new status needs
  /// afterwards.
  pub fn set_status(&mut self, status: ReviewStatus, now: i64) {
    self.status = status;
    self.last_change = Some(now);
    if status != ReviewStatus::SnoozedUntilTime {
      self.snooze_until = None;
    }
    if status != ReviewStatus::SnoozedUntilUpdate {
      self.snooze_until_updated_at_changed_from = None;
    }
    if status != ReviewStatus::ReviewedDeleteOnMerge {
      self.bring_back_to_review_if_not_merged_until = None;
    }
    if status != ReviewStatus::Deleted {
      self.delete_after = None;
    }
  }
}

/// A workboard identifier is the PR's canonical URL.
pub fn validate_identifier(url: &str) -> Result<()> {
  let parsed =
    Url::parse(url).map_err(|e| Error::InvalidInput(format!("{url:?} is not an absolute URL: {e}")))?;
  if !matches!(parsed.scheme(), "http" | "https") {
    return Err(Error::InvalidInput(format!(
      "{url:?} does not have an http(s) scheme"
    )));
  }
  Ok(())
}

/// Validate the whole record set before it is persisted. Failures indicate a
/// logic bug, not bad user input.
pub fn validate_records(records: &RecordSet) -> Result<()> {
  for (url, item) in records {
    validate_identifier(url)
      .map_err(|e| Error::InvariantViolation(format!("bad record identifier: {e}")))?;
    if item.github_fields.url != *url {
      return Err(Error::InvariantViolation(format!(
        "record key {url:?} does not match stored URL {:?}",
        item.github_fields.url
      )));
    }
    validate_workboard_fields(url, &item.workboard_fields)?;
  }
  Ok(())
}

/// Auxiliary fields must be exactly those legal for the status variant.
fn validate_workboard_fields(url: &str, wb: &WorkboardFields) -> Result<()> {
  let violation = |what: &str| {
    Err(Error::InvariantViolation(format!(
      "{what} (PR {url}, status {})",
      wb.status
    )))
  };

  match wb.status {
    ReviewStatus::LegacySnoozed => return violation("legacy status value must not persist"),
    ReviewStatus::Deleted if wb.delete_after.is_none() => {
      return violation("deleted record lacks delete_after")
    }
    ReviewStatus::SnoozedUntilTime if wb.snooze_until.is_none() => {
      return violation("timed snooze lacks snooze_until")
    }
    ReviewStatus::SnoozedUntilUpdate if wb.snooze_until_updated_at_changed_from.is_none() => {
      return violation("update snooze lacks its updatedAt snapshot")
    }
    ReviewStatus::ReviewedDeleteOnMerge
      if wb.bring_back_to_review_if_not_merged_until.is_none() =>
    {
      return violation("reviewed record lacks its bring-back deadline")
    }
    _ => {}
  }

  if wb.snooze_until.is_some() && wb.status != ReviewStatus::SnoozedUntilTime {
    return violation("stray snooze_until");
  }
  if wb.snooze_until_updated_at_changed_from.is_some()
    && wb.status != ReviewStatus::SnoozedUntilUpdate
  {
    return violation("stray snooze_until_updated_at_changed_from");
  }
  if wb.bring_back_to_review_if_not_merged_until.is_some()
    && wb.status != ReviewStatus::ReviewedDeleteOnMerge
  {
    return violation("stray bring_back_to_review_if_not_merged_until");
  }
  if wb.delete_after.is_some() && wb.status != ReviewStatus::Deleted {
    return violation("stray delete_after");
  }

  Ok(())
}
