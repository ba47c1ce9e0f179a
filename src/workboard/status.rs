//! Triage status of a tracked pull request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of triage states a tracked PR moves through.
///
/// `LegacySnoozed` only exists so records written before the snooze variants
/// were split apart still deserialize; the store migrates it on load and
/// validation rejects it on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewStatus {
  Closed,
  Deleted,
  Merged,
  MustReview,
  /// User reviewed/updated the PR and expects it to be merged. If that
  /// happens it is deleted from storage; if not, it pops up again.
  ReviewedDeleteOnMerge,
  /// Someone else takes care of the review. Only makes sense for PRs
  /// authored by others.
  SnoozedUntilMentioned,
  SnoozedUntilTime,
  SnoozedUntilUpdate,
  UpdatedAfterSnooze,
  Unknown,
  #[serde(rename = "snoozed")]
  LegacySnoozed,
}

impl ReviewStatus {
  /// Display sort bucket; lower sorts first. Deleted never renders but keeps
  /// an explicit bucket so the mapping stays exhaustive.
  pub fn sort_priority(self) -> u32 {
    match self {
      ReviewStatus::Closed | ReviewStatus::Merged | ReviewStatus::UpdatedAfterSnooze => 1,
      ReviewStatus::MustReview => 2,
      ReviewStatus::Unknown => 4,
      ReviewStatus::ReviewedDeleteOnMerge
      | ReviewStatus::SnoozedUntilMentioned
      | ReviewStatus::SnoozedUntilTime
      | ReviewStatus::SnoozedUntilUpdate
      | ReviewStatus::LegacySnoozed => 5,
      ReviewStatus::Deleted => 999,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ReviewStatus::Closed => "closed",
      ReviewStatus::Deleted => "deleted",
      ReviewStatus::Merged => "merged",
      ReviewStatus::MustReview => "must-review",
      ReviewStatus::ReviewedDeleteOnMerge => "reviewed-delete-on-merge",
      ReviewStatus::SnoozedUntilMentioned => "snoozed-until-mentioned",
      ReviewStatus::SnoozedUntilTime => "snoozed-until-time",
      ReviewStatus::SnoozedUntilUpdate => "snoozed-until-update",
      ReviewStatus::UpdatedAfterSnooze => "updated-after-snooze",
      ReviewStatus::Unknown => "unknown",
      ReviewStatus::LegacySnoozed => "snoozed",
    }
  }
}

impl fmt::Display for ReviewStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
