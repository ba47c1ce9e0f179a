//! Terminal presentation: renders the merged, sorted record set and relays
//! user actions into the engine.

use chrono::Utc;
use color_eyre::Result;

use crate::github::client::Gateway;
use crate::github::types::github_datetime_to_timestamp;
use crate::workboard::engine::Engine;

/// Refresh from the remote side and print the prioritized review queue.
pub async fn list<G: Gateway>(engine: &Engine<G>) -> Result<()> {
  let items = engine.refresh_and_list().await?;
  if items.is_empty() {
    println!("No pull requests tracked yet.");
    return Ok(());
  }

  let last_selected = engine.last_selected()?;
  let now = Utc::now().timestamp();

  println!(
    "  {:<26} {:<10} {:<20} {:<44} URL",
    "STATUS", "UPDATED", "REPO", "TITLE"
  );
  for item in &items {
    let updated = github_datetime_to_timestamp(&item.github_fields.updated_at)?;
    let marker = if last_selected.as_deref() == Some(item.github_fields.url.as_str()) {
      '*'
    } else {
      ' '
    };
    let repo = item
      .github_fields
      .repository
      .as_ref()
      .map(|r| r.name_with_owner.clone().unwrap_or_else(|| r.name.clone()))
      .unwrap_or_else(|| "-".to_string());

    println!(
      "{marker} {:<26} {:<10} {:<20} {:<44} {}",
      item.workboard_fields.status.to_string(),
      relative_time(now - updated),
      truncate(&repo, 20),
      truncate(&item.github_fields.title, 44),
      item.github_fields.url
    );
  }

  Ok(())
}

/// Compact "how long ago" rendering for the UPDATED column.
fn relative_time(seconds_ago: i64) -> String {
  let seconds_ago = seconds_ago.max(0);
  if seconds_ago < 60 {
    "just now".to_string()
  } else if seconds_ago < 3_600 {
    format!("{}m ago", seconds_ago / 60)
  } else if seconds_ago < 86_400 {
    format!("{}h ago", seconds_ago / 3_600)
  } else if seconds_ago < 86_400 * 365 {
    format!("{}d ago", seconds_ago / 86_400)
  } else {
    format!("{}y ago", seconds_ago / (86_400 * 365))
  }
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    return s.to_string();
  }
  let cut: String = s.chars().take(max.saturating_sub(1)).collect();
  format!("{cut}…")
}
