mod cache;
mod cli;
mod config;
mod db;
mod error;
mod github;
mod workboard;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::cache::CacheStorage;
use crate::db::Database;
use crate::github::cached_client::CachedGhClient;
use crate::github::client::GhClient;
use crate::workboard::engine::Engine;
use crate::workboard::store::ItemStore;

#[derive(Parser, Debug)]
#[command(name = "workboard")]
#[command(about = "A personal review queue for GitHub pull requests")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./workboard.yaml, then
  /// $XDG_CONFIG_HOME/workboard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
  /// Refresh from GitHub and print the prioritized review queue (default)
  List,
  /// Mark a PR as needing your review
  MustReview { url: String },
  /// Mark a PR reviewed; it disappears once merged, or pops back up in 4h
  Reviewed { url: String },
  /// Hide a PR until someone mentions you
  SnoozeMentioned { url: String },
  /// Hide a PR for 24 hours
  SnoozeTime { url: String },
  /// Hide a PR until it is updated again remotely
  SnoozeUpdate { url: String },
  /// Soft-delete a PR from the board
  Delete { url: String },
  /// Tell the board you just changed a PR remotely (forces fresh fetches)
  Touch { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;

  let cache = CacheStorage::open(&data_dir)?;
  let store = ItemStore::new(Database::open(&data_dir)?);
  let gh = CachedGhClient::new(GhClient::new(&config.github.user), cache, &config.github.user);
  let engine = Engine::new(gh, store);

  match args.command.unwrap_or(Action::List) {
    Action::List => cli::list(&engine).await?,
    Action::MustReview { url } => engine.mark_must_review(&url)?,
    Action::Reviewed { url } => engine.mark_reviewed_delete_on_merge(&url)?,
    Action::SnoozeMentioned { url } => engine.snooze_until_mentioned(&url)?,
    Action::SnoozeTime { url } => engine.snooze_until_time(&url)?,
    Action::SnoozeUpdate { url } => engine.snooze_until_update(&url).await?,
    Action::Delete { url } => engine.delete(&url)?,
    Action::Touch { url } => engine.mark_touched(&url).await?,
  }

  Ok(())
}
