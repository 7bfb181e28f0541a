mod daemon;
mod logging;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pollsync::config::Config;
use pollsync::network::NetworkMonitor;
use pollsync::remote::HttpGateway;
use pollsync::store::{
  CachedPoll, Choice, DraftImage, DraftOption, LocalStore, PendingDraft, SettingKey, SettingValue,
};
use pollsync::sync::{SyncEngine, SyncResult};

#[derive(Parser, Debug)]
#[command(name = "pollsync")]
#[command(about = "Offline-first client store and sync engine for polls")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pollsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the device as offline
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show connectivity, last sync and pending counts
  Status,
  /// Push pending votes and drafts now
  Sync,
  /// Download polls into the offline cache
  Pull {
    /// Number of recent polls to fetch
    #[arg(long, conflicts_with = "poll")]
    limit: Option<usize>,
    /// Fetch a single poll
    #[arg(long)]
    poll: Option<String>,
  },
  /// List cached polls, most recently cached first
  Polls {
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
  /// Show one cached poll
  Show { id: String },
  /// Vote on a poll (a or b)
  Vote { poll: String, choice: Choice },
  /// List recorded votes
  Votes {
    #[arg(long)]
    poll: Option<String>,
  },
  /// Compose a poll to publish on the next sync
  Draft {
    #[arg(long)]
    title: String,
    #[arg(long)]
    option_a: String,
    #[arg(long)]
    option_b: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    image_a: Option<PathBuf>,
    #[arg(long)]
    image_b: Option<PathBuf>,
    #[arg(long)]
    private: bool,
    #[arg(long)]
    expires_in_hours: Option<i64>,
  },
  /// List drafts awaiting sync
  Drafts,
  /// Show storage usage
  Usage,
  /// Drop cached polls older than the given age
  Cleanup {
    #[arg(long)]
    max_age_hours: Option<i64>,
  },
  /// Discard all pending votes and drafts
  Discard,
  /// Wipe the local store
  Reset,
  /// Sync in the background until Ctrl-C
  Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let store_path = match &config.store.path {
    Some(path) => path.clone(),
    None => LocalStore::default_path()?,
  };

  // Daemon logs also go to <store dir>/logs
  let _log_guard = if matches!(args.command, Command::Daemon) {
    let dir = store_path
      .parent()
      .map(|p| p.join("logs"))
      .ok_or_else(|| eyre!("Store path {} has no parent", store_path.display()))?;
    logging::init(Some(&dir))?
  } else {
    logging::init(None)?
  };

  let mut store = LocalStore::open(&store_path)?;
  if let Some(quota) = config.quota_bytes() {
    store = store.with_quota(quota);
  }
  let store = Arc::new(store);

  let gateway = HttpGateway::new(
    &config.remote.url,
    Config::get_api_token(),
    config.remote_timeout(),
  )?;
  let authority = gateway.authority();

  let network = Arc::new(NetworkMonitor::new(!args.offline));
  let identity = SyncEngine::resolve_identity(&store, config.identity.user_id.as_deref())?;
  let engine = Arc::new(SyncEngine::new(
    store.clone(),
    Arc::new(gateway),
    network,
    identity,
    config.sync_options()?,
  ));

  match args.command {
    Command::Status => {
      let status = engine.get_sync_status()?;
      println!("online:         {}", status.online);
      println!(
        "last sync:      {}",
        status
          .last_sync
          .map(|t| t.to_rfc3339())
          .unwrap_or_else(|| "never".to_string())
      );
      println!("pending votes:  {}", status.pending_votes);
      println!("pending drafts: {}", status.pending_drafts);
      println!("sync needed:    {}", engine.is_sync_needed()?);
      println!("identity:       {}", engine.identity());
    }
    Command::Sync => {
      let result = engine.force_sync().await;
      print_result(&result);
      if !result.success {
        return Err(eyre!("Sync did not complete"));
      }
    }
    Command::Pull { limit, poll } => match poll {
      Some(id) => match engine.download_poll(&id).await? {
        Some(poll) => print_poll(&poll),
        None => return Err(eyre!("Poll {} not found", id)),
      },
      None => {
        let polls = engine
          .download_recent_polls(limit.unwrap_or(config.sync.recent_limit))
          .await?;
        println!("cached {} polls", polls.len());
      }
    },
    Command::Polls { limit } => {
      for poll in store.list_polls(limit)? {
        println!(
          "{}  {}  [{} / {}]  {}",
          poll.id, poll.title, poll.counts.option_a, poll.counts.option_b, poll.cached_at
        );
      }
    }
    Command::Show { id } => match store.get_poll(&id)? {
      Some(poll) => print_poll(&poll),
      None => return Err(eyre!("Poll {} is not cached", id)),
    },
    Command::Vote { poll, choice } => {
      let vote = engine.cast_vote(&poll, choice)?;
      println!("recorded {} on {} ({})", vote.choice, vote.poll_id, vote.id);
    }
    Command::Votes { poll } => {
      for vote in store.list_votes(poll.as_deref())? {
        println!(
          "{}  {}  {}  {}  {}",
          vote.id,
          vote.poll_id,
          vote.choice,
          vote.created_at,
          if vote.synced { "synced" } else { "pending" }
        );
      }
    }
    Command::Draft {
      title,
      option_a,
      option_b,
      description,
      image_a,
      image_b,
      private,
      expires_in_hours,
    } => {
      let mut draft = PendingDraft::new(
        title,
        draft_option(option_a, image_a.as_deref())?,
        draft_option(option_b, image_b.as_deref())?,
      );
      draft.description = description;
      draft.is_public = !private;
      draft.expires_at = expires_in_hours
        .map(|h| {
          hours(h)
            .and_then(|d| Utc::now().checked_add_signed(d))
            .ok_or_else(|| eyre!("--expires-in-hours is out of range: {}", h))
        })
        .transpose()?;
      store.put_draft(&draft)?;
      println!("saved draft {}", draft.id);
    }
    Command::Drafts => {
      for draft in store.list_drafts()? {
        println!(
          "{}  {}  ({} / {})  {}",
          draft.id, draft.title, draft.option_a.text, draft.option_b.text, draft.created_at
        );
      }
    }
    Command::Usage => {
      let usage = store.estimate_usage();
      println!(
        "used {} bytes of {} ({:.1}%)",
        usage.used_bytes, usage.quota_bytes, usage.percent
      );
    }
    Command::Cleanup { max_age_hours } => {
      let max_age = match max_age_hours {
        Some(h) => hours(h).ok_or_else(|| eyre!("--max-age-hours is out of range: {}", h))?,
        None => config.cache_max_age()?,
      };
      let removed = store.cleanup_older_than(max_age)?;
      store.set_setting(SettingKey::LastCleanup, &SettingValue::Timestamp(Utc::now()))?;
      println!("removed {} cached polls", removed);
    }
    Command::Discard => {
      let cleared = engine.clear_sync_queue()?;
      println!(
        "discarded {} votes and {} drafts",
        cleared.votes, cleared.drafts
      );
    }
    Command::Reset => {
      store.clear_all()?;
      println!("local store cleared");
    }
    Command::Daemon => daemon::run(engine, authority, &config).await?,
  }

  Ok(())
}

fn hours(h: i64) -> Option<chrono::Duration> {
  chrono::Duration::try_hours(h)
}

fn draft_option(text: String, image: Option<&Path>) -> Result<DraftOption> {
  let mut option = DraftOption::text(text);
  if let Some(path) = image {
    let data = std::fs::read(path)
      .map_err(|e| eyre!("Failed to read image {}: {}", path.display(), e))?;
    option.image = Some(DraftImage::Pending {
      data,
      content_type: content_type_for(path).to_string(),
    });
  }
  Ok(option)
}

fn content_type_for(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase());
  match ext.as_deref() {
    Some("png") => "image/png",
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    _ => "application/octet-stream",
  }
}

fn print_result(result: &SyncResult) {
  if result.skipped {
    println!("skipped: {}", result.errors.join("; "));
    return;
  }
  println!(
    "synced {} votes, {} drafts",
    result.votes_synced, result.drafts_synced
  );
  for error in &result.errors {
    println!("  error: {}", error);
  }
}

fn print_poll(poll: &CachedPoll) {
  println!("{}  {}", poll.id, poll.title);
  if let Some(description) = &poll.description {
    println!("  {}", description);
  }
  for (choice, option) in [(Choice::OptionA, &poll.option_a), (Choice::OptionB, &poll.option_b)] {
    let mine = if poll.user_vote == Some(choice) { " *" } else { "" };
    println!(
      "  {}: {}  ({}){}",
      choice,
      option.label,
      poll.counts.get(choice),
      mine
    );
  }
  println!("  total: {}", poll.counts.total);
  if let Some(expires) = poll.expires_at {
    println!("  expires: {}", expires.to_rfc3339());
  }
  println!("  cached: {}", poll.cached_at.to_rfc3339());
}
