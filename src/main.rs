use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use billfeed::config::Config;
use billfeed::model::{Bill, BillId};
use billfeed::network::HttpBillsApi;
use billfeed::session::{Handled, Session, SessionEvent};
use billfeed::snap::{Release, SnapCommand, SnapController};
use billfeed::storage::{Database, DatabaseError};
use billfeed::sync::{FeedState, FeedStatus, LikeResolution, StatusObserver};

/// Get the config directory path (~/.config/billfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("billfeed"))
}

#[derive(Parser, Debug)]
#[command(name = "billfeed", about = "Legislative bill feed client")]
struct Args {
    /// Config file (defaults to ~/.config/billfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the latest feed from the server
    Refresh,
    /// Show the last fetched feed
    List,
    /// Like a bill
    Like { number: i64 },
    /// Remove a like from a bill
    Unlike { number: i64 },
    /// Evaluate where the header snaps after a scroll gesture
    Snap {
        /// Offset at gesture end
        #[arg(long, allow_negative_numbers = true)]
        offset: f64,
        /// Offset of the previous sample; sets the scroll direction
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        from: f64,
        /// Gesture ended with a fling instead of a plain release
        #[arg(long)]
        momentum: bool,
    },
}

/// Prints feed status transitions to the terminal.
struct ConsoleStatus;

impl StatusObserver for ConsoleStatus {
    fn status_changed(&mut self, state: &FeedState) {
        match state.status {
            FeedStatus::Refreshing => println!("Refreshing..."),
            FeedStatus::Refreshed => println!("Feed updated: {} bills", state.feed.len()),
            FeedStatus::Failed => {
                let reason = state
                    .last_failure
                    .as_ref()
                    .map(|f| f.reason.as_str())
                    .unwrap_or("unknown error");
                eprintln!(
                    "Refresh failed: {} (showing {} cached bills)",
                    reason,
                    state.feed.len()
                );
            }
            FeedStatus::Idle => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
            {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to set config directory permissions to 0700"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Snap evaluation is pure and needs neither the server nor the database.
    if let Command::Snap {
        offset,
        from,
        momentum,
    } = args.command
    {
        return run_snap(&config, from, offset, momentum);
    }

    let db_path = config_dir.join("billfeed.db");
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of billfeed appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let api = HttpBillsApi::from_config(&config).context("Invalid API configuration")?;
    let (mut session, mut events) = Session::new(Arc::new(api), Arc::new(db.clone()));
    session
        .hydrate()
        .await
        .context("Failed to load liked bills")?;

    match db.load_snapshot().await {
        Ok(Some(snapshot)) => {
            tracing::debug!(bills = snapshot.bills.len(), saved_at = %snapshot.saved_at, "Restoring feed snapshot");
            session.restore_feed(snapshot.bills, snapshot.representatives);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable feed snapshot"),
    }

    match args.command {
        Command::Refresh => {
            session.subscribe(ConsoleStatus);
            let _ = session.request_refresh();
            if wait_for_refresh(&mut session, &mut events).await? == Handled::Refreshed {
                let state = session.state();
                db.save_snapshot(&state.feed, state.representatives.as_ref())
                    .await
                    .context("Failed to save feed snapshot")?;
            }
            print_feed(&session);
        }
        Command::List => {
            if session.state().feed.is_empty() {
                println!("No bills yet. Run `billfeed refresh` first.");
            } else {
                print_feed(&session);
            }
        }
        Command::Like { number } => set_like(&mut session, &mut events, BillId(number), true).await?,
        Command::Unlike { number } => {
            set_like(&mut session, &mut events, BillId(number), false).await?
        }
        // Answered before the session was opened.
        Command::Snap { .. } => {}
    }

    session.shutdown();
    Ok(())
}

/// Drive the event loop until the outstanding refresh settles.
async fn wait_for_refresh(
    session: &mut Session,
    events: &mut mpsc::Receiver<SessionEvent>,
) -> Result<Handled> {
    while let Some(event) = events.recv().await {
        match session.handle_event(event).await {
            Handled::StaleRefresh | Handled::Like(_) => continue,
            handled => return Ok(handled),
        }
    }
    anyhow::bail!("Session event channel closed before refresh finished")
}

async fn set_like(
    session: &mut Session,
    events: &mut mpsc::Receiver<SessionEvent>,
    bill: BillId,
    desired: bool,
) -> Result<()> {
    let intent = session.set_like(bill, desired);
    tracing::debug!(bill = %bill, desired, intent = ?intent.id, "Submitted like");

    while let Some(event) = events.recv().await {
        match session.handle_event(event).await {
            Handled::Like(LikeResolution::Confirmed { liked, .. }) => {
                println!("Bill {} {}", bill, if liked { "liked" } else { "unliked" });
                return Ok(());
            }
            Handled::Like(LikeResolution::RolledBack { restored, .. }) => {
                eprintln!(
                    "Could not update bill {}; it remains {}",
                    bill,
                    if restored { "liked" } else { "not liked" }
                );
                return Ok(());
            }
            _ => continue,
        }
    }
    anyhow::bail!("Session event channel closed before the server answered")
}

fn run_snap(config: &Config, from: f64, offset: f64, momentum: bool) -> Result<()> {
    let mut snap =
        SnapController::new(config.viewport_height).context("Invalid viewport height")?;
    snap.on_sample(from);
    snap.on_sample(offset);

    let release = if momentum {
        Release::Momentum
    } else {
        Release::Drag
    };
    match snap.on_gesture_end(offset, release) {
        Some(command) => {
            let verb = match command {
                SnapCommand::Settle(_) => "settle",
                SnapCommand::Hold(_) => "hold",
            };
            println!("{} {}", verb, command.offset());
        }
        None => println!("none"),
    }
    Ok(())
}

fn print_feed(session: &Session) {
    for bill in &session.state().feed {
        print_bill(session, bill);
    }
}

fn print_bill(session: &Session, bill: &Bill) {
    let marker = if session.has_liked(bill.id()) { "*" } else { " " };
    let sponsors: Vec<&str> = session
        .state()
        .representatives
        .as_ref()
        .map(|reps| {
            bill.sponsor_ids
                .iter()
                .filter_map(|id| reps.get(id).map(|r| r.name.as_str()))
                .collect()
        })
        .unwrap_or_default();

    println!(
        "{} {:>6}  {:<10} {}",
        marker,
        bill.id(),
        format!("{:?}", bill.category),
        bill.title
    );
    if !sponsors.is_empty() {
        println!("         sponsors: {}", sponsors.join(", "));
    }
}
