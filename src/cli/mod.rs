//! Command-line interface for courier.
//!
//! Lets one process play the external receiver (`ingest`) and another play
//! the application (`listen`), with the inbox log as the only thing they
//! share. The remaining commands inspect and maintain the log.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, ResolvedConfig};
use crate::core::{Courier, FlushOutcome, JsonlStore, RecordStore};
use crate::domain::EventRecord;
use crate::ingest::{IngestOutcome, StoreWatcher};

/// courier - Durable, order-preserving event delivery
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Hand an event to the inbox, as an external receiver would
    Ingest {
        /// Origin of the event (e.g. phone number)
        #[arg(short, long)]
        sender: String,

        /// Event payload
        #[arg(short, long)]
        body: String,
    },

    /// Attach as the application and print every delivery as a JSON line
    Listen,

    /// List undelivered records
    Pending {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the most recent record
    Last,

    /// Show inbox counts
    Status,

    /// Drop old delivered records
    Compact {
        /// Number of delivered records to keep
        #[arg(short, long, default_value = "100")]
        retain: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Ingest { sender, body } => ingest(&sender, &body).await,
            Commands::Listen => listen().await,
            Commands::Pending { limit } => list_pending(limit).await,
            Commands::Last => show_last().await,
            Commands::Status => show_status().await,
            Commands::Compact { retain } => compact(retain).await,
            Commands::Config => show_config(),
        }
    }
}

async fn open_courier(config: &ResolvedConfig) -> Result<Courier> {
    Courier::open(config)
        .await
        .with_context(|| format!("Failed to open inbox: {}", config.store_path.display()))
}

async fn open_store() -> Result<JsonlStore> {
    JsonlStore::open_default().await
}

/// Receiver side: persist, then attempt delivery (a no-op in a fresh process)
async fn ingest(sender: &str, body: &str) -> Result<()> {
    let config = config::config()?;
    let courier = open_courier(config).await?;

    match courier.ingest(sender, body).await {
        IngestOutcome::Stored(record) => {
            eprintln!("Stored record #{} from {}", record.sequence, record.sender);
        }
        IngestOutcome::Buffered { pending } => {
            // Nothing durable happened; this process is about to exit
            anyhow::bail!("Inbox unavailable, {} event(s) could not be stored", pending);
        }
    }

    Ok(())
}

/// Application side: attach, register, print deliveries until Ctrl-C
async fn listen() -> Result<()> {
    let config = config::config()?;
    let courier = Arc::new(open_courier(config).await?);

    let mut subscription = courier.subscribe();
    courier.on_runtime_resumed().await;
    let report = courier.register_listener().await;
    if report.outcome == FlushOutcome::Interrupted {
        eprintln!("[backlog partially delivered, will retry]");
    }

    let watcher = StoreWatcher::new(&config.store_path, config.watch_debounce)
        .spawn(courier.clone())
        .context("Failed to watch inbox")?;

    eprintln!("Listening on {} (Ctrl-C to stop)", config.store_path.display());

    loop {
        tokio::select! {
            delivery = subscription.recv() => match delivery {
                Some(delivery) => {
                    println!("{}", serde_json::to_string(&delivery)?);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    courier.on_runtime_suspended();
    courier.unsubscribe(&subscription);
    watcher.stop().await?;

    Ok(())
}

async fn list_pending(limit: usize) -> Result<()> {
    let store = open_store().await?;
    let pending = store.list_undelivered().await?;

    if pending.is_empty() {
        println!("No undelivered records.");
        return Ok(());
    }

    println!("{} undelivered record(s):", pending.len());
    for record in pending.iter().take(limit) {
        print_record(record);
    }
    if pending.len() > limit {
        println!("  ... and {} more", pending.len() - limit);
    }

    Ok(())
}

async fn show_last() -> Result<()> {
    let store = open_store().await?;

    match store.last().await? {
        Some(record) => print_record(&record),
        None => println!("Inbox is empty."),
    }

    Ok(())
}

async fn show_status() -> Result<()> {
    let store = open_store().await?;
    let stats = store.stats().await?;

    println!("Inbox: {}", store.path().display());
    println!("  Total:       {}", stats.total);
    println!("  Delivered:   {}", stats.delivered);
    println!("  Undelivered: {}", stats.undelivered);
    if stats.corrupt > 0 {
        println!("  Corrupt:     {} (skipped)", stats.corrupt);
    }

    Ok(())
}

async fn compact(retain: usize) -> Result<()> {
    let store = open_store().await?;
    let removed = store.compact(retain).await?;
    println!("Removed {} delivered record(s)", removed);
    Ok(())
}

fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("Home:   {}", config.home.display());
    println!("Store:  {}", config.store_path.display());
    match &config.config_file {
        Some(path) => println!("Config: {}", path.display()),
        None => println!("Config: (none, using defaults)"),
    }
    match config.delivery.retain_delivered {
        Some(retain) => println!("Retain delivered: {}", retain),
        None => println!("Retain delivered: all"),
    }
    println!("Watch debounce: {}ms", config.watch_debounce.as_millis());

    Ok(())
}

fn print_record(record: &EventRecord) {
    let received = record
        .received_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    let flag = if record.delivered { "delivered" } else { "pending" };

    println!(
        "  #{:<5} {:<16} {:<10} {}  {}",
        record.sequence, record.sender, flag, received, record.body
    );
}
