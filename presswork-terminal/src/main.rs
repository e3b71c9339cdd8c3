//! presswork-terminal - department workstation client
//!
//! `watch` keeps the department's pending reprint queue up to date (push +
//! poll) and fires cues; the other subcommands issue workflow commands.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use presswork_common::config::DEFAULT_POLL_INTERVAL_SECS;
use presswork_common::models::{Department, NewReprintRequest, Resolution};
use presswork_terminal::cues::LogCues;
use presswork_terminal::poller::{ReconciliationPoller, DEFAULT_FETCH_TIMEOUT_SECS};
use presswork_terminal::push::PushClient;
use presswork_terminal::{Reconciler, ServerClient, TerminalError, TerminalView};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for presswork-terminal
#[derive(Parser, Debug)]
#[command(name = "presswork-terminal")]
#[command(about = "Print-shop department terminal")]
#[command(version)]
struct Args {
    /// Base URL of presswork-server
    #[arg(long, default_value = "http://127.0.0.1:5780", env = "PRESSWORK_SERVER_URL")]
    server_url: String,

    /// Department this terminal belongs to
    #[arg(short, long, env = "PRESSWORK_DEPARTMENT")]
    department: Department,

    /// Operator name recorded on every command
    #[arg(short, long, env = "PRESSWORK_ACTOR", default_value = "")]
    actor: String,

    /// Seconds between reconciliation polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS, env = "PRESSWORK_POLL_INTERVAL_SECS")]
    poll_interval_secs: u64,

    /// Seconds before a fetch or command is abandoned
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, env = "PRESSWORK_FETCH_TIMEOUT_SECS")]
    fetch_timeout_secs: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the department's pending reprint queue (default)
    Watch,
    /// Mark an activity's work in this department as done
    Complete {
        activity_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Send an activity back to the previous department
    Return {
        activity_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Hand a completed activity to the next department
    Advance {
        activity_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Request a reprint of an activity
    Reprint {
        activity_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value_t = 1)]
        quantity: i64,
        #[arg(long)]
        details: Option<String>,
        /// Department that performs the reprint (default: printing)
        #[arg(long)]
        to: Option<Department>,
    },
    /// Conclude or reject a pending reprint request
    Process {
        request_id: Uuid,
        #[arg(long)]
        resolution: Resolution,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presswork_terminal=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let client = ServerClient::new(&args.server_url)
        .context("Failed to build HTTP client")?
        .with_timeout(Duration::from_secs(args.fetch_timeout_secs));

    let watch_config = args.watch_config();
    let command = args.command.unwrap_or(Command::Watch);
    let result = match command {
        Command::Watch => return watch_queue(client, &watch_config).await,
        Command::Complete { activity_id, notes } => client
            .complete(&activity_id, &args.actor, notes.as_deref())
            .await
            .map(|a| format!("{} completed in {}", a.id, a.current_department)),
        Command::Return { activity_id, notes } => client
            .return_activity(&activity_id, &args.actor, notes.as_deref())
            .await
            .map(|a| format!("{} returned to {}", a.id, a.current_department)),
        Command::Advance { activity_id, notes } => client
            .advance(&activity_id, &args.actor, notes.as_deref())
            .await
            .map(|a| format!("{} advanced to {}", a.id, a.current_department)),
        Command::Reprint {
            activity_id,
            reason,
            quantity,
            details,
            to,
        } => client
            .create_reprint(&NewReprintRequest {
                activity_id,
                requested_by: args.actor.clone(),
                reason,
                details,
                quantity,
                from_department: Some(args.department),
                to_department: to,
            })
            .await
            .map(|r| format!("Reprint request {} sent to {}", r.id, r.to_department)),
        Command::Process {
            request_id,
            resolution,
        } => client
            .process_reprint(request_id, &args.actor, resolution)
            .await
            .map(|r| format!("Reprint request {} {}", r.id, r.status)),
    };

    report(result)
}

struct WatchConfig {
    department: Department,
    poll_interval: Duration,
    fetch_timeout: Duration,
}

impl Args {
    fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            department: self.department,
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
        }
    }
}

fn report(result: Result<String, TerminalError>) -> Result<()> {
    match result {
        Ok(message) => {
            println!("{}", message);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            anyhow::bail!(e.user_message())
        }
    }
}

async fn watch_queue(client: ServerClient, config: &WatchConfig) -> Result<()> {
    info!(
        "Starting Presswork terminal (presswork-terminal) v{} for {} at {}",
        env!("CARGO_PKG_VERSION"),
        config.department,
        client.base_url()
    );

    let reconciler = Reconciler::new(TerminalView::new(config.department, Arc::new(LogCues)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let push = PushClient::new(client.http().clone(), client.base_url(), config.department);
    let poller = ReconciliationPoller::new(client, reconciler.clone(), config.department)
        .with_interval(config.poll_interval)
        .with_fetch_timeout(config.fetch_timeout);

    let push_task = tokio::spawn(push.run(reconciler.clone(), shutdown_on(shutdown_rx.clone())));
    let poll_task = tokio::spawn(poller.run(shutdown_on(shutdown_rx)));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(push_task, poll_task);
    Ok(())
}

async fn shutdown_on(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
