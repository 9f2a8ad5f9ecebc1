mod config;
mod context;
mod monitor;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fieldsync_core::remote::FetchScope;
use fieldsync_core::sync::{FullResyncError, SyncCycleTrigger};

use config::AgentConfig;
use context::ServiceContext;
use monitor::{spawn_connectivity_monitor, spawn_refresh_loop, TracingProgressSink};

#[derive(Debug, Parser)]
#[command(name = "fieldsync-agent", version, about = "Offline-first field data sync agent")]
struct Cli {
    /// Directory holding the local database.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the background drain, connectivity monitor and periodic refresh.
    Run {
        #[arg(long)]
        user: Option<String>,
    },
    /// Download every data category for a user and day.
    FullSync {
        #[arg(long)]
        user: String,
        /// Day as YYYY-MM-DD; defaults to today (UTC).
        #[arg(long)]
        date: Option<String>,
    },
    /// Run one drain pass over the pending queue.
    Drain,
    /// Print queue depth, dead letters and last sync per category.
    Status,
    /// Remove all local data (sign-out).
    Wipe {
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Probe once so one-shot commands see the real connectivity state.
async fn probe_connectivity(ctx: &ServiceContext) {
    if let Some(client) = &ctx.client {
        let online = client.health().await.unwrap_or(false);
        ctx.connectivity.set_online(online);
    }
}

async fn run(ctx: ServiceContext, user: Option<String>) -> anyhow::Result<()> {
    let mut tasks = Vec::new();
    if let Some(client) = &ctx.client {
        tasks.push(spawn_connectivity_monitor(
            client.clone(),
            ctx.connectivity.clone(),
            ctx.queue.signal().clone(),
            Duration::from_secs(ctx.config.probe_interval_secs.max(1)),
        ));
        tasks.push(spawn_refresh_loop(
            Arc::clone(&ctx.sync_service),
            FetchScope::new(user, Some(today())),
            Duration::from_secs(ctx.config.refresh_interval_secs.max(1)),
        ));
    } else {
        tracing::warn!("FIELDSYNC_API_URL not set; running offline");
    }
    ctx.runtime.ensure_background_drain_started().await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    ctx.runtime.ensure_background_drain_stopped().await;
    for task in tasks {
        task.abort();
    }
    Ok(())
}

async fn full_sync(ctx: ServiceContext, user: String, date: Option<String>) -> anyhow::Result<()> {
    probe_connectivity(&ctx).await;
    let scope = FetchScope::new(Some(user), Some(date.unwrap_or_else(today)));
    match ctx
        .resync
        .full_offline_sync(&scope, &TracingProgressSink)
        .await
    {
        Ok(summary) => {
            println!(
                "Full sync finished: {} item(s), {} step(s) ok, {} failed",
                summary.total,
                summary.steps.len(),
                summary.failed.len()
            );
            for failed in &summary.failed {
                println!("  {}", failed);
            }
            Ok(())
        }
        Err(FullResyncError::StepFailed {
            failed,
            completed,
            skipped,
            partial_total,
        }) => {
            println!("Full sync aborted: {}", failed);
            println!(
                "  completed: {:?}; skipped: {:?}; items: {}",
                completed.iter().map(|s| s.id()).collect::<Vec<_>>(),
                skipped.iter().map(|s| s.id()).collect::<Vec<_>>(),
                partial_total
            );
            Err(anyhow::anyhow!("full sync aborted at step '{}'", failed.step))
        }
        Err(err) => Err(err.into()),
    }
}

async fn drain(ctx: ServiceContext) -> anyhow::Result<()> {
    probe_connectivity(&ctx).await;
    let report = ctx.runtime.run_cycle(SyncCycleTrigger::Manual).await?;
    if report.offline {
        println!("Offline; nothing drained");
        return Ok(());
    }
    println!(
        "applied={} retried={} dead_lettered={} skipped={}",
        report.applied, report.retried, report.dead_lettered, report.skipped
    );
    for err in &report.errors {
        println!("  {}", err);
    }
    if report.reauth_required {
        println!("Credentials rejected; set FIELDSYNC_API_TOKEN and retry");
    }
    Ok(())
}

async fn status(ctx: ServiceContext) -> anyhow::Result<()> {
    probe_connectivity(&ctx).await;
    let status = ctx.sync_service.status()?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    for dead in ctx.queue.list_dead_letters()? {
        println!(
            "dead: seq={} action={} code={} error={}",
            dead.seq,
            dead.action,
            dead.last_error_code.as_deref().unwrap_or("-"),
            dead.last_error.as_deref().unwrap_or("-")
        );
    }
    for entry in ctx.gate.list()? {
        let last = ctx.gate.get_last_sync_timestamp(
            &entry.data_type,
            entry.user_id.as_deref(),
            entry.date.as_deref(),
        )?;
        println!("{}: {}", entry.id, last.as_deref().unwrap_or("never"));
    }
    Ok(())
}

async fn wipe(ctx: ServiceContext, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("refusing to wipe local data without --yes");
    }
    let pending = ctx.queue.pending_count()?;
    if pending > 0 {
        tracing::warn!(pending, "Discarding unsynced mutations");
    }
    let report = ctx.sync_service.wipe_local_data().await?;
    println!(
        "Wiped records={} queue={} metadata={} snapshots={}",
        report.records, report.queue_items, report.metadata, report.snapshots
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = AgentConfig::from_env(cli.data_dir)?;
    let ctx = ServiceContext::build(config)?;

    match cli.cmd {
        Command::Run { user } => run(ctx, user).await,
        Command::FullSync { user, date } => full_sync(ctx, user, date).await,
        Command::Drain => drain(ctx).await,
        Command::Status => status(ctx).await,
        Command::Wipe { yes } => wipe(ctx, yes).await,
    }
}
