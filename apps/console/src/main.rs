use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use status_client::{
    Accepted, OperationInvoker, ProcessRecord, PushChannelClient, StatusCollector, StatusUpdate,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod report;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long)]
    platform_url: Option<String>,
    #[arg(long)]
    status_url: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Print records as JSON instead of one-line summaries.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print status updates until interrupted.
    Watch,
    Deploy {
        plan: String,
    },
    Undeploy {
        plan: String,
        #[arg(long)]
        instance: Option<String>,
    },
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(v) = &self.platform_url {
            settings.platform_url = v.clone();
        }
        if let Some(v) = &self.status_url {
            settings.status_url = v.clone();
        }
        if let Some(v) = self.timeout_ms {
            settings.operation_timeout_ms = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    let mut settings = load_settings();
    cli.apply(&mut settings);

    let collector = StatusCollector::with_error_policy(settings.error_policy());
    collector
        .set_finished_notifier(|successful| {
            info!("console: terminal status received successful={successful}");
        })
        .await;

    let push = PushChannelClient::new();
    let pump = push.bind(collector.clone());
    push.connect(&settings.status_url)
        .await
        .with_context(|| format!("failed to open status channel {}", settings.status_url))?;

    let outcome = match &cli.command {
        Command::Watch => watch(&collector, cli.json).await,
        Command::Deploy { plan } => {
            let invoker = OperationInvoker::new(settings.invoker_settings(), collector.clone());
            run_tracked(&collector, cli.json, invoker.deploy_plan(plan)).await
        }
        Command::Undeploy { plan, instance } => {
            let invoker = OperationInvoker::new(settings.invoker_settings(), collector.clone());
            match instance {
                Some(instance) => {
                    run_tracked(
                        &collector,
                        cli.json,
                        invoker.undeploy_plan_with_id(plan, instance),
                    )
                    .await
                }
                None => run_tracked(&collector, cli.json, invoker.undeploy_plan(plan)).await,
            }
        }
    };

    push.close().await;
    pump.abort();
    outcome
}

async fn watch(collector: &Arc<StatusCollector>, json: bool) -> Result<()> {
    let mut updates = collector.subscribe_updates();
    let mut reload = collector.subscribe_reload();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            update = updates.recv() => match update {
                Ok(StatusUpdate::Dismissed { task_id }) => println!("{task_id} dismissed"),
                Ok(update) => {
                    if let Some(record) = collector.get(update_task_id(&update)).await {
                        print_record(&record, json)?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("console: status updates lagged skipped={skipped}"),
                Err(RecvError::Closed) => return Ok(()),
            },
            signal = reload.recv() => {
                if signal.is_ok() {
                    info!("console: task completed, platform data is stale");
                }
            }
        }
    }
}

/// Invokes an operation and waits until its task reports an outcome.
async fn run_tracked(
    collector: &Arc<StatusCollector>,
    json: bool,
    invocation: impl std::future::Future<Output = Result<Accepted, status_client::InvokeError>>,
) -> Result<()> {
    let mut updates = collector.subscribe_updates();
    let accepted = invocation.await?;
    info!(
        "console: waiting for task {} (reference {})",
        accepted.task_id, accepted.reference
    );

    let record = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        record = wait_for_outcome(collector, &mut updates, &accepted.task_id) => record,
    };
    let record = match record {
        Some(record) => record,
        None => collector
            .get(&accepted.task_id)
            .await
            .ok_or_else(|| anyhow!("task {} is no longer tracked", accepted.task_id))?,
    };

    print_record(&record, json)?;
    if !record.is_successful() {
        return Err(anyhow!("task {} failed", record.task_id()));
    }
    if !record.is_finished() {
        warn!("console: stopped before task {} finished", record.task_id());
    }
    Ok(())
}

async fn wait_for_outcome(
    collector: &StatusCollector,
    updates: &mut broadcast::Receiver<StatusUpdate>,
    task_id: &str,
) -> Option<ProcessRecord> {
    if let Some(record) = collector.get(task_id).await {
        if record.is_finished() || !record.is_successful() {
            return Some(record);
        }
    }
    loop {
        match updates.recv().await {
            Ok(StatusUpdate::Finished { task_id: id, .. } | StatusUpdate::Failed { task_id: id })
                if id == task_id =>
            {
                return collector.get(task_id).await;
            }
            Ok(StatusUpdate::Changed { task_id: id }) if id == task_id => {
                if let Some(record) = collector.get(task_id).await {
                    info!("console: {}", report::summarize(&record));
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("console: status updates lagged skipped={skipped}");
                let record = collector.get(task_id).await?;
                if record.is_finished() || !record.is_successful() {
                    return Some(record);
                }
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

fn update_task_id(update: &StatusUpdate) -> &str {
    match update {
        StatusUpdate::Changed { task_id }
        | StatusUpdate::Failed { task_id }
        | StatusUpdate::Finished { task_id, .. }
        | StatusUpdate::Dismissed { task_id } => task_id,
    }
}

fn print_record(record: &ProcessRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(record)?);
    } else {
        println!("{}", report::summarize(record));
    }
    Ok(())
}
