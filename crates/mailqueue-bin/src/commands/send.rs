//! `mailqueue send`: one worker cycle.

use super::AppContext;
use clap::Args;
use mailqueue_sender::{build_transport, stagger, BatchReport, DeliveryWorker, WorkerDefaults};
use std::time::Duration;
use tracing::info;

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Maximum emails to claim. Defaults to the configured batch limit
    #[arg(long)]
    pub limit: Option<usize>,

    /// Template for items that don't name one
    #[arg(long, default_value = "default")]
    pub template: String,

    /// Layout for items that don't name one
    #[arg(long, default_value = "default")]
    pub layout: String,

    /// Email config for items that don't name one
    #[arg(long, default_value = "default")]
    pub config: String,

    /// Sleep a random 0..=N seconds before claiming
    #[arg(long, value_name = "SECS")]
    pub stagger: Option<u64>,

    /// Per-email transport timeout. Defaults to the configured value
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl Default for SendArgs {
    fn default() -> Self {
        Self {
            limit: None,
            template: "default".to_string(),
            layout: "default".to_string(),
            config: "default".to_string(),
            stagger: None,
            timeout_secs: None,
        }
    }
}

pub async fn run(ctx: &AppContext, args: SendArgs) -> anyhow::Result<()> {
    let report = deliver(ctx, args).await?;
    println!(
        "Processed {} email(s): {} sent, {} failed",
        report.len(),
        report.sent(),
        report.failed()
    );
    for item in &report.items {
        if let Some(reason) = &item.error {
            println!("  {} {:?}: {}", item.id, item.outcome, reason);
        }
    }
    Ok(())
}

async fn deliver(ctx: &AppContext, args: SendArgs) -> anyhow::Result<BatchReport> {
    if let Some(secs) = args.stagger {
        stagger(Duration::from_secs(secs)).await;
    }

    let store = ctx.open_store().await?;
    let transport = build_transport(&ctx.config)?;
    let timeout = Duration::from_secs(args.timeout_secs.unwrap_or(ctx.config.send_timeout_secs));
    let limit = args.limit.unwrap_or(ctx.config.batch_limit);

    let worker = DeliveryWorker::new(store, transport)
        .with_defaults(WorkerDefaults {
            template: args.template,
            layout: args.layout,
            config: args.config,
        })
        .with_send_timeout(timeout);

    info!(limit, transport = ?ctx.config.transport, "Starting send cycle");
    Ok(worker.run_batch(limit).await?)
}
