//! `mailqueue stats`: queue health.

use super::AppContext;
use clap::Args;
use mailqueue_database::{QueueStats, StaleLock};
use serde_json::json;

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Locks untouched for this many minutes are reported as stale
    #[arg(long, default_value_t = 15)]
    pub stale_after_mins: i64,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub async fn run(ctx: &AppContext, args: StatsArgs) -> anyhow::Result<()> {
    let store = ctx.open_store().await?;
    let stats = store.stats().await?;
    let stale = store
        .stale_locks(chrono::Duration::minutes(args.stale_after_mins))
        .await?;

    if args.json {
        let out = json!({
            "database": ctx.database_file(),
            "retry_ceiling": store.retry_ceiling(),
            "stats": stats,
            "stale_locks": stale,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", render(&stats, &stale, args.stale_after_mins));
    }
    Ok(())
}

fn render(stats: &QueueStats, stale: &[StaleLock], stale_after_mins: i64) -> String {
    let mut out = format!(
        "total:     {}\nready:     {}\nscheduled: {}\nlocked:    {}\nsent:      {}\nexhausted: {}\n",
        stats.total, stats.ready, stats.scheduled, stats.locked, stats.sent, stats.exhausted
    );
    if !stale.is_empty() {
        out.push_str(&format!(
            "\n{} lock(s) older than {} min; run `mailqueue clear-locks` once no worker is running:\n",
            stale.len(),
            stale_after_mins
        ));
        for lock in stale {
            out.push_str(&format!(
                "  {}  retries={}  modified={}\n",
                lock.id,
                lock.send_retries,
                lock.modified.to_rfc3339()
            ));
        }
    }
    out
}
