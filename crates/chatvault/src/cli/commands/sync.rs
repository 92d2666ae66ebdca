use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::config::{RuntimePaths, TOKEN_ENV_VAR, resolve_sync_config};
use crate::notion::{SyncLogEntry, SyncMode, SyncOptions, sync_with_http};

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Integration token; falls back to NOTION_TOKEN.
    #[arg(long)]
    pub token: Option<String>,

    /// Relay that forwards requests to the Notion API.
    #[arg(long, value_name = "URL")]
    pub proxy_url: Option<String>,

    #[arg(long, value_name = "ID")]
    pub assistant_db: Option<String>,

    #[arg(long, value_name = "ID")]
    pub topic_db: Option<String>,

    /// Page that receives assistant pages in page mode.
    #[arg(long, value_name = "ID")]
    pub parent_page: Option<String>,

    #[arg(long, default_value_t = 350)]
    pub delay_ms: u64,
}

pub fn run(args: &SyncArgs, runtime_paths: &RuntimePaths, stop: &AtomicBool) -> Result<()> {
    let input = runtime_paths.resolve(&args.input)?;
    let env_token = std::env::var(TOKEN_ENV_VAR).ok();
    let config = resolve_sync_config(
        args.token.as_deref(),
        env_token.as_deref(),
        args.proxy_url.as_deref(),
        args.assistant_db.as_deref(),
        args.topic_db.as_deref(),
    )?;
    let options = SyncOptions {
        delay: Duration::from_millis(args.delay_ms),
        parent_page_id: args
            .parent_page
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
    };

    let parsed = super::load_backup(&input)?;
    let mode = config.mode();
    println!(
        "sync: start input={} mode={} agents={} topics={} delay_ms={}",
        input.display(),
        mode.as_str(),
        parsed.stats.agent_count,
        parsed.stats.topic_count,
        args.delay_ms
    );
    if mode == SyncMode::Pages
        && (config.assistant_database_id.is_some() || config.topic_database_id.is_some())
    {
        println!(
            "sync: level=warn both --assistant-db and --topic-db are required for linked records; syncing pages instead"
        );
    }

    let mut print_entry = |entry: SyncLogEntry| {
        println!("sync: level={} {}", entry.level.as_str(), entry.message);
    };
    let report = sync_with_http(&parsed, &config, &options, &mut print_entry, stop)?;

    println!(
        "sync: complete mode={} assistants_created={} assistants_replaced={} assistants_skipped={} topics_created={} topics_replaced={} topics_skipped={} blocks_sent={} requests={}",
        report.mode.as_str(),
        report.assistants.created,
        report.assistants.replaced,
        report.assistants.skipped,
        report.topics.created,
        report.topics.replaced,
        report.topics.skipped,
        report.blocks_sent,
        report.requests
    );
    Ok(())
}
