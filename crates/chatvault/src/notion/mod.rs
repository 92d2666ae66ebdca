//! Synchronization of a parsed backup into Notion, either as nested pages or
//! as records in two linked databases.

pub mod blocks;
pub mod client;
pub mod pacing;
pub mod pages;
pub mod records;
pub mod schema;

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::hierarchy::ParsedBackup;

pub use client::{HttpMethod, HttpTransport, NotionClient, NotionTransport, RemoteApiError};
pub use pacing::{DEFAULT_DELAY, Pacer, SyncStopped};
pub use schema::{ResolvedSchema, SchemaResolutionError, resolve_schema};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    pub token: String,
    pub proxy_url: Option<String>,
    pub assistant_database_id: Option<String>,
    pub topic_database_id: Option<String>,
}

impl SyncConfig {
    /// Linked-record mode needs both database ids; anything less syncs pages.
    #[must_use]
    pub fn mode(&self) -> SyncMode {
        match self.database_ids() {
            Some(_) => SyncMode::LinkedRecords,
            None => SyncMode::Pages,
        }
    }

    #[must_use]
    pub fn database_ids(&self) -> Option<(&str, &str)> {
        let assistant = non_blank(self.assistant_database_id.as_deref())?;
        let topic = non_blank(self.topic_database_id.as_deref())?;
        Some((assistant, topic))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub delay: Duration,
    pub parent_page_id: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            parent_page_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    Pages,
    LinkedRecords,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pages => "pages",
            Self::LinkedRecords => "linked-records",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warn => "warn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncLogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub created: usize,
    pub replaced: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub assistants: RecordCounts,
    pub topics: RecordCounts,
    pub blocks_sent: usize,
    pub requests: usize,
}

impl SyncReport {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            assistants: RecordCounts::default(),
            topics: RecordCounts::default(),
            blocks_sent: 0,
            requests: 0,
        }
    }
}

/// Forwards progress to the caller's sink.
pub struct SyncLog<'a> {
    sink: &'a mut dyn FnMut(SyncLogEntry),
}

impl<'a> SyncLog<'a> {
    pub fn new(sink: &'a mut dyn FnMut(SyncLogEntry)) -> Self {
        Self { sink }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message.into());
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.emit(LogLevel::Success, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.emit(LogLevel::Warn, message.into());
    }

    fn emit(&mut self, level: LogLevel, message: String) {
        (self.sink)(SyncLogEntry { level, message });
    }
}

/// Runs one full sync of `parsed` through `transport`.
///
/// The run is strictly sequential. `stop` is polled around every remote call
/// and pacing delay; observing it aborts with [`SyncStopped`].
pub fn sync(
    parsed: &ParsedBackup,
    config: &SyncConfig,
    options: &SyncOptions,
    transport: &dyn NotionTransport,
    log: &mut dyn FnMut(SyncLogEntry),
    stop: &AtomicBool,
) -> Result<SyncReport> {
    if parsed.groups.is_empty() {
        bail!("backup contains no conversations to sync");
    }

    let mode = config.mode();
    let mut log = SyncLog::new(log);
    let mut client = NotionClient::new(transport, Pacer::new(stop, options.delay));
    let mut report = SyncReport::new(mode);
    client.checkpoint()?;

    match config.database_ids() {
        Some((assistant_database_id, topic_database_id)) => records::sync_records(
            parsed,
            assistant_database_id,
            topic_database_id,
            &mut client,
            &mut log,
            &mut report,
        )?,
        None => pages::sync_pages(
            parsed,
            options.parent_page_id.as_deref(),
            &mut client,
            &mut log,
            &mut report,
        )?,
    }

    report.blocks_sent = client.blocks_sent();
    report.requests = client.requests();
    log.success(format!(
        "sync finished: {} assistants, {} topics",
        report.assistants.created + report.assistants.replaced + report.assistants.skipped,
        report.topics.created + report.topics.replaced + report.topics.skipped
    ));
    Ok(report)
}

/// [`sync`] over HTTPS against the public API or the configured relay.
pub fn sync_with_http(
    parsed: &ParsedBackup,
    config: &SyncConfig,
    options: &SyncOptions,
    log: &mut dyn FnMut(SyncLogEntry),
    stop: &AtomicBool,
) -> Result<SyncReport> {
    if config.token.trim().is_empty() {
        bail!("a Notion integration token is required");
    }
    let transport = HttpTransport::new(config.token.trim(), config.proxy_url.as_deref())?;
    sync(parsed, config, options, &transport, log, stop)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
