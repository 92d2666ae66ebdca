use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::config::RuntimePaths;
use crate::hierarchy::{HierarchyStats, ParsedBackup};

#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub source_path: String,
    pub stats: HierarchyStats,
    pub assistants: Vec<InspectAssistant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectAssistant {
    pub id: String,
    pub label: String,
    pub unassigned: bool,
    pub sessions: Vec<InspectSession>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectSession {
    pub id: String,
    pub label: String,
    pub topics: Vec<InspectTopic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectTopic {
    pub id: String,
    pub label: String,
    pub message_count: usize,
}

#[must_use]
pub fn build_inspect_report(parsed: &ParsedBackup, source_path: &str) -> InspectReport {
    InspectReport {
        source_path: source_path.to_string(),
        stats: parsed.stats,
        assistants: parsed
            .groups
            .iter()
            .map(|group| InspectAssistant {
                id: group.assistant_id.clone(),
                label: group.assistant_label.clone(),
                unassigned: group.is_unassigned(),
                sessions: group
                    .sessions
                    .iter()
                    .map(|session| InspectSession {
                        id: session.session_id.clone(),
                        label: session.session_label.clone(),
                        topics: session
                            .topics
                            .iter()
                            .map(|topic| InspectTopic {
                                id: topic.topic_id.clone(),
                                label: topic.topic_label.clone(),
                                message_count: topic.messages.len(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[must_use]
pub fn render_text_report(report: &InspectReport) -> String {
    let mut lines = vec![
        format!("source_path: {}", report.source_path),
        format!("stats.agent_count: {}", report.stats.agent_count),
        format!("stats.session_count: {}", report.stats.session_count),
        format!("stats.topic_count: {}", report.stats.topic_count),
        format!("stats.message_count: {}", report.stats.message_count),
    ];

    if report.assistants.is_empty() {
        lines.push("tree: (empty)".to_string());
        return lines.join("\n");
    }

    lines.push("tree:".to_string());
    for assistant in &report.assistants {
        let marker = if assistant.unassigned { " [unassigned]" } else { "" };
        lines.push(format!("- {}{marker}", assistant.label));
        for session in &assistant.sessions {
            lines.push(format!("  - {}", session.label));
            for topic in &session.topics {
                lines.push(format!(
                    "    - {} ({} messages)",
                    topic.label, topic.message_count
                ));
            }
        }
    }

    lines.join("\n")
}

pub fn render_json_report(report: &InspectReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to encode inspect report as JSON")
}

pub fn run(args: &InspectArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let input = runtime_paths.resolve(&args.input)?;
    let parsed = super::load_backup(&input)?;
    let report = build_inspect_report(&parsed, &input.to_string_lossy());
    if args.json {
        println!("{}", render_json_report(&report)?);
    } else {
        println!("{}", render_text_report(&report));
    }
    Ok(())
}
