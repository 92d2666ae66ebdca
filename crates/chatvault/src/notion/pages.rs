use std::collections::HashSet;

use anyhow::Result;
use serde_json::{Value, json};

use super::blocks::{markdown_to_blocks, plain_rich_text};
use super::client::NotionClient;
use super::{SyncLog, SyncReport};
use crate::hierarchy::ParsedBackup;
use crate::render::{RenderOptions, render_topic};

/// Page mode: one page per assistant, one child page per topic.
///
/// Pages land at the workspace root unless `parent_page_id` is given. Page
/// mode never reconciles; rerunning it creates a second copy, so existing
/// children of an explicit parent are listed first and duplicates reported.
pub fn sync_pages(
    parsed: &ParsedBackup,
    parent_page_id: Option<&str>,
    client: &mut NotionClient<'_>,
    log: &mut SyncLog<'_>,
    report: &mut SyncReport,
) -> Result<()> {
    let existing_titles = match parent_page_id {
        Some(parent_id) => {
            log.info("listing pages under the parent page");
            child_page_titles(&client.list_children(parent_id)?)
        }
        None => HashSet::new(),
    };

    for group in &parsed.groups {
        if existing_titles.contains(&group.assistant_label) {
            log.warn(format!(
                "a page titled `{}` already exists under the parent page; creating another",
                group.assistant_label
            ));
        }

        log.info(format!("creating assistant page: {}", group.assistant_label));
        let parent = match parent_page_id {
            Some(parent_id) => json!({ "type": "page_id", "page_id": parent_id }),
            None => json!({ "type": "workspace", "workspace": true }),
        };
        let assistant_page_id =
            client.create_page(titled_page(parent, &group.assistant_label), Vec::new())?;
        report.assistants.created += 1;

        for (session_group, topic_group) in group.topics() {
            let markdown = render_topic(
                group.assistant.as_ref(),
                session_group.session.as_ref(),
                topic_group,
                &group.assistant_label,
                RenderOptions::FULL,
            );
            log.info(format!("  -> creating topic page: {}", topic_group.topic_label));
            client.create_page(
                titled_page(
                    json!({ "type": "page_id", "page_id": assistant_page_id }),
                    &topic_group.topic_label,
                ),
                markdown_to_blocks(&markdown),
            )?;
            report.topics.created += 1;
        }
        log.success(format!("assistant page written: {}", group.assistant_label));
    }

    Ok(())
}

fn titled_page(parent: Value, title: &str) -> Value {
    json!({
        "parent": parent,
        "properties": {
            "title": { "title": plain_rich_text(title) },
        },
    })
}

fn child_page_titles(children: &[Value]) -> HashSet<String> {
    children
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("child_page"))
        .filter_map(|block| {
            block
                .get("child_page")
                .and_then(|page| page.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}
