//! Markdown → Notion block conversion and the validation applied to every
//! block list before it is transmitted.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde_json::{Map, Value, json};

pub const MAX_BLOCKS_PER_REQUEST: usize = 100;
pub const MAX_TEXT_CHARS: usize = 1800;

const SUPPORTED_TYPES: &[&str] = &[
    "paragraph",
    "heading_1",
    "heading_2",
    "heading_3",
    "bulleted_list_item",
    "numbered_list_item",
    "quote",
    "code",
    "to_do",
    "toggle",
    "callout",
    "divider",
];
const TEXTLESS_TYPES: &[&str] = &["divider"];
const CODE_LANGUAGES: &[&str] = &[
    "bash",
    "c",
    "c++",
    "c#",
    "css",
    "diff",
    "go",
    "graphql",
    "html",
    "java",
    "javascript",
    "json",
    "kotlin",
    "markdown",
    "php",
    "python",
    "ruby",
    "rust",
    "scala",
    "shell",
    "sql",
    "swift",
    "typescript",
    "xml",
    "yaml",
];
const PLAIN_TEXT_LANGUAGE: &str = "plain text";

/// Splits text into pieces of at most `max_chars` characters. Empty input
/// yields a single empty piece.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() || max_chars == 0 {
        return vec![text.to_string()];
    }
    let chars = text.chars().collect::<Vec<_>>();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Unstyled rich text for titles and text properties, pre-split to the
/// per-run limit.
#[must_use]
pub fn plain_rich_text(text: &str) -> Vec<Value> {
    chunk_text(text, MAX_TEXT_CHARS)
        .into_iter()
        .map(|content| json!({ "type": "text", "text": { "content": content } }))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Style {
    bold: bool,
    italic: bool,
    strikethrough: bool,
    code: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Run {
    text: String,
    style: Style,
    link: Option<String>,
}

impl Run {
    fn to_json(&self) -> Value {
        let mut text = Map::new();
        text.insert("content".to_string(), Value::String(self.text.clone()));
        if let Some(url) = self.link.as_deref() {
            text.insert("link".to_string(), json!({ "url": url }));
        }
        let mut run = json!({ "type": "text", "text": text });
        if self.style != Style::default() {
            run["annotations"] = json!({
                "bold": self.style.bold,
                "italic": self.style.italic,
                "strikethrough": self.style.strikethrough,
                "code": self.style.code,
            });
        }
        run
    }
}

#[derive(Default)]
struct Converter {
    blocks: Vec<Value>,
    runs: Vec<Run>,
    bold: usize,
    italic: usize,
    strikethrough: usize,
    link: Option<String>,
    heading: Option<&'static str>,
    lists: Vec<bool>,
    quote_depth: usize,
    code: Option<(String, String)>,
}

impl Converter {
    fn style(&self) -> Style {
        Style {
            bold: self.bold > 0,
            italic: self.italic > 0,
            strikethrough: self.strikethrough > 0,
            code: false,
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        if let Some((_, body)) = self.code.as_mut() {
            body.push_str(text);
            return;
        }
        let style = Style {
            code,
            ..self.style()
        };
        let link = self.link.clone();
        match self.runs.last_mut() {
            Some(last) if last.style == style && last.link == link => last.text.push_str(text),
            _ => self.runs.push(Run {
                text: text.to_string(),
                style,
                link,
            }),
        }
    }

    fn take_rich_text(&mut self) -> Vec<Value> {
        let mut runs = std::mem::take(&mut self.runs);
        if let Some(last) = runs.last_mut() {
            let kept = last.text.trim_end().len();
            last.text.truncate(kept);
        }
        runs.iter()
            .filter(|run| !run.text.is_empty())
            .map(Run::to_json)
            .collect()
    }

    fn flush(&mut self, block_type: &str) {
        let rich_text = self.take_rich_text();
        if rich_text.is_empty() {
            return;
        }
        self.blocks.push(text_block(block_type, rich_text));
    }

    /// Closes whatever inline text is open before a new block starts.
    fn flush_pending(&mut self) {
        if self.runs.is_empty() {
            return;
        }
        let block_type = if self.quote_depth > 0 {
            "quote"
        } else if let Some(&ordered) = self.lists.last() {
            list_item_type(ordered)
        } else {
            "paragraph"
        };
        self.flush(block_type);
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush_pending();
                self.heading = Some(match level {
                    HeadingLevel::H1 => "heading_1",
                    HeadingLevel::H2 => "heading_2",
                    _ => "heading_3",
                });
            }
            Event::End(TagEnd::Heading(_)) => {
                let block_type = self.heading.take().unwrap_or("heading_3");
                self.flush(block_type);
            }
            Event::End(TagEnd::Paragraph) => {
                if self.lists.is_empty() && self.quote_depth == 0 {
                    self.flush("paragraph");
                } else {
                    self.push_text("\n", false);
                }
            }
            Event::Start(Tag::List(first)) => {
                self.flush_pending();
                self.lists.push(first.is_some());
            }
            Event::End(TagEnd::List(_)) => {
                self.lists.pop();
            }
            Event::End(TagEnd::Item) => {
                let ordered = self.lists.last().copied().unwrap_or(false);
                self.flush(list_item_type(ordered));
            }
            Event::Start(Tag::BlockQuote) => {
                self.flush_pending();
                self.quote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote) => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 {
                    self.flush("quote");
                }
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                self.flush_pending();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or("").to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((language, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((language, body)) = self.code.take() {
                    self.blocks.push(code_block(&language, body.trim_end_matches('\n')));
                }
            }
            Event::Start(Tag::Strong) => self.bold += 1,
            Event::End(TagEnd::Strong) => self.bold = self.bold.saturating_sub(1),
            Event::Start(Tag::Emphasis) => self.italic += 1,
            Event::End(TagEnd::Emphasis) => self.italic = self.italic.saturating_sub(1),
            Event::Start(Tag::Strikethrough) => self.strikethrough += 1,
            Event::End(TagEnd::Strikethrough) => {
                self.strikethrough = self.strikethrough.saturating_sub(1);
            }
            Event::Start(Tag::Link { dest_url, .. }) => self.link = Some(dest_url.to_string()),
            Event::End(TagEnd::Link) => self.link = None,
            Event::Text(text) => self.push_text(&text, false),
            Event::Code(text) => self.push_text(&text, true),
            Event::Html(html) => self.push_text(&html, false),
            Event::SoftBreak | Event::HardBreak => self.push_text("\n", false),
            Event::Rule => {
                self.flush_pending();
                self.blocks.push(json!({ "object": "block", "type": "divider", "divider": {} }));
            }
            _ => {}
        }
    }
}

/// Converts Markdown into Notion blocks: headings, paragraphs, list items,
/// quotes, fenced code and dividers. Inline bold, italic, strikethrough, code
/// and links become rich-text annotations.
#[must_use]
pub fn markdown_to_blocks(markdown: &str) -> Vec<Value> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let mut converter = Converter::default();
    for event in Parser::new_ext(markdown, options) {
        converter.handle(event);
    }
    converter.flush_pending();
    converter.blocks
}

/// Makes a block list safe to transmit.
///
/// Blocks of unknown or missing type are dropped. Text-bearing blocks without
/// rich text are dropped unless they carry children, in which case a single
/// empty run is substituted. Text runs over [`MAX_TEXT_CHARS`] are split.
#[must_use]
pub fn sanitize_blocks(blocks: Vec<Value>) -> Vec<Value> {
    blocks.into_iter().filter_map(sanitize_block).collect()
}

fn sanitize_block(mut block: Value) -> Option<Value> {
    let block_type = block
        .get("type")
        .and_then(Value::as_str)
        .filter(|block_type| SUPPORTED_TYPES.contains(block_type))?
        .to_string();
    let payload = block.get_mut(&block_type)?.as_object_mut()?;

    if let Some(children) = payload.remove("children") {
        let children = match children {
            Value::Array(children) => sanitize_blocks(children),
            _ => Vec::new(),
        };
        if !children.is_empty() {
            payload.insert("children".to_string(), Value::Array(children));
        }
    }

    if TEXTLESS_TYPES.contains(&block_type.as_str()) {
        return Some(block);
    }

    let runs = match payload.remove("rich_text") {
        Some(Value::Array(runs)) => split_long_runs(runs),
        _ => Vec::new(),
    };
    let rich_text = if runs.is_empty() {
        if !payload.contains_key("children") {
            return None;
        }
        vec![json!({ "type": "text", "text": { "content": "" } })]
    } else {
        runs
    };
    payload.insert("rich_text".to_string(), Value::Array(rich_text));
    Some(block)
}

fn split_long_runs(runs: Vec<Value>) -> Vec<Value> {
    let mut split = Vec::with_capacity(runs.len());
    for run in runs {
        let Some(content) = run
            .get("text")
            .and_then(|text| text.get("content"))
            .and_then(Value::as_str)
        else {
            split.push(run);
            continue;
        };
        if content.chars().count() <= MAX_TEXT_CHARS {
            split.push(run);
            continue;
        }
        for piece in chunk_text(content, MAX_TEXT_CHARS) {
            let mut part = run.clone();
            part["text"]["content"] = Value::String(piece);
            split.push(part);
        }
    }
    split
}

fn list_item_type(ordered: bool) -> &'static str {
    if ordered {
        "numbered_list_item"
    } else {
        "bulleted_list_item"
    }
}

fn text_block(block_type: &str, rich_text: Vec<Value>) -> Value {
    let mut block = Map::new();
    block.insert("object".to_string(), Value::String("block".to_string()));
    block.insert("type".to_string(), Value::String(block_type.to_string()));
    block.insert(block_type.to_string(), json!({ "rich_text": rich_text }));
    Value::Object(block)
}

/// A code block; unknown fence languages map to plain text.
#[must_use]
pub fn code_block(language: &str, body: &str) -> Value {
    let language = language.to_ascii_lowercase();
    let language = match language.as_str() {
        "" | "text" | "txt" | "plain" => PLAIN_TEXT_LANGUAGE,
        "sh" | "zsh" => "shell",
        "js" => "javascript",
        "ts" => "typescript",
        "py" => "python",
        "rs" => "rust",
        "yml" => "yaml",
        "md" => "markdown",
        other => CODE_LANGUAGES
            .iter()
            .find(|known| **known == other)
            .copied()
            .unwrap_or(PLAIN_TEXT_LANGUAGE),
    };
    json!({
        "object": "block",
        "type": "code",
        "code": {
            "language": language,
            "rich_text": plain_rich_text(body),
        },
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{MAX_TEXT_CHARS, chunk_text, markdown_to_blocks, sanitize_blocks};

    fn types(blocks: &[serde_json::Value]) -> Vec<&str> {
        blocks
            .iter()
            .filter_map(|block| block["type"].as_str())
            .collect()
    }

    #[test]
    fn chunking_respects_character_boundaries() {
        let text = "é".repeat(4000);
        let chunks = chunk_text(&text, MAX_TEXT_CHARS);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), MAX_TEXT_CHARS);
        assert_eq!(chunks[2].chars().count(), 400);
        assert_eq!(chunk_text("", MAX_TEXT_CHARS), vec![String::new()]);
    }

    #[test]
    fn converts_rendered_topic_structure() {
        let markdown = "# Hello\n\n## Messages\n\n### 2024-05-01 - User\n\nHi **there** `x`\n\n```json\n{\n  \"a\": 1\n}\n```\n\n- one\n- two\n\n1. first\n\n> quoted\n\n---\n";
        let blocks = markdown_to_blocks(markdown);
        assert_eq!(
            types(&blocks),
            vec![
                "heading_1",
                "heading_2",
                "heading_3",
                "paragraph",
                "code",
                "bulleted_list_item",
                "bulleted_list_item",
                "numbered_list_item",
                "quote",
                "divider",
            ]
        );

        let paragraph = &blocks[3]["paragraph"]["rich_text"];
        assert_eq!(paragraph[0]["text"]["content"], "Hi ");
        assert_eq!(paragraph[1]["text"]["content"], "there");
        assert_eq!(paragraph[1]["annotations"]["bold"], true);
        assert_eq!(paragraph[3]["annotations"]["code"], true);

        assert_eq!(blocks[4]["code"]["language"], "json");
        assert_eq!(
            blocks[4]["code"]["rich_text"][0]["text"]["content"],
            "{\n  \"a\": 1\n}"
        );
    }

    #[test]
    fn unknown_fence_language_falls_back_to_plain_text() {
        let blocks = markdown_to_blocks("```brainfuck\n+++\n```\n");
        assert_eq!(blocks[0]["code"]["language"], "plain text");
    }

    #[test]
    fn sanitizing_drops_unknown_and_empty_blocks() {
        let blocks = sanitize_blocks(vec![
            json!({ "type": "mystery", "mystery": {} }),
            json!({ "object": "block" }),
            json!({ "type": "paragraph", "paragraph": { "rich_text": [] } }),
            json!({ "type": "divider", "divider": {} }),
        ]);
        assert_eq!(types(&blocks), vec!["divider"]);
    }

    #[test]
    fn empty_text_with_children_gets_placeholder_run() {
        let blocks = sanitize_blocks(vec![json!({
            "type": "toggle",
            "toggle": {
                "rich_text": [],
                "children": [
                    { "type": "paragraph", "paragraph": { "rich_text": [
                        { "type": "text", "text": { "content": "inside" } }
                    ] } },
                    { "type": "bogus" }
                ]
            }
        })]);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["toggle"]["rich_text"][0]["text"]["content"], "");
        assert_eq!(blocks[0]["toggle"]["children"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn oversized_runs_are_split() {
        let long = "a".repeat(MAX_TEXT_CHARS * 2 + 5);
        let blocks = sanitize_blocks(vec![json!({
            "type": "paragraph",
            "paragraph": { "rich_text": [
                { "type": "text", "text": { "content": long }, "annotations": { "bold": true } }
            ] }
        })]);

        let runs = blocks[0]["paragraph"]["rich_text"]
            .as_array()
            .expect("rich text should be an array");
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|run| run["annotations"]["bold"] == true));
        assert_eq!(runs[2]["text"]["content"].as_str().map(str::len), Some(5));
    }
}
