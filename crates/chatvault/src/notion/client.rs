use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

use super::blocks::{MAX_BLOCKS_PER_REQUEST, sanitize_blocks};
use super::pacing::Pacer;

pub const NOTION_VERSION: &str = "2022-06-28";
pub const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";
const PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request/response exchange with the remote API.
///
/// `path` is relative to the API base (for example `/pages`). Success bodies
/// are returned as JSON, empty bodies as `Value::Null`; non-success statuses
/// must surface as [`RemoteApiError`].
pub trait NotionTransport {
    fn send(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value>;
}

/// A failed remote call. Status `0` means the API could not be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteApiError {
    pub status: u16,
    pub method: HttpMethod,
    pub path: String,
    pub body: String,
}

impl RemoteApiError {
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        self.status == 0
    }
}

impl std::fmt::Display for RemoteApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unreachable() {
            return write!(
                f,
                "could not reach the Notion API for {} {} ({}); if direct access is blocked, pass --proxy-url to route requests through a relay",
                self.method, self.path, self.body
            );
        }
        write!(
            f,
            "Notion API error {} on {} {}: {}",
            self.status, self.method, self.path, self.body
        )
    }
}

impl std::error::Error for RemoteApiError {}

/// Base URL for API calls. Relay URLs are used verbatim minus trailing
/// slashes; the relay is expected to add the version segment itself.
#[must_use]
pub fn resolve_base_url(proxy_url: Option<&str>) -> String {
    proxy_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map_or(DEFAULT_API_BASE, |url| url.trim_end_matches('/'))
        .to_string()
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(token: &str, proxy_url: Option<&str>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: resolve_base_url(proxy_url),
            token: token.to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl NotionTransport for HttpTransport {
    fn send(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let request = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Patch => self.client.patch(&url),
        };
        let mut request = request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION);
        if let Some(body) = body {
            request = request.json(body);
        }

        let unreachable = |error: reqwest::Error| RemoteApiError {
            status: 0,
            method,
            path: path.to_string(),
            body: error.to_string(),
        };
        let response = request.send().map_err(unreachable)?;
        let status = response.status();
        let text = response.text().map_err(unreachable)?;

        if !status.is_success() {
            return Err(RemoteApiError {
                status: status.as_u16(),
                method,
                path: path.to_string(),
                body: text,
            }
            .into());
        }
        if status == reqwest::StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Notion API returned invalid JSON for {method} {path}"))
    }
}

/// Paced, cancellable access to the Notion operations the sync engine uses.
///
/// The stop flag is checked before and after every call, and every
/// state-mutating call is followed by the pacing delay.
pub struct NotionClient<'a> {
    transport: &'a dyn NotionTransport,
    pacer: Pacer<'a>,
    requests: usize,
    blocks_sent: usize,
}

impl<'a> NotionClient<'a> {
    #[must_use]
    pub fn new(transport: &'a dyn NotionTransport, pacer: Pacer<'a>) -> Self {
        Self {
            transport,
            pacer,
            requests: 0,
            blocks_sent: 0,
        }
    }

    #[must_use]
    pub const fn requests(&self) -> usize {
        self.requests
    }

    #[must_use]
    pub const fn blocks_sent(&self) -> usize {
        self.blocks_sent
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.pacer.checkpoint()
    }

    pub fn retrieve_database(&mut self, database_id: &str) -> Result<Value> {
        self.call(HttpMethod::Get, &format!("/databases/{database_id}"), None)
    }

    /// Every record matching `filter`, following `start_cursor` pagination.
    pub fn query_database(&mut self, database_id: &str, filter: &Value) -> Result<Vec<Value>> {
        let path = format!("/databases/{database_id}/query");
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "filter": filter, "page_size": PAGE_SIZE });
            if let Some(cursor) = cursor.as_deref() {
                body["start_cursor"] = Value::String(cursor.to_string());
            }
            let response = self.call(HttpMethod::Post, &path, Some(&body))?;
            let (page, next) = page_of_results(&response);
            results.extend(page);
            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(results),
            }
        }
    }

    /// Every child block of `block_id`, following `start_cursor` pagination.
    pub fn list_children(&mut self, block_id: &str) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let path = match cursor.as_deref() {
                Some(cursor) => {
                    format!("/blocks/{block_id}/children?page_size={PAGE_SIZE}&start_cursor={cursor}")
                }
                None => format!("/blocks/{block_id}/children?page_size={PAGE_SIZE}"),
            };
            let response = self.call(HttpMethod::Get, &path, None)?;
            let (page, next) = page_of_results(&response);
            results.extend(page);
            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(results),
            }
        }
    }

    /// Creates a page with its body and returns the new page id.
    ///
    /// Blocks are sanitized first; at most one batch travels with the create
    /// call and the remainder is appended afterwards.
    pub fn create_page(&mut self, mut page: Value, blocks: Vec<Value>) -> Result<String> {
        let mut blocks = sanitize_blocks(blocks);
        let overflow = if blocks.len() > MAX_BLOCKS_PER_REQUEST {
            blocks.split_off(MAX_BLOCKS_PER_REQUEST)
        } else {
            Vec::new()
        };
        self.blocks_sent += blocks.len();
        page["children"] = Value::Array(blocks);

        let response = self.call(HttpMethod::Post, "/pages", Some(&page))?;
        let page_id = response
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Notion API created a page without returning its id"))?;
        self.pacer.pause()?;

        if !overflow.is_empty() {
            self.append_sanitized(&page_id, overflow)?;
        }
        Ok(page_id)
    }

    /// Soft-deletes a page or database record.
    pub fn archive_page(&mut self, page_id: &str) -> Result<()> {
        self.call(
            HttpMethod::Patch,
            &format!("/pages/{page_id}"),
            Some(&json!({ "archived": true })),
        )?;
        self.pacer.pause()
    }

    pub fn append_children(&mut self, block_id: &str, blocks: Vec<Value>) -> Result<()> {
        self.append_sanitized(block_id, sanitize_blocks(blocks))
    }

    fn append_sanitized(&mut self, block_id: &str, blocks: Vec<Value>) -> Result<()> {
        let path = format!("/blocks/{block_id}/children");
        for batch in blocks.chunks(MAX_BLOCKS_PER_REQUEST) {
            self.call(
                HttpMethod::Patch,
                &path,
                Some(&json!({ "children": batch })),
            )?;
            self.blocks_sent += batch.len();
            self.pacer.pause()?;
        }
        Ok(())
    }

    fn call(&mut self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        self.pacer.checkpoint()?;
        self.requests += 1;
        let response = self.transport.send(method, path, body)?;
        self.pacer.checkpoint()?;
        Ok(response)
    }
}

fn page_of_results(response: &Value) -> (Vec<Value>, Option<String>) {
    let results = response
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let has_more = response
        .get("has_more")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let next = response
        .get("next_cursor")
        .and_then(Value::as_str)
        .filter(|cursor| has_more && !cursor.is_empty())
        .map(str::to_string);
    (results, next)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_API_BASE, HttpMethod, RemoteApiError, resolve_base_url};

    #[test]
    fn base_url_defaults_to_public_api() {
        assert_eq!(resolve_base_url(None), DEFAULT_API_BASE);
        assert_eq!(resolve_base_url(Some("   ")), DEFAULT_API_BASE);
    }

    #[test]
    fn relay_url_is_used_verbatim_without_trailing_slashes() {
        assert_eq!(
            resolve_base_url(Some(" https://relay.example.com/notion/// ")),
            "https://relay.example.com/notion"
        );
    }

    #[test]
    fn unreachable_error_points_at_proxy_flag() {
        let error = RemoteApiError {
            status: 0,
            method: HttpMethod::Post,
            path: "/pages".to_string(),
            body: "connection refused".to_string(),
        };
        assert!(error.to_string().contains("--proxy-url"));

        let rejected = RemoteApiError {
            status: 400,
            ..error
        };
        assert_eq!(
            rejected.to_string(),
            "Notion API error 400 on POST /pages: connection refused"
        );
    }
}
