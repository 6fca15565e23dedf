use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, input: Value) -> Result<Value>;
}

/// Fetches a page and reduces it to readable text.
///
/// Input: `{"url": "..."}`. Output: `{"url", "title", "text"}`.
pub struct WebPageTool {
    http: Client,
    max_chars: usize,
}

impl WebPageTool {
    pub fn new(timeout: Duration, max_chars: usize) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("agentpay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build web page HTTP client")?;
        Ok(Self { http, max_chars })
    }
}

#[async_trait]
impl Tool for WebPageTool {
    fn name(&self) -> &'static str {
        "fetch_web_page"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let url = input
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("fetch_web_page requires a string `url`"))?;

        let response =
            self.http.get(url).send().await.with_context(|| format!("failed to fetch {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("fetching {url} returned {status}");
        }
        let html = response.text().await.with_context(|| format!("failed to read {url}"))?;

        let page = html_to_text(&html);
        let truncated = page.text.chars().count() > self.max_chars;
        let text: String = page.text.chars().take(self.max_chars).collect();
        info!(
            event_name = "agent.tool.page_fetched",
            url,
            chars = text.chars().count(),
            truncated,
            "web page fetched"
        );

        Ok(json!({"url": url, "title": page.title, "text": text}))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageText {
    pub title: Option<String>,
    pub text: String,
}

/// Strips markup from an HTML document.
///
/// Drops `script`, `style` and `noscript` bodies, turns tags into word
/// breaks, decodes common entities and collapses whitespace.
pub fn html_to_text(html: &str) -> PageText {
    let lower = html.to_ascii_lowercase();
    let mut title = None;
    let mut raw = String::with_capacity(html.len());
    let mut cursor = 0;

    while let Some(offset) = lower[cursor..].find('<') {
        let start = cursor + offset;
        raw.push_str(&html[cursor..start]);

        let Some(close) = lower[start..].find('>') else {
            cursor = html.len();
            break;
        };
        let end = start + close + 1;
        let inner = &lower[start + 1..end - 1];
        let tag = tag_name(inner);

        match tag {
            // A stray closing tag has no body to skip.
            "script" | "style" | "noscript" | "title" if !inner.starts_with('/') => {
                let closing = format!("</{tag}");
                let body_end = lower[end..].find(&closing).map_or(html.len(), |found| end + found);
                if tag == "title" && title.is_none() {
                    let value = collapse_whitespace(&decode_entities(&html[end..body_end]));
                    title = Some(value).filter(|value| !value.is_empty());
                }
                cursor = lower[body_end..].find('>').map_or(html.len(), |found| body_end + found + 1);
            }
            _ => {
                raw.push(' ');
                cursor = end;
            }
        }
    }
    if cursor < html.len() {
        raw.push_str(&html[cursor..]);
    }

    PageText { title, text: collapse_whitespace(&decode_entities(&raw)) }
}

fn tag_name(inner: &str) -> &str {
    let inner = inner.trim_start_matches('/');
    let end = inner
        .find(|ch: char| ch.is_whitespace() || ch == '/' || ch == '>')
        .unwrap_or(inner.len());
    &inner[..end]
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
