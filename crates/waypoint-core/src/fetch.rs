//! The `ContentFetcher` trait and its HTTP implementation: fetch a
//! user-supplied URL and reduce the page to plain text for prompt
//! construction.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::FetchError;

/// Maximum characters of reduced text handed to prompt construction.
const MAX_CONTENT_LEN: usize = 30_000;

/// Pages shorter than this after reduction are treated as empty.
const MIN_CONTENT_LEN: usize = 100;

/// Fetch a URL and return its text content, already HTML-stripped and
/// length-capped.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ContentFetcher) {}
};

/// Reqwest-backed fetcher with a browser user agent.
pub struct HttpContentFetcher {
    client: Client,
}

impl HttpContentFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        tracing::info!(url = %url, "fetching source url");
        let response = self
            .client
            .get(url)
            .header(
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let text = html_to_text(&html);
        if text.len() < MIN_CONTENT_LEN {
            return Err(FetchError::TooShort);
        }
        Ok(text)
    }
}

/// Reduce an HTML document to the plain text a prompt can embed.
///
/// Drops scripts, styles, comments and page chrome (header, footer, nav,
/// aside), turns block elements into newlines, strips remaining tags,
/// decodes common entities, collapses whitespace, and caps the length.
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();

    for container in ["script", "style", "noscript", "header", "footer", "nav", "aside"] {
        text = drop_container(&text, container);
    }
    text = drop_comments(&text);

    // Block elements become line breaks so stops stay separated.
    text = replace_block_tags(&text);

    // Strip every remaining tag.
    text = strip_tags(&text);

    text = decode_entities(&text);

    // Collapse runs of whitespace.
    let mut collapsed = String::with_capacity(text.len());
    let mut prev_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\n' {
            if !prev_space {
                collapsed.push(' ');
            }
            prev_space = true;
        } else {
            collapsed.push(c);
            prev_space = c == '\n';
        }
    }
    let mut out = collapsed.trim().to_string();

    if out.len() > MAX_CONTENT_LEN {
        let mut cut = MAX_CONTENT_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("... [truncated]");
    }
    out
}

/// Remove `<tag ...> ... </tag>` including content, case-insensitively.
fn drop_container(html: &str, tag: &str) -> String {
    // ASCII lowering keeps byte offsets aligned with the original document.
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start_rel) = lower[pos..].find(&open) {
        let start = pos + start_rel;
        out.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end_rel) => pos = start + end_rel + close.len(),
            None => {
                // Unclosed container swallows the rest of the document.
                return out;
            }
        }
    }
    out.push_str(&html[pos..]);
    out
}

fn drop_comments(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(start_rel) = html[pos..].find("<!--") {
        let start = pos + start_rel;
        out.push_str(&html[pos..start]);
        match html[start..].find("-->") {
            Some(end_rel) => pos = start + end_rel + 3,
            None => return out,
        }
    }
    out.push_str(&html[pos..]);
    out
}

const BLOCK_TAGS: &[&str] = &["p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr"];

fn replace_block_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let Some(end) = tail.find('>') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let inner = &tail[..end];
        let name = inner
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if BLOCK_TAGS.contains(&name.as_str()) {
            out.push('\n');
        } else {
            // Leave the tag for strip_tags to remove as a single space.
            out.push('<');
            out.push_str(inner);
            out.push('>');
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        match tail.find('>') {
            Some(end) => {
                out.push(' ');
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entities(text: &str) -> String {
    let mut out = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'");

    // Decimal character references.
    while let Some(start) = out.find("&#") {
        let tail = &out[start + 2..];
        let Some(end) = tail.find(';') else { break };
        let digits = &tail[..end];
        if let Some(c) = digits.parse::<u32>().ok().and_then(char::from_u32) {
            out.replace_range(start..start + 2 + end + 1, &c.to_string());
        } else {
            break;
        }
    }
    out
}
