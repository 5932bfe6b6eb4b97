//! URL fetching for the `fetch_url` tool and the web sub-agent.

use std::sync::OnceLock;

use regex::Regex;

use super::ToolError;

/// Maximum characters of page text returned.
const MAX_FETCH_CHARS: usize = 8_000;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|<[^>]+>").expect("valid tag pattern")
    })
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("valid url pattern"))
}

/// First http(s) URL in free text.
pub fn find_url(text: &str) -> Option<&str> {
    url_regex()
        .find(text)
        .map(|m| m.as_str().trim_end_matches(&['.', ',', ';', ':', '!', '?'][..]))
}

/// GET a URL and return its text; HTML is reduced to visible text.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, ToolError> {
    let parsed = reqwest::Url::parse(url.trim())
        .map_err(|e| ToolError::InvalidArguments(format!("invalid url {}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ToolError::InvalidArguments(format!(
            "unsupported url scheme: {}",
            parsed.scheme()
        )));
    }
    let res = client.get(parsed).send().await?;
    let status = res.status();
    if !status.is_success() {
        return Err(ToolError::Fetch(format!("{} returned {}", url, status)));
    }
    let is_html = res
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("html"))
        .unwrap_or(false);
    let body = res.text().await?;
    let text = if is_html { html_to_text(&body) } else { body };
    Ok(truncate(text))
}

fn html_to_text(html: &str) -> String {
    let stripped = tag_regex().replace_all(html, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_FETCH_CHARS {
        return text;
    }
    let mut out: String = text.chars().take(MAX_FETCH_CHARS).collect();
    out.push_str(" [truncated]");
    out
}
