//! Web tools: Tavily search, single-page fetch and plain HTTP calls
//!
//! Not a crawler. `fetch_page` visits one URL and extracts the title plus a
//! short body snippet. All network failures are folded into the returned
//! values so abilities can surface them to the model instead of aborting.

use anyhow::{Result, Context};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::SearchConfig;

/// Timeout for every web call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Body snippet cap for page fetches
const SNIPPET_CHARS: usize = 1200;

/// Cap on extracted plain text
const EXTRACT_CHARS: usize = 4000;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// One web search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Tavily-backed web search with graceful degradation when unconfigured
#[derive(Clone)]
pub struct WebSearch {
    client: Client,
    api_key: String,
    max_results: usize,
}

impl WebSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: config.tavily_api_key.clone(),
            max_results: config.max_results,
        })
    }

    /// Search the web. When no API key is configured, a single informative
    /// result is returned instead of an error.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        if self.api_key.is_empty() {
            return vec![SearchResult {
                title: "Search disabled".to_string(),
                url: String::new(),
                content: "No Tavily API key configured".to_string(),
            }];
        }

        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
        };

        debug!(query = %query, "web search");

        let response = match self.client.post(TAVILY_ENDPOINT).json(&request).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return vec![SearchResult {
                    title: "Search error".to_string(),
                    url: String::new(),
                    content: e.to_string(),
                }]
            }
        };

        match response.json::<TavilyResponse>().await {
            Ok(parsed) => parsed.results,
            Err(e) => vec![SearchResult {
                title: "Search error".to_string(),
                url: String::new(),
                content: e.to_string(),
            }],
        }
    }
}

/// Fetch a single page and return its title plus a short body snippet.
/// Errors come back as text for model awareness.
pub async fn fetch_page(url: &str) -> String {
    let client = match Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => return format!("FETCH_ERROR: {e}"),
    };

    if let Err(e) = validate_url(url) {
        return format!("FETCH_ERROR: {e}");
    }

    let body = match client.get(url).send().await {
        Ok(resp) => match resp.text().await {
            Ok(body) => body,
            Err(e) => return format!("FETCH_ERROR: {e}"),
        },
        Err(e) => return format!("FETCH_ERROR: {e}"),
    };

    let title = extract_title(&body).unwrap_or_default();
    let text = extract_text(&body);
    let snippet: String = text.chars().take(SNIPPET_CHARS).collect();

    format!("TITLE: {title}\nBODY_SNIPPET:\n{snippet}")
}

/// GET a URL and return status plus a short body
pub async fn http_get(url: &str) -> String {
    if let Err(e) = validate_url(url) {
        return format!("HTTP_GET_ERROR: {e}");
    }

    let client = match Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => return format!("HTTP_GET_ERROR: {e}"),
    };

    match client.get(url).send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let clipped: String = body.chars().take(SNIPPET_CHARS).collect();
            format!("STATUS={status}\n{clipped}")
        }
        Err(e) => format!("HTTP_GET_ERROR: {e}"),
    }
}

/// POST a JSON string payload and return status plus a short response
pub async fn http_post(url: &str, json_payload: &str) -> String {
    if let Err(e) = validate_url(url) {
        return format!("HTTP_POST_ERROR: {e}");
    }

    let client = match Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => return format!("HTTP_POST_ERROR: {e}"),
    };

    let result = client.post(url)
        .header("Content-Type", "application/json")
        .body(json_payload.to_string())
        .send()
        .await;

    match result {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let clipped: String = body.chars().take(SNIPPET_CHARS).collect();
            format!("STATUS={status}\n{clipped}")
        }
        Err(e) => format!("HTTP_POST_ERROR: {e}"),
    }
}

/// Only plain http(s) URLs are fetchable
fn validate_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url).context("invalid URL")?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => anyhow::bail!("unsupported URL scheme '{other}'"),
    }
}

/// Extract the document title, if any
fn extract_title(html: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("title").ok()?;
    document.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

/// Regex-based HTML to text extraction, capped at a few KB.
pub fn extract_text(html: &str) -> String {
    use std::sync::OnceLock;

    static SCRIPT_RE: OnceLock<regex::Regex> = OnceLock::new();
    static STYLE_RE: OnceLock<regex::Regex> = OnceLock::new();
    static TAG_RE: OnceLock<regex::Regex> = OnceLock::new();
    static WS_RE: OnceLock<regex::Regex> = OnceLock::new();

    let script_re = SCRIPT_RE.get_or_init(|| {
        regex::Regex::new(r"(?is)<script.*?</script>").expect("static regex")
    });
    let style_re = STYLE_RE.get_or_init(|| {
        regex::Regex::new(r"(?is)<style.*?</style>").expect("static regex")
    });
    let tag_re = TAG_RE.get_or_init(|| {
        regex::Regex::new(r"<[^>]+>").expect("static regex")
    });
    let ws_re = WS_RE.get_or_init(|| {
        regex::Regex::new(r"\s+").expect("static regex")
    });

    let text = script_re.replace_all(html, " ");
    let text = style_re.replace_all(&text, " ");
    let text = tag_re.replace_all(&text, " ");
    let text = ws_re.replace_all(&text, " ");
    let text = text.trim();

    text.chars().take(EXTRACT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_strips_tags() {
        let html = "<html><body><p>Hello <b>world</b></p></body></html>";
        assert_eq!(extract_text(html), "Hello world");
    }

    #[test]
    fn test_extract_text_drops_scripts_and_styles() {
        let html = "<script>alert('x')</script><style>body{}</style><p>visible</p>";
        assert_eq!(extract_text(html), "visible");
    }

    #[test]
    fn test_extract_text_collapses_whitespace() {
        let html = "<p>a</p>\n\n   <p>b</p>";
        assert_eq!(extract_text(html), "a b");
    }

    #[test]
    fn test_extract_title() {
        let html = "<html><head><title>  My Page </title></head><body/></html>";
        assert_eq!(extract_title(html), Some("My Page".to_string()));
        assert_eq!(extract_title("<p>no title</p>"), None);
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://example.com/page").is_ok());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_search_without_key_degrades() {
        let config = SearchConfig {
            tavily_api_key: String::new(),
            max_results: 5,
        };
        let search = WebSearch::new(&config).unwrap();

        let results = search.search("anything").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Search disabled");
    }
}
