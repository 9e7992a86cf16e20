//! APPRENTICES: web_searcher and web_fetcher

use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use super::{
    parse_params, Capability, CapabilityDescriptor, CapabilityError, InvocationContext, ParamType,
};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const DUCKDUCKGO_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

fn selector(css: &str) -> Result<Selector, CapabilityError> {
    Selector::parse(css).map_err(|e| CapabilityError::new(format!("bad selector {}: {:?}", css, e)))
}

/// Web search: Brave Search API when a key is configured, DuckDuckGo HTML otherwise
pub struct WebSearcher {
    api_key: Option<String>,
    max_results: u32,
    brave_endpoint: String,
    ddg_endpoint: String,
    descriptor: CapabilityDescriptor,
}

impl WebSearcher {
    pub fn new(api_key: Option<String>, max_results: u32) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            max_results,
            brave_endpoint: BRAVE_ENDPOINT.to_string(),
            ddg_endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
            descriptor: CapabilityDescriptor::new(
                "web_searcher",
                "Search the web. Returns a list of {title, href, body} results.",
            )
            .required("query", ParamType::String, "Search query")
            .optional("num_results", ParamType::Integer, "Number of results (1-10)"),
        }
    }

    /// Point both backends somewhere else
    pub fn with_endpoints(mut self, brave: impl Into<String>, duckduckgo: impl Into<String>) -> Self {
        self.brave_endpoint = brave.into();
        self.ddg_endpoint = duckduckgo.into();
        self
    }

    async fn search_brave(
        &self,
        api_key: &str,
        query: &str,
        count: u32,
    ) -> Result<Vec<Value>, CapabilityError> {
        let response = reqwest::Client::new()
            .get(&self.brave_endpoint)
            .query(&[("q", query), ("count", &count.to_string())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::new(format!(
                "Search API returned {}",
                status
            )));
        }

        let data: Value = response.json().await?;
        Ok(parse_brave_results(&data, count as usize))
    }

    async fn search_duckduckgo(
        &self,
        query: &str,
        count: u32,
    ) -> Result<Vec<Value>, CapabilityError> {
        let response = reqwest::Client::new()
            .post(&self.ddg_endpoint)
            .form(&[("q", query)])
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(15))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::new(format!(
                "DuckDuckGo returned {}",
                status
            )));
        }

        let html = response.text().await?;
        parse_duckduckgo_results(&html, count as usize)
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    num_results: Option<i64>,
}

fn parse_brave_results(data: &Value, count: usize) -> Vec<Value> {
    data.get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|items| {
            items
                .iter()
                .take(count)
                .map(|item| {
                    let field = |k: &str| item.get(k).and_then(|v| v.as_str()).unwrap_or("");
                    json!({
                        "title": field("title"),
                        "href": field("url"),
                        "body": field("description"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// DuckDuckGo wraps result links in a `/l/?uddg=` redirect
fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

fn parse_duckduckgo_results(html: &str, count: usize) -> Result<Vec<Value>, CapabilityError> {
    let doc = Html::parse_document(html);
    let result_sel = selector(".result")?;
    let link_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut results = Vec::new();
    for result in doc.select(&result_sel) {
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let href = match link.value().attr("href") {
            Some(h) => unwrap_redirect(h),
            None => continue,
        };
        let title = link.text().collect::<String>().trim().to_string();
        let body = result
            .select(&snippet_sel)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        results.push(json!({ "title": title, "href": href, "body": body }));
        if results.len() >= count {
            break;
        }
    }
    Ok(results)
}

#[async_trait]
impl Capability for WebSearcher {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        params: Map<String, Value>,
        _ctx: &InvocationContext,
    ) -> Result<Value, CapabilityError> {
        let args: SearchArgs = parse_params(params)?;
        if args.query.trim().is_empty() {
            return Err(CapabilityError::new("Empty search query"));
        }
        let count = args
            .num_results
            .unwrap_or(self.max_results as i64)
            .clamp(1, 10) as u32;

        let results = match &self.api_key {
            Some(key) => {
                debug!("◆ SEARCHING (brave): {}", args.query);
                self.search_brave(key, &args.query, count).await?
            }
            None => {
                debug!("◆ SEARCHING (duckduckgo): {}", args.query);
                self.search_duckduckgo(&args.query, count).await?
            }
        };
        Ok(Value::Array(results))
    }
}

/// Fetches a URL and extracts readable content
pub struct WebFetcher {
    max_chars: usize,
    descriptor: CapabilityDescriptor,
}

impl WebFetcher {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            descriptor: CapabilityDescriptor::new(
                "web_fetcher",
                "Fetch a URL and extract readable content as markdown or plain text.",
            )
            .required("url", ParamType::String, "http(s) URL to fetch")
            .optional("mode", ParamType::String, "'markdown' (default) or 'text'")
            .optional("max_chars", ParamType::Integer, "Maximum characters returned"),
        }
    }
}

impl Default for WebFetcher {
    fn default() -> Self {
        Self::new(50000)
    }
}

#[derive(Deserialize)]
struct FetchArgs {
    url: String,
    mode: Option<String>,
    max_chars: Option<usize>,
}

fn html_to_markdown(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map_or(false, |e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(trimmed);
        }
    }
    out
}

fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = selector("title").ok()?;
    doc.select(&sel)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl Capability for WebFetcher {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        params: Map<String, Value>,
        _ctx: &InvocationContext,
    ) -> Result<Value, CapabilityError> {
        let args: FetchArgs = parse_params(params)?;
        let url = Url::parse(&args.url)
            .map_err(|e| CapabilityError::new(format!("Invalid URL {}: {}", args.url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CapabilityError::new(format!(
                "Unsupported scheme: {}",
                url.scheme()
            )));
        }
        let mode = args.mode.as_deref().unwrap_or("markdown");
        if mode != "markdown" && mode != "text" {
            return Err(CapabilityError::new(format!(
                "Unknown mode '{}': use 'markdown' or 'text'",
                mode
            )));
        }
        let max_chars = args.max_chars.unwrap_or(self.max_chars).max(1);

        debug!("◆ FETCHING: {} (mode: {})", url, mode);
        let response = reqwest::Client::new()
            .get(url)
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CapabilityError::new(format!(
                "{} returned {}",
                final_url, status
            )));
        }

        let is_html = content_type.contains("html") || body.trim_start().starts_with('<');
        let (title, text) = if !is_html {
            (None, body)
        } else if mode == "text" {
            (page_title(&body), html_to_text(&body))
        } else {
            (page_title(&body), html_to_markdown(&body))
        };

        let total = text.chars().count();
        let truncated = total > max_chars;
        let text = if truncated {
            text.chars().take(max_chars).collect()
        } else {
            text
        };

        Ok(json!({
            "url": args.url,
            "final_url": final_url,
            "status": status.as_u16(),
            "title": title,
            "text": text,
            "truncated": truncated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDG_PAGE: &str = r#"
        <html><body>
          <div class="result results_links">
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">Rust Programming Language</a>
            <a class="result__snippet">A language empowering everyone.</a>
          </div>
          <div class="result">
            <a class="result__a" href="https://doc.rust-lang.org/book/">The Book</a>
          </div>
          <div class="result"><span>no link here</span></div>
        </body></html>
    "#;

    #[test]
    fn test_parse_duckduckgo_results() {
        let results = parse_duckduckgo_results(DDG_PAGE, 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["title"], "Rust Programming Language");
        assert_eq!(results[0]["href"], "https://www.rust-lang.org/");
        assert_eq!(results[0]["body"], "A language empowering everyone.");
        assert_eq!(results[1]["href"], "https://doc.rust-lang.org/book/");
        assert_eq!(results[1]["body"], "");

        let one = parse_duckduckgo_results(DDG_PAGE, 1).unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn test_parse_brave_results() {
        let data = json!({"web": {"results": [
            {"title": "A", "url": "https://a.example", "description": "first"},
            {"title": "B", "url": "https://b.example"}
        ]}});
        let results = parse_brave_results(&data, 5);
        assert_eq!(
            results,
            vec![
                json!({"title": "A", "href": "https://a.example", "body": "first"}),
                json!({"title": "B", "href": "https://b.example", "body": ""}),
            ]
        );
        assert!(parse_brave_results(&json!({}), 5).is_empty());
    }

    #[test]
    fn test_html_to_text_skips_scripts() {
        let html = "<html><head><title>T</title><script>var x = 1;</script></head>\
                    <body><h1>Hello</h1><p>World</p><style>p{}</style></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("p{}"));
        assert_eq!(page_title(html).as_deref(), Some("T"));
    }

    #[test]
    fn test_html_to_markdown_keeps_content() {
        let md = html_to_markdown("<h1>Title</h1><p>Some <b>bold</b> text</p>");
        assert!(md.contains("Title"));
        assert!(md.contains("bold"));
    }

    #[tokio::test]
    async fn test_fetcher_rejects_bad_scheme() {
        let fetcher = WebFetcher::default();
        let mut params = Map::new();
        params.insert("url".to_string(), json!("file:///etc/passwd"));
        let err = fetcher
            .invoke(params, &InvocationContext::detached(1))
            .await
            .unwrap_err();
        assert!(err.message.contains("Unsupported scheme"));
    }
}
