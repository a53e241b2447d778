//! Article text extraction.
//!
//! With a reader service configured, `GET {reader_base}/{url}` returns
//! cleaned text directly. Without one, the page is fetched and its
//! paragraphs are pulled out with CSS selectors, preferring paragraphs
//! inside `<article>`.
//!
//! Output longer than `max_chars` is cut and marked with
//! [`TRUNCATION_MARKER`].

use crate::config::{Credentials, ExtractorConfig};
use crate::error::{PipelineError, Result};
use crate::tools::ContentSource;
use crate::utils::{truncate_chars, truncate_for_log};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

pub const TRUNCATION_MARKER: &str = "\n\n[内容过长，已截断]";

static HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static ARTICLE_PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("article p").unwrap());
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

#[derive(Debug, Clone)]
pub struct ContentExtractor {
    http: reqwest::Client,
    reader_base: Option<String>,
    reader_key: Option<String>,
    max_chars: usize,
}

impl ContentExtractor {
    pub fn new(config: &ExtractorConfig, credentials: &Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("news_pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            reader_base: config
                .reader_base
                .as_ref()
                .map(|b| b.trim_end_matches('/').to_string()),
            reader_key: credentials.optional(&config.api_key_name),
            max_chars: config.max_chars,
        })
    }

    async fn get_text(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Status {
                service: "extractor",
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }
        Ok(body)
    }
}

impl ContentSource for ContentExtractor {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url.trim())?;

        let text = match &self.reader_base {
            Some(base) => {
                let mut request = self
                    .http
                    .get(format!("{base}/{parsed}"))
                    .header("Accept", "text/plain");
                if let Some(key) = &self.reader_key {
                    request = request.bearer_auth(key);
                }
                collapse_blank_lines(&self.get_text(request).await?)
            }
            None => {
                let html = self.get_text(self.http.get(parsed.as_str())).await?;
                extract_text(&html)
            }
        };

        if text.trim().is_empty() {
            return Err(PipelineError::service("extractor", "no article text found"));
        }

        let chars = text.chars().count();
        info!(chars, capped = chars > self.max_chars, "Extracted article text");
        Ok(truncate_chars(&text, self.max_chars, TRUNCATION_MARKER))
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Headline plus paragraph text of an HTML page.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut paragraphs: Vec<String> = document
        .select(&ARTICLE_PARAGRAPHS)
        .map(element_text)
        .filter(|p| !p.is_empty())
        .collect();
    if paragraphs.is_empty() {
        paragraphs = document
            .select(&PARAGRAPHS)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .collect();
    }

    let mut content = String::new();
    if let Some(headline) = document.select(&HEADLINE).next().map(element_text) {
        if !headline.is_empty() {
            content.push_str(&headline);
            content.push('\n');
        }
    }
    content.push_str(&paragraphs.join("\n"));
    content
}

fn collapse_blank_lines(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
