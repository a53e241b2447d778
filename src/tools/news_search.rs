//! NewsAPI article metadata search.
//!
//! Two endpoints are supported: `top-headlines` (category/country filters)
//! and `everything` (date range and sort order). Both return the same
//! article shape, mapped here onto [`Article`].

use crate::config::{Credentials, NewsConfig};
use crate::error::{PipelineError, Result};
use crate::models::Article;
use crate::tools::NewsSource;
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Endpoint {
    #[default]
    TopHeadlines,
    Everything,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::TopHeadlines => "top-headlines",
            Endpoint::Everything => "everything",
        }
    }
}

/// Query and filters for one search.
#[derive(Debug, Clone)]
pub struct NewsQuery {
    pub endpoint: Endpoint,
    pub query: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub sort_by: Option<String>,
    pub page: Option<u32>,
    pub page_size: u32,
}

impl Default for NewsQuery {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::TopHeadlines,
            query: None,
            category: Some("technology".to_string()),
            language: Some("en".to_string()),
            country: None,
            from: None,
            to: None,
            sort_by: None,
            page: None,
            page_size: 50,
        }
    }
}

impl NewsQuery {
    /// Query parameters accepted by the selected endpoint.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("pageSize", self.page_size.to_string())];
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                params.push((key, v));
            }
        };
        push("q", self.query.clone());
        push("language", self.language.clone());
        push("page", self.page.map(|p| p.to_string()));
        match self.endpoint {
            Endpoint::TopHeadlines => {
                push("category", self.category.clone());
                push("country", self.country.clone());
            }
            Endpoint::Everything => {
                push("from", self.from.map(|d| d.to_string()));
                push("to", self.to.map(|d| d.to_string()));
                push("sortBy", self.sort_by.clone());
            }
        }
        params
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    #[serde(default)]
    source: Option<NewsApiSource>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Deserialize)]
struct NewsApiSource {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Clone)]
pub struct NewsSearch {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for NewsSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsSearch")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl NewsSearch {
    pub fn new(config: &NewsConfig, credentials: &Credentials) -> Result<Self> {
        let api_key = credentials.resolve(&config.api_key_name)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

impl NewsSource for NewsSearch {
    #[instrument(level = "info", skip_all, fields(endpoint = ?query.endpoint, q = ?query.query))]
    async fn search(&self, query: &NewsQuery) -> Result<Vec<Article>> {
        let url = format!("{}/{}", self.base_url, query.endpoint.path());
        let response = self
            .http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(&query.params())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Status {
                service: "newsapi",
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let parsed: NewsApiResponse = serde_json::from_str(&body)?;
        if parsed.status != "ok" {
            return Err(PipelineError::service(
                "newsapi",
                parsed.message.unwrap_or(parsed.status),
            ));
        }

        let language = query.language.clone();
        let articles: Vec<Article> = parsed
            .articles
            .into_iter()
            .filter_map(|item| {
                let url = item.url?;
                Some(Article {
                    url,
                    title: item.title,
                    description: item.description,
                    content: item.content,
                    source: item.source.and_then(|s| s.name),
                    published_at: item.published_at,
                    language: language.clone(),
                })
            })
            .collect();

        info!(count = articles.len(), "Fetched news metadata");
        debug!(urls = ?articles.iter().map(|a| &a.url).collect::<Vec<_>>(), "News URLs");
        Ok(articles)
    }
}
