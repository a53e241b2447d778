//! External collaborators reached over HTTP.
//!
//! | Collaborator | Module | Service |
//! |--------------|--------|---------|
//! | News metadata search | [`news_search`] | NewsAPI `top-headlines` / `everything` |
//! | Content extractor | [`content`] | reader service, or direct fetch + HTML stripping |
//! | Entity/knowledge search | [`knowledge`] | SerpAPI |
//! | Rendering engine | [`browser`] | W3C WebDriver (chromedriver) |
//!
//! Stages depend on the traits below rather than on the concrete clients.
//! Every call is a single round trip bounded by the client's timeout.

use crate::error::Result;
use crate::models::Article;
use std::path::Path;

pub mod browser;
pub mod content;
pub mod knowledge;
pub mod news_search;

pub use news_search::NewsQuery;

pub trait NewsSource {
    async fn search(&self, query: &NewsQuery) -> Result<Vec<Article>>;
}

pub trait ContentSource {
    /// Cleaned article text for `url`, length-capped.
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub trait KnowledgeSource {
    /// Raw search payload for an entity name.
    async fn lookup(&self, entity: &str) -> Result<serde_json::Value>;
}

/// An off-process renderer holding a session that must be closed.
pub trait RenderEngine {
    /// Load `document` and write a raster snapshot to `output`.
    async fn capture(&self, document: &Path, output: &Path) -> Result<()>;

    /// Release the session.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

impl<T: NewsSource + ?Sized> NewsSource for &T {
    async fn search(&self, query: &NewsQuery) -> Result<Vec<Article>> {
        (**self).search(query).await
    }
}

impl<T: ContentSource + ?Sized> ContentSource for &T {
    async fn fetch(&self, url: &str) -> Result<String> {
        (**self).fetch(url).await
    }
}

impl<T: KnowledgeSource + ?Sized> KnowledgeSource for &T {
    async fn lookup(&self, entity: &str) -> Result<serde_json::Value> {
        (**self).lookup(entity).await
    }
}
