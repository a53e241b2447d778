//! Data models passed between collaborators and pipeline stages.
//!
//! Every derived record is built fresh from its source record plus a model
//! reply; nothing here is mutated after a stage returns it.
//!
//! - [`Article`]: metadata and text as returned by news search or extraction
//! - [`TranslatedArticle`]: an article plus its Chinese counterparts
//! - [`StructuredSummary`]: summary, key points and sections
//! - [`EventRecord`]: subject/action/object/impact tuples
//! - [`KnowledgeCard`]: per-entity facts assembled from search results
//! - [`DigestReport`]: one end-to-end run over a news query

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker recorded when an article carries no language tag.
pub const UNKNOWN_LANGUAGE: &str = "未知语言";

/// A news article as returned by the search or fetch collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Article {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl Article {
    /// A copy of this article with `content` replaced by fetched text.
    pub fn with_content(&self, content: String) -> Article {
        Article {
            content: Some(content),
            ..self.clone()
        }
    }
}

/// An [`Article`] with translated fields. Absent source fields translate to
/// an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TranslatedArticle {
    #[serde(flatten)]
    pub article: Article,
    pub title_zh: String,
    pub description_zh: String,
    pub content_zh: String,
    pub original_language: String,
}

impl TranslatedArticle {
    /// Translated title, description and content joined by newlines; the
    /// input of the summarization and event stages.
    pub fn text_zh(&self) -> String {
        [
            self.title_zh.as_str(),
            self.description_zh.as_str(),
            self.content_zh.as_str(),
        ]
        .join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Section {
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StructuredSummary {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl StructuredSummary {
    /// The degraded form used when the model reply is not valid JSON.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self {
            summary: raw.into(),
            key_points: Vec::new(),
            sections: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EventRecord {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// Structured knowledge-graph fields kept on a card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EntityFacts {
    pub name: String,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub founded: Option<String>,
    pub headquarters: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardBody {
    Structured { facts: EntityFacts },
    Snippets { snippets: Vec<String> },
    NotFound,
    Error { message: String },
}

/// Human-readable facts about one entity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KnowledgeCard {
    pub entity: String,
    pub body: CardBody,
}

impl KnowledgeCard {
    pub fn is_error(&self) -> bool {
        matches!(self.body, CardBody::Error { .. })
    }
}

impl fmt::Display for KnowledgeCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            CardBody::Structured { facts } => {
                writeln!(f, "【{}】", self.entity)?;
                writeln!(f, "名称：{}", facts.name)?;
                for (label, value) in [
                    ("类型", &facts.kind),
                    ("简介", &facts.description),
                    ("官网", &facts.website),
                    ("成立时间", &facts.founded),
                    ("总部", &facts.headquarters),
                ] {
                    if let Some(v) = value {
                        writeln!(f, "{label}：{v}")?;
                    }
                }
                Ok(())
            }
            CardBody::Snippets { snippets } => {
                writeln!(f, "【{}】相关信息：", self.entity)?;
                for (i, s) in snippets.iter().enumerate() {
                    writeln!(f, "{}. {}", i + 1, s)?;
                }
                Ok(())
            }
            CardBody::NotFound => writeln!(f, "【{}】未找到相关信息", self.entity),
            CardBody::Error { message } => {
                writeln!(f, "【{}】查询失败：{}", self.entity, message)
            }
        }
    }
}

/// Result of processing one article end to end.
#[derive(Debug, Clone, Serialize)]
pub struct DigestEntry {
    pub article: TranslatedArticle,
    pub summary: StructuredSummary,
    pub events: Vec<EventRecord>,
    pub knowledge: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    Processed(Box<DigestEntry>),
    Failed { url: String, title: Option<String>, error: String },
}

/// One digest run. Serialized to JSON and rendered to Markdown.
#[derive(Debug, Clone, Serialize)]
pub struct DigestReport {
    pub local_date: String,
    pub time_of_day: String,
    pub local_time: String,
    pub query: Option<String>,
    pub searched: usize,
    pub kept_after_filter: usize,
    pub entries: Vec<EntryOutcome>,
}

impl DigestReport {
    pub fn processed(&self) -> impl Iterator<Item = &DigestEntry> {
        self.entries.iter().filter_map(|e| match e {
            EntryOutcome::Processed(entry) => Some(entry.as_ref()),
            EntryOutcome::Failed { .. } => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, EntryOutcome::Failed { .. }))
            .count()
    }
}
