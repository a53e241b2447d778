//! Entity knowledge cards.
//!
//! Two steps per article: one model call extracts up to five salient entity
//! names, then each name is looked up on its own. A failed lookup becomes an
//! error card for that entity only; the remaining names are still looked up.
//! Short input and empty extractions return sentinels without raising.

use crate::api::{AskAsync, ModelOutput, Prompt, ask_json};
use crate::batch::{ItemExecutor, Sequential};
use crate::models::{CardBody, EntityFacts, KnowledgeCard};
use crate::tools::KnowledgeSource;
use crate::utils::{preview, truncate_chars};
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{error, info, instrument, warn};

pub const TOO_SHORT: &str = "错误：新闻内容为空或过短";
pub const NO_ENTITIES: &str = "未提取到有效核心实体";
const COLLECTION_HEADER: &str = "【新闻核心实体知识卡片集合】";

const MIN_TEXT_CHARS: usize = 50;
const MAX_ENTITIES: usize = 5;
const DESCRIPTION_CHARS: usize = 200;
const SNIPPET_COUNT: usize = 3;
const PREVIEW_CHARS: usize = 100;

const EXTRACT_SYSTEM: &str = r#"你是专业的实体提取专家，从新闻内容中提取 3-5 个核心实体。
实体定义：
- 必须是新闻核心要素（公司、人物、政策、事件、机构、技术等）；
- 排除通用词汇（如"经济""市场"）；
- 名称准确完整（如"国家统计局"而非"统计局"）。

输出格式：严格返回 JSON 数组，仅含实体名称，无其他文本。
示例：["国家统计局", "CPI", "新能源汽车"]"#;

/// What the stage produced for one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityOutcome {
    TooShort,
    NoEntities,
    Failed { error: String },
    Cards { cards: Vec<KnowledgeCard> },
}

impl fmt::Display for EntityOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityOutcome::TooShort => f.write_str(TOO_SHORT),
            EntityOutcome::NoEntities => f.write_str(NO_ENTITIES),
            EntityOutcome::Failed { error } => write!(f, "EntityQuery Agent 处理异常：{error}"),
            EntityOutcome::Cards { cards } => {
                let blocks = cards
                    .iter()
                    .enumerate()
                    .map(|(i, card)| format!("===== 实体 {} =====\n{}", i + 1, card.to_string().trim_end()))
                    .join("\n\n");
                write!(f, "{COLLECTION_HEADER}\n\n{blocks}")
            }
        }
    }
}

/// One article of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct EntityBatchEntry {
    /// 1-based position in the batch.
    pub news_index: usize,
    pub news_preview: String,
    pub outcome: EntityOutcome,
    pub entity_knowledge_cards: String,
}

fn str_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build a card from a search payload: knowledge-graph facts first, then the
/// top organic snippets, else "not found".
pub fn card_from_payload(entity: &str, payload: &Value) -> KnowledgeCard {
    let body = if let Some(kg) = payload.get("knowledge_graph").filter(|kg| kg.is_object()) {
        CardBody::Structured {
            facts: EntityFacts {
                name: str_field(kg, "title").unwrap_or_else(|| entity.to_string()),
                kind: str_field(kg, "type"),
                description: str_field(kg, "description")
                    .map(|d| truncate_chars(&d, DESCRIPTION_CHARS, "...")),
                website: str_field(kg, "website"),
                founded: str_field(kg, "founded"),
                headquarters: str_field(kg, "headquarters"),
            },
        }
    } else {
        let snippets: Vec<String> = payload
            .get("organic_results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| str_field(r, "snippet"))
                    .take(SNIPPET_COUNT)
                    .collect()
            })
            .unwrap_or_default();
        if snippets.is_empty() {
            CardBody::NotFound
        } else {
            CardBody::Snippets { snippets }
        }
    };

    KnowledgeCard {
        entity: entity.to_string(),
        body,
    }
}

/// Entity names from an extraction reply: strings only, trimmed,
/// de-duplicated in reply order, capped at five.
fn entity_names(reply: Vec<Value>) -> Vec<String> {
    reply
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unique()
        .take(MAX_ENTITIES)
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub struct EntityStage<M, K> {
    model: M,
    knowledge: K,
}

impl<M: AskAsync, K: KnowledgeSource> EntityStage<M, K> {
    pub fn new(model: M, knowledge: K) -> Self {
        Self { model, knowledge }
    }

    #[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
    pub async fn run(&self, text: &str) -> EntityOutcome {
        if text.chars().count() < MIN_TEXT_CHARS {
            warn!("Article text too short for entity extraction");
            return EntityOutcome::TooShort;
        }

        let prompt = Prompt::new(EXTRACT_SYSTEM, format!("新闻内容：\n{text}"));
        let names = match ask_json::<_, Value>(&self.model, &prompt).await {
            Ok(ModelOutput::Parsed(Value::Array(items))) => entity_names(items),
            Ok(ModelOutput::Parsed(other)) => {
                warn!(reply = %other, "Entity reply is not a list");
                Vec::new()
            }
            Ok(ModelOutput::Malformed { .. }) => Vec::new(),
            Err(e) => {
                error!(error = %e, "Entity extraction failed");
                return EntityOutcome::Failed { error: e.to_string() };
            }
        };
        if names.is_empty() {
            return EntityOutcome::NoEntities;
        }
        info!(count = names.len(), entities = ?names, "Extracted entities");

        let total = names.len();
        let cards = Sequential
            .run(names, |i, name| async move {
                info!(index = i + 1, total, entity = %name, "Looking up entity");
                match self.knowledge.lookup(&name).await {
                    Ok(payload) => card_from_payload(&name, &payload),
                    Err(e) => {
                        warn!(entity = %name, error = %e, "Entity lookup failed");
                        KnowledgeCard {
                            entity: name,
                            body: CardBody::Error { message: e.to_string() },
                        }
                    }
                }
            })
            .await;

        let failed = cards.iter().filter(|c| c.is_error()).count();
        info!(cards = cards.len(), failed, "Knowledge cards assembled");
        EntityOutcome::Cards { cards }
    }

    /// One entry per text, in input order.
    pub async fn run_batch(&self, texts: Vec<String>) -> Vec<EntityBatchEntry> {
        if texts.is_empty() {
            warn!("Entity batch is empty");
            return Vec::new();
        }
        let total = texts.len();
        Sequential
            .run(texts, |i, text| async move {
                info!(index = i + 1, total, "Entity batch item");
                let outcome = self.run(&text).await;
                EntityBatchEntry {
                    news_index: i + 1,
                    news_preview: preview(&text, PREVIEW_CHARS),
                    entity_knowledge_cards: outcome.to_string(),
                    outcome,
                }
            })
            .await
    }
}
