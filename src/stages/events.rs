//! Event extraction: article text to subject/action/object/impact records.

use crate::api::{AskAsync, ModelOutput, Prompt, ask_json};
use crate::error::Result;
use crate::models::EventRecord;
use itertools::Itertools;
use tracing::{info, instrument, warn};

const EVENTS_SYSTEM: &str = "你是一个专业新闻事件抽取助手。";

fn events_prompt(text: &str) -> Prompt {
    Prompt::new(
        EVENTS_SYSTEM,
        format!(
            "请从以下新闻内容中抽取所有核心事件，每条事件包括：\
             主语(subject)、动作(action)、客体(object)、影响(impact)，\
             并列出相关实体关键词(entities)，请以 JSON 数组格式输出，示例：\n\
             [\n  {{\"subject\": \"科技公司\", \"action\": \"发布\", \"object\": \"AI芯片\", \
             \"impact\": \"训练速度提升2倍\", \"entities\": [\"科技公司\", \"AI芯片\"]}}\n]\n\n\
             新闻内容：\n{text}"
        ),
    )
}

#[derive(Debug)]
pub struct EventStage<M> {
    model: M,
}

impl<M: AskAsync> EventStage<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Events in reply order. A reply that is not a JSON array of events
    /// yields an empty list; only a failed call is returned as `Err`.
    #[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
    pub async fn extract(&self, text: &str) -> Result<Vec<EventRecord>> {
        match ask_json::<_, Vec<EventRecord>>(&self.model, &events_prompt(text)).await? {
            ModelOutput::Parsed(events) => {
                let events: Vec<EventRecord> = events
                    .into_iter()
                    .map(|mut e| {
                        e.entities = e
                            .entities
                            .into_iter()
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .unique()
                            .collect();
                        e
                    })
                    .collect();
                info!(count = events.len(), "Extracted events");
                Ok(events)
            }
            ModelOutput::Malformed { error, .. } => {
                warn!(%error, "Event reply is not a JSON array; returning no events");
                Ok(Vec::new())
            }
        }
    }
}
