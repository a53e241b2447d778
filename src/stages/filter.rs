//! LLM news filter: keep only the entries the model judges to be genuine
//! news reporting.
//!
//! The model sees the whole list and answers with the zero-based positions
//! to keep. Any failure (transport error, non-list reply, out-of-range
//! position) fails open and returns the input unchanged.

use crate::api::{AskAsync, ModelOutput, Prompt, ask_json};
use crate::models::Article;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{error, info, instrument, warn};

const FILTER_SYSTEM: &str = r#"你是一位专业的新闻内容审核员。你的任务是从提供的新闻元数据列表中，筛选出那些属于"真正的新闻报道"的条目。

判断标准：
- 是新闻：对最近发生的事件、趋势、研究成果或重要信息进行客观报道的内容。例如，科技公司发布新产品、政府出台新政策、学术机构发表研究论文等。
- 不是新闻：
    - 广告、赞助内容、产品促销或评测。
    - 个人博客、论坛帖子、社交媒体分享。
    - 公司发布的公关稿（Press Release）。
    - 教程、指南、How-to 文章。
    - 娱乐八卦、未经证实的谣言。

你的输出格式必须是一个 JSON 数组，其中包含你判断为"是新闻"的条目的原始索引 (index)，索引从 0 开始。
请只返回 JSON 数组，不要添加任何其他解释或文本。
例如，如果第 0 条和第 2 条是新闻，你的输出应该是：[0, 2]"#;

/// Why the stage returned the input unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rejection {
    NotAList,
    BadIndex(String),
}

/// Positions to keep, in list order. Any bad element rejects the reply.
fn selected_positions(reply: Vec<Value>, len: usize) -> Result<BTreeSet<usize>, Rejection> {
    reply
        .into_iter()
        .map(|v| match v.as_u64().map(|i| i as usize) {
            Some(i) if i < len => Ok(i),
            _ => Err(Rejection::BadIndex(v.to_string())),
        })
        .collect()
}

#[derive(Debug)]
pub struct FilterStage<M> {
    model: M,
}

impl<M: AskAsync> FilterStage<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn run(&self, articles: Vec<Article>) -> Vec<Article> {
        if articles.is_empty() {
            warn!("Filter input is empty");
            return articles;
        }

        let listing = match serde_json::to_string_pretty(&articles) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize filter input; keeping all articles");
                return articles;
            }
        };
        let prompt = Prompt::new(FILTER_SYSTEM, format!("请审核以下新闻元数据列表：\n{listing}"));

        let decision = match ask_json::<_, Value>(&self.model, &prompt).await {
            Ok(ModelOutput::Parsed(Value::Array(items))) => selected_positions(items, articles.len()),
            Ok(ModelOutput::Parsed(_)) | Ok(ModelOutput::Malformed { .. }) => Err(Rejection::NotAList),
            Err(e) => {
                error!(error = %e, "Filter call failed; keeping all articles");
                return articles;
            }
        };

        match decision {
            Ok(keep) => {
                info!(kept = keep.len(), total = articles.len(), "Filtered news list");
                articles
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| keep.contains(i))
                    .map(|(_, a)| a)
                    .collect()
            }
            Err(rejection) => {
                warn!(?rejection, "Filter reply unusable; keeping all articles");
                articles
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn articles(n: usize) -> Vec<Article> {
        (0..n)
            .map(|i| Article {
                url: format!("https://example.com/{i}"),
                title: Some(format!("title {i}")),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_call() {
        let model = ScriptedModel::default();
        let out = FilterStage::new(&model).run(Vec::new()).await;
        assert!(out.is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_keeps_selected_positions_in_order() {
        let model = ScriptedModel::replying(&["```json\n[2, 0, 2]\n```"]);
        let input = articles(4);
        let out = FilterStage::new(&model).run(input.clone()).await;
        assert_eq!(out, vec![input[0].clone(), input[2].clone()]);
        assert!(model.prompts()[0].user.contains("https://example.com/3"));
    }

    #[tokio::test]
    async fn test_fenced_selection_after_prose() {
        let model = ScriptedModel::replying(&["以下是新闻条目的索引：\n```json\n[0]\n```"]);
        let input = articles(3);
        let out = FilterStage::new(&model).run(input.clone()).await;
        assert_eq!(out, vec![input[0].clone()]);
    }

    #[tokio::test]
    async fn test_empty_selection_drops_everything() {
        let model = ScriptedModel::replying(&["[]"]);
        let out = FilterStage::new(&model).run(articles(3)).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_call_failure_fails_open() {
        let model = ScriptedModel::failing("connection reset");
        let input = articles(3);
        let out = FilterStage::new(&model).run(input.clone()).await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_malformed_replies_fail_open() {
        for reply in ["", "第0条和第2条是新闻", r#"{"indices": [0]}"#, "[0, 7]", r#"[0, "1"]"#, "[-1]"] {
            let model = ScriptedModel::replying(&[reply]);
            let input = articles(3);
            let out = FilterStage::new(&model).run(input.clone()).await;
            assert_eq!(out, input, "reply {reply:?} should fail open");
        }
    }
}
