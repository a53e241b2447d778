//! Summarization.
//!
//! [`SummaryStage::summarize`] turns article text into a
//! [`StructuredSummary`]; an unparseable reply degrades to the raw text as
//! the summary. [`SummaryStage::brief`] fetches a URL and asks for a short
//! fixed-format text brief instead.

use crate::api::{AskAsync, ModelOutput, Prompt, ask_json};
use crate::batch::ItemExecutor;
use crate::error::Result;
use crate::models::StructuredSummary;
use crate::tools::ContentSource;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

const SUMMARY_SYSTEM: &str = "你是一个专业新闻摘要生成助手。";

const BRIEF_SYSTEM: &str = "你是专业新闻总结助手，基于原文按以下要求生成总结：
1. 核心要点：提炼 3-5 点关键信息，必须包含事件主体、时间、核心动作、结果/影响；
2. 核心概括：100-150 字简洁总结全文核心，不添加额外评论或扩展解读；
3. 输出格式严格遵循（不要添加任何多余文本）：
【核心要点】
1. XXXX
2. XXXX
...
【核心概括】
XXXX
4. 仅基于提供的原文内容，不编造任何未提及的信息。";

pub const EMPTY_URL: &str = "错误：新闻 URL 不能为空";

fn summary_prompt(text: &str) -> Prompt {
    Prompt::new(
        SUMMARY_SYSTEM,
        format!(
            "请根据以下新闻内容生成中文长摘要，并列出关键要点，同时按逻辑分段生成分段结构化信息，\
             输出 JSON 格式，只包含 summary、key_points、sections 三个键：\n\
             {text}\n\
             JSON 格式示例：\n\
             {{\n  \"summary\": \"新闻摘要文本\",\n  \"key_points\": [\"要点1\", \"要点2\"],\n  \"sections\": [\n      {{\"heading\": \"段落标题1\", \"content\": \"段落内容1\"}}\n  ]\n}}"
        ),
    )
}

/// One URL and its brief (or diagnostic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlBrief {
    pub url: String,
    pub summary: String,
}

#[derive(Debug)]
pub struct SummaryStage<M, C> {
    model: M,
    content: C,
}

impl<M: AskAsync, C: ContentSource> SummaryStage<M, C> {
    pub fn new(model: M, content: C) -> Self {
        Self { model, content }
    }

    /// Structured summary of `text`. Never fails on a bad reply; only a
    /// failed call is returned as `Err`.
    #[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
    pub async fn summarize(&self, text: &str) -> Result<StructuredSummary> {
        match ask_json::<_, StructuredSummary>(&self.model, &summary_prompt(text)).await? {
            ModelOutput::Parsed(summary) => {
                info!(key_points = summary.key_points.len(), sections = summary.sections.len(), "Summarized");
                Ok(summary)
            }
            ModelOutput::Malformed { raw, error } => {
                warn!(%error, "Summary reply is not JSON; keeping raw text");
                Ok(StructuredSummary::from_raw(raw))
            }
        }
    }

    /// Fetch `url` and produce a text brief. Failures are returned as a
    /// readable diagnostic string.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn brief(&self, url: &str) -> String {
        if url.trim().is_empty() {
            return EMPTY_URL.to_string();
        }
        match self.try_brief(url).await {
            Ok(brief) => brief,
            Err(e) => {
                error!(error = %e, "Brief failed");
                format!("新闻总结异常：{e}")
            }
        }
    }

    async fn try_brief(&self, url: &str) -> Result<String> {
        let text = self.content.fetch(url).await?;
        let prompt = Prompt::new(BRIEF_SYSTEM, format!("新闻原文：\n{text}"));
        let brief = self.model.ask(&prompt).await?;
        Ok(brief.trim().to_string())
    }

    /// Briefs for several URLs, one entry per URL in input order.
    pub async fn brief_batch(&self, urls: Vec<String>, executor: &impl ItemExecutor) -> Vec<UrlBrief> {
        if urls.is_empty() {
            warn!("Brief batch is empty");
            return Vec::new();
        }
        let total = urls.len();
        executor
            .run(urls, |i, url| async move {
                info!(index = i + 1, total, %url, "Briefing URL");
                let summary = self.brief(&url).await;
                UrlBrief { url, summary }
            })
            .await
    }
}
