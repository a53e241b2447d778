//! End-to-end digest: search, filter, then per article translate,
//! summarize, extract events and build entity cards.
//!
//! A failure while processing one article turns into an
//! [`EntryOutcome::Failed`] entry for that article; the run continues with
//! the next one. Only a failed news search aborts the run.

use crate::api::AskAsync;
use crate::batch::{Executor, ItemExecutor, Sequential};
use crate::error::Result;
use crate::models::{Article, DigestEntry, DigestReport, EntryOutcome};
use crate::stages::entities::EntityStage;
use crate::stages::events::EventStage;
use crate::stages::filter::FilterStage;
use crate::stages::summarize::SummaryStage;
use crate::stages::translate::TranslationStage;
use crate::tools::{ContentSource, KnowledgeSource, NewsQuery, NewsSource};
use crate::utils::time_of_day;
use chrono::Local;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Default)]
pub struct DigestOptions {
    pub query: NewsQuery,
    /// Replace each article's truncated API content with the extracted page text.
    pub fetch_content: bool,
    /// Process at most this many articles after filtering.
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub struct DigestPipeline<M, N, C, K> {
    model: M,
    news: N,
    content: C,
    knowledge: K,
    executor: Executor,
}

impl<M, N, C, K> DigestPipeline<M, N, C, K>
where
    M: AskAsync,
    N: NewsSource,
    C: ContentSource,
    K: KnowledgeSource,
{
    pub fn new(model: M, news: N, content: C, knowledge: K) -> Self {
        Self {
            model,
            news,
            content,
            knowledge,
            executor: Executor::Sequential(Sequential),
        }
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    #[instrument(level = "info", skip_all, fields(query = ?options.query.query))]
    pub async fn run(&self, options: &DigestOptions) -> Result<DigestReport> {
        let now = Local::now();
        let searched = self.news.search(&options.query).await?;
        let searched_count = searched.len();
        info!(count = searched_count, "News search returned");

        let mut kept = FilterStage::new(&self.model).run(searched).await;
        let kept_count = kept.len();
        if let Some(limit) = options.limit {
            kept.truncate(limit);
        }

        let total = kept.len();
        let entries = self
            .executor
            .run(kept, |i, article| async move {
                info!(index = i + 1, total, url = %article.url, "Processing article");
                self.process(article, options.fetch_content).await
            })
            .await;

        let report = DigestReport {
            local_date: now.date_naive().to_string(),
            time_of_day: time_of_day(),
            local_time: now.time().format("%H:%M:%S").to_string(),
            query: options.query.query.clone(),
            searched: searched_count,
            kept_after_filter: kept_count,
            entries,
        };
        info!(
            processed = report.processed().count(),
            failed = report.failed_count(),
            "Digest complete"
        );
        Ok(report)
    }

    async fn process(&self, article: Article, fetch_content: bool) -> EntryOutcome {
        let article = if fetch_content {
            match self.content.fetch(&article.url).await {
                Ok(text) => article.with_content(text),
                Err(e) => {
                    warn!(url = %article.url, error = %e, "Content fetch failed; using API content");
                    article
                }
            }
        } else {
            article
        };

        let failed = |article: &Article, error: String| EntryOutcome::Failed {
            url: article.url.clone(),
            title: article.title.clone(),
            error,
        };

        let translated = match TranslationStage::new(&self.model).translate_article(&article).await {
            Ok(t) => t,
            Err(e) => {
                error!(url = %article.url, error = %e, "Translation failed");
                return failed(&article, e.to_string());
            }
        };
        let text = translated.text_zh();

        let summary = match SummaryStage::new(&self.model, &self.content).summarize(&text).await {
            Ok(s) => s,
            Err(e) => {
                error!(url = %article.url, error = %e, "Summarization failed");
                return failed(&article, e.to_string());
            }
        };

        let events = EventStage::new(&self.model)
            .extract(&text)
            .await
            .unwrap_or_else(|e| {
                warn!(url = %article.url, error = %e, "Event extraction failed; no events recorded");
                Vec::new()
            });

        let knowledge = EntityStage::new(&self.model, &self.knowledge)
            .run(&text)
            .await
            .to_string();

        EntryOutcome::Processed(Box::new(DigestEntry {
            article: translated,
            summary,
            events,
            knowledge,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::stages::entities::TOO_SHORT;
    use crate::testing::ScriptedModel;
    use serde_json::{Value, json};

    struct FakeNews(Vec<Article>);

    impl NewsSource for FakeNews {
        async fn search(&self, _query: &NewsQuery) -> Result<Vec<Article>> {
            if self.0.is_empty() {
                Err(PipelineError::service("newsapi", "rateLimited"))
            } else {
                Ok(self.0.clone())
            }
        }
    }

    struct FakeContent;

    impl ContentSource for FakeContent {
        async fn fetch(&self, url: &str) -> Result<String> {
            if url.ends_with("/2") {
                Err(PipelineError::service("extractor", "no article text found"))
            } else {
                Ok(format!("fetched body of {url}"))
            }
        }
    }

    struct NoKnowledge;

    impl KnowledgeSource for NoKnowledge {
        async fn lookup(&self, _entity: &str) -> Result<Value> {
            Ok(json!({}))
        }
    }

    fn article(i: usize) -> Article {
        Article {
            url: format!("https://news.example/{i}"),
            title: Some(format!("Headline {i}")),
            language: Some("en".to_string()),
            ..Default::default()
        }
    }

    const SUMMARY: &str = r#"{"summary": "摘要", "key_points": ["要点"], "sections": []}"#;

    #[tokio::test]
    async fn test_failed_article_does_not_stop_the_run() {
        let model = ScriptedModel::new([
            Ok("[0, 1, 2]".to_string()),
            Ok("标题一".to_string()),
            Ok(SUMMARY.to_string()),
            Ok("[]".to_string()),
            Err(PipelineError::service("llm", "timeout")),
            Ok("标题三".to_string()),
            Ok("not json".to_string()),
            Err(PipelineError::service("llm", "overloaded")),
        ]);
        let pipeline = DigestPipeline::new(
            &model,
            FakeNews(vec![article(1), article(2), article(3)]),
            FakeContent,
            NoKnowledge,
        );

        let report = pipeline.run(&DigestOptions::default()).await.unwrap();
        assert_eq!(report.searched, 3);
        assert_eq!(report.kept_after_filter, 3);
        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.failed_count(), 1);

        let EntryOutcome::Failed { url, error, .. } = &report.entries[1] else {
            panic!("second article should fail");
        };
        assert_eq!(url, "https://news.example/2");
        assert!(error.contains("timeout"));

        let processed: Vec<_> = report.processed().collect();
        assert_eq!(processed[0].article.title_zh, "标题一");
        assert_eq!(processed[0].summary.key_points, vec!["要点"]);
        assert_eq!(processed[0].knowledge, TOO_SHORT);
        assert_eq!(processed[1].summary.summary, "not json");
        assert!(processed[1].events.is_empty());
        assert_eq!(model.calls(), 8);
    }

    #[tokio::test]
    async fn test_fetch_content_and_limit() {
        let model = ScriptedModel::replying(&["[1, 0]", "标题", "正文", SUMMARY, "[]"]);
        let pipeline = DigestPipeline::new(
            &model,
            FakeNews(vec![article(1), article(2)]),
            FakeContent,
            NoKnowledge,
        );
        let options = DigestOptions {
            fetch_content: true,
            limit: Some(1),
            ..Default::default()
        };

        let report = pipeline.run(&options).await.unwrap();
        assert_eq!(report.kept_after_filter, 2);
        assert_eq!(report.entries.len(), 1);
        let entry = report.processed().next().unwrap();
        assert_eq!(
            entry.article.article.content.as_deref(),
            Some("fetched body of https://news.example/1")
        );
        assert!(model.prompts()[2].user.ends_with("fetched body of https://news.example/1"));
    }

    #[tokio::test]
    async fn test_search_failure_aborts() {
        let model = ScriptedModel::default();
        let pipeline = DigestPipeline::new(&model, FakeNews(Vec::new()), FakeContent, NoKnowledge);
        assert!(pipeline.run(&DigestOptions::default()).await.is_err());
        assert_eq!(model.calls(), 0);
    }
}
