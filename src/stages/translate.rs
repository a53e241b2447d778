//! Translation of article fields into a target language (Chinese by default).
//!
//! Each present field is translated with its own call and instruction.
//! Missing or empty fields become empty strings without a call. A failed
//! call is returned as `Err`; batch callers decide what to do with it.

use crate::api::{AskAsync, Prompt};
use crate::error::Result;
use crate::models::{Article, TranslatedArticle, UNKNOWN_LANGUAGE};
use tracing::{info, instrument};

const TRANSLATOR_SYSTEM: &str = "You are a professional translator.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
    Content,
}

impl Field {
    fn instruction(self, language: &str) -> String {
        match self {
            Field::Title => format!("请将以下新闻标题翻译成{language}，保持简洁，只输出译文："),
            Field::Description => {
                format!("请将以下新闻摘要翻译成{language}，忠实原意，只输出译文：")
            }
            Field::Content => format!(
                "请将以下新闻正文翻译成{language}，保留段落结构和专有名词，只输出译文："
            ),
        }
    }
}

/// Human-readable name of a language code, used inside prompts.
fn language_name(code: &str) -> &str {
    match code {
        "zh" | "zh-CN" | "zh-cn" => "中文",
        "en" => "英文",
        "ja" => "日文",
        "ko" => "韩文",
        "fr" => "法文",
        "de" => "德文",
        other => other,
    }
}

#[derive(Debug)]
pub struct TranslationStage<M> {
    model: M,
    target_language: String,
}

impl<M: AskAsync> TranslationStage<M> {
    pub fn new(model: M) -> Self {
        Self::with_target(model, "zh")
    }

    pub fn with_target(model: M, target_language: impl Into<String>) -> Self {
        Self {
            model,
            target_language: target_language.into(),
        }
    }

    /// Translate free text into `target_language`.
    pub async fn translate_text(&self, text: &str, target_language: &str) -> Result<String> {
        let prompt = Prompt::new(
            TRANSLATOR_SYSTEM,
            format!("请将以下文本翻译成{}：\n{}", language_name(target_language), text),
        );
        Ok(self.model.ask(&prompt).await?.trim().to_string())
    }

    async fn translate_field(&self, field: Field, value: Option<&str>) -> Result<String> {
        let Some(text) = value.filter(|v| !v.trim().is_empty()) else {
            return Ok(String::new());
        };
        let prompt = Prompt::new(
            TRANSLATOR_SYSTEM,
            format!(
                "{}\n{}",
                field.instruction(language_name(&self.target_language)),
                text
            ),
        );
        Ok(self.model.ask(&prompt).await?.trim().to_string())
    }

    #[instrument(level = "info", skip_all, fields(url = %article.url))]
    pub async fn translate_article(&self, article: &Article) -> Result<TranslatedArticle> {
        let title_zh = self
            .translate_field(Field::Title, article.title.as_deref())
            .await?;
        let description_zh = self
            .translate_field(Field::Description, article.description.as_deref())
            .await?;
        let content_zh = self
            .translate_field(Field::Content, article.content.as_deref())
            .await?;

        let original_language = article
            .language
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        info!(%original_language, "Translated article");
        Ok(TranslatedArticle {
            article: article.clone(),
            title_zh,
            description_zh,
            content_zh,
            original_language,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::testing::ScriptedModel;

    #[tokio::test]
    async fn test_absent_fields_translate_to_empty_without_calls() {
        let model = ScriptedModel::replying(&["甲"]);
        let stage = TranslationStage::new(&model);
        let article = Article {
            url: "u".to_string(),
            title: Some("A".to_string()),
            content: Some(String::new()),
            ..Default::default()
        };

        let translated = stage.translate_article(&article).await.unwrap();
        assert_eq!(translated.title_zh, "甲");
        assert_eq!(translated.description_zh, "");
        assert_eq!(translated.content_zh, "");
        assert_eq!(translated.original_language, UNKNOWN_LANGUAGE);
        assert_eq!(model.calls(), 1);
        assert_eq!(translated.article, article);
    }

    #[tokio::test]
    async fn test_each_field_has_its_own_instruction() {
        let model = ScriptedModel::replying(&["标题", "摘要", "正文"]);
        let stage = TranslationStage::new(&model);
        let article = Article {
            url: "u".to_string(),
            title: Some("Title".to_string()),
            description: Some("Desc".to_string()),
            content: Some("Body".to_string()),
            language: Some("en".to_string()),
            ..Default::default()
        };

        let translated = stage.translate_article(&article).await.unwrap();
        assert_eq!(translated.content_zh, "正文");
        assert_eq!(translated.original_language, "en");

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].user.contains("新闻标题") && prompts[0].user.ends_with("Title"));
        assert!(prompts[1].user.contains("新闻摘要"));
        assert!(prompts[2].user.contains("新闻正文"));
        assert!(prompts.iter().all(|p| p.user.contains("中文")));
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let model = ScriptedModel::failing("timeout");
        let stage = TranslationStage::new(&model);
        let article = Article {
            url: "u".to_string(),
            title: Some("Title".to_string()),
            ..Default::default()
        };
        let err = stage.translate_article(&article).await.unwrap_err();
        assert!(matches!(err, PipelineError::Service { .. }));
    }

    #[tokio::test]
    async fn test_translate_text_target() {
        let model = ScriptedModel::replying(&["  Hello  "]);
        let stage = TranslationStage::new(&model);
        let out = stage.translate_text("你好", "en").await.unwrap();
        assert_eq!(out, "Hello");
        assert!(model.prompts()[0].user.starts_with("请将以下文本翻译成英文"));
    }
}
