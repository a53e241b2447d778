//! Knowledge payload to styled HTML document to PNG snapshot.
//!
//! The model writes the whole document from the raw JSON payload; the
//! rendering engine then loads it from disk and takes a screenshot. File
//! names come from the entity name found in the payload.
//!
//! [`RenderStage::run`] consumes the stage so the engine session is closed
//! exactly once, after the last payload, whatever the individual results.

use crate::api::{AskAsync, Prompt};
use crate::batch::{ItemExecutor, Sequential};
use crate::config::RenderConfig;
use crate::error::{PipelineError, Result};
use crate::tools::RenderEngine;
use crate::utils::{sanitize_file_name, strip_code_fences};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument, warn};

pub const UNKNOWN_ENTITY: &str = "未知实体";

/// Where the entity name may live, most specific first.
const NAME_POINTERS: [&str; 4] = [
    "/entities/0/entity_content/title",
    "/entities/0/identifier",
    "/knowledge_graph/title",
    "/title",
];

static HTML_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<!DOCTYPE\s+html.*</html\s*>").unwrap());

const RENDER_SYSTEM: &str = r#"你是专业的知识图谱可视化工程师，需要完成以下任务：
1. 解析输入的 SerpJSON 数据，提取所有关键信息（实体名称、类型、核心属性、人员、图片链接、描述）；
2. 生成完整的 HTML 代码（含 CSS 样式），将这些信息组织为美观的知识卡片；
3. 严格遵循以下要求：
   - 图片处理：直接使用 JSON 中 header_images 的 source 链接（<img src="链接">），最多显示3张，加载失败时显示占位图；
   - 布局要求：结构化、清晰易读，模块包括（标题区、描述区、核心属性区、核心人员区、图片区）；
   - 样式要求：
     * 整体风格：简约专业，白色背景，圆角边框（16px），轻微阴影；
     * 颜色：标题#111827（大字体），副标题#6b7280（小字体），属性名#1f2937（加粗），属性值#4b5563；
     * 字体：中文用"Microsoft YaHei"，英文用"Arial"，间距合理（模块间20-30px，内边距40px）；
   - 适配性：根据内容多少自动调整布局（属性少则1列，多则2-3列；图片多则横向排列）；
   - 特殊情况：字段缺失时显示"暂无数据"，不报错；
   - 输出格式：仅返回完整的 HTML 代码（含 <!DOCTYPE html> 到 </html>），无任何额外文本、解释或注释。"#;

/// Entity name used for output file names, sanitized for the filesystem.
pub fn entity_name(payload: &Value) -> String {
    let name = NAME_POINTERS
        .iter()
        .filter_map(|p| payload.pointer(p))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_ENTITY);
    sanitize_file_name(name)
}

/// Names that occur more than once in a batch, in first-seen order. Their
/// documents and images share a path, so the later payload wins.
fn repeated_names(names: &[Option<String>]) -> Vec<&str> {
    names.iter().flatten().map(String::as_str).duplicates().collect()
}

/// The HTML document inside a model reply.
fn extract_html(reply: &str) -> String {
    let body = strip_code_fences(reply);
    match HTML_DOCUMENT.find(body) {
        Some(m) => m.as_str().to_string(),
        None => body.to_string(),
    }
}

/// Accept a list of payloads: objects as-is, strings parsed as JSON objects.
///
/// # Arguments
///
/// * `input` - Elements of the input list, each a JSON object or a string
///   holding one
///
/// # Returns
///
/// One entry per element, in input order: the object, or an
/// [`PipelineError::InvalidInput`] for that element alone.
///
/// # Errors
///
/// An empty list is rejected outright with `InvalidInput("输入不能为空")`.
pub fn validate_payloads(input: Vec<Value>) -> Result<Vec<Result<Value>>> {
    if input.is_empty() {
        return Err(PipelineError::InvalidInput("输入不能为空".to_string()));
    }
    Ok(input
        .into_iter()
        .map(|item| match item {
            Value::Object(_) => Ok(item),
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(v @ Value::Object(_)) => Ok(v),
                Ok(_) => Err(PipelineError::InvalidInput("JSON 字符串必须是对象".to_string())),
                Err(e) => Err(PipelineError::InvalidInput(format!("无法解析 JSON 字符串：{e}"))),
            },
            other => Err(PipelineError::InvalidInput(format!(
                "列表元素必须是 JSON 字符串/对象，当前值：{other}"
            ))),
        })
        .collect())
}

#[derive(Debug)]
pub struct RenderStage<M, E> {
    model: M,
    engine: E,
    documents_dir: PathBuf,
    images_dir: PathBuf,
}

impl<M: AskAsync, E: RenderEngine> RenderStage<M, E> {
    pub fn new(model: M, engine: E, config: &RenderConfig) -> Self {
        Self {
            model,
            engine,
            documents_dir: PathBuf::from(&config.documents_dir),
            images_dir: PathBuf::from(&config.images_dir),
        }
    }

    /// Ask the model for a document and write it to `{documents_dir}/{name}.html`.
    async fn write_document(&self, name: &str, payload: &Value) -> Result<PathBuf> {
        let prompt = Prompt::new(
            RENDER_SYSTEM,
            format!(
                "请解析以下 SerpJSON 数据，生成完整的知识卡片 HTML 代码（直接嵌入图片链接）：\n{}",
                serde_json::to_string_pretty(payload)?
            ),
        );
        let html = extract_html(&self.model.ask(&prompt).await?);
        if html.trim().is_empty() {
            return Err(PipelineError::Render("model returned no HTML".to_string()));
        }

        fs::create_dir_all(&self.documents_dir).await?;
        let path = std::path::absolute(self.documents_dir.join(format!("{name}.html")))?;
        fs::write(&path, html).await?;
        info!(path = %path.display(), "HTML document written");
        Ok(path)
    }

    #[instrument(level = "info", skip_all, fields(entity = %name))]
    async fn render_one(&self, name: &str, payload: &Value) -> Result<PathBuf> {
        let document = self.write_document(name, payload).await?;
        let image = self.images_dir.join(format!("{name}_知识图谱.png"));
        self.engine.capture(&document, &image).await?;
        Ok(image)
    }

    /// Render every payload in order, then close the engine.
    ///
    /// The outer `Err` is only returned for an empty input list. Each inner
    /// entry is the image path or that payload's error.
    pub async fn run(self, payloads: Vec<Value>) -> Result<Vec<Result<PathBuf>>> {
        let results = match validate_payloads(payloads) {
            Ok(items) => Ok(self.render_all(items).await),
            Err(e) => Err(e),
        };

        if let Err(e) = self.engine.close().await {
            warn!(error = %e, "Failed to close rendering engine");
        }
        results
    }

    async fn render_all(&self, items: Vec<Result<Value>>) -> Vec<Result<PathBuf>> {
        let total = items.len();
        info!(total, "Rendering knowledge payloads");
        let names: Vec<Option<String>> = items
            .iter()
            .map(|item| item.as_ref().ok().map(entity_name))
            .collect();
        for name in repeated_names(&names) {
            warn!(entity = %name, "Entity name repeats in this batch; later payloads overwrite its files");
        }

        let named: Vec<_> = items.into_iter().zip(names).collect();
        let results = Sequential
            .run(named, |i, (item, name)| async move {
                let payload = item?;
                let name = name.unwrap_or_else(|| entity_name(&payload));
                info!(index = i + 1, total, entity = %name, "Rendering payload");
                self.render_one(&name, &payload).await
            })
            .await;

        for (i, result) in results.iter().enumerate() {
            if let Err(e) = result {
                error!(index = i + 1, error = %e, "Payload render failed");
            }
        }
        let ok = results.iter().filter(|r| r.is_ok()).count();
        info!(ok, failed = total - ok, "Rendering finished");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use serde_json::json;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeEngine {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RenderEngine for FakeEngine {
        async fn capture(&self, document: &Path, output: &Path) -> Result<()> {
            assert!(document.is_absolute());
            let html = std::fs::read_to_string(document)?;
            if html.contains("broken") {
                return Err(PipelineError::Render("screenshot failed".to_string()));
            }
            std::fs::create_dir_all(output.parent().unwrap())?;
            std::fs::write(output, b"png")?;
            self.log.lock().unwrap().push(format!("capture {}", output.display()));
            Ok(())
        }

        async fn close(self) -> Result<()> {
            self.log.lock().unwrap().push("close".to_string());
            Ok(())
        }
    }

    fn config_in(dir: &Path) -> RenderConfig {
        RenderConfig {
            documents_dir: dir.join("KG").display().to_string(),
            images_dir: dir.join("png").display().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_entity_name_fallbacks() {
        let nested = json!({"entities": [{"entity_content": {"title": "OpenAI"}, "identifier": "id"}]});
        assert_eq!(entity_name(&nested), "OpenAI");
        let identifier = json!({"entities": [{"identifier": "kg:/m/123"}]});
        assert_eq!(entity_name(&identifier), "kg-_m_123");
        let kg = json!({"knowledge_graph": {"title": "国家统计局"}});
        assert_eq!(entity_name(&kg), "国家统计局");
        assert_eq!(entity_name(&json!({"title": "A/B"})), "A_B");
        assert_eq!(entity_name(&json!({"other": 1})), UNKNOWN_ENTITY);
    }

    #[test]
    fn test_repeated_names() {
        let names = [
            Some(UNKNOWN_ENTITY.to_string()),
            Some("阿里巴巴".to_string()),
            None,
            Some(UNKNOWN_ENTITY.to_string()),
            None,
            Some(UNKNOWN_ENTITY.to_string()),
        ];
        assert_eq!(repeated_names(&names), vec![UNKNOWN_ENTITY]);
        assert!(repeated_names(&[Some("A".to_string()), Some("B".to_string())]).is_empty());
    }

    #[test]
    fn test_extract_html_keeps_document_span() {
        let reply = "```html\n好的，如下：\n<!DOCTYPE html>\n<html><body>x</body></html>\n以上。\n```";
        assert_eq!(extract_html(reply), "<!DOCTYPE html>\n<html><body>x</body></html>");
        assert_eq!(extract_html("<div>plain</div>"), "<div>plain</div>");
    }

    #[test]
    fn test_validate_payloads() {
        assert!(matches!(validate_payloads(Vec::new()), Err(PipelineError::InvalidInput(_))));
        let out = validate_payloads(vec![
            json!({"title": "A"}),
            json!(r#"{"title": "B"}"#),
            json!("not json"),
            json!(42),
            json!("[1]"),
        ])
        .unwrap();
        assert_eq!(out.len(), 5);
        assert!(out[0].is_ok() && out[1].is_ok());
        assert!(out[2..].iter().all(|r| matches!(r, Err(PipelineError::InvalidInput(_)))));
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_engine_closed_once() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::replying(&[
            "<!DOCTYPE html><html><body>ok</body></html>",
            "<!DOCTYPE html><html><body>broken</body></html>",
            "<!DOCTYPE html><html><body>ok again</body></html>",
        ]);
        let engine = FakeEngine::default();
        let log = engine.log.clone();
        let stage = RenderStage::new(&model, engine, &config_in(dir.path()));

        let results = stage
            .run(vec![
                json!({"knowledge_graph": {"title": "甲"}}),
                json!({"knowledge_graph": {"title": "乙"}}),
                json!(7),
                json!({"title": "丙"}),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first, &dir.path().join("png").join("甲_知识图谱.png"));
        assert!(first.exists());
        assert!(dir.path().join("KG").join("乙.html").exists());
        assert!(results[1].is_err());
        assert!(matches!(results[2], Err(PipelineError::InvalidInput(_))));
        assert!(results[3].is_ok());
        assert_eq!(model.calls(), 3);

        let log = log.lock().unwrap();
        assert_eq!(log.iter().filter(|l| *l == "close").count(), 1);
        assert_eq!(log.last().unwrap(), "close");
    }

    #[tokio::test]
    async fn test_empty_input_still_closes_engine() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::default();
        let engine = FakeEngine::default();
        let log = engine.log.clone();
        let stage = RenderStage::new(&model, engine, &config_in(dir.path()));

        let err = stage.run(Vec::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: 输入不能为空");
        assert_eq!(*log.lock().unwrap(), vec!["close"]);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_skips_capture() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::failing("rate limited");
        let engine = FakeEngine::default();
        let log = engine.log.clone();
        let stage = RenderStage::new(&model, engine, &config_in(dir.path()));

        let results = stage.run(vec![json!({"title": "A"})]).await.unwrap();
        assert!(results[0].is_err());
        assert_eq!(*log.lock().unwrap(), vec!["close"]);
    }
}
