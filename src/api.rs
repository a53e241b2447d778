//! Language model interaction over an OpenAI-compatible chat API.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait every stage is generic over
//! - [`ChatClient`]: `POST {api_base}/chat/completions` via `reqwest`
//! - [`ask_json`]: the shared "invoke, parse, classify" helper that turns a
//!   reply into a [`ModelOutput`]
//!
//! There is no retry layer: a failed call is reported once and the calling
//! stage decides whether to degrade or propagate.

use crate::config::{Credentials, LlmConfig};
use crate::error::{PipelineError, Result};
use crate::utils::{json_span, looks_truncated, strip_code_fences, truncate_for_log};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// A two-turn chat prompt: fixed instructions plus the per-call input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Trait for async LLM interaction.
///
/// Implementors send a [`Prompt`] to a model and return the raw text reply.
pub trait AskAsync {
    async fn ask(&self, prompt: &Prompt) -> Result<String>;
}

impl<T: AskAsync + ?Sized> AskAsync for &T {
    async fn ask(&self, prompt: &Prompt) -> Result<String> {
        (**self).ask(prompt).await
    }
}

/// Outcome of parsing a model reply as structured JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput<T> {
    Parsed(T),
    Malformed { raw: String, error: String },
}

/// Parse a reply as JSON.
///
/// The first fenced block is parsed when there is one. If that fails, the
/// outermost `[...]` or `{...}` span of the body gets a second try, so prose
/// around the JSON does not make a correct answer `Malformed`. An empty
/// reply is `Malformed`.
pub fn parse_reply<T: DeserializeOwned>(raw: String) -> ModelOutput<T> {
    let body = strip_code_fences(&raw);
    let parsed = serde_json::from_str::<T>(body).or_else(|e| match json_span(body) {
        Some(span) if span != body => serde_json::from_str::<T>(span).map_err(|_| e),
        _ => Err(e),
    });
    match parsed {
        Ok(value) => ModelOutput::Parsed(value),
        Err(e) => {
            warn!(
                error = %e,
                truncated = looks_truncated(&e),
                response_preview = %truncate_for_log(&raw, 300),
                "Model returned non-conforming JSON"
            );
            ModelOutput::Malformed {
                raw,
                error: e.to_string(),
            }
        }
    }
}

/// Ask the model and classify its reply. Transport failures are returned as
/// `Err`; an unparseable reply is `Ok(ModelOutput::Malformed)`.
pub async fn ask_json<M, T>(model: &M, prompt: &Prompt) -> Result<ModelOutput<T>>
where
    M: AskAsync + ?Sized,
    T: DeserializeOwned,
{
    let raw = model.ask(prompt).await?;
    Ok(parse_reply(raw))
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat completion client.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ChatClient {
    pub fn new(config: &LlmConfig, credentials: &Credentials) -> Result<Self> {
        let api_key = credentials.resolve(&config.api_key_name)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl AskAsync for ChatClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, prompt: &Prompt) -> Result<String> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .inspect_err(|e| warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "API call rejected");
            return Err(PipelineError::Status {
                service: "llm",
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(PipelineError::EmptyCompletion)?;
        if content.trim().is_empty() {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, "Model returned blank content");
        }

        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            response_len = content.len(),
            "API call succeeded"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
            ]
        })
    }

    fn client_for(server: &MockServer) -> ChatClient {
        let config = LlmConfig {
            api_base: format!("{}/v1", server.uri()),
            timeout_secs: 5,
            ..Default::default()
        };
        let mut creds = Credentials::default();
        creds.insert("DASHSCOPE_API_KEY", "test-key");
        ChatClient::new(&config, &creds).unwrap()
    }

    #[tokio::test]
    async fn test_ask_sends_system_and_user_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "qwen-plus",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("你好")))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server).ask(&Prompt::new("sys", "hello")).await.unwrap();
        assert_eq!(reply, "你好");
    }

    #[tokio::test]
    async fn test_ask_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server).ask(&Prompt::new("s", "u")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_ask_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client_for(&server).ask(&Prompt::new("s", "u")).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyCompletion));
    }

    #[tokio::test]
    async fn test_ask_missing_content_is_empty_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"choices": [{"message": {"role": "assistant"}}]})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).ask(&Prompt::new("s", "u")).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyCompletion));
    }

    #[tokio::test]
    async fn test_blank_content_is_a_reply_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.ask(&Prompt::new("s", "u")).await.unwrap(), "");
        let out: ModelOutput<Vec<u32>> = ask_json(&client, &Prompt::new("s", "u")).await.unwrap();
        assert!(matches!(out, ModelOutput::Malformed { raw, .. } if raw.is_empty()));
    }

    #[test]
    fn test_missing_api_key() {
        let config = LlmConfig {
            api_key_name: "NEWS_PIPELINE_TEST_SURELY_UNSET_KEY".to_string(),
            ..Default::default()
        };
        let err = ChatClient::new(&config, &Credentials::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingCredential(_)));
    }

    #[test]
    fn test_parse_reply_fenced_json() {
        let out: ModelOutput<Vec<u32>> = parse_reply("```json\n[0, 2]\n```".to_string());
        assert_eq!(out, ModelOutput::Parsed(vec![0, 2]));
    }

    #[test]
    fn test_parse_reply_fence_after_prose() {
        let out: ModelOutput<Vec<u32>> = parse_reply("以下是结果：\n```json\n[0]\n```".to_string());
        assert_eq!(out, ModelOutput::Parsed(vec![0]));
    }

    #[test]
    fn test_parse_reply_unfenced_json_in_prose() {
        let out: ModelOutput<Vec<String>> = parse_reply("核心实体如下：[\"国家统计局\", \"CPI\"]。".to_string());
        assert_eq!(out, ModelOutput::Parsed(vec!["国家统计局".to_string(), "CPI".to_string()]));
    }

    #[test]
    fn test_parse_reply_malformed_keeps_raw() {
        let out: ModelOutput<Vec<u32>> = parse_reply("我认为第0条是新闻".to_string());
        match out {
            ModelOutput::Malformed { raw, .. } => assert_eq!(raw, "我认为第0条是新闻"),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let mut creds = Credentials::default();
        creds.insert("DASHSCOPE_API_KEY", "sk-secret");
        let client = ChatClient::new(&LlmConfig::default(), &creds).unwrap();
        assert!(!format!("{client:?}").contains("sk-secret"));
    }
}
