//! Entity lookup against a SerpAPI-style search endpoint.
//!
//! The raw JSON payload is returned untouched: the entity stage reads its
//! `knowledge_graph` / `organic_results` sections to build cards, and the
//! rendering stage feeds whole payloads to the model.

use crate::config::{Credentials, SearchConfig};
use crate::error::{PipelineError, Result};
use crate::tools::KnowledgeSource;
use crate::utils::truncate_for_log;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct EntitySearch {
    http: reqwest::Client,
    base_url: String,
    engine: String,
    hl: String,
    gl: String,
    api_key: String,
}

impl fmt::Debug for EntitySearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySearch")
            .field("base_url", &self.base_url)
            .field("engine", &self.engine)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl EntitySearch {
    pub fn new(config: &SearchConfig, credentials: &Credentials) -> Result<Self> {
        let api_key = credentials.resolve(&config.api_key_name)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            engine: config.engine.clone(),
            hl: config.hl.clone(),
            gl: config.gl.clone(),
            api_key,
        })
    }
}

impl KnowledgeSource for EntitySearch {
    #[instrument(level = "info", skip_all, fields(%entity))]
    async fn lookup(&self, entity: &str) -> Result<Value> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("engine", self.engine.as_str()),
                ("q", entity),
                ("hl", self.hl.as_str()),
                ("gl", self.gl.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Status {
                service: "serpapi",
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let payload: Value = serde_json::from_str(&body)?;
        if let Some(message) = payload.get("error").and_then(Value::as_str) {
            return Err(PipelineError::service("serpapi", message));
        }
        if !payload.is_object() {
            return Err(PipelineError::service("serpapi", "payload is not a JSON object"));
        }

        debug!(
            has_knowledge_graph = payload.get("knowledge_graph").is_some(),
            "Entity lookup succeeded"
        );
        Ok(payload)
    }
}
