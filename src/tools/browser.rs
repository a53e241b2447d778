//! Headless Chrome rendering over the W3C WebDriver protocol.
//!
//! One [`WebDriverSession`] is opened per rendering stage and reused for
//! every capture. [`RenderEngine::close`] deletes the remote session;
//! dropping an unclosed session only logs, since the delete is an HTTP call.

use crate::config::RenderConfig;
use crate::error::{PipelineError, Result};
use crate::tools::RenderEngine;
use crate::utils::truncate_for_log;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument, warn};
use url::Url;

pub struct WebDriverSession {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
    settle_delay: Duration,
    closed: bool,
}

impl std::fmt::Debug for WebDriverSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDriverSession")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .field("closed", &self.closed)
            .finish()
    }
}

fn chrome_capabilities(config: &RenderConfig) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": [
                        "--headless=new",
                        "--disable-gpu",
                        format!("--window-size={},{}", config.window_width, config.window_height),
                        "--no-sandbox",
                        "--disable-dev-shm-usage"
                    ]
                }
            }
        }
    })
}

/// Send one WebDriver command and unwrap its `value` member.
async fn command(
    http: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;
    let payload: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

    if !status.is_success() {
        let message = payload
            .pointer("/value/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| truncate_for_log(&text, 300));
        return Err(PipelineError::Status {
            service: "webdriver",
            status: status.as_u16(),
            body: message,
        });
    }
    Ok(payload.get("value").cloned().unwrap_or(Value::Null))
}

impl WebDriverSession {
    /// Open a browser session on the configured WebDriver server.
    #[instrument(level = "info", skip_all, fields(webdriver = %config.webdriver_url))]
    pub async fn start(config: &RenderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();

        let value = command(
            &http,
            reqwest::Method::POST,
            &format!("{base_url}/session"),
            Some(chrome_capabilities(config)),
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::Render("WebDriver returned no sessionId".to_string()))?
            .to_string();

        info!(%session_id, "Browser session started");
        Ok(Self {
            http,
            base_url,
            session_id,
            settle_delay: config.settle_delay(),
            closed: false,
        })
    }

    fn session_url(&self, suffix: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, suffix)
    }
}

impl RenderEngine for WebDriverSession {
    #[instrument(level = "info", skip_all, fields(document = %document.display()))]
    async fn capture(&self, document: &Path, output: &Path) -> Result<()> {
        let file_url = Url::from_file_path(document).map_err(|_| {
            PipelineError::Render(format!("not an absolute path: {}", document.display()))
        })?;

        command(
            &self.http,
            reqwest::Method::POST,
            &self.session_url("/url"),
            Some(json!({ "url": file_url.as_str() })),
        )
        .await?;

        // Images and fonts load asynchronously after navigation returns.
        tokio::time::sleep(self.settle_delay).await;

        let value = command(&self.http, reqwest::Method::GET, &self.session_url("/screenshot"), None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| PipelineError::Render("screenshot value is not a string".to_string()))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| PipelineError::Render(format!("invalid screenshot encoding: {e}")))?;
        if bytes.is_empty() {
            return Err(PipelineError::Render("empty screenshot".to_string()));
        }

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(output, &bytes).await?;
        info!(path = %output.display(), bytes = bytes.len(), "Screenshot written");
        Ok(())
    }

    #[instrument(level = "info", skip_all, fields(session_id = %self.session_id))]
    async fn close(mut self) -> Result<()> {
        self.closed = true;
        command(&self.http, reqwest::Method::DELETE, &self.session_url(""), None).await?;
        info!("Browser session closed");
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(session_id = %self.session_id, "Browser session dropped without close");
        }
    }
}
