//! Test doubles shared by stage tests.

use crate::api::{AskAsync, Prompt};
use crate::error::{PipelineError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued replies in order and records every prompt it receives.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())))
    }

    pub fn failing(message: &str) -> Self {
        Self::new([Err(PipelineError::service("llm", message))])
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

impl AskAsync for ScriptedModel {
    async fn ask(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::service("llm", "no scripted reply left")))
    }
}
