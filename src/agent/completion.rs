use super::config::ModelConfig;
use super::error::{AgentError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            name: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionResult {
    pub content: Option<String>,
    pub reasoning: Option<String>,
}

/// Seam between the turn loop and the network; the turn loop only ever sees
/// this trait.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, options: CompletionOptions) -> Result<CompletionResult>;
}

/// Round-robin successor over the model list.
pub fn next_model_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (current + 1) % len
    }
}

/// Owns the ordered model list and the active index. Rotation only happens
/// from the client's timeout branch; a lost update between concurrent
/// triggers is tolerated.
pub struct ModelSelector {
    configs: Vec<ModelConfig>,
    active: AtomicUsize,
}

impl ModelSelector {
    pub fn new(configs: Vec<ModelConfig>) -> Self {
        Self {
            configs,
            active: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn active(&self) -> &ModelConfig {
        let idx = self.active.load(Ordering::SeqCst) % self.configs.len().max(1);
        &self.configs[idx]
    }

    pub fn advance(&self) -> usize {
        let next = next_model_index(self.active.load(Ordering::SeqCst), self.configs.len());
        self.active.store(next, Ordering::SeqCst);
        next
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning_content")]
    reasoning: Option<String>,
}

pub struct CompletionClient {
    client: Client,
    base_url: String,
    auth_header: Option<String>,
    selector: ModelSelector,
    timeout: Duration,
    switch_on_timeout: bool,
}

impl CompletionClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        models: Vec<ModelConfig>,
        timeout: Duration,
        switch_on_timeout: bool,
    ) -> Result<Self> {
        if models.is_empty() {
            return Err(AgentError::Model("model list must not be empty".to_string()));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| AgentError::Model(format!("Failed to create completion client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: api_key.map(|key| format!("Bearer {}", key.trim())),
            selector: ModelSelector::new(models),
            timeout,
            switch_on_timeout,
        })
    }

    fn build_request_body(config: &ModelConfig, messages: &[ChatMessage]) -> serde_json::Value {
        json!({
            "model": config.model,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "max_tokens": config.max_tokens,
            "stream": config.stream,
            "messages": messages,
        })
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<CompletionResult> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(header) = &self.auth_header {
            request = request.header("Authorization", header);
        }

        let resp = request.send().await.map_err(AgentError::Request)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read response>".to_string());
            return Err(AgentError::Model(format!(
                "Completion service error ({}): {}",
                status, text
            )));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| AgentError::Model(format!("Failed to parse completion response: {}", e)))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AgentError::Model("Completion response had no choices".to_string()))?;

        Ok(CompletionResult {
            content: message.content,
            reasoning: message.reasoning,
        })
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(&self, options: CompletionOptions) -> Result<CompletionResult> {
        let max_attempts = if self.switch_on_timeout {
            self.selector.len()
        } else {
            1
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let body = Self::build_request_body(self.selector.active(), &options.messages);

            match tokio::time::timeout(self.timeout, self.send_once(&body)).await {
                Ok(Ok(result)) => return Ok(result),
                // Non-timeout failures are surfaced unchanged, never retried.
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    if self.switch_on_timeout && attempts < max_attempts {
                        let next = self.selector.advance();
                        warn!(
                            "Completion timed out after {:?}; switching to model index {} and retrying",
                            self.timeout, next
                        );
                        continue;
                    }
                    return Err(AgentError::Timeout);
                }
            }
        }
    }
}
