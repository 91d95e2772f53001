use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{BudgetError, Result};
use crate::provider::{
    ChatProvider, ChatRequest, ChatResponse, ProviderError, ProviderErrorKind, Usage,
};

pub const OPENAI_API: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI and API-compatible servers.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, OPENAI_API)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(BudgetError::Config("API key must not be empty".into()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| BudgetError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Resolve the key with [`crate::config::resolve_api_key`] and build a client.
    pub fn from_env(explicit_key: Option<&str>) -> Result<Self> {
        Self::new(crate::config::resolve_api_key(explicit_key)?)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn classify(err: reqwest::Error) -> ProviderError {
    let kind = if err.is_timeout() {
        ProviderErrorKind::Timeout
    } else if err.is_connect() || err.is_request() {
        ProviderErrorKind::Network
    } else if err.is_decode() {
        ProviderErrorKind::Parse
    } else {
        ProviderErrorKind::Network
    };
    ProviderError::new(kind, err.to_string())
}

/// Pull the first choice's text out of a chat-completions body.
pub fn parse_completion(body: &str) -> std::result::Result<ChatResponse, ProviderError> {
    let parsed: CompletionBody = serde_json::from_str(body)
        .map_err(|e| ProviderError::new(ProviderErrorKind::Parse, e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::new(ProviderErrorKind::Parse, "response has no choices"))?;
    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        usage: parsed.usage,
    })
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(model = %request.model, messages = request.messages.len(), "chat completion request");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(classify)?;
        let status = resp.status();
        let body = resp.text().await.map_err(classify)?;
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), body));
        }
        parse_completion(&body)
    }
}
