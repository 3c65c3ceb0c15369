use crate::types::{DigestError, LlmErrorKind, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Chat-completion backend used by the summarizer.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Name used in logs
    fn adapter_name(&self) -> String;

    /// Run one chat completion
    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Text of the first choice plus token usage when the API reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// OpenAI-compatible chat completions over HTTP.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn adapter_name(&self) -> String {
        format!("OpenAI ({})", self.api_url)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        debug!("Sending chat completion to {} (model {})", self.api_url, request.model);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DigestError::llm(
                LlmErrorKind::from_status(status.as_u16()),
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DigestError::llm(LlmErrorKind::Internal, format!("Malformed response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DigestError::llm(LlmErrorKind::Internal, "Response contained no choices"))?;

        let (prompt_tokens, completion_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(ChatCompletion {
            content: content.trim().to_string(),
            prompt_tokens,
            completion_tokens,
        })
    }
}

fn classify_transport_error(e: reqwest::Error) -> DigestError {
    let kind = if e.is_timeout() {
        LlmErrorKind::Timeout
    } else if e.is_connect() || e.is_request() {
        LlmErrorKind::Connection
    } else {
        LlmErrorKind::Internal
    };
    DigestError::llm(kind, e.to_string())
}

/// Scripted client for tests. Replies are consumed in order; once the script
/// is exhausted the fallback reply is used.
pub struct MockLlmClient {
    name: String,
    script: Mutex<VecDeque<std::result::Result<String, LlmErrorKind>>>,
    fallback: std::result::Result<String, LlmErrorKind>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: Ok("Mock summary".to_string()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Reply with `content` whenever nothing is scripted.
    pub fn replying(mut self, content: impl Into<String>) -> Self {
        self.fallback = Ok(content.into());
        self
    }

    /// Fail with `kind` whenever nothing is scripted.
    pub fn failing(mut self, kind: LlmErrorKind) -> Self {
        self.fallback = Err(kind);
        self
    }

    /// Queue replies ahead of the fallback.
    pub fn with_script(self, script: Vec<std::result::Result<String, LlmErrorKind>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..self
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn adapter_name(&self) -> String {
        format!("Mock LLM ({})", self.name)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        let reply = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Ok(content) => Ok(ChatCompletion {
                prompt_tokens: (request.messages.iter().map(|m| m.content.len()).sum::<usize>() / 4) as u64,
                completion_tokens: (content.len() / 4) as u64,
                content,
            }),
            Err(kind) => Err(DigestError::llm(kind, "scripted failure")),
        }
    }
}
