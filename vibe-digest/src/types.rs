use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single entry destined for the digest.
///
/// Two items are the same item when they share `(title, link)`; the other
/// fields do not take part in equality or hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestItem {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source_name: String,
    pub source_url: String,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
}

impl DigestItem {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        summary: impl Into<String>,
        source_name: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            summary: summary.into(),
            source_name: source_name.into(),
            source_url: source_url.into(),
            published: None,
            author: None,
        }
    }

    pub fn with_published(mut self, published: Option<DateTime<Utc>>) -> Self {
        self.published = published;
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }
}

impl PartialEq for DigestItem {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title && self.link == other.link
    }
}

impl Eq for DigestItem {}

impl Hash for DigestItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.title.hash(state);
        self.link.hash(state);
    }
}

/// Text handed to the LLM together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizationRequest {
    pub text: String,
    pub source_name: String,
    pub source_url: String,
}

impl SummarizationRequest {
    pub fn new(
        text: impl Into<String>,
        source_name: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Result<Self> {
        let request = Self {
            text: text.into(),
            source_name: source_name.into(),
            source_url: source_url.into(),
        };

        if request.text.trim().is_empty() {
            return Err(DigestError::General("Text cannot be empty".to_string()));
        }
        if request.source_name.trim().is_empty() {
            return Err(DigestError::General("Source name cannot be empty".to_string()));
        }
        if request.source_url.trim().is_empty() {
            return Err(DigestError::General("Source URL cannot be empty".to_string()));
        }

        Ok(request)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub max_feed_size_mb: usize,
    pub min_host_interval_ms: u64,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Vibe-Digest/1.0".to_string(),
            timeout_seconds: 30,
            max_attempts: 3,
            retry_initial_ms: 2_000,
            retry_max_ms: 10_000,
            max_feed_size_mb: 10,
            min_host_interval_ms: 1_000,
            max_redirects: 5,
        }
    }
}

/// Coarse classification of a failed chat-completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    RateLimit,
    Authentication,
    Connection,
    Timeout,
    InvalidRequest,
    Api { status: u16 },
    Internal,
}

impl LlmErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            401 | 403 => Self::Authentication,
            400 | 404 | 422 => Self::InvalidRequest,
            408 => Self::Timeout,
            _ => Self::Api { status },
        }
    }

    /// Whether another attempt might succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::RateLimit | Self::Connection | Self::Timeout => true,
            Self::Api { status } => *status >= 500,
            Self::Authentication | Self::InvalidRequest | Self::Internal => false,
        }
    }

    /// Label used in the placeholder text of an unavailable summary.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RateLimit => "OpenAI Rate Limit Error",
            Self::Authentication => "OpenAI Authentication Error",
            Self::Connection => "OpenAI Connection Error",
            Self::Timeout => "OpenAI Timeout Error",
            Self::InvalidRequest => "OpenAI Invalid Request Error",
            Self::Api { .. } => "OpenAI API Error",
            Self::Internal => "Internal Error",
        }
    }
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api { status } => write!(f, "API error (HTTP {})", status),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("LLM error ({kind}): {message}")]
    Llm { kind: LlmErrorKind, message: String },

    #[error("Email API returned {status}: {body}")]
    Email { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("General error: {0}")]
    General(String),
}

impl DigestError {
    pub fn llm(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self::Llm {
            kind,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DigestError>;
