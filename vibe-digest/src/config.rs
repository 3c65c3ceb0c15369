//! Runtime configuration. Limits, model settings and endpoints come from the
//! environment with built-in defaults; API keys and addresses are required.

use crate::types::{DigestError, FetchConfig, Result};
use std::env;
use std::str::FromStr;
use tracing::{debug, error};

pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";
pub const DEFAULT_AWS_BLOG_FEED_URL: &str = "https://aws.amazon.com/blogs/aws/feed/";

#[derive(Debug, Clone, PartialEq)]
pub struct DigestConfig {
    // Content limits
    pub max_items: usize,
    pub max_feed_items_per_source: usize,
    pub max_sources: usize,

    // LLM
    pub openai_api_url: String,
    pub openai_timeout: u64,
    pub openai_max_tokens: u32,
    pub openai_temperature: f32,
    pub openai_model: String,
    pub openai_fast_model: String,
    pub openai_fast_model_threshold: usize,
    pub openai_max_concurrent: usize,
    pub openai_batch_size: usize,
    pub openai_max_retries: u32,
    pub digest_voice: String,

    // Text and cache
    pub max_text_length: usize,
    pub cache_size_limit: usize,
    pub cache_cleanup_size: usize,

    // Network
    pub request_timeout: u64,
    pub max_feed_workers: usize,
    pub aws_blog_feed_url: String,

    // Email
    pub sendgrid_api_url: String,
    pub email_timeout: u64,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_items: 15,
            max_feed_items_per_source: 3,
            max_sources: 10,
            openai_api_url: DEFAULT_OPENAI_API_URL.to_string(),
            openai_timeout: 30,
            openai_max_tokens: 300,
            openai_temperature: 0.7,
            openai_model: "gpt-4o".to_string(),
            openai_fast_model: "gpt-4o-mini".to_string(),
            openai_fast_model_threshold: 1_500,
            openai_max_concurrent: 5,
            openai_batch_size: 3,
            openai_max_retries: 3,
            digest_voice: "Paul Duvall".to_string(),
            max_text_length: 8_000,
            cache_size_limit: 1_000,
            cache_cleanup_size: 100,
            request_timeout: 30,
            max_feed_workers: 5,
            aws_blog_feed_url: DEFAULT_AWS_BLOG_FEED_URL.to_string(),
            sendgrid_api_url: DEFAULT_SENDGRID_API_URL.to_string(),
            email_timeout: 30,
        }
    }
}

impl DigestConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Unset keys keep
    /// their defaults; a set but unparsable value is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();

        let config = Self {
            max_items: parse_or(&lookup, "DIGEST_MAX_ITEMS", d.max_items)?,
            max_feed_items_per_source: parse_or(
                &lookup,
                "DIGEST_MAX_FEED_ITEMS",
                d.max_feed_items_per_source,
            )?,
            max_sources: parse_or(&lookup, "DIGEST_MAX_SOURCES", d.max_sources)?,
            openai_api_url: string_or(&lookup, "OPENAI_API_URL", d.openai_api_url),
            openai_timeout: parse_or(&lookup, "OPENAI_TIMEOUT", d.openai_timeout)?,
            openai_max_tokens: parse_or(&lookup, "OPENAI_MAX_TOKENS", d.openai_max_tokens)?,
            openai_temperature: parse_or(&lookup, "OPENAI_TEMPERATURE", d.openai_temperature)?,
            openai_model: string_or(&lookup, "OPENAI_MODEL", d.openai_model),
            openai_fast_model: string_or(&lookup, "OPENAI_FAST_MODEL", d.openai_fast_model),
            openai_fast_model_threshold: parse_or(
                &lookup,
                "OPENAI_FAST_MODEL_THRESHOLD",
                d.openai_fast_model_threshold,
            )?,
            openai_max_concurrent: parse_or(
                &lookup,
                "OPENAI_MAX_CONCURRENT",
                d.openai_max_concurrent,
            )?,
            openai_batch_size: parse_or(&lookup, "OPENAI_BATCH_SIZE", d.openai_batch_size)?,
            openai_max_retries: parse_or(&lookup, "OPENAI_MAX_RETRIES", d.openai_max_retries)?,
            digest_voice: string_or(&lookup, "DIGEST_VOICE", d.digest_voice),
            max_text_length: parse_or(&lookup, "DIGEST_MAX_TEXT_LENGTH", d.max_text_length)?,
            cache_size_limit: parse_or(&lookup, "OPENAI_CACHE_SIZE_LIMIT", d.cache_size_limit)?,
            cache_cleanup_size: parse_or(
                &lookup,
                "OPENAI_CACHE_CLEANUP_SIZE",
                d.cache_cleanup_size,
            )?,
            request_timeout: parse_or(&lookup, "REQUEST_TIMEOUT", d.request_timeout)?,
            max_feed_workers: parse_or(&lookup, "MAX_FEED_WORKERS", d.max_feed_workers)?,
            aws_blog_feed_url: string_or(&lookup, "AWS_BLOG_FEED_URL", d.aws_blog_feed_url),
            sendgrid_api_url: string_or(&lookup, "SENDGRID_API_URL", d.sendgrid_api_url),
            email_timeout: parse_or(&lookup, "EMAIL_TIMEOUT", d.email_timeout)?,
        };

        if config.max_feed_workers == 0 || config.openai_max_concurrent == 0 {
            return Err(DigestError::Config(
                "MAX_FEED_WORKERS and OPENAI_MAX_CONCURRENT must be at least 1".to_string(),
            ));
        }
        if config.openai_batch_size == 0 {
            return Err(DigestError::Config("OPENAI_BATCH_SIZE must be at least 1".to_string()));
        }

        debug!("Loaded digest configuration: {:?}", config);
        Ok(config)
    }

    /// HTTP settings for feed fetching derived from this configuration.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout_seconds: self.request_timeout,
            ..FetchConfig::default()
        }
    }
}

fn string_or<F>(lookup: &F, key: &str, default: String) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default,
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|e| DigestError::Config(format!("{}={:?}: {}", key, value, e))),
        _ => Ok(default),
    }
}

/// Secrets and addresses the run cannot proceed without.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub sendgrid_api_key: String,
    pub email_to: String,
    pub email_from: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => {
                    error!("Missing required environment variable: {}", key);
                    Err(DigestError::MissingEnv(key.to_string()))
                }
            }
        };

        Ok(Self {
            openai_api_key: require("OPENAI_API_KEY")?,
            email_to: require("EMAIL_TO")?,
            email_from: require("EMAIL_FROM")?,
            sendgrid_api_key: require("SENDGRID_API_KEY")?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"***")
            .field("sendgrid_api_key", &"***")
            .field("email_to", &self.email_to)
            .field("email_from", &self.email_from)
            .finish()
    }
}
