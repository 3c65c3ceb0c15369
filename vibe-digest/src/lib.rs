pub mod types;
pub mod config;
pub mod feed_config;
pub mod fetcher;
pub mod parser;
pub mod rss_utils;
pub mod search;
pub mod traits;
pub mod sources;
pub mod llm_adapter;
pub mod summarizer;
pub mod digest;
pub mod email;
pub mod pipeline;

pub use types::*;
pub use config::{Credentials, DigestConfig};
pub use feed_config::{FeedCatalog, FeedSource};
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use traits::ItemSource;
pub use sources::{AiEngineeringSearch, AwsBlogSearch, FeedCollector};
pub use llm_adapter::{LlmClient, MockLlmClient, OpenAiClient};
pub use summarizer::{PerformanceReport, Summarizer};
pub use digest::{format_digest, DigestSections};
pub use email::{DigestMailer, SendGridMailer};
pub use pipeline::{dedupe_and_sort, DigestPipeline, DigestRun, SummarizationStrategy};
