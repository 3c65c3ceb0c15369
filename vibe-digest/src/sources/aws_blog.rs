use crate::parser::{FeedParser, ParsedEntry};
use crate::search::{QueryMatcher, AWS_DEFAULT_QUERIES, AWS_EXTRA_QUERIES};
use crate::traits::ItemSource;
use crate::types::{DigestItem, Result};
use crate::Fetcher;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub const AWS_BLOG_SOURCE_NAME: &str = "AWS Blog";
pub const AWS_BLOG_SOURCE_URL: &str = "https://aws.amazon.com/blogs/aws/";

/// Keyword search over the AWS news blog feed.
pub struct AwsBlogSearch {
    fetcher: Arc<Fetcher>,
    feed_url: String,
    queries: Vec<String>,
    max_results_per_query: usize,
}

impl AwsBlogSearch {
    pub fn new(fetcher: Arc<Fetcher>, feed_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            feed_url: feed_url.into(),
            queries: with_extra_queries(AWS_DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect()),
            max_results_per_query: 3,
        }
    }

    /// Replace the base queries. The always-searched terms are kept.
    pub fn with_base_queries(mut self, base_queries: Vec<String>) -> Self {
        self.queries = with_extra_queries(base_queries);
        self
    }

    pub fn with_max_results_per_query(mut self, max_results_per_query: usize) -> Self {
        self.max_results_per_query = max_results_per_query;
        self
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub async fn fetch_posts(&self) -> Result<Vec<DigestItem>> {
        let content = self.fetcher.fetch_feed(&self.feed_url).await?;
        let entries = FeedParser::parse_entries(&content)?;

        let posts: Vec<DigestItem> = select_entries(&entries, &self.queries, self.max_results_per_query)
            .into_iter()
            .filter_map(|entry| entry.clone().into_item(AWS_BLOG_SOURCE_NAME, AWS_BLOG_SOURCE_URL))
            // Search hits are undated, so they sort after every dated feed item
            .map(|item| item.with_published(None))
            .collect();

        info!("Added {} AWS Blog items", posts.len());
        Ok(posts)
    }
}

#[async_trait]
impl ItemSource for AwsBlogSearch {
    fn source_name(&self) -> String {
        AWS_BLOG_SOURCE_NAME.to_string()
    }

    async fn collect(&self) -> Result<Vec<DigestItem>> {
        self.fetch_posts().await
    }
}

fn with_extra_queries(mut queries: Vec<String>) -> Vec<String> {
    queries.extend(AWS_EXTRA_QUERIES.iter().map(|q| q.to_string()));
    queries
}

/// For each query in turn, take up to `max_per_query` entries whose title or
/// summary matches and whose link has not been taken yet.
pub fn select_entries<'a>(
    entries: &'a [ParsedEntry],
    queries: &[String],
    max_per_query: usize,
) -> Vec<&'a ParsedEntry> {
    let mut seen_links: HashSet<&str> = HashSet::new();
    let mut results = Vec::new();

    if max_per_query == 0 {
        return results;
    }

    for query in queries {
        let matcher = QueryMatcher::new(query);
        let mut count = 0;

        for entry in entries {
            let Some(link) = entry.link.as_deref() else {
                continue;
            };
            if !seen_links.contains(link) && matcher.matches(&entry.search_text()) {
                results.push(entry);
                seen_links.insert(link);
                count += 1;
                if count >= max_per_query {
                    break;
                }
            }
        }
    }

    results
}
