use crate::parser::{FeedParser, ParsedEntry};
use crate::search::{relevance_score, QueryMatcher, AI_ENGINEERING_QUERIES};
use crate::traits::ItemSource;
use crate::types::{DigestItem, Result};
use crate::Fetcher;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{error, info};

pub const DEFAULT_AI_FEEDS: [&str; 3] = [
    "https://aws.amazon.com/blogs/aws/feed/",
    "https://openai.com/news/rss.xml",
    "https://www.anthropic.com/news/feed.xml",
];

/// A matched entry with its score.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub item: DigestItem,
    pub relevance_score: f64,
    pub matched_queries: BTreeSet<String>,
}

/// Scores entries of several feeds against the AI-engineering query list and
/// keeps the best ones.
pub struct AiEngineeringSearch {
    fetcher: Arc<Fetcher>,
    feed_urls: Vec<String>,
    matchers: Vec<QueryMatcher>,
    max_results: usize,
    min_relevance_score: f64,
}

impl AiEngineeringSearch {
    pub fn new(fetcher: Arc<Fetcher>, feed_urls: Vec<String>) -> Self {
        Self {
            fetcher,
            feed_urls,
            matchers: AI_ENGINEERING_QUERIES.iter().map(|q| QueryMatcher::new(q)).collect(),
            max_results: 50,
            min_relevance_score: 10.0,
        }
    }

    pub fn with_custom_queries(mut self, queries: &[String]) -> Self {
        self.matchers.extend(queries.iter().map(|q| QueryMatcher::new(q)));
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_min_relevance_score(mut self, min_relevance_score: f64) -> Self {
        self.min_relevance_score = min_relevance_score;
        self
    }

    pub async fn search(&self) -> Vec<ScoredEntry> {
        let mut seen_links = HashSet::new();
        let mut results = Vec::new();

        for feed_url in &self.feed_urls {
            let feed = match self.fetcher.fetch_feed(feed_url).await {
                Ok(content) => FeedParser::parse_feed(&content),
                Err(e) => Err(e),
            };
            let feed = match feed {
                Ok(feed) => feed,
                Err(e) => {
                    error!("Error parsing feed {}: {}", feed_url, e);
                    continue;
                }
            };

            let feed_name = feed.title.clone().unwrap_or_else(|| feed_url.clone());
            results.extend(self.score_entries(&feed_name, feed_url, feed.entries, &mut seen_links));
        }

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(self.max_results);

        info!("AI engineering search kept {} entries", results.len());
        results
    }

    /// Score one feed's entries, skipping links already in `seen_links`.
    pub fn score_entries(
        &self,
        feed_name: &str,
        feed_url: &str,
        entries: Vec<ParsedEntry>,
        seen_links: &mut HashSet<String>,
    ) -> Vec<ScoredEntry> {
        let mut scored = Vec::new();

        for entry in entries {
            let Some(link) = entry.link.clone() else {
                continue;
            };
            if seen_links.contains(&link) {
                continue;
            }

            let text = entry.search_text();
            let matched_queries: BTreeSet<String> = self
                .matchers
                .iter()
                .filter(|m| m.matches(&text))
                .map(|m| m.query().to_string())
                .collect();
            if matched_queries.is_empty() {
                continue;
            }

            let score = relevance_score(&text, &matched_queries);
            if score < self.min_relevance_score {
                continue;
            }

            if let Some(item) = entry.into_item(feed_name, feed_url) {
                seen_links.insert(link);
                scored.push(ScoredEntry {
                    item,
                    relevance_score: score,
                    matched_queries,
                });
            }
        }

        scored
    }
}

#[async_trait]
impl ItemSource for AiEngineeringSearch {
    fn source_name(&self) -> String {
        "AI engineering search".to_string()
    }

    async fn collect(&self) -> Result<Vec<DigestItem>> {
        Ok(self.search().await.into_iter().map(|s| s.item).collect())
    }
}
