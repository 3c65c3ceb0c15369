use crate::feed_config::{FeedCatalog, FeedSource};
use crate::traits::ItemSource;
use crate::types::{DigestItem, Result};
use crate::{FeedParser, Fetcher};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Pulls the newest entries of every catalog feed, a bounded number of
/// feeds at a time.
pub struct FeedCollector {
    fetcher: Arc<Fetcher>,
    catalog: FeedCatalog,
    max_workers: usize,
    items_per_feed: usize,
}

impl FeedCollector {
    pub fn new(fetcher: Arc<Fetcher>, catalog: FeedCatalog) -> Self {
        Self {
            fetcher,
            catalog,
            max_workers: 5,
            items_per_feed: 3,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_items_per_feed(mut self, items_per_feed: usize) -> Self {
        self.items_per_feed = items_per_feed;
        self
    }

    /// Fetch one feed. Errors are returned to the caller.
    pub async fn fetch_single_feed(&self, feed: &FeedSource) -> Result<Vec<DigestItem>> {
        info!("Fetching feed: {}", feed.url);
        let content = self.fetcher.fetch_feed(&feed.url).await?;
        if !FeedParser::is_valid_feed_content(&content) {
            warn!("{} does not look like an RSS/Atom document", feed.url);
        }
        FeedParser::parse_items(&content, &feed.source_name, &feed.url, self.items_per_feed)
    }

    /// Fetch every enabled feed. A feed that fails contributes nothing; the
    /// result keeps catalog order.
    pub async fn fetch_all_feed_items(&self) -> Vec<DigestItem> {
        let feeds: Vec<FeedSource> = self
            .catalog
            .feeds()
            .iter()
            .filter(|f| f.enabled)
            .cloned()
            .collect();
        let total_feeds = feeds.len();
        info!("Loading {} feeds with {} workers", total_feeds, self.max_workers);

        let results: Vec<Option<Vec<DigestItem>>> = stream::iter(feeds)
            .map(|feed| async move {
                match self.fetch_single_feed(&feed).await {
                    Ok(items) => Some(items),
                    Err(e) => {
                        error!("Exception fetching or parsing feed {}: {}", feed.url, e);
                        None
                    }
                }
            })
            .buffered(self.max_workers)
            .collect()
            .await;

        let successful = results.iter().filter(|r| r.is_some()).count();
        let items: Vec<DigestItem> = results.into_iter().flatten().flatten().collect();

        info!(
            "Fetched {} items from {}/{} feeds",
            items.len(),
            successful,
            total_feeds
        );
        items
    }
}

#[async_trait]
impl ItemSource for FeedCollector {
    fn source_name(&self) -> String {
        match self.catalog.origin() {
            Some(path) => format!("Feed catalog ({})", path.display()),
            None => "Feed catalog (built-in)".to_string(),
        }
    }

    async fn collect(&self) -> Result<Vec<DigestItem>> {
        Ok(self.fetch_all_feed_items().await)
    }
}
