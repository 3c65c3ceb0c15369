use crate::types::{DigestError, DigestItem, Result};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use tracing::{debug, info, warn};

/// One feed entry with the fields the digest cares about.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub title: String,
    pub link: Option<String>,
    pub summary: String,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

impl ParsedEntry {
    /// Title and summary joined, the text keyword searches run against.
    pub fn search_text(&self) -> String {
        format!("{}\n{}", self.title, self.summary)
    }

    pub fn into_item(self, source_name: &str, source_url: &str) -> Option<DigestItem> {
        let link = self.link?;
        Some(
            DigestItem::new(self.title, link, self.summary, source_name, source_url)
                .with_published(self.published)
                .with_author(self.author),
        )
    }
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

pub struct FeedParser;

impl FeedParser {
    pub fn parse_feed(content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let normalized = Self::normalize_encoding(content)?;
        let feed = parser::parse(normalized.as_bytes())
            .map_err(|e| DigestError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let entries: Vec<ParsedEntry> = feed.entries.into_iter().map(Self::parse_entry).collect();

        debug!("Parsed feed with {} entries", entries.len());
        Ok(ParsedFeed { title, entries })
    }

    /// Every entry of the feed, linkless ones included.
    pub fn parse_entries(content: &str) -> Result<Vec<ParsedEntry>> {
        Ok(Self::parse_feed(content)?.entries)
    }

    /// Parse `content` into at most `limit` digest items, in feed order.
    /// Entries without a link are skipped.
    pub fn parse_items(content: &str, source_name: &str, source_url: &str, limit: usize) -> Result<Vec<DigestItem>> {
        let feed = Self::parse_feed(content)?;

        let mut items = Vec::new();
        for entry in feed.entries.into_iter().take(limit) {
            let title = entry.title.clone();
            match entry.into_item(source_name, source_url) {
                Some(item) => items.push(item),
                None => warn!("Skipping {} entry with no link: {}", source_name, title),
            }
        }

        info!("Fetched {} items from {}", items.len(), source_name);
        Ok(items)
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> ParsedEntry {
        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "No Title".to_string());

        // Prefer the alternate link, else whatever comes first
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.trim().to_string())
            .filter(|href| !href.is_empty());

        let summary = entry
            .summary
            .map(|s| s.content)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();

        let author = entry
            .authors
            .first()
            .map(|a| a.name.trim().to_string())
            .filter(|name| !name.is_empty());

        ParsedEntry {
            title,
            link,
            summary,
            author,
            published: entry.published.or(entry.updated),
        }
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        let has_feed_indicators = content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<rdf:rdf")
            || content_lower.contains("<channel");

        let has_xml_declaration = content.trim_start().starts_with("<?xml");

        has_feed_indicators && (has_xml_declaration || content_lower.contains('<'))
    }

    pub fn normalize_encoding(content: &str) -> Result<String> {
        let normalized = content
            .trim_start_matches('\u{feff}')
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .trim()
            .to_string();

        if normalized.is_empty() {
            return Err(DigestError::Parse("Empty content after normalization".to_string()));
        }

        Ok(normalized)
    }
}
