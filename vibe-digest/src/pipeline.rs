use crate::config::DigestConfig;
use crate::digest::{digest_subject, format_digest, DigestSections};
use crate::email::DigestMailer;
use crate::summarizer::Summarizer;
use crate::traits::ItemSource;
use crate::types::{DigestError, DigestItem, Result, SummarizationRequest};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How the pipeline turns requests into summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummarizationStrategy {
    /// Several articles per API call; falls back to `Concurrent`.
    Batch,
    #[default]
    Concurrent,
    /// One at a time, stopping once `max_sources` sources are covered.
    Sequential,
}

impl FromStr for SummarizationStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "batch" => Ok(Self::Batch),
            "concurrent" => Ok(Self::Concurrent),
            "sequential" => Ok(Self::Sequential),
            other => Err(format!(
                "unknown strategy '{}' (expected batch, concurrent or sequential)",
                other
            )),
        }
    }
}

impl fmt::Display for SummarizationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Batch => "batch",
            Self::Concurrent => "concurrent",
            Self::Sequential => "sequential",
        };
        f.write_str(name)
    }
}

/// Drop repeated `(title, link)` pairs, keeping the first, then order newest
/// first. Undated items go last; ties keep their input order.
pub fn dedupe_and_sort(items: Vec<DigestItem>) -> Vec<DigestItem> {
    let mut seen = HashSet::new();
    let mut unique: Vec<DigestItem> = items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect();
    unique.sort_by(|a, b| b.published.cmp(&a.published));
    unique
}

/// Build summarization requests for the first `max_items` items.
pub fn prepare_requests(items: &[DigestItem], max_items: usize) -> Vec<SummarizationRequest> {
    items
        .iter()
        .take(max_items)
        .filter_map(|item| {
            let text = format!(
                "Title: {}\nLink: {}\nSource: {}\nPublished: {}\nAuthor: {}\nContent: {}",
                item.title,
                item.link,
                item.source_name,
                item.published
                    .map(|p| p.to_rfc3339())
                    .unwrap_or_else(|| "N/A".to_string()),
                item.author.as_deref().unwrap_or("N/A"),
                item.summary
            );

            match SummarizationRequest::new(text, item.source_name.clone(), item.link.clone()) {
                Ok(request) => Some(request),
                Err(e) => {
                    warn!("Skipping invalid item '{}': {}", item.title, e);
                    None
                }
            }
        })
        .collect()
}

/// Summarize the capped item list and group the results by source.
pub async fn summarize_items(
    summarizer: &Summarizer,
    items: &[DigestItem],
    strategy: SummarizationStrategy,
) -> DigestSections {
    let config = summarizer.config();
    let requests = prepare_requests(items, config.max_items);
    if requests.is_empty() {
        warn!("No valid items to summarize");
        return DigestSections::new();
    }

    let mut strategy = strategy;
    if strategy == SummarizationStrategy::Batch {
        match summarize_batched(summarizer, &requests).await {
            Ok(sections) => {
                info!("Completed batch summarization for {} sources", sections.len());
                return sections;
            }
            Err(e) => {
                error!("Batch summarization failed: {}, falling back to concurrent", e);
                strategy = SummarizationStrategy::Concurrent;
            }
        }
    }

    let sections = match strategy {
        SummarizationStrategy::Sequential => {
            summarize_sequential(summarizer, &requests, config.max_sources).await
        }
        _ => summarizer
            .summarize_concurrent(&requests)
            .await
            .into_iter()
            .map(|(summary, source, _)| (source, summary))
            .collect(),
    };

    info!("Completed {} summarization for {} sources", strategy, sections.len());
    sections
}

async fn summarize_batched(
    summarizer: &Summarizer,
    requests: &[SummarizationRequest],
) -> Result<DigestSections> {
    let batch_size = summarizer.config().openai_batch_size;
    if requests.len() < batch_size {
        return Err(DigestError::General(format!(
            "Not enough items for batching (need {})",
            batch_size
        )));
    }

    info!("Using batch summarization for {} items", requests.len());
    let mut sections = DigestSections::new();
    for batch in Summarizer::create_smart_batches(requests, batch_size) {
        let summaries = summarizer.batch_summarize(&batch).await?;
        for (request, summary) in batch.iter().zip(summaries) {
            sections.push(request.source_name.clone(), summary);
        }
    }
    Ok(sections)
}

async fn summarize_sequential(
    summarizer: &Summarizer,
    requests: &[SummarizationRequest],
    max_sources: usize,
) -> DigestSections {
    info!("Using sequential summarization for {} items", requests.len());
    let mut sections = DigestSections::new();
    for request in requests {
        let summary = summarizer.summarize(request).await;
        sections.push(request.source_name.clone(), summary);

        if sections.len() >= max_sources {
            info!("Reached source limit of {}, stopping sequential processing", max_sources);
            break;
        }
    }
    sections
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct DigestRun {
    pub collected: usize,
    pub unique: usize,
    pub sections: DigestSections,
    pub subject: String,
    pub html: String,
    pub markdown: String,
    pub emailed: bool,
}

/// Collect, summarize, format and deliver one digest.
pub struct DigestPipeline {
    sources: Vec<Box<dyn ItemSource>>,
    summarizer: Arc<Summarizer>,
    mailer: Box<dyn DigestMailer>,
    strategy: SummarizationStrategy,
}

impl DigestPipeline {
    pub fn new(summarizer: Arc<Summarizer>, mailer: Box<dyn DigestMailer>) -> Self {
        Self {
            sources: Vec::new(),
            summarizer,
            mailer,
            strategy: SummarizationStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SummarizationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn add_source(&mut self, source: Box<dyn ItemSource>) {
        info!("Adding source to pipeline: {}", source.source_name());
        self.sources.push(source);
    }

    pub fn config(&self) -> &DigestConfig {
        self.summarizer.config()
    }

    /// Drain every source. A failing source is logged and skipped.
    pub async fn gather_items(&self) -> Vec<DigestItem> {
        let mut items = Vec::new();
        for source in &self.sources {
            match source.collect().await {
                Ok(found) => {
                    info!("Collected {} items from {}", found.len(), source.source_name());
                    items.extend(found);
                }
                Err(e) => error!("{} failed: {}", source.source_name(), e),
            }
        }
        items
    }

    pub async fn run(&self, dry_run: bool) -> Result<DigestRun> {
        self.run_at(Utc::now(), dry_run).await
    }

    /// Run with an explicit timestamp for the heading and subject.
    pub async fn run_at(&self, now: DateTime<Utc>, dry_run: bool) -> Result<DigestRun> {
        info!(
            "Starting digest run: {} sources, {} strategy",
            self.sources.len(),
            self.strategy
        );

        let items = self.gather_items().await;
        let collected = items.len();
        let unique_items = dedupe_and_sort(items);
        info!("{} items collected, {} unique", collected, unique_items.len());

        let sections = summarize_items(&self.summarizer, &unique_items, self.strategy).await;
        if sections.is_empty() {
            warn!("Digest has no summaries");
        }

        let (html, markdown) = format_digest(&sections, now);
        let subject = digest_subject(now);
        info!("\n--- Generated Markdown Digest ---\n{}\n--- End ---", markdown);

        let report = self.summarizer.performance_report().await;
        info!(
            "Summarizer: {} API calls, cache hit rate {:.1}%, error rate {:.1}%, est. cost ${:.4}",
            report.total_api_calls,
            report.cache_hit_rate * 100.0,
            report.error_rate * 100.0,
            report.total_cost
        );

        let emailed = if dry_run {
            info!("Dry run: skipping email");
            false
        } else {
            self.mailer.send(&subject, &html).await?;
            true
        };

        Ok(DigestRun {
            collected,
            unique: unique_items.len(),
            sections,
            subject,
            html,
            markdown,
            emailed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::MockLlmClient;
    use chrono::TimeZone;

    fn item(title: &str, link: &str, source: &str, day: Option<u32>) -> DigestItem {
        DigestItem::new(title, link, "body", source, "https://example.com/feed")
            .with_published(day.map(|d| Utc.with_ymd_and_hms(2025, 10, d, 0, 0, 0).unwrap()))
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let mut dup = item("Same", "https://a/1", "Second Source", Some(2));
        dup.summary = "different".to_string();
        let items = vec![item("Same", "https://a/1", "First Source", Some(2)), dup];

        let unique = dedupe_and_sort(items);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].source_name, "First Source");
    }

    #[test]
    fn sort_is_newest_first_with_undated_last() {
        let items = vec![
            item("undated-1", "u1", "S", None),
            item("old", "o", "S", Some(1)),
            item("new", "n", "S", Some(10)),
            item("undated-2", "u2", "S", None),
            item("mid", "m", "S", Some(5)),
        ];

        let titles: Vec<String> = dedupe_and_sort(items).into_iter().map(|i| i.title).collect();
        assert_eq!(titles, vec!["new", "mid", "old", "undated-1", "undated-2"]);
    }

    #[test]
    fn requests_are_capped_and_carry_item_fields() {
        let mut first = item("Title A", "https://a/1", "Source A", Some(3));
        first.author = Some("Ana".to_string());
        let items = vec![
            first,
            item("Title B", "https://b/1", "Source B", None),
            item("C", "https://c/1", "S", None),
        ];

        let requests = prepare_requests(&items, 2);
        assert_eq!(requests.len(), 2);
        let head = "Title: Title A\nLink: https://a/1\nSource: Source A\nPublished: 2025-10-03";
        assert!(requests[0].text.starts_with(head));
        assert!(requests[0].text.contains("\nAuthor: Ana\nContent: body"));
        assert!(requests[1].text.contains("Published: N/A\nAuthor: N/A"));
        assert_eq!(requests[0].source_url, "https://a/1");
    }

    #[test]
    fn blank_source_is_skipped() {
        let items = vec![item("T", "https://a/1", "  ", None), item("T2", "https://a/2", "S", None)];
        assert_eq!(prepare_requests(&items, 10).len(), 1);
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("Batch".parse::<SummarizationStrategy>(), Ok(SummarizationStrategy::Batch));
        assert_eq!("sequential".parse::<SummarizationStrategy>(), Ok(SummarizationStrategy::Sequential));
        assert!("parallel".parse::<SummarizationStrategy>().is_err());
        assert_eq!(SummarizationStrategy::default().to_string(), "concurrent");
    }

    #[tokio::test]
    async fn sequential_stops_at_source_limit() {
        let config = DigestConfig {
            max_sources: 2,
            ..DigestConfig::default()
        };
        let client = Arc::new(MockLlmClient::new("seq"));
        let summarizer = Summarizer::new(client.clone(), config);

        let items = vec![
            item("a", "https://a/1", "A", None),
            item("b", "https://b/1", "B", None),
            item("c", "https://c/1", "C", None),
        ];

        let sections = summarize_items(&summarizer, &items, SummarizationStrategy::Sequential).await;
        assert_eq!(sections.len(), 2);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn batch_with_too_few_items_falls_back() {
        let client = Arc::new(MockLlmClient::new("fallback").replying("Single summary"));
        let summarizer = Summarizer::new(client.clone(), DigestConfig::default());

        let items = vec![item("a", "https://a/1", "A", None), item("b", "https://b/1", "B", None)];

        let sections = summarize_items(&summarizer, &items, SummarizationStrategy::Batch).await;
        assert_eq!(sections.total_summaries(), 2);
        assert_eq!(sections.get("A").unwrap().summaries, vec!["Single summary"]);
        assert_eq!(client.call_count(), 2);
    }
}
