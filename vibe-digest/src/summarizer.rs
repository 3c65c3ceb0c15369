use crate::config::DigestConfig;
use crate::llm_adapter::{ChatCompletion, ChatMessage, ChatRequest, LlmClient};
use crate::rss_utils::{text::truncate_chars, url::host_key};
use crate::types::{DigestError, LlmErrorKind, Result, SummarizationRequest};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Summaries produced by one concurrent run: `(summary, source_name, source_url)`.
pub type SummaryTriple = (String, String, String);

#[derive(Debug, Default, Clone)]
struct SummaryMetrics {
    cache_hits: u64,
    cache_misses: u64,
    api_calls: u64,
    failures: u64,
    summaries: u64,
    total_tokens: u64,
    total_cost: f64,
    total_latency_ms: u64,
}

/// Snapshot of summarizer activity since construction.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PerformanceReport {
    pub cache_hit_rate: f64,
    pub avg_cost_per_summary: f64,
    pub avg_tokens_per_summary: f64,
    pub avg_latency_ms: f64,
    pub error_rate: f64,
    pub total_runtime: f64,
    pub total_api_calls: u64,
    pub total_cost: f64,
}

/// Turns article text into short editorial summaries through an [`LlmClient`].
///
/// Summaries are cached by the SHA-256 of the request text, so identical
/// content is only ever sent once per process. Failures never propagate out
/// of [`Summarizer::summarize`]; they become a placeholder line naming the
/// source and the error class.
pub struct Summarizer {
    client: Arc<dyn LlmClient>,
    config: DigestConfig,
    cache: Mutex<HashMap<String, String>>,
    metrics: Mutex<SummaryMetrics>,
    started: Instant,
    retry_initial: Duration,
    retry_max: Duration,
}

impl Summarizer {
    pub fn new(client: Arc<dyn LlmClient>, config: DigestConfig) -> Self {
        info!("Summarizer using {}", client.adapter_name());
        Self {
            client,
            config,
            cache: Mutex::new(HashMap::new()),
            metrics: Mutex::new(SummaryMetrics::default()),
            started: Instant::now(),
            retry_initial: Duration::from_secs(1),
            retry_max: Duration::from_secs(10),
        }
    }

    pub fn with_retry_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_initial = initial;
        self.retry_max = max;
        self
    }

    pub fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// Fast model for short texts, the configured model otherwise.
    pub fn select_model(&self, text: &str) -> &str {
        if text.chars().count() < self.config.openai_fast_model_threshold {
            &self.config.openai_fast_model
        } else {
            &self.config.openai_model
        }
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn summarize(&self, request: &SummarizationRequest) -> String {
        let key = content_hash(&request.text);
        if let Some(hit) = self.cached(&key).await {
            debug!("Cache hit for {}", request.source_name);
            return hit;
        }

        let text = truncate_chars(&request.text, self.config.max_text_length);
        let chat = ChatRequest {
            model: self.select_model(text).to_string(),
            messages: vec![
                ChatMessage::system(self.system_prompt()),
                ChatMessage::user(self.article_prompt(text, &request.source_name, &request.source_url)),
            ],
            max_tokens: self.config.openai_max_tokens,
            temperature: self.config.openai_temperature,
        };

        match self.call_with_retry(&chat).await {
            Ok(completion) => {
                let summary = completion.content.trim().to_string();
                self.record_success(&chat.model, &completion, 1).await;
                self.store(key, summary.clone()).await;
                summary
            }
            Err(e) => {
                error!("Summarization failed for '{}': {}", request.source_name, e);
                self.metrics.lock().await.failures += 1;
                unavailable(&request.source_name, &e)
            }
        }
    }

    /// Summarize every request with at most `openai_max_concurrent` calls in
    /// flight. Output order matches input order.
    pub async fn summarize_concurrent(&self, requests: &[SummarizationRequest]) -> Vec<SummaryTriple> {
        info!(
            "Summarizing {} items, {} at a time",
            requests.len(),
            self.config.openai_max_concurrent
        );

        stream::iter(requests)
            .map(|request| async move {
                let summary = self.summarize(request).await;
                (summary, request.source_name.clone(), request.source_url.clone())
            })
            .buffered(self.config.openai_max_concurrent.max(1))
            .collect()
            .await
    }

    /// Summarize requests several at a time, one API call per chunk of
    /// `openai_batch_size` uncached requests. A failed call fails the whole
    /// batch so the caller can fall back to per-item summarization.
    pub async fn batch_summarize(&self, requests: &[SummarizationRequest]) -> Result<Vec<String>> {
        let mut results: Vec<Option<String>> = vec![None; requests.len()];
        let mut pending = Vec::new();

        for (idx, request) in requests.iter().enumerate() {
            match self.cached(&content_hash(&request.text)).await {
                Some(hit) => results[idx] = Some(hit),
                None => pending.push(idx),
            }
        }

        for chunk in pending.chunks(self.config.openai_batch_size.max(1)) {
            let batch: Vec<&SummarizationRequest> = chunk.iter().map(|&idx| &requests[idx]).collect();
            let summaries = self.summarize_chunk(&batch).await?;

            for (&idx, summary) in chunk.iter().zip(summaries) {
                if let Some(summary) = &summary {
                    self.store(content_hash(&requests[idx].text), summary.clone()).await;
                }
                results[idx] = summary;
            }
        }

        Ok(results
            .into_iter()
            .zip(requests)
            .map(|(summary, request)| summary.unwrap_or_else(|| missing(&request.source_name)))
            .collect())
    }

    async fn summarize_chunk(&self, batch: &[&SummarizationRequest]) -> Result<Vec<Option<String>>> {
        debug!("Sending batch of {} articles", batch.len());

        let mut body = format!(
            "Summarize each of the following {} articles separately. {}\n\
             Reply with one entry per article, each starting with \"SUMMARY n:\" \
             where n is the article number.\n",
            batch.len(),
            self.style_instructions()
        );
        for (i, request) in batch.iter().enumerate() {
            body.push_str(&format!(
                "\nARTICLE {}:\nSource: {} ({})\n{}\n",
                i + 1,
                request.source_name,
                request.source_url,
                truncate_chars(&request.text, self.config.max_text_length)
            ));
        }

        let chat = ChatRequest {
            model: self.config.openai_model.clone(),
            messages: vec![ChatMessage::system(self.system_prompt()), ChatMessage::user(body)],
            max_tokens: self.config.openai_max_tokens.saturating_mul(batch.len() as u32),
            temperature: self.config.openai_temperature,
        };

        match self.call_with_retry(&chat).await {
            Ok(completion) => {
                let summaries = parse_batch_response(&completion.content, batch.len());
                let found = summaries.iter().filter(|s| s.is_some()).count();
                if found < batch.len() {
                    warn!("Batch response contained {} of {} summaries", found, batch.len());
                }
                self.record_success(&chat.model, &completion, found as u64).await;
                Ok(summaries)
            }
            Err(e) => {
                self.metrics.lock().await.failures += batch.len() as u64;
                Err(e)
            }
        }
    }

    /// Group requests by the domain of their URL, then split each group into
    /// chunks of at most `batch_size`. Groups keep first-seen order.
    pub fn create_smart_batches(
        requests: &[SummarizationRequest],
        batch_size: usize,
    ) -> Vec<Vec<SummarizationRequest>> {
        let mut groups: Vec<(String, Vec<SummarizationRequest>)> = Vec::new();
        for request in requests {
            let domain = host_key(&request.source_url);
            match groups.iter_mut().find(|(d, _)| *d == domain) {
                Some((_, group)) => group.push(request.clone()),
                None => groups.push((domain, vec![request.clone()])),
            }
        }

        groups
            .into_iter()
            .flat_map(|(_, group)| {
                group
                    .chunks(batch_size.max(1))
                    .map(|chunk| chunk.to_vec())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub async fn performance_report(&self) -> PerformanceReport {
        let m = self.metrics.lock().await.clone();
        let lookups = m.cache_hits + m.cache_misses;
        let ratio = |num: f64, den: u64| if den == 0 { 0.0 } else { num / den as f64 };

        PerformanceReport {
            cache_hit_rate: ratio(m.cache_hits as f64, lookups),
            avg_cost_per_summary: ratio(m.total_cost, m.summaries),
            avg_tokens_per_summary: ratio(m.total_tokens as f64, m.summaries),
            avg_latency_ms: ratio(m.total_latency_ms as f64, m.api_calls),
            error_rate: ratio(m.failures as f64, m.cache_misses),
            total_runtime: self.started.elapsed().as_secs_f64(),
            total_api_calls: m.api_calls,
            total_cost: m.total_cost,
        }
    }

    async fn cached(&self, key: &str) -> Option<String> {
        let hit = self.cache.lock().await.get(key).cloned();
        let mut metrics = self.metrics.lock().await;
        if hit.is_some() {
            metrics.cache_hits += 1;
        } else {
            metrics.cache_misses += 1;
        }
        hit
    }

    async fn store(&self, key: String, summary: String) {
        let mut cache = self.cache.lock().await;
        cache.insert(key, summary);

        if cache.len() > self.config.cache_size_limit {
            let evict = self
                .config
                .cache_cleanup_size
                .max(cache.len() - self.config.cache_size_limit);
            let victims: Vec<String> = cache.keys().take(evict).cloned().collect();
            for key in &victims {
                cache.remove(key);
            }
            debug!("Evicted {} cached summaries", victims.len());
        }
    }

    async fn record_success(&self, model: &str, completion: &ChatCompletion, summaries: u64) {
        let mut metrics = self.metrics.lock().await;
        metrics.summaries += summaries;
        metrics.total_tokens += completion.prompt_tokens + completion.completion_tokens;
        metrics.total_cost += estimate_cost(model, completion.prompt_tokens, completion.completion_tokens);
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        ExponentialBackoff {
            current_interval: self.retry_initial,
            initial_interval: self.retry_initial,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.retry_max,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    async fn call_with_retry(&self, chat: &ChatRequest) -> Result<ChatCompletion> {
        let attempts = self.config.openai_max_retries.max(1);
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = Instant::now();
            let result = self.client.chat(chat).await;
            {
                let mut metrics = self.metrics.lock().await;
                metrics.api_calls += 1;
                metrics.total_latency_ms += started.elapsed().as_millis() as u64;
            }

            match result {
                Err(DigestError::Llm { kind, message }) if kind.is_retriable() && attempt < attempts => {
                    let delay = backoff.next_backoff().unwrap_or(self.retry_max);
                    warn!(
                        "{} on attempt {}/{}: {}; retrying in {:?}",
                        kind, attempt, attempts, message, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn system_prompt(&self) -> String {
        let voice = &self.config.digest_voice;
        format!(
            "You are an editorial assistant summarizing AI-assisted software development \
             articles in the style of {voice}. Start with 'Source: [source name] ([source URL])', \
             then summarize concisely. Mimic {voice}'s clarity, structure, and engineering \
             precision. Tag summaries with appropriate emojis. Include the original article \
             link prominently in the summary."
        )
    }

    fn style_instructions(&self) -> String {
        format!(
            "Summarize in the tone and clarity of a high-signal AI newsletter like 'The Vibe'. \
             Write in the voice of {}. Prioritize clarity, precision, and relevance to \
             experienced software engineers.\n\
             Focus on the big idea, highlight any tool or trend, tag it appropriately \
             (e.g., 📈 trend, 🛠️ tool, 🔒 security, 🔬 research, 🚀 release), \
             and end with a useful takeaway.\n\
             Use 3–4 short, data-rich sentences. Avoid fluff.",
            self.config.digest_voice
        )
    }

    fn article_prompt(&self, text: &str, source_name: &str, source_url: &str) -> String {
        format!(
            "Source: {} ({})\nArticle:\n{}\n\n{}",
            source_name,
            source_url,
            text,
            self.style_instructions()
        )
    }
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Split a batch reply on `SUMMARY n:` markers. Slot `n - 1` holds the text
/// following marker `n`; numbers outside `1..=expected` are ignored.
pub fn parse_batch_response(content: &str, expected: usize) -> Vec<Option<String>> {
    let mut summaries = vec![None; expected];
    let Ok(marker) = Regex::new(r"(?mi)^\s*\**SUMMARY\s+(\d+)\s*:\**") else {
        return summaries;
    };

    let markers: Vec<(usize, usize, usize)> = marker
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let n = caps.get(1)?.as_str().parse::<usize>().ok()?;
            Some((n, whole.start(), whole.end()))
        })
        .collect();

    for (i, &(n, _, body_start)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map(|m| m.1).unwrap_or(content.len());
        let body = content[body_start..body_end].trim();
        if n >= 1 && n <= expected && !body.is_empty() && summaries[n - 1].is_none() {
            summaries[n - 1] = Some(body.to_string());
        }
    }

    summaries
}

/// Rough USD cost of one call at published per-million-token prices.
pub fn estimate_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let (input, output) = if model.starts_with("gpt-4o-mini") {
        (0.15, 0.60)
    } else {
        (2.50, 10.00)
    };
    (prompt_tokens as f64 * input + completion_tokens as f64 * output) / 1_000_000.0
}

fn unavailable(source_name: &str, error: &DigestError) -> String {
    let kind = match error {
        DigestError::Llm { kind, .. } => *kind,
        _ => LlmErrorKind::Internal,
    };
    format!("[Summary unavailable for {} - {}]", source_name, kind.label())
}

fn missing(source_name: &str) -> String {
    format!("[Summary unavailable for {}]", source_name)
}
