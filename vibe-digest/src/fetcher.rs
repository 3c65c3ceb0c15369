use crate::rss_utils::url::host_key;
use crate::types::{DigestError, FetchConfig, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let initial = Duration::from_millis(self.config.retry_initial_ms);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: Duration::from_millis(self.config.retry_max_ms),
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Download a feed body, retrying transport failures, 429 and 5xx.
    pub async fn fetch_feed(&self, url: &str) -> Result<String> {
        Url::parse(url)?;
        let start_time = Instant::now();
        let mut backoff = self.backoff();
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        debug!("Fetching feed: {}", url);

        for attempt in 1..=attempts {
            self.apply_rate_limit(url).await;

            let retriable = match self.fetch_once(url).await {
                Ok(content) => {
                    info!(
                        "Fetched feed {} ({} bytes in {}ms)",
                        url,
                        content.len(),
                        start_time.elapsed().as_millis()
                    );
                    return Ok(content);
                }
                Err(FetchFailure::Fatal(e)) => {
                    last_error = Some(e);
                    false
                }
                Err(FetchFailure::Retriable(e)) => {
                    last_error = Some(e);
                    true
                }
            };

            if !retriable || attempt == attempts {
                break;
            }
            if let Some(delay) = backoff.next_backoff() {
                warn!(
                    "Attempt {} failed for {}: {}; retrying in {:?}",
                    attempt,
                    url,
                    last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        let err = last_error.unwrap_or_else(|| DigestError::General("Unknown error".to_string()));
        error!("Failed to fetch feed {}: {}", url, err);
        Err(err)
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, FetchFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::Retriable(DigestError::Http(e)))?;

        let status = response.status();
        if !status.is_success() {
            let err = DigestError::General(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ));
            return Err(if is_retriable_status(status) {
                FetchFailure::Retriable(err)
            } else {
                FetchFailure::Fatal(err)
            });
        }

        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_feed_size_mb {
                return Err(FetchFailure::Fatal(DigestError::FeedTooLarge { size_mb }));
            }
        }

        let content = response
            .text()
            .await
            .map_err(|e| FetchFailure::Retriable(DigestError::Http(e)))?;

        let size_mb = content.len() / (1024 * 1024);
        if size_mb > self.config.max_feed_size_mb {
            return Err(FetchFailure::Fatal(DigestError::FeedTooLarge { size_mb }));
        }

        Ok(content)
    }

    /// Keep at least `min_host_interval_ms` between requests to one host.
    async fn apply_rate_limit(&self, url: &str) {
        if self.config.min_host_interval_ms == 0 {
            return;
        }

        let host = host_key(url);
        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);

        // Reserve the next slot under the lock, sleep outside it.
        let wait = {
            let mut rate_limiter = self.rate_limiter.write().await;
            let now = Instant::now();
            let slot = match rate_limiter.get(&host) {
                Some(last) if *last + min_interval > now => *last + min_interval,
                _ => now,
            };
            rate_limiter.insert(host.clone(), slot);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
    }
}

enum FetchFailure {
    Retriable(DigestError),
    Fatal(DigestError),
}

fn is_retriable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_statuses() {
        assert!(is_retriable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retriable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retriable_status(StatusCode::NOT_FOUND));
        assert!(!is_retriable_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let mut backoff = fetcher.backoff();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(4)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(8)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_any_request() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let result = fetcher.fetch_feed("not a url").await;
        assert!(matches!(result, Err(DigestError::InvalidUrl(_))));
    }
}
