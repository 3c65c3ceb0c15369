use crate::rss_utils::url::is_valid_feed_url;
use crate::types::{DigestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const UNKNOWN_SOURCE: &str = "Unknown Source";

/// Files checked, in order, when neither `VIBE_CONFIG_PATH` nor an explicit
/// path points at an existing catalog.
pub const DEFAULT_CONFIG_PATHS: [&str; 5] = [
    "feeds_config.json",
    "feeds_config.yaml",
    "feeds_config.yml",
    "config/feeds.json",
    "config/feeds.yaml",
];

/// Built-in feeds: `(url, source name)`.
pub const BUILTIN_FEEDS: &[(&str, &str)] = &[
    ("https://www.google.com/alerts/feeds/11805205268710618137/2009129731931801714", "Google Alerts: Vibe Coding"),
    ("https://www.google.com/alerts/feeds/11805205268710618137/13681474149755866365", "Google Alerts: Vibe Coding DevOps"),
    ("https://www.google.com/alerts/feeds/11805205268710618137/6447382119890310773", "Google Alerts: Vibe Coding Security"),
    ("https://www.google.com/alerts/feeds/11805205268710618137/13093926530832902642", "Google Alerts: Vibe Coding DevSecOps"),
    ("https://www.google.com/alerts/feeds/11805205268710618137/17153509184522491480", "Google Alerts: OpenAI"),
    ("https://www.cursor.sh/blog/rss.xml", "Cursor Blog"),
    ("https://windsurf.com/blog/rss.xml", "Windsurf Blog"),
    ("https://latent.space/feed", "Latent Space (Substack)"),
    ("https://hnrss.org/newest?q=cursor+IDE&points=50", "Hacker News (Cursor IDE)"),
    ("https://hnrss.org/newest?q=AI+coding&points=50", "Hacker News (AI Coding)"),
    ("https://www.reddit.com/r/vibecoding/.rss", "Reddit /r/vibecoding"),
    ("https://github.com/search?q=vibe+coding&type=repositories&format=rss", "GitHub Search (Vibe Coding)"),
    ("https://hnrss.org/newest?q=github+copilot&points=50", "Hacker News (GitHub Copilot)"),
    ("https://www.reddit.com/search.rss?q=github+copilot&sort=hot", "Reddit Search (GitHub Copilot)"),
    ("https://github.blog/feed/", "GitHub Blog"),
    ("https://github-trending-api.now.sh/repositories?language=python&since=daily", "GitHub Trending (Python, daily)"),
    ("https://www.youtube.com/feeds/videos.xml?channel_id=UCtzS3R3_eB0JgE-hM8mX8XQ", "YouTube: Yannic Kilcher"),
    ("https://www.youtube.com/feeds/videos.xml?channel_id=UCuTaETsuCOh0P_XJg_i0wFQ", "YouTube: Two Minute Papers"),
    ("https://www.youtube.com/feeds/videos.xml?channel_id=UC6YI7W9_UuP5sF98d7_k5GA", "YouTube: OpenAI"),
    ("https://www.youtube.com/feeds/videos.xml?channel_id=UCP_r0x3Y8S_D_h_FmYqg4Gw", "YouTube: Latent Space Podcast"),
    ("https://www.producthunt.com/topics/artificial-intelligence.rss", "Product Hunt: AI"),
    ("https://www.reddit.com/r/MachineLearning/.rss", "Reddit: MachineLearning"),
    ("https://www.reddit.com/r/artificial/.rss", "Reddit: Artificial Intelligence"),
    ("https://www.reddit.com/r/programming/.rss", "Reddit: Programming"),
    ("https://openai.com/news/rss.xml", "OpenAI News"),
    ("https://www.anthropic.com/news/feed.xml", "Anthropic Blog"),
    ("https://ai.googleblog.com/feeds/posts/default", "Google AI Blog"),
    ("https://github.com/langchain-ai/langchain/releases.atom", "GitHub Releases: LangChain"),
    ("https://github.com/microsoft/autogen/releases.atom", "GitHub Releases: AutoGen"),
];

fn default_category() -> String {
    "General".to_string()
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub source_name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FeedSource {
    pub fn new(url: impl Into<String>, source_name: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            category: categorize_url(&url).to_string(),
            url,
            source_name: source_name.into(),
            enabled: true,
        }
    }
}

/// On-disk shape of an external catalog.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    feeds: Vec<serde_json::Value>,
}

/// The set of feeds a run polls.
#[derive(Debug, Clone)]
pub struct FeedCatalog {
    feeds: Vec<FeedSource>,
    origin: Option<PathBuf>,
}

impl FeedCatalog {
    pub fn builtin() -> Self {
        Self {
            feeds: BUILTIN_FEEDS
                .iter()
                .map(|(url, name)| FeedSource::new(*url, *name))
                .collect(),
            origin: None,
        }
    }

    pub fn from_sources(feeds: Vec<FeedSource>) -> Self {
        Self {
            feeds: feeds.into_iter().filter(|f| f.enabled).collect(),
            origin: None,
        }
    }

    /// Load the catalog from the first existing candidate file, falling back
    /// to the built-in feeds when there is none.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("VIBE_CONFIG_PATH").ok().map(PathBuf::from);
        match find_config_file(env_path.as_deref(), explicit_path) {
            Some(path) => Self::load_file(&path),
            None => {
                info!("No external feed configuration found, using built-in defaults");
                Ok(Self::builtin())
            }
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let feeds = parse_catalog(&content, path).map_err(|e| {
            error!("Failed to load feed configuration from {}: {}", path.display(), e);
            DigestError::Config(format!("Invalid configuration format in {}: {}", path.display(), e))
        })?;

        info!("Loaded {} enabled feeds from {}", feeds.len(), path.display());
        Ok(Self {
            feeds,
            origin: Some(path.to_path_buf()),
        })
    }

    pub fn feeds(&self) -> &[FeedSource] {
        &self.feeds
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn enabled_urls(&self) -> Vec<String> {
        self.feeds.iter().filter(|f| f.enabled).map(|f| f.url.clone()).collect()
    }

    /// Human-friendly name for a feed URL.
    pub fn source_name(&self, url: &str) -> &str {
        self.feeds
            .iter()
            .find(|f| f.url == url)
            .map(|f| f.source_name.as_str())
            .unwrap_or(UNKNOWN_SOURCE)
    }

    pub fn by_category(&self, category: &str) -> Vec<&FeedSource> {
        self.feeds
            .iter()
            .filter(|f| f.enabled && f.category == category)
            .collect()
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for feed in &self.feeds {
            if !categories.contains(&feed.category) {
                categories.push(feed.category.clone());
            }
        }
        categories
    }

    /// Write the built-in catalog to `path`, as YAML for `.yaml`/`.yml` and
    /// JSON otherwise.
    pub fn export_default(path: &Path) -> Result<()> {
        let catalog = Self::builtin();
        let rendered = if is_yaml(path) {
            serde_yaml::to_string(&serde_json::json!({ "feeds": catalog.feeds }))?
        } else {
            serde_json::to_string_pretty(&serde_json::json!({ "feeds": catalog.feeds }))?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, rendered)?;
        info!("Default configuration exported to {}", path.display());
        Ok(())
    }
}

fn find_config_file(env_path: Option<&Path>, explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = env_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }
    if let Some(path) = explicit_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("yaml") | Some("yml")
    )
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn parse_catalog(content: &str, path: &Path) -> Result<Vec<FeedSource>> {
    let document: serde_json::Value = if is_yaml(path) {
        serde_yaml::from_str(content)?
    } else if is_json(path) {
        serde_json::from_str(content)?
    } else {
        match serde_json::from_str(content) {
            Ok(value) => value,
            Err(_) => serde_yaml::from_str(content)?,
        }
    };

    validate_catalog(&document)?;

    let file: CatalogFile = serde_json::from_value(document)?;
    let mut feeds = Vec::with_capacity(file.feeds.len());
    for raw in file.feeds {
        let feed: FeedSource = serde_json::from_value(raw)?;
        if !is_valid_feed_url(&feed.url) {
            warn!("Skipping feed '{}' with invalid URL: {}", feed.source_name, feed.url);
            continue;
        }
        if feed.enabled {
            feeds.push(feed);
        }
    }
    Ok(feeds)
}

fn validate_catalog(document: &serde_json::Value) -> Result<()> {
    let object = document
        .as_object()
        .ok_or_else(|| DigestError::Config("Configuration must be a mapping".to_string()))?;

    let feeds = object
        .get("feeds")
        .ok_or_else(|| DigestError::Config("Configuration must contain 'feeds' key".to_string()))?
        .as_array()
        .ok_or_else(|| DigestError::Config("'feeds' must be a list".to_string()))?;

    for (i, feed) in feeds.iter().enumerate() {
        let feed = feed
            .as_object()
            .ok_or_else(|| DigestError::Config(format!("Feed {} must be a mapping", i)))?;

        for field in ["url", "source_name"] {
            match feed.get(field) {
                None => {
                    return Err(DigestError::Config(format!("Feed {} missing required field: {}", i, field)));
                }
                Some(value) => {
                    let valid = value.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false);
                    if !valid {
                        return Err(DigestError::Config(format!("Feed {} has invalid {}", i, field)));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Rough category of a feed, guessed from its URL.
pub fn categorize_url(url: &str) -> &'static str {
    let url = url.to_lowercase();
    let any = |terms: &[&str]| terms.iter().any(|t| url.contains(t));

    if any(&["openai", "anthropic", "ai", "machine", "artificial"]) {
        "AI"
    } else if any(&["github", "programming", "dev", "coding"]) {
        "DevTools"
    } else if url.contains("youtube") {
        "YouTube"
    } else if any(&["reddit", "hn", "hacker"]) {
        "Community"
    } else if url.contains("blog") {
        "Blogs"
    } else {
        "General"
    }
}
