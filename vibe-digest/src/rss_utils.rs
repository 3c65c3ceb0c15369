/// Feed-specific helper functions

/// URL utilities for feeds and article links
pub mod url {
    use url::Url;

    /// Extract domain from URL
    pub fn extract_domain(url_str: &str) -> Option<String> {
        Url::parse(url_str)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.to_string()))
    }

    /// Key used to group requests to the same host. Unparsable URLs share
    /// one bucket.
    pub fn host_key(url_str: &str) -> String {
        extract_domain(url_str).unwrap_or_default()
    }

    /// Validate feed URL format
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        if let Ok(url) = Url::parse(url_str) {
            (url.scheme() == "http" || url.scheme() == "https") && url.host_str().is_some()
        } else {
            false
        }
    }
}

/// Text utilities shared by the parser and the summarizer
pub mod text {
    /// First `max_chars` characters of `text`, never splitting a character.
    pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extraction() {
        assert_eq!(url::extract_domain("https://aws.amazon.com/blogs/aws/feed/"), Some("aws.amazon.com".to_string()));
        assert_eq!(url::extract_domain("http://127.0.0.1:8080/feed"), Some("127.0.0.1".to_string()));
        assert_eq!(url::extract_domain("URL 1"), None);
        assert_eq!(url::host_key("not a url"), "");
    }

    #[test]
    fn feed_url_validation() {
        assert!(url::is_valid_feed_url("https://example.com/feed.xml"));
        assert!(url::is_valid_feed_url("http://example.com/rss"));
        assert!(!url::is_valid_feed_url("ftp://example.com/feed"));
        assert!(!url::is_valid_feed_url("invalid-url"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(text::truncate_chars("hello", 10), "hello");
        assert_eq!(text::truncate_chars("hello", 2), "he");
        assert_eq!(text::truncate_chars("🧠🧠🧠", 2), "🧠🧠");
    }
}
