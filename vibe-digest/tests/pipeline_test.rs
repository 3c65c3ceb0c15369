use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::{Arc, Once};
use vibe_digest::{
    AwsBlogSearch, DigestConfig, DigestError, DigestItem, DigestMailer, DigestPipeline, FeedCatalog,
    FeedCollector, FeedSource, FetchConfig, Fetcher, ItemSource, LlmErrorKind, MockLlmClient,
    SendGridMailer, SummarizationStrategy, Summarizer,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

fn fast_fetcher() -> Arc<Fetcher> {
    let config = FetchConfig {
        retry_initial_ms: 10,
        retry_max_ms: 20,
        min_host_interval_ms: 0,
        ..FetchConfig::default()
    };
    Arc::new(Fetcher::new(config).unwrap())
}

fn mailer(server: &MockServer) -> SendGridMailer {
    SendGridMailer::new(
        format!("{}/v3/mail/send", server.uri()),
        "SG.test",
        "digest@example.com",
        "reader@example.com",
        5,
    )
    .unwrap()
}

/// A source that always yields the same items.
struct StaticSource(Vec<DigestItem>);

#[async_trait]
impl ItemSource for StaticSource {
    fn source_name(&self) -> String {
        "static".to_string()
    }

    async fn collect(&self) -> vibe_digest::Result<Vec<DigestItem>> {
        Ok(self.0.clone())
    }
}

struct BrokenSource;

#[async_trait]
impl ItemSource for BrokenSource {
    fn source_name(&self) -> String {
        "broken".to_string()
    }

    async fn collect(&self) -> vibe_digest::Result<Vec<DigestItem>> {
        Err(DigestError::General("source exploded".to_string()))
    }
}

/// Mailer that must never be called.
struct NoMail;

#[async_trait]
impl DigestMailer for NoMail {
    async fn send(&self, _subject: &str, _html: &str) -> vibe_digest::Result<()> {
        panic!("dry run must not send email");
    }
}

fn item(title: &str, link: &str, source: &str, day: Option<u32>) -> DigestItem {
    DigestItem::new(title, link, format!("{} body", title), source, "https://example.com/feed")
        .with_published(day.map(|d| Utc.with_ymd_and_hms(2025, 10, d, 8, 0, 0).unwrap()))
}

#[tokio::test]
async fn test_email_payload_and_bearer_header() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(header("authorization", "Bearer SG.test"))
        .and(body_json(json!({
            "personalizations": [{"to": [{"email": "reader@example.com"}]}],
            "from": {"email": "digest@example.com"},
            "subject": "Subject line",
            "content": [{"type": "text/html", "value": "<h2>Digest</h2>"}]
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    mailer(&server).send("Subject line", "<h2>Digest</h2>").await.unwrap();
}

#[tokio::test]
async fn test_email_rejection_is_an_error() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("{\"errors\":[{\"message\":\"bad key\"}]}"))
        .mount(&server)
        .await;

    let result = mailer(&server).send("Subject", "<p>x</p>").await;
    match result {
        Err(DigestError::Email { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("bad key"));
        }
        other => panic!("expected email error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_end_to_end_digest_is_emailed() {
    init_tracing();
    let server = MockServer::start().await;

    let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Cursor</title><link>https://cursor.example</link><description>d</description>
<item><title>Cursor 2.0</title><link>https://cursor.example/2</link><description>Agents</description><pubDate>Mon, 13 Oct 2025 10:00:00 GMT</pubDate></item>
<item><title>Cursor tips</title><link>https://cursor.example/tips</link><description>Tips</description><pubDate>Tue, 14 Oct 2025 10:00:00 GMT</pubDate></item>
</channel></rss>"#;
    let aws = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>AWS News Blog</title><link>https://aws.example</link><description>d</description>
<item><title>Vibe coding on AWS</title><link>https://aws.example/vibe</link><description>Build faster</description><pubDate>Wed, 15 Oct 2025 10:00:00 GMT</pubDate></item>
<item><title>Storage prices drop</title><link>https://aws.example/s3</link><description>Cheaper</description></item>
</channel></rss>"#;

    Mock::given(method("GET"))
        .and(path("/cursor.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/aws/feed/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(aws))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fast_fetcher();
    let catalog = FeedCatalog::from_sources(vec![
        FeedSource::new(format!("{}/cursor.xml", server.uri()), "Cursor Blog"),
        FeedSource::new(format!("{}/broken.xml", server.uri()), "Broken Feed"),
    ]);

    let llm = Arc::new(MockLlmClient::new("e2e").replying("🛠️ tool: useful summary."));
    let summarizer = Arc::new(Summarizer::new(llm.clone(), DigestConfig::default()));

    let mut pipeline = DigestPipeline::new(summarizer, Box::new(mailer(&server)));
    pipeline.add_source(Box::new(FeedCollector::new(fetcher.clone(), catalog)));
    pipeline.add_source(Box::new(AwsBlogSearch::new(fetcher, format!("{}/aws/feed/", server.uri()))));
    pipeline.add_source(Box::new(BrokenSource));

    let now = Utc.with_ymd_and_hms(2025, 10, 16, 14, 30, 0).unwrap();
    let run = pipeline.run_at(now, false).await.unwrap();

    assert!(run.emailed);
    assert_eq!(run.collected, 3);
    assert_eq!(run.unique, 3);
    assert_eq!(llm.call_count(), 3);

    // Dated Cursor posts first, the undated AWS search hit last
    let order: Vec<&str> = run.sections.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(order, vec!["Cursor Blog", "AWS Blog"]);
    assert_eq!(run.sections.get("Cursor Blog").unwrap().summaries.len(), 2);

    assert_eq!(run.subject, "🧠 Daily Vibe Coding Digest – October 16, 2025 10:30 AM EDT");
    assert!(run.html.contains("<h3>AWS Blog</h3><ul><li>🛠️ tool: useful summary.</li></ul>"));
    assert!(run.markdown.contains("\n### Cursor Blog\n- 🛠️ tool: useful summary.\n- 🛠️ tool: useful summary.\n"));

    let sent = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/v3/mail/send")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&sent.body).unwrap();
    assert_eq!(body["subject"], run.subject.as_str());
    assert_eq!(body["content"][0]["value"], run.html.as_str());
}

#[tokio::test]
async fn test_dry_run_skips_email_and_dedupes() {
    init_tracing();
    let items = vec![
        item("Same story", "https://a.example/1", "Feed A", Some(2)),
        item("Same story", "https://a.example/1", "Feed B", Some(2)),
        item("Older", "https://a.example/0", "Feed A", Some(1)),
        item("Undated", "https://b.example/u", "Feed B", None),
    ];

    let llm = Arc::new(MockLlmClient::new("dry"));
    let summarizer = Arc::new(Summarizer::new(llm.clone(), DigestConfig::default()));
    let mut pipeline = DigestPipeline::new(summarizer, Box::new(NoMail));
    pipeline.add_source(Box::new(StaticSource(items)));

    let run = pipeline.run(true).await.unwrap();

    assert!(!run.emailed);
    assert_eq!(run.collected, 4);
    assert_eq!(run.unique, 3);
    assert_eq!(llm.call_count(), 3);
    assert_eq!(run.sections.get("Feed A").unwrap().summaries.len(), 2);
    assert_eq!(run.sections.get("Feed B").unwrap().summaries.len(), 1);
}

#[tokio::test]
async fn test_email_failure_fails_the_run() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let summarizer = Arc::new(Summarizer::new(Arc::new(MockLlmClient::new("x")), DigestConfig::default()));
    let mut pipeline = DigestPipeline::new(summarizer, Box::new(mailer(&server)));
    pipeline.add_source(Box::new(StaticSource(vec![item("Story", "https://a.example/1", "Feed", None)])));

    let result = pipeline.run(false).await;
    assert!(matches!(result, Err(DigestError::Email { status: 500, .. })));
}

#[tokio::test]
async fn test_max_items_caps_summaries() {
    init_tracing();
    let items: Vec<DigestItem> = (1..=6)
        .map(|d| item(&format!("Story {}", d), &format!("https://a.example/{}", d), "Feed", Some(d)))
        .collect();

    let config = DigestConfig {
        max_items: 4,
        ..DigestConfig::default()
    };
    let llm = Arc::new(MockLlmClient::new("cap"));
    let summarizer = Arc::new(Summarizer::new(llm.clone(), config));
    let mut pipeline = DigestPipeline::new(summarizer, Box::new(NoMail));
    pipeline.add_source(Box::new(StaticSource(items)));

    let run = pipeline.run(true).await.unwrap();
    assert_eq!(run.sections.total_summaries(), 4);
    assert_eq!(llm.call_count(), 4);
}

#[tokio::test]
async fn test_batch_strategy_uses_one_call_per_batch() {
    init_tracing();
    let items = vec![
        item("One", "https://a.example/1", "Feed A", Some(3)),
        item("Two", "https://a.example/2", "Feed A", Some(2)),
        item("Three", "https://a.example/3", "Feed A", Some(1)),
    ];

    let llm = Arc::new(MockLlmClient::new("batch").replying("SUMMARY 1: s1\nSUMMARY 2: s2\nSUMMARY 3: s3"));
    let summarizer = Arc::new(Summarizer::new(llm.clone(), DigestConfig::default()));
    let mut pipeline =
        DigestPipeline::new(summarizer, Box::new(NoMail)).with_strategy(SummarizationStrategy::Batch);
    pipeline.add_source(Box::new(StaticSource(items)));

    let run = pipeline.run(true).await.unwrap();
    assert_eq!(llm.call_count(), 1);
    assert_eq!(run.sections.get("Feed A").unwrap().summaries, vec!["s1", "s2", "s3"]);
}

#[tokio::test]
async fn test_failed_batch_call_falls_back_to_concurrent() {
    init_tracing();
    let items = vec![
        item("One", "https://a.example/1", "Feed A", Some(3)),
        item("Two", "https://a.example/2", "Feed A", Some(2)),
        item("Three", "https://b.example/3", "Feed B", Some(1)),
    ];

    let llm = Arc::new(
        MockLlmClient::new("batch-down")
            .with_script(vec![Err(LlmErrorKind::InvalidRequest)])
            .replying("single"),
    );
    let summarizer = Arc::new(Summarizer::new(llm.clone(), DigestConfig::default()));
    let mut pipeline =
        DigestPipeline::new(summarizer, Box::new(NoMail)).with_strategy(SummarizationStrategy::Batch);
    pipeline.add_source(Box::new(StaticSource(items)));

    let run = pipeline.run(true).await.unwrap();

    // One failed batch call, then one call per item
    assert_eq!(llm.call_count(), 4);
    assert_eq!(run.sections.total_summaries(), 3);
    assert_eq!(run.sections.get("Feed A").unwrap().summaries, vec!["single", "single"]);
    assert_eq!(run.sections.get("Feed B").unwrap().summaries, vec!["single"]);
}
