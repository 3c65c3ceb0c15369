use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;
use vibe_digest::sources::ai_engineering::DEFAULT_AI_FEEDS;
use vibe_digest::{
    AiEngineeringSearch, AwsBlogSearch, Credentials, DigestConfig, DigestPipeline, FeedCatalog,
    FeedCollector, Fetcher, OpenAiClient, SendGridMailer, SummarizationStrategy, Summarizer,
};

/// Fetch AI-assisted development news, summarize it and email the digest.
#[derive(Parser)]
#[command(name = "vibe-digest")]
#[command(version)]
struct Cli {
    /// Print the digest instead of emailing it
    #[arg(long)]
    dry_run: bool,

    /// Feed catalog file (JSON or YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// batch, concurrent or sequential
    #[arg(long, default_value = "concurrent")]
    strategy: SummarizationStrategy,

    /// Also scan AI company feeds for AI-engineering topics
    #[arg(long)]
    ai_search: bool,

    /// Write the built-in feed catalog to this path and exit
    #[arg(long)]
    export_feeds: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_loaded = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = &env_loaded {
        info!("Loaded environment from {}", path.display());
    }

    let cli = Cli::parse();

    if let Some(path) = &cli.export_feeds {
        FeedCatalog::export_default(path)
            .with_context(|| format!("exporting feed catalog to {}", path.display()))?;
        return Ok(());
    }

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let config = DigestConfig::from_env().context("loading configuration")?;

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("digest_run", %run_id);
    run(cli, credentials, config).instrument(span).await
}

async fn run(cli: Cli, credentials: Credentials, config: DigestConfig) -> Result<()> {
    info!("Starting Vibe Coding Digest");

    let catalog = FeedCatalog::load(cli.config.as_deref()).context("loading feed catalog")?;
    let fetcher = Arc::new(Fetcher::new(config.fetch_config())?);

    let llm = OpenAiClient::new(
        config.openai_api_url.clone(),
        credentials.openai_api_key.clone(),
        config.openai_timeout,
    )?;
    let summarizer = Arc::new(Summarizer::new(Arc::new(llm), config.clone()));

    let mailer = SendGridMailer::new(
        config.sendgrid_api_url.clone(),
        credentials.sendgrid_api_key.clone(),
        credentials.email_from.clone(),
        credentials.email_to.clone(),
        config.email_timeout,
    )?;

    let mut pipeline = DigestPipeline::new(summarizer, Box::new(mailer)).with_strategy(cli.strategy);
    pipeline.add_source(Box::new(
        FeedCollector::new(fetcher.clone(), catalog)
            .with_max_workers(config.max_feed_workers)
            .with_items_per_feed(config.max_feed_items_per_source),
    ));
    pipeline.add_source(Box::new(AwsBlogSearch::new(
        fetcher.clone(),
        config.aws_blog_feed_url.clone(),
    )));
    if cli.ai_search {
        let feeds = DEFAULT_AI_FEEDS.iter().map(|f| f.to_string()).collect();
        pipeline.add_source(Box::new(AiEngineeringSearch::new(fetcher.clone(), feeds)));
    }

    let outcome = pipeline.run(cli.dry_run).await;
    match outcome {
        Ok(digest) => {
            info!(
                "Digest complete: {} sources, {} summaries from {} unique items{}",
                digest.sections.len(),
                digest.sections.total_summaries(),
                digest.unique,
                if digest.emailed { ", emailed" } else { "" }
            );
            Ok(())
        }
        Err(e) => {
            error!("Email send failed: {}", e);
            Err(e.into())
        }
    }
}
