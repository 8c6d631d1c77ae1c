//! # News Relay
//!
//! A scheduled news pipeline that fetches articles on a topic, summarizes
//! each one into a headline and three bullets, posts the result to X, and
//! keeps a rolling history for a daily Markdown/JSON digest.
//!
//! ## Features
//!
//! - Searches Event Registry for recent articles, with a deterministic
//!   placeholder when no API key is configured
//! - Summarizes through an OpenAI-compatible chat API, falling back to a
//!   local title-plus-sentences summary
//! - Posts a ≤280 character message with the source URL as a threaded reply
//! - Never posts the same URL twice, across runs and crashes
//! - Builds a daily digest from the last N hours of fetched articles
//!
//! ## Usage
//!
//! ```sh
//! news_relay run --query "bitcoin mining" --limit 5 --dry-run
//! news_relay digest --hours 24 --output-dir docs/digests
//! news_relay show-posted -n 10
//! ```
//!
//! ## Architecture
//!
//! Each invocation performs one pass and exits; scheduling is external.
//! 1. **Load**: read the state file and merge operator overrides
//! 2. **Fetch**: ask the article source for up to `limit` candidates
//! 3. **Process**: summarize, format and publish each new article in order
//! 4. **Record**: persist posted URLs and the fetched-article history

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

mod api;
mod cli;
mod config;
mod digest;
mod formatter;
mod models;
mod outputs;
mod pipeline;
mod publish;
mod sources;
mod state;
mod summarizer;
mod utils;

use api::{ChatClient, RetryAsk, http_client};
use cli::{Cli, Command, DigestArgs, LogFormat, RunArgs, ShowPostedArgs};
use config::Settings;
use digest::Digest;
use pipeline::Orchestrator;
use publish::{DryRunPublisher, Publisher, XPublisher};
use sources::eventregistry::EventRegistrySource;
use sources::{PlaceholderSource, Source};
use state::StateStore;
use summarizer::{LlmSummarizer, LocalSummarizer, SYSTEM_PROMPT, Summarizer};

const DEFAULT_TEMPERATURE: f32 = 0.4;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339());

    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // a missing .env file is the normal case in CI
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "Loaded .env file");
    }

    let start_time = Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "news_relay starting up");

    match &cli.command {
        Command::Run(args) => run(&cli, args).await?,
        Command::Digest(args) => build_digest(&cli, args).await?,
        Command::ShowPosted(args) => show_posted(&cli, args).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

#[instrument(level = "info", skip_all, fields(query = %args.query, limit = args.limit))]
async fn run(cli: &Cli, args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply_run_args(args);

    let http = http_client(settings.http.timeout())?;
    let policy = settings.http.backoff();

    let source = match settings.eventregistry.api_key.as_deref() {
        Some(key) => Source::EventRegistry(EventRegistrySource::new(
            http.clone(),
            settings.eventregistry_base(),
            key,
            policy,
        )),
        None => {
            info!("EVENTREGISTRY_API_KEY not set; using placeholder source");
            Source::Placeholder(PlaceholderSource)
        }
    };

    let summarizer = match settings.llm.api_key.as_deref() {
        Some(_) if args.skip_summarizer => {
            info!("Summarizer skipped by flag; using local summaries");
            Summarizer::Local(LocalSummarizer)
        }
        Some(key) => {
            let client = ChatClient::new(
                http.clone(),
                settings.llm_api_base(),
                key,
                settings.llm_model(),
                SYSTEM_PROMPT,
            )
            .with_sampling(
                settings.llm.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                settings.llm.max_tokens,
            );
            info!(model = settings.llm_model(), "Using LLM summarizer");
            Summarizer::Llm(LlmSummarizer::new(RetryAsk::new(client, policy)))
        }
        None => {
            info!("LLM_API_KEY not set; using local summaries");
            Summarizer::Local(LocalSummarizer)
        }
    };

    let publisher = match settings.x.bearer_token.as_deref() {
        Some(_) if args.dry_run => Publisher::DryRun(DryRunPublisher),
        Some(token) => Publisher::X(XPublisher::new(
            http.clone(),
            settings.x_api_base(),
            token,
            policy,
        )),
        None => {
            if !args.dry_run {
                warn!("X_BEARER_TOKEN not set; falling back to dry run");
            }
            Publisher::DryRun(DryRunPublisher)
        }
    };

    let mut store =
        StateStore::load(&cli.state_file, &cli.posted_overrides, cli.fetched_policy).await?;
    let orchestrator = Orchestrator::new(source, summarizer, publisher)
        .with_llm_daily_budget(settings.llm.daily_budget);
    let result = orchestrator.run(&mut store, &args.query, args.limit).await?;

    println!(
        "posted={} skipped={} errors={}",
        result.posted,
        result.skipped,
        result.errors.len()
    );
    for err in &result.errors {
        println!("  error {}: {}", err.url, err.error);
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(hours = args.hours))]
async fn build_digest(cli: &Cli, args: &DigestArgs) -> Result<(), Box<dyn Error>> {
    let store = StateStore::load(&cli.state_file, &[], cli.fetched_policy).await?;
    let digest = Digest::build(&store, args.hours, Utc::now());

    match digest::write(&digest, &args.output_dir).await? {
        Some(path) => println!(
            "digest: {} ({} articles)",
            path.display(),
            digest.articles.len()
        ),
        None => println!("digest: no articles in the last {} hours", args.hours),
    }
    Ok(())
}

async fn show_posted(cli: &Cli, args: &ShowPostedArgs) -> Result<(), Box<dyn Error>> {
    let store = StateStore::load(&cli.state_file, &[], cli.fetched_policy).await?;
    let recent = store.posted_recent(args.count);
    if recent.is_empty() {
        println!("no posted URLs recorded in {}", store.path().display());
    }
    for record in recent {
        println!("{}  {}", record.posted_at.to_rfc3339(), record.url);
    }
    Ok(())
}
