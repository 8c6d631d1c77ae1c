//! Command-line interface definitions for News Relay.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! All arguments can be provided via command-line flags or environment variables.

use crate::state::FetchedPolicy;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for the News Relay application.
///
/// # Examples
///
/// ```sh
/// # Post up to five new articles, printing instead of posting
/// news_relay run --query "bitcoin mining" --limit 5 --dry-run
///
/// # Build the daily digest for the last 24 hours
/// news_relay digest --hours 24 --output-dir docs/digests
///
/// # Treat URLs as already posted after an external desync
/// POSTED_URL_OVERRIDES=https://a.example/1,https://b.example/2 news_relay run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the JSON state file
    #[arg(long, env = "STATE_FILE", default_value = ".state/state.json", global = true)]
    pub state_file: PathBuf,

    /// Comma-separated URLs to treat as already posted
    #[arg(long, env = "POSTED_URL_OVERRIDES", value_delimiter = ',', global = true)]
    pub posted_overrides: Vec<String>,

    /// How repeated fetches of the same URL are logged for digests
    #[arg(long, env = "FETCHED_POLICY", value_enum, default_value_t = FetchedPolicy::Append, global = true)]
    pub fetched_policy: FetchedPolicy,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "NEWS_RELAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Plain, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch, summarize and publish new articles
    Run(RunArgs),
    /// Render the digest of recently fetched articles
    Digest(DigestArgs),
    /// List the most recently posted URLs
    ShowPosted(ShowPostedArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Topic query sent to the article source
    #[arg(short, long, env = "TOPIC_QUERY", default_value = "bitcoin mining")]
    pub query: String,

    /// Maximum number of articles processed per run
    #[arg(short, long, env = "ARTICLES_LIMIT", default_value_t = 5)]
    pub limit: usize,

    /// Print posts instead of publishing them
    #[arg(long, env = "DRY_RUN", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub dry_run: bool,

    /// Always use the local summarizer, even when an LLM is configured
    #[arg(long, env = "SKIP_SUMMARIZER", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub skip_summarizer: bool,

    /// Event Registry API key; without it a placeholder article is used
    #[arg(long, env = "EVENTREGISTRY_API_KEY", hide_env_values = true)]
    pub eventregistry_api_key: Option<String>,

    /// API key for the OpenAI-compatible summarizer endpoint
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long, env = "LLM_API_BASE")]
    pub llm_api_base: Option<String>,

    /// Model name for summarization
    #[arg(long, env = "LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Model requests allowed per UTC day; caps the batch size
    #[arg(long, env = "LLM_DAILY_BUDGET")]
    pub llm_daily_budget: Option<u32>,

    /// User-context bearer token for the X API
    #[arg(long, env = "X_BEARER_TOKEN", hide_env_values = true)]
    pub x_bearer_token: Option<String>,
}

#[derive(Args, Debug)]
pub struct DigestArgs {
    /// Trailing window, in hours, of fetched articles to include
    #[arg(long, env = "DIGEST_HOURS", default_value_t = 24)]
    pub hours: u32,

    /// Directory receiving digest documents and the index
    #[arg(short, long, env = "DIGEST_DIR", default_value = "docs/digests")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ShowPostedArgs {
    /// Number of entries to list
    #[arg(short = 'n', long, default_value_t = 20)]
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}
