//! Data models shared by the pipeline stages.
//!
//! This module defines the values that flow between the collaborators:
//! - [`Article`]: a candidate story produced by an article source
//! - [`Summary`]: headline plus bullet points produced by a summarizer
//! - [`PostContent`]: the two messages handed to a publisher
//! - [`PostedRecord`]: a URL that must never be published again
//! - [`FetchedRecord`]: the persisted digest entry for every processed article
//! - [`RunResult`] / [`ArticleError`]: the outcome of one pipeline pass

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length, in characters, of a primary post message.
pub const MAX_POST_CHARS: usize = 280;

/// Number of bullet points a summary is expected to carry.
pub const BULLET_COUNT: usize = 3;

/// A candidate news article as returned by an article source.
///
/// The `url` is the identity of the article: dedup, posted state and the
/// digest log are all keyed by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// The article headline as published by the outlet.
    pub title: String,
    /// The article body text (may be a lede or excerpt).
    pub body: String,
    /// The canonical source URL.
    pub url: String,
    /// Publication time, when the source reports one.
    pub published_at: Option<DateTime<Utc>>,
}

/// Structured summary of an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub headline: String,
    pub bullets: Vec<String>,
}

/// Formatted post content ready for a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostContent {
    /// Headline and bullets, at most [`MAX_POST_CHARS`] characters.
    pub primary: String,
    /// The source URL, posted verbatim as a follow-up.
    pub secondary: String,
}

/// A URL that has been published, with the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostedRecord {
    pub url: String,
    pub posted_at: DateTime<Utc>,
}

/// Persisted record of a processed article, consumed by the digest builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedRecord {
    pub url: String,
    pub headline: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    /// Original article title, used as link text in digests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
}

impl FetchedRecord {
    /// Extract the domain name (before .com/.org/etc) from the record URL.
    /// For example: "https://www.reuters.com/markets/x" -> "reuters"
    pub fn source_tag(&self) -> Option<String> {
        source_tag(&self.url)
    }
}

/// A per-article failure collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleError {
    pub url: String,
    pub error: String,
}

/// Outcome of one pipeline pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Articles successfully handed to the publisher and recorded as posted.
    pub posted: usize,
    /// Articles skipped because their URL was already posted.
    pub skipped: usize,
    /// Failures in source order.
    pub errors: Vec<ArticleError>,
}

fn source_tag(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let parts: Vec<&str> = host.split('.').collect();
    // "lite.cnn.com" -> "cnn", "cnn.com" -> "cnn"
    if parts.len() >= 2 {
        Some(parts[parts.len() - 2].to_string())
    } else {
        None
    }
}
