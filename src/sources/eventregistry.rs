//! [Event Registry](https://eventregistry.org) article search.
//!
//! Uses the `article/getArticles` endpoint with a keyword query, English
//! news only, newest first:
//!
//! ```text
//! GET {base}/article/getArticles?apiKey=..&keyword=..&lang=eng&articlesSortBy=date
//!     &articlesCount=N&resultType=articles&dataType=news
//! ```
//!
//! The response nests results under `articles.results`; each entry carries
//! `url`, `title`, `body` and an optional `dateTimePub` timestamp.

use super::ArticleSource;
use crate::api::{BackoffPolicy, HttpStatusError, with_backoff};
use crate::models::Article;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use tracing::{debug, info, instrument};

/// Event Registry caps `articlesCount` at 100 per page.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct ArticlesResponse {
    #[serde(default)]
    articles: Option<ArticlesPage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticlesPage {
    #[serde(default)]
    results: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default, rename = "dateTimePub")]
    date_time_pub: Option<String>,
    #[serde(default, rename = "dateTime")]
    date_time: Option<String>,
}

impl RawArticle {
    fn into_article(self) -> Option<Article> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return None;
        }
        let published_at = self
            .date_time_pub
            .as_deref()
            .or(self.date_time.as_deref())
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Some(Article {
            title: self.title.trim().to_string(),
            body: self.body,
            url,
            published_at,
        })
    }
}

/// Live article source backed by Event Registry.
pub struct EventRegistrySource {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    policy: BackoffPolicy,
}

impl EventRegistrySource {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, policy: BackoffPolicy) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            policy,
        }
    }

    async fn fetch_page(&self, query: &str, count: usize) -> Result<String, Box<dyn Error>> {
        let count = count.to_string();
        let resp = self
            .http
            .get(format!("{}/article/getArticles", self.base_url))
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("keyword", query),
                ("lang", "eng"),
                ("articlesSortBy", "date"),
                ("articlesCount", count.as_str()),
                ("resultType", "articles"),
                ("dataType", "news"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Box::new(HttpStatusError::from_response(resp).await));
        }
        Ok(resp.text().await?)
    }
}

impl fmt::Debug for EventRegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistrySource")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ArticleSource for EventRegistrySource {
    #[instrument(level = "info", skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Article>, Box<dyn Error>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let count = limit.min(MAX_PAGE_SIZE);
        let body = with_backoff(&self.policy, "eventregistry.getArticles", move || {
            self.fetch_page(query, count)
        })
        .await?;

        let articles = parse_articles(&body, limit)?;
        info!(count = articles.len(), "Fetched Event Registry articles");
        Ok(articles)
    }
}

/// Parse a `getArticles` response, dropping entries without a URL and
/// repeated URLs, keeping at most `limit` articles in response order.
fn parse_articles(body: &str, limit: usize) -> Result<Vec<Article>, Box<dyn Error>> {
    let parsed: ArticlesResponse = serde_json::from_str(body)?;
    if let Some(error) = parsed.error {
        return Err(format!("Event Registry error: {error}").into());
    }

    let raw = parsed.articles.map(|page| page.results).unwrap_or_default();
    debug!(raw = raw.len(), "Parsed Event Registry page");

    Ok(raw
        .into_iter()
        .filter_map(RawArticle::into_article)
        .unique_by(|a| a.url.clone())
        .take(limit)
        .collect())
}
