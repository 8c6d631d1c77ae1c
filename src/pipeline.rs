//! The per-run pipeline: fetch, summarize, format, publish, record.
//!
//! [`Orchestrator::run`] walks the articles returned by the source in order.
//! Already-posted URLs are skipped, every other article is summarized (falling
//! back to [`local_summary`]), logged to the fetched-article history and then
//! handed to the publisher. A successful publish is written to the state file
//! before the next article is touched, so a crash mid-batch can never cause a
//! repost.
//!
//! Per-article failures are collected into [`RunResult::errors`]; only state
//! file I/O aborts a run.
//!
//! With a metered summarizer, model summaries are cached in the state file by
//! URL and reused on later runs. An optional daily request budget caps the
//! batch to the requests left today (at least one article) and switches to
//! local summaries once it is spent.

use crate::formatter::{compose, sanitize};
use crate::models::{Article, ArticleError, FetchedRecord, RunResult, Summary};
use crate::publish::Publish;
use crate::sources::ArticleSource;
use crate::state::{StateError, StateStore};
use crate::summarizer::{Summarize, local_summary};
use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

/// Drives one pipeline pass over the configured collaborators.
#[derive(Debug)]
pub struct Orchestrator<S, M, P> {
    source: S,
    summarizer: M,
    publisher: P,
    llm_daily_budget: Option<u32>,
}

impl<S, M, P> Orchestrator<S, M, P>
where
    S: ArticleSource,
    M: Summarize,
    P: Publish,
{
    pub fn new(source: S, summarizer: M, publisher: P) -> Self {
        Self {
            source,
            summarizer,
            publisher,
            llm_daily_budget: None,
        }
    }

    /// Cap metered summarizer requests per UTC day.
    pub fn with_llm_daily_budget(mut self, budget: Option<u32>) -> Self {
        self.llm_daily_budget = budget;
        self
    }

    /// Process up to `limit` articles for `query`, recording outcomes in `store`.
    #[instrument(level = "info", skip(self, store))]
    pub async fn run(
        &self,
        store: &mut StateStore,
        query: &str,
        limit: usize,
    ) -> Result<RunResult, StateError> {
        let limit = self.batch_limit(store, limit, Utc::now());
        let mut articles = match self.source.search(query, limit).await {
            Ok(articles) => articles,
            Err(e) => {
                error!(error = %e, "Article source failed; nothing to process");
                Vec::new()
            }
        };
        if articles.len() > limit {
            warn!(returned = articles.len(), limit, "Source exceeded limit; truncating");
            articles.truncate(limit);
        }
        info!(count = articles.len(), "Articles to process");

        let mut result = RunResult::default();
        for article in &articles {
            if store.is_posted(&article.url) {
                info!(url = %article.url, "Already posted; skipping");
                result.skipped += 1;
                continue;
            }

            if !is_publishable_url(&article.url) {
                warn!(url = %article.url, "Malformed article URL");
                result.errors.push(ArticleError {
                    url: article.url.clone(),
                    error: "malformed URL: expected an absolute http(s) URL".to_string(),
                });
                continue;
            }

            let summary = sanitize(&self.summarize(store, article, Utc::now()).await);
            store.save_fetched(FetchedRecord {
                url: article.url.clone(),
                headline: summary.headline.clone(),
                bullets: summary.bullets.clone(),
                fetched_at: Utc::now(),
                source_title: Some(article.title.trim().to_string()).filter(|t| !t.is_empty()),
            });

            let content = compose(&summary, &article.url);
            match self.publisher.publish(&content).await {
                Ok(published) => {
                    store.mark_posted(&article.url, Utc::now());
                    store.save().await?;
                    result.posted += 1;
                    info!(
                        url = %article.url,
                        primary_id = ?published.primary_id,
                        reply_id = ?published.reply_id,
                        "Posted article"
                    );
                }
                Err(e) => {
                    error!(url = %article.url, error = %e, "Publish failed; article stays unposted");
                    result.errors.push(ArticleError {
                        url: article.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        store.save().await?;
        info!(
            posted = result.posted,
            skipped = result.skipped,
            errors = result.errors.len(),
            "Run complete"
        );
        Ok(result)
    }

    /// `limit`, reduced to the model requests left today when a budget applies.
    fn batch_limit(&self, store: &StateStore, limit: usize, now: DateTime<Utc>) -> usize {
        let Some(budget) = self.llm_daily_budget.filter(|_| self.summarizer.is_metered()) else {
            return limit;
        };
        let remaining = budget.saturating_sub(store.llm_requests_on(now)) as usize;
        let capped = limit.min(remaining.max(1));
        if capped < limit {
            info!(budget, remaining, limit, capped, "Batch capped by daily LLM budget");
        }
        capped
    }

    async fn summarize(
        &self,
        store: &mut StateStore,
        article: &Article,
        now: DateTime<Utc>,
    ) -> Summary {
        if self.summarizer.is_metered() {
            if let Some(cached) = store.cached_summary(&article.url, now) {
                info!(url = %article.url, "Using cached summary");
                return cached;
            }
            if let Some(budget) = self.llm_daily_budget {
                if store.llm_requests_on(now) >= budget {
                    warn!(url = %article.url, budget, "Daily LLM budget spent; using local summary");
                    return local_summary(article);
                }
            }
        }

        match self.summarizer.summarize(article).await {
            Ok(summary) => {
                if self.summarizer.is_metered() {
                    store.record_llm_request(now);
                    store.cache_summary(&article.url, &summary, now);
                }
                summary
            }
            Err(e) => {
                warn!(url = %article.url, error = %e, "Summarizer failed; using local summary");
                local_summary(article)
            }
        }
    }
}

fn is_publishable_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
