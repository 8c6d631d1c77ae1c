//! Article sources.
//!
//! A source turns a topic query into candidate [`Article`]s. The live
//! adapter is [`eventregistry::EventRegistrySource`]; without credentials,
//! or when the live call fails, [`PlaceholderSource`] supplies one fixed
//! article so a dry run always has something to process.

pub mod eventregistry;

use crate::models::Article;
use eventregistry::EventRegistrySource;
use std::error::Error;
use tracing::{info, instrument, warn};

/// Anything that can search for articles on a topic.
pub trait ArticleSource {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Article>, Box<dyn Error>>;
}

/// The article source selected for this run.
#[derive(Debug)]
pub enum Source {
    EventRegistry(EventRegistrySource),
    Placeholder(PlaceholderSource),
}

impl ArticleSource for Source {
    #[instrument(level = "info", skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Article>, Box<dyn Error>> {
        match self {
            Source::EventRegistry(live) => match live.search(query, limit).await {
                Ok(articles) => Ok(articles),
                Err(e) => {
                    warn!(error = %e, "Event Registry unavailable; using placeholder article");
                    PlaceholderSource.search(query, limit).await
                }
            },
            Source::Placeholder(placeholder) => placeholder.search(query, limit).await,
        }
    }
}

/// Deterministic stand-in used when no live source is reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderSource;

impl PlaceholderSource {
    pub fn article() -> Article {
        Article {
            title: "Bitcoin miners eye energy market shifts".to_string(),
            body: "Analysts report miners adjusting strategies amid energy price volatility."
                .to_string(),
            url: "https://example.com/bitcoin-miners-energy".to_string(),
            published_at: None,
        }
    }
}

impl ArticleSource for PlaceholderSource {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<Article>, Box<dyn Error>> {
        info!("No live article source; returning placeholder article");
        Ok(std::iter::once(Self::article()).take(limit).collect())
    }
}
