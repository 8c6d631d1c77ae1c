//! Daily digest of recently fetched articles.
//!
//! The digest reads only the fetched-article history; posted state is never
//! consulted, so articles that failed to publish still appear. Output for a
//! window ending on day `D` (UTC) is written as
//!
//! ```text
//! output_dir/
//! ├── D-daily-brief.md
//! ├── D-daily-brief.json
//! ├── index.json
//! └── index.md
//! ```
//!
//! Re-running on the same day replaces that day's files and catalog entry.
//! An empty window writes nothing.

use crate::models::FetchedRecord;
use crate::outputs::{indexes, json, markdown};
use crate::state::{StateStore, window_start};
use crate::utils::ensure_writable_dir;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Articles fetched within `[window_start, window_end]`, in fetch order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Digest {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub articles: Vec<FetchedRecord>,
}

impl Digest {
    /// Collect the trailing `hours` of fetched records as of `now`.
    pub fn build(store: &StateStore, hours: u32, now: DateTime<Utc>) -> Self {
        Self {
            window_start: window_start(now, hours),
            window_end: now,
            articles: store.fetched_since(hours, now),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Catalog key: the UTC date the window ends on.
    pub fn date(&self) -> String {
        self.window_end.format("%Y-%m-%d").to_string()
    }

    pub fn title(&self) -> String {
        format!("Daily Brief — {}", self.date())
    }

    pub fn file_stem(&self) -> String {
        format!("{}-daily-brief", self.date())
    }

    /// Articles newest first, the order they are rendered in.
    pub fn newest_first(&self) -> Vec<&FetchedRecord> {
        let mut articles: Vec<&FetchedRecord> = self.articles.iter().collect();
        articles.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        articles
    }
}

/// Write the digest documents and refresh the catalog.
///
/// Returns the Markdown path, or `None` when the window was empty.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), articles = digest.articles.len()))]
pub async fn write(digest: &Digest, output_dir: &Path) -> Result<Option<PathBuf>, Box<dyn Error>> {
    if digest.is_empty() {
        info!("No articles in window; digest skipped");
        return Ok(None);
    }
    ensure_writable_dir(output_dir).await?;

    let md_path = markdown::write_digest(digest, output_dir).await?;
    let json_path = json::write_digest(digest, output_dir).await?;
    let catalog = indexes::update_index(output_dir, indexes::IndexEntry::for_digest(digest)).await?;
    indexes::write_index_markdown(output_dir, &catalog).await?;

    info!(
        markdown = %md_path.display(),
        json = %json_path.display(),
        catalog_entries = catalog.len(),
        "Digest written"
    );
    Ok(Some(md_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FetchedPolicy, State};
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn record(url: &str, fetched_at: DateTime<Utc>) -> FetchedRecord {
        FetchedRecord {
            url: url.to_string(),
            headline: format!("Headline {url}"),
            bullets: vec!["One".to_string(), "Two".to_string()],
            fetched_at,
            source_title: Some("Original title".to_string()),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap()
    }

    fn store_with(records: Vec<FetchedRecord>) -> StateStore {
        StateStore::from_state(
            "unused.json",
            State {
                fetched_articles: records,
                ..State::default()
            },
            FetchedPolicy::Append,
        )
    }

    #[test]
    fn test_build_uses_window() {
        let store = store_with(vec![
            record("https://a.example/old", now() - Duration::hours(25)),
            record("https://a.example/new", now() - Duration::hours(1)),
        ]);
        let digest = Digest::build(&store, 24, now());
        assert_eq!(digest.articles.len(), 1);
        assert_eq!(digest.articles[0].url, "https://a.example/new");
        assert_eq!(digest.window_start, now() - Duration::hours(24));
        assert_eq!(digest.date(), "2025-05-06");
    }

    #[test]
    fn test_build_with_huge_window_clamps() {
        let store = store_with(vec![record("https://a.example/1", now() - Duration::days(3))]);
        let digest = Digest::build(&store, u32::MAX, now());
        assert_eq!(digest.window_start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(digest.articles.len(), 1);
    }

    #[test]
    fn test_build_ignores_posted_state() {
        let mut store = store_with(vec![record("https://a.example/1", now())]);
        store.mark_posted("https://a.example/other", now());
        let digest = Digest::build(&store, 24, now());
        assert_eq!(digest.articles.len(), 1);
    }

    #[test]
    fn test_newest_first() {
        let store = store_with(vec![
            record("https://a.example/1", now() - Duration::hours(3)),
            record("https://a.example/2", now() - Duration::hours(1)),
        ]);
        let digest = Digest::build(&store, 24, now());
        let urls: Vec<&str> = digest.newest_first().iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/2", "https://a.example/1"]);
    }

    #[tokio::test]
    async fn test_empty_window_writes_nothing() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("digests");
        let digest = Digest::build(&store_with(vec![]), 24, now());

        assert_eq!(write(&digest, &out).await.unwrap(), None);
        assert!(!out.join("index.json").exists());
    }

    #[tokio::test]
    async fn test_write_creates_all_files() {
        let dir = tempdir().unwrap();
        let digest = Digest::build(
            &store_with(vec![record("https://www.reuters.com/a", now())]),
            24,
            now(),
        );

        let md_path = write(&digest, dir.path()).await.unwrap().unwrap();
        assert_eq!(md_path, dir.path().join("2025-05-06-daily-brief.md"));
        assert!(dir.path().join("2025-05-06-daily-brief.json").exists());
        assert!(dir.path().join("index.json").exists());
        assert!(dir.path().join("index.md").exists());

        let md = std::fs::read_to_string(md_path).unwrap();
        assert!(md.contains("Headline https://www.reuters.com/a"));
    }

    #[tokio::test]
    async fn test_same_day_rerun_overwrites() {
        let dir = tempdir().unwrap();
        let first = Digest::build(
            &store_with(vec![record("https://a.example/1", now())]),
            24,
            now(),
        );
        write(&first, dir.path()).await.unwrap();

        let later = now() + Duration::hours(2);
        let second = Digest::build(
            &store_with(vec![
                record("https://a.example/1", now()),
                record("https://a.example/2", later),
            ]),
            24,
            later,
        );
        write(&second, dir.path()).await.unwrap();

        let catalog = indexes::read_index(dir.path()).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].article_count, 2);

        let md = std::fs::read_to_string(dir.path().join("2025-05-06-daily-brief.md")).unwrap();
        assert!(md.contains("https://a.example/2"));
    }
}
