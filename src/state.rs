//! Persistent pipeline state: posted URLs and the rolling fetched-article log.
//!
//! The state lives in a single JSON document:
//!
//! ```text
//! {
//!   "posted": { "https://example.com/a": "2025-05-06T10:00:00Z" },
//!   "fetched_articles": [
//!     { "url": "...", "headline": "...", "bullets": ["..."], "fetched_at": "..." }
//!   ],
//!   "summary_cache": [
//!     { "url": "...", "headline": "...", "bullets": ["..."], "cached_at": "..." }
//!   ],
//!   "llm_usage": { "date": "2025-05-06", "requests": 12 }
//! }
//! ```
//!
//! A [`StateStore`] is loaded once per run, mutated in memory and written
//! back with [`write_atomic`], so an interrupted run leaves the previous
//! document intact. Posted URLs are kept forever; fetched records older than
//! [`RETENTION_HOURS`] and cached summaries older than [`SUMMARY_CACHE_HOURS`]
//! are dropped on save. The LLM request counter resets each UTC day.

use crate::models::{FetchedRecord, PostedRecord, Summary};
use crate::utils::write_atomic;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

/// How long fetched records are retained for digests.
pub const RETENTION_HOURS: i64 = 7 * 24;

/// How long a model summary is reused for the same URL.
pub const SUMMARY_CACHE_HOURS: i64 = 72;

const SUMMARY_CACHE_MAX_ENTRIES: usize = 2000;

/// Failures reading or writing the state document. Always fatal for a run.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("state file {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write state file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Handling of a second fetched record for a URL already in the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FetchedPolicy {
    /// Keep every record, one per fetch.
    #[default]
    Append,
    /// Replace the earlier record for the same URL.
    KeepLatest,
}

/// The serialized state document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub posted: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub fetched_articles: Vec<FetchedRecord>,
    #[serde(default)]
    pub summary_cache: Vec<CachedSummary>,
    #[serde(default)]
    pub llm_usage: LlmUsage,
}

/// A model summary kept so a retried article does not cost another request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSummary {
    pub url: String,
    pub headline: String,
    pub bullets: Vec<String>,
    pub cached_at: DateTime<Utc>,
}

/// LLM requests made on one UTC day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub date: Option<NaiveDate>,
    pub requests: u32,
}

/// Loaded state bound to its file path for the duration of a run.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: State,
    policy: FetchedPolicy,
}

impl StateStore {
    /// Load the state document at `path`, merging operator overrides.
    ///
    /// A missing file yields empty state. Every URL in `overrides` is treated
    /// as already posted; URLs already present keep their original timestamp.
    #[instrument(level = "info", skip(path, overrides), fields(path = %path.as_ref().display()))]
    pub async fn load(
        path: impl AsRef<Path>,
        overrides: &[String],
        policy: FetchedPolicy,
    ) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();

        let state = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => State::default(),
            Ok(raw) => serde_json::from_str::<State>(&raw).map_err(|source| StateError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No state file yet; starting empty");
                State::default()
            }
            Err(source) => return Err(StateError::Read { path, source }),
        };

        let mut store = Self {
            path,
            state,
            policy,
        };

        let merged = store.merge_overrides(overrides, Utc::now());
        info!(
            posted = store.state.posted.len(),
            fetched = store.state.fetched_articles.len(),
            overrides_merged = merged,
            "Loaded state"
        );
        Ok(store)
    }

    #[cfg(test)]
    pub fn from_state(path: impl Into<PathBuf>, state: State, policy: FetchedPolicy) -> Self {
        Self {
            path: path.into(),
            state,
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Prune expired fetched records and atomically rewrite the state file.
    pub async fn save(&mut self) -> Result<(), StateError> {
        self.save_at(Utc::now()).await
    }

    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub async fn save_at(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        let pruned = self.prune(now);
        let json = serde_json::to_vec_pretty(&self.state).map_err(StateError::Serialize)?;
        write_atomic(&self.path, &json)
            .await
            .map_err(|source| StateError::Write {
                path: self.path.clone(),
                source,
            })?;
        info!(
            posted = self.state.posted.len(),
            fetched = self.state.fetched_articles.len(),
            pruned,
            "Saved state"
        );
        Ok(())
    }

    /// Drop fetched records and cached summaries past their retention windows.
    /// Returns how many entries were dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(RETENTION_HOURS);
        let cache_cutoff = now - Duration::hours(SUMMARY_CACHE_HOURS);
        let before = self.state.fetched_articles.len() + self.state.summary_cache.len();
        self.state
            .fetched_articles
            .retain(|record| record.fetched_at >= cutoff);
        self.state
            .summary_cache
            .retain(|entry| entry.cached_at >= cache_cutoff);
        before - self.state.fetched_articles.len() - self.state.summary_cache.len()
    }

    pub fn is_posted(&self, url: &str) -> bool {
        self.state.posted.contains_key(url)
    }

    /// Record `url` as published. The first recorded timestamp wins.
    pub fn mark_posted(&mut self, url: &str, at: DateTime<Utc>) {
        self.state.posted.entry(url.to_string()).or_insert(at);
    }

    /// Append a fetched record, honoring the configured [`FetchedPolicy`].
    pub fn save_fetched(&mut self, record: FetchedRecord) {
        if self.policy == FetchedPolicy::KeepLatest {
            self.state
                .fetched_articles
                .retain(|existing| existing.url != record.url);
        }
        debug!(url = %record.url, policy = ?self.policy, "Recorded fetched article");
        self.state.fetched_articles.push(record);
    }

    /// Fetched records with `fetched_at` in `[now - hours, now]`, in append order.
    pub fn fetched_since(&self, hours: u32, now: DateTime<Utc>) -> Vec<FetchedRecord> {
        let start = window_start(now, hours);
        self.state
            .fetched_articles
            .iter()
            .filter(|record| record.fetched_at >= start && record.fetched_at <= now)
            .cloned()
            .collect()
    }

    /// The model summary cached for `url`, if it is younger than [`SUMMARY_CACHE_HOURS`].
    pub fn cached_summary(&self, url: &str, now: DateTime<Utc>) -> Option<Summary> {
        let cutoff = now - Duration::hours(SUMMARY_CACHE_HOURS);
        self.state
            .summary_cache
            .iter()
            .rev()
            .find(|entry| entry.url == url && entry.cached_at >= cutoff)
            .map(|entry| Summary {
                headline: entry.headline.clone(),
                bullets: entry.bullets.clone(),
            })
    }

    /// Cache `summary` for `url`, replacing any earlier entry.
    pub fn cache_summary(&mut self, url: &str, summary: &Summary, now: DateTime<Utc>) {
        let cache = &mut self.state.summary_cache;
        cache.retain(|entry| entry.url != url);
        cache.push(CachedSummary {
            url: url.to_string(),
            headline: summary.headline.clone(),
            bullets: summary.bullets.clone(),
            cached_at: now,
        });
        if cache.len() > SUMMARY_CACHE_MAX_ENTRIES {
            let excess = cache.len() - SUMMARY_CACHE_MAX_ENTRIES;
            cache.drain(..excess);
        }
    }

    /// LLM requests recorded on the UTC day of `now`.
    pub fn llm_requests_on(&self, now: DateTime<Utc>) -> u32 {
        let usage = &self.state.llm_usage;
        if usage.date == Some(now.date_naive()) {
            usage.requests
        } else {
            0
        }
    }

    /// Count one LLM request against the UTC day of `now`.
    pub fn record_llm_request(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        let usage = &mut self.state.llm_usage;
        if usage.date != Some(today) {
            *usage = LlmUsage {
                date: Some(today),
                requests: 0,
            };
        }
        usage.requests += 1;
    }

    /// The `count` most recently posted URLs, newest first.
    pub fn posted_recent(&self, count: usize) -> Vec<PostedRecord> {
        let mut records: Vec<PostedRecord> = self
            .state
            .posted
            .iter()
            .map(|(url, at)| PostedRecord {
                url: url.clone(),
                posted_at: *at,
            })
            .collect();
        records.sort_by(|a, b| b.posted_at.cmp(&a.posted_at).then_with(|| a.url.cmp(&b.url)));
        records.truncate(count);
        records
    }

    fn merge_overrides(&mut self, overrides: &[String], now: DateTime<Utc>) -> usize {
        let mut merged = 0;
        for url in overrides.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            if !self.state.posted.contains_key(url) {
                self.state.posted.insert(url.to_string(), now);
                merged += 1;
            }
        }
        merged
    }
}

/// `now - hours`, clamped to the earliest representable instant.
pub fn window_start(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    Duration::try_hours(i64::from(hours))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(url: &str, fetched_at: DateTime<Utc>) -> FetchedRecord {
        FetchedRecord {
            url: url.to_string(),
            headline: format!("Headline for {url}"),
            bullets: vec!["One".to_string(), "Two".to_string()],
            fetched_at,
            source_title: None,
        }
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json"), &[], FetchedPolicy::Append)
            .await
            .unwrap();
        assert!(store.state().posted.is_empty());
        assert!(store.state().fetched_articles.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = StateStore::load(&path, &[], FetchedPolicy::Append)
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_posted_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::load(&path, &[], FetchedPolicy::Append).await.unwrap();
        store.mark_posted("https://example.com/a", Utc::now());
        store.save().await.unwrap();

        let reloaded = StateStore::load(&path, &[], FetchedPolicy::Append).await.unwrap();
        assert!(reloaded.is_posted("https://example.com/a"));
        assert!(!reloaded.is_posted("https://example.com/b"));
    }

    #[test]
    fn test_mark_posted_keeps_first_timestamp() {
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        let first = Utc::now() - Duration::hours(5);
        store.mark_posted("https://example.com/a", first);
        store.mark_posted("https://example.com/a", Utc::now());

        assert_eq!(store.state().posted.len(), 1);
        assert_eq!(store.state().posted["https://example.com/a"], first);
    }

    #[tokio::test]
    async fn test_overrides_merged_at_load() {
        let dir = tempdir().unwrap();
        let overrides = vec![
            "https://example.com/a".to_string(),
            " https://example.com/b ".to_string(),
            "".to_string(),
        ];
        let store = StateStore::load(dir.path().join("state.json"), &overrides, FetchedPolicy::Append)
            .await
            .unwrap();

        assert!(store.is_posted("https://example.com/a"));
        assert!(store.is_posted("https://example.com/b"));
        assert_eq!(store.state().posted.len(), 2);
    }

    #[tokio::test]
    async fn test_overrides_keep_existing_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let original = Utc::now() - Duration::days(30);

        let mut store = StateStore::load(&path, &[], FetchedPolicy::Append).await.unwrap();
        store.mark_posted("https://example.com/a", original);
        store.save().await.unwrap();

        let store = StateStore::load(&path, &["https://example.com/a".to_string()], FetchedPolicy::Append)
            .await
            .unwrap();
        assert_eq!(store.state().posted["https://example.com/a"], original);
    }

    #[test]
    fn test_fetched_since_window() {
        let now = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        store.save_fetched(record("https://example.com/200h", now - Duration::hours(200)));
        store.save_fetched(record("https://example.com/25h", now - Duration::hours(25)));
        store.save_fetched(record("https://example.com/1h", now - Duration::hours(1)));

        let recent = store.fetched_since(24, now);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].url, "https://example.com/1h");
    }

    #[test]
    fn test_fetched_since_huge_window_does_not_overflow() {
        let now = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        store.save_fetched(record("https://example.com/old", now - Duration::days(6)));

        assert_eq!(store.fetched_since(u32::MAX, now).len(), 1);
        assert_eq!(window_start(now, u32::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_fetched_since_excludes_future_records() {
        let now = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        store.save_fetched(record("https://example.com/future", now + Duration::hours(2)));
        store.save_fetched(record("https://example.com/edge", now - Duration::hours(24)));

        let recent = store.fetched_since(24, now);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].url, "https://example.com/edge");
    }

    #[test]
    fn test_fetched_since_preserves_append_order() {
        let now = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        store.save_fetched(record("https://example.com/a", now - Duration::hours(3)));
        store.save_fetched(record("https://example.com/b", now - Duration::hours(2)));

        let urls: Vec<String> = store
            .fetched_since(24, now)
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[tokio::test]
    async fn test_retention_drops_old_records_on_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let now = Utc::now();

        let mut store = StateStore::load(&path, &[], FetchedPolicy::Append).await.unwrap();
        store.save_fetched(record("https://example.com/old", now - Duration::days(8)));
        store.save_fetched(record("https://example.com/new", now - Duration::hours(2)));
        store.save().await.unwrap();

        let reloaded = StateStore::load(&path, &[], FetchedPolicy::Append).await.unwrap();
        let kept = reloaded.fetched_since(168, now);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://example.com/new");
        assert_eq!(reloaded.state().fetched_articles.len(), 1);
    }

    #[test]
    fn test_append_policy_keeps_duplicates() {
        let now = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        store.save_fetched(record("https://example.com/a", now - Duration::hours(2)));
        store.save_fetched(record("https://example.com/a", now - Duration::hours(1)));
        assert_eq!(store.fetched_since(24, now).len(), 2);
    }

    #[test]
    fn test_keep_latest_policy_replaces() {
        let now = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::KeepLatest);
        store.save_fetched(record("https://example.com/a", now - Duration::hours(2)));
        store.save_fetched(record("https://example.com/b", now - Duration::hours(2)));
        store.save_fetched(record("https://example.com/a", now - Duration::hours(1)));

        let recent = store.fetched_since(24, now);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "https://example.com/b");
        assert_eq!(recent[1].url, "https://example.com/a");
        assert_eq!(recent[1].fetched_at, now - Duration::hours(1));
    }

    #[test]
    fn test_posted_recent_newest_first() {
        let now = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        store.mark_posted("https://example.com/old", now - Duration::hours(10));
        store.mark_posted("https://example.com/new", now);
        store.mark_posted("https://example.com/mid", now - Duration::hours(5));

        let recent = store.posted_recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "https://example.com/new");
        assert_eq!(recent[1].url, "https://example.com/mid");
    }

    fn summary(headline: &str) -> Summary {
        Summary {
            headline: headline.to_string(),
            bullets: vec!["One".to_string(), "Two".to_string(), "Three".to_string()],
        }
    }

    #[test]
    fn test_summary_cache_hit_and_expiry() {
        let now = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        store.cache_summary("https://example.com/a", &summary("Cached"), now - Duration::hours(2));

        assert_eq!(
            store.cached_summary("https://example.com/a", now),
            Some(summary("Cached"))
        );
        assert_eq!(store.cached_summary("https://example.com/b", now), None);
        assert_eq!(
            store.cached_summary("https://example.com/a", now + Duration::hours(SUMMARY_CACHE_HOURS)),
            None
        );
    }

    #[test]
    fn test_cache_summary_replaces_entry() {
        let now = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        store.cache_summary("https://example.com/a", &summary("First"), now);
        store.cache_summary("https://example.com/a", &summary("Second"), now);

        assert_eq!(store.state().summary_cache.len(), 1);
        assert_eq!(
            store.cached_summary("https://example.com/a", now).unwrap().headline,
            "Second"
        );
    }

    #[tokio::test]
    async fn test_summary_cache_survives_restart_and_is_pruned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let now = Utc::now();

        let mut store = StateStore::load(&path, &[], FetchedPolicy::Append).await.unwrap();
        store.cache_summary("https://example.com/old", &summary("Old"), now - Duration::hours(80));
        store.cache_summary("https://example.com/new", &summary("New"), now - Duration::hours(1));
        store.save().await.unwrap();

        let reloaded = StateStore::load(&path, &[], FetchedPolicy::Append).await.unwrap();
        assert_eq!(reloaded.state().summary_cache.len(), 1);
        assert!(reloaded.cached_summary("https://example.com/new", now).is_some());
    }

    #[test]
    fn test_llm_usage_resets_each_day() {
        let day = Utc::now();
        let mut store = StateStore::from_state("unused.json", State::default(), FetchedPolicy::Append);
        assert_eq!(store.llm_requests_on(day), 0);

        store.record_llm_request(day);
        store.record_llm_request(day);
        assert_eq!(store.llm_requests_on(day), 2);

        let tomorrow = day + Duration::days(1);
        assert_eq!(store.llm_requests_on(tomorrow), 0);
        store.record_llm_request(tomorrow);
        assert_eq!(store.llm_requests_on(tomorrow), 1);
        assert_eq!(store.state().llm_usage.date, Some(tomorrow.date_naive()));
    }

    #[test]
    fn test_older_state_without_cache_fields_loads() {
        let state: State = serde_json::from_str(r#"{"posted":{},"fetched_articles":[]}"#).unwrap();
        assert!(state.summary_cache.is_empty());
        assert_eq!(state.llm_usage, LlmUsage::default());
    }

    #[tokio::test]
    async fn test_save_to_unwritable_path_is_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let mut store = StateStore::from_state(blocker.join("state.json"), State::default(), FetchedPolicy::Append);
        let err = store.save().await.unwrap_err();
        assert!(matches!(err, StateError::Write { .. }));
    }
}
