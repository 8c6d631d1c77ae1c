//! Digest catalog management.
//!
//! `index.json` holds one [`IndexEntry`] per digest date, newest first.
//! `index.md` is regenerated from it on every write so the two never
//! disagree.
//!
//! # Replace, not append
//!
//! A digest re-run on the same day replaces that day's entry. The catalog
//! therefore never lists a date twice, no matter how often it is rebuilt.

use crate::digest::Digest;
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

pub const INDEX_JSON: &str = "index.json";
pub const INDEX_MD: &str = "index.md";

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// UTC date of the window end, `YYYY-MM-DD`.
    pub date: String,
    /// Markdown file name relative to the catalog.
    pub filename: String,
    pub title: String,
    pub article_count: usize,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl IndexEntry {
    pub fn for_digest(digest: &Digest) -> Self {
        Self {
            date: digest.date(),
            filename: format!("{}.md", digest.file_stem()),
            title: digest.title(),
            article_count: digest.articles.len(),
            window_start: digest.window_start,
            window_end: digest.window_end,
        }
    }
}

/// Read `index.json`; a missing file is an empty catalog.
pub async fn read_index(output_dir: &Path) -> Result<Vec<IndexEntry>, Box<dyn Error>> {
    let path = output_dir.join(INDEX_JSON);
    match fs::read_to_string(&path).await {
        Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Ok(raw) => serde_json::from_str(&raw)
            .map_err(|e| format!("catalog {} is not valid JSON: {e}", path.display()).into()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Insert `entry` into the catalog, replacing any entry for the same date.
///
/// Returns the updated catalog, newest first.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), date = %entry.date))]
pub async fn update_index(
    output_dir: &Path,
    entry: IndexEntry,
) -> Result<Vec<IndexEntry>, Box<dyn Error>> {
    let mut catalog = read_index(output_dir).await?;
    let replaced = catalog.iter().any(|e| e.date == entry.date);
    catalog.retain(|e| e.date != entry.date);
    catalog.push(entry);
    catalog.sort_by(|a, b| b.date.cmp(&a.date));

    let path = output_dir.join(INDEX_JSON);
    write_atomic(&path, &serde_json::to_vec_pretty(&catalog)?).await?;
    info!(path = %path.display(), entries = catalog.len(), replaced, "Updated catalog");
    Ok(catalog)
}

/// Render the catalog as a Markdown list of links.
pub fn index_to_markdown(catalog: &[IndexEntry]) -> String {
    let mut md = String::from("# Daily Briefs\n\n");
    if catalog.is_empty() {
        md.push_str("_No digests yet._\n");
    }
    for entry in catalog {
        md.push_str(&format!(
            "- [{}](./{}) ({} article{})\n",
            entry.title,
            entry.filename,
            entry.article_count,
            if entry.article_count == 1 { "" } else { "s" }
        ));
    }
    md
}

#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_index_markdown(
    output_dir: &Path,
    catalog: &[IndexEntry],
) -> Result<(), Box<dyn Error>> {
    let path = output_dir.join(INDEX_MD);
    write_atomic(&path, index_to_markdown(catalog).as_bytes()).await?;
    info!(path = %path.display(), "Updated index.md");
    Ok(())
}
