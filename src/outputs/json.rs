//! JSON digest output.
//!
//! The document mirrors [`Digest`]: the window bounds plus every fetched
//! record, in fetch order.

use crate::digest::Digest;
use crate::utils::write_atomic;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Write `digest` to `{output_dir}/{date}-daily-brief.json`.
///
/// An existing file for the same date is replaced.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_digest(digest: &Digest, output_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_vec_pretty(digest)?;
    let path = output_dir.join(format!("{}.json", digest.file_stem()));

    write_atomic(&path, &json).await?;
    info!(path = %path.display(), bytes = json.len(), "Wrote digest JSON");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FetchedRecord;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_digest_json() {
        let dir = tempdir().unwrap();
        let end = Utc.with_ymd_and_hms(2025, 5, 6, 23, 30, 0).unwrap();
        let digest = Digest {
            window_start: end - chrono::Duration::hours(24),
            window_end: end,
            articles: vec![FetchedRecord {
                url: "https://example.com/a".to_string(),
                headline: "Miners expand".to_string(),
                bullets: vec!["One".to_string()],
                fetched_at: end,
                source_title: None,
            }],
        };

        let path = write_digest(&digest, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("2025-05-06-daily-brief.json"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["window_end"], "2025-05-06T23:30:00Z");
        assert_eq!(value["articles"][0]["headline"], "Miners expand");
        assert!(value["articles"][0].get("source_title").is_none());
    }
}
