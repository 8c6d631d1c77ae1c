//! Markdown rendering of a [`Digest`].
//!
//! ```text
//! # Daily Brief — 2025-05-06
//!
//! _2 articles fetched between 2025-05-05 12:00 UTC and 2025-05-06 12:00 UTC._
//!
//! ## Miners pivot as energy prices shift <small>`reuters`</small>
//!
//! - Policy update
//! - Energy costs down
//!
//! Source: [Original headline](https://www.reuters.com/...)
//! ```

use crate::digest::Digest;
use crate::utils::write_atomic;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

const WINDOW_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Render `digest` with its articles newest first.
pub fn digest_to_markdown(digest: &Digest) -> String {
    let mut md = format!("# {}\n\n", digest.title());

    let count = digest.articles.len();
    md.push_str(&format!(
        "_{count} article{} fetched between {} and {}._\n",
        if count == 1 { "" } else { "s" },
        digest.window_start.format(WINDOW_FORMAT),
        digest.window_end.format(WINDOW_FORMAT),
    ));

    for article in digest.newest_first() {
        let source_tag = article
            .source_tag()
            .map(|tag| format!(" <small>`{tag}`</small>"))
            .unwrap_or_default();
        md.push_str(&format!("\n## {}{}\n\n", article.headline, source_tag));

        for bullet in &article.bullets {
            md.push_str(&format!("- {bullet}\n"));
        }
        if !article.bullets.is_empty() {
            md.push('\n');
        }

        let link_text = article
            .source_title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(article.url.as_str());
        md.push_str(&format!("Source: [{}]({})\n", link_text, article.url));
    }

    md
}

/// Write the rendered digest to `{output_dir}/{date}-daily-brief.md`.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_digest(digest: &Digest, output_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let md = digest_to_markdown(digest);
    let path = output_dir.join(format!("{}.md", digest.file_stem()));

    write_atomic(&path, md.as_bytes()).await?;
    info!(path = %path.display(), "Wrote digest Markdown");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FetchedRecord;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn record(url: &str, headline: &str, fetched_at: DateTime<Utc>) -> FetchedRecord {
        FetchedRecord {
            url: url.to_string(),
            headline: headline.to_string(),
            bullets: vec!["Energy costs down".to_string(), "Hashrate up".to_string()],
            fetched_at,
            source_title: Some(format!("Original {headline}")),
        }
    }

    fn digest(articles: Vec<FetchedRecord>) -> Digest {
        let end = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap();
        Digest {
            window_start: end - Duration::hours(24),
            window_end: end,
            articles,
        }
    }

    #[test]
    fn test_markdown_header_and_window() {
        let end = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap();
        let md = digest_to_markdown(&digest(vec![record("https://www.reuters.com/a", "First", end)]));

        assert!(md.starts_with("# Daily Brief — 2025-05-06\n\n"));
        assert!(md.contains("_1 article fetched between 2025-05-05 12:00 UTC and 2025-05-06 12:00 UTC._"));
        assert!(md.contains("## First <small>`reuters`</small>"));
        assert!(md.contains("- Energy costs down\n- Hashrate up\n"));
        assert!(md.contains("Source: [Original First](https://www.reuters.com/a)"));
    }

    #[test]
    fn test_markdown_newest_first() {
        let end = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap();
        let md = digest_to_markdown(&digest(vec![
            record("https://a.example/old", "Older", end - Duration::hours(5)),
            record("https://a.example/new", "Newer", end - Duration::hours(1)),
        ]));

        let newer = md.find("## Newer").unwrap();
        let older = md.find("## Older").unwrap();
        assert!(newer < older);
        assert!(md.contains("_2 articles fetched"));
    }

    #[test]
    fn test_markdown_falls_back_to_url_link_text() {
        let end = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap();
        let mut r = record("https://a.example/x", "Headline", end);
        r.source_title = None;
        r.bullets.clear();

        let md = digest_to_markdown(&digest(vec![r]));
        assert!(md.contains("Source: [https://a.example/x](https://a.example/x)"));
        assert!(!md.contains("\n- "));
    }
}
