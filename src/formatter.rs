//! Post formatting: turn a [`Summary`] into bounded-length [`PostContent`].
//!
//! The primary message has the shape
//!
//! ```text
//! {headline} — • {bullet1} • {bullet2} • {bullet3}
//! ```
//!
//! and never exceeds [`MAX_POST_CHARS`] characters. When it would, bullets
//! are dropped from the end one at a time; if the headline alone is still
//! too long it is cut at a word boundary and ends with `…`. Lengths are
//! counted in `char`s, so multibyte text is never split.
//!
//! Everything here is pure and deterministic.

use crate::models::{BULLET_COUNT, MAX_POST_CHARS, PostContent, Summary};
use crate::utils::{collapse_whitespace, truncate_chars};
use itertools::Itertools;

/// Longest headline kept by [`sanitize`].
pub const MAX_HEADLINE_CHARS: usize = 110;

/// Longest bullet, in words, kept by [`sanitize`].
pub const MAX_BULLET_WORDS: usize = 14;

const HEADLINE_SEPARATOR: &str = " — ";
const BULLET_MARK: &str = "•";
const ELLIPSIS: char = '…';

/// Compose the post for `summary`, with `url` as the follow-up message.
pub fn compose(summary: &Summary, url: &str) -> PostContent {
    let headline = collapse_whitespace(&summary.headline);
    let bullets: Vec<String> = summary
        .bullets
        .iter()
        .map(|b| collapse_whitespace(b))
        .filter(|b| !b.is_empty())
        .collect();

    PostContent {
        primary: fit_primary(&headline, &bullets),
        secondary: url.to_string(),
    }
}

fn fit_primary(headline: &str, bullets: &[String]) -> String {
    for count in (0..=bullets.len()).rev() {
        let candidate = join(headline, &bullets[..count]);
        // an empty post is only acceptable when there was nothing to say
        let empty_fallback = candidate.is_empty() && !bullets.is_empty();
        if candidate.chars().count() <= MAX_POST_CHARS && !empty_fallback {
            return candidate;
        }
    }

    // Nothing fits even with every bullet dropped.
    let lead = if headline.is_empty() {
        join(headline, &bullets[..1])
    } else {
        headline.to_string()
    };
    shorten(&lead, MAX_POST_CHARS)
}

fn join(headline: &str, bullets: &[String]) -> String {
    let body = bullets
        .iter()
        .map(|b| format!("{BULLET_MARK} {b}"))
        .join(" ");

    match (headline.is_empty(), body.is_empty()) {
        (_, true) => headline.to_string(),
        (true, false) => body,
        (false, false) => format!("{headline}{HEADLINE_SEPARATOR}{body}"),
    }
}

/// Cut `text` to at most `max` chars, preferring the last word boundary.
fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut = truncate_chars(text, max.saturating_sub(1));
    let cut = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => cut[..idx].trim_end(),
        _ => cut,
    };
    format!("{cut}{ELLIPSIS}")
}

/// Normalize a summary before formatting.
///
/// Bullets lose trailing `.`, `!`, `;` and `:`, are capped at
/// [`MAX_BULLET_WORDS`] words and start with a capital letter. Empty and
/// case-insensitive duplicate bullets are dropped and at most
/// [`BULLET_COUNT`] are kept. The headline is capped at
/// [`MAX_HEADLINE_CHARS`] characters.
pub fn sanitize(summary: &Summary) -> Summary {
    let headline = collapse_whitespace(&summary.headline);
    let headline = truncate_chars(&headline, MAX_HEADLINE_CHARS)
        .trim_end()
        .to_string();

    let bullets = summary
        .bullets
        .iter()
        .map(|b| clean_bullet(b))
        .filter(|b| !b.is_empty())
        .unique_by(|b| b.to_lowercase())
        .take(BULLET_COUNT)
        .collect();

    Summary { headline, bullets }
}

fn clean_bullet(raw: &str) -> String {
    let trimmed = collapse_whitespace(raw);
    let trimmed = trimmed
        .trim_start_matches(|c: char| c == '•' || c == '-' || c.is_whitespace())
        .trim_end_matches(['.', '!', ';', ':']);
    let capped = trimmed
        .split_whitespace()
        .take(MAX_BULLET_WORDS)
        .join(" ");
    capitalize_first_alpha(&capped)
}

fn capitalize_first_alpha(s: &str) -> String {
    match s.char_indices().find(|(_, c)| c.is_alphabetic()) {
        Some((idx, c)) => {
            let mut out = String::with_capacity(s.len());
            out.push_str(&s[..idx]);
            out.extend(c.to_uppercase());
            out.push_str(&s[idx + c.len_utf8()..]);
            out
        }
        None => s.to_string(),
    }
}
