//! Article summarization.
//!
//! [`Summarizer`] picks one of two backends once at startup:
//! - [`LlmSummarizer`]: asks an OpenAI-compatible model for a JSON
//!   `{headline, bullets}` object
//! - [`LocalSummarizer`]: deterministic title plus leading sentences, used
//!   when no API key is configured or the model call fails
//!
//! Every backend implements [`Summarize`]. The orchestrator falls back to
//! [`local_summary`] on any error, so a summary is always produced.

use crate::api::AskAsync;
use crate::models::{Article, BULLET_COUNT, Summary};
use crate::utils::{html_to_text, looks_truncated, truncate_chars, truncate_for_log};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::error::Error;
use tracing::{debug, info, instrument, warn};

/// Headline used when an article arrives without a title.
pub const DEFAULT_HEADLINE: &str = "News update";

/// Longest bullet, in characters, produced by the local summarizer.
const MAX_LOCAL_BULLET_CHARS: usize = 180;

/// Body text sent to the model is capped to keep prompts bounded.
const MAX_PROMPT_BODY_CHARS: usize = 6000;

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").unwrap());

pub const SYSTEM_PROMPT: &str = "You write concise, factual news briefs for busy professionals. \
Respond only with a JSON object.";

/// Anything that can turn an [`Article`] into a [`Summary`].
pub trait Summarize {
    async fn summarize(&self, article: &Article) -> Result<Summary, Box<dyn Error>>;

    /// Whether each call spends a paid model request. Metered summaries are
    /// cached and counted against the daily budget.
    fn is_metered(&self) -> bool {
        false
    }
}

/// The summarizer selected for this run.
#[derive(Debug)]
pub enum Summarizer<A> {
    Llm(LlmSummarizer<A>),
    Local(LocalSummarizer),
}

impl<A> Summarize for Summarizer<A>
where
    A: AskAsync<Response = String>,
{
    async fn summarize(&self, article: &Article) -> Result<Summary, Box<dyn Error>> {
        match self {
            Summarizer::Llm(llm) => llm.summarize(article).await,
            Summarizer::Local(local) => local.summarize(article).await,
        }
    }

    fn is_metered(&self) -> bool {
        matches!(self, Summarizer::Llm(_))
    }
}

#[derive(Debug, Deserialize)]
struct ModelSummary {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    bullets: Vec<String>,
}

/// Summarizer backed by a chat model.
#[derive(Debug)]
pub struct LlmSummarizer<A> {
    api: A,
}

impl<A> LlmSummarizer<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(api: A) -> Self {
        Self { api }
    }
}

impl<A> Summarize for LlmSummarizer<A>
where
    A: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(url = %article.url))]
    async fn summarize(&self, article: &Article) -> Result<Summary, Box<dyn Error>> {
        let prompt = build_prompt(article);
        let response = self.api.ask(&prompt).await?;
        let mut parsed = serde_json::from_str::<ModelSummary>(&response);

        // A response cut off mid-object is worth exactly one more attempt.
        if let Err(ref e) = parsed {
            if looks_truncated(e) {
                warn!(error = %e, "EOF while parsing; re-asking once");
                let retry = self.api.ask(&prompt).await?;
                parsed = serde_json::from_str::<ModelSummary>(&retry);
            }
        }

        let parsed = parsed.map_err(|e| {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&response, 300),
                "Model returned non-conforming JSON"
            );
            e
        })?;

        let headline = parsed.headline.trim().to_string();
        let bullets: Vec<String> = parsed
            .bullets
            .into_iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .take(BULLET_COUNT)
            .collect();

        if headline.is_empty() {
            return Err("model summary has an empty headline".into());
        }
        if bullets.len() < BULLET_COUNT {
            return Err(format!(
                "model summary has {} usable bullets, expected {BULLET_COUNT}",
                bullets.len()
            )
            .into());
        }

        info!(bullets = bullets.len(), "Summarized article with model");
        Ok(Summary { headline, bullets })
    }

    fn is_metered(&self) -> bool {
        true
    }
}

fn build_prompt(article: &Article) -> String {
    let body = html_to_text(&article.body);
    format!(
        "Summarize this news article.\n\
         - headline: factual, at most 80 characters, no emojis, do not repeat the title verbatim\n\
         - bullets: exactly {BULLET_COUNT}, at most 14 words each, no ellipses, no trailing periods\n\
         The post `headline — • b1 • b2 • b3` should stay under 260 characters.\n\n\
         Title: {}\n\
         Article:\n{}\n\n\
         Respond ONLY as JSON with keys: headline (string), bullets (array of {BULLET_COUNT} strings).",
        article.title.trim(),
        truncate_chars(&body, MAX_PROMPT_BODY_CHARS),
    )
}

/// Deterministic offline summarizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSummarizer;

impl Summarize for LocalSummarizer {
    async fn summarize(&self, article: &Article) -> Result<Summary, Box<dyn Error>> {
        Ok(local_summary(article))
    }
}

/// Title as headline and the first sentences of the body as bullets.
///
/// Never fails; an empty body yields a summary without bullets.
pub fn local_summary(article: &Article) -> Summary {
    let title = article.title.trim();
    let headline = if title.is_empty() {
        DEFAULT_HEADLINE.to_string()
    } else {
        title.to_string()
    };

    let body = html_to_text(&article.body);
    let bullets: Vec<String> = sentences(&body)
        .into_iter()
        .take(BULLET_COUNT)
        .map(|s| truncate_chars(s, MAX_LOCAL_BULLET_CHARS).trim_end().to_string())
        .collect();

    debug!(url = %article.url, bullets = bullets.len(), "Built local summary");
    Summary { headline, bullets }
}

fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        // keep the terminating punctuation with its sentence
        out.push(text[start..m.start() + 1].trim());
        start = m.end();
    }
    out.push(text[start..].trim());
    out.retain(|s| !s.is_empty());
    out
}
