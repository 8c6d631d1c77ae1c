//! Post delivery.
//!
//! [`Publisher`] is chosen once at startup:
//! - [`XPublisher`] posts the primary message through the X API v2
//!   `POST /2/tweets` endpoint and the source URL as a reply to it
//! - [`DryRunPublisher`] echoes both messages to the log and stdout
//!
//! Only a failed primary post is an error. The reply is best-effort: when it
//! fails the article has still been published and must be recorded as such.
//!
//! Creating a post is not idempotent. When a retried primary post is refused
//! as duplicate content, the earlier attempt reached X and the article counts
//! as published, without ids and without a reply.

use crate::api::{BackoffPolicy, HttpStatusError, with_backoff};
use crate::models::PostContent;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::error::Error;
use std::fmt;
use tracing::{info, instrument, warn};

/// Identifiers of the messages created by a publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Published {
    pub primary_id: Option<String>,
    pub reply_id: Option<String>,
}

/// Anything that can deliver [`PostContent`].
pub trait Publish {
    async fn publish(&self, content: &PostContent) -> Result<Published, Box<dyn Error>>;
}

/// The publisher selected for this run.
#[derive(Debug)]
pub enum Publisher {
    X(XPublisher),
    DryRun(DryRunPublisher),
}

impl Publish for Publisher {
    async fn publish(&self, content: &PostContent) -> Result<Published, Box<dyn Error>> {
        match self {
            Publisher::X(x) => x.publish(content).await,
            Publisher::DryRun(dry) => dry.publish(content).await,
        }
    }
}

/// Prints posts instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunPublisher;

impl Publish for DryRunPublisher {
    async fn publish(&self, content: &PostContent) -> Result<Published, Box<dyn Error>> {
        info!(primary = %content.primary, secondary = %content.secondary, "Dry run; not posting");
        println!("{}\n  ↳ {}\n", content.primary, content.secondary);
        Ok(Published::default())
    }
}

#[derive(Debug, Serialize)]
struct CreatePost<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyTo<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplyTo<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    data: CreatedPost,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
}

/// X API v2 client authenticated with a user-context bearer token.
pub struct XPublisher {
    http: reqwest::Client,
    api_base: String,
    bearer_token: String,
    policy: BackoffPolicy,
}

impl XPublisher {
    pub fn new(
        http: reqwest::Client,
        api_base: &str,
        bearer_token: &str,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.to_string(),
            policy,
        }
    }

    async fn create_post(&self, body: &CreatePost<'_>) -> Result<String, Box<dyn Error>> {
        let resp = self
            .http
            .post(format!("{}/tweets", self.api_base))
            .bearer_auth(&self.bearer_token)
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Box::new(HttpStatusError::from_response(resp).await));
        }
        let created = resp.json::<CreatePostResponse>().await?;
        Ok(created.data.id)
    }
}

/// X answers a repeated post with 403 and a "duplicate content" detail.
fn is_duplicate_content(e: &(dyn Error + 'static)) -> bool {
    e.downcast_ref::<HttpStatusError>().is_some_and(|status| {
        status.status == StatusCode::FORBIDDEN
            && status.body.to_ascii_lowercase().contains("duplicate content")
    })
}

impl fmt::Debug for XPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XPublisher")
            .field("api_base", &self.api_base)
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

impl Publish for XPublisher {
    #[instrument(level = "info", skip_all, fields(url = %content.secondary))]
    async fn publish(&self, content: &PostContent) -> Result<Published, Box<dyn Error>> {
        let primary = &CreatePost {
            text: &content.primary,
            reply: None,
        };
        let attempts = &Cell::new(0usize);
        let primary_id = match with_backoff(&self.policy, "x.create_post", move || {
            attempts.set(attempts.get() + 1);
            self.create_post(primary)
        })
        .await
        {
            Ok(id) => id,
            // An earlier attempt went through but its response was lost.
            Err(e) if attempts.get() > 1 && is_duplicate_content(e.as_ref()) => {
                warn!(
                    attempts = attempts.get(),
                    "Retry rejected as duplicate; earlier attempt was published"
                );
                return Ok(Published::default());
            }
            Err(e) => return Err(e),
        };
        info!(id = %primary_id, "Published primary post");

        let reply = &CreatePost {
            text: &content.secondary,
            reply: Some(ReplyTo {
                in_reply_to_tweet_id: &primary_id,
            }),
        };
        let reply_id = match with_backoff(&self.policy, "x.create_reply", move || {
            self.create_post(reply)
        })
        .await
        {
            Ok(id) => {
                info!(id = %id, "Published URL reply");
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, primary_id = %primary_id, "URL reply failed; primary post stands");
                None
            }
        };

        Ok(Published {
            primary_id: Some(primary_id),
            reply_id,
        })
    }
}
