//! Optional YAML configuration file.
//!
//! Every setting can also be passed on the command line or through the
//! environment (see [`crate::cli`]); those values win over the file. A
//! minimal file looks like:
//!
//! ```yaml
//! llm:
//!   api_base: https://api.openai.com/v1
//!   model: gpt-4o-mini
//!   temperature: 0.4
//!   daily_budget: 250
//! http:
//!   timeout_secs: 20
//!   max_retries: 3
//! ```

use crate::api::BackoffPolicy;
use crate::cli::RunArgs;
use serde::Deserialize;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_LLM_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EVENTREGISTRY_BASE: &str = "https://eventregistry.org/api/v1";
pub const DEFAULT_X_API_BASE: &str = "https://api.twitter.com/2";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub http: HttpSettings,
    pub eventregistry: EventRegistrySettings,
    pub x: XSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Model requests allowed per UTC day; unlimited when unset.
    pub daily_budget: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub base_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            ..BackoffPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventRegistrySettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct XSettings {
    pub bearer_token: Option<String>,
    pub api_base: Option<String>,
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
        let settings = Self::from_yaml(&raw)?;
        info!(config_path = %path.display(), "Loaded configuration");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, Box<dyn Error>> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Let command-line and environment values take precedence.
    pub fn apply_run_args(&mut self, args: &RunArgs) {
        override_with(&mut self.llm.api_key, &args.llm_api_key);
        override_with(&mut self.llm.api_base, &args.llm_api_base);
        override_with(&mut self.llm.model, &args.llm_model);
        override_with(&mut self.eventregistry.api_key, &args.eventregistry_api_key);
        override_with(&mut self.x.bearer_token, &args.x_bearer_token);
        if args.llm_daily_budget.is_some() {
            self.llm.daily_budget = args.llm_daily_budget;
        }
    }

    pub fn llm_api_base(&self) -> &str {
        self.llm.api_base.as_deref().unwrap_or(DEFAULT_LLM_API_BASE)
    }

    pub fn llm_model(&self) -> &str {
        self.llm.model.as_deref().unwrap_or(DEFAULT_LLM_MODEL)
    }

    pub fn eventregistry_base(&self) -> &str {
        self.eventregistry
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_EVENTREGISTRY_BASE)
    }

    pub fn x_api_base(&self) -> &str {
        self.x.api_base.as_deref().unwrap_or(DEFAULT_X_API_BASE)
    }
}

/// Blank values count as unset so `FOO=` in a `.env` file does not enable an adapter.
fn override_with(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        *slot = Some(v.to_string());
    }
    if slot.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *slot = None;
    }
}
