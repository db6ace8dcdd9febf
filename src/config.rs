//! Runtime configuration: speaker table, source registry, scoring anchors.
//!
//! Everything that tends to change when a site is redesigned or the policy
//! backdrop moves lives here as data. The built-in defaults are embedded from
//! `config/default.yaml`; `--config <file>` swaps in a replacement with the
//! same shape.

use serde::Deserialize;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

const DEFAULT_CONFIG: &str = include_str!("../config/default.yaml");

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Ordered speaker table. Earlier entries win alias ties.
    pub speakers: Vec<SpeakerConfig>,
    /// Sources in the order they are scraped.
    pub sources: Vec<SourceConfig>,
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// One policy-committee member and the strings that identify them.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub aliases: Vec<String>,
}

/// How a source's listing endpoint is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// RSS feed with title/link/pubDate/description per item.
    Feed,
    /// HTML listing read through structural selectors only.
    Page,
    /// HTML listing with structural selectors and a link-heuristic fallback.
    Regional,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub kind: SourceKind,
    pub url: String,
    #[serde(default)]
    pub item_selectors: Vec<String>,
    #[serde(default)]
    pub date_selectors: Vec<String>,
}

/// Classification model and the policy-rate anchors quoted in the prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Label for the projection round the anchors come from.
    pub framework: String,
    /// Estimated neutral rate, in percent.
    pub neutral_rate: f64,
    /// Lower bound of the current policy-rate target range, in percent.
    pub policy_rate_low: f64,
    /// Upper bound of the current policy-rate target range, in percent.
    pub policy_rate_high: f64,
}

fn default_max_tokens() -> u32 {
    400
}

/// Politeness pauses and per-request timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    pub source_pause_ms: u64,
    pub commit_pause_ms: u64,
    pub page_timeout_secs: u64,
    pub classify_timeout_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            source_pause_ms: 1000,
            commit_pause_ms: 1500,
            page_timeout_secs: 30,
            classify_timeout_secs: 45,
        }
    }
}

impl PacingConfig {
    pub fn source_pause(&self) -> Duration {
        Duration::from_millis(self.source_pause_ms)
    }

    pub fn commit_pause(&self) -> Duration {
        Duration::from_millis(self.commit_pause_ms)
    }
}

/// Bounded retry policy for the classification call.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    #[serde(default)]
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_jitter_ms: 250,
        }
    }
}

impl Config {
    /// The configuration compiled into the binary.
    pub fn builtin() -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(DEFAULT_CONFIG)
    }

    /// Load the runtime configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - YAML file with the same shape as `config/default.yaml`.
    ///   `None` selects the built-in configuration.
    ///
    /// # Returns
    ///
    /// The parsed configuration, or an error when the file cannot be read or
    /// does not parse. Both are fatal at startup.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                Ok(serde_yaml::from_str::<Config>(&raw)?)
            }
            None => Ok(Self::builtin()?),
        }
    }
}
