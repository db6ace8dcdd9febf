//! Command-line interface definitions for the FOMC speech scraper.
//!
//! Every option can also be supplied through an environment variable, which
//! is how scheduled runs are usually configured.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the FOMC speech scraper.
///
/// # Examples
///
/// ```sh
/// # Credential from the environment, default 7-day window
/// ANTHROPIC_API_KEY=sk-... fomc_speech_scraper
///
/// # Wider window, separate corpus file and source list
/// fomc_speech_scraper --lookback-days 30 --corpus-file data/corpus.json -c sources.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// API key for the classification service
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Minimum lookback window in days
    #[arg(short, long, env = "LOOKBACK_DAYS", default_value_t = 7, value_parser = clap::value_parser!(i64).range(1..))]
    pub lookback_days: i64,

    /// Path of the JSON corpus file
    #[arg(long, env = "CORPUS_FILE", default_value = "corpus.json")]
    pub corpus_file: PathBuf,

    /// Optional path to a YAML file replacing the built-in speakers, sources and scoring anchors
    #[arg(short, long, env = "SCRAPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the scoring model named in the configuration
    #[arg(long, env = "SCORE_MODEL")]
    pub model: Option<String>,
}

impl Cli {
    /// The API key, if one was given and is not blank.
    pub fn require_api_key(&self) -> Result<&str, String> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err("ANTHROPIC_API_KEY is not set (pass --api-key or export it)".to_string()),
        }
    }
}
