//! # FOMC Speech Scraper
//!
//! Collects newly published speeches by Federal Reserve officials, scores each
//! one's monetary-policy tone through an LLM, and appends the results to a
//! persistent JSON corpus keyed by speaker.
//!
//! ## Usage
//!
//! ```sh
//! ANTHROPIC_API_KEY=sk-... fomc_speech_scraper --lookback-days 7 --corpus-file corpus.json
//! ```
//!
//! ## Architecture
//!
//! One run is a single sequential pipeline:
//! 1. **Load**: read the corpus and derive the lookback window from its newest entry
//! 2. **Discover**: ask every configured source for speeches inside the window
//! 3. **Filter**: drop speeches already in the corpus (by URL or URL fingerprint)
//! 4. **Extract and score**: fetch each new speech's text and rate its tone
//! 5. **Commit**: append the scored entry and persist the corpus immediately

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod classifier;
mod cli;
mod config;
mod corpus;
mod dates;
mod extract;
mod http;
mod models;
mod pipeline;
mod scoring;
mod scrapers;
mod speakers;
mod utils;

use classifier::AnthropicClassifier;
use cli::Cli;
use config::Config;
use corpus::CorpusStore;
use http::HttpFetcher;
use pipeline::Pipeline;
use scoring::{PolicyBackdrop, ScoringClient};
use scrapers::SiteAdapter;
use speakers::SpeakerResolver;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("fomc_speech_scraper starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(lookback_days = args.lookback_days, corpus_file = %args.corpus_file.display(), config = ?args.config, "Parsed CLI arguments");

    // The credential is checked before anything touches the network or the corpus.
    let api_key = match args.require_api_key() {
        Ok(key) => key.to_string(),
        Err(msg) => {
            error!("{msg}");
            return Err(msg.into());
        }
    };

    // ---- Load config ----
    let mut config = Config::load(args.config.as_deref()).await?;
    if let Some(model) = &args.model {
        config.scoring.model = model.clone();
    }
    let backdrop = PolicyBackdrop::from_config(&config.scoring);
    info!(
        speakers = config.speakers.len(),
        sources = config.sources.len(),
        model = %config.scoring.model,
        framework = %config.scoring.framework,
        policy_midpoint = backdrop.midpoint,
        policy_stance = backdrop.characterization,
        "Loaded configuration"
    );

    // ---- Build clients ----
    let fetcher = HttpFetcher::new(Duration::from_secs(config.pacing.page_timeout_secs))?;
    let classifier = AnthropicClassifier::new(
        &api_key,
        &config.scoring.model,
        config.scoring.max_tokens,
        Duration::from_secs(config.pacing.classify_timeout_secs),
    )?;

    let adapters: Vec<SiteAdapter> = config
        .sources
        .iter()
        .filter_map(|source| match SiteAdapter::from_config(source) {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                warn!(source = %source.id, error = %e, "Skipping misconfigured source");
                None
            }
        })
        .collect();

    let pipeline = Pipeline {
        fetcher,
        speakers: SpeakerResolver::new(&config.speakers),
        scorer: ScoringClient::new(classifier, config.scoring.clone(), config.retry.clone()),
        adapters,
        min_lookback_days: args.lookback_days,
        source_pause: config.pacing.source_pause(),
        commit_pause: config.pacing.commit_pause(),
    };

    // ---- Run ----
    let mut store = CorpusStore::load(&args.corpus_file).await?;
    let summary = pipeline.run(&mut store, Local::now().date_naive()).await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        new = summary.new,
        scored = summary.scored,
        corpus = %store.path().display(),
        "Execution complete"
    );

    Ok(())
}
