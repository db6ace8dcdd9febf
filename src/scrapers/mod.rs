//! Site adapters that turn a source's listing endpoint into speech candidates.
//!
//! Each source is a [`SiteAdapter`]: its configuration plus an ordered list of
//! [`Discover`] strategies. The first strategy that recognises the listing
//! (returns `Some`) supplies the candidates; later strategies are fallbacks.
//!
//! | Kind | Strategies |
//! |------|------------|
//! | `feed` | [`feed::FeedStrategy`] |
//! | `page` | [`structural::StructuralStrategy`] |
//! | `regional` | [`structural::StructuralStrategy`], then [`links::LinkHeuristicStrategy`] |
//!
//! Failures are contained at the smallest unit: a malformed item is logged
//! and skipped, and a listing that cannot be fetched or parsed contributes
//! nothing without affecting other sources.

use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::unsync::OnceCell;
use scraper::{ElementRef, Html};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::{SourceConfig, SourceKind};
use crate::http::{FetchError, Fetcher};
use crate::models::SpeechCandidate;
use crate::speakers::SpeakerResolver;
use crate::utils::collapse_whitespace;

pub mod feed;
pub mod links;
pub mod structural;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid listing url {url}: {source}")]
    ListingUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("unparseable feed: {0}")]
    Feed(String),
    #[error("unusable link {href:?}: {reason}")]
    Link { href: String, reason: String },
}

/// Inputs shared by every adapter in one run.
#[derive(Debug, Clone, Copy)]
pub struct DiscoverContext<'a> {
    /// Candidates dated strictly before this are discarded.
    pub cutoff: NaiveDate,
    pub speakers: &'a SpeakerResolver,
}

/// A fetched listing page, with the HTML tree parsed on first use.
pub struct Listing<'a> {
    pub source_id: &'a str,
    pub base: &'a Url,
    pub body: &'a str,
    pub ctx: DiscoverContext<'a>,
    document: OnceCell<Html>,
}

impl<'a> Listing<'a> {
    pub fn new(source_id: &'a str, base: &'a Url, body: &'a str, ctx: DiscoverContext<'a>) -> Self {
        Self {
            source_id,
            base,
            body,
            ctx,
            document: OnceCell::new(),
        }
    }

    pub fn document(&self) -> &Html {
        self.document.get_or_init(|| Html::parse_document(self.body))
    }

    /// Resolve `href` against the listing URL into an absolute http(s) URL.
    pub fn resolve_url(&self, href: &str) -> Result<String, ScrapeError> {
        let href = href.trim();
        let unusable = |reason: &str| ScrapeError::Link {
            href: href.to_string(),
            reason: reason.to_string(),
        };
        if href.is_empty() || href.starts_with('#') {
            return Err(unusable("empty or fragment-only"));
        }
        let url = self.base.join(href).map_err(|e| unusable(&e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url.to_string()),
            other => Err(unusable(&format!("unsupported scheme {other}"))),
        }
    }

    /// Build a candidate, applying the lookback cutoff. `Ok(None)` means the
    /// item is undated or too old; `Err` means it is malformed.
    pub fn candidate(
        &self,
        title: &str,
        href: &str,
        date: Option<NaiveDate>,
        speaker_text: &str,
    ) -> Result<Option<SpeechCandidate>, ScrapeError> {
        let url = self.resolve_url(href)?;
        let Some(date) = date else {
            debug!(source = %self.source_id, %url, "No date found; skipping item");
            return Ok(None);
        };
        if date < self.ctx.cutoff {
            debug!(source = %self.source_id, %url, %date, cutoff = %self.ctx.cutoff, "Older than lookback window");
            return Ok(None);
        }
        Ok(Some(SpeechCandidate {
            source: self.source_id.to_string(),
            speaker_id: self.ctx.speakers.resolve(speaker_text).map(str::to_string),
            title: collapse_whitespace(title),
            date,
            venue: String::new(),
            url,
        }))
    }

    /// Log and drop per-item failures so siblings keep going.
    pub(crate) fn keep(
        &self,
        result: Result<Option<SpeechCandidate>, ScrapeError>,
        out: &mut Vec<SpeechCandidate>,
    ) {
        match result {
            Ok(Some(candidate)) => out.push(candidate),
            Ok(None) => {}
            Err(e) => warn!(source = %self.source_id, error = %e, "Skipping malformed listing item"),
        }
    }
}

/// Shared contract of the discovery strategies.
pub trait Discover {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the strategy does not recognise this listing at all,
    /// which hands over to the next strategy.
    fn discover(&self, listing: &Listing<'_>) -> Result<Option<Vec<SpeechCandidate>>, ScrapeError>;
}

/// One configured source and its ordered strategies.
pub struct SiteAdapter {
    pub source: SourceConfig,
    base: Url,
    strategies: Vec<Box<dyn Discover>>,
}

impl SiteAdapter {
    /// Build the adapter for one configured source.
    ///
    /// # Arguments
    ///
    /// * `source` - Source entry from the configuration; its `kind` picks the strategies
    ///
    /// # Returns
    ///
    /// The adapter, or [`ScrapeError::ListingUrl`] when `source.url` is not
    /// an absolute URL. Invalid CSS selectors are logged and dropped rather
    /// than rejected.
    pub fn from_config(source: &SourceConfig) -> Result<Self, ScrapeError> {
        let base = Url::parse(&source.url).map_err(|e| ScrapeError::ListingUrl {
            url: source.url.clone(),
            source: e,
        })?;
        let strategies: Vec<Box<dyn Discover>> = match source.kind {
            SourceKind::Feed => vec![Box::new(feed::FeedStrategy)],
            SourceKind::Page => vec![Box::new(structural::StructuralStrategy::from_config(source))],
            SourceKind::Regional => vec![
                Box::new(structural::StructuralStrategy::from_config(source)),
                Box::new(links::LinkHeuristicStrategy::default()),
            ],
        };
        Ok(Self {
            source: source.clone(),
            base,
            strategies,
        })
    }

    pub fn id(&self) -> &str {
        &self.source.id
    }

    /// Run the strategies over an already-fetched listing body.
    ///
    /// # Arguments
    ///
    /// * `body` - Raw listing document (HTML or RSS)
    /// * `ctx` - Lookback cutoff and speaker table for this run
    ///
    /// # Returns
    ///
    /// Candidates from the first strategy that recognises the listing,
    /// deduplicated by URL in discovery order.
    pub fn discover(
        &self,
        body: &str,
        ctx: DiscoverContext<'_>,
    ) -> Result<Vec<SpeechCandidate>, ScrapeError> {
        let listing = Listing::new(&self.source.id, &self.base, body, ctx);
        for strategy in &self.strategies {
            match strategy.discover(&listing)? {
                Some(found) => {
                    debug!(source = %self.source.id, strategy = strategy.name(), count = found.len(), "Strategy matched listing");
                    return Ok(found.into_iter().unique_by(|c| c.url.clone()).collect());
                }
                None => {
                    info!(source = %self.source.id, strategy = strategy.name(), "Strategy found no items; trying next");
                }
            }
        }
        Ok(Vec::new())
    }

    /// Fetch the listing and discover candidates.
    ///
    /// Never fails: a fetch error, bad status or unparseable listing is
    /// logged at `error` level and yields an empty list, so one broken
    /// source cannot stop the others.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let adapter = SiteAdapter::from_config(&config.sources[0])?;
    /// let found = adapter.scrape(&fetcher, ctx).await;
    /// ```
    #[instrument(level = "info", skip_all, fields(source = %self.id()))]
    pub async fn scrape<F: Fetcher>(&self, fetcher: &F, ctx: DiscoverContext<'_>) -> Vec<SpeechCandidate> {
        let result = match fetcher.fetch_ok(&self.source.url).await {
            Ok(body) => {
                info!(bytes = body.len(), "Fetched listing");
                self.discover(&body, ctx)
            }
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(candidates) => {
                info!(count = candidates.len(), "Discovered speeches");
                candidates
            }
            Err(e) => {
                error!(error = %e, "Source failed; skipping");
                Vec::new()
            }
        }
    }
}

/// Whitespace-collapsed text content of an element.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}
