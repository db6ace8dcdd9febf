//! Link-heuristic fallback for listing pages whose markup no item selector
//! recognises.
//!
//! Every hyperlink with a non-trivial title whose target looks like a speech
//! (`/speech`, `speech/`, `/remarks`, `/talk`) becomes a candidate. The date
//! is read from the nearest enclosing block, or failing that from the URL
//! path itself.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use tracing::debug;

use super::{Discover, Listing, ScrapeError, element_text};
use crate::dates::{date_from_url, parse_date};
use crate::models::SpeechCandidate;

static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

const BLOCK_TAGS: &[&str] = &["li", "div", "article", "tr", "p"];

pub struct LinkHeuristicStrategy {
    markers: Vec<String>,
    min_title_chars: usize,
}

impl Default for LinkHeuristicStrategy {
    fn default() -> Self {
        Self {
            markers: ["/speech", "speech/", "/remarks", "/talk"]
                .into_iter()
                .map(String::from)
                .collect(),
            min_title_chars: 12,
        }
    }
}

impl LinkHeuristicStrategy {
    fn looks_like_speech(&self, href: &str) -> bool {
        let href = href.to_lowercase();
        self.markers.iter().any(|m| href.contains(m.as_str()))
    }
}

impl Discover for LinkHeuristicStrategy {
    fn name(&self) -> &'static str {
        "link-heuristic"
    }

    fn discover(&self, listing: &Listing<'_>) -> Result<Option<Vec<SpeechCandidate>>, ScrapeError> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for link in listing.document().select(&LINK) {
            let href = link.value().attr("href").unwrap_or_default().trim();
            let title = element_text(link);
            if title.chars().count() < self.min_title_chars || seen.contains(href) {
                continue;
            }
            if !self.looks_like_speech(href) {
                continue;
            }
            seen.insert(href);

            let context = link
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| BLOCK_TAGS.contains(&el.value().name()))
                .map(element_text)
                .unwrap_or_else(|| title.clone());
            let date = parse_date(&context).or_else(|| date_from_url(href));
            let speaker_text = format!("{context} {title}");

            listing.keep(listing.candidate(&title, href, date, &speaker_text), &mut found);
        }

        debug!(source = %listing.source_id, count = found.len(), "Link heuristic finished");
        Ok(Some(found))
    }
}
