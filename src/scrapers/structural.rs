//! Listing pages read through per-source CSS item selectors.
//!
//! Item selectors are tried in order and the first one that matches anything
//! defines the item list. Inside each item the date comes from the
//! source-specific date selectors, then [`GENERIC_DATE`]; its `datetime`
//! attribute is preferred over its text, and the item's whole text is the
//! last resort.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use tracing::{debug, warn};

use super::{Discover, Listing, ScrapeError, element_text};
use crate::config::SourceConfig;
use crate::dates::parse_date;
use crate::models::SpeechCandidate;

static GENERIC_DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time, .date, span[class*='date']").expect("static selector"));

static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

pub struct StructuralStrategy {
    item_selectors: Vec<Selector>,
    date_selectors: Vec<Selector>,
}

impl StructuralStrategy {
    /// Compile the source's selectors. Selectors that fail to parse are
    /// logged and left out.
    pub fn from_config(source: &SourceConfig) -> Self {
        let compile = |list: &[String]| -> Vec<Selector> {
            list.iter()
                .filter_map(|s| match Selector::parse(s.trim()) {
                    Ok(sel) => Some(sel),
                    Err(e) => {
                        warn!(source = %source.id, selector = %s, error = ?e, "Ignoring invalid selector");
                        None
                    }
                })
                .collect()
        };
        Self {
            item_selectors: compile(&source.item_selectors),
            date_selectors: compile(&source.date_selectors),
        }
    }

    fn item_candidate(
        &self,
        item: ElementRef<'_>,
        listing: &Listing<'_>,
    ) -> Result<Option<SpeechCandidate>, ScrapeError> {
        let Some(link) = item.select(&LINK).next() else {
            debug!(source = %listing.source_id, "Item has no link");
            return Ok(None);
        };
        let href = link.value().attr("href").unwrap_or_default();
        let item_text = element_text(item);

        let date_el = self
            .date_selectors
            .iter()
            .find_map(|sel| item.select(sel).next())
            .or_else(|| item.select(&GENERIC_DATE).next());
        let date_str = date_el
            .map(|el| match el.value().attr("datetime").map(str::trim) {
                Some(dt) if !dt.is_empty() => dt.to_string(),
                _ => element_text(el),
            })
            .unwrap_or_default();
        let date = parse_date(&date_str).or_else(|| parse_date(&item_text));

        listing.candidate(&element_text(link), href, date, &item_text)
    }
}

impl Discover for StructuralStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn discover(&self, listing: &Listing<'_>) -> Result<Option<Vec<SpeechCandidate>>, ScrapeError> {
        let document = listing.document();
        let Some(items) = self
            .item_selectors
            .iter()
            .map(|sel| document.select(sel).collect::<Vec<_>>())
            .find(|items| !items.is_empty())
        else {
            return Ok(None);
        };
        debug!(source = %listing.source_id, items = items.len(), "Matched listing items");

        let mut found = Vec::new();
        for item in items {
            listing.keep(self.item_candidate(item, listing), &mut found);
        }
        Ok(Some(found))
    }
}
