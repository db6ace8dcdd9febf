//! RSS feed adapter for the Board of Governors speech feed.

use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use super::{Discover, Listing, ScrapeError};
use crate::dates::parse_date;
use crate::models::SpeechCandidate;
use crate::utils::collapse_whitespace;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

pub struct FeedStrategy;

impl FeedStrategy {
    fn item_candidate(
        item: &FeedItem,
        listing: &Listing<'_>,
    ) -> Result<Option<SpeechCandidate>, ScrapeError> {
        let title = collapse_whitespace(item.title.as_deref().unwrap_or_default());
        let Some(link) = item.link.as_deref() else {
            return Err(ScrapeError::Link {
                href: String::new(),
                reason: format!("feed item {title:?} has no link"),
            });
        };
        let date = item.pub_date.as_deref().and_then(parse_date);
        let description = item.description.as_deref().unwrap_or_default();
        let speaker_text = format!("{description} {title}");
        listing.candidate(&title, link, date, &speaker_text)
    }
}

impl Discover for FeedStrategy {
    fn name(&self) -> &'static str {
        "feed"
    }

    fn discover(&self, listing: &Listing<'_>) -> Result<Option<Vec<SpeechCandidate>>, ScrapeError> {
        let rss: Rss = from_str(listing.body).map_err(|e| ScrapeError::Feed(e.to_string()))?;
        debug!(source = %listing.source_id, items = rss.channel.items.len(), "Parsed feed");

        let mut found = Vec::new();
        for item in &rss.channel.items {
            listing.keep(Self::item_candidate(item, listing), &mut found);
        }
        Ok(Some(found))
    }
}
