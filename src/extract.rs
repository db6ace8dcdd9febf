//! Speech text extraction from a speech page.
//!
//! Navigation, header/footer, asides and script/style blocks never count as
//! content. The first content region (in [`CONTENT_SELECTORS`] order) with
//! more than [`SUBSTANTIVE_CHARS`] characters of text wins; otherwise the
//! whole body is used. Output is whitespace-collapsed and capped at
//! [`MAX_TEXT_CHARS`], since only an excerpt is needed for tone scoring.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};

use crate::http::Fetcher;
use crate::utils::{collapse_whitespace, truncate_chars};

pub const MAX_TEXT_CHARS: usize = 1500;
pub const SUBSTANTIVE_CHARS: usize = 300;

const STRIPPED_TAGS: &[&str] = &["nav", "footer", "header", "script", "style", "aside", "noscript"];

const CONTENT_SELECTORS: &[&str] = &[
    "div#article",
    "div.col-xs-12.col-sm-8.col-md-8",
    "div.ts-article-content",
    "div.speech-content",
    "div#content-detail",
    "div.entry-content",
    "article",
    "main",
    "div#content",
];

static CONTENT: Lazy<Vec<Selector>> = Lazy::new(|| {
    CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));

/// Fetch `url` and extract its speech text. Any failure yields an empty
/// string, which callers treat as "no text".
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn fetch_speech_text<F: Fetcher>(fetcher: &F, url: &str) -> String {
    match fetcher.fetch_ok(url).await {
        Ok(body) => {
            let text = extract_text(&body);
            debug!(chars = text.chars().count(), "Extracted speech text");
            text
        }
        Err(e) => {
            warn!(error = %e, "Text fetch failed");
            String::new()
        }
    }
}

/// Extract the main speech text from an HTML document.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let region = CONTENT.iter().find_map(|selector| {
        document
            .select(selector)
            .find(|el| !inside_stripped(*el))
            .map(visible_text)
            .filter(|text| text.chars().count() > SUBSTANTIVE_CHARS)
    });

    let text = region.or_else(|| document.select(&BODY).next().map(visible_text));
    text.map(|t| truncate_chars(&t, MAX_TEXT_CHARS))
        .unwrap_or_default()
}

/// Whitespace-collapsed text of `element`, skipping stripped subtrees.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_visible_text(element, &mut out);
    collapse_whitespace(&out)
}

fn push_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(el) = ElementRef::wrap(child) {
            if !is_stripped(el) {
                push_visible_text(el, out);
            }
        }
    }
}

fn is_stripped(el: ElementRef<'_>) -> bool {
    STRIPPED_TAGS.contains(&el.value().name())
}

fn inside_stripped(el: ElementRef<'_>) -> bool {
    is_stripped(el) || el.ancestors().filter_map(ElementRef::wrap).any(is_stripped)
}
