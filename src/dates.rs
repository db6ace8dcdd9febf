//! Date normalization across the formats the listing pages and feeds use.
//!
//! Parsing is an ordered chain of [`DateRule`]s tried against the cleaned
//! text as a whole. When none accepts it, a date-looking substring is pulled
//! out (month-name dates first, then ISO dates) and the chain is retried on
//! that substring. Failure is `None`, never an error and never "today".

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::collapse_whitespace;

/// One way of reading a complete date string.
#[derive(Debug, Clone, Copy)]
enum DateRule {
    /// A `chrono` format that must consume the whole text.
    Format(&'static str),
    /// Month and year only; resolves to the first of the month.
    MonthYear(&'static str),
    /// Feed-style `Thu, 09 Oct 2025 14:00:00 GMT`.
    Rfc2822,
    /// Machine-readable `2025-10-09T14:00:00Z`.
    Rfc3339,
}

impl DateRule {
    fn apply(self, text: &str) -> Option<NaiveDate> {
        match self {
            DateRule::Format(fmt) => NaiveDate::parse_from_str(text, fmt).ok(),
            DateRule::MonthYear(fmt) => {
                NaiveDate::parse_from_str(&format!("1 {text}"), &format!("%d {fmt}")).ok()
            }
            DateRule::Rfc2822 => DateTime::parse_from_rfc2822(text)
                .ok()
                .map(|dt| dt.date_naive()),
            DateRule::Rfc3339 => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.date_naive()),
        }
    }
}

/// Tried in order; the first rule that accepts the text wins.
const RULES: &[DateRule] = &[
    DateRule::Format("%B %d, %Y"),
    DateRule::Format("%b %d, %Y"),
    DateRule::Format("%B %d,%Y"),
    DateRule::Format("%b. %d, %Y"),
    DateRule::Format("%Y-%m-%d"),
    DateRule::Format("%m/%d/%Y"),
    DateRule::Format("%d %B %Y"),
    DateRule::Rfc2822,
    DateRule::Rfc3339,
    DateRule::MonthYear("%B %Y"),
    // After MonthYear: chrono lets the space match nothing, so this would
    // read "October 2025" as day 20 of year 25.
    DateRule::Format("%B %d %Y"),
];

/// Longest input examined by the whole-text rules.
const MAX_DATE_TEXT: usize = 40;

static ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d)(?:st|nd|rd|th)\b").expect("static regex"));

/// AP-style "Sept." is not a `%b` abbreviation.
static SEPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsept\b").expect("static regex"));

const MONTH: &str = r"(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

static MONTH_NAME_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b{MONTH}\.?\s+\d{{1,2}},?\s*\d{{4}}\b")).expect("static regex")
});

static DAY_MONTH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b\d{{1,2}}\s+{MONTH}\s+\d{{4}}\b")).expect("static regex")
});

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}").expect("static regex"));

static URL_DASHED_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[-/](\d{2})[-/](\d{2})").expect("static regex"));

static URL_COMPACT_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)((?:19|20)\d{2})(\d{2})(\d{2})(?:\D|$)").expect("static regex"));

/// Parse free text believed to contain a date.
///
/// ```ignore
/// assert_eq!(parse_date("October 9th, 2025"), NaiveDate::from_ymd_opt(2025, 10, 9));
/// assert_eq!(parse_date("no date here"), None);
/// ```
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let cleaned = clean(text);
    if cleaned.is_empty() {
        return None;
    }
    if let Some(date) = apply_rules(&cleaned) {
        return Some(date);
    }
    [&*MONTH_NAME_DATE, &*DAY_MONTH_DATE, &*ISO_DATE]
        .into_iter()
        .filter_map(|re| re.find(&cleaned))
        .find_map(|m| apply_rules(m.as_str()))
}

/// Pull a date out of a URL path: `2025-10-09`, `2025/10/09` or `20251009`.
pub fn date_from_url(url: &str) -> Option<NaiveDate> {
    [&*URL_DASHED_DATE, &*URL_COMPACT_DATE]
        .into_iter()
        .filter_map(|re| re.captures(url))
        .find_map(|caps| {
            let year = caps.get(1)?.as_str().parse().ok()?;
            let month = caps.get(2)?.as_str().parse().ok()?;
            let day = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
}

fn clean(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    let no_ordinals = ORDINAL.replace_all(&collapsed, "$1");
    SEPT.replace_all(&no_ordinals, "Sep").into_owned()
}

fn apply_rules(text: &str) -> Option<NaiveDate> {
    if text.chars().count() > MAX_DATE_TEXT {
        return None;
    }
    RULES.iter().find_map(|rule| rule.apply(text))
}
