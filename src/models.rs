//! Data models for discovered speeches, tone scores and corpus entries.
//!
//! - [`SpeechCandidate`]: a speech found on a listing page, not yet checked
//!   against the corpus
//! - [`ScoreResult`]: validated output of the classification call
//! - [`CorpusEntry`]: one persisted, scored speech
//!
//! Field names of [`CorpusEntry`] are the on-disk corpus format read by the
//! tone dashboard.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::utils::{truncate_chars, url_hash};

/// Characters of speech text kept in the corpus.
pub const STORED_TEXT_CHARS: usize = 800;

/// A speech discovered by a site adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechCandidate {
    /// Id of the source that produced it.
    pub source: String,
    pub speaker_id: Option<String>,
    pub title: String,
    pub date: NaiveDate,
    pub venue: String,
    /// Absolute URL of the speech page.
    pub url: String,
}

/// Policy lean of a signal phrase.
///
/// Serialises as `hawk`, `dove` or `neutral`. Deserialisation accepts any
/// label (see [`Polarity::from_label`]), so stored model output with labels
/// such as `"Hawkish"` still loads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Hawk,
    Dove,
    #[default]
    Neutral,
}

impl Polarity {
    /// Map a model-supplied label onto a polarity. Anything unrecognised is
    /// neutral.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "hawk" | "hawkish" => Polarity::Hawk,
            "dove" | "dovish" => Polarity::Dove,
            _ => Polarity::Neutral,
        }
    }
}

impl<'de> Deserialize<'de> for Polarity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(Polarity::from_label(label.as_deref().unwrap_or_default()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Keyword {
    #[serde(default)]
    pub word: String,
    #[serde(rename = "type", default)]
    pub polarity: Polarity,
}

impl Keyword {
    /// Read one keyword from loosely shaped model output.
    ///
    /// # Arguments
    ///
    /// * `value` - Either an object with a string `word` (and optional `type`
    ///   label) or a bare string, which becomes a neutral keyword.
    ///
    /// # Returns
    ///
    /// `None` for any other shape and for blank words.
    pub fn from_value(value: &Value) -> Option<Self> {
        let keyword = match value {
            Value::String(word) => Keyword {
                word: word.trim().to_string(),
                polarity: Polarity::Neutral,
            },
            Value::Object(map) => Keyword {
                word: map.get("word")?.as_str()?.trim().to_string(),
                polarity: Polarity::from_label(map.get("type").and_then(Value::as_str).unwrap_or_default()),
            },
            _ => return None,
        };
        (!keyword.word.is_empty()).then_some(keyword)
    }
}

/// Every usable keyword in `value` when it is an array; nothing otherwise.
pub fn keywords_from_value(value: Option<&Value>) -> Vec<Keyword> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(Keyword::from_value).collect(),
        _ => Vec::new(),
    }
}

fn lenient_keywords<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Keyword>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(keywords_from_value(value.as_ref()))
}

/// Validated tone score for one speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreResult {
    pub stance: i32,
    pub balance: i32,
    pub direction: i32,
    pub composite: i32,
    pub reason: String,
    pub keywords: Vec<Keyword>,
    pub model: String,
}

/// Weighted composite of the three sub-scores (0.30 / 0.35 / 0.35), rounded
/// half away from zero. Computed in hundredths so halves are exact.
pub fn composite_score(stance: i32, balance: i32, direction: i32) -> i32 {
    let hundredths = 30 * i64::from(stance) + 35 * i64::from(balance) + 35 * i64::from(direction);
    let rounded = if hundredths >= 0 {
        (hundredths + 50) / 100
    } else {
        -((-hundredths + 50) / 100)
    };
    rounded as i32
}

/// One scored speech as stored in the corpus.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CorpusEntry {
    pub date: NaiveDate,
    pub title: String,
    #[serde(default)]
    pub venue: String,
    pub url: String,
    #[serde(default)]
    pub url_hash: String,
    #[serde(default)]
    pub source: String,
    /// Leading excerpt of the extracted speech text.
    #[serde(default)]
    pub text: String,
    /// Composite score.
    #[serde(rename = "score")]
    pub composite: i32,
    pub stance: i32,
    pub balance: i32,
    pub direction: i32,
    #[serde(default)]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient_keywords")]
    pub keywords: Vec<Keyword>,
    #[serde(default)]
    pub model: String,
    /// Ingestion time, UTC.
    pub scraped_at: NaiveDateTime,
}

impl CorpusEntry {
    pub fn new(
        candidate: &SpeechCandidate,
        text: &str,
        score: ScoreResult,
        scraped_at: NaiveDateTime,
    ) -> Self {
        Self {
            date: candidate.date,
            title: candidate.title.clone(),
            venue: candidate.venue.clone(),
            url: candidate.url.clone(),
            url_hash: url_hash(&candidate.url),
            source: candidate.source.clone(),
            text: truncate_chars(text, STORED_TEXT_CHARS),
            composite: score.composite,
            stance: score.stance,
            balance: score.balance,
            direction: score.direction,
            reason: score.reason,
            keywords: score.keywords,
            model: score.model,
            scraped_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> SpeechCandidate {
        SpeechCandidate {
            source: "fed_board".to_string(),
            speaker_id: Some("waller".to_string()),
            title: "Economic Outlook".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 10, 9).unwrap(),
            venue: String::new(),
            url: "https://www.federalreserve.gov/newsevents/speech/waller20251009a.htm".to_string(),
        }
    }

    fn score() -> ScoreResult {
        ScoreResult {
            stance: 20,
            balance: -30,
            direction: -40,
            composite: composite_score(20, -30, -40),
            reason: "Leans toward further cuts.".to_string(),
            keywords: vec![Keyword {
                word: "gradual cuts".to_string(),
                polarity: Polarity::Dove,
            }],
            model: "test-model".to_string(),
        }
    }

    #[test]
    fn test_composite_score_weights() {
        assert_eq!(composite_score(0, 0, 0), 0);
        assert_eq!(composite_score(100, 100, 100), 100);
        assert_eq!(composite_score(-100, -100, -100), -100);
        // 6 - 10.5 - 14 = -18.5 -> -19
        assert_eq!(composite_score(20, -30, -40), -19);
        // 0.3 + 0.35 + 0 = 0.65 -> 1
        assert_eq!(composite_score(1, 1, 0), 1);
        // 15 + 14 + 0 = 29
        assert_eq!(composite_score(50, 40, 0), 29);
    }

    #[test]
    fn test_polarity_from_label() {
        assert_eq!(Polarity::from_label("hawk"), Polarity::Hawk);
        assert_eq!(Polarity::from_label(" Dovish "), Polarity::Dove);
        assert_eq!(Polarity::from_label("neutral"), Polarity::Neutral);
        assert_eq!(Polarity::from_label("hawk|dove"), Polarity::Neutral);
    }

    #[test]
    fn test_entry_from_candidate() {
        let long_text = "x".repeat(1500);
        let at = NaiveDate::from_ymd_opt(2025, 10, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let entry = CorpusEntry::new(&candidate(), &long_text, score(), at);
        assert_eq!(entry.text.chars().count(), STORED_TEXT_CHARS);
        assert_eq!(entry.url_hash, url_hash(&entry.url));
        assert_eq!(entry.composite, -19);
        assert_eq!(entry.source, "fed_board");
    }

    #[test]
    fn test_entry_serializes_with_corpus_field_names() {
        let at = NaiveDate::from_ymd_opt(2025, 10, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let entry = CorpusEntry::new(&candidate(), "text", score(), at);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["score"], -19);
        assert_eq!(json["date"], "2025-10-09");
        assert_eq!(json["keywords"][0]["type"], "dove");
        assert_eq!(json["scraped_at"], "2025-10-10T12:00:00");
        assert!(json.get("composite").is_none());
    }

    #[test]
    fn test_entry_reads_fractional_second_timestamps() {
        let json = r#"{
            "date": "2025-09-30",
            "title": "Remarks",
            "url": "https://example.org/speech",
            "score": 12,
            "stance": 10,
            "balance": 10,
            "direction": 15,
            "scraped_at": "2025-10-01T06:12:44.123456"
        }"#;
        let entry: CorpusEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.composite, 12);
        assert!(entry.url_hash.is_empty());
        assert!(entry.keywords.is_empty());
    }

    #[test]
    fn test_polarity_deserialises_any_label() {
        let labels: Vec<Polarity> =
            serde_json::from_str(r#"["hawk", "Hawkish", "DOVE", "hawk|dove", null]"#).unwrap();
        assert_eq!(
            labels,
            vec![Polarity::Hawk, Polarity::Hawk, Polarity::Dove, Polarity::Neutral, Polarity::Neutral]
        );
    }

    #[test]
    fn test_keyword_with_missing_fields() {
        let keyword: Keyword = serde_json::from_str(r#"{"type": "Dovish"}"#).unwrap();
        assert_eq!(keyword.word, "");
        assert_eq!(keyword.polarity, Polarity::Dove);
    }

    #[test]
    fn test_entry_reads_loosely_shaped_keywords() {
        let entry = |keywords: &str| -> CorpusEntry {
            let json = format!(
                r#"{{"date": "2025-09-30", "title": "Remarks", "url": "https://example.org/speech",
                    "score": 12, "stance": 10, "balance": 10, "direction": 15,
                    "scraped_at": "2025-10-01T06:12:44", "keywords": {keywords}}}"#
            );
            serde_json::from_str(&json).unwrap()
        };

        let mixed = entry(r#"[{"word": "patience", "type": "Hawkish"}, "data dependent", {"type": "dove"}, 7]"#);
        assert_eq!(
            mixed.keywords,
            vec![
                Keyword { word: "patience".into(), polarity: Polarity::Hawk },
                Keyword { word: "data dependent".into(), polarity: Polarity::Neutral },
            ]
        );
        assert!(entry("null").keywords.is_empty());
        assert!(entry(r#""hawk""#).keywords.is_empty());
    }
}
