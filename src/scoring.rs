//! Policy-tone scoring of speech excerpts.
//!
//! [`ScoringClient`] builds the scoring prompt, calls a [`Classifier`], and
//! validates the reply. Service errors and unusable replies are retried in a
//! bounded loop with exponential backoff and jitter:
//!
//! ```text
//! delay(retry) = base_delay * 2^retry + random_jitter(0..=max_jitter)
//! ```
//!
//! With the default three attempts and a one-second base that is 2s then 4s.
//! Exhausting the attempts yields `None`; the caller skips the speech.

use rand::{Rng, rng};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::{ClassifyError, Classifier};
use crate::config::{RetryConfig, ScoringConfig};
use crate::models::{Keyword, ScoreResult, composite_score, keywords_from_value};
use crate::utils::{looks_truncated, strip_code_fences, truncate_chars, truncate_for_log};

/// Texts shorter than this are not worth scoring.
pub const MIN_SCORABLE_CHARS: usize = 50;

/// Characters of speech text embedded in the prompt.
pub const PROMPT_TEXT_CHARS: usize = 1400;

const SCORE_BOUND: i32 = 100;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field {0:?} is missing or not numeric")]
    Field(&'static str),
}

/// The three prompt anchors derived from the configured rates.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyBackdrop {
    pub midpoint: f64,
    pub spread_bps: f64,
    pub characterization: &'static str,
}

impl PolicyBackdrop {
    pub fn from_config(scoring: &ScoringConfig) -> Self {
        let midpoint = (scoring.policy_rate_low + scoring.policy_rate_high) / 2.0;
        let spread_bps = (midpoint - scoring.neutral_rate) * 100.0;
        let characterization = match spread_bps {
            s if s >= 200.0 => "significantly restrictive",
            s if s >= 75.0 => "moderately restrictive",
            s if s >= 25.0 => "modestly restrictive",
            s if s > -25.0 => "near neutral",
            _ => "accommodative",
        };
        Self {
            midpoint,
            spread_bps,
            characterization,
        }
    }
}

/// Build the scoring prompt for one speech.
pub fn build_prompt(scoring: &ScoringConfig, speaker_name: &str, text: &str) -> String {
    let backdrop = PolicyBackdrop::from_config(scoring);
    let framework = &scoring.framework;
    let neutral = scoring.neutral_rate;
    let low = scoring.policy_rate_low;
    let high = scoring.policy_rate_high;
    let midpoint = backdrop.midpoint;
    let spread = backdrop.spread_bps;
    let characterization = backdrop.characterization;
    let excerpt = truncate_chars(text, PROMPT_TEXT_CHARS);

    format!(
        r#"You are a quantitative Fed policy analyst. Score this FOMC speech on three components anchored to the {framework} framework.

NEUTRAL RATE FRAMEWORK:
- Estimated neutral rate: {neutral:.2}% ({framework} median)
- Current fed funds rate: {low:.2}-{high:.2}% (midpoint {midpoint:.3}%)
- Policy is {spread:+.1}bps relative to neutral = {characterization}
- Speaker: {speaker_name}

SCORE THREE COMPONENTS (-100 to +100, positive = hawkish):

STANCE_SCORE — How does speaker characterize policy restrictiveness?
  "Significantly/substantially restrictive" → -60 to -80
  "Moderately restrictive" → -30 to -50
  "Modestly restrictive" → -10 to -25
  "Appropriate / near neutral" → 0 to +20
  "Not restrictive / need to hold" → +30 to +70

BALANCE_SCORE — Primary risk emphasis?
  Inflation dominates → +40 to +75
  More inflation than labor → +15 to +40
  Balanced → -10 to +15
  More labor/growth concern → -15 to -40
  Employment risk dominates → -40 to -75

DIRECTION_SCORE — Rate path signal?
  Explicit hold or hike preference → +40 to +75
  Patience, lean hold → +15 to +40
  Data dependent, balanced → -10 to +15
  Lean toward gradual cuts → -15 to -40
  Explicit cut preference → -40 to -75

COMPOSITE = round(0.30 × stance + 0.35 × balance + 0.35 × direction)

Extract 3-4 key signal phrases, label each hawk/dove/neutral.
One sentence rationale referencing the neutral rate framework.

Return ONLY valid JSON, no markdown:
{{"stance":int,"balance":int,"direction":int,"composite":int,"reason":"string","keywords":[{{"word":"string","type":"hawk|dove|neutral"}}]}}

SPEECH TEXT:
{excerpt}"#
    )
}

#[derive(Debug, Deserialize)]
struct RawScore {
    stance: Option<Value>,
    balance: Option<Value>,
    direction: Option<Value>,
    composite: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
    /// Shape is not enforced; see [`keywords_from_value`].
    #[serde(default)]
    keywords: Option<Value>,
}

/// Numbers and numeric strings are accepted; fractions are rounded and the
/// result clamped to ±100.
fn sub_score(value: Option<&Value>, field: &'static str) -> Result<i32, ScoreError> {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_start_matches('+').parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or(ScoreError::Field(field))?;

    let rounded = number.round().clamp(f64::from(-SCORE_BOUND), f64::from(SCORE_BOUND)) as i32;
    if f64::from(rounded) != number.round() {
        warn!(field, value = number, "Sub-score out of range; clamped");
    }
    Ok(rounded)
}

/// Parse and validate a classification reply.
///
/// # Arguments
///
/// * `raw` - The model's reply, optionally wrapped in a Markdown code fence
/// * `model` - Model identity recorded on the result
///
/// # Returns
///
/// A [`ScoreResult`] whose composite is recomputed from the clamped
/// sub-scores. Fails only when the reply is not JSON or a sub-score is
/// missing or non-numeric; a malformed keyword list is tolerated.
pub fn parse_score(raw: &str, model: &str) -> Result<ScoreResult, ScoreError> {
    let parsed: RawScore = serde_json::from_str(strip_code_fences(raw))?;

    let stance = sub_score(parsed.stance.as_ref(), "stance")?;
    let balance = sub_score(parsed.balance.as_ref(), "balance")?;
    let direction = sub_score(parsed.direction.as_ref(), "direction")?;
    let composite = composite_score(stance, balance, direction);

    if let Ok(reported) = sub_score(parsed.composite.as_ref(), "composite") {
        if (reported - composite).abs() > 1 {
            debug!(reported, composite, "Model composite disagrees; using recomputed value");
        }
    }

    let mut keywords: Vec<Keyword> = Vec::new();
    for keyword in keywords_from_value(parsed.keywords.as_ref()) {
        if !keywords.iter().any(|k| k.word.eq_ignore_ascii_case(&keyword.word)) {
            keywords.push(keyword);
        }
    }

    Ok(ScoreResult {
        stance,
        balance,
        direction,
        composite,
        reason: parsed.reason.unwrap_or_default().trim().to_string(),
        keywords,
        model: model.to_string(),
    })
}

/// Delay before retry number `retry` (1-based).
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(1u32 << retry.min(16))
}

pub struct ScoringClient<C> {
    classifier: C,
    scoring: ScoringConfig,
    retry: RetryConfig,
}

impl<C: Classifier> ScoringClient<C> {
    pub fn new(classifier: C, scoring: ScoringConfig, retry: RetryConfig) -> Self {
        Self {
            classifier,
            scoring,
            retry,
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    fn jitter(&self) -> Duration {
        if self.retry.max_jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng().random_range(0..=self.retry.max_jitter_ms))
    }

    /// Score a speech excerpt.
    ///
    /// Texts under [`MIN_SCORABLE_CHARS`] are rejected without a service
    /// call. Otherwise up to `retry.max_attempts` attempts are made; a service
    /// error or an unusable reply triggers the next attempt after
    /// [`backoff_delay`] plus jitter.
    ///
    /// # Arguments
    ///
    /// * `speaker_name` - Display name quoted in the prompt
    /// * `text` - Extracted speech text; only the first [`PROMPT_TEXT_CHARS`] are sent
    ///
    /// # Returns
    ///
    /// The validated score, or `None` when the text is too short or every
    /// attempt failed.
    #[instrument(level = "info", skip_all, fields(speaker = %speaker_name))]
    pub async fn score(&self, speaker_name: &str, text: &str) -> Option<ScoreResult> {
        let chars = text.chars().count();
        if chars < MIN_SCORABLE_CHARS {
            debug!(chars, "Text too short to score");
            return None;
        }

        let prompt = build_prompt(&self.scoring, speaker_name, text);
        let max_attempts = self.retry.max_attempts.max(1);
        let base_delay = Duration::from_millis(self.retry.base_delay_ms);
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            if attempt > 0 {
                let delay = backoff_delay(base_delay, attempt as u32) + self.jitter();
                debug!(attempt, ?delay, "Backing off before retry");
                sleep(delay).await;
            }
            attempt += 1;

            let result = match self.classifier.classify(&prompt).await {
                Ok(raw) => parse_score(&raw, self.classifier.model()).map_err(|e| (e, Some(raw))),
                Err(e) => Err((e.into(), None)),
            };

            match result {
                Ok(score) => {
                    info!(
                        attempt,
                        composite = score.composite,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        "Scored speech"
                    );
                    return Some(score);
                }
                Err((e, raw)) => {
                    let truncated = matches!(&e, ScoreError::Json(je) if looks_truncated(je));
                    warn!(
                        attempt,
                        max = max_attempts,
                        truncated,
                        error = %e,
                        response_preview = %raw.as_deref().map(|r| truncate_for_log(r, 300)).unwrap_or_default(),
                        "Score attempt failed"
                    );
                    if attempt >= max_attempts {
                        error!(
                            attempts = attempt,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            "Scoring exhausted retries"
                        );
                        return None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::fake::ScriptedClassifier;
    use crate::config::Config;
    use crate::models::Polarity;

    const GOOD: &str = r#"{"stance": 20, "balance": -30, "direction": -40, "composite": -19,
        "reason": "Sees room for gradual cuts as policy remains restrictive.",
        "keywords": [{"word": "gradual cuts", "type": "dove"}, {"word": "inflation persistent", "type": "hawk"}]}"#;

    fn speech() -> String {
        "Inflation has come down substantially while the labor market has cooled. ".repeat(5)
    }

    fn client(classifier: ScriptedClassifier) -> ScoringClient<ScriptedClassifier> {
        let config = Config::builtin().unwrap();
        ScoringClient::new(
            classifier,
            config.scoring,
            RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1000,
                max_jitter_ms: 0,
            },
        )
    }

    #[test]
    fn test_parse_score_recomputes_composite() {
        let raw = r#"{"stance": 20, "balance": -30, "direction": -40, "composite": 55, "reason": "x", "keywords": []}"#;
        let score = parse_score(raw, "m").unwrap();
        assert_eq!(score.composite, -19);
        assert_eq!(score.model, "m");
    }

    #[test]
    fn test_parse_score_coerces_and_clamps() {
        let raw = r#"{"stance": "35", "balance": 12.6, "direction": 250, "reason": "x"}"#;
        let score = parse_score(raw, "m").unwrap();
        assert_eq!((score.stance, score.balance, score.direction), (35, 13, 100));
        assert_eq!(score.composite, composite_score(35, 13, 100));
        assert!(score.keywords.is_empty());
    }

    #[test]
    fn test_parse_score_requires_numeric_sub_scores() {
        assert!(matches!(
            parse_score(r#"{"stance": 1, "balance": 2}"#, "m"),
            Err(ScoreError::Field("direction"))
        ));
        assert!(matches!(
            parse_score(r#"{"stance": "high", "balance": 2, "direction": 3}"#, "m"),
            Err(ScoreError::Field("stance"))
        ));
        assert!(matches!(parse_score("I cannot score this.", "m"), Err(ScoreError::Json(_))));
    }

    #[test]
    fn test_parse_score_normalises_keywords() {
        let raw = r#"{"stance": 0, "balance": 0, "direction": 0, "keywords": [
            {"word": "Patient", "type": "HAWK"},
            {"word": "patient", "type": "hawk"},
            {"word": "", "type": "dove"},
            {"word": "data dependent", "type": "balanced"}
        ]}"#;
        let score = parse_score(raw, "m").unwrap();
        assert_eq!(
            score.keywords,
            vec![
                Keyword { word: "Patient".into(), polarity: Polarity::Hawk },
                Keyword { word: "data dependent".into(), polarity: Polarity::Neutral },
            ]
        );
    }

    #[test]
    fn test_malformed_keywords_do_not_reject_the_score() {
        let null = parse_score(r#"{"stance": 20, "balance": -30, "direction": -40, "keywords": null}"#, "m").unwrap();
        assert_eq!(null.composite, -19);
        assert!(null.keywords.is_empty());

        let bare = parse_score(
            r#"{"stance": 0, "balance": 0, "direction": 0, "keywords": ["patience", "Patience", {"word": "cuts", "type": "dove"}]}"#,
            "m",
        )
        .unwrap();
        assert_eq!(
            bare.keywords,
            vec![
                Keyword { word: "patience".into(), polarity: Polarity::Neutral },
                Keyword { word: "cuts".into(), polarity: Polarity::Dove },
            ]
        );

        let object = parse_score(r#"{"stance": 1, "balance": 1, "direction": 1, "keywords": {"word": "x"}}"#, "m").unwrap();
        assert!(object.keywords.is_empty());
    }

    #[test]
    fn test_prompt_embeds_anchors_speaker_and_capped_text() {
        let config = Config::builtin().unwrap();
        let text = format!("{}{}", "a".repeat(PROMPT_TEXT_CHARS), "OVERFLOW");
        let prompt = build_prompt(&config.scoring, "Christopher Waller", &text);
        assert!(prompt.contains("Speaker: Christopher Waller"));
        assert!(prompt.contains("Estimated neutral rate: 3.00%"));
        assert!(prompt.contains("4.25-4.50%"));
        assert!(prompt.contains("+137.5bps"));
        assert!(prompt.contains("moderately restrictive"));
        assert!(prompt.contains(r#"{"stance":int"#));
        assert!(!prompt.contains("OVERFLOW"));
    }

    #[test]
    fn test_policy_backdrop_labels() {
        let mut scoring = Config::builtin().unwrap().scoring;
        scoring.policy_rate_low = 3.0;
        scoring.policy_rate_high = 3.25;
        let backdrop = PolicyBackdrop::from_config(&scoring);
        assert_eq!(backdrop.characterization, "near neutral");
        assert!((backdrop.spread_bps - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_fenced_reply_is_accepted() {
        let client = client(ScriptedClassifier::default().reply(&format!("```json\n{GOOD}\n```")));
        let score = client.score("Christopher Waller", &speech()).await.unwrap();
        assert_eq!(score.composite, -19);
        assert_eq!(score.keywords.len(), 2);
        assert_eq!(score.model, "scripted-model");
        assert_eq!(client.classifier().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success() {
        let client = client(
            ScriptedClassifier::default()
                .fail()
                .reply("not json at all")
                .reply(GOOD),
        );
        let t0 = Instant::now();
        let score = client.score("Unknown FOMC Official", &speech()).await;
        assert_eq!(score.map(|s| s.composite), Some(-19));
        assert_eq!(client.classifier().calls(), 3);
        // 2s before the second attempt, 4s before the third.
        assert_eq!(t0.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let client = client(
            ScriptedClassifier::default()
                .fail()
                .fail()
                .fail()
                .reply(GOOD),
        );
        assert!(client.score("Jerome Powell", &speech()).await.is_none());
        assert_eq!(client.classifier().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_text_is_never_sent() {
        let client = client(ScriptedClassifier::default().reply(GOOD));
        let text = "x".repeat(40);
        assert!(client.score("Jerome Powell", &text).await.is_none());
        assert_eq!(client.classifier().calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_names_speaker() {
        let client = client(ScriptedClassifier::default().reply(GOOD));
        client.score("Lorie Logan", &speech()).await.unwrap();
        assert!(client.classifier().prompts()[0].contains("Speaker: Lorie Logan"));
    }
}
