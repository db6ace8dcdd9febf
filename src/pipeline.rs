//! One ingestion run: load → discover → filter → extract/score → commit.
//!
//! Strictly sequential. A short pause follows each source's discovery and
//! each committed entry so neither the sites nor the classification service
//! see bursts. Every failure below the run level is a skip.

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::classifier::Classifier;
use crate::corpus::{CorpusStore, effective_lookback, lookback_cutoff};
use crate::extract::fetch_speech_text;
use crate::http::Fetcher;
use crate::models::{CorpusEntry, SpeechCandidate};
use crate::scoring::ScoringClient;
use crate::scrapers::{DiscoverContext, SiteAdapter};
use crate::speakers::{SpeakerResolver, UNKNOWN_SPEAKER};
use crate::utils::truncate_chars;

/// Observable outcome of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Candidates discovered across all sources.
    pub found: usize,
    /// Candidates not already in the corpus.
    pub new: usize,
    /// Candidates scored and appended.
    pub scored: usize,
    pub no_text: usize,
    pub score_failed: usize,
    pub persist_failed: usize,
}

pub struct Pipeline<F, C> {
    pub fetcher: F,
    pub scorer: ScoringClient<C>,
    pub adapters: Vec<SiteAdapter>,
    pub speakers: SpeakerResolver,
    /// Minimum lookback window, in days.
    pub min_lookback_days: i64,
    pub source_pause: Duration,
    pub commit_pause: Duration,
}

impl<F: Fetcher, C: Classifier> Pipeline<F, C> {
    /// Run every phase once against `store`, treating `today` as the current
    /// date.
    #[instrument(level = "info", skip_all, fields(%today))]
    pub async fn run(&self, store: &mut CorpusStore, today: NaiveDate) -> RunSummary {
        let mut summary = RunSummary::default();

        let lookback = effective_lookback(store.newest_date(), today, self.min_lookback_days);
        let cutoff = lookback_cutoff(today, lookback);
        info!(
            existing = store.len(),
            lookback_days = lookback,
            %cutoff,
            "Starting run"
        );

        let candidates = self.discover(cutoff).await;
        summary.found = candidates.len();
        info!(found = summary.found, "Discovery complete");

        for candidate in candidates {
            if store.is_duplicate(&candidate.url) {
                continue;
            }
            summary.new += 1;
            self.ingest(store, candidate, &mut summary).await;
        }

        info!(
            found = summary.found,
            new = summary.new,
            scored = summary.scored,
            no_text = summary.no_text,
            score_failed = summary.score_failed,
            persist_failed = summary.persist_failed,
            corpus_speeches = store.len(),
            corpus_speakers = store.corpus().len(),
            "Run complete"
        );
        summary
    }

    async fn discover(&self, cutoff: NaiveDate) -> Vec<SpeechCandidate> {
        let ctx = DiscoverContext {
            cutoff,
            speakers: &self.speakers,
        };
        stream::iter(&self.adapters)
            .then(|adapter| async move {
                let found = adapter.scrape(&self.fetcher, ctx).await;
                sleep(self.source_pause).await;
                found
            })
            .concat()
            .await
    }

    #[instrument(level = "info", skip_all, fields(url = %candidate.url))]
    async fn ingest(&self, store: &mut CorpusStore, candidate: SpeechCandidate, summary: &mut RunSummary) {
        let speaker = candidate.speaker_id.as_deref();
        info!(
            date = %candidate.date,
            speaker = speaker.unwrap_or(UNKNOWN_SPEAKER),
            title = %truncate_chars(&candidate.title, 60),
            "New speech"
        );

        let text = fetch_speech_text(&self.fetcher, &candidate.url).await;
        if text.is_empty() {
            warn!("No text; skipping");
            summary.no_text += 1;
            return;
        }

        let speaker_name = self.speakers.display_name(speaker);
        let Some(score) = self.scorer.score(&speaker_name, &text).await else {
            warn!("Scoring failed; skipping");
            summary.score_failed += 1;
            return;
        };
        info!(
            composite = score.composite,
            reason = %truncate_chars(&score.reason, 80),
            "Scored"
        );

        let entry = CorpusEntry::new(&candidate, &text, score, Utc::now().naive_utc());
        store.append(speaker, entry);
        summary.scored += 1;
        if let Err(e) = store.persist().await {
            error!(error = %e, "Failed to persist corpus");
            summary.persist_failed += 1;
        }
        sleep(self.commit_pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::fake::ScriptedClassifier;
    use crate::config::{Config, RetryConfig, SourceConfig, SourceKind};
    use crate::http::fake::FakeFetcher;

    const BOSTON: &str = "https://www.bostonfed.org/news-and-events/speeches.aspx";
    const SCORE: &str = r#"{"stance": 10, "balance": 20, "direction": 30, "composite": 21, "reason": "Leans hold.", "keywords": [{"word": "patience", "type": "hawk"}]}"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 16).unwrap()
    }

    fn listing() -> String {
        r#"<html><body>
            <div class="speech-item"><span class="date">October 14, 2025</span>
                <a href="/speeches/2025/collins-outlook">Susan Collins: Economic Outlook</a></div>
            <div class="speech-item"><span class="date">October 13, 2025</span>
                <a href="/speeches/2025/forum">Welcoming Remarks at the Annual Forum</a></div>
            <div class="speech-item"><span class="date">October 12, 2025</span>
                <a href="/speeches/2025/short">A Brief Note</a></div>
            <div class="speech-item"><span class="date">January 2, 2024</span>
                <a href="/speeches/2024/old">An Old Speech</a></div>
        </body></html>"#
            .to_string()
    }

    fn speech_page(words: &str) -> String {
        format!("<html><body><nav>Menu</nav><article>{}</article></body></html>", words.repeat(20))
    }

    fn fetcher() -> FakeFetcher {
        FakeFetcher::default()
            .with_page(BOSTON, &listing())
            .with_page(
                "https://www.bostonfed.org/speeches/2025/collins-outlook",
                &speech_page("Inflation remains elevated and policy is modestly restrictive. "),
            )
            .with_page(
                "https://www.bostonfed.org/speeches/2025/forum",
                &speech_page("Welcome to the forum. "),
            )
            .with_page(
                "https://www.bostonfed.org/speeches/2025/short",
                "<html><body><p>Forty characters of text, nothing else.</p></body></html>",
            )
    }

    fn pipeline(fetcher: FakeFetcher, classifier: ScriptedClassifier) -> Pipeline<FakeFetcher, ScriptedClassifier> {
        let config = Config::builtin().unwrap();
        let source = SourceConfig {
            id: "boston".to_string(),
            kind: SourceKind::Regional,
            url: BOSTON.to_string(),
            item_selectors: vec!["div.speech-item".to_string()],
            date_selectors: vec!["span.date".to_string()],
        };
        let unreachable = SourceConfig {
            id: "unreachable".to_string(),
            kind: SourceKind::Regional,
            url: "https://down.example.org/speeches".to_string(),
            item_selectors: vec![],
            date_selectors: vec![],
        };
        Pipeline {
            fetcher,
            scorer: ScoringClient::new(
                classifier,
                config.scoring,
                RetryConfig {
                    max_attempts: 3,
                    base_delay_ms: 0,
                    max_jitter_ms: 0,
                },
            ),
            adapters: vec![
                SiteAdapter::from_config(&unreachable).unwrap(),
                SiteAdapter::from_config(&source).unwrap(),
            ],
            speakers: SpeakerResolver::new(&config.speakers),
            min_lookback_days: 7,
            source_pause: Duration::ZERO,
            commit_pause: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_full_run_then_idempotent_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let classifier = ScriptedClassifier::default().reply(SCORE).reply(SCORE);
        let pipeline = pipeline(fetcher(), classifier);

        let mut store = CorpusStore::load(&path).await.unwrap();
        let first = pipeline.run(&mut store, today()).await;
        assert_eq!(first.found, 3);
        assert_eq!(first.new, 3);
        assert_eq!(first.scored, 2);
        assert_eq!(first.no_text, 0);
        assert_eq!(first.score_failed, 1);
        // The 40-character page never reaches the classifier.
        assert_eq!(pipeline.scorer.classifier().calls(), 2);

        let persisted = CorpusStore::load(&path).await.unwrap();
        assert_eq!(persisted.len(), 2);
        let collins = &persisted.corpus()["collins"][0];
        assert_eq!(collins.url, "https://www.bostonfed.org/speeches/2025/collins-outlook");
        assert_eq!(collins.composite, 21);
        assert_eq!(collins.source, "boston");
        assert_eq!(persisted.corpus()[UNKNOWN_SPEAKER].len(), 1);

        let mut store = persisted;
        let second = pipeline.run(&mut store, today()).await;
        assert_eq!(second.found, 3);
        assert_eq!(second.scored, 0);
        // Only the unscorable short speech is retried.
        assert_eq!(second.new, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(pipeline.scorer.classifier().calls(), 2);
    }

    #[tokio::test]
    async fn test_scoring_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let classifier = ScriptedClassifier::default().fail().fail().fail().fail().fail().fail();
        let pipeline = pipeline(fetcher(), classifier);

        let mut store = CorpusStore::load(&path).await.unwrap();
        let summary = pipeline.run(&mut store, today()).await;
        assert_eq!(summary.scored, 0);
        assert_eq!(summary.score_failed, 3);
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_speech_page_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default().with_page(BOSTON, &listing());
        let pipeline = pipeline(fetcher, ScriptedClassifier::default());

        let mut store = CorpusStore::load(dir.path().join("corpus.json")).await.unwrap();
        let summary = pipeline.run(&mut store, today()).await;
        assert_eq!(summary.new, 3);
        assert_eq!(summary.no_text, 3);
        assert_eq!(pipeline.scorer.classifier().calls(), 0);
    }

    #[tokio::test]
    async fn test_lookback_stretches_to_newest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let classifier = ScriptedClassifier::default().reply(SCORE).reply(SCORE);
        let pipeline = pipeline(fetcher(), classifier);

        // The pipeline's own run seeds the corpus with speeches up to Oct 14.
        let mut store = CorpusStore::load(&path).await.unwrap();
        pipeline.run(&mut store, today()).await;

        // Three weeks later the window reaches back past Oct 14 (cutoff Oct 13)
        // instead of only 7 days.
        let later = NaiveDate::from_ymd_opt(2025, 11, 6).unwrap();
        assert_eq!(effective_lookback(store.newest_date(), later, 7), 24);
        let summary = pipeline.run(&mut store, later).await;
        assert_eq!(summary.found, 2);
        assert_eq!(summary.new, 0);
    }

    #[tokio::test]
    async fn test_fetcher_sees_listing_before_speech_pages() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = ScriptedClassifier::default().reply(SCORE).reply(SCORE);
        let pipeline = pipeline(fetcher(), classifier);
        let mut store = CorpusStore::load(dir.path().join("corpus.json")).await.unwrap();
        pipeline.run(&mut store, today()).await;

        let requests = pipeline.fetcher.requests();
        assert_eq!(requests[0], "https://down.example.org/speeches");
        assert_eq!(requests[1], BOSTON);
        assert!(requests[2..].iter().all(|u| u.contains("/speeches/2025/")));
    }
}
