//! The persistent speech corpus.
//!
//! On disk the corpus is one JSON document: an object mapping speaker id (or
//! `"unknown"`) to that speaker's entries in ingestion order. It is loaded
//! once per run and rewritten in full after every append, through a
//! temporary file renamed into place so readers never see a partial write.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::models::CorpusEntry;
use crate::speakers::UNKNOWN_SPEAKER;
use crate::utils::url_hash;

pub type Corpus = BTreeMap<String, Vec<CorpusEntry>>;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corpus at {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct CorpusStore {
    path: PathBuf,
    corpus: Corpus,
    urls: HashSet<String>,
    hashes: HashSet<String>,
}

impl CorpusStore {
    /// Load the corpus at `path` and index its URLs and fingerprints.
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the JSON corpus file
    ///
    /// # Returns
    ///
    /// The store. A missing or empty file is an empty corpus; unreadable or
    /// malformed JSON is a [`CorpusError`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = CorpusStore::load("corpus.json").await?;
    /// info!(speeches = store.len(), "Loaded");
    /// ```
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref().to_path_buf();
        let corpus: Corpus = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => Corpus::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| CorpusError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No existing corpus; starting empty");
                Corpus::new()
            }
            Err(source) => return Err(CorpusError::Io { path, source }),
        };

        let mut store = Self {
            path,
            corpus: Corpus::new(),
            urls: HashSet::new(),
            hashes: HashSet::new(),
        };
        for entry in corpus.values().flatten() {
            store.index(entry);
        }
        store.corpus = corpus;
        info!(
            speeches = store.len(),
            speakers = store.corpus.len(),
            "Loaded corpus"
        );
        Ok(store)
    }

    fn index(&mut self, entry: &CorpusEntry) {
        self.urls.insert(entry.url.clone());
        self.hashes.insert(url_hash(&entry.url));
        if !entry.url_hash.is_empty() {
            self.hashes.insert(entry.url_hash.clone());
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Total number of entries across all speakers.
    pub fn len(&self) -> usize {
        self.corpus.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a speech at `url` has already been ingested.
    ///
    /// Matches the exact URL or its [`url_hash`] fingerprint, so entries that
    /// only carry a stored hash still count.
    pub fn is_duplicate(&self, url: &str) -> bool {
        self.urls.contains(url) || self.hashes.contains(&url_hash(url))
    }

    /// Date of the most recent speech in the corpus.
    pub fn newest_date(&self) -> Option<NaiveDate> {
        self.corpus.values().flatten().map(|e| e.date).max()
    }

    /// Append `entry` to a speaker's bucket. The in-memory indices are
    /// updated at once; the file is not touched until [`persist`](Self::persist).
    ///
    /// # Arguments
    ///
    /// * `speaker_id` - Canonical speaker id, or `None` for the `"unknown"` bucket
    /// * `entry` - The scored speech
    pub fn append(&mut self, speaker_id: Option<&str>, entry: CorpusEntry) {
        let bucket = speaker_id.unwrap_or(UNKNOWN_SPEAKER).to_string();
        self.index(&entry);
        debug!(%bucket, url = %entry.url, "Appending corpus entry");
        self.corpus.entry(bucket).or_default().push(entry);
    }

    /// Write the full corpus to disk.
    ///
    /// The JSON goes to `<path>.tmp` first and is renamed over `path`, so a
    /// crash mid-write leaves the previous corpus intact. Missing parent
    /// directories are created.
    ///
    /// # Returns
    ///
    /// `Ok(())` on success, or a [`CorpusError`] describing the failed write.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    pub async fn persist(&self) -> Result<(), CorpusError> {
        let io_err = |source: std::io::Error| CorpusError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(&self.corpus).map_err(|source| CorpusError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        debug!(speeches = self.len(), "Persisted corpus");
        Ok(())
    }
}

/// Lookback window in days: at least `min_days`, and long enough to reach
/// back to the newest ingested speech (`today - newest + 1`).
pub fn effective_lookback(newest: Option<NaiveDate>, today: NaiveDate, min_days: i64) -> i64 {
    match newest {
        Some(newest) => ((today - newest).num_days() + 1).max(min_days),
        None => min_days,
    }
}

/// Oldest date still inside a lookback window of `days`.
pub fn lookback_cutoff(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days)
}
