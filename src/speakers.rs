//! Speaker identity resolution from free text.
//!
//! The alias table is an immutable, ordered value built from configuration.
//! Matching is a case-insensitive substring search; the first speaker (in
//! table order) with any alias present in the text wins.

use crate::config::SpeakerConfig;
use crate::utils::title_case;

/// Corpus bucket for speeches whose speaker could not be resolved.
pub const UNKNOWN_SPEAKER: &str = "unknown";

/// Prompt label used when the speaker is unknown.
pub const UNKNOWN_SPEAKER_LABEL: &str = "Unknown FOMC Official";

#[derive(Debug, Clone)]
struct Speaker {
    id: String,
    display_name: String,
    /// Lower-cased.
    aliases: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpeakerResolver {
    speakers: Vec<Speaker>,
}

impl SpeakerResolver {
    pub fn new(table: &[SpeakerConfig]) -> Self {
        let speakers = table
            .iter()
            .map(|s| Speaker {
                id: s.id.clone(),
                display_name: s.name.clone().unwrap_or_else(|| title_case(&s.id)),
                aliases: s
                    .aliases
                    .iter()
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect(),
            })
            .collect();
        Self { speakers }
    }

    /// Resolve `text` to a canonical speaker id, or `None` when no alias
    /// occurs in it.
    pub fn resolve(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.speakers
            .iter()
            .find(|s| s.aliases.iter().any(|a| haystack.contains(a.as_str())))
            .map(|s| s.id.as_str())
    }

    /// Human-readable name for the prompt.
    pub fn display_name(&self, speaker_id: Option<&str>) -> String {
        match speaker_id {
            None => UNKNOWN_SPEAKER_LABEL.to_string(),
            Some(id) => self
                .speakers
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.display_name.clone())
                .unwrap_or_else(|| title_case(id)),
        }
    }
}
