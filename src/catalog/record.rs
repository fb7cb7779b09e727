//! Catalog record types persisted in the YAML index.

use serde::{Deserialize, Serialize};

/// Extra metadata kept alongside a registered voice print.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicePrintMetadata {
    pub gender: String,
    pub language: String,
    pub notes: String,
}

impl Default for VoicePrintMetadata {
    fn default() -> Self {
        Self {
            gender: "unknown".to_string(),
            language: "unknown".to_string(),
            notes: String::new(),
        }
    }
}

/// A registered speaker voice print.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicePrint {
    /// Unique id of the form `speaker-<N>`.
    pub id: String,
    /// User-chosen display name.
    pub name: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
    /// Path of the embedding binary, relative to the catalog root.
    pub embedding_file: String,
    /// Dimension of the stored embedding vector.
    pub embedding_dim: u32,
    /// Number of audio samples the print was extracted from.
    pub num_samples: u32,
    /// Paths of copied audio samples, relative to the catalog root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_samples: Vec<String>,
    #[serde(default)]
    pub metadata: VoicePrintMetadata,
}

/// Tracking metadata for an auto-registered unknown speaker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnknownMetadata {
    /// ISO 8601 timestamp of the latest observation.
    pub last_seen: String,
    /// Running mean of match confidences across observations.
    pub avg_confidence: f32,
}

/// An automatically tracked, not-yet-named speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownSpeaker {
    /// Unique id of the form `unknown-<N>`.
    pub id: String,
    /// ISO 8601 timestamp of the first observation.
    pub first_seen: String,
    /// Path of the embedding binary, relative to the catalog root.
    pub embedding_file: String,
    pub embedding_dim: u32,
    /// How many utterances have been attributed to this speaker.
    pub occurrence_count: u32,
    #[serde(default)]
    pub metadata: UnknownMetadata,
}

impl UnknownSpeaker {
    /// Fold one more observation into the running confidence mean:
    /// `avg <- ((n-1)*avg + c) / n`.
    pub fn observe(&mut self, confidence: f32, timestamp: String) {
        self.occurrence_count += 1;
        let n = self.occurrence_count as f32;
        self.metadata.avg_confidence =
            (self.metadata.avg_confidence * (n - 1.0) + confidence) / n;
        self.metadata.last_seen = timestamp;
    }
}

/// Parse the numeric suffix of an id like `speaker-12` for the given
/// prefix. Ids that do not match the pattern are ignored.
pub fn id_suffix(id: &str, prefix: &str) -> Option<u32> {
    id.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_suffix() {
        assert_eq!(id_suffix("speaker-12", "speaker-"), Some(12));
        assert_eq!(id_suffix("unknown-3", "unknown-"), Some(3));
        assert_eq!(id_suffix("speaker-", "speaker-"), None);
        assert_eq!(id_suffix("speaker-abc", "speaker-"), None);
        assert_eq!(id_suffix("guest-1", "speaker-"), None);
    }

    #[test]
    fn test_observe_incremental_mean() {
        let mut unknown = UnknownSpeaker {
            id: "unknown-1".to_string(),
            first_seen: "t0".to_string(),
            embedding_file: "embeddings/unknown-1.bin".to_string(),
            embedding_dim: 4,
            occurrence_count: 1,
            metadata: UnknownMetadata {
                last_seen: "t0".to_string(),
                avg_confidence: 0.0,
            },
        };

        unknown.observe(0.8, "t1".to_string());
        assert_eq!(unknown.occurrence_count, 2);
        assert!((unknown.metadata.avg_confidence - 0.4).abs() < 1e-6);

        unknown.observe(0.6, "t2".to_string());
        assert_eq!(unknown.occurrence_count, 3);
        assert!((unknown.metadata.avg_confidence - (0.8 + 0.6) / 3.0).abs() < 1e-6);
        assert_eq!(unknown.metadata.last_seen, "t2");
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata = VoicePrintMetadata::default();
        assert_eq!(metadata.gender, "unknown");
        assert_eq!(metadata.language, "unknown");
        assert!(metadata.notes.is_empty());
    }
}
