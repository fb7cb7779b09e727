//! Speaker identification against the voice-print catalog.
//!
//! Extracts a fixed-dimension embedding from utterance audio, matches it
//! against registered voice prints, and optionally auto-registers
//! speakers that match nobody. The catalog is single-writer: all
//! mutable state sits behind one lock.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::catalog::{VoicePrint, VoicePrintCatalog};
use crate::config::ServerConfig;
use crate::toolkit::{
    matcher::mean_normalized, InferenceToolkit, SpeakerEmbeddingExtractor,
    SpeakerEmbeddingManager,
};

const UNKNOWN_DISPLAY_NAME: &str = "Unknown Speaker";

/// Result of identifying one audio segment.
#[derive(Debug, Clone)]
pub struct Identification {
    pub speaker_id: String,
    pub speaker_name: String,
    /// Reported as the search threshold; the matcher does not expose the
    /// raw similarity.
    pub confidence: f32,
    /// Whether this speaker was auto-registered just now.
    pub is_new: bool,
}

struct MatcherState {
    manager: Box<dyn SpeakerEmbeddingManager>,
    catalog: VoicePrintCatalog,
}

/// Session-shared speaker identifier.
pub struct SpeakerIdentifier {
    extractor: Box<dyn SpeakerEmbeddingExtractor>,
    state: Mutex<MatcherState>,
    similarity_threshold: f32,
    auto_track: bool,
}

impl SpeakerIdentifier {
    /// Build the identifier: create the extractor and matcher, load the
    /// catalog and register every stored voice print.
    pub fn new(toolkit: &dyn InferenceToolkit, config: &ServerConfig) -> Result<Self> {
        let extractor = toolkit
            .embedding_extractor(config)
            .context("creating speaker embedding extractor")?;
        let dim = extractor.embedding_dim();
        let mut manager = toolkit
            .embedding_manager(dim)
            .context("creating speaker embedding manager")?;

        let mut catalog = VoicePrintCatalog::open(config.speaker.catalog_dir.clone());
        if let Err(e) = catalog.load() {
            warn!("cannot load voice-print catalog, starting empty: {e:#}");
        }

        let mut loaded = 0;
        let known: Vec<(String, String)> = catalog
            .voice_prints()
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect();
        for (id, name) in known {
            if let Some(embedding) = catalog.load_embedding(&id) {
                if manager.register(&name, &[embedding]) {
                    loaded += 1;
                } else {
                    warn!("failed to register voice print {id} ({name})");
                }
            }
        }
        // Unknown speakers are registered under their id so repeat
        // observations update the same record instead of minting a new
        // unknown each time.
        let unknown_ids: Vec<String> = catalog
            .unknown_speakers()
            .map(|u| u.id.clone())
            .collect();
        for id in unknown_ids {
            if let Some(embedding) = catalog.load_embedding(&id) {
                manager.register(&id, &[embedding]);
            }
        }
        info!(loaded, "speaker identifier initialized");

        Ok(Self {
            extractor,
            state: Mutex::new(MatcherState { manager, catalog }),
            similarity_threshold: config.speaker.similarity_threshold,
            auto_track: config.speaker.auto_track,
        })
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    /// Extract an embedding from float samples. `None` when the segment
    /// is too short or extraction fails.
    pub fn extract(&self, samples: &[f32]) -> Option<Vec<f32>> {
        self.extractor.compute(samples)
    }

    /// Identify the speaker of one utterance. On a miss with auto-track
    /// enabled the speaker is registered as a new unknown.
    pub fn process_segment(&self, samples: &[f32]) -> Option<Identification> {
        let embedding = self.extract(samples)?;
        let mut state = self.state.lock();

        if let Some(name) = state.manager.search(&embedding, self.similarity_threshold) {
            return Some(self.resolve_match(&mut state, &name));
        }

        if !self.auto_track {
            return None;
        }

        let unknown_id = state.catalog.add_unknown(&embedding)?;
        state.manager.register(&unknown_id, &[embedding]);
        info!(id = %unknown_id, "registered new unknown speaker");
        Some(Identification {
            speaker_id: unknown_id,
            speaker_name: UNKNOWN_DISPLAY_NAME.to_string(),
            confidence: 0.0,
            is_new: true,
        })
    }

    fn resolve_match(&self, state: &mut MatcherState, name: &str) -> Identification {
        if name.starts_with("unknown-") {
            state.catalog.touch_unknown(name, self.similarity_threshold);
            return Identification {
                speaker_id: name.to_string(),
                speaker_name: UNKNOWN_DISPLAY_NAME.to_string(),
                confidence: self.similarity_threshold,
                is_new: false,
            };
        }

        let speaker_id = state
            .catalog
            .voice_prints()
            .find(|p| p.name == name)
            .map(|p| p.id.clone())
            .unwrap_or_default();
        Identification {
            speaker_id,
            speaker_name: name.to_string(),
            confidence: self.similarity_threshold,
            is_new: false,
        }
    }

    /// Identify the speaker of a WAV file on disk.
    pub fn identify_from_wav(&self, path: &Path) -> Option<Identification> {
        let embedding = self.extractor.compute_from_wav(path)?;
        let mut state = self.state.lock();
        if let Some(name) = state.manager.search(&embedding, self.similarity_threshold) {
            return Some(self.resolve_match(&mut state, &name));
        }
        None
    }

    /// Register a named speaker from one or more WAV files. Unless
    /// `force` is set, any file diarized as containing more than one
    /// speaker rejects the registration. Returns the assigned id.
    pub fn add_speaker(
        &self,
        toolkit: &dyn InferenceToolkit,
        config: &ServerConfig,
        name: &str,
        wav_files: &[PathBuf],
        force: bool,
    ) -> Option<String> {
        if wav_files.is_empty() {
            warn!("add_speaker called with no audio files");
            return None;
        }

        if !force {
            match toolkit.diarizer(config) {
                Ok(diarizer) => {
                    for path in wav_files {
                        let Some(embedding_input) = read_wav_samples(path) else {
                            continue;
                        };
                        match diarizer.num_speakers(&embedding_input) {
                            Ok(count) if count > 1 => {
                                warn!(
                                    "{} contains {count} speakers, refusing registration",
                                    path.display()
                                );
                                return None;
                            }
                            Ok(_) => {}
                            Err(e) => warn!("diarization failed for {}: {e}", path.display()),
                        }
                    }
                }
                Err(e) => warn!("diarizer unavailable, skipping pre-check: {e}"),
            }
        }

        let mut embeddings = Vec::new();
        for path in wav_files {
            match self.extractor.compute_from_wav(path) {
                Some(embedding) => embeddings.push(embedding),
                None => warn!("skipping file with no embedding: {}", path.display()),
            }
        }
        if embeddings.is_empty() {
            warn!("no embedding could be extracted for speaker '{name}'");
            return None;
        }

        let merged = mean_normalized(&embeddings);

        let mut state = self.state.lock();
        if !state.manager.register(name, &embeddings) {
            warn!("failed to register '{name}' with the matcher");
            return None;
        }

        let speaker_id = state.catalog.generate_speaker_id();
        let copied = copy_samples(&state.catalog, &speaker_id, wav_files);

        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let print = VoicePrint {
            id: speaker_id.clone(),
            name: name.to_string(),
            created_at: now.clone(),
            updated_at: now,
            embedding_file: format!("embeddings/{speaker_id}.bin"),
            embedding_dim: merged.len() as u32,
            num_samples: wav_files.len() as u32,
            audio_samples: copied,
            metadata: Default::default(),
        };

        if let Err(e) = state.catalog.add(print, &merged) {
            warn!("failed to persist voice print for '{name}': {e:#}");
            state.manager.remove(name);
            return None;
        }

        info!(id = %speaker_id, name, "registered speaker");
        Some(speaker_id)
    }

    /// Verify an embedding against a registered name at the configured
    /// threshold.
    pub fn verify(&self, name: &str, embedding: &[f32]) -> bool {
        self.state
            .lock()
            .manager
            .verify(name, embedding, self.similarity_threshold)
    }

    /// Remove a speaker from both the matcher and the catalog.
    pub fn remove_speaker(&self, speaker_id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(name) = state.catalog.get(speaker_id).map(|p| p.name.clone()) else {
            return false;
        };
        state.manager.remove(&name);
        state.catalog.remove(speaker_id)
    }
}

/// Copy registration samples into the catalog's samples directory and
/// return their catalog-relative paths.
fn copy_samples(catalog: &VoicePrintCatalog, speaker_id: &str, files: &[PathBuf]) -> Vec<String> {
    let dir = catalog.samples_dir().join(speaker_id);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("failed to create samples dir {}: {e}", dir.display());
        return Vec::new();
    }

    let mut copied = Vec::new();
    for (i, source) in files.iter().enumerate() {
        let file_name = format!("{}.wav", i + 1);
        let target = dir.join(&file_name);
        match std::fs::copy(source, &target) {
            Ok(_) => copied.push(format!("samples/{speaker_id}/{file_name}")),
            Err(e) => warn!("failed to copy {}: {e}", source.display()),
        }
    }
    copied
}

/// Read a sample file as normalized floats for the diarization pre-check.
fn read_wav_samples(path: &Path) -> Option<Vec<f32>> {
    let bytes = std::fs::read(path).ok()?;
    Some(crate::audio::to_float(&crate::audio::samples_from_bytes(
        &bytes,
    )))
}
