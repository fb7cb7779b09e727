//! On-disk voice-print store.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::record::{id_suffix, UnknownMetadata, UnknownSpeaker, VoicePrint};

const INDEX_FILE: &str = "voice-prints.yaml";
const CATALOG_VERSION: &str = "1.0";

fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Serialized shape of the YAML index.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogIndex {
    version: String,
    created_at: String,
    updated_at: String,
    #[serde(default)]
    voice_prints: Vec<VoicePrint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    unknown_speakers: Vec<UnknownSpeaker>,
}

/// The persistent catalog of known and auto-tracked speakers.
///
/// A single writer owns the catalog; the speaker identifier serializes
/// access behind its own lock. Mutations mark the catalog dirty and it
/// saves itself on drop if a mutation was never flushed.
pub struct VoicePrintCatalog {
    root: PathBuf,
    version: String,
    created_at: String,
    updated_at: String,
    voice_prints: BTreeMap<String, VoicePrint>,
    unknown_speakers: BTreeMap<String, UnknownSpeaker>,
    next_speaker: u32,
    next_unknown: u32,
    dirty: bool,
}

impl VoicePrintCatalog {
    /// Open a catalog rooted at `root`, or at `$HOME/.zasr/voice-prints`
    /// when `root` is `None`. Nothing is read from disk until [`load`].
    ///
    /// [`load`]: VoicePrintCatalog::load
    pub fn open(root: Option<PathBuf>) -> Self {
        let root = root.unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp/zasr".to_string());
            PathBuf::from(home).join(".zasr").join("voice-prints")
        });
        let now = now_timestamp();
        Self {
            root,
            version: CATALOG_VERSION.to_string(),
            created_at: now.clone(),
            updated_at: now,
            voice_prints: BTreeMap::new(),
            unknown_speakers: BTreeMap::new(),
            next_speaker: 1,
            next_unknown: 1,
            dirty: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.root.join("embeddings")
    }

    pub fn samples_dir(&self) -> PathBuf {
        self.root.join("samples")
    }

    /// Read the index from disk. A missing index means a brand-new
    /// catalog and is not an error; referenced embedding files that are
    /// missing are logged and skipped, not fatal.
    pub fn load(&mut self) -> Result<()> {
        let index_path = self.index_path();
        if !index_path.is_file() {
            info!(
                "voice-print index does not exist, starting new catalog at {}",
                self.root.display()
            );
            self.create_directories()?;
            return Ok(());
        }

        let raw = fs::read_to_string(&index_path)
            .with_context(|| format!("reading {}", index_path.display()))?;
        if raw.trim().is_empty() {
            info!("voice-print index is empty, starting new catalog");
            return Ok(());
        }

        let index: CatalogIndex = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing {}", index_path.display()))?;

        self.version = index.version;
        self.created_at = index.created_at;
        self.updated_at = index.updated_at;

        for print in index.voice_prints {
            if let Some(n) = id_suffix(&print.id, "speaker-") {
                self.next_speaker = self.next_speaker.max(n + 1);
            }
            self.voice_prints.insert(print.id.clone(), print);
        }
        for unknown in index.unknown_speakers {
            if let Some(n) = id_suffix(&unknown.id, "unknown-") {
                self.next_unknown = self.next_unknown.max(n + 1);
            }
            self.unknown_speakers.insert(unknown.id.clone(), unknown);
        }

        self.validate();

        info!(
            known = self.voice_prints.len(),
            unknown = self.unknown_speakers.len(),
            "loaded voice-print catalog from {}",
            index_path.display()
        );
        Ok(())
    }

    /// Rewrite the YAML index.
    pub fn save(&mut self) -> Result<()> {
        self.create_directories()?;
        self.updated_at = now_timestamp();

        let index = CatalogIndex {
            version: self.version.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            voice_prints: self.voice_prints.values().cloned().collect(),
            unknown_speakers: self.unknown_speakers.values().cloned().collect(),
        };

        let yaml = serde_yaml::to_string(&index).context("serializing voice-print index")?;
        let index_path = self.index_path();
        fs::write(&index_path, yaml)
            .with_context(|| format!("writing {}", index_path.display()))?;

        self.dirty = false;
        Ok(())
    }

    /// Register or update a voice print. The embedding binary is written
    /// first and the index rewrite happens last, so a crash in between
    /// leaves only an orphaned embedding file that `validate` reports.
    pub fn add(&mut self, print: VoicePrint, embedding: &[f32]) -> Result<()> {
        self.create_directories()?;
        let path = self.root.join(&print.embedding_file);
        write_embedding(&path, embedding)
            .with_context(|| format!("writing embedding for {}", print.id))?;

        info!(id = %print.id, name = %print.name, "added voice print");
        self.voice_prints.insert(print.id.clone(), print);
        self.dirty = true;
        self.save()
    }

    /// Remove a voice print and its embedding file.
    pub fn remove(&mut self, speaker_id: &str) -> bool {
        let Some(print) = self.voice_prints.remove(speaker_id) else {
            return false;
        };

        let path = self.root.join(&print.embedding_file);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("failed to delete embedding file {}: {e}", path.display());
            }
        }

        self.dirty = true;
        if let Err(e) = self.save() {
            warn!("failed to save catalog after removal: {e:#}");
        }
        info!(id = speaker_id, "removed voice print");
        true
    }

    /// Update the display name of a registered speaker.
    pub fn rename(&mut self, speaker_id: &str, new_name: &str) -> bool {
        let Some(print) = self.voice_prints.get_mut(speaker_id) else {
            return false;
        };
        print.name = new_name.to_string();
        print.updated_at = now_timestamp();
        self.dirty = true;
        info!(id = speaker_id, name = new_name, "renamed voice print");
        true
    }

    pub fn get(&self, speaker_id: &str) -> Option<&VoicePrint> {
        self.voice_prints.get(speaker_id)
    }

    pub fn contains(&self, speaker_id: &str) -> bool {
        self.voice_prints.contains_key(speaker_id)
    }

    pub fn voice_prints(&self) -> impl Iterator<Item = &VoicePrint> {
        self.voice_prints.values()
    }

    pub fn unknown_speakers(&self) -> impl Iterator<Item = &UnknownSpeaker> {
        self.unknown_speakers.values()
    }

    pub fn len(&self) -> usize {
        self.voice_prints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voice_prints.is_empty()
    }

    /// Load the embedding vector for a known or unknown speaker.
    pub fn load_embedding(&self, speaker_id: &str) -> Option<Vec<f32>> {
        let relative = self
            .voice_prints
            .get(speaker_id)
            .map(|p| p.embedding_file.as_str())
            .or_else(|| {
                self.unknown_speakers
                    .get(speaker_id)
                    .map(|u| u.embedding_file.as_str())
            })?;
        let path = self.root.join(relative);
        match read_embedding(&path) {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!("failed to load embedding {}: {e:#}", path.display());
                None
            }
        }
    }

    /// First free `speaker-<N>` id. Monotonic across restarts and
    /// collision-safe against the in-memory map.
    pub fn generate_speaker_id(&mut self) -> String {
        loop {
            let id = format!("speaker-{}", self.next_speaker);
            self.next_speaker += 1;
            if !self.voice_prints.contains_key(&id) {
                return id;
            }
        }
    }

    /// First free `unknown-<N>` id.
    pub fn generate_unknown_id(&mut self) -> String {
        loop {
            let id = format!("unknown-{}", self.next_unknown);
            self.next_unknown += 1;
            if !self.unknown_speakers.contains_key(&id) {
                return id;
            }
        }
    }

    /// Record a new unknown speaker from an embedding. Returns the
    /// assigned id, or `None` when persisting failed.
    pub fn add_unknown(&mut self, embedding: &[f32]) -> Option<String> {
        let id = self.generate_unknown_id();
        let now = now_timestamp();

        let unknown = UnknownSpeaker {
            id: id.clone(),
            first_seen: now.clone(),
            embedding_file: format!("embeddings/{id}.bin"),
            embedding_dim: embedding.len() as u32,
            occurrence_count: 1,
            metadata: UnknownMetadata {
                last_seen: now,
                avg_confidence: 0.0,
            },
        };

        if let Err(e) = self.create_directories() {
            warn!("failed to create catalog directories: {e:#}");
            return None;
        }
        let path = self.root.join(&unknown.embedding_file);
        if let Err(e) = write_embedding(&path, embedding) {
            warn!("failed to save embedding for {id}: {e:#}");
            return None;
        }

        self.unknown_speakers.insert(id.clone(), unknown);
        self.dirty = true;
        if let Err(e) = self.save() {
            warn!("failed to save catalog after adding {id}: {e:#}");
        }
        info!(id = %id, "added unknown speaker");
        Some(id)
    }

    /// Fold a re-observation of an unknown speaker into its record.
    pub fn touch_unknown(&mut self, unknown_id: &str, confidence: f32) {
        if let Some(unknown) = self.unknown_speakers.get_mut(unknown_id) {
            unknown.observe(confidence, now_timestamp());
            self.dirty = true;
        }
    }

    /// Check that every referenced embedding file exists. Missing files
    /// are logged; returns false when any is missing.
    pub fn validate(&self) -> bool {
        let mut valid = true;
        let known = self
            .voice_prints
            .values()
            .map(|p| p.embedding_file.as_str());
        let unknown = self
            .unknown_speakers
            .values()
            .map(|u| u.embedding_file.as_str());
        for relative in known.chain(unknown) {
            let path = self.root.join(relative);
            if !path.is_file() {
                warn!("missing embedding file: {}", path.display());
                valid = false;
            }
        }
        valid
    }

    fn create_directories(&self) -> Result<()> {
        fs::create_dir_all(self.embeddings_dir())?;
        fs::create_dir_all(self.samples_dir())?;
        Ok(())
    }
}

impl Drop for VoicePrintCatalog {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.save() {
                warn!("failed to save voice-print catalog on drop: {e:#}");
            }
        }
    }
}

/// Write an embedding binary: little-endian i32 dimension followed by
/// dim * f32 values.
pub fn write_embedding(path: &Path, embedding: &[f32]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(&(embedding.len() as i32).to_le_bytes())?;
    for value in embedding {
        file.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// Read an embedding binary written by [`write_embedding`].
pub fn read_embedding(path: &Path) -> Result<Vec<f32>> {
    let mut file = fs::File::open(path)?;

    let mut dim_bytes = [0u8; 4];
    file.read_exact(&mut dim_bytes)?;
    let dim = i32::from_le_bytes(dim_bytes);
    anyhow::ensure!(dim >= 0, "negative embedding dimension");

    let mut embedding = Vec::with_capacity(dim as usize);
    let mut value_bytes = [0u8; 4];
    for _ in 0..dim {
        file.read_exact(&mut value_bytes)?;
        embedding.push(f32::from_le_bytes(value_bytes));
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog_in(dir: &TempDir) -> VoicePrintCatalog {
        VoicePrintCatalog::open(Some(dir.path().to_path_buf()))
    }

    fn print_named(id: &str, name: &str, dim: u32) -> VoicePrint {
        VoicePrint {
            id: id.to_string(),
            name: name.to_string(),
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
            embedding_file: format!("embeddings/{id}.bin"),
            embedding_dim: dim,
            num_samples: 1,
            audio_samples: Vec::new(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_embedding_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("e.bin");
        let embedding = vec![0.25f32, -1.5, 3.75, 0.0];

        write_embedding(&path, &embedding).unwrap();
        let loaded = read_embedding(&path).unwrap();
        assert_eq!(loaded, embedding);

        // On-disk header dim matches the vector length
        let bytes = fs::read(&path).unwrap();
        assert_eq!(
            i32::from_le_bytes(bytes[..4].try_into().unwrap()),
            embedding.len() as i32
        );
        assert_eq!(bytes.len(), 4 + embedding.len() * 4);
    }

    #[test]
    fn test_load_missing_index_is_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.embeddings_dir().is_dir());
    }

    #[test]
    fn test_add_and_reload() {
        let dir = TempDir::new().unwrap();
        {
            let mut catalog = catalog_in(&dir);
            catalog.load().unwrap();
            let id = catalog.generate_speaker_id();
            assert_eq!(id, "speaker-1");
            catalog
                .add(print_named(&id, "Alice", 4), &[0.1, 0.2, 0.3, 0.4])
                .unwrap();
        }

        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        assert_eq!(catalog.len(), 1);
        let print = catalog.get("speaker-1").unwrap();
        assert_eq!(print.name, "Alice");
        assert_eq!(
            catalog.load_embedding("speaker-1").unwrap(),
            vec![0.1, 0.2, 0.3, 0.4]
        );
    }

    #[test]
    fn test_id_generation_monotonic_after_reload() {
        let dir = TempDir::new().unwrap();
        {
            let mut catalog = catalog_in(&dir);
            catalog.load().unwrap();
            catalog
                .add(print_named("speaker-7", "Gina", 2), &[1.0, 0.0])
                .unwrap();
        }

        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        // Newly generated ids are strictly greater than the stored max
        assert_eq!(catalog.generate_speaker_id(), "speaker-8");
        assert_eq!(catalog.generate_speaker_id(), "speaker-9");
    }

    #[test]
    fn test_ids_never_reissued_in_process() {
        let dir = TempDir::new().unwrap();
        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            assert!(seen.insert(catalog.generate_speaker_id()));
            assert!(seen.insert(catalog.generate_unknown_id()));
        }
    }

    #[test]
    fn test_non_matching_ids_ignored_by_counter_recovery() {
        let dir = TempDir::new().unwrap();
        {
            let mut catalog = catalog_in(&dir);
            catalog.load().unwrap();
            catalog
                .add(print_named("guest-99", "Visitor", 2), &[1.0, 0.0])
                .unwrap();
        }

        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        assert_eq!(catalog.generate_speaker_id(), "speaker-1");
    }

    #[test]
    fn test_remove_deletes_embedding() {
        let dir = TempDir::new().unwrap();
        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        catalog
            .add(print_named("speaker-1", "Alice", 2), &[1.0, 0.0])
            .unwrap();
        let path = dir.path().join("embeddings/speaker-1.bin");
        assert!(path.is_file());

        assert!(catalog.remove("speaker-1"));
        assert!(!path.exists());
        assert!(!catalog.remove("speaker-1"));
    }

    #[test]
    fn test_rename() {
        let dir = TempDir::new().unwrap();
        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        catalog
            .add(print_named("speaker-1", "Alice", 2), &[1.0, 0.0])
            .unwrap();

        assert!(catalog.rename("speaker-1", "Alicia"));
        assert_eq!(catalog.get("speaker-1").unwrap().name, "Alicia");
        assert!(!catalog.rename("speaker-2", "Nobody"));
    }

    #[test]
    fn test_add_unknown_and_touch() {
        let dir = TempDir::new().unwrap();
        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();

        let id = catalog.add_unknown(&[0.5, 0.5]).unwrap();
        assert_eq!(id, "unknown-1");
        assert!(dir.path().join("embeddings/unknown-1.bin").is_file());

        catalog.touch_unknown(&id, 0.9);
        let unknown = catalog.unknown_speakers().next().unwrap();
        assert_eq!(unknown.occurrence_count, 2);
        assert!((unknown.metadata.avg_confidence - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_validate_detects_orphaned_index_entry() {
        let dir = TempDir::new().unwrap();
        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        catalog
            .add(print_named("speaker-1", "Alice", 2), &[1.0, 0.0])
            .unwrap();
        assert!(catalog.validate());

        fs::remove_file(dir.path().join("embeddings/speaker-1.bin")).unwrap();
        assert!(!catalog.validate());
    }

    #[test]
    fn test_empty_index_file_tolerated() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("voice-prints.yaml"), "").unwrap();
        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_save_on_drop_persists_rename() {
        let dir = TempDir::new().unwrap();
        {
            let mut catalog = catalog_in(&dir);
            catalog.load().unwrap();
            catalog
                .add(print_named("speaker-1", "Alice", 2), &[1.0, 0.0])
                .unwrap();
            catalog.rename("speaker-1", "Alicia");
            // dropped dirty here
        }

        let mut catalog = catalog_in(&dir);
        catalog.load().unwrap();
        assert_eq!(catalog.get("speaker-1").unwrap().name, "Alicia");
    }
}
