//! Cosine-similarity embedding manager.
//!
//! Keeps one averaged, normalized embedding per registered name and
//! answers search/verify queries by cosine similarity.

use std::collections::HashMap;

use tracing::debug;

use super::SpeakerEmbeddingManager;

/// In-memory embedding registry backed by cosine similarity.
pub struct CosineEmbeddingManager {
    dim: usize,
    speakers: HashMap<String, Vec<f32>>,
}

impl CosineEmbeddingManager {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            speakers: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

impl SpeakerEmbeddingManager for CosineEmbeddingManager {
    fn register(&mut self, name: &str, embeddings: &[Vec<f32>]) -> bool {
        if embeddings.is_empty() || embeddings.iter().any(|e| e.len() != self.dim) {
            return false;
        }

        let merged = mean_normalized(embeddings);
        debug!(name, count = embeddings.len(), "registered speaker embedding");
        self.speakers.insert(name.to_string(), merged);
        true
    }

    fn search(&self, embedding: &[f32], threshold: f32) -> Option<String> {
        if embedding.len() != self.dim {
            return None;
        }

        let mut best: Option<(&str, f32)> = None;
        for (name, reference) in &self.speakers {
            let score = self.similarity(embedding, reference);
            if score >= threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((name, score));
            }
        }
        best.map(|(name, _)| name.to_string())
    }

    fn verify(&self, name: &str, embedding: &[f32], threshold: f32) -> bool {
        if embedding.len() != self.dim {
            return false;
        }
        self.speakers
            .get(name)
            .map(|reference| self.similarity(embedding, reference) >= threshold)
            .unwrap_or(false)
    }

    fn remove(&mut self, name: &str) -> bool {
        self.speakers.remove(name).is_some()
    }
}

/// Cosine similarity of two equal-length vectors; 0.0 for zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Mean of the normalized input vectors, renormalized to unit length.
pub fn mean_normalized(embeddings: &[Vec<f32>]) -> Vec<f32> {
    let dim = embeddings[0].len();
    let mut merged = vec![0.0f32; dim];
    for embedding in embeddings {
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            continue;
        }
        for (acc, value) in merged.iter_mut().zip(embedding) {
            *acc += value / norm;
        }
    }
    let norm: f32 = merged.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut merged {
            *value /= norm;
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![0.5, 0.5, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_register_and_search() {
        let mut manager = CosineEmbeddingManager::new(3);
        assert!(manager.register("alice", &[vec![1.0, 0.0, 0.0]]));
        assert!(manager.register("bob", &[vec![0.0, 1.0, 0.0]]));

        let found = manager.search(&[0.9, 0.1, 0.0], 0.75);
        assert_eq!(found.as_deref(), Some("alice"));

        // Nothing close enough
        assert!(manager.search(&[0.5, 0.5, 0.7], 0.99).is_none());
    }

    #[test]
    fn test_register_rejects_dim_mismatch() {
        let mut manager = CosineEmbeddingManager::new(3);
        assert!(!manager.register("alice", &[vec![1.0, 0.0]]));
        assert!(!manager.register("alice", &[]));
    }

    #[test]
    fn test_verify() {
        let mut manager = CosineEmbeddingManager::new(2);
        manager.register("alice", &[vec![1.0, 0.0]]);
        assert!(manager.verify("alice", &[1.0, 0.05], 0.9));
        assert!(!manager.verify("alice", &[0.0, 1.0], 0.9));
        assert!(!manager.verify("nobody", &[1.0, 0.0], 0.5));
    }

    #[test]
    fn test_remove() {
        let mut manager = CosineEmbeddingManager::new(2);
        manager.register("alice", &[vec![1.0, 0.0]]);
        assert!(manager.remove("alice"));
        assert!(!manager.remove("alice"));
        assert!(manager.search(&[1.0, 0.0], 0.5).is_none());
    }

    #[test]
    fn test_mean_normalized_is_unit_length() {
        let merged = mean_normalized(&[vec![2.0, 0.0], vec![0.0, 4.0]]);
        let norm: f32 = merged.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        // Both inputs contribute equally after normalization
        assert!((merged[0] - merged[1]).abs() < 1e-6);
    }
}
