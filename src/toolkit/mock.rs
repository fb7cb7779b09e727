//! Deterministic mock implementations of the toolkit capability surface.
//!
//! Used by unit and integration tests to drive the full pipeline without
//! any neural models: speech is "detected" by signal energy and decoded
//! text is a deterministic function of how much speech was fed. The
//! mocks live in the crate (not behind `cfg(test)`) so integration tests
//! and downstream embedders can construct a fully working gateway.

use std::path::Path;

use super::silero::SpeechSegmenter;
use super::{
    matcher::CosineEmbeddingManager, InferenceToolkit, OfflineRecognizer, OfflineStream,
    OnlineRecognizer, OnlineStream, Punctuator, RecognizerOptions, SpeakerDiarizer,
    SpeakerEmbeddingExtractor, SpeakerEmbeddingManager, SpeechSegment, ToolkitError,
    VoiceActivityDetector,
};
use crate::config::ServerConfig;

/// Amplitude above which a sample counts as speech energy.
const ENERGY_FLOOR: f32 = 0.05;

/// Samples of decoded speech per emitted word.
const SAMPLES_PER_WORD: usize = 4_000;

const WORD_BANK: [&str; 8] = [
    "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog",
];

fn words_for(speech_samples: usize) -> String {
    let count = speech_samples / SAMPLES_PER_WORD;
    (0..count)
        .map(|i| WORD_BANK[i % WORD_BANK.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_energetic(sample: f32) -> bool {
    sample.abs() > ENERGY_FLOOR
}

/// Energy-driven VAD reusing the real segmentation state machine.
pub struct MockVad {
    segmenter: SpeechSegmenter,
    pending: Vec<f32>,
}

impl MockVad {
    pub fn new(min_silence_duration: f32) -> Self {
        Self {
            segmenter: SpeechSegmenter::new(0.5, min_silence_duration, 0.1, 8.0),
            pending: Vec::new(),
        }
    }
}

const MOCK_FRAME: usize = 512;

impl VoiceActivityDetector for MockVad {
    fn accept_waveform(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
        let mut consumed = 0;
        while self.pending.len() - consumed >= MOCK_FRAME {
            let frame = &self.pending[consumed..consumed + MOCK_FRAME];
            let energetic = frame.iter().filter(|s| is_energetic(**s)).count();
            let probability = if energetic * 2 > frame.len() { 0.9 } else { 0.0 };
            self.segmenter.push(frame, probability);
            consumed += MOCK_FRAME;
        }
        self.pending.drain(..consumed);
    }

    fn is_detected(&self) -> bool {
        self.segmenter.is_speech_active()
    }

    fn is_empty(&self) -> bool {
        self.segmenter.is_empty()
    }

    fn pop(&mut self) -> Option<SpeechSegment> {
        self.segmenter.pop()
    }
}

/// Offline stream whose text is a function of fed speech energy.
pub struct MockOfflineStream {
    speech_samples: usize,
    decoded: String,
}

impl OfflineStream for MockOfflineStream {
    fn accept_waveform(&mut self, _sample_rate: u32, samples: &[f32]) {
        self.speech_samples += samples.iter().filter(|s| is_energetic(**s)).count();
    }

    fn decode(&mut self) {
        self.decoded = words_for(self.speech_samples);
    }

    fn text(&self) -> String {
        self.decoded.clone()
    }
}

pub struct MockOfflineRecognizer;

impl OfflineRecognizer for MockOfflineRecognizer {
    fn create_stream(&self) -> Result<Box<dyn OfflineStream>, ToolkitError> {
        Ok(Box::new(MockOfflineStream {
            speech_samples: 0,
            decoded: String::new(),
        }))
    }
}

/// Samples of trailing silence that trigger the mock endpoint (1.2 s).
const ENDPOINT_SILENCE: usize = 19_200;

/// Online stream with energy-based endpointing.
pub struct MockOnlineStream {
    pending: usize,
    speech_samples: usize,
    trailing_silence: usize,
    decoded: String,
}

impl OnlineStream for MockOnlineStream {
    fn accept_waveform(&mut self, _sample_rate: u32, samples: &[f32]) {
        self.pending += samples.len();
        for &sample in samples {
            if is_energetic(sample) {
                self.speech_samples += 1;
                self.trailing_silence = 0;
            } else {
                self.trailing_silence += 1;
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.pending >= 1_600
    }

    fn decode(&mut self) {
        self.pending = 0;
        self.decoded = words_for(self.speech_samples);
    }

    fn text(&self) -> String {
        self.decoded.clone()
    }

    fn is_endpoint(&self) -> bool {
        self.speech_samples >= 160 && self.trailing_silence >= ENDPOINT_SILENCE
    }

    fn reset(&mut self) {
        self.pending = 0;
        self.speech_samples = 0;
        self.trailing_silence = 0;
        self.decoded.clear();
    }
}

pub struct MockOnlineRecognizer;

impl OnlineRecognizer for MockOnlineRecognizer {
    fn create_stream(&self) -> Result<Box<dyn OnlineStream>, ToolkitError> {
        Ok(Box::new(MockOnlineStream {
            pending: 0,
            speech_samples: 0,
            trailing_silence: 0,
            decoded: String::new(),
        }))
    }
}

/// Deterministic embedding extractor: banded RMS of the clip, normalized.
///
/// The same audio always yields the same embedding, so catalog round-trip
/// tests can match a speaker against a reference utterance.
pub struct MockEmbeddingExtractor {
    dim: usize,
}

impl MockEmbeddingExtractor {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed(&self, samples: &[f32]) -> Option<Vec<f32>> {
        // Under half a second of audio is "not ready"
        if samples.len() < 8_000 {
            return None;
        }
        let band = samples.len() / self.dim;
        let mut embedding: Vec<f32> = (0..self.dim)
            .map(|i| {
                let chunk = &samples[i * band..(i + 1) * band];
                (chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32).sqrt()
            })
            .collect();
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return None;
        }
        for value in &mut embedding {
            *value /= norm;
        }
        Some(embedding)
    }
}

impl SpeakerEmbeddingExtractor for MockEmbeddingExtractor {
    fn embedding_dim(&self) -> usize {
        self.dim
    }

    fn compute(&self, samples: &[f32]) -> Option<Vec<f32>> {
        self.embed(samples)
    }

    fn compute_from_wav(&self, path: &Path) -> Option<Vec<f32>> {
        // The mock treats files as headerless s16le PCM.
        let bytes = std::fs::read(path).ok()?;
        let samples = crate::audio::to_float(&crate::audio::samples_from_bytes(&bytes));
        self.embed(&samples)
    }
}

/// Diarizer reporting a fixed speaker count.
pub struct MockDiarizer {
    pub speakers: usize,
}

impl SpeakerDiarizer for MockDiarizer {
    fn num_speakers(&self, _samples: &[f32]) -> Result<usize, ToolkitError> {
        Ok(self.speakers)
    }
}

/// Punctuator that terminates sentences with a period.
pub struct MockPunctuator;

impl Punctuator for MockPunctuator {
    fn punctuate(&self, text: &str) -> String {
        let trimmed = text.trim_end();
        if trimmed.is_empty() || trimmed.ends_with(['.', '!', '?']) {
            trimmed.to_string()
        } else {
            format!("{trimmed}.")
        }
    }
}

/// A fully scripted toolkit for tests.
pub struct MockToolkit {
    /// Speaker count the diarizer reports.
    pub diarized_speakers: usize,
    /// Embedding dimension of the mock extractor.
    pub embedding_dim: usize,
}

impl MockToolkit {
    pub fn new() -> Self {
        Self {
            diarized_speakers: 1,
            embedding_dim: 4,
        }
    }
}

impl Default for MockToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceToolkit for MockToolkit {
    fn offline_recognizer(
        &self,
        _config: &ServerConfig,
        _options: &RecognizerOptions,
    ) -> Result<Box<dyn OfflineRecognizer>, ToolkitError> {
        Ok(Box::new(MockOfflineRecognizer))
    }

    fn online_recognizer(
        &self,
        _config: &ServerConfig,
        _options: &RecognizerOptions,
    ) -> Result<Box<dyn OnlineRecognizer>, ToolkitError> {
        Ok(Box::new(MockOnlineRecognizer))
    }

    fn vad(
        &self,
        _config: &ServerConfig,
        min_silence: f32,
    ) -> Result<Box<dyn VoiceActivityDetector>, ToolkitError> {
        Ok(Box::new(MockVad::new(min_silence)))
    }

    fn embedding_extractor(
        &self,
        _config: &ServerConfig,
    ) -> Result<Box<dyn SpeakerEmbeddingExtractor>, ToolkitError> {
        Ok(Box::new(MockEmbeddingExtractor::new(self.embedding_dim)))
    }

    fn embedding_manager(
        &self,
        dim: usize,
    ) -> Result<Box<dyn SpeakerEmbeddingManager>, ToolkitError> {
        Ok(Box::new(CosineEmbeddingManager::new(dim)))
    }

    fn diarizer(&self, _config: &ServerConfig) -> Result<Box<dyn SpeakerDiarizer>, ToolkitError> {
        Ok(Box::new(MockDiarizer {
            speakers: self.diarized_speakers,
        }))
    }

    fn punctuator(&self, _config: &ServerConfig) -> Result<Box<dyn Punctuator>, ToolkitError> {
        Ok(Box::new(MockPunctuator))
    }
}
