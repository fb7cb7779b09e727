//! Inference toolkit capability surface.
//!
//! The gateway consumes neural inference through the traits in this module
//! so the engines, speaker identifier and session layer never depend on a
//! concrete model runtime. The crate bundles an ONNX-backed Silero voice
//! activity detector (feature `silero-vad`) and a cosine-similarity
//! embedding manager; decoder-model capabilities come from whichever
//! [`InferenceToolkit`] implementation is wired in at startup.

pub mod matcher;
pub mod mock;
pub mod silero;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{RecognizerMode, ServerConfig};

/// Errors surfaced by toolkit capabilities.
#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("backend does not provide this capability: {0}")]
    Backend(String),
}

/// One contiguous span of detected speech drained from a VAD.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    /// Offset of the first sample, relative to the samples fed since the
    /// last drain.
    pub start: usize,
    pub samples: Vec<f32>,
}

/// Decoder stream for a whole-utterance (non-streaming) recognizer.
pub trait OfflineStream: Send {
    /// Feed normalized float samples at the given sample rate.
    fn accept_waveform(&mut self, sample_rate: u32, samples: &[f32]);
    /// Run decoding over everything fed so far.
    fn decode(&mut self);
    /// Current decoded text.
    fn text(&self) -> String;
}

/// Whole-utterance recognizer. One stream is created per utterance.
pub trait OfflineRecognizer: Send + Sync {
    fn create_stream(&self) -> Result<Box<dyn OfflineStream>, ToolkitError>;
}

/// Decoder stream for an incremental recognizer with built-in endpointing.
pub trait OnlineStream: Send {
    fn accept_waveform(&mut self, sample_rate: u32, samples: &[f32]);
    /// Whether enough features are buffered for another decode step.
    fn is_ready(&self) -> bool;
    fn decode(&mut self);
    fn text(&self) -> String;
    /// Whether the decoder has detected an utterance boundary.
    fn is_endpoint(&self) -> bool;
    /// Reset decoder state in place, keeping the stream usable for the
    /// next utterance.
    fn reset(&mut self);
}

/// Incremental recognizer. One stream lives for the whole session.
pub trait OnlineRecognizer: Send + Sync {
    fn create_stream(&self) -> Result<Box<dyn OnlineStream>, ToolkitError>;
}

/// Windowed voice-activity detector with an internal segment queue.
pub trait VoiceActivityDetector: Send {
    fn accept_waveform(&mut self, samples: &[f32]);
    /// Whether speech is currently active.
    fn is_detected(&self) -> bool;
    /// Whether the completed-segment queue is empty.
    fn is_empty(&self) -> bool;
    /// Pop the oldest completed segment.
    fn pop(&mut self) -> Option<SpeechSegment>;
}

/// Fixed-dimension speaker embedding extractor.
pub trait SpeakerEmbeddingExtractor: Send + Sync {
    fn embedding_dim(&self) -> usize;
    /// Extract an embedding from normalized float samples. Returns `None`
    /// when the segment is too short or extraction fails.
    fn compute(&self, samples: &[f32]) -> Option<Vec<f32>>;
    /// Extract an embedding from a WAV file on disk.
    fn compute_from_wav(&self, path: &std::path::Path) -> Option<Vec<f32>>;
}

/// Registry of named embeddings with similarity search and verification.
pub trait SpeakerEmbeddingManager: Send {
    /// Register one or more embeddings under a display name.
    fn register(&mut self, name: &str, embeddings: &[Vec<f32>]) -> bool;
    /// Find a registered name whose similarity to `embedding` meets the
    /// threshold.
    fn search(&self, embedding: &[f32], threshold: f32) -> Option<String>;
    /// Verify that `embedding` matches the named speaker at the threshold.
    fn verify(&self, name: &str, embedding: &[f32], threshold: f32) -> bool;
    fn remove(&mut self, name: &str) -> bool;
}

/// Offline diarization: report how many distinct speakers a clip contains.
pub trait SpeakerDiarizer: Send + Sync {
    fn num_speakers(&self, samples: &[f32]) -> Result<usize, ToolkitError>;
}

/// Punctuation model applied to finalized sentence text.
pub trait Punctuator: Send + Sync {
    fn punctuate(&self, text: &str) -> String;
}

/// Per-session recognizer options resolved from server config plus the
/// client `Begin` payload.
#[derive(Debug, Clone)]
pub struct RecognizerOptions {
    pub mode: RecognizerMode,
    pub use_itn: bool,
}

/// Factory for every capability the gateway consumes.
///
/// Implementations create capabilities from the server configuration;
/// a capability the linked backend cannot provide yields
/// [`ToolkitError::Backend`], which the session reports as a `Begin`
/// rejection.
pub trait InferenceToolkit: Send + Sync {
    fn offline_recognizer(
        &self,
        config: &ServerConfig,
        options: &RecognizerOptions,
    ) -> Result<Box<dyn OfflineRecognizer>, ToolkitError>;

    fn online_recognizer(
        &self,
        config: &ServerConfig,
        options: &RecognizerOptions,
    ) -> Result<Box<dyn OnlineRecognizer>, ToolkitError>;

    /// Create a VAD with the given minimum-silence override (seconds).
    fn vad(
        &self,
        config: &ServerConfig,
        min_silence: f32,
    ) -> Result<Box<dyn VoiceActivityDetector>, ToolkitError>;

    fn embedding_extractor(
        &self,
        config: &ServerConfig,
    ) -> Result<Box<dyn SpeakerEmbeddingExtractor>, ToolkitError>;

    fn embedding_manager(
        &self,
        dim: usize,
    ) -> Result<Box<dyn SpeakerEmbeddingManager>, ToolkitError>;

    fn diarizer(&self, config: &ServerConfig) -> Result<Box<dyn SpeakerDiarizer>, ToolkitError>;

    fn punctuator(&self, config: &ServerConfig) -> Result<Box<dyn Punctuator>, ToolkitError>;
}

/// The toolkit wired into the shipped binary.
///
/// Voice activity detection runs on the bundled ONNX Silero model and the
/// embedding manager is the in-crate cosine matcher; decoder, extractor,
/// diarization and punctuation models require an external backend and
/// report [`ToolkitError::Backend`].
pub struct OnnxToolkit;

impl OnnxToolkit {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OnnxToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceToolkit for OnnxToolkit {
    fn offline_recognizer(
        &self,
        _config: &ServerConfig,
        _options: &RecognizerOptions,
    ) -> Result<Box<dyn OfflineRecognizer>, ToolkitError> {
        Err(ToolkitError::Backend(
            "offline recognizer: no decoder backend linked into this build".to_string(),
        ))
    }

    fn online_recognizer(
        &self,
        _config: &ServerConfig,
        _options: &RecognizerOptions,
    ) -> Result<Box<dyn OnlineRecognizer>, ToolkitError> {
        Err(ToolkitError::Backend(
            "online recognizer: no decoder backend linked into this build".to_string(),
        ))
    }

    fn vad(
        &self,
        config: &ServerConfig,
        min_silence: f32,
    ) -> Result<Box<dyn VoiceActivityDetector>, ToolkitError> {
        let vad_config = silero::SileroVadConfig {
            model_path: config.vad.model.clone(),
            threshold: config.vad.threshold,
            min_silence_duration: min_silence,
            min_speech_duration: config.vad.min_speech_duration,
            max_speech_duration: config.vad.max_speech_duration,
            num_threads: Some(config.num_threads),
        };
        Ok(Box::new(silero::SileroVad::new(vad_config)?))
    }

    fn embedding_extractor(
        &self,
        _config: &ServerConfig,
    ) -> Result<Box<dyn SpeakerEmbeddingExtractor>, ToolkitError> {
        Err(ToolkitError::Backend(
            "speaker embedding extractor: no backend linked into this build".to_string(),
        ))
    }

    fn embedding_manager(
        &self,
        dim: usize,
    ) -> Result<Box<dyn SpeakerEmbeddingManager>, ToolkitError> {
        Ok(Box::new(matcher::CosineEmbeddingManager::new(dim)))
    }

    fn diarizer(&self, _config: &ServerConfig) -> Result<Box<dyn SpeakerDiarizer>, ToolkitError> {
        Err(ToolkitError::Backend(
            "diarization: no backend linked into this build".to_string(),
        ))
    }

    fn punctuator(&self, _config: &ServerConfig) -> Result<Box<dyn Punctuator>, ToolkitError> {
        Err(ToolkitError::Backend(
            "punctuation: no backend linked into this build".to_string(),
        ))
    }
}
