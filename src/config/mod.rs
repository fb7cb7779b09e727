//! Server configuration.
//!
//! Configuration can come from environment variables (`ZASR_*`) or a YAML
//! file; YAML values override environment values, which override the
//! defaults. Validation runs after loading.

use std::path::PathBuf;

use anyhow::{Context, Result};

mod env;
mod validation;
mod yaml;

/// Which recognizer family the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerMode {
    /// Non-streaming SenseVoice decoder driven by VAD segmentation.
    SenseVoice,
    /// Streaming zipformer transducer with built-in endpointing.
    StreamingZipformer,
    /// Streaming paraformer with built-in endpointing.
    StreamingParaformer,
}

impl RecognizerMode {
    /// Whether this mode uses the online (incremental) engine.
    pub fn is_streaming(self) -> bool {
        !matches!(self, RecognizerMode::SenseVoice)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecognizerMode::SenseVoice => "sense-voice",
            RecognizerMode::StreamingZipformer => "streaming-zipformer",
            RecognizerMode::StreamingParaformer => "streaming-paraformer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sense-voice" => Some(RecognizerMode::SenseVoice),
            "streaming-zipformer" => Some(RecognizerMode::StreamingZipformer),
            "streaming-paraformer" => Some(RecognizerMode::StreamingParaformer),
            _ => None,
        }
    }
}

/// Recognizer model files per mode.
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub mode: RecognizerMode,
    /// SenseVoice model file (segmented mode).
    pub sense_voice_model: Option<PathBuf>,
    /// Transducer files (streaming modes).
    pub encoder: Option<PathBuf>,
    pub decoder: Option<PathBuf>,
    pub joiner: Option<PathBuf>,
    /// Token table shared by all modes.
    pub tokens: Option<PathBuf>,
    /// Default for inverse text normalization; the client `Begin`
    /// payload can override it per session.
    pub use_itn: bool,
}

/// Voice activity detection settings (segmented mode only).
#[derive(Debug, Clone)]
pub struct VadSettings {
    pub model: PathBuf,
    pub threshold: f32,
    /// Seconds of silence that close an utterance.
    pub min_silence_duration: f32,
    /// Seconds of speech below which a segment is discarded.
    pub min_speech_duration: f32,
    /// Seconds of speech after which a segment is force-closed.
    pub max_speech_duration: f32,
    /// VAD submission window in milliseconds.
    pub window_ms: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            model: PathBuf::new(),
            threshold: 0.5,
            min_silence_duration: 0.1,
            min_speech_duration: 0.25,
            max_speech_duration: 8.0,
            window_ms: 30,
        }
    }
}

/// Punctuation post-processing settings.
#[derive(Debug, Clone, Default)]
pub struct PunctuationSettings {
    pub enabled: bool,
    pub model: Option<PathBuf>,
}

/// Speaker identification settings.
#[derive(Debug, Clone)]
pub struct SpeakerSettings {
    pub enabled: bool,
    pub model: Option<PathBuf>,
    /// Voice-print catalog root; `$HOME/.zasr/voice-prints` when unset.
    pub catalog_dir: Option<PathBuf>,
    pub similarity_threshold: f32,
    /// Auto-register unmatched speakers as `unknown-<N>`.
    pub auto_track: bool,
}

impl Default for SpeakerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: None,
            catalog_dir: None,
            similarity_threshold: 0.75,
            auto_track: true,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub worker_threads: usize,
    /// Must be 16000.
    pub sample_rate: u32,
    pub recognizer: RecognizerConfig,
    pub vad: VadSettings,
    pub punctuation: PunctuationSettings,
    pub speaker: SpeakerSettings,
    /// Threads per inference session.
    pub num_threads: usize,
    /// Throttle between interim `Result` events, in milliseconds.
    pub update_interval_ms: u64,
    pub connection_timeout_seconds: u64,
    pub recognition_timeout_seconds: u64,
    pub data_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2026,
            max_connections: 256,
            worker_threads: 4,
            sample_rate: 16_000,
            recognizer: RecognizerConfig {
                mode: RecognizerMode::SenseVoice,
                sense_voice_model: None,
                encoder: None,
                decoder: None,
                joiner: None,
                tokens: None,
                use_itn: true,
            },
            vad: VadSettings::default(),
            punctuation: PunctuationSettings::default(),
            speaker: SpeakerSettings::default(),
            num_threads: 2,
            update_interval_ms: 200,
            connection_timeout_seconds: 15,
            recognition_timeout_seconds: 30,
            data_dir: None,
            log_file: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `ZASR_*` environment variables over the
    /// defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        env::apply(&mut config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load a YAML configuration file, applied over environment values.
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let overrides: yaml::YamlConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        let mut config = Self::default();
        env::apply(&mut config)?;
        yaml::apply(&mut config, overrides)?;

        validation::validate(&config)?;
        Ok(config)
    }

    /// The listen address as "host:port".
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
