//! Per-session recognition engines.
//!
//! A session owns exactly one engine, chosen by the server's recognizer
//! mode: the segmented engine drives a non-streaming decoder with VAD
//! utterance boundaries, the streaming engine feeds an incremental
//! decoder with built-in endpointing. Engines are synchronous; the
//! server runs ingestion on blocking worker tasks.

mod segmented;
mod streaming;

pub use segmented::SegmentedEngine;
pub use streaming::StreamingEngine;

use crate::config::ServerConfig;
use crate::toolkit::{InferenceToolkit, RecognizerOptions, ToolkitError};

/// An in-flight utterance.
#[derive(Debug, Clone, Default)]
pub struct Sentence {
    /// 1-based monotonic index within the session.
    pub index: u32,
    /// Milliseconds since session start when the sentence opened.
    pub begin_ms: u64,
    /// Milliseconds of the latest update.
    pub current_ms: u64,
    /// Latest decoded text.
    pub text: String,
    pub active: bool,
}

/// Events produced by an engine while ingesting audio.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    SentenceBegin {
        index: u32,
        time_ms: u64,
    },
    Result {
        index: u32,
        time_ms: u64,
        text: String,
    },
    SentenceEnd {
        index: u32,
        time_ms: u64,
        begin_ms: u64,
        text: String,
        /// Utterance audio for speaker identification.
        audio: Vec<f32>,
    },
}

/// Per-session engine settings resolved from server config plus the
/// client `Begin` payload.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub use_itn: bool,
    /// Effective VAD min-silence in seconds, after the client override.
    pub min_silence_duration: f32,
    pub update_interval_ms: u64,
}

/// The two engine shapes behind one session.
pub enum Engine {
    Segmented(SegmentedEngine),
    Streaming(StreamingEngine),
}

impl Engine {
    /// Build the engine matching the server's recognizer mode.
    pub fn create(
        toolkit: &dyn InferenceToolkit,
        config: &ServerConfig,
        settings: EngineSettings,
    ) -> Result<Self, ToolkitError> {
        let options = RecognizerOptions {
            mode: config.recognizer.mode,
            use_itn: settings.use_itn,
        };

        if config.recognizer.mode.is_streaming() {
            let recognizer = toolkit.online_recognizer(config, &options)?;
            Ok(Engine::Streaming(StreamingEngine::new(recognizer)?))
        } else {
            let vad = toolkit.vad(config, settings.min_silence_duration)?;
            let recognizer = toolkit.offline_recognizer(config, &options)?;
            Ok(Engine::Segmented(SegmentedEngine::new(
                vad,
                recognizer,
                config.vad.window_ms,
                settings.update_interval_ms,
            )))
        }
    }

    /// Feed newly arrived samples and collect events.
    pub fn ingest(&mut self, samples: &[i16]) -> Vec<EngineEvent> {
        match self {
            Engine::Segmented(engine) => engine.ingest(samples),
            Engine::Streaming(engine) => engine.ingest(samples),
        }
    }

    /// Flush at end of session: close any active sentence.
    pub fn finish(&mut self) -> Vec<EngineEvent> {
        match self {
            Engine::Segmented(engine) => engine.finish(),
            Engine::Streaming(engine) => engine.finish(),
        }
    }

    /// Whether a sentence is currently open.
    pub fn has_active_sentence(&self) -> bool {
        match self {
            Engine::Segmented(engine) => engine.sentence().active,
            Engine::Streaming(engine) => engine.sentence().active,
        }
    }
}
