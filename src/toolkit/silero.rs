//! Silero voice activity detection.
//!
//! The detector couples an ONNX Silero model (per-frame speech
//! probability) with a segmentation state machine that turns frame
//! probabilities into completed speech segments. The ONNX half is gated
//! behind the `silero-vad` feature; without it a no-op stub is compiled
//! so the crate builds without onnxruntime.

use std::path::PathBuf;

#[cfg(feature = "silero-vad")]
mod model;
mod segmenter;

pub use segmenter::SpeechSegmenter;

use super::{SpeechSegment, ToolkitError, VoiceActivityDetector};

/// Samples per Silero inference frame at 16 kHz.
pub const FRAME_SIZE: usize = 512;

/// Context samples carried over between frames at 16 kHz.
pub const CONTEXT_SIZE: usize = 64;

/// Configuration for the Silero detector.
#[derive(Debug, Clone)]
pub struct SileroVadConfig {
    /// Path to the Silero ONNX model file.
    pub model_path: PathBuf,
    /// Speech probability threshold (0.0 to 1.0). 0.5 is the Silero
    /// recommendation.
    pub threshold: f32,
    /// Seconds of trailing silence that close a speech segment.
    pub min_silence_duration: f32,
    /// Seconds of speech required before a segment counts as speech.
    pub min_speech_duration: f32,
    /// Maximum seconds of speech before a segment is force-closed.
    pub max_speech_duration: f32,
    /// CPU threads for ONNX inference. A single thread is sufficient.
    pub num_threads: Option<usize>,
}

impl Default for SileroVadConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            threshold: 0.5,
            min_silence_duration: 0.1,
            min_speech_duration: 0.25,
            max_speech_duration: 8.0,
            num_threads: Some(1),
        }
    }
}

/// ONNX-backed Silero VAD implementing [`VoiceActivityDetector`].
#[cfg(feature = "silero-vad")]
pub struct SileroVad {
    model: model::SileroModel,
    segmenter: SpeechSegmenter,
    pending: Vec<f32>,
}

#[cfg(feature = "silero-vad")]
impl SileroVad {
    pub fn new(config: SileroVadConfig) -> Result<Self, ToolkitError> {
        let model = model::SileroModel::new(&config.model_path, config.num_threads)?;
        let segmenter = SpeechSegmenter::new(
            config.threshold,
            config.min_silence_duration,
            config.min_speech_duration,
            config.max_speech_duration,
        );
        Ok(Self {
            model,
            segmenter,
            pending: Vec::new(),
        })
    }
}

#[cfg(feature = "silero-vad")]
impl VoiceActivityDetector for SileroVad {
    fn accept_waveform(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);

        let mut consumed = 0;
        while self.pending.len() - consumed >= FRAME_SIZE {
            let frame = &self.pending[consumed..consumed + FRAME_SIZE];
            match self.model.process_frame(frame) {
                Ok(probability) => self.segmenter.push(frame, probability),
                Err(e) => {
                    // A failed frame is treated as silence; the stream
                    // continues with the next frame.
                    tracing::warn!("silero inference failed: {e}");
                    self.segmenter.push(frame, 0.0);
                }
            }
            consumed += FRAME_SIZE;
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

/// No-op stand-in compiled when the `silero-vad` feature is disabled.
/// Never detects speech, so segmented sessions produce no sentences.
#[cfg(not(feature = "silero-vad"))]
pub struct SileroVad {
    _config: SileroVadConfig,
}

#[cfg(not(feature = "silero-vad"))]
impl SileroVad {
    pub fn new(config: SileroVadConfig) -> Result<Self, ToolkitError> {
        Ok(Self { _config: config })
    }
}

#[cfg(not(feature = "silero-vad"))]
impl VoiceActivityDetector for SileroVad {
    fn accept_waveform(&mut self, _samples: &[f32]) {}

    fn is_detected(&self) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        true
    }

    fn pop(&mut self) -> Option<SpeechSegment> {
        None
    }
}
