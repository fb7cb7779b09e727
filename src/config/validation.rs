//! Configuration validation.

use anyhow::{bail, Result};

use super::{RecognizerMode, ServerConfig};

/// Validate a loaded configuration before the server starts.
pub fn validate(config: &ServerConfig) -> Result<()> {
    match config.recognizer.mode {
        RecognizerMode::SenseVoice => {
            if config.vad.model.as_os_str().is_empty() {
                bail!("vad.model is required for recognizer type 'sense-voice'");
            }
        }
        RecognizerMode::StreamingZipformer => {
            if config.recognizer.encoder.is_none()
                || config.recognizer.decoder.is_none()
                || config.recognizer.joiner.is_none()
            {
                bail!(
                    "encoder, decoder and joiner are required for recognizer type \
                     'streaming-zipformer'"
                );
            }
        }
        RecognizerMode::StreamingParaformer => {
            if config.recognizer.encoder.is_none() || config.recognizer.decoder.is_none() {
                bail!(
                    "encoder and decoder are required for recognizer type \
                     'streaming-paraformer'"
                );
            }
        }
    }

    if config.sample_rate != 16_000 {
        bail!("sample rate must be 16000");
    }
    if config.max_connections == 0 {
        bail!("max_connections must be > 0");
    }
    if config.worker_threads == 0 {
        bail!("worker_threads must be > 0");
    }
    if config.num_threads == 0 {
        bail!("num_threads must be > 0");
    }
    if !(config.vad.threshold > 0.0 && config.vad.threshold <= 1.0) {
        bail!("vad.threshold must be in range (0, 1]");
    }
    if config.vad.min_silence_duration < 0.0 {
        bail!("vad.min_silence_duration must be >= 0");
    }
    if config.vad.min_speech_duration <= 0.0 {
        bail!("vad.min_speech_duration must be > 0");
    }
    if config.vad.max_speech_duration <= 0.0 {
        bail!("vad.max_speech_duration must be > 0");
    }
    if config.vad.window_ms == 0 {
        bail!("vad.window_ms must be > 0");
    }
    if config.update_interval_ms == 0 {
        bail!("update_interval_ms must be > 0");
    }
    if config.connection_timeout_seconds == 0 {
        bail!("connection timeout must be > 0");
    }
    if config.recognition_timeout_seconds == 0 {
        bail!("recognition timeout must be > 0");
    }
    if !(config.speaker.similarity_threshold > 0.0 && config.speaker.similarity_threshold <= 1.0) {
        bail!("speaker.similarity_threshold must be in range (0, 1]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn valid_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.vad.model = PathBuf::from("models/silero.onnx");
        config
    }

    #[test]
    fn test_valid_defaults_pass() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_sense_voice_requires_vad_model() {
        let mut config = valid_config();
        config.vad.model = PathBuf::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zipformer_requires_transducer_files() {
        let mut config = valid_config();
        config.recognizer.mode = RecognizerMode::StreamingZipformer;
        assert!(validate(&config).is_err());

        config.recognizer.encoder = Some(PathBuf::from("e.onnx"));
        config.recognizer.decoder = Some(PathBuf::from("d.onnx"));
        config.recognizer.joiner = Some(PathBuf::from("j.onnx"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_sample_rate_must_be_16k() {
        let mut config = valid_config();
        config.sample_rate = 8_000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_threshold_range() {
        let mut config = valid_config();
        config.vad.threshold = 0.0;
        assert!(validate(&config).is_err());
        config.vad.threshold = 1.5;
        assert!(validate(&config).is_err());
        config.vad.threshold = 1.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = valid_config();
        config.max_connections = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.worker_threads = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.update_interval_ms = 0;
        assert!(validate(&config).is_err());
    }
}
