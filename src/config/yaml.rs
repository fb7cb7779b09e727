//! YAML configuration file structure.
//!
//! All fields are optional so a file only needs to name what it changes.
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 2026
//!   max_connections: 256
//!   worker_threads: 4
//!
//! vad:
//!   model: "models/silero_vad.onnx"
//!   threshold: 0.5
//!   min_silence_duration: 0.1
//!
//! asr:
//!   type: "sense-voice"
//!   num_threads: 2
//!   use_itn: true
//!   sense_voice:
//!     model: "models/sense-voice.onnx"
//!     tokens: "models/tokens.txt"
//!
//! punctuation:
//!   enabled: true
//!   model: "models/punct.onnx"
//!
//! speaker:
//!   enabled: true
//!   model: "models/speaker-embedding.onnx"
//!   catalog_dir: "~/.zasr/voice-prints"
//!   similarity_threshold: 0.75
//!   auto_track: true
//!
//! timeouts:
//!   connection: 15
//!   recognition: 30
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{RecognizerMode, ServerConfig};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub audio: Option<AudioYaml>,
    pub vad: Option<VadYaml>,
    pub asr: Option<AsrYaml>,
    pub punctuation: Option<PunctuationYaml>,
    pub speaker: Option<SpeakerYaml>,
    pub processing: Option<ProcessingYaml>,
    pub timeouts: Option<TimeoutsYaml>,
    pub logging: Option<LoggingYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VadYaml {
    pub model: Option<PathBuf>,
    pub threshold: Option<f32>,
    pub min_silence_duration: Option<f32>,
    pub min_speech_duration: Option<f32>,
    pub max_speech_duration: Option<f32>,
    pub window_ms: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AsrYaml {
    #[serde(rename = "type")]
    pub mode: Option<String>,
    pub num_threads: Option<usize>,
    pub use_itn: Option<bool>,
    pub sense_voice: Option<SenseVoiceYaml>,
    pub streaming_zipformer: Option<TransducerYaml>,
    pub streaming_paraformer: Option<TransducerYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SenseVoiceYaml {
    pub model: Option<PathBuf>,
    pub tokens: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TransducerYaml {
    pub encoder: Option<PathBuf>,
    pub decoder: Option<PathBuf>,
    pub joiner: Option<PathBuf>,
    pub tokens: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PunctuationYaml {
    pub enabled: Option<bool>,
    pub model: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpeakerYaml {
    pub enabled: Option<bool>,
    pub model: Option<PathBuf>,
    pub catalog_dir: Option<PathBuf>,
    pub similarity_threshold: Option<f32>,
    pub auto_track: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProcessingYaml {
    pub update_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TimeoutsYaml {
    pub connection: Option<u64>,
    pub recognition: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingYaml {
    pub file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

/// Apply YAML overrides onto `config`.
pub fn apply(config: &mut ServerConfig, overrides: YamlConfig) -> Result<()> {
    if let Some(server) = overrides.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(value) = server.max_connections {
            config.max_connections = value;
        }
        if let Some(value) = server.worker_threads {
            config.worker_threads = value;
        }
    }

    if let Some(audio) = overrides.audio {
        if let Some(rate) = audio.sample_rate {
            config.sample_rate = rate;
        }
    }

    if let Some(vad) = overrides.vad {
        if let Some(model) = vad.model {
            config.vad.model = model;
        }
        if let Some(value) = vad.threshold {
            config.vad.threshold = value;
        }
        if let Some(value) = vad.min_silence_duration {
            config.vad.min_silence_duration = value;
        }
        if let Some(value) = vad.min_speech_duration {
            config.vad.min_speech_duration = value;
        }
        if let Some(value) = vad.max_speech_duration {
            config.vad.max_speech_duration = value;
        }
        if let Some(value) = vad.window_ms {
            config.vad.window_ms = value;
        }
    }

    if let Some(asr) = overrides.asr {
        if let Some(mode) = asr.mode {
            config.recognizer.mode = RecognizerMode::parse(&mode)
                .with_context(|| format!("invalid asr.type '{mode}'"))?;
        }
        if let Some(value) = asr.num_threads {
            config.num_threads = value;
        }
        if let Some(value) = asr.use_itn {
            config.recognizer.use_itn = value;
        }
        if let Some(sense_voice) = asr.sense_voice {
            if let Some(model) = sense_voice.model {
                config.recognizer.sense_voice_model = Some(model);
            }
            if let Some(tokens) = sense_voice.tokens {
                config.recognizer.tokens = Some(tokens);
            }
        }
        let transducer = match config.recognizer.mode {
            RecognizerMode::StreamingZipformer => asr.streaming_zipformer,
            RecognizerMode::StreamingParaformer => asr.streaming_paraformer,
            RecognizerMode::SenseVoice => None,
        };
        if let Some(transducer) = transducer {
            if let Some(encoder) = transducer.encoder {
                config.recognizer.encoder = Some(encoder);
            }
            if let Some(decoder) = transducer.decoder {
                config.recognizer.decoder = Some(decoder);
            }
            if let Some(joiner) = transducer.joiner {
                config.recognizer.joiner = Some(joiner);
            }
            if let Some(tokens) = transducer.tokens {
                config.recognizer.tokens = Some(tokens);
            }
        }
    }

    if let Some(punctuation) = overrides.punctuation {
        if let Some(enabled) = punctuation.enabled {
            config.punctuation.enabled = enabled;
        }
        if let Some(model) = punctuation.model {
            config.punctuation.model = Some(model);
        }
    }

    if let Some(speaker) = overrides.speaker {
        if let Some(enabled) = speaker.enabled {
            config.speaker.enabled = enabled;
        }
        if let Some(model) = speaker.model {
            config.speaker.model = Some(model);
        }
        if let Some(dir) = speaker.catalog_dir {
            config.speaker.catalog_dir = Some(dir);
        }
        if let Some(value) = speaker.similarity_threshold {
            config.speaker.similarity_threshold = value;
        }
        if let Some(value) = speaker.auto_track {
            config.speaker.auto_track = value;
        }
    }

    if let Some(processing) = overrides.processing {
        if let Some(value) = processing.update_interval_ms {
            config.update_interval_ms = value;
        }
    }

    if let Some(timeouts) = overrides.timeouts {
        if let Some(value) = timeouts.connection {
            config.connection_timeout_seconds = value;
        }
        if let Some(value) = timeouts.recognition {
            config.recognition_timeout_seconds = value;
        }
    }

    if let Some(logging) = overrides.logging {
        if let Some(file) = logging.file {
            config.log_file = Some(file);
        }
        if let Some(dir) = logging.data_dir {
            config.data_dir = Some(dir);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_partial_yaml() {
        let yaml = r#"
server:
  port: 9000
vad:
  model: "models/silero.onnx"
  threshold: 0.6
asr:
  type: "streaming-zipformer"
  streaming_zipformer:
    encoder: "models/encoder.onnx"
    decoder: "models/decoder.onnx"
    joiner: "models/joiner.onnx"
    tokens: "models/tokens.txt"
timeouts:
  connection: 30
"#;
        let overrides: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        let mut config = ServerConfig::default();
        apply(&mut config, overrides).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0"); // untouched default
        assert_eq!(config.vad.model, PathBuf::from("models/silero.onnx"));
        assert_eq!(config.vad.threshold, 0.6);
        assert_eq!(config.recognizer.mode, RecognizerMode::StreamingZipformer);
        assert_eq!(
            config.recognizer.encoder,
            Some(PathBuf::from("models/encoder.onnx"))
        );
        assert_eq!(config.connection_timeout_seconds, 30);
    }

    #[test]
    fn test_apply_rejects_unknown_mode() {
        let overrides: YamlConfig = serde_yaml::from_str("asr:\n  type: \"whisper\"\n").unwrap();
        let mut config = ServerConfig::default();
        assert!(apply(&mut config, overrides).is_err());
    }
}
