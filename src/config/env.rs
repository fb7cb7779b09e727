//! Environment variable overrides for the server configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{RecognizerMode, ServerConfig};

/// Apply `ZASR_*` environment variables onto `config`.
pub fn apply(config: &mut ServerConfig) -> Result<()> {
    if let Ok(host) = std::env::var("ZASR_HOST") {
        config.host = host;
    }
    if let Ok(value) = std::env::var("ZASR_PORT") {
        config.port = value.parse().context("parsing ZASR_PORT")?;
    }
    if let Ok(value) = std::env::var("ZASR_MAX_CONNECTIONS") {
        config.max_connections = value.parse().context("parsing ZASR_MAX_CONNECTIONS")?;
    }
    if let Ok(value) = std::env::var("ZASR_WORKER_THREADS") {
        config.worker_threads = value.parse().context("parsing ZASR_WORKER_THREADS")?;
    }
    if let Ok(value) = std::env::var("ZASR_NUM_THREADS") {
        config.num_threads = value.parse().context("parsing ZASR_NUM_THREADS")?;
    }
    if let Ok(value) = std::env::var("ZASR_RECOGNIZER_TYPE") {
        config.recognizer.mode = RecognizerMode::parse(&value)
            .with_context(|| format!("invalid ZASR_RECOGNIZER_TYPE '{value}'"))?;
    }
    if let Ok(path) = std::env::var("ZASR_VAD_MODEL") {
        config.vad.model = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("ZASR_SENSE_VOICE_MODEL") {
        config.recognizer.sense_voice_model = Some(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var("ZASR_TOKENS") {
        config.recognizer.tokens = Some(PathBuf::from(path));
    }
    if let Ok(value) = std::env::var("ZASR_CONNECTION_TIMEOUT") {
        config.connection_timeout_seconds =
            value.parse().context("parsing ZASR_CONNECTION_TIMEOUT")?;
    }
    if let Ok(path) = std::env::var("ZASR_LOG_FILE") {
        config.log_file = Some(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var("ZASR_DATA_DIR") {
        config.data_dir = Some(PathBuf::from(path));
    }
    Ok(())
}
