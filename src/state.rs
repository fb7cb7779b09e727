//! Shared application state.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::server::ConnectionRegistry;
use crate::speaker::SpeakerIdentifier;
use crate::toolkit::{InferenceToolkit, Punctuator};

/// State shared by every connection handler.
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub toolkit: Arc<dyn InferenceToolkit>,
    pub registry: Arc<ConnectionRegistry>,
    /// Bounds concurrent CPU-bound audio workers.
    pub workers: Arc<Semaphore>,
    /// Shared speaker identifier; `None` when disabled or unavailable.
    pub speaker: Option<Arc<SpeakerIdentifier>>,
    /// Shared punctuation model; `None` means passthrough.
    pub punctuator: Option<Arc<dyn Punctuator>>,
}

impl AppState {
    /// Build the shared state: connection registry, worker pool, and the
    /// optional speaker-identification and punctuation handles.
    ///
    /// A speaker or punctuation model that fails to load is logged and
    /// disabled; sessions continue without attribution or with raw text.
    pub fn new(config: ServerConfig, toolkit: Arc<dyn InferenceToolkit>) -> Result<Arc<Self>> {
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new(config.max_connections));
        let workers = Arc::new(Semaphore::new(config.worker_threads));

        let speaker = if config.speaker.enabled {
            match SpeakerIdentifier::new(toolkit.as_ref(), &config) {
                Ok(identifier) => {
                    info!("speaker identification enabled");
                    Some(Arc::new(identifier))
                }
                Err(e) => {
                    warn!("speaker identification unavailable: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        let punctuator: Option<Arc<dyn Punctuator>> = if config.punctuation.enabled {
            match toolkit.punctuator(&config) {
                Ok(punctuator) => {
                    info!("punctuation enabled");
                    Some(punctuator.into())
                }
                Err(e) => {
                    warn!("punctuation unavailable, passing text through: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Arc::new(Self {
            config,
            toolkit,
            registry,
            workers,
            speaker,
            punctuator,
        }))
    }
}
