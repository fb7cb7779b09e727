//! # zasr
//!
//! Streaming automatic speech-recognition gateway. Clients open a
//! WebSocket, negotiate a session with a `Begin` command, stream raw
//! 16 kHz s16le PCM, and receive incremental transcription events
//! (`SentenceBegin`, `Result`, `SentenceEnd`, `Completed`). Finalized
//! sentences can be tagged with a speaker identity from a persistent
//! voice-print catalog.
//!
//! Neural inference is consumed through the [`toolkit`] capability
//! traits; the crate bundles an ONNX Silero voice activity detector and
//! a cosine-similarity embedding matcher, and ships scripted mocks for
//! tests.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod protocol;
pub mod server;
pub mod session;
pub mod speaker;
pub mod state;
pub mod toolkit;

pub use config::ServerConfig;
pub use state::AppState;
