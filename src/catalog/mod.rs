//! Persistent voice-print catalog.
//!
//! On-disk layout rooted at a configurable directory (default
//! `$HOME/.zasr/voice-prints`):
//!
//! ```text
//! <root>/voice-prints.yaml     # YAML index
//! <root>/embeddings/<id>.bin   # little-endian i32 dim + dim * f32
//! <root>/samples/<id>/<n>.wav  # copied audio samples
//! ```

mod record;
mod store;

pub use record::{id_suffix, UnknownMetadata, UnknownSpeaker, VoicePrint, VoicePrintMetadata};
pub use store::{read_embedding, write_embedding, VoicePrintCatalog};
