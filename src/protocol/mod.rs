//! Wire protocol: inbound command parsing and outbound event frames.
//!
//! Every text frame is one JSON object of the shape
//! `{"header": {"name": ...}, "payload": {...}}`. Outbound frames carry a
//! status code, a fresh message id and a status text in the header.

mod error;
mod frames;

pub use error::{ErrorCode, ProtocolError, STATUS_SUCCESS};
pub use frames::{BeginPayload, Frame, Header, InboundCommand, SpeakerTag};
