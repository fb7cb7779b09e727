//! Inbound command parsing and outbound frame construction.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::{ErrorCode, ProtocolError, STATUS_SUCCESS};

const SUCCESS_TEXT: &str = "Gateway:SUCCESS:Success.";

/// Payload of the `Begin` command.
#[derive(Debug, Clone, Deserialize)]
pub struct BeginPayload {
    /// Audio container format; only "pcm" is accepted.
    #[serde(default = "default_fmt")]
    pub fmt: String,
    /// Sample rate in Hz; only 16000 is accepted.
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// Enable inverse text normalization in the decoder.
    #[serde(default = "default_itn")]
    pub itn: bool,
    /// Sentence-break silence threshold in milliseconds. Overrides the
    /// server VAD min-silence when greater than 50.
    #[serde(default = "default_silence")]
    pub silence: u32,
    /// Client-chosen session id; a UUIDv4 is generated when absent.
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_fmt() -> String {
    "pcm".to_string()
}

fn default_rate() -> u32 {
    16_000
}

fn default_itn() -> bool {
    true
}

fn default_silence() -> u32 {
    800
}

impl Default for BeginPayload {
    fn default() -> Self {
        Self {
            fmt: default_fmt(),
            rate: default_rate(),
            itn: default_itn(),
            silence: default_silence(),
            session_id: None,
        }
    }
}

/// A parsed inbound text command.
#[derive(Debug)]
pub enum InboundCommand {
    Begin(BeginPayload),
    End,
}

impl InboundCommand {
    /// Parse one inbound text frame.
    ///
    /// Parsing is strict about the envelope (header object, name field)
    /// but lenient about payload fields, which all carry defaults.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            ProtocolError::new(ErrorCode::InvalidJson, format!("Invalid JSON format: {e}"))
        })?;

        let header = match value.get("header") {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(ProtocolError::new(
                    ErrorCode::MissingHeader,
                    "Missing or invalid header",
                ))
            }
        };

        let name = match header.get("name").and_then(Value::as_str) {
            Some(name) => name,
            None => {
                return Err(ProtocolError::new(
                    ErrorCode::MissingName,
                    "Missing name in header",
                ))
            }
        };

        let payload = value.get("payload").cloned().unwrap_or_else(|| json!({}));

        match name {
            "Begin" => {
                let payload: BeginPayload = serde_json::from_value(payload).map_err(|e| {
                    ProtocolError::new(
                        ErrorCode::ProtocolProcessing,
                        format!("Error processing protocol message: {e}"),
                    )
                })?;
                Ok(InboundCommand::Begin(payload))
            }
            "End" => Ok(InboundCommand::End),
            other => Err(ProtocolError::new(
                ErrorCode::UnsupportedName,
                format!("Unsupported message name: {other}"),
            )),
        }
    }
}

/// Speaker attribution attached to `Result` / `SentenceEnd` payloads.
#[derive(Debug, Clone)]
pub struct SpeakerTag {
    pub id: String,
    pub name: String,
}

/// Header of every outbound frame.
#[derive(Debug, Clone, Serialize)]
pub struct Header {
    pub name: &'static str,
    pub status: u32,
    pub mid: String,
    pub status_text: String,
}

/// One outbound frame: header plus event-specific payload.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub header: Header,
    pub payload: Value,
}

impl Frame {
    fn event(name: &'static str, payload: Value) -> Self {
        Self {
            header: Header {
                name,
                status: STATUS_SUCCESS,
                mid: Uuid::new_v4().to_string(),
                status_text: SUCCESS_TEXT.to_string(),
            },
            payload,
        }
    }

    pub fn started(session_id: &str) -> Self {
        Self::event("Started", json!({ "sid": session_id }))
    }

    pub fn sentence_begin(index: u32, time_ms: u64) -> Self {
        Self::event("SentenceBegin", json!({ "idx": index, "time": time_ms }))
    }

    pub fn result(index: u32, time_ms: u64, text: &str, speaker: Option<&SpeakerTag>) -> Self {
        let mut payload = json!({ "idx": index, "time": time_ms, "text": text });
        attach_speaker(&mut payload, speaker);
        Self::event("Result", payload)
    }

    pub fn sentence_end(
        index: u32,
        time_ms: u64,
        begin_ms: u64,
        text: &str,
        speaker: Option<&SpeakerTag>,
    ) -> Self {
        let mut payload = json!({
            "idx": index,
            "time": time_ms,
            "begin": begin_ms,
            "text": text,
        });
        attach_speaker(&mut payload, speaker);
        Self::event("SentenceEnd", payload)
    }

    pub fn completed() -> Self {
        Self::event("Completed", json!({}))
    }

    pub fn failed(code: ErrorCode, status_text: impl Into<String>) -> Self {
        Self {
            header: Header {
                name: "Failed",
                status: code.code(),
                mid: Uuid::new_v4().to_string(),
                status_text: status_text.into(),
            },
            payload: json!({}),
        }
    }

    /// The event name, for logging and tests.
    pub fn name(&self) -> &'static str {
        self.header.name
    }
}

impl From<&ProtocolError> for Frame {
    fn from(err: &ProtocolError) -> Self {
        Frame::failed(err.code(), err.message())
    }
}

fn attach_speaker(payload: &mut Value, speaker: Option<&SpeakerTag>) {
    if let (Value::Object(map), Some(tag)) = (payload, speaker) {
        map.insert("speaker_id".to_string(), json!(tag.id));
        map.insert("speaker".to_string(), json!(tag.name));
    }
}
