//! Protocol error taxonomy and wire status codes.

use thiserror::Error;

/// Status carried on every successful outbound frame.
pub const STATUS_SUCCESS: u32 = 20_000_000;

/// Every error the protocol layer can report on a `Failed` frame.
///
/// The 1xxx range covers transcription state and configuration errors,
/// the 2xxx range covers message/protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// `Begin` received in a state other than `Connected`.
    InvalidStateForStart,
    /// `Begin` payload `fmt` is not `pcm`.
    UnsupportedAudioFormat,
    /// `Begin` payload `rate` is not 16000.
    UnsupportedSampleRate,
    /// Engine or session setup failed while processing `Begin`.
    StartProcessingFailed,
    /// `End` received before any transcription was started.
    NotStarted,
    /// Binary audio received before `Begin` or in a closed state.
    NotStartedOrWrongState,
    /// Text frame was not valid JSON.
    InvalidJson,
    /// Unexpected failure while handling a message.
    MessageProcessing,
    /// Frame lacked a `header` object.
    MissingHeader,
    /// Header lacked a `name` field.
    MissingName,
    /// Header `name` is not a supported command.
    UnsupportedName,
    /// Unexpected failure while handling a protocol command.
    ProtocolProcessing,
    /// Server-side configuration was unavailable during `Begin`.
    ServerConfigUnavailable,
}

impl ErrorCode {
    /// The numeric code written to `header.status` on `Failed` frames.
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::InvalidStateForStart => 1001,
            ErrorCode::UnsupportedAudioFormat => 1002,
            ErrorCode::UnsupportedSampleRate => 1003,
            ErrorCode::StartProcessingFailed => 1004,
            ErrorCode::NotStarted => 1005,
            ErrorCode::NotStartedOrWrongState => 1006,
            ErrorCode::InvalidJson => 2001,
            ErrorCode::MessageProcessing => 2002,
            ErrorCode::MissingHeader => 2003,
            ErrorCode::MissingName => 2004,
            ErrorCode::UnsupportedName => 2005,
            ErrorCode::ProtocolProcessing => 2006,
            ErrorCode::ServerConfigUnavailable => 2007,
        }
    }
}

/// A protocol-level failure destined for a `Failed` frame.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProtocolError {
    code: ErrorCode,
    message: String,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(ErrorCode::InvalidStateForStart.code(), 1001);
        assert_eq!(ErrorCode::UnsupportedAudioFormat.code(), 1002);
        assert_eq!(ErrorCode::UnsupportedSampleRate.code(), 1003);
        assert_eq!(ErrorCode::StartProcessingFailed.code(), 1004);
        assert_eq!(ErrorCode::NotStarted.code(), 1005);
        assert_eq!(ErrorCode::NotStartedOrWrongState.code(), 1006);
        assert_eq!(ErrorCode::InvalidJson.code(), 2001);
        assert_eq!(ErrorCode::MessageProcessing.code(), 2002);
        assert_eq!(ErrorCode::MissingHeader.code(), 2003);
        assert_eq!(ErrorCode::MissingName.code(), 2004);
        assert_eq!(ErrorCode::UnsupportedName.code(), 2005);
        assert_eq!(ErrorCode::ProtocolProcessing.code(), 2006);
        assert_eq!(ErrorCode::ServerConfigUnavailable.code(), 2007);
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::new(ErrorCode::InvalidJson, "Invalid JSON format: eof");
        assert_eq!(err.to_string(), "Invalid JSON format: eof");
        assert_eq!(err.code().code(), 2001);
    }
}
