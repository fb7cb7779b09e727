//! Per-connection session state machine.
//!
//! Translates inbound protocol commands and binary audio into outbound
//! events, owning the engine, the optional speaker identifier handle and
//! the optional punctuation handle for one connection.
//!
//! ```text
//! Connected --Begin(valid)--> Started --binary--> Processing
//! Started/Processing --End--> drain, Completed, Closed
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::engine::{Engine, EngineEvent, EngineSettings};
use crate::protocol::{
    BeginPayload, ErrorCode, Frame, InboundCommand, SpeakerTag,
};
use crate::speaker::SpeakerIdentifier;
use crate::toolkit::{InferenceToolkit, Punctuator};

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Started,
    Processing,
    Closing,
    Closed,
}

/// What the session wants the transport to do.
#[derive(Debug)]
pub enum SessionOutput {
    /// Send a protocol frame.
    Frame(Frame),
    /// Close the channel with a normal status and this reason.
    Close { reason: &'static str },
}

/// One client's streaming transcription exchange.
pub struct Session {
    config: Arc<ServerConfig>,
    toolkit: Arc<dyn InferenceToolkit>,
    speaker: Option<Arc<SpeakerIdentifier>>,
    punctuator: Option<Arc<dyn Punctuator>>,

    state: SessionState,
    session_id: String,
    engine: Option<Engine>,
}

impl Session {
    pub fn new(
        config: Arc<ServerConfig>,
        toolkit: Arc<dyn InferenceToolkit>,
        speaker: Option<Arc<SpeakerIdentifier>>,
        punctuator: Option<Arc<dyn Punctuator>>,
    ) -> Self {
        Self {
            config,
            toolkit,
            speaker,
            punctuator,
            state: SessionState::Connected,
            session_id: String::new(),
            engine: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Handle one inbound text frame.
    pub fn on_text(&mut self, text: &str) -> Vec<SessionOutput> {
        match InboundCommand::parse(text) {
            Ok(InboundCommand::Begin(payload)) => self.handle_begin(payload),
            Ok(InboundCommand::End) => self.handle_end(),
            Err(e) => {
                warn!(code = e.code().code(), "protocol error: {e}");
                vec![SessionOutput::Frame(Frame::from(&e))]
            }
        }
    }

    fn handle_begin(&mut self, payload: BeginPayload) -> Vec<SessionOutput> {
        debug!(state = ?self.state, "handling Begin");
        if self.state != SessionState::Connected {
            return fail(
                ErrorCode::InvalidStateForStart,
                "Invalid state for StartTranscription",
            );
        }

        if payload.fmt != "pcm" {
            return fail(
                ErrorCode::UnsupportedAudioFormat,
                format!("Unsupported audio format: {}", payload.fmt),
            );
        }
        if payload.rate != 16_000 {
            return fail(
                ErrorCode::UnsupportedSampleRate,
                format!("Unsupported sample rate: {}Hz", payload.rate),
            );
        }

        // The client silence threshold overrides the server VAD setting
        // only when plausibly above jitter.
        let min_silence_duration = if payload.silence > 50 {
            payload.silence as f32 / 1000.0
        } else {
            self.config.vad.min_silence_duration
        };
        let settings = EngineSettings {
            use_itn: payload.itn,
            min_silence_duration,
            update_interval_ms: self.config.update_interval_ms,
        };

        let engine = match Engine::create(self.toolkit.as_ref(), &self.config, settings) {
            Ok(engine) => engine,
            Err(e) => {
                warn!("failed to set up engine: {e}");
                return fail(
                    ErrorCode::StartProcessingFailed,
                    format!("Error processing StartTranscription: {e}"),
                );
            }
        };

        self.engine = Some(engine);
        self.session_id = payload
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.state = SessionState::Started;

        info!(session_id = %self.session_id, "transcription started");
        vec![SessionOutput::Frame(Frame::started(&self.session_id))]
    }

    fn handle_end(&mut self) -> Vec<SessionOutput> {
        debug!(state = ?self.state, "handling End");
        if self.state == SessionState::Connected {
            return fail(ErrorCode::NotStarted, "Transcription not started");
        }
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return Vec::new();
        }

        let mut outputs = Vec::new();
        if let Some(engine) = self.engine.as_mut() {
            for event in engine.finish() {
                outputs.push(SessionOutput::Frame(self.event_to_frame(event)));
            }
        }
        outputs.push(SessionOutput::Frame(Frame::completed()));
        outputs.push(SessionOutput::Close {
            reason: "Transcription completed",
        });

        self.state = SessionState::Closed;
        self.engine = None;
        info!(session_id = %self.session_id, "transcription completed");
        outputs
    }

    /// Handle one inbound binary frame of raw PCM.
    pub fn on_binary(&mut self, data: &[u8]) -> Vec<SessionOutput> {
        if !matches!(
            self.state,
            SessionState::Started | SessionState::Processing
        ) {
            return fail(
                ErrorCode::NotStartedOrWrongState,
                "Transcription not started or wrong state",
            );
        }

        let samples = crate::audio::samples_from_bytes(data);
        if samples.is_empty() {
            return Vec::new();
        }

        self.state = SessionState::Processing;

        let events = match self.engine.as_mut() {
            Some(engine) => engine.ingest(&samples),
            None => return Vec::new(),
        };
        events
            .into_iter()
            .map(|event| SessionOutput::Frame(self.event_to_frame(event)))
            .collect()
    }

    /// Close the session, emitting best-effort terminal events.
    /// Idempotent: a session already closing or closed does nothing.
    pub fn close(&mut self) -> Vec<SessionOutput> {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return Vec::new();
        }
        let had_started = self.state != SessionState::Connected;
        self.state = SessionState::Closing;

        let mut outputs = Vec::new();
        if let Some(engine) = self.engine.as_mut() {
            if engine.has_active_sentence() {
                for event in engine.finish() {
                    outputs.push(SessionOutput::Frame(self.event_to_frame(event)));
                }
            }
        }
        if had_started {
            outputs.push(SessionOutput::Frame(Frame::completed()));
        }

        self.engine = None;
        self.state = SessionState::Closed;
        debug!(session_id = %self.session_id, "session closed");
        outputs
    }

    fn event_to_frame(&self, event: EngineEvent) -> Frame {
        match event {
            EngineEvent::SentenceBegin { index, time_ms } => {
                Frame::sentence_begin(index, time_ms)
            }
            EngineEvent::Result {
                index,
                time_ms,
                text,
            } => Frame::result(index, time_ms, &text, None),
            EngineEvent::SentenceEnd {
                index,
                time_ms,
                begin_ms,
                text,
                audio,
            } => {
                let speaker = self.identify(&audio);
                let text = self.punctuate(&text);
                Frame::sentence_end(index, time_ms, begin_ms, &text, speaker.as_ref())
            }
        }
    }

    fn identify(&self, audio: &[f32]) -> Option<SpeakerTag> {
        let identifier = self.speaker.as_ref()?;
        if audio.is_empty() {
            return None;
        }
        identifier.process_segment(audio).map(|result| SpeakerTag {
            id: result.speaker_id,
            name: result.speaker_name,
        })
    }

    /// Apply punctuation to final text; passthrough when no model is
    /// configured.
    fn punctuate(&self, text: &str) -> String {
        match &self.punctuator {
            Some(punctuator) => punctuator.punctuate(text),
            None => text.to_string(),
        }
    }
}

fn fail(code: ErrorCode, message: impl Into<String>) -> Vec<SessionOutput> {
    vec![SessionOutput::Frame(Frame::failed(code, message))]
}
