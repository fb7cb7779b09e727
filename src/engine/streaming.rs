//! Streaming (online) recognition engine.
//!
//! One decoder stream lives for the whole session; endpoint detection is
//! intrinsic to the decoder. The engine accumulates per-sentence audio
//! for speaker identification and resets the stream in place at each
//! endpoint.

use tracing::debug;

use crate::audio::{samples_to_ms, to_float, SAMPLE_RATE};
use crate::toolkit::{OnlineRecognizer, OnlineStream, ToolkitError};

use super::{EngineEvent, Sentence};

pub struct StreamingEngine {
    recognizer: Box<dyn OnlineRecognizer>,
    stream: Option<Box<dyn OnlineStream>>,
    /// Audio of the current sentence, for speaker identification.
    sentence_audio: Vec<f32>,
    sentence: Sentence,
    counter: u32,
    total_samples: u64,
}

impl StreamingEngine {
    pub fn new(recognizer: Box<dyn OnlineRecognizer>) -> Result<Self, ToolkitError> {
        Ok(Self {
            recognizer,
            stream: None,
            sentence_audio: Vec::new(),
            sentence: Sentence::default(),
            counter: 0,
            total_samples: 0,
        })
    }

    pub fn sentence(&self) -> &Sentence {
        &self.sentence
    }

    fn now_ms(&self) -> u64 {
        samples_to_ms(self.total_samples)
    }

    fn open_sentence(&mut self, events: &mut Vec<EngineEvent>) {
        self.counter += 1;
        let now = self.now_ms();
        self.sentence = Sentence {
            index: self.counter,
            begin_ms: now,
            current_ms: now,
            text: String::new(),
            active: true,
        };
        debug!(index = self.counter, time_ms = now, "sentence opened");
        events.push(EngineEvent::SentenceBegin {
            index: self.counter,
            time_ms: now,
        });
    }

    /// Feed newly arrived samples into the long-lived decoder stream.
    pub fn ingest(&mut self, new_samples: &[i16]) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if new_samples.is_empty() {
            return events;
        }

        if self.stream.is_none() {
            match self.recognizer.create_stream() {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.open_sentence(&mut events);
                }
                Err(e) => {
                    tracing::warn!("failed to create decoder stream: {e}");
                    return events;
                }
            }
        }

        let floats = to_float(new_samples);
        self.total_samples += new_samples.len() as u64;
        self.sentence_audio.extend_from_slice(&floats);

        let Some(stream) = self.stream.as_mut() else {
            return events;
        };
        stream.accept_waveform(SAMPLE_RATE, &floats);

        while stream.is_ready() {
            stream.decode();
        }

        let text = stream.text();
        if text != self.sentence.text {
            let now = samples_to_ms(self.total_samples);
            self.sentence.text = text.clone();
            self.sentence.current_ms = now;
            events.push(EngineEvent::Result {
                index: self.sentence.index,
                time_ms: now,
                text,
            });
        }

        if stream.is_endpoint() {
            stream.decode();
            let final_text = stream.text();
            let now = samples_to_ms(self.total_samples);
            self.sentence.text = final_text.clone();

            debug!(index = self.sentence.index, "endpoint reached");
            events.push(EngineEvent::SentenceEnd {
                index: self.sentence.index,
                time_ms: now,
                begin_ms: self.sentence.begin_ms,
                text: final_text,
                audio: std::mem::take(&mut self.sentence_audio),
            });

            stream.reset();
            self.sentence.active = false;
            self.open_sentence(&mut events);
        }

        events
    }

    /// Flush at end of session: close the sentence left open by the
    /// endpoint cycle.
    pub fn finish(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if !self.sentence.active {
            return events;
        }

        if let Some(stream) = self.stream.as_mut() {
            stream.decode();
            self.sentence.text = stream.text();
        }
        let now = self.now_ms();
        events.push(EngineEvent::SentenceEnd {
            index: self.sentence.index,
            time_ms: now,
            begin_ms: self.sentence.begin_ms,
            text: self.sentence.text.clone(),
            audio: std::mem::take(&mut self.sentence_audio),
        });
        self.sentence.active = false;
        events
    }
}
