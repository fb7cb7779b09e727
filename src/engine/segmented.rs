//! Segmented (offline) recognition engine.
//!
//! A voice-activity detector scans the inbound buffer in fixed windows
//! and drives utterance boundaries; each utterance is decoded by a
//! non-streaming recognizer stream created at speech start and dropped
//! at segment end.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::audio::{samples_to_ms, to_float, SAMPLE_RATE};
use crate::toolkit::{OfflineRecognizer, OfflineStream, VoiceActivityDetector};

use super::{EngineEvent, Sentence};

/// Pre-speech buffers are trimmed to this many VAD windows.
const TRIM_WINDOWS: usize = 10;

pub struct SegmentedEngine {
    vad: Box<dyn VoiceActivityDetector>,
    recognizer: Box<dyn OfflineRecognizer>,
    stream: Option<Box<dyn OfflineStream>>,

    /// Raw samples since the last segment drain; authoritative.
    samples: Vec<i16>,
    /// Float view of `samples`, kept in sync.
    floats: Vec<f32>,
    /// Next float index to submit to the VAD.
    vad_offset: usize,
    /// Next float index to feed the decoder stream.
    streamed_offset: usize,
    /// VAD window size in samples.
    window: usize,

    speech_active: bool,
    sentence: Sentence,
    counter: u32,
    total_samples: u64,

    update_interval: Duration,
    last_update: Instant,
}

impl SegmentedEngine {
    pub fn new(
        vad: Box<dyn VoiceActivityDetector>,
        recognizer: Box<dyn OfflineRecognizer>,
        window_ms: u32,
        update_interval_ms: u64,
    ) -> Self {
        let window = (SAMPLE_RATE as usize * window_ms as usize) / 1000;
        let update_interval = Duration::from_millis(update_interval_ms);
        Self {
            vad,
            recognizer,
            stream: None,
            samples: Vec::new(),
            floats: Vec::new(),
            vad_offset: 0,
            streamed_offset: 0,
            window: window.max(1),
            speech_active: false,
            sentence: Sentence::default(),
            counter: 0,
            total_samples: 0,
            update_interval,
            // Aged so the first interim decode after speech start is not
            // throttled away.
            last_update: Instant::now() - update_interval,
        }
    }

    pub fn sentence(&self) -> &Sentence {
        &self.sentence
    }

    fn now_ms(&self) -> u64 {
        samples_to_ms(self.total_samples)
    }

    /// Feed newly arrived samples through the VAD/decode loop.
    pub fn ingest(&mut self, new_samples: &[i16]) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if new_samples.is_empty() {
            return events;
        }

        self.samples.extend_from_slice(new_samples);
        self.floats.extend(to_float(new_samples));
        self.total_samples += new_samples.len() as u64;

        self.run_vad_windows(&mut events);

        if !self.speech_active {
            self.trim_idle_buffer();
        }

        if self.speech_active {
            self.feed_decoder(&mut events);
        }

        self.drain_segments(&mut events);
        events
    }

    /// Submit every complete pending window to the VAD. Samples smaller
    /// than one window accumulate until the next ingest.
    fn run_vad_windows(&mut self, events: &mut Vec<EngineEvent>) {
        while self.vad_offset + self.window <= self.floats.len() {
            let window = &self.floats[self.vad_offset..self.vad_offset + self.window];
            self.vad.accept_waveform(window);
            self.vad_offset += self.window;

            if !self.speech_active && self.vad.is_detected() {
                self.on_speech_start(events);
            }
        }
    }

    fn on_speech_start(&mut self, events: &mut Vec<EngineEvent>) {
        match self.recognizer.create_stream() {
            Ok(stream) => {
                self.stream = Some(stream);
            }
            Err(e) => {
                warn!("failed to create decoder stream: {e}");
                return;
            }
        }

        self.speech_active = true;
        self.streamed_offset = 0;
        self.counter += 1;

        let now = self.now_ms();
        self.sentence = Sentence {
            index: self.counter,
            begin_ms: now,
            current_ms: now,
            text: String::new(),
            active: true,
        };
        debug!(index = self.counter, time_ms = now, "speech started");
        events.push(EngineEvent::SentenceBegin {
            index: self.counter,
            time_ms: now,
        });
    }

    /// Keep the idle buffer bounded: before any speech has started, only
    /// the last `TRIM_WINDOWS` windows are retained.
    fn trim_idle_buffer(&mut self) {
        let keep = TRIM_WINDOWS * self.window;
        if self.floats.len() <= keep {
            return;
        }
        let discard = self.floats.len() - keep;
        self.floats.drain(..discard);
        self.samples.drain(..discard);
        self.vad_offset = self.vad_offset.saturating_sub(discard);
        self.streamed_offset = self.streamed_offset.saturating_sub(discard);
    }

    /// Feed un-streamed samples to the decoder and emit a throttled
    /// interim result when the text changed.
    fn feed_decoder(&mut self, events: &mut Vec<EngineEvent>) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        if self.streamed_offset > self.floats.len() {
            self.streamed_offset = 0;
        }
        if self.streamed_offset < self.floats.len() {
            stream.accept_waveform(SAMPLE_RATE, &self.floats[self.streamed_offset..]);
            self.streamed_offset = self.floats.len();
        }

        if self.last_update.elapsed() >= self.update_interval {
            stream.decode();
            let text = stream.text();
            self.last_update = Instant::now();

            if text != self.sentence.text {
                let now = self.now_ms();
                self.sentence.text = text.clone();
                self.sentence.current_ms = now;
                events.push(EngineEvent::Result {
                    index: self.sentence.index,
                    time_ms: now,
                    text,
                });
            }
        }
    }

    /// Drain VAD-completed segments: each drain finalizes the current
    /// sentence and clears all buffers.
    fn drain_segments(&mut self, events: &mut Vec<EngineEvent>) {
        let mut utterance: Vec<f32> = Vec::new();
        let mut drained = false;
        while !self.vad.is_empty() {
            if let Some(segment) = self.vad.pop() {
                utterance.extend(segment.samples);
            }
            drained = true;
        }
        if !drained {
            return;
        }

        if let Some(stream) = self.stream.as_mut() {
            stream.decode();
            let text = stream.text();
            let now = self.now_ms();
            self.sentence.text = text.clone();
            self.sentence.current_ms = now;

            debug!(index = self.sentence.index, "segment ended");
            events.push(EngineEvent::SentenceEnd {
                index: self.sentence.index,
                time_ms: now,
                begin_ms: self.sentence.begin_ms,
                text,
                audio: std::mem::take(&mut utterance),
            });
        }

        self.speech_active = false;
        self.streamed_offset = 0;
        self.stream = None;
        self.sentence.active = false;
        self.samples.clear();
        self.floats.clear();
        self.vad_offset = 0;
    }

    /// Flush at end of session: finalize an active sentence from what
    /// the decoder has seen so far.
    pub fn finish(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.drain_segments(&mut events);

        if self.sentence.active {
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
                audio: std::mem::take(&mut self.floats),
            });
            self.sentence.active = false;
            self.speech_active = false;
            self.stream = None;
            self.samples.clear();
            self.vad_offset = 0;
            self.streamed_offset = 0;
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::mock::{MockOfflineRecognizer, MockVad};

    fn engine() -> SegmentedEngine {
        SegmentedEngine::new(
            Box::new(MockVad::new(0.2)),
            Box::new(MockOfflineRecognizer),
            30,
            200,
        )
    }

    fn speech_i16(seconds: f32) -> Vec<i16> {
        vec![8_000; (seconds * 16_000.0) as usize]
    }

    fn silence_i16(seconds: f32) -> Vec<i16> {
        vec![0; (seconds * 16_000.0) as usize]
    }

    fn names(events: &[EngineEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                EngineEvent::SentenceBegin { .. } => "begin",
                EngineEvent::Result { .. } => "result",
                EngineEvent::SentenceEnd { .. } => "end",
            })
            .collect()
    }

    #[test]
    fn test_silence_produces_no_events() {
        let mut engine = engine();
        let events = engine.ingest(&silence_i16(1.0));
        assert!(events.is_empty());
        assert!(!engine.sentence().active);
    }

    #[test]
    fn test_full_utterance_lifecycle() {
        let mut engine = engine();
        let mut events = Vec::new();
        events.extend(engine.ingest(&silence_i16(0.5)));
        events.extend(engine.ingest(&speech_i16(1.0)));
        events.extend(engine.ingest(&silence_i16(0.5)));

        let kinds = names(&events);
        assert_eq!(kinds.first(), Some(&"begin"));
        assert_eq!(kinds.last(), Some(&"end"));
        assert!(kinds.contains(&"result"));

        match &events[0] {
            EngineEvent::SentenceBegin { index, .. } => assert_eq!(*index, 1),
            other => panic!("expected SentenceBegin, got {other:?}"),
        }
        match events.last().unwrap() {
            EngineEvent::SentenceEnd {
                index,
                begin_ms,
                time_ms,
                text,
                audio,
            } => {
                assert_eq!(*index, 1);
                assert!(begin_ms <= time_ms);
                assert!(!text.is_empty());
                assert!(!audio.is_empty());
            }
            other => panic!("expected SentenceEnd, got {other:?}"),
        }
    }

    #[test]
    fn test_two_utterances_increment_index() {
        let mut engine = engine();
        let mut events = Vec::new();
        events.extend(engine.ingest(&speech_i16(1.0)));
        events.extend(engine.ingest(&silence_i16(0.5)));
        events.extend(engine.ingest(&speech_i16(1.0)));
        events.extend(engine.ingest(&silence_i16(0.5)));

        let indices: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::SentenceEnd { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_sub_window_chunks_accumulate() {
        let mut engine = engine();
        // 100 chunks of 10 ms speech: each smaller than the 30 ms window
        let chunk = speech_i16(0.01);
        let mut events = Vec::new();
        for _ in 0..100 {
            events.extend(engine.ingest(&chunk));
        }
        events.extend(engine.ingest(&silence_i16(0.5)));
        assert!(names(&events).contains(&"end"));
    }

    #[test]
    fn test_idle_buffer_trimmed() {
        let mut engine = engine();
        for _ in 0..20 {
            engine.ingest(&silence_i16(0.5));
        }
        // 10 windows of 480 samples
        assert!(engine.floats.len() <= 10 * 480);
        assert_eq!(engine.samples.len(), engine.floats.len());
        assert!(engine.vad_offset <= engine.floats.len());
    }

    #[test]
    fn test_finish_closes_active_sentence() {
        let mut engine = engine();
        let mut events = engine.ingest(&speech_i16(1.0));
        assert!(engine.sentence().active);

        events.extend(engine.finish());
        let kinds = names(&events);
        assert_eq!(kinds.last(), Some(&"end"));
        assert!(!engine.sentence().active);

        // finish again is a no-op
        assert!(engine.finish().is_empty());
    }

    #[test]
    fn test_times_are_monotonic() {
        let mut engine = engine();
        let mut events = Vec::new();
        events.extend(engine.ingest(&silence_i16(1.0)));
        events.extend(engine.ingest(&speech_i16(1.0)));
        events.extend(engine.ingest(&silence_i16(0.5)));

        let mut last = 0;
        for event in &events {
            let time = match event {
                EngineEvent::SentenceBegin { time_ms, .. } => *time_ms,
                EngineEvent::Result { time_ms, .. } => *time_ms,
                EngineEvent::SentenceEnd { time_ms, .. } => *time_ms,
            };
            assert!(time >= last);
            last = time;
        }
    }
}
