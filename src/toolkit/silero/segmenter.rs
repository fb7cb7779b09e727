//! Segmentation state machine over per-frame speech probabilities.
//!
//! Turns a stream of (frame, probability) pairs into completed speech
//! segments: a segment opens once speech has lasted `min_speech_duration`,
//! closes after `min_silence_duration` of trailing silence, and is
//! force-closed at `max_speech_duration`.

use std::collections::VecDeque;

use crate::audio::SAMPLE_RATE;
use crate::toolkit::SpeechSegment;

enum SegmentState {
    Idle,
    Speech {
        start: usize,
        samples: Vec<f32>,
        silence_run: usize,
    },
}

/// Probability-driven speech segmenter.
pub struct SpeechSegmenter {
    threshold: f32,
    min_silence_samples: usize,
    min_speech_samples: usize,
    max_speech_samples: usize,
    state: SegmentState,
    offset: usize,
    completed: VecDeque<SpeechSegment>,
}

impl SpeechSegmenter {
    pub fn new(
        threshold: f32,
        min_silence_duration: f32,
        min_speech_duration: f32,
        max_speech_duration: f32,
    ) -> Self {
        let to_samples = |seconds: f32| (seconds * SAMPLE_RATE as f32) as usize;
        Self {
            threshold,
            min_silence_samples: to_samples(min_silence_duration).max(1),
            min_speech_samples: to_samples(min_speech_duration).max(1),
            max_speech_samples: to_samples(max_speech_duration).max(1),
            state: SegmentState::Idle,
            offset: 0,
            completed: VecDeque::new(),
        }
    }

    /// Feed one frame with its speech probability.
    pub fn push(&mut self, frame: &[f32], probability: f32) {
        let is_speech = probability > self.threshold;

        match &mut self.state {
            SegmentState::Idle => {
                if is_speech {
                    self.state = SegmentState::Speech {
                        start: self.offset,
                        samples: frame.to_vec(),
                        silence_run: 0,
                    };
                }
            }
            SegmentState::Speech {
                start,
                samples,
                silence_run,
            } => {
                samples.extend_from_slice(frame);
                if is_speech {
                    *silence_run = 0;
                } else {
                    *silence_run += frame.len();
                }

                if *silence_run >= self.min_silence_samples {
                    let speech_len = samples.len().saturating_sub(*silence_run);
                    if speech_len >= self.min_speech_samples {
                        // Trim the trailing silence out of the segment.
                        samples.truncate(speech_len);
                        self.completed.push_back(SpeechSegment {
                            start: *start,
                            samples: std::mem::take(samples),
                        });
                    }
                    self.state = SegmentState::Idle;
                } else if samples.len() >= self.max_speech_samples {
                    self.completed.push_back(SpeechSegment {
                        start: *start,
                        samples: std::mem::take(samples),
                    });
                    self.state = SegmentState::Idle;
                }
            }
        }

        self.offset += frame.len();
    }

    /// Whether a segment is currently open and past the minimum speech
    /// duration.
    pub fn is_speech_active(&self) -> bool {
        match &self.state {
            SegmentState::Idle => false,
            SegmentState::Speech {
                samples,
                silence_run,
                ..
            } => samples.len().saturating_sub(*silence_run) >= self.min_speech_samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn pop(&mut self) -> Option<SpeechSegment> {
        self.completed.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 512;

    fn feed(segmenter: &mut SpeechSegmenter, frames: usize, probability: f32) {
        let frame = vec![0.1f32; FRAME];
        for _ in 0..frames {
            segmenter.push(&frame, probability);
        }
    }

    // ~32 frames of 512 samples per second at 16 kHz
    fn segmenter() -> SpeechSegmenter {
        SpeechSegmenter::new(0.5, 0.1, 0.25, 8.0)
    }

    #[test]
    fn test_idle_until_speech() {
        let mut seg = segmenter();
        feed(&mut seg, 10, 0.1);
        assert!(!seg.is_speech_active());
        assert!(seg.is_empty());
    }

    #[test]
    fn test_segment_opens_after_min_speech() {
        let mut seg = segmenter();
        // One frame (32 ms) is below the 250 ms minimum
        feed(&mut seg, 1, 0.9);
        assert!(!seg.is_speech_active());
        // 10 frames (~320 ms) crosses it
        feed(&mut seg, 9, 0.9);
        assert!(seg.is_speech_active());
    }

    #[test]
    fn test_segment_closes_after_silence() {
        let mut seg = segmenter();
        feed(&mut seg, 20, 0.9);
        assert!(seg.is_speech_active());
        // 4 frames of silence (~128 ms) exceeds the 100 ms minimum
        feed(&mut seg, 4, 0.1);
        assert!(!seg.is_speech_active());
        assert!(!seg.is_empty());

        let segment = seg.pop().unwrap();
        assert_eq!(segment.start, 0);
        // Trailing silence is trimmed from the segment
        assert!(segment.samples.len() <= 20 * FRAME);
        assert!(segment.samples.len() >= 19 * FRAME);
        assert!(seg.is_empty());
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut seg = segmenter();
        feed(&mut seg, 2, 0.9); // ~64 ms of speech
        feed(&mut seg, 4, 0.1);
        assert!(seg.is_empty());
        assert!(!seg.is_speech_active());
    }

    #[test]
    fn test_max_speech_force_close() {
        let mut seg = SpeechSegmenter::new(0.5, 0.1, 0.25, 1.0);
        // 40 frames (~1.28 s) of continuous speech against a 1 s cap
        feed(&mut seg, 40, 0.9);
        assert!(!seg.is_empty());
        let segment = seg.pop().unwrap();
        assert!(segment.samples.len() >= 16_000);
    }

    #[test]
    fn test_second_segment_start_offset() {
        let mut seg = segmenter();
        feed(&mut seg, 20, 0.9);
        feed(&mut seg, 4, 0.1);
        let first = seg.pop().unwrap();
        assert_eq!(first.start, 0);

        feed(&mut seg, 20, 0.9);
        feed(&mut seg, 4, 0.1);
        let second = seg.pop().unwrap();
        // Second segment starts after the first 24 frames
        assert_eq!(second.start, 24 * FRAME);
    }
}
