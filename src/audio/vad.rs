//! WebRTC-style speech/silence classification over 30 ms frames.

use earshot::{VoiceActivityDetector, VoiceActivityProfile};

use super::{vad_target_rate, VAD_CHUNK_MS};

/// Per-buffer speech detector. One instance lives inside the capture worker
/// and is reset whenever the input stream is reopened.
pub struct SpeechDetector {
    detector: VoiceActivityDetector,
    rate: u32,
    frame_samples: usize,
}

impl SpeechDetector {
    /// `mode` is the config's aggressiveness 0..=3; `rate` must be one of the
    /// supported VAD rates (the capture worker converts first).
    pub fn new(mode: u8, rate: u32) -> Self {
        let profile = match mode {
            0 => VoiceActivityProfile::QUALITY,
            1 => VoiceActivityProfile::LBR,
            2 => VoiceActivityProfile::AGGRESSIVE,
            _ => VoiceActivityProfile::VERY_AGGRESSIVE,
        };
        let rate = vad_target_rate(rate);
        let frame_samples = (rate * VAD_CHUNK_MS / 1000) as usize;
        Self {
            detector: VoiceActivityDetector::new(profile),
            rate,
            frame_samples,
        }
    }

    /// True when no 30 ms frame in `samples` contains speech. Residual
    /// samples below one frame are ignored. A prediction error counts as
    /// silence, matching an empty buffer.
    pub fn is_silence(&mut self, samples: &[i16]) -> bool {
        for frame in samples.chunks_exact(self.frame_samples) {
            let speech = match self.rate {
                8_000 => self.detector.predict_8khz(frame),
                16_000 => self.detector.predict_16khz(frame),
                32_000 => self.detector.predict_32khz(frame),
                _ => self.detector.predict_48khz(frame),
            };
            if speech.unwrap_or(false) {
                return false;
            }
        }
        true
    }

    pub fn reset(&mut self) {
        self.detector.reset();
    }
}
