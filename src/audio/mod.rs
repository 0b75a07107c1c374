//! Audio pipeline building blocks: device I/O, PCM format adaptation,
//! stateful resampling, and voice-activity classification.
//!
//! Capture reads interleaved PCM in the recorder's configured format; the
//! VAD feed is downmixed and rate-converted on the side so the published
//! chunks keep the original format.

mod device;
mod pcm;
mod resample;
#[cfg(test)]
mod tests;
mod vad;
mod wav;

pub use device::{
    default_input, default_output, list_devices, open_input, open_output, resolve_input,
    resolve_output, AudioDevice, DeviceListing, InputStream, OutputStream,
};
pub use pcm::{decode_to_f32, downmix, encode_from_f32, f32_to_i16};
pub use resample::RateConverter;
pub use vad::SpeechDetector;
pub use wav::encode_chunk;

/// VAD frame duration dictated by the WebRTC-style detector.
pub const VAD_CHUNK_MS: u32 = 30;

/// One device read covers four VAD frames (~120 ms of audio).
pub const CAPTURE_PERIOD_MS: u32 = VAD_CHUNK_MS * 4;

/// Frames pulled from a WAV payload per playback write.
pub const PLAY_BLOCK_FRAMES: usize = 2048;

/// Sample rates the detector accepts directly.
pub const VAD_RATES: [u32; 4] = [8_000, 16_000, 32_000, 48_000];

/// Rate the VAD feed is converted to when the recorder's rate is not
/// directly supported.
pub const VAD_FALLBACK_RATE: u32 = 16_000;

/// Frames in one capture period at `rate`.
pub fn capture_chunk_frames(rate: u32) -> usize {
    (u64::from(rate) * u64::from(CAPTURE_PERIOD_MS) / 1000) as usize
}

/// Rate the VAD feed must run at for a given recorder rate.
pub fn vad_target_rate(source: u32) -> u32 {
    if VAD_RATES.contains(&source) {
        source
    } else {
        VAD_FALLBACK_RATE
    }
}
