//! Streaming sample-rate conversion.
//!
//! The converter owns the sinc filter state, so successive calls within one
//! logical stream are seam-free; input that does not fill a whole filter
//! chunk is carried over to the next call.

use anyhow::{anyhow, Result};
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};

const MIN_RATE: u32 = 2_000;
const MAX_RATE: u32 = 192_000;

/// Frames fed to the sinc filter per process call.
const FILTER_CHUNK_FRAMES: usize = 256;

/// Stateful PCM rate converter for interleaved f32 audio.
pub struct RateConverter {
    resampler: Option<SincFixedIn<f32>>,
    channels: usize,
    carry: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Build a converter from `from_hz` to `to_hz`. Equal rates produce a
    /// pass-through converter.
    pub fn new(from_hz: u32, to_hz: u32, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(anyhow!("rate converter needs at least one channel"));
        }
        for rate in [from_hz, to_hz] {
            if !(MIN_RATE..=MAX_RATE).contains(&rate) {
                return Err(anyhow!("unsupported sample rate {rate}Hz for resampling"));
            }
        }
        let resampler = if from_hz == to_hz {
            None
        } else {
            let ratio = f64::from(to_hz) / f64::from(from_hz);
            let params = InterpolationParameters {
                sinc_len: 64,
                f_cutoff: 0.90,
                interpolation: InterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            Some(
                SincFixedIn::<f32>::new(ratio, 2.0, params, FILTER_CHUNK_FRAMES, channels)
                    .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?,
            )
        };
        Ok(Self {
            resampler,
            channels,
            carry: vec![Vec::new(); channels],
        })
    }

    /// Convert one block of interleaved samples, returning whatever full
    /// filter chunks produced. Remainder frames stay buffered for the next
    /// call on this converter.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(interleaved.to_vec());
        };

        for frame in interleaved.chunks_exact(self.channels) {
            for (channel, &sample) in self.carry.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        let mut out = Vec::new();
        while self.carry[0].len() >= FILTER_CHUNK_FRAMES {
            let block: Vec<Vec<f32>> = self
                .carry
                .iter_mut()
                .map(|channel| channel.drain(..FILTER_CHUNK_FRAMES).collect())
                .collect();
            let produced = resampler
                .process(&block, None)
                .map_err(|e| anyhow!("resampler process failed: {e:?}"))?;
            let frames = produced.first().map(Vec::len).unwrap_or(0);
            out.reserve(frames * self.channels);
            for i in 0..frames {
                for channel in &produced {
                    out.push(channel[i]);
                }
            }
        }
        Ok(out)
    }
}
