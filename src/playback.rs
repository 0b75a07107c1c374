//! Playback path: decode an inbound WAV, stream it to the output device,
//! and report completion.
//!
//! Runs inline on the bus-dispatch thread, which serialises overlapping
//! playback requests by construction. The record/play interlock comes from
//! flipping `playing_audio` before the first write and clearing it only
//! after the output stream has closed. `playFinished` goes out on every
//! path, malformed payloads included, so the orchestrator never hangs on a
//! reply that will not come.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::audio::{self, AudioDevice, OutputStream, RateConverter, PLAY_BLOCK_FRAMES};
use crate::bus::{play_finished_topic, MessageSink};
use crate::config::PlayerConfig;
use crate::state::ModeRegister;

pub struct PlaybackHandler {
    mode: Arc<ModeRegister>,
    player: PlayerConfig,
    device: Option<AudioDevice>,
    site: String,
    sink: Arc<dyn MessageSink>,
}

impl PlaybackHandler {
    pub fn new(
        mode: Arc<ModeRegister>,
        player: PlayerConfig,
        device: Option<AudioDevice>,
        site: String,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            mode,
            player,
            device,
            site,
            sink,
        }
    }

    /// Handle one `playBytes` request from start to completion message.
    pub fn handle(&self, request_id: &str, payload: &[u8]) {
        self.mode.set_playing(true);

        if self.player.enabled {
            info!(
                "received an audio message of {} bytes with request id {} on site {}",
                payload.len(),
                request_id,
                self.site
            );
            match self.play(payload) {
                Ok(()) => info!(
                    "finished playing audio message with id {} on site {}",
                    request_id, self.site
                ),
                Err(err) => warn!("playback of request {request_id} failed: {err:#}"),
            }
        }

        self.mode.set_playing(false);

        let body = serde_json::json!({ "id": request_id, "siteId": self.site });
        let topic = play_finished_topic(&self.site);
        debug!("publishing completion for request {request_id} on {topic}");
        self.sink.publish(&topic, body.to_string().into_bytes());
    }

    fn play(&self, payload: &[u8]) -> Result<()> {
        let mut reader =
            hound::WavReader::new(Cursor::new(payload)).context("malformed WAV payload")?;
        let spec = reader.spec();
        debug!(
            "WAV payload: {} Hz, {} bit, {} channel(s)",
            spec.sample_rate, spec.bits_per_sample, spec.channels
        );

        let device = self
            .device
            .as_ref()
            .context("no playback device resolved")?;
        // Without a device override we open at the source rate and play
        // verbatim; with one, the device's preferred rate (or the configured
        // override) wins and auto_convert may resample into it.
        let out_rate = if device.index < 0 {
            spec.sample_rate
        } else {
            self.player.frame_rate.unwrap_or(device.default_rate)
        };

        let mut stream = audio::open_output(device, spec.channels, out_rate)?;
        let mut converter = if self.player.auto_convert && spec.sample_rate != out_rate {
            debug!(
                "converting frame rate from {} to {}",
                spec.sample_rate, out_rate
            );
            Some(RateConverter::new(
                spec.sample_rate,
                out_rate,
                usize::from(spec.channels),
            )?)
        } else {
            None
        };

        let block_samples = PLAY_BLOCK_FRAMES * usize::from(spec.channels);
        let result = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 8) => pump(
                &mut reader,
                &mut stream,
                converter.as_mut(),
                block_samples,
                |s: i8| f32::from(s) / 128.0,
            ),
            (hound::SampleFormat::Int, 16) => pump(
                &mut reader,
                &mut stream,
                converter.as_mut(),
                block_samples,
                |s: i16| f32::from(s) / 32_768.0,
            ),
            (hound::SampleFormat::Int, 24) => pump(
                &mut reader,
                &mut stream,
                converter.as_mut(),
                block_samples,
                |s: i32| s as f32 / 8_388_608.0,
            ),
            (hound::SampleFormat::Int, 32) => pump(
                &mut reader,
                &mut stream,
                converter.as_mut(),
                block_samples,
                |s: i32| s as f32 / 2_147_483_648.0,
            ),
            (hound::SampleFormat::Float, _) => pump(
                &mut reader,
                &mut stream,
                converter.as_mut(),
                block_samples,
                |s: f32| s,
            ),
            (format, bits) => Err(anyhow::anyhow!(
                "unsupported WAV sample layout: {format:?}/{bits} bit"
            )),
        };
        stream.close();
        result
    }
}

/// Feed the WAV payload to the device in 2048-frame blocks, threading the
/// converter state across blocks.
fn pump<R, T>(
    reader: &mut hound::WavReader<R>,
    stream: &mut OutputStream,
    mut converter: Option<&mut RateConverter>,
    block_samples: usize,
    map: impl Fn(T) -> f32,
) -> Result<()>
where
    R: std::io::Read,
    T: hound::Sample,
{
    let mut samples = reader.samples::<T>();
    loop {
        let mut block = Vec::with_capacity(block_samples);
        while block.len() < block_samples {
            match samples.next() {
                Some(sample) => block.push(map(sample.context("unexpected end of WAV stream")?)),
                None => break,
            }
        }
        if block.is_empty() {
            break;
        }
        let ready = match converter.as_deref_mut() {
            Some(converter) => converter.process(&block)?,
            None => block,
        };
        stream.write(&ready)?;
    }
    Ok(())
}
