//! Capture worker: reads the microphone while the mode register allows it
//! and feeds publishable chunks through the VAD gate.
//!
//! The worker owns its input stream. Read failures drop back to the outer
//! loop, which reopens the stream (and thereby resets all VAD state) on the
//! next iteration.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Sender;
use tracing::{debug, error, info};

use crate::audio::{
    self, capture_chunk_frames, vad_target_rate, AudioDevice, RateConverter, SpeechDetector,
};
use crate::bus::{self, MessageSink};
use crate::config::RecorderConfig;
use crate::state::ModeRegister;

/// Idle backoff when a read returns no data.
const EMPTY_READ_SLEEP: Duration = Duration::from_millis(10);

/// Backoff before reopening a stream that failed to open or died.
const REOPEN_BACKOFF: Duration = Duration::from_millis(250);

/// What the silence-hangover gate decided about one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateEvent {
    /// First speech chunk after silence; starts a segment.
    SpeechStarted,
    /// Speech inside a running segment.
    Speech,
    /// Silent chunk still inside the hangover window.
    Hangover,
    /// Hangover exhausted; ends the segment, chunk dropped.
    SpeechStopped,
    /// Silence outside any segment, chunk dropped.
    Silence,
}

impl GateEvent {
    pub(crate) fn publishes(self) -> bool {
        matches!(
            self,
            GateEvent::SpeechStarted | GateEvent::Speech | GateEvent::Hangover
        )
    }
}

/// Silence-hangover state machine. Starts in silence; a speech chunk opens a
/// segment, and the segment survives `silence_frames` further silent chunks
/// before closing.
#[derive(Debug)]
pub(crate) struct VadGate {
    in_silence: bool,
    countdown: u32,
    silence_frames: u32,
}

impl VadGate {
    pub(crate) fn new(silence_frames: u32) -> Self {
        Self {
            in_silence: true,
            countdown: silence_frames,
            silence_frames,
        }
    }

    /// Hangover chunks after `silence_seconds` of silence at `sample_rate`,
    /// in units of capture periods.
    pub(crate) fn silence_frames(sample_rate: u32, silence_seconds: u32) -> u32 {
        let chunk_frames = capture_chunk_frames(sample_rate) as f64;
        (f64::from(sample_rate) * f64::from(silence_seconds) / chunk_frames).round() as u32
    }

    pub(crate) fn observe(&mut self, speech: bool) -> GateEvent {
        if speech {
            if self.in_silence {
                self.in_silence = false;
                self.countdown = self.silence_frames;
                GateEvent::SpeechStarted
            } else {
                GateEvent::Speech
            }
        } else if self.in_silence {
            GateEvent::Silence
        } else if self.countdown > 0 {
            self.countdown -= 1;
            GateEvent::Hangover
        } else {
            self.in_silence = true;
            GateEvent::SpeechStopped
        }
    }
}

/// Thread body driving the microphone. Spawned by the orchestrator when the
/// recorder is enabled.
pub struct CaptureWorker {
    mode: Arc<ModeRegister>,
    recorder: RecorderConfig,
    site: String,
    device: AudioDevice,
    chunks: Sender<Vec<u8>>,
    sink: Arc<dyn MessageSink>,
}

impl CaptureWorker {
    pub fn new(
        mode: Arc<ModeRegister>,
        recorder: RecorderConfig,
        site: String,
        device: AudioDevice,
        chunks: Sender<Vec<u8>>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            mode,
            recorder,
            site,
            device,
            chunks,
            sink,
        }
    }

    pub fn run(self) {
        loop {
            let snapshot = self.mode.snapshot();
            if snapshot.server_stop {
                break;
            }
            if !snapshot.record_audio {
                self.mode.wait_until_recordable();
                continue;
            }
            if let Err(err) = self.stream_until_idle() {
                error!("recording error on site {}: {err:#}", self.site);
                thread::sleep(REOPEN_BACKOFF);
            }
        }
        debug!("capture worker for site {} exited", self.site);
    }

    /// Open the input stream and pump it until recording is no longer
    /// wanted. VAD state lives here so a reopened stream starts fresh.
    fn stream_until_idle(&self) -> Result<()> {
        let rate = self.recorder.sample_rate;
        let width = self.recorder.sample_width;
        let channels = self.recorder.channels;
        let chunk_frames = capture_chunk_frames(rate);

        debug!("opening audio input stream");
        let mut stream = audio::open_input(&self.device, width, channels, rate, chunk_frames)?;
        info!(
            "started broadcasting audio from device {} on site {} ({}, {}, {})",
            self.device.name, self.site, rate, width, channels
        );

        let vad_active = self.recorder.vad_active();
        let vad_rate = vad_target_rate(rate);
        let mut detector = SpeechDetector::new(self.recorder.vad.mode, vad_rate);
        let mut vad_feed = if vad_active && vad_rate != rate {
            Some(RateConverter::new(rate, vad_rate, 1)?)
        } else {
            None
        };
        let mut gate = VadGate::new(VadGate::silence_frames(
            rate,
            self.recorder.vad.silence_seconds,
        ));

        while self.mode.snapshot().record_audio {
            let chunk = match stream.read(chunk_frames) {
                Ok(chunk) => chunk,
                Err(err) => {
                    error!("reading audio chunks failed on site {}: {err:#}", self.site);
                    break;
                }
            };
            // The mode may have flipped while we were blocked in the read.
            if !self.mode.snapshot().record_audio {
                break;
            }
            if chunk.is_empty() {
                thread::sleep(EMPTY_READ_SLEEP);
                continue;
            }

            if vad_active && self.mode.snapshot().wakeword_listen {
                let samples = audio::decode_to_f32(&chunk, width);
                let mono = audio::downmix(&samples, usize::from(channels));
                let feed = match vad_feed.as_mut() {
                    Some(converter) => converter.process(&mono)?,
                    None => mono,
                };
                let speech = !detector.is_silence(&audio::f32_to_i16(&feed));
                let event = gate.observe(speech);
                match event {
                    GateEvent::SpeechStarted => {
                        info!("voice activity started on site {}", self.site);
                        self.publish_status(true);
                    }
                    GateEvent::SpeechStopped => {
                        info!("voice activity stopped on site {}", self.site);
                        self.publish_status(false);
                    }
                    _ => {}
                }
                if event.publishes() && self.chunks.send(chunk).is_err() {
                    break;
                }
            } else if self.chunks.send(chunk).is_err() {
                break;
            }
        }

        let overruns = stream.overruns();
        if overruns > 0 {
            debug!("dropped {overruns} capture blocks on overrun");
        }
        stream.close();
        info!(
            "finished broadcasting audio from device {} on site {}",
            self.device.name, self.site
        );
        Ok(())
    }

    fn publish_status(&self, speech: bool) {
        if !self.recorder.vad.emit_status {
            return;
        }
        let topic = if speech {
            bus::vad_up_topic(&self.site)
        } else {
            bus::vad_down_topic(&self.site)
        };
        let payload = serde_json::json!({ "siteId": self.site });
        self.sink.publish(&topic, payload.to_string().into_bytes());
    }
}
