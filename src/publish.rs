//! Publisher worker: drains the chunk queue and ships each capture period as
//! a self-describing WAV message.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error};

use crate::audio::encode_chunk;
use crate::bus::{audio_frame_topic, MessageSink};
use crate::config::RecorderConfig;
use crate::state::ModeRegister;

/// Queue poll interval; bounds how long shutdown can lag.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

pub struct ChunkPublisher {
    mode: Arc<ModeRegister>,
    chunks: Receiver<Vec<u8>>,
    sink: Arc<dyn MessageSink>,
    topic: String,
    sample_rate: u32,
    sample_width: u16,
    channels: u16,
}

impl ChunkPublisher {
    pub fn new(
        mode: Arc<ModeRegister>,
        recorder: &RecorderConfig,
        site: &str,
        chunks: Receiver<Vec<u8>>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            mode,
            chunks,
            sink,
            topic: audio_frame_topic(site),
            sample_rate: recorder.sample_rate,
            sample_width: recorder.sample_width,
            channels: recorder.channels,
        }
    }

    pub fn run(self) {
        while !self.mode.snapshot().server_stop {
            match self.chunks.recv_timeout(DRAIN_TIMEOUT) {
                Ok(chunk) => self.publish_chunk(&chunk),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("chunk publisher exited");
    }

    fn publish_chunk(&self, chunk: &[u8]) {
        match encode_chunk(chunk, self.sample_rate, self.sample_width, self.channels) {
            Ok(wav) => {
                debug!("publishing {} bytes on {}", wav.len(), self.topic);
                self.sink.publish(&self.topic, wav);
            }
            Err(err) => error!("failed to frame audio chunk: {err:#}"),
        }
    }
}
