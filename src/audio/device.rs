//! Audio device enumeration and blocking stream adapters over cpal.
//!
//! cpal delivers audio on its own callback threads. The input callback
//! converts the device's native sample format to the recorder's configured
//! PCM width and hands byte blocks to the capture worker over a bounded
//! channel; a full channel counts an overrun and drops the block, so reads
//! never fail on overrun. The output callback drains a channel of
//! interleaved f32 blocks and zero-fills when starved, so writes are
//! backpressured by device drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{error, warn};

use super::pcm;
use crate::error::StartupError;

/// Blocks buffered between an audio callback and its worker thread.
const STREAM_CHANNEL_BLOCKS: usize = 64;

/// How long `read` waits for the callback before handing back a short or
/// empty buffer.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// An input or output device resolved at startup. `index` is the position in
/// the host's device enumeration, or -1 for the OS default.
#[derive(Clone)]
pub struct AudioDevice {
    pub index: i32,
    pub name: String,
    pub default_rate: u32,
    device: cpal::Device,
}

impl std::fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDevice")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("default_rate", &self.default_rate)
            .finish()
    }
}

/// One row of the startup device probe.
#[derive(Debug, Clone)]
pub struct DeviceListing {
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub default_sample_rate: u32,
}

/// Enumerate every device the host knows about, for the startup debug log.
pub fn list_devices() -> Result<Vec<DeviceListing>> {
    let host = cpal::default_host();
    let devices = host.devices().context("cannot enumerate audio devices")?;
    let mut listings = Vec::new();
    for (index, device) in devices.enumerate() {
        let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
        let (max_input_channels, input_rate) = match device.default_input_config() {
            Ok(config) => (config.channels(), config.sample_rate().0),
            Err(_) => (0, 0),
        };
        let default_sample_rate = if input_rate > 0 {
            input_rate
        } else {
            device
                .default_output_config()
                .map(|config| config.sample_rate().0)
                .unwrap_or(0)
        };
        listings.push(DeviceListing {
            index,
            name,
            max_input_channels,
            default_sample_rate,
        });
    }
    Ok(listings)
}

/// The OS default input device, or `NoDefaultAudioDevice("input")`.
pub fn default_input() -> Result<AudioDevice, StartupError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(StartupError::NoDefaultAudioDevice("input"))?;
    describe(device, -1, |d| d.default_input_config().map(|c| c.sample_rate().0), "input")
}

/// The OS default output device, or `NoDefaultAudioDevice("output")`.
pub fn default_output() -> Result<AudioDevice, StartupError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(StartupError::NoDefaultAudioDevice("output"))?;
    describe(device, -1, |d| d.default_output_config().map(|c| c.sample_rate().0), "output")
}

fn describe(
    device: cpal::Device,
    index: i32,
    rate_of: impl Fn(&cpal::Device) -> Result<u32, cpal::DefaultStreamConfigError>,
    inout: &'static str,
) -> Result<AudioDevice, StartupError> {
    let default_rate = rate_of(&device).map_err(|_| StartupError::NoDefaultAudioDevice(inout))?;
    let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
    Ok(AudioDevice {
        index,
        name,
        default_rate,
        device,
    })
}

/// Find the named input device, falling back to the OS default with a
/// warning when the name does not match anything.
pub fn resolve_input(preferred: Option<&str>) -> Result<AudioDevice, StartupError> {
    if let Some(name) = preferred {
        let host = cpal::default_host();
        if let Ok(devices) = host.input_devices() {
            for (index, device) in devices.enumerate() {
                if device.name().map(|n| n == name).unwrap_or(false) {
                    return describe(
                        device,
                        index as i32,
                        |d| d.default_input_config().map(|c| c.sample_rate().0),
                        "input",
                    );
                }
            }
        }
        warn!("could not connect to audio input {name}, using the default device");
    }
    default_input()
}

/// Find the named output device, falling back to the OS default with a
/// warning when the name does not match anything.
pub fn resolve_output(preferred: Option<&str>) -> Result<AudioDevice, StartupError> {
    if let Some(name) = preferred {
        let host = cpal::default_host();
        if let Ok(devices) = host.output_devices() {
            for (index, device) in devices.enumerate() {
                if device.name().map(|n| n == name).unwrap_or(false) {
                    return describe(
                        device,
                        index as i32,
                        |d| d.default_output_config().map(|c| c.sample_rate().0),
                        "output",
                    );
                }
            }
        }
        warn!("could not connect to audio output {name}, using the default device");
    }
    default_output()
}

/// Capture stream handing out interleaved PCM bytes in the recorder's
/// configured format. Not `Send`: it lives on the thread that opened it.
pub struct InputStream {
    stream: cpal::Stream,
    rx: Receiver<Vec<u8>>,
    overruns: Arc<AtomicUsize>,
    pending: Vec<u8>,
    bytes_per_frame: usize,
}

impl InputStream {
    /// Blocking read of up to `frames` frames. Returns a short (possibly
    /// empty) buffer when the device stalls past the read timeout; overrun
    /// on the callback side never surfaces as an error.
    pub fn read(&mut self, frames: usize) -> Result<Vec<u8>> {
        let want = frames * self.bytes_per_frame;
        loop {
            if self.pending.len() >= want {
                return Ok(self.pending.drain(..want).collect());
            }
            match self.rx.recv_timeout(READ_TIMEOUT) {
                Ok(block) => self.pending.extend(block),
                Err(RecvTimeoutError::Timeout) => {
                    return Ok(std::mem::take(&mut self.pending));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("audio input stream closed"));
                }
            }
        }
    }

    /// Whole frames already buffered, without blocking.
    pub fn available(&mut self) -> usize {
        while let Ok(block) = self.rx.try_recv() {
            self.pending.extend(block);
        }
        self.pending.len() / self.bytes_per_frame
    }

    /// Callback blocks dropped because the worker fell behind.
    pub fn overruns(&self) -> usize {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn close(self) {
        let _ = self.stream.pause();
    }
}

/// Open a capture stream at the recorder's configured format. The device's
/// native sample format is converted on the callback thread.
pub fn open_input(
    device: &AudioDevice,
    sample_width: u16,
    channels: u16,
    sample_rate: u32,
    frames_per_buffer: usize,
) -> Result<InputStream> {
    let native = device
        .device
        .default_input_config()
        .context("no supported input config")?;
    let config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let (tx, rx) = bounded::<Vec<u8>>(STREAM_CHANNEL_BLOCKS);
    let overruns = Arc::new(AtomicUsize::new(0));

    let stream = match native.sample_format() {
        SampleFormat::F32 => build_input(
            &device.device,
            &config,
            sample_width,
            tx,
            overruns.clone(),
            |s: f32| s,
        )?,
        SampleFormat::I16 => build_input(
            &device.device,
            &config,
            sample_width,
            tx,
            overruns.clone(),
            |s: i16| f32::from(s) / 32_768.0,
        )?,
        SampleFormat::U16 => build_input(
            &device.device,
            &config,
            sample_width,
            tx,
            overruns.clone(),
            |s: u16| (f32::from(s) - 32_768.0) / 32_768.0,
        )?,
        other => return Err(anyhow!("unsupported sample format: {other:?}")),
    };
    stream.play()?;

    let bytes_per_frame = usize::from(sample_width) * usize::from(channels);
    Ok(InputStream {
        stream,
        rx,
        overruns,
        pending: Vec::with_capacity(frames_per_buffer * bytes_per_frame),
        bytes_per_frame,
    })
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_width: u16,
    tx: Sender<Vec<u8>>,
    overruns: Arc<AtomicUsize>,
    convert: impl Fn(T) -> f32 + Send + 'static,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _| {
            let samples: Vec<f32> = data.iter().map(|&s| convert(s)).collect();
            let bytes = pcm::encode_from_f32(&samples, sample_width);
            if tx.try_send(bytes).is_err() {
                overruns.fetch_add(1, Ordering::Relaxed);
            }
        },
        |err| error!("audio input stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

/// Playback stream accepting interleaved f32 blocks. Not `Send`.
pub struct OutputStream {
    stream: cpal::Stream,
    tx: Option<Sender<Vec<f32>>>,
    queued: Arc<AtomicUsize>,
    sample_rate: u32,
}

impl OutputStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queue one block for the device. Blocks when the device is draining
    /// slower than we produce.
    pub fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        if interleaved.is_empty() {
            return Ok(());
        }
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("audio output stream closed"))?;
        self.queued.fetch_add(interleaved.len(), Ordering::Relaxed);
        tx.send(interleaved.to_vec())
            .map_err(|_| anyhow!("audio output stream closed"))
    }

    /// Let the device drain what was written, then stop the stream.
    pub fn close(mut self) {
        self.tx = None;
        // The device renders at most in real time; bail out shortly after
        // the queued audio should have finished.
        let queued_ms =
            self.queued.load(Ordering::Relaxed) as u64 * 1000 / u64::from(self.sample_rate.max(1));
        let mut patience = (queued_ms / 10) + 100;
        while self.queued.load(Ordering::Relaxed) > 0 && patience > 0 {
            thread::sleep(Duration::from_millis(10));
            patience -= 1;
        }
        let _ = self.stream.pause();
    }
}

/// Open a playback stream at the requested layout and rate.
pub fn open_output(device: &AudioDevice, channels: u16, sample_rate: u32) -> Result<OutputStream> {
    let native = device
        .device
        .default_output_config()
        .context("no supported output config")?;
    let config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let (tx, rx) = bounded::<Vec<f32>>(STREAM_CHANNEL_BLOCKS);
    let queued = Arc::new(AtomicUsize::new(0));

    let stream = match native.sample_format() {
        SampleFormat::F32 => build_output(&device.device, &config, rx, queued.clone(), |s: f32| s)?,
        SampleFormat::I16 => build_output(&device.device, &config, rx, queued.clone(), |s: f32| {
            (s.clamp(-1.0, 1.0) * 32_768.0).clamp(-32_768.0, 32_767.0) as i16
        })?,
        SampleFormat::U16 => build_output(&device.device, &config, rx, queued.clone(), |s: f32| {
            (s.clamp(-1.0, 1.0) * 32_768.0 + 32_768.0).clamp(0.0, 65_535.0) as u16
        })?,
        other => return Err(anyhow!("unsupported sample format: {other:?}")),
    };
    stream.play()?;

    Ok(OutputStream {
        stream,
        tx: Some(tx),
        queued,
        sample_rate,
    })
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    rx: Receiver<Vec<f32>>,
    queued: Arc<AtomicUsize>,
    convert: impl Fn(f32) -> T + Send + 'static,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
{
    let mut local: VecDeque<f32> = VecDeque::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            for slot in data.iter_mut() {
                if local.is_empty() {
                    if let Ok(block) = rx.try_recv() {
                        local.extend(block);
                    }
                }
                match local.pop_front() {
                    Some(sample) => {
                        *slot = convert(sample);
                        queued.fetch_sub(1, Ordering::Relaxed);
                    }
                    None => *slot = convert(0.0),
                }
            }
        },
        |err| error!("audio output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}
