//! Lifecycle orchestrator: resolves devices, wires the router, spawns the
//! workers, and drives the bus dispatch loop until a termination signal.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::unbounded;
use rumqttc::{Event, Packet};
use tracing::{debug, info, warn};

use crate::audio;
use crate::bus::{self, MessageSink};
use crate::capture::CaptureWorker;
use crate::config::Config;
use crate::playback::PlaybackHandler;
use crate::publish::ChunkPublisher;
use crate::router::{self, ControlRouter};
use crate::state::ModeRegister;

/// Signal number observed by the termination handler; 0 means none yet.
static STOP_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Only flips an atomic: async-signal-safe.
extern "C" fn handle_termination(signal: libc::c_int) {
    STOP_SIGNAL.store(signal, Ordering::SeqCst);
}

fn install_signal_handlers() -> Result<()> {
    unsafe {
        let handler = handle_termination as *const () as libc::sighandler_t;
        for signal in [libc::SIGINT, libc::SIGTERM, libc::SIGQUIT] {
            if libc::signal(signal, handler) == libc::SIG_ERR {
                return Err(anyhow!("failed to install termination signal handler"));
            }
        }
    }
    Ok(())
}

/// Run the satellite until a termination signal arrives. Startup failures
/// (device resolution, broker options) surface as errors; everything after
/// startup is handled inside the workers.
pub fn run(config: Config) -> Result<()> {
    install_signal_handlers()?;

    debug!("probing for available audio devices...");
    match audio::list_devices() {
        Ok(listings) => {
            for listing in listings.iter().filter(|l| l.max_input_channels > 0) {
                debug!(
                    "[{}] {} ({})",
                    listing.index, listing.name, listing.default_sample_rate
                );
            }
        }
        Err(err) => warn!("device probe failed: {err:#}"),
    }

    let input = if config.recorder.enabled {
        let device = audio::resolve_input(config.recorder.device.as_deref())?;
        info!("connected to audio input {}", device.name);
        Some(device)
    } else {
        None
    };
    let output = if config.player.enabled {
        let device = audio::resolve_output(config.player.device.as_deref())?;
        info!("connected to audio output {}", device.name);
        Some(device)
    } else {
        None
    };

    let wakeword = config.recorder.enabled && config.recorder.wakeup;
    if wakeword {
        info!("wakeword listening enabled for site {}", config.site);
    }
    if config.recorder.enabled && config.recorder.vad_active() {
        info!(
            "voice activity detection enabled with mode {}",
            config.recorder.vad.mode
        );
    }

    let mode = Arc::new(ModeRegister::new(wakeword));
    let (bus, mut connection) = bus::connect(&config.mqtt, &config.site)?;
    let sink: Arc<dyn MessageSink> = Arc::new(bus.clone());

    let playback = (config.recorder.enabled || config.player.enabled).then(|| {
        PlaybackHandler::new(
            mode.clone(),
            config.player.clone(),
            output,
            config.site.clone(),
            sink.clone(),
        )
    });
    let router = ControlRouter::new(
        mode.clone(),
        config.site.clone(),
        config.recorder.enabled,
        config.recorder.wakeup,
        config.player.enabled,
        playback,
    );

    debug!("starting server threads...");
    let mut workers = Vec::new();
    if config.recorder.enabled {
        let (chunk_tx, chunk_rx) = unbounded();
        let capture = CaptureWorker::new(
            mode.clone(),
            config.recorder.clone(),
            config.site.clone(),
            input.expect("recorder enabled implies a resolved input device"),
            chunk_tx,
            sink.clone(),
        );
        workers.push(
            thread::Builder::new()
                .name("capture".to_string())
                .spawn(move || capture.run())?,
        );
        let publisher = ChunkPublisher::new(
            mode.clone(),
            &config.recorder,
            &config.site,
            chunk_rx,
            sink.clone(),
        );
        workers.push(
            thread::Builder::new()
                .name("publish".to_string())
                .spawn(move || publisher.run())?,
        );
    }

    // Signal handlers may only flip an atomic; this thread turns the flag
    // into an orderly shutdown.
    {
        let mode = mode.clone();
        let bus = bus.clone();
        thread::Builder::new()
            .name("signals".to_string())
            .spawn(move || loop {
                let signal = STOP_SIGNAL.load(Ordering::SeqCst);
                if signal != 0 {
                    info!("received signal {signal}, shutting down");
                    mode.request_stop();
                    bus.disconnect();
                    break;
                }
                if mode.snapshot().server_stop {
                    break;
                }
                thread::sleep(Duration::from_millis(100));
            })?;
    }

    // Bus dispatch loop. Control and playback callbacks run inline here;
    // rumqttc reconnects between iterations after an error.
    for event in connection.iter() {
        if mode.snapshot().server_stop {
            break;
        }
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(
                    "connected to MQTT broker {}:{}",
                    config.mqtt.host, config.mqtt.port
                );
                router::subscribe_all(&bus, &router);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                router.dispatch(&publish.topic, &publish.payload);
            }
            Ok(_) => {}
            Err(err) => {
                if mode.snapshot().server_stop {
                    break;
                }
                warn!("MQTT connection error: {err}; retrying");
                thread::sleep(Duration::from_secs(1));
            }
        }
    }

    mode.request_stop();
    for worker in workers {
        let _ = worker.join();
    }
    info!("server stopped");
    Ok(())
}
