//! MQTT connection plumbing and the Hermes topic namespace.
//!
//! The transport itself (reconnection, keep-alive) belongs to rumqttc; this
//! module only builds the connection from the config and exposes a publish
//! handle the workers can share. Publish failures are transient: they are
//! logged and the pipeline state is left untouched.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use rumqttc::{Client, Connection, MqttOptions, QoS, TlsConfiguration, Transport};
use tracing::warn;

use crate::config::MqttConfig;

pub const ASR_START_LISTENING: &str = "hermes/asr/startListening";
pub const ASR_STOP_LISTENING: &str = "hermes/asr/stopListening";
pub const ASR_TOGGLE_OFF: &str = "hermes/asr/toggleOff";
pub const HOTWORD_TOGGLE_ON: &str = "hermes/hotword/toggleOn";
pub const HOTWORD_TOGGLE_OFF: &str = "hermes/hotword/toggleOff";

pub fn audio_frame_topic(site: &str) -> String {
    format!("hermes/audioServer/{site}/audioFrame")
}

/// Subscription pattern matching any request id.
pub fn play_bytes_topic(site: &str) -> String {
    format!("hermes/audioServer/{site}/playBytes/+")
}

/// Prefix of concrete playBytes topics; the request id follows it.
pub fn play_bytes_prefix(site: &str) -> String {
    format!("hermes/audioServer/{site}/playBytes/")
}

pub fn play_finished_topic(site: &str) -> String {
    format!("hermes/audioServer/{site}/playFinished")
}

pub fn vad_up_topic(site: &str) -> String {
    format!("hermes/voiceActivity/{site}/vadUp")
}

pub fn vad_down_topic(site: &str) -> String {
    format!("hermes/voiceActivity/{site}/vadDown")
}

/// Outbound side of the bus, shared by every worker. Test doubles record
/// instead of publishing.
pub trait MessageSink: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>);
}

/// Publishing handle backed by the rumqttc client.
#[derive(Clone)]
pub struct BusHandle {
    client: Client,
}

impl BusHandle {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .with_context(|| format!("subscribing to {topic} failed"))
    }

    pub fn disconnect(&self) {
        let _ = self.client.disconnect();
    }
}

impl MessageSink for BusHandle {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        if let Err(err) = self.client.publish(topic, QoS::AtMostOnce, false, payload) {
            warn!("publish on {topic} refused: {err}");
        }
    }
}

/// Build the client from the config: credentials, TLS, keep-alive.
pub fn connect(config: &MqttConfig, site: &str) -> Result<(BusHandle, Connection)> {
    let client_id = format!("hermes-satellite-{site}");
    let mut options = MqttOptions::new(client_id, config.host.as_str(), config.port);
    options.set_keep_alive(Duration::from_secs(30));
    if let Some(auth) = &config.auth {
        options.set_credentials(auth.username.as_str(), auth.password.as_str());
    }
    if let Some(tls) = &config.tls {
        let ca = match &tls.ca_certificates {
            Some(path) => {
                fs::read(path).with_context(|| format!("cannot read CA certificates {path}"))?
            }
            None => Vec::new(),
        };
        let client_auth = match (&tls.client_certificate, &tls.client_key) {
            (Some(cert), Some(key)) => {
                let cert = fs::read(cert)
                    .with_context(|| format!("cannot read client certificate {cert}"))?;
                let key =
                    fs::read(key).with_context(|| format!("cannot read client key {key}"))?;
                Some((cert, key))
            }
            _ => None,
        };
        options.set_transport(Transport::Tls(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth,
        }));
    }
    let (client, connection) = Client::new(options, 64);
    Ok((BusHandle::new(client), connection))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_site_scoped() {
        assert_eq!(
            audio_frame_topic("kitchen"),
            "hermes/audioServer/kitchen/audioFrame"
        );
        assert_eq!(
            play_bytes_topic("kitchen"),
            "hermes/audioServer/kitchen/playBytes/+"
        );
        assert_eq!(
            play_finished_topic("kitchen"),
            "hermes/audioServer/kitchen/playFinished"
        );
        assert!(play_bytes_topic("kitchen").starts_with(&play_bytes_prefix("kitchen")));
        assert_eq!(vad_up_topic("den"), "hermes/voiceActivity/den/vadUp");
        assert_eq!(vad_down_topic("den"), "hermes/voiceActivity/den/vadDown");
    }
}
