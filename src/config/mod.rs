//! Typed view of the JSON configuration file.
//!
//! Missing sections leave the corresponding subsystem disabled; a present
//! section is enabled unless it says otherwise. Key names follow the file
//! format (`sampleRate`, `status_messages`, ...), not Rust conventions.

#[cfg(test)]
mod tests;

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::error::StartupError;

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rhasspy-desktop-satellite.json";

fn default_true() -> bool {
    true
}

fn default_site() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_sample_width() -> u16 {
    2
}

fn default_channels() -> u16 {
    1
}

fn default_vad_mode() -> u8 {
    1
}

fn default_vad_silence() -> u32 {
    1
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

/// Top-level satellite configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: String,
    pub recorder: RecorderConfig,
    pub player: PlayerConfig,
    pub mqtt: MqttConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: default_site(),
            recorder: RecorderConfig::default(),
            player: PlayerConfig::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

/// Microphone side of the satellite.
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub wakeup: bool,
    #[serde(rename = "sampleRate", default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(rename = "sampleWidth", default = "default_sample_width")]
    pub sample_width: u16,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default)]
    pub vad: VadConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: None,
            wakeup: false,
            sample_rate: default_sample_rate(),
            sample_width: default_sample_width(),
            channels: default_channels(),
            vad: VadConfig::default(),
        }
    }
}

impl RecorderConfig {
    /// Bytes in one interleaved PCM frame.
    pub fn bytes_per_frame(&self) -> usize {
        usize::from(self.sample_width) * usize::from(self.channels)
    }

    /// The VAD gate only runs while streaming for wake-word detection.
    pub fn vad_active(&self) -> bool {
        self.wakeup && self.vad.enabled
    }
}

/// Voice-activity detection settings, nested under the recorder.
#[derive(Debug, Clone, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_vad_mode")]
    pub mode: u8,
    #[serde(rename = "silence", default = "default_vad_silence")]
    pub silence_seconds: u32,
    #[serde(rename = "status_messages", default)]
    pub emit_status: bool,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: default_vad_mode(),
            silence_seconds: default_vad_silence(),
            emit_status: false,
        }
    }
}

/// Loudspeaker side of the satellite.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_true")]
    pub auto_convert: bool,
    #[serde(default)]
    pub frame_rate: Option<u32>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: None,
            auto_convert: true,
            frame_rate: None,
        }
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(rename = "authentication", default)]
    pub auth: Option<MqttAuth>,
    #[serde(default)]
    pub tls: Option<MqttTls>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            auth: None,
            tls: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttTls {
    #[serde(default)]
    pub ca_certificates: Option<String>,
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
}

impl Config {
    /// Load and validate the configuration file.
    pub fn from_file(path: &Path) -> Result<Self, StartupError> {
        let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => StartupError::ConfigNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => StartupError::ConfigPermission(path.to_path_buf()),
            _ => StartupError::ConfigInvalid(format!("cannot read {}: {err}", path.display())),
        })?;
        let config: Config =
            serde_json::from_str(&raw).map_err(|source| StartupError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the parser cannot express.
    fn validate(&self) -> Result<(), StartupError> {
        if !matches!(self.recorder.sample_width, 1 | 2 | 4) {
            return Err(StartupError::ConfigInvalid(format!(
                "recorder.sampleWidth must be 1, 2 or 4 bytes, got {}",
                self.recorder.sample_width
            )));
        }
        if self.recorder.channels == 0 {
            return Err(StartupError::ConfigInvalid(
                "recorder.channels must be at least 1".to_string(),
            ));
        }
        if self.recorder.sample_rate == 0 {
            return Err(StartupError::ConfigInvalid(
                "recorder.sampleRate must be positive".to_string(),
            ));
        }
        if self.recorder.vad.mode > 3 {
            return Err(StartupError::ConfigInvalid(format!(
                "recorder.vad.mode must be between 0 and 3, got {}",
                self.recorder.vad.mode
            )));
        }
        Ok(())
    }
}
