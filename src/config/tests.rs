use super::*;

fn parse(json: &str) -> Config {
    let config: Config = serde_json::from_str(json).expect("config should parse");
    config.validate().expect("config should validate");
    config
}

#[test]
fn empty_file_disables_everything() {
    let config = parse("{}");
    assert_eq!(config.site, "default");
    assert!(!config.recorder.enabled);
    assert!(!config.recorder.vad.enabled);
    assert!(!config.player.enabled);
    assert_eq!(config.mqtt.host, "localhost");
    assert_eq!(config.mqtt.port, 1883);
}

#[test]
fn present_sections_default_to_enabled() {
    let config = parse(r#"{"recorder": {}, "player": {}}"#);
    assert!(config.recorder.enabled);
    assert!(config.player.enabled);
    assert!(config.player.auto_convert);
    // The vad section is still absent, so the gate stays off.
    assert!(!config.recorder.vad.enabled);
}

#[test]
fn recorder_keys_use_file_format_names() {
    let config = parse(
        r#"{
            "site": "kitchen",
            "recorder": {
                "device": "USB Audio",
                "wakeup": true,
                "sampleRate": 44100,
                "sampleWidth": 2,
                "channels": 2,
                "vad": {"mode": 2, "silence": 3, "status_messages": true}
            }
        }"#,
    );
    assert_eq!(config.site, "kitchen");
    assert_eq!(config.recorder.device.as_deref(), Some("USB Audio"));
    assert_eq!(config.recorder.sample_rate, 44_100);
    assert_eq!(config.recorder.channels, 2);
    assert_eq!(config.recorder.bytes_per_frame(), 4);
    assert!(config.recorder.vad_active());
    assert!(config.recorder.vad.enabled);
    assert_eq!(config.recorder.vad.mode, 2);
    assert_eq!(config.recorder.vad.silence_seconds, 3);
    assert!(config.recorder.vad.emit_status);
}

#[test]
fn vad_without_wakeup_is_inactive() {
    let config = parse(r#"{"recorder": {"vad": {}}}"#);
    assert!(config.recorder.vad.enabled);
    assert!(!config.recorder.vad_active());
}

#[test]
fn vad_section_defaults() {
    let config = parse(r#"{"recorder": {"wakeup": true, "vad": {}}}"#);
    assert_eq!(config.recorder.vad.mode, 1);
    assert_eq!(config.recorder.vad.silence_seconds, 1);
    assert!(!config.recorder.vad.emit_status);
}

#[test]
fn mqtt_auth_and_tls_parse() {
    let config = parse(
        r#"{
            "mqtt": {
                "host": "broker.local",
                "port": 8883,
                "authentication": {"username": "sat", "password": "hunter2"},
                "tls": {"ca_certificates": "/etc/ssl/ca.pem"}
            }
        }"#,
    );
    assert_eq!(config.mqtt.host, "broker.local");
    assert_eq!(config.mqtt.port, 8883);
    let auth = config.mqtt.auth.expect("auth should be present");
    assert_eq!(auth.username, "sat");
    let tls = config.mqtt.tls.expect("tls should be present");
    assert_eq!(tls.ca_certificates.as_deref(), Some("/etc/ssl/ca.pem"));
    assert!(tls.client_certificate.is_none());
}

#[test]
fn rejects_unsupported_sample_width() {
    let config: Config =
        serde_json::from_str(r#"{"recorder": {"sampleWidth": 3}}"#).expect("parses");
    let err = config.validate().expect_err("3-byte samples are rejected");
    assert!(err.to_string().contains("sampleWidth"));
}

#[test]
fn rejects_zero_channels_and_bad_vad_mode() {
    let config: Config =
        serde_json::from_str(r#"{"recorder": {"channels": 0}}"#).expect("parses");
    assert!(config.validate().is_err());

    let config: Config =
        serde_json::from_str(r#"{"recorder": {"vad": {"mode": 4}}}"#).expect("parses");
    assert!(config.validate().is_err());
}

#[test]
fn missing_file_maps_to_config_not_found() {
    let err = Config::from_file(Path::new("/nonexistent/satellite.json"))
        .expect_err("missing file should error");
    assert!(matches!(err, StartupError::ConfigNotFound(_)));
}
