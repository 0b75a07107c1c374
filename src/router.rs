//! Routes inbound bus messages to the mode register and playback handler.
//!
//! Control payloads are site-scoped: a message whose `siteId` does not match
//! this satellite (or that is not JSON at all) is dropped. `playFinished`
//! from an external player is exempt, its topic is already site-scoped.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::bus::{
    self, play_bytes_prefix, play_bytes_topic, play_finished_topic, ASR_START_LISTENING,
    ASR_STOP_LISTENING, ASR_TOGGLE_OFF, HOTWORD_TOGGLE_OFF, HOTWORD_TOGGLE_ON,
};
use crate::playback::PlaybackHandler;
use crate::state::ModeRegister;

#[derive(Debug, Deserialize)]
struct ControlEnvelope {
    #[serde(rename = "siteId")]
    site_id: Option<String>,
}

pub struct ControlRouter {
    mode: Arc<ModeRegister>,
    site: String,
    recorder_enabled: bool,
    wakeup: bool,
    player_enabled: bool,
    playback: Option<PlaybackHandler>,
}

impl ControlRouter {
    pub fn new(
        mode: Arc<ModeRegister>,
        site: String,
        recorder_enabled: bool,
        wakeup: bool,
        player_enabled: bool,
        playback: Option<PlaybackHandler>,
    ) -> Self {
        Self {
            mode,
            site,
            recorder_enabled,
            wakeup,
            player_enabled,
            playback,
        }
    }

    /// Topics this satellite wants, derived from its feature flags.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics = Vec::new();
        if self.recorder_enabled {
            topics.push(ASR_TOGGLE_OFF.to_string());
            topics.push(ASR_START_LISTENING.to_string());
            topics.push(ASR_STOP_LISTENING.to_string());
        }
        if self.recorder_enabled && self.wakeup {
            topics.push(HOTWORD_TOGGLE_ON.to_string());
            topics.push(HOTWORD_TOGGLE_OFF.to_string());
        }
        if self.recorder_enabled && !self.player_enabled {
            topics.push(play_finished_topic(&self.site));
        }
        if self.recorder_enabled || self.player_enabled {
            topics.push(play_bytes_topic(&self.site));
        }
        topics
    }

    /// Dispatch one inbound message. Unknown topics are ignored.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) {
        if let Some(request_id) = self.play_bytes_request_id(topic) {
            if let Some(playback) = &self.playback {
                playback.handle(&request_id, payload);
            }
            return;
        }

        match topic {
            ASR_START_LISTENING if self.recorder_enabled => {
                if self.site_matches(payload) {
                    info!("received a {topic} message on site {}", self.site);
                    self.mode.set_listen(true);
                }
            }
            ASR_STOP_LISTENING | ASR_TOGGLE_OFF if self.recorder_enabled => {
                if self.site_matches(payload) {
                    info!("received a {topic} message on site {}", self.site);
                    self.mode.set_listen(false);
                }
            }
            HOTWORD_TOGGLE_ON if self.recorder_enabled && self.wakeup => {
                if self.site_matches(payload) {
                    info!("received a {topic} message on site {}", self.site);
                    self.mode.set_wakeword(true);
                }
            }
            HOTWORD_TOGGLE_OFF if self.recorder_enabled && self.wakeup => {
                if self.site_matches(payload) {
                    info!("received a {topic} message on site {}", self.site);
                    self.mode.set_wakeword(false);
                }
            }
            _ if topic == play_finished_topic(&self.site)
                && self.recorder_enabled
                && !self.player_enabled =>
            {
                info!("received a {topic} message on site {}", self.site);
                self.mode.set_playing(false);
            }
            _ => {}
        }
    }

    /// Request id of a `playBytes` topic for this site, if that is what the
    /// topic is. The id is the single segment after the prefix.
    fn play_bytes_request_id(&self, topic: &str) -> Option<String> {
        if !self.recorder_enabled && !self.player_enabled {
            return None;
        }
        let prefix = play_bytes_prefix(&self.site);
        let request_id = topic.strip_prefix(&prefix)?;
        if request_id.is_empty() || request_id.contains('/') {
            return None;
        }
        Some(request_id.to_string())
    }

    fn site_matches(&self, payload: &[u8]) -> bool {
        let envelope: ControlEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(_) => {
                debug!("dropping non-JSON control message");
                return false;
            }
        };
        match envelope.site_id {
            Some(site) if site == self.site => true,
            _ => {
                debug!("dropping control message for another site");
                false
            }
        }
    }
}

/// The satellite's subscription handle: re-applied on every (re)connect.
pub fn subscribe_all(bus: &bus::BusHandle, router: &ControlRouter) {
    for topic in router.subscriptions() {
        match bus.subscribe(&topic) {
            Ok(()) => info!("subscribed to {topic} topic"),
            Err(err) => tracing::warn!("{err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageSink;
    use crate::config::PlayerConfig;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl MessageSink for RecordingSink {
        fn publish(&self, topic: &str, payload: Vec<u8>) {
            self.messages
                .lock()
                .expect("sink lock")
                .push((topic.to_string(), payload));
        }
    }

    fn router(recorder: bool, wakeup: bool, player: bool) -> (ControlRouter, Arc<ModeRegister>) {
        let mode = Arc::new(ModeRegister::new(false));
        let router = ControlRouter::new(
            mode.clone(),
            "kitchen".to_string(),
            recorder,
            wakeup,
            player,
            None,
        );
        (router, mode)
    }

    #[test]
    fn subscriptions_follow_feature_flags() {
        let (full, _) = router(true, true, true);
        assert_eq!(
            full.subscriptions(),
            vec![
                "hermes/asr/toggleOff",
                "hermes/asr/startListening",
                "hermes/asr/stopListening",
                "hermes/hotword/toggleOn",
                "hermes/hotword/toggleOff",
                "hermes/audioServer/kitchen/playBytes/+",
            ]
        );

        let (recorder_only, _) = router(true, false, false);
        assert_eq!(
            recorder_only.subscriptions(),
            vec![
                "hermes/asr/toggleOff",
                "hermes/asr/startListening",
                "hermes/asr/stopListening",
                "hermes/audioServer/kitchen/playFinished",
                "hermes/audioServer/kitchen/playBytes/+",
            ]
        );

        let (neither, _) = router(false, false, false);
        assert!(neither.subscriptions().is_empty());
    }

    #[test]
    fn start_listening_is_site_scoped() {
        let (router, mode) = router(true, false, false);

        router.dispatch(ASR_START_LISTENING, br#"{"siteId": "living"}"#);
        assert!(!mode.snapshot().listen_audio);

        router.dispatch(ASR_START_LISTENING, br#"{"siteId": "kitchen"}"#);
        assert!(mode.snapshot().listen_audio);
        assert!(mode.snapshot().record_audio);

        router.dispatch(ASR_STOP_LISTENING, br#"{"siteId": "kitchen"}"#);
        assert!(!mode.snapshot().listen_audio);
    }

    #[test]
    fn missing_site_or_garbage_payload_is_dropped() {
        let (router, mode) = router(true, true, false);

        router.dispatch(ASR_START_LISTENING, br#"{"sessionId": "x"}"#);
        router.dispatch(HOTWORD_TOGGLE_ON, b"not json at all");
        router.dispatch(HOTWORD_TOGGLE_ON, b"");

        let snapshot = mode.snapshot();
        assert!(!snapshot.listen_audio);
        assert!(!snapshot.wakeword_listen);
    }

    #[test]
    fn hotword_toggles_require_wakeup() {
        let (router_no_wakeup, mode) = router(true, false, false);
        router_no_wakeup.dispatch(HOTWORD_TOGGLE_ON, br#"{"siteId": "kitchen"}"#);
        assert!(!mode.snapshot().wakeword_listen);

        let (router, mode) = router(true, true, false);
        router.dispatch(HOTWORD_TOGGLE_ON, br#"{"siteId": "kitchen"}"#);
        assert!(mode.snapshot().wakeword_listen);
        router.dispatch(HOTWORD_TOGGLE_OFF, br#"{"siteId": "kitchen"}"#);
        assert!(!mode.snapshot().wakeword_listen);
    }

    #[test]
    fn external_play_finished_clears_playing_without_site_check() {
        let (router, mode) = router(true, false, false);
        mode.set_playing(true);
        router.dispatch("hermes/audioServer/kitchen/playFinished", b"{}");
        assert!(!mode.snapshot().playing_audio);
    }

    #[test]
    fn play_bytes_topic_parsing() {
        let (router, _) = router(true, false, true);
        assert_eq!(
            router.play_bytes_request_id("hermes/audioServer/kitchen/playBytes/req-1"),
            Some("req-1".to_string())
        );
        assert_eq!(
            router.play_bytes_request_id("hermes/audioServer/kitchen/playBytes/"),
            None
        );
        assert_eq!(
            router.play_bytes_request_id("hermes/audioServer/living/playBytes/req-1"),
            None
        );
        assert_eq!(
            router.play_bytes_request_id("hermes/audioServer/kitchen/playBytes/a/b"),
            None
        );
    }

    #[test]
    fn play_bytes_invokes_handler_and_answers() {
        let mode = Arc::new(ModeRegister::new(false));
        let sink = Arc::new(RecordingSink::default());
        let playback = PlaybackHandler::new(
            mode.clone(),
            PlayerConfig::default(),
            None,
            "kitchen".to_string(),
            sink.clone(),
        );
        let router = ControlRouter::new(
            mode.clone(),
            "kitchen".to_string(),
            true,
            false,
            false,
            Some(playback),
        );

        router.dispatch("hermes/audioServer/kitchen/playBytes/req-42", b"ignored");

        let messages = sink.messages.lock().expect("sink lock");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "hermes/audioServer/kitchen/playFinished");
        let body: serde_json::Value =
            serde_json::from_slice(&messages[0].1).expect("JSON payload");
        assert_eq!(body["id"], "req-42");
        assert!(!mode.snapshot().playing_audio);
    }
}
