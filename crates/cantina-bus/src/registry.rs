//! Read-only topic registry (spec §4.2): for each topic, its documentation
//! and the services expected to produce/consume it. Built once at startup
//! and never mutated afterward.

use crate::topics;
use std::collections::HashMap;

/// Registry entry for one canonical topic.
#[derive(Debug, Clone)]
pub struct TopicInfo {
    pub topic: &'static str,
    pub doc: &'static str,
    pub producers: &'static [&'static str],
    pub consumers: &'static [&'static str],
}

/// Immutable map of every canonical topic to its [`TopicInfo`].
pub struct Registry {
    topics: HashMap<&'static str, TopicInfo>,
}

impl Registry {
    /// Build the registry. This is the only place topic metadata lives;
    /// services look up documentation and legality through it rather than
    /// hardcoding strings elsewhere.
    pub fn build() -> Self {
        let entries: &[TopicInfo] = &[
            TopicInfo {
                topic: topics::SYSTEM_SET_MODE_REQUEST,
                doc: "Request a mode transition.",
                producers: &["command_dispatcher"],
                consumers: &["mode_manager"],
            },
            TopicInfo {
                topic: topics::SYSTEM_MODE_TRANSITION_STARTED,
                doc: "A mode transition has begun.",
                producers: &["mode_manager"],
                consumers: &["dashboard_bridge"],
            },
            TopicInfo {
                topic: topics::SYSTEM_MODE_CHANGED,
                doc: "A mode transition completed successfully.",
                producers: &["mode_manager"],
                consumers: &["dj_coordinator", "dashboard_bridge", "command_response"],
            },
            TopicInfo {
                topic: topics::SYSTEM_MODE_TRANSITION_FAILED,
                doc: "A requested mode transition was illegal and was rejected.",
                producers: &["mode_manager"],
                consumers: &["command_response"],
            },
            TopicInfo {
                topic: topics::SYSTEM_SHUTDOWN_REQUESTED,
                doc: "The `reset` command asked the process to restart.",
                producers: &["command_dispatcher"],
                consumers: &["main_loop"],
            },
            TopicInfo {
                topic: topics::SYSTEM_SERVICE_STATUS,
                doc: "A service's status changed, or a handler failed.",
                producers: &["*"],
                consumers: &["dashboard_bridge", "command_response"],
            },
            TopicInfo {
                topic: topics::COMMAND_RAW_INPUT,
                doc: "Raw input line from a CLI or dashboard source.",
                producers: &["cli", "dashboard_bridge"],
                consumers: &["command_dispatcher"],
            },
            TopicInfo {
                topic: topics::COMMAND_ACK,
                doc: "Acknowledgement of a dispatched command.",
                producers: &["command_dispatcher"],
                consumers: &["dashboard_bridge"],
            },
            TopicInfo {
                topic: topics::CLI_RESPONSE,
                doc: "A one-line human-readable response to a command.",
                producers: &["command_dispatcher", "command_response"],
                consumers: &["cli"],
            },
            TopicInfo {
                topic: topics::MUSIC_COMMAND,
                doc: "Play/stop/list instructions for the music backend.",
                producers: &["command_dispatcher", "dj_coordinator"],
                consumers: &["music_service"],
            },
            TopicInfo {
                topic: topics::MUSIC_STARTED,
                doc: "Canonical event: a track began playing.",
                producers: &["music_service"],
                consumers: &["dj_coordinator", "audio_coordinator", "dashboard_bridge"],
            },
            TopicInfo {
                topic: topics::MUSIC_PLAYING,
                doc: "Canonical event: a track is actively playing (heartbeat).",
                producers: &["music_service"],
                consumers: &["dashboard_bridge"],
            },
            TopicInfo {
                topic: topics::MUSIC_ENDED,
                doc: "Canonical event: a track finished playing.",
                producers: &["music_service"],
                consumers: &["dj_coordinator"],
            },
            TopicInfo {
                topic: topics::DJ_COMMAND,
                doc: "Start/stop/skip instructions for the DJ coordinator.",
                producers: &["command_dispatcher"],
                consumers: &["dj_coordinator"],
            },
            TopicInfo {
                topic: topics::DJ_TRACK_ENDING_SOON,
                doc: "The music backend expects the current track to end soon.",
                producers: &["music_service"],
                consumers: &["dj_coordinator"],
            },
            TopicInfo {
                topic: topics::DJ_COMMENTARY_REQUEST,
                doc: "Request spoken commentary about the upcoming track.",
                producers: &["dj_coordinator"],
                consumers: &["llm_service"],
            },
            TopicInfo {
                topic: topics::DJ_COMMENTARY_RESPONSE,
                doc: "LLM-generated commentary text for a speech_id.",
                producers: &["llm_service"],
                consumers: &["dj_coordinator"],
            },
            TopicInfo {
                topic: topics::DJ_COMMENTARY_SKIPPED,
                doc: "Commentary was dropped because the cache missed its deadline.",
                producers: &["dj_coordinator"],
                consumers: &["dashboard_bridge"],
            },
            TopicInfo {
                topic: topics::TTS_SYNTHESIZE_REQUEST,
                doc: "Request synthesis of commentary text, optionally cached.",
                producers: &["dj_coordinator"],
                consumers: &["tts_service"],
            },
            TopicInfo {
                topic: topics::TTS_CACHE_READY,
                doc: "A speech_id's audio artifact is ready to play.",
                producers: &["tts_service"],
                consumers: &["dj_coordinator"],
            },
            TopicInfo {
                topic: topics::TTS_PLAY_CACHED_REQUEST,
                doc: "Play a previously cached speech artifact now.",
                producers: &["timeline_executor"],
                consumers: &["tts_service"],
            },
            TopicInfo {
                topic: topics::SPEECH_PLAYBACK_COMPLETED,
                doc: "A cached speech artifact finished playing.",
                producers: &["tts_service"],
                consumers: &["timeline_executor"],
            },
            TopicInfo {
                topic: topics::MUSIC_CROSSFADE_REQUEST,
                doc: "Crossfade the music bus to a new track over fade_ms.",
                producers: &["timeline_executor"],
                consumers: &["music_service"],
            },
            TopicInfo {
                topic: topics::TIMELINE_PLAN_SUBMIT,
                doc: "Submit a timeline plan for execution.",
                producers: &["dj_coordinator"],
                consumers: &["timeline_executor"],
            },
            TopicInfo {
                topic: topics::TIMELINE_PLAN_COMPLETED,
                doc: "All steps of a plan completed successfully.",
                producers: &["timeline_executor"],
                consumers: &["dj_coordinator", "dashboard_bridge"],
            },
            TopicInfo {
                topic: topics::TIMELINE_PLAN_FAILED,
                doc: "A plan step failed or timed out.",
                producers: &["timeline_executor"],
                consumers: &["dj_coordinator", "dashboard_bridge"],
            },
            TopicInfo {
                topic: topics::TIMELINE_PLAN_CANCELLED,
                doc: "A plan was cancelled by a newer plan on the same layer.",
                producers: &["timeline_executor"],
                consumers: &["dj_coordinator", "dashboard_bridge"],
            },
            TopicInfo {
                topic: topics::AUDIO_DUCK_REQUESTED,
                doc: "Request the music bus be ducked to `level`.",
                producers: &["timeline_executor"],
                consumers: &["audio_coordinator"],
            },
            TopicInfo {
                topic: topics::AUDIO_UNDUCK_REQUESTED,
                doc: "Request the music bus be restored to full volume.",
                producers: &["timeline_executor"],
                consumers: &["audio_coordinator"],
            },
            TopicInfo {
                topic: topics::AUDIO_CROSSFADE_COMPLETE,
                doc: "A music crossfade finished.",
                producers: &["music_service"],
                consumers: &["timeline_executor"],
            },
            TopicInfo {
                topic: topics::LED_CUE,
                doc: "A named animation cue for the LED hardware adapter.",
                producers: &["mode_manager", "dj_coordinator"],
                consumers: &["led_service"],
            },
        ];

        let topics = entries.iter().cloned().map(|info| (info.topic, info)).collect();
        Self { topics }
    }

    pub fn info(&self, topic: &str) -> Option<&TopicInfo> {
        self.topics.get(topics::canonicalize(topic))
    }

    pub fn is_known(&self, topic: &str) -> bool {
        self.topics.contains_key(topics::canonicalize(topic))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_canonical_topic_has_an_entry() {
        let registry = Registry::build();
        for topic in topics::ALL {
            assert!(
                registry.info(topic).is_some(),
                "missing registry entry for {topic}"
            );
        }
    }

    #[test]
    fn legacy_alias_resolves_through_registry() {
        let registry = Registry::build();
        assert!(registry.is_known(topics::LEGACY_TRACK_ENDING_SOON));
        assert_eq!(
            registry.info(topics::LEGACY_TRACK_ENDING_SOON).unwrap().topic,
            topics::DJ_TRACK_ENDING_SOON
        );
    }
}
