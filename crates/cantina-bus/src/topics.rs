//! Canonical topic names. This is the single place topic strings live —
//! services reference these constants rather than ad-hoc literals.

/// System lifecycle and mode transitions.
pub const SYSTEM_SET_MODE_REQUEST: &str = "/system/mode/set_mode_request";
pub const SYSTEM_MODE_TRANSITION_STARTED: &str = "/system/mode/transition_started";
pub const SYSTEM_MODE_CHANGED: &str = "/system/mode/changed";
pub const SYSTEM_MODE_TRANSITION_FAILED: &str = "/system/mode/transition_failed";
pub const SYSTEM_SHUTDOWN_REQUESTED: &str = "/system/shutdown_requested";
pub const SYSTEM_SERVICE_STATUS: &str = "/system/service_status";

/// CLI and dashboard command plumbing.
pub const COMMAND_RAW_INPUT: &str = "/command/raw_input";
pub const COMMAND_ACK: &str = "/command/ack";
pub const CLI_RESPONSE: &str = "/cli/response";

/// Music playback.
pub const MUSIC_COMMAND: &str = "/music/command";
pub const MUSIC_STARTED: &str = "/music/started";
pub const MUSIC_PLAYING: &str = "/music/playing";
pub const MUSIC_ENDED: &str = "/music/ended";

/// DJ coordinator.
pub const DJ_COMMAND: &str = "/dj/command";
pub const DJ_TRACK_ENDING_SOON: &str = "/dj/track_ending_soon";
pub const DJ_COMMENTARY_REQUEST: &str = "/dj/commentary_request";
pub const DJ_COMMENTARY_RESPONSE: &str = "/dj/commentary_response";
pub const DJ_COMMENTARY_SKIPPED: &str = "/dj/commentary_skipped";

/// Speech synthesis and cache.
pub const TTS_SYNTHESIZE_REQUEST: &str = "/tts/synthesize_request";
pub const TTS_CACHE_READY: &str = "/tts/cache_ready";
pub const TTS_PLAY_CACHED_REQUEST: &str = "/tts/play_cached_request";
pub const SPEECH_PLAYBACK_COMPLETED: &str = "/speech/playback_completed";

/// Crossfade request issued by the timeline executor (distinct from
/// `/music/command`, which is the dispatcher's play/stop/list surface).
pub const MUSIC_CROSSFADE_REQUEST: &str = "/music/crossfade_request";

/// Timeline executor.
pub const TIMELINE_PLAN_SUBMIT: &str = "/timeline/plan_submit";
pub const TIMELINE_PLAN_COMPLETED: &str = "/timeline/plan_completed";
pub const TIMELINE_PLAN_FAILED: &str = "/timeline/plan_failed";
pub const TIMELINE_PLAN_CANCELLED: &str = "/timeline/plan_cancelled";

/// Audio coordination.
pub const AUDIO_DUCK_REQUESTED: &str = "/audio/duck_requested";
pub const AUDIO_UNDUCK_REQUESTED: &str = "/audio/unduck_requested";
pub const AUDIO_CROSSFADE_COMPLETE: &str = "/audio/crossfade_complete";

/// LED / animation hardware.
pub const LED_CUE: &str = "/led/cue";

/// Legacy aliases still emitted by some upstream adapters. The registry
/// rewrites these to their canonical topic before delivery (spec §9 open
/// question on multiple "track ending" event names).
pub const LEGACY_TRACK_ENDING_SOON: &str = "/music/track_ending_soon";
pub const LEGACY_MUSIC_PLAYBACK_STARTED: &str = "/music/playback_started";
pub const LEGACY_TRACK_PLAYING: &str = "/music/track_playing";

/// All topics a service may subscribe/publish to. Anything not in this
/// table is rejected at subscribe time.
pub const ALL: &[&str] = &[
    SYSTEM_SET_MODE_REQUEST,
    SYSTEM_MODE_TRANSITION_STARTED,
    SYSTEM_MODE_CHANGED,
    SYSTEM_MODE_TRANSITION_FAILED,
    SYSTEM_SHUTDOWN_REQUESTED,
    SYSTEM_SERVICE_STATUS,
    COMMAND_RAW_INPUT,
    COMMAND_ACK,
    CLI_RESPONSE,
    MUSIC_COMMAND,
    MUSIC_STARTED,
    MUSIC_PLAYING,
    MUSIC_ENDED,
    DJ_COMMAND,
    DJ_TRACK_ENDING_SOON,
    DJ_COMMENTARY_REQUEST,
    DJ_COMMENTARY_RESPONSE,
    DJ_COMMENTARY_SKIPPED,
    TTS_SYNTHESIZE_REQUEST,
    TTS_CACHE_READY,
    TTS_PLAY_CACHED_REQUEST,
    SPEECH_PLAYBACK_COMPLETED,
    MUSIC_CROSSFADE_REQUEST,
    TIMELINE_PLAN_SUBMIT,
    TIMELINE_PLAN_COMPLETED,
    TIMELINE_PLAN_FAILED,
    TIMELINE_PLAN_CANCELLED,
    AUDIO_DUCK_REQUESTED,
    AUDIO_UNDUCK_REQUESTED,
    AUDIO_CROSSFADE_COMPLETE,
    LED_CUE,
];

/// Legacy topic name -> canonical topic name.
pub const ALIASES: &[(&str, &str)] = &[
    (LEGACY_TRACK_ENDING_SOON, DJ_TRACK_ENDING_SOON),
    (LEGACY_MUSIC_PLAYBACK_STARTED, MUSIC_STARTED),
    (LEGACY_TRACK_PLAYING, MUSIC_PLAYING),
];

/// Resolve a possibly-legacy topic name to its canonical form.
pub fn canonicalize(topic: &str) -> &str {
    ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == topic)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(topic)
}

/// True if `topic` (after alias resolution) is registered.
pub fn is_known(topic: &str) -> bool {
    ALL.contains(&canonicalize(topic))
}

/// Resolve a runtime topic string (e.g. a timeline `wait` step's
/// `event_topic`) to the `&'static str` the bus's subscribe APIs require,
/// by finding the matching literal in [`ALL`]. Returns `None` for anything
/// not registered, alias or otherwise.
pub fn resolve_static(topic: &str) -> Option<&'static str> {
    let canonical = canonicalize(topic);
    ALL.iter().find(|t| **t == canonical).copied()
}
