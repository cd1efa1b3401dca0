use cantina_bus::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `/dj/track_ending_soon`, published by the music backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackEndingSoonPayload {
    pub track_id: String,
}

impl Validate for TrackEndingSoonPayload {}

/// Body of `/dj/commentary_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentaryRequestPayload {
    pub speech_id: Uuid,
    pub current_track_id: String,
    pub next_track_id: String,
    pub persona: String,
}

impl Validate for CommentaryRequestPayload {}

/// Body of `/dj/commentary_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentaryResponsePayload {
    pub speech_id: Uuid,
    pub text: String,
}

impl Validate for CommentaryResponsePayload {}

/// Body of `/dj/commentary_skipped`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentarySkippedPayload {
    pub speech_id: Option<Uuid>,
    pub reason: String,
}

impl Validate for CommentarySkippedPayload {}

/// Body of `/tts/synthesize_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeRequestPayload {
    pub speech_id: Uuid,
    pub text: String,
    pub cache: bool,
}

impl Validate for SynthesizeRequestPayload {}

/// Body of `/tts/cache_ready`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheReadyPayload {
    pub speech_id: Uuid,
}

impl Validate for CacheReadyPayload {}
