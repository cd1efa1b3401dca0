use uuid::Uuid;

use crate::selection::RecentHistory;

/// DJ coordinator phase (spec §4.7: "off -> starting -> active
/// (playing) -> transitioning -> active ... -> stopping -> off").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Off,
    Starting,
    Active,
    Transitioning,
    Stopping,
}

/// Well-known memory-store key for the coordination slot other services
/// read (spec §4.7 step 1).
pub const COORDINATION_KEY: &str = "dj_coordination";

pub struct DjState {
    pub phase: Phase,
    pub current_track_id: Option<String>,
    pub next_track_id: Option<String>,
    pub next_speech_id: Option<Uuid>,
    pub cache_ready: bool,
    /// True once the synthesize request for `next_speech_id` has actually
    /// been sent to TTS (spec §4.7's "pending" branch of the missing-cache
    /// policy) — as opposed to the commentary text not having come back
    /// from the LLM yet, which isn't "pending cache," it's "nothing to
    /// wait for."
    pub synthesis_pending: bool,
    pub pending_plan_id: Option<Uuid>,
    pub history: RecentHistory,
}

impl DjState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Off,
            current_track_id: None,
            next_track_id: None,
            next_speech_id: None,
            cache_ready: false,
            synthesis_pending: false,
            pending_plan_id: None,
            history: RecentHistory::new(),
        }
    }
}

impl Default for DjState {
    fn default() -> Self {
        Self::new()
    }
}
