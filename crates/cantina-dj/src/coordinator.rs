//! DJ coordinator service (spec §4.7).

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use cantina_bus::{topics, DjCommandPayload, EventBus, HandlerError, MusicAction, MusicCommandPayload};
use cantina_memory::MemoryStore;
use cantina_service::{LifecycleError, Service, ServiceContext};
use cantina_timeline::{Layer, Plan, Step};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::payload::{
    CacheReadyPayload, CommentaryRequestPayload, CommentaryResponsePayload, CommentarySkippedPayload,
    SynthesizeRequestPayload, TrackEndingSoonPayload,
};
use crate::state::{DjState, Phase, COORDINATION_KEY};

const PERSONA: &str = "transition";
const CROSSFADE_FADE_MS: u64 = 1_500;
const SPEECH_TIMEOUT_MS: u64 = 20_000;
const MISSING_CACHE_GRACE: Duration = Duration::from_secs(2);
const MISSING_CACHE_POLL: Duration = Duration::from_millis(100);

fn now_bucket() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() / 3600
}

/// L3 DJ coordinator: owns the `off/starting/active/transitioning/stopping`
/// state machine and the commentary loop around crossfades.
pub struct DjCoordinator {
    state: Arc<Mutex<DjState>>,
    library: Arc<Vec<String>>,
    memory: Arc<MemoryStore>,
}

impl DjCoordinator {
    /// `memory` must be the same store instance other services (notably the
    /// timeline/audio layer's future consumers) read, since the coordination
    /// slot is only useful shared (spec §4.7 step 1).
    pub fn new(library: Vec<String>, memory: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self { state: Arc::new(Mutex::new(DjState::new())), library: Arc::new(library), memory })
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    pub async fn current_track_id(&self) -> Option<String> {
        self.state.lock().await.current_track_id.clone()
    }

    pub async fn history_contains(&self, track_id: &str) -> bool {
        self.state.lock().await.history.contains(track_id)
    }
}

async fn store_coordination_slot(memory: &Arc<MemoryStore>, state: &DjState) {
    memory
        .set(
            COORDINATION_KEY,
            json!({
                "current_track_id": state.current_track_id,
                "next_track_id": state.next_track_id,
                "next_speech_id": state.next_speech_id,
            }),
        )
        .await;
}

fn track_index(library: &[String], track_id: &str) -> Option<u32> {
    library.iter().position(|t| t == track_id).map(|i| i as u32)
}

/// Commentary loop step 1: pick the next track, assign a fresh speech_id,
/// persist the coordination slot, and request commentary for it.
async fn begin_commentary_loop(
    state: &Arc<Mutex<DjState>>,
    bus: &Arc<EventBus>,
    memory: &Arc<MemoryStore>,
    library: &Arc<Vec<String>>,
) {
    let mut guard = state.lock().await;
    let current = guard.current_track_id.clone();
    let next = crate::selection::select_track(library, &guard.history, current.as_deref(), now_bucket())
        .map(str::to_string);

    let Some(next_track_id) = next else {
        tracing::warn!("dj coordinator has no track to select from an empty library");
        return;
    };

    let speech_id = Uuid::new_v4();
    guard.next_track_id = Some(next_track_id.clone());
    guard.next_speech_id = Some(speech_id);
    guard.cache_ready = false;
    guard.synthesis_pending = false;
    store_coordination_slot(memory, &guard).await;

    let current_track_id = guard.current_track_id.clone().unwrap_or_default();
    drop(guard);

    let _ = bus.publish(
        topics::DJ_COMMENTARY_REQUEST,
        CommentaryRequestPayload {
            speech_id,
            current_track_id,
            next_track_id,
            persona: PERSONA.to_string(),
        },
    );
}

async fn handle_dj_command(
    state: &Arc<Mutex<DjState>>,
    bus: &Arc<EventBus>,
    memory: &Arc<MemoryStore>,
    library: &Arc<Vec<String>>,
    command: DjCommandPayload,
) {
    if command.skip {
        handle_skip(state, bus, memory, library).await;
        return;
    }

    if command.dj_mode_active {
        let mut guard = state.lock().await;
        if guard.phase != Phase::Off {
            return;
        }
        guard.phase = Phase::Starting;
        let initial = crate::selection::select_track(library, &guard.history, None, now_bucket()).map(str::to_string);
        let Some(initial_track) = initial else {
            tracing::warn!("dj coordinator cannot start with an empty track library");
            guard.phase = Phase::Off;
            return;
        };
        guard.current_track_id = Some(initial_track.clone());
        guard.phase = Phase::Active;
        drop(guard);

        if let Some(index) = track_index(library, &initial_track) {
            let _ = bus.publish(topics::MUSIC_COMMAND, MusicCommandPayload { action: MusicAction::Play, track_index: Some(index) });
        }
        begin_commentary_loop(state, bus, memory, library).await;
    } else {
        let mut guard = state.lock().await;
        guard.phase = Phase::Stopping;
        guard.current_track_id = None;
        guard.next_track_id = None;
        guard.next_speech_id = None;
        guard.cache_ready = false;
        guard.synthesis_pending = false;
        guard.pending_plan_id = None;
        guard.phase = Phase::Off;
        drop(guard);
        memory.set(COORDINATION_KEY, serde_json::Value::Null).await;
    }
}

/// `dj next` (spec §4.7 skip-command): discard the in-flight commentary and
/// restart step 1 immediately. The in-progress timeline plan, if any, is
/// left to finish on its own — see DESIGN.md for why.
async fn handle_skip(state: &Arc<Mutex<DjState>>, bus: &Arc<EventBus>, memory: &Arc<MemoryStore>, library: &Arc<Vec<String>>) {
    let discarded_speech_id = {
        let guard = state.lock().await;
        if guard.phase != Phase::Active && guard.phase != Phase::Transitioning {
            return;
        }
        guard.next_speech_id
    };

    let _ = bus.publish(
        topics::DJ_COMMENTARY_SKIPPED,
        CommentarySkippedPayload { speech_id: discarded_speech_id, reason: "discarded by dj next".to_string() },
    );

    begin_commentary_loop(state, bus, memory, library).await;
}

async fn handle_commentary_response(state: &Arc<Mutex<DjState>>, bus: &Arc<EventBus>, response: CommentaryResponsePayload) {
    let mut guard = state.lock().await;
    if guard.next_speech_id != Some(response.speech_id) {
        return;
    }
    guard.synthesis_pending = true;
    drop(guard);

    let _ = bus.publish(
        topics::TTS_SYNTHESIZE_REQUEST,
        SynthesizeRequestPayload { speech_id: response.speech_id, text: response.text, cache: true },
    );
}

async fn handle_cache_ready(state: &Arc<Mutex<DjState>>, payload: CacheReadyPayload) {
    let mut guard = state.lock().await;
    if guard.next_speech_id == Some(payload.speech_id) {
        guard.cache_ready = true;
        guard.synthesis_pending = false;
    }
}

async fn handle_track_ending_soon(state: &Arc<Mutex<DjState>>, bus: &Arc<EventBus>, payload: TrackEndingSoonPayload) {
    let snapshot = {
        let guard = state.lock().await;
        (guard.phase, guard.next_track_id.clone(), guard.next_speech_id, guard.cache_ready, guard.synthesis_pending)
    };
    let (phase, next_track_id, next_speech_id, cache_ready, synthesis_pending) = snapshot;
    if phase != Phase::Active {
        return;
    }
    let _ = &payload.track_id;

    if cache_ready {
        submit_transition_plan(state, bus, next_track_id, next_speech_id, true).await;
        return;
    }

    if !synthesis_pending {
        // Missing-cache policy (spec §4.7), "otherwise" branch: synthesis
        // for the upcoming speech hasn't even been requested yet, so there
        // is nothing worth waiting on. Submit the crossfade-only plan
        // immediately rather than holding up the transition for 2s.
        tracing::info!(
            speech_id = ?next_speech_id,
            "track ending soon with commentary not yet pending; submitting crossfade-only plan immediately"
        );
        let _ = bus.publish(
            topics::DJ_COMMENTARY_SKIPPED,
            CommentarySkippedPayload { speech_id: next_speech_id, reason: "commentary not pending when track ended".to_string() },
        );
        submit_transition_plan(state, bus, next_track_id, None, false).await;
        return;
    }

    // Missing-cache policy (spec §4.7), "pending" branch: synthesis is in
    // flight, so give the cache up to 2s to arrive before falling back to
    // a crossfade-only plan.
    let state = state.clone();
    let bus = bus.clone();
    tokio::spawn(async move {
        let deadline = tokio::time::Instant::now() + MISSING_CACHE_GRACE;
        loop {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(MISSING_CACHE_POLL).await;
            if state.lock().await.cache_ready {
                submit_transition_plan(&state, &bus, next_track_id.clone(), next_speech_id, true).await;
                return;
            }
        }
        tracing::warn!(speech_id = ?next_speech_id, "cache missed the crossfade deadline, falling back to crossfade-only");
        let _ = bus.publish(
            topics::DJ_COMMENTARY_SKIPPED,
            CommentarySkippedPayload { speech_id: next_speech_id, reason: "cache missed the crossfade deadline".to_string() },
        );
        submit_transition_plan(&state, &bus, next_track_id, None, false).await;
    });
}

/// Submit the foreground timeline plan for the upcoming crossfade, with or
/// without the paired speech step (spec §4.7 step 5 / missing-cache policy).
async fn submit_transition_plan(
    state: &Arc<Mutex<DjState>>,
    bus: &Arc<EventBus>,
    next_track_id: Option<String>,
    speech_id: Option<Uuid>,
    with_speech: bool,
) {
    let Some(next_track_id) = next_track_id else { return };

    let crossfade = Step::MusicCrossfade { from_track_id: None, to_track_id: next_track_id, fade_ms: CROSSFADE_FADE_MS };
    let steps = match (with_speech, speech_id) {
        (true, Some(speech_id)) => {
            vec![Step::Parallel { steps: vec![Step::PlayCachedSpeech { speech_id, timeout_ms: SPEECH_TIMEOUT_MS }, crossfade] }]
        }
        _ => vec![crossfade],
    };

    let plan = Plan::new(Layer::Foreground, steps);
    let mut guard = state.lock().await;
    guard.phase = Phase::Transitioning;
    guard.pending_plan_id = Some(plan.plan_id);
    drop(guard);

    let _ = bus.publish(topics::TIMELINE_PLAN_SUBMIT, plan);
}

/// Commentary loop step 6: on a successful transition, rotate track state
/// and restart the loop for the new current track.
async fn handle_plan_completed(
    state: &Arc<Mutex<DjState>>,
    bus: &Arc<EventBus>,
    memory: &Arc<MemoryStore>,
    library: &Arc<Vec<String>>,
    plan_id: Uuid,
) {
    let rotated = {
        let mut guard = state.lock().await;
        if guard.pending_plan_id != Some(plan_id) {
            false
        } else {
            if let Some(old_current) = guard.current_track_id.take() {
                guard.history.push(old_current);
            }
            guard.current_track_id = guard.next_track_id.take();
            guard.next_speech_id = None;
            guard.cache_ready = false;
            guard.pending_plan_id = None;
            guard.phase = Phase::Active;
            true
        }
    };

    if rotated {
        begin_commentary_loop(state, bus, memory, library).await;
    }
}

async fn handle_plan_setback(state: &Arc<Mutex<DjState>>, plan_id: Uuid) {
    let mut guard = state.lock().await;
    if guard.pending_plan_id == Some(plan_id) {
        guard.pending_plan_id = None;
        if guard.phase == Phase::Transitioning {
            guard.phase = Phase::Active;
        }
    }
}

#[async_trait]
impl Service for DjCoordinator {
    fn name(&self) -> &'static str {
        "dj_coordinator"
    }

    async fn on_start(&self, ctx: &ServiceContext) -> Result<(), LifecycleError> {
        let memory = self.memory.clone();

        let state = self.state.clone();
        let bus = ctx.bus.clone();
        let library = self.library.clone();
        let memory_for_handler = memory.clone();
        ctx.subscribe::<DjCommandPayload, _, _>(topics::DJ_COMMAND, move |envelope| {
            let state = state.clone();
            let bus = bus.clone();
            let memory = memory_for_handler.clone();
            let library = library.clone();
            async move {
                handle_dj_command(&state, &bus, &memory, &library, envelope.body).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        let bus = ctx.bus.clone();
        ctx.subscribe::<CommentaryResponsePayload, _, _>(topics::DJ_COMMENTARY_RESPONSE, move |envelope| {
            let state = state.clone();
            let bus = bus.clone();
            async move {
                handle_commentary_response(&state, &bus, envelope.body).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        ctx.subscribe::<CacheReadyPayload, _, _>(topics::TTS_CACHE_READY, move |envelope| {
            let state = state.clone();
            async move {
                handle_cache_ready(&state, envelope.body).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        let bus = ctx.bus.clone();
        ctx.subscribe::<TrackEndingSoonPayload, _, _>(topics::DJ_TRACK_ENDING_SOON, move |envelope| {
            let state = state.clone();
            let bus = bus.clone();
            async move {
                handle_track_ending_soon(&state, &bus, envelope.body).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        let bus = ctx.bus.clone();
        let library = self.library.clone();
        let memory_for_completed = memory.clone();
        ctx.subscribe::<cantina_timeline::PlanCompleted, _, _>(topics::TIMELINE_PLAN_COMPLETED, move |envelope| {
            let state = state.clone();
            let bus = bus.clone();
            let memory = memory_for_completed.clone();
            let library = library.clone();
            async move {
                handle_plan_completed(&state, &bus, &memory, &library, envelope.body.plan_id).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        ctx.subscribe::<cantina_timeline::PlanFailed, _, _>(topics::TIMELINE_PLAN_FAILED, move |envelope| {
            let state = state.clone();
            async move {
                handle_plan_setback(&state, envelope.body.plan_id).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        ctx.subscribe::<cantina_timeline::PlanCancelled, _, _>(topics::TIMELINE_PLAN_CANCELLED, move |envelope| {
            let state = state.clone();
            async move {
                handle_plan_setback(&state, envelope.body.plan_id).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantina_bus::{CrossfadeCompletePayload, Registry, SpeechPlaybackCompletedPayload};
    use cantina_service::start_service;
    use std::time::Duration as StdDuration;

    fn bus() -> Arc<EventBus> {
        EventBus::shared(Arc::new(Registry::build()))
    }

    fn library() -> Vec<String> {
        vec!["alpha".to_string(), "bravo".to_string(), "charlie".to_string()]
    }

    #[tokio::test]
    async fn dj_start_picks_a_track_and_enters_active_phase() {
        let bus = bus();
        let memory = Arc::new(MemoryStore::in_memory());
        let dj = DjCoordinator::new(library(), memory);
        let handle = start_service(dj.clone(), bus.clone()).await.unwrap();

        bus.publish(topics::DJ_COMMAND, DjCommandPayload { dj_mode_active: true, skip: false }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(30)).await;

        assert_eq!(dj.phase().await, Phase::Active);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn dj_stop_returns_to_off_and_clears_coordination_slot() {
        let bus = bus();
        let memory = Arc::new(MemoryStore::in_memory());
        let dj = DjCoordinator::new(library(), memory.clone());
        let handle = start_service(dj.clone(), bus.clone()).await.unwrap();

        bus.publish(topics::DJ_COMMAND, DjCommandPayload { dj_mode_active: true, skip: false }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        bus.publish(topics::DJ_COMMAND, DjCommandPayload { dj_mode_active: false, skip: false }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(30)).await;

        assert_eq!(dj.phase().await, Phase::Off);
        assert_eq!(memory.get(COORDINATION_KEY).await, Some(serde_json::Value::Null));
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn happy_path_transition_rotates_current_track_on_plan_completion() {
        let bus = bus();
        let memory = Arc::new(MemoryStore::in_memory());
        let dj = DjCoordinator::new(library(), memory);
        let handle = start_service(dj.clone(), bus.clone()).await.unwrap();

        bus.publish(topics::DJ_COMMAND, DjCommandPayload { dj_mode_active: true, skip: false }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(30)).await;

        let speech_id = dj.state.lock().await.next_speech_id.unwrap();
        let next_track = dj.state.lock().await.next_track_id.clone().unwrap();

        bus.publish(topics::DJ_COMMENTARY_RESPONSE, CommentaryResponsePayload { speech_id, text: "coming up next".to_string() })
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        bus.publish(topics::TTS_CACHE_READY, CacheReadyPayload { speech_id }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(10)).await;

        bus.publish(topics::DJ_TRACK_ENDING_SOON, TrackEndingSoonPayload { track_id: "alpha".to_string() }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(10)).await;

        let plan_id = dj.state.lock().await.pending_plan_id.unwrap();
        assert_eq!(dj.phase().await, Phase::Transitioning);

        bus.publish(topics::SPEECH_PLAYBACK_COMPLETED, SpeechPlaybackCompletedPayload { speech_id }).unwrap();
        bus.publish(topics::AUDIO_CROSSFADE_COMPLETE, CrossfadeCompletePayload { plan_id }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(30)).await;

        assert_eq!(dj.state.lock().await.current_track_id.as_deref(), Some(next_track.as_str()));
        assert_eq!(dj.phase().await, Phase::Active);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn track_ending_with_no_commentary_pending_falls_back_immediately() {
        let bus = bus();
        let memory = Arc::new(MemoryStore::in_memory());
        let dj = DjCoordinator::new(library(), memory);
        let handle = start_service(dj.clone(), bus.clone()).await.unwrap();

        bus.publish(topics::DJ_COMMAND, DjCommandPayload { dj_mode_active: true, skip: false }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(30)).await;

        // No commentary response was ever sent, so synthesis was never
        // requested: nothing is "pending" and the 2s grace window doesn't
        // apply. The crossfade-only plan should land almost immediately.
        bus.publish(topics::DJ_TRACK_ENDING_SOON, TrackEndingSoonPayload { track_id: "alpha".to_string() }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        assert_eq!(dj.phase().await, Phase::Transitioning);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_cache_with_synthesis_pending_falls_back_after_grace_window() {
        let bus = bus();
        let memory = Arc::new(MemoryStore::in_memory());
        let dj = DjCoordinator::new(library(), memory);
        let handle = start_service(dj.clone(), bus.clone()).await.unwrap();

        bus.publish(topics::DJ_COMMAND, DjCommandPayload { dj_mode_active: true, skip: false }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(30)).await;

        let speech_id = dj.state.lock().await.next_speech_id.unwrap();
        bus.publish(topics::DJ_COMMENTARY_RESPONSE, CommentaryResponsePayload { speech_id, text: "coming up next".to_string() })
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert!(dj.state.lock().await.synthesis_pending);

        // Synthesis was requested but the cache never arrives, so
        // track_ending_soon must hold the 2s grace window before falling
        // back to a crossfade-only plan.
        bus.publish(topics::DJ_TRACK_ENDING_SOON, TrackEndingSoonPayload { track_id: "alpha".to_string() }).unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(dj.phase().await, Phase::Active);

        tokio::time::sleep(StdDuration::from_millis(2_200)).await;
        assert_eq!(dj.phase().await, Phase::Transitioning);
        handle.stop().await.unwrap();
    }
}
