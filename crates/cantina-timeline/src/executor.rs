//! Timeline executor service (spec §4.6): runs a submitted [`Plan`]'s steps,
//! one active plan per layer, racing completion-gated waits against timeout
//! and cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cantina_bus::{
    topics, AudioDuckRequestedPayload, CrossfadeCompletePayload, Envelope, EventBus, HandlerError,
    MusicCrossfadeRequestPayload, PlayCachedSpeechRequestPayload, RawEnvelope, SpeechPlaybackCompletedPayload,
};
use cantina_service::{LifecycleError, Service, ServiceContext};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::payload::{PlanCancelled, PlanCompleted, PlanFailed};
use crate::plan::{Layer, Plan, Step, DEFAULT_DUCK_LEVEL};

/// Why a plan's execution stopped short of completion.
#[derive(Debug)]
enum StepError {
    Timeout,
    Cancelled,
}

impl StepError {
    fn reason(&self) -> &'static str {
        match self {
            StepError::Timeout => "timeout",
            StepError::Cancelled => "cancelled",
        }
    }
}

/// L3 timeline executor. Holds one active plan (id + cancellation token) per
/// layer so submitting a new plan on a layer in use cancels the old one
/// instead of running both at once.
pub struct TimelineExecutor {
    active: Arc<Mutex<HashMap<Layer, (Uuid, CancellationToken)>>>,
}

impl TimelineExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { active: Arc::new(Mutex::new(HashMap::new())) })
    }
}

/// Cancel and forget any plan already running on `plan.layer`, publishing
/// `plan_cancelled` for it, then register a fresh token for this plan.
async fn preempt_layer(
    active: &Arc<Mutex<HashMap<Layer, (Uuid, CancellationToken)>>>,
    bus: &Arc<EventBus>,
    plan: &Plan,
) -> CancellationToken {
    let token = CancellationToken::new();
    let mut guard = active.lock().await;
    if let Some((old_plan_id, previous)) = guard.insert(plan.layer, (plan.plan_id, token.clone())) {
        previous.cancel();
        let _ = bus.publish(
            topics::TIMELINE_PLAN_CANCELLED,
            PlanCancelled { plan_id: old_plan_id, reason: "preempted by a new plan on the same layer".to_string() },
        );
    }
    token
}

/// Remove the layer's active-plan entry, but only if it still belongs to
/// `plan_id` — a newer plan may already have preempted it.
async fn clear_layer_if_current(
    active: &Arc<Mutex<HashMap<Layer, (Uuid, CancellationToken)>>>,
    layer: Layer,
    plan_id: Uuid,
) {
    let mut guard = active.lock().await;
    if guard.get(&layer).map(|(id, _)| *id == plan_id).unwrap_or(false) {
        guard.remove(&layer);
    }
}

/// Wait for an envelope on `topic` whose body's key matches `expected`,
/// racing it against `timeout` and `cancel`.
async fn wait_for_match<T, K>(
    bus: &Arc<EventBus>,
    topic: &'static str,
    timeout: Duration,
    cancel: &CancellationToken,
    expected: K,
    key_of: impl Fn(&T) -> K + Send + Sync + 'static,
) -> Result<(), StepError>
where
    T: Clone + Send + Sync + 'static,
    K: PartialEq + Send + Sync + Clone + 'static,
{
    let (tx, rx) = oneshot::channel::<()>();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let handle = bus
        .subscribe::<T, _, _>(topic, "timeline_executor", move |envelope: Envelope<T>| {
            let tx = tx.clone();
            let expected = expected.clone();
            let key_of = &key_of;
            let matched = key_of(&envelope.body) == expected;
            async move {
                if matched {
                    if let Some(tx) = tx.lock().await.take() {
                        let _ = tx.send(());
                    }
                }
                Ok::<(), HandlerError>(())
            }
        })
        .expect("wait_for_match subscribes to a registered topic");

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StepError::Cancelled),
        _ = tokio::time::sleep(timeout) => Err(StepError::Timeout),
        _ = rx => Ok(()),
    };

    bus.unsubscribe(&handle).await;
    outcome
}

/// Like [`wait_for_match`], but for a `wait` step's caller-supplied topic
/// and field matcher, neither of which is known until the plan is built —
/// so matching runs against a [`RawEnvelope`]'s JSON body instead of a
/// concrete type.
async fn wait_for_raw_match(
    bus: &Arc<EventBus>,
    topic: &'static str,
    match_fields: &std::collections::HashMap<String, serde_json::Value>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), StepError> {
    let (tx, rx) = oneshot::channel::<()>();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let expected = match_fields.clone();

    let handle = bus
        .subscribe_raw(topic, "timeline_executor", move |envelope: RawEnvelope| {
            let tx = tx.clone();
            let expected = expected.clone();
            async move {
                let matched = expected.iter().all(|(key, value)| envelope.body.get(key) == Some(value));
                if matched {
                    if let Some(tx) = tx.lock().await.take() {
                        let _ = tx.send(());
                    }
                }
                Ok::<(), HandlerError>(())
            }
        })
        .expect("wait step subscribes to a registered topic");

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StepError::Cancelled),
        _ = tokio::time::sleep(timeout) => Err(StepError::Timeout),
        _ = rx => Ok(()),
    };

    bus.unsubscribe(&handle).await;
    outcome
}

/// Run one step to completion, recursing into `Parallel` children.
async fn run_step(bus: &Arc<EventBus>, plan_id: Uuid, step: &Step, cancel: &CancellationToken) -> Result<(), StepError> {
    if cancel.is_cancelled() {
        return Err(StepError::Cancelled);
    }

    match step {
        Step::PlayCachedSpeech { speech_id, .. } => {
            let _ = bus.publish(topics::TTS_PLAY_CACHED_REQUEST, PlayCachedSpeechRequestPayload { speech_id: *speech_id });
            wait_for_match::<SpeechPlaybackCompletedPayload, Uuid>(
                bus,
                topics::SPEECH_PLAYBACK_COMPLETED,
                Duration::from_millis(step.timeout_ms()),
                cancel,
                *speech_id,
                |body| body.speech_id,
            )
            .await
        }
        Step::MusicCrossfade { from_track_id, to_track_id, fade_ms } => {
            let _ = bus.publish(
                topics::MUSIC_CROSSFADE_REQUEST,
                MusicCrossfadeRequestPayload {
                    plan_id,
                    from_track_id: from_track_id.clone(),
                    to_track_id: to_track_id.clone(),
                    fade_ms: *fade_ms,
                },
            );
            wait_for_match::<CrossfadeCompletePayload, Uuid>(
                bus,
                topics::AUDIO_CROSSFADE_COMPLETE,
                Duration::from_millis(step.timeout_ms()),
                cancel,
                plan_id,
                |body| body.plan_id,
            )
            .await
        }
        Step::Wait { event_topic, match_fields, timeout_ms } => match topics::resolve_static(event_topic) {
            Some(topic) => wait_for_raw_match(bus, topic, match_fields, Duration::from_millis(*timeout_ms), cancel).await,
            None => {
                tracing::warn!(event_topic = %event_topic, "wait step references an unknown topic; treating as an immediate timeout");
                Err(StepError::Timeout)
            }
        },
        Step::Parallel { steps } => run_parallel(bus, plan_id, steps, cancel).await,
    }
}

async fn run_parallel(bus: &Arc<EventBus>, plan_id: Uuid, steps: &[Step], cancel: &CancellationToken) -> Result<(), StepError> {
    let needs_duck = Step::slice_needs_duck_coupling(steps);

    if needs_duck {
        let _ = bus.publish(topics::AUDIO_DUCK_REQUESTED, AudioDuckRequestedPayload { level: DEFAULT_DUCK_LEVEL });
    }

    // `run_step` and `run_parallel` recurse into each other through
    // `Step::Parallel`; boxing this call site breaks the otherwise
    // infinitely-sized future type.
    let results: Vec<Result<(), StepError>> = futures::future::join_all(
        steps.iter().map(|step| Box::pin(run_step(bus, plan_id, step, cancel)) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), StepError>> + Send + '_>>),
    )
    .await;

    if needs_duck {
        let _ = bus.publish(topics::AUDIO_UNDUCK_REQUESTED, ());
    }

    results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
}

async fn run_plan(
    bus: Arc<EventBus>,
    plan: Plan,
    cancel: CancellationToken,
    active: &Arc<Mutex<HashMap<Layer, (Uuid, CancellationToken)>>>,
) {
    for step in &plan.steps {
        match run_step(&bus, plan.plan_id, step, &cancel).await {
            Ok(()) => continue,
            Err(error) => {
                if matches!(error, StepError::Cancelled) {
                    // A cancellation means a newer plan already published
                    // `plan_cancelled` for this one; nothing further to emit.
                    return;
                }
                // Clear this plan's layer entry before announcing the
                // terminal event, so a plan submitted concurrently on the
                // same layer can't observe a stale entry and cancel an
                // already-finished plan (spec's one-active-plan-per-layer
                // atomicity).
                clear_layer_if_current(active, plan.layer, plan.plan_id).await;
                let _ = bus.publish(
                    topics::TIMELINE_PLAN_FAILED,
                    PlanFailed { plan_id: plan.plan_id, step: step_label(step), error: error.reason().to_string() },
                );
                return;
            }
        }
    }
    clear_layer_if_current(active, plan.layer, plan.plan_id).await;
    let _ = bus.publish(topics::TIMELINE_PLAN_COMPLETED, PlanCompleted { plan_id: plan.plan_id });
}

fn step_label(step: &Step) -> String {
    match step {
        Step::PlayCachedSpeech { .. } => "play_cached_speech".to_string(),
        Step::MusicCrossfade { .. } => "music_crossfade".to_string(),
        Step::Parallel { .. } => "parallel".to_string(),
        Step::Wait { event_topic, .. } => format!("wait:{event_topic}"),
    }
}

#[async_trait]
impl Service for TimelineExecutor {
    fn name(&self) -> &'static str {
        "timeline_executor"
    }

    async fn on_start(&self, ctx: &ServiceContext) -> Result<(), LifecycleError> {
        let active = self.active.clone();
        let bus = ctx.bus.clone();

        ctx.subscribe::<Plan, _, _>(topics::TIMELINE_PLAN_SUBMIT, move |envelope| {
            let active = active.clone();
            let bus = bus.clone();
            async move {
                let plan = envelope.body;
                let plan_id = plan.plan_id;
                let token = preempt_layer(&active, &bus, &plan).await;

                // Spawned so this handler returns immediately and the next
                // submission on any layer is preempted promptly rather than
                // waiting behind this plan's full execution.
                tokio::spawn(async move {
                    run_plan(bus.clone(), plan, token, &active).await;
                    tracing::debug!(plan_id = %plan_id, "plan execution finished");
                });
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
    use cantina_bus::Registry;
    use cantina_service::start_service;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bus() -> Arc<EventBus> {
        EventBus::shared(Arc::new(Registry::build()))
    }

    #[tokio::test]
    async fn sequential_wait_steps_complete_in_order() {
        let bus = bus();
        let executor = TimelineExecutor::new();
        let handle = start_service(executor, bus.clone()).await.unwrap();

        let completed = Arc::new(AtomicUsize::new(0));
        let completed_clone = completed.clone();
        bus.subscribe::<PlanCompleted, _, _>(topics::TIMELINE_PLAN_COMPLETED, "observer", move |_| {
            let completed = completed_clone.clone();
            async move {
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));

        let order_clone = order.clone();
        bus.subscribe::<(), _, _>(topics::MUSIC_STARTED, "observer", move |_| {
            let order = order_clone.clone();
            async move {
                order.lock().await.push("started");
                Ok(())
            }
        })
        .unwrap();
        let order_clone = order.clone();
        bus.subscribe::<(), _, _>(topics::MUSIC_ENDED, "observer", move |_| {
            let order = order_clone.clone();
            async move {
                order.lock().await.push("ended");
                Ok(())
            }
        })
        .unwrap();

        let plan = Plan::new(
            Layer::Foreground,
            vec![
                Step::Wait { event_topic: topics::MUSIC_STARTED.to_string(), match_fields: Default::default(), timeout_ms: 200 },
                Step::Wait { event_topic: topics::MUSIC_ENDED.to_string(), match_fields: Default::default(), timeout_ms: 200 },
            ],
        );

        let bus_for_publish = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = bus_for_publish.publish(topics::MUSIC_STARTED, ());
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = bus_for_publish.publish(topics::MUSIC_ENDED, ());
        });

        bus.publish(topics::TIMELINE_PLAN_SUBMIT, plan).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(order.lock().await.as_slice(), ["started", "ended"]);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn speech_step_completes_once_matching_playback_completed_event_arrives() {
        let bus = bus();
        let executor = TimelineExecutor::new();
        let handle = start_service(executor, bus.clone()).await.unwrap();

        let completed = Arc::new(AtomicUsize::new(0));
        let completed_clone = completed.clone();
        bus.subscribe::<PlanCompleted, _, _>(topics::TIMELINE_PLAN_COMPLETED, "observer", move |_| {
            let completed = completed_clone.clone();
            async move {
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        let speech_id = Uuid::new_v4();
        let plan = Plan::new(Layer::Foreground, vec![Step::PlayCachedSpeech { speech_id, timeout_ms: 5_000 }]);

        let bus_for_publish = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = bus_for_publish.publish(topics::SPEECH_PLAYBACK_COMPLETED, SpeechPlaybackCompletedPayload { speech_id });
        });

        bus.publish(topics::TIMELINE_PLAN_SUBMIT, plan).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn speech_and_crossfade_parallel_ducks_before_and_unducks_after() {
        let bus = bus();
        let executor = TimelineExecutor::new();
        let handle = start_service(executor, bus.clone()).await.unwrap();

        let events = Arc::new(Mutex::new(Vec::<&'static str>::new()));

        let events_clone = events.clone();
        bus.subscribe::<AudioDuckRequestedPayload, _, _>(topics::AUDIO_DUCK_REQUESTED, "observer", move |_| {
            let events = events_clone.clone();
            async move {
                events.lock().await.push("duck");
                Ok(())
            }
        })
        .unwrap();

        let events_clone = events.clone();
        bus.subscribe::<(), _, _>(topics::AUDIO_UNDUCK_REQUESTED, "observer", move |_| {
            let events = events_clone.clone();
            async move {
                events.lock().await.push("unduck");
                Ok(())
            }
        })
        .unwrap();

        let speech_id = Uuid::new_v4();
        let plan = Plan::new(
            Layer::Foreground,
            vec![Step::Parallel {
                steps: vec![
                    Step::PlayCachedSpeech { speech_id, timeout_ms: 5_000 },
                    Step::MusicCrossfade { from_track_id: None, to_track_id: "b".to_string(), fade_ms: 10 },
                ],
            }],
        );

        let bus_for_publish = bus.clone();
        let plan_id = plan.plan_id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = bus_for_publish.publish(topics::SPEECH_PLAYBACK_COMPLETED, SpeechPlaybackCompletedPayload { speech_id });
            let _ = bus_for_publish.publish(topics::AUDIO_CROSSFADE_COMPLETE, CrossfadeCompletePayload { plan_id });
        });

        bus.publish(topics::TIMELINE_PLAN_SUBMIT, plan).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let events = events.lock().await;
        assert_eq!(events.as_slice(), ["duck", "unduck"]);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn speech_timeout_emits_plan_failed_with_timeout_reason() {
        let bus = bus();
        let executor = TimelineExecutor::new();
        let handle = start_service(executor, bus.clone()).await.unwrap();

        let failed = Arc::new(Mutex::new(None));
        let failed_clone = failed.clone();
        bus.subscribe::<PlanFailed, _, _>(topics::TIMELINE_PLAN_FAILED, "observer", move |envelope| {
            let failed = failed_clone.clone();
            async move {
                *failed.lock().await = Some(envelope.body);
                Ok(())
            }
        })
        .unwrap();

        let plan = Plan::new(
            Layer::Foreground,
            vec![Step::PlayCachedSpeech { speech_id: Uuid::new_v4(), timeout_ms: 20 }],
        );
        bus.publish(topics::TIMELINE_PLAN_SUBMIT, plan).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let failed = failed.lock().await;
        assert_eq!(failed.as_ref().unwrap().error, "timeout");
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn submitting_a_new_plan_on_the_same_layer_cancels_the_old_one() {
        let bus = bus();
        let executor = TimelineExecutor::new();
        let handle = start_service(executor, bus.clone()).await.unwrap();

        let completed = Arc::new(AtomicUsize::new(0));
        let completed_clone = completed.clone();
        bus.subscribe::<PlanCompleted, _, _>(topics::TIMELINE_PLAN_COMPLETED, "observer", move |_| {
            let completed = completed_clone.clone();
            async move {
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        let long_plan = Plan::new(
            Layer::Foreground,
            vec![Step::PlayCachedSpeech { speech_id: Uuid::new_v4(), timeout_ms: 5_000 }],
        );
        bus.publish(topics::TIMELINE_PLAN_SUBMIT, long_plan).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let short_plan = Plan::new(
            Layer::Foreground,
            vec![Step::Wait { event_topic: topics::MUSIC_STARTED.to_string(), match_fields: Default::default(), timeout_ms: 200 }],
        );
        bus.publish(topics::TIMELINE_PLAN_SUBMIT, short_plan).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = bus.publish(topics::MUSIC_STARTED, ());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        handle.stop().await.unwrap();
    }
}
