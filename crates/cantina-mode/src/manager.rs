use std::sync::Arc;

use async_trait::async_trait;
use cantina_bus::{topics, EventBus, HandlerError};
use cantina_service::{LifecycleError, Service, ServiceContext};
use tokio::sync::Mutex;

use crate::mode::{resolve_transition, Mode, ModeHistory, Resolution};
use crate::payload::{ModeChanged, ModeTransitionFailed, ModeTransitionStarted};

struct State {
    current: Mode,
    history: ModeHistory,
}

/// L2 mode manager (spec §4.5): owns the STARTUP/IDLE/AMBIENT/INTERACTIVE
/// state machine, subscribing to `set_mode_request` and publishing
/// transition events.
pub struct ModeManager {
    state: Arc<Mutex<State>>,
}

impl ModeManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(State { current: Mode::Startup, history: ModeHistory::new() })),
        })
    }

    pub async fn current(&self) -> Mode {
        self.state.lock().await.current
    }

    pub async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

async fn commit(state: &Arc<Mutex<State>>, bus: &Arc<EventBus>, from: Mode, to: Mode) {
    let _ = bus.publish(topics::SYSTEM_MODE_TRANSITION_STARTED, ModeTransitionStarted { from, to });

    {
        let mut guard = state.lock().await;
        guard.current = to;
        guard.history.push(to, now_secs());
    }

    let _ = bus.publish(topics::SYSTEM_MODE_CHANGED, ModeChanged { from, to });
}

/// Resolve and apply a requested transition, handling the AMBIENT<->
/// INTERACTIVE tie-break as two committed hops through IDLE.
async fn apply_transition(state: &Arc<Mutex<State>>, bus: &Arc<EventBus>, requested: Mode) {
    let from = state.lock().await.current;

    match resolve_transition(from, requested) {
        Resolution::Direct(to) => commit(state, bus, from, to).await,
        Resolution::ViaIdle { idle, then } => {
            commit(state, bus, from, idle).await;
            commit(state, bus, idle, then).await;
        }
        Resolution::Illegal => {
            tracing::warn!(from = %from, to = %requested, "rejected illegal mode transition");
            let _ = bus.publish(
                topics::SYSTEM_MODE_TRANSITION_FAILED,
                ModeTransitionFailed {
                    from,
                    to: requested,
                    reason: format!("{from} -> {requested} is not a legal transition"),
                },
            );
        }
    }
}

#[async_trait]
impl Service for ModeManager {
    fn name(&self) -> &'static str {
        "mode_manager"
    }

    async fn on_start(&self, ctx: &ServiceContext) -> Result<(), LifecycleError> {
        let state = self.state.clone();
        let bus = ctx.bus.clone();

        ctx.subscribe::<crate::payload::SetModeRequest, _, _>(
            topics::SYSTEM_SET_MODE_REQUEST,
            move |envelope| {
                let state = state.clone();
                let bus = bus.clone();
                async move {
                    apply_transition(&state, &bus, envelope.body.mode).await;
                    Ok::<(), HandlerError>(())
                }
            },
        )
        .await?;

        apply_transition(&self.state, &ctx.bus, Mode::Idle).await;
        Ok(())
    }

    async fn on_stop(&self, ctx: &ServiceContext) -> Result<(), LifecycleError> {
        apply_transition(&self.state, &ctx.bus, Mode::Idle).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantina_bus::Registry;
    use cantina_service::start_service;

    fn bus() -> Arc<EventBus> {
        EventBus::shared(Arc::new(Registry::build()))
    }

    #[tokio::test]
    async fn starts_up_into_idle() {
        let bus = bus();
        let manager = ModeManager::new();
        let handle = start_service(manager.clone(), bus).await.unwrap();
        assert_eq!(manager.current().await, Mode::Idle);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn ambient_to_interactive_lands_on_idle_then_interactive() {
        let bus = bus();
        let manager = ModeManager::new();
        let handle = start_service(manager.clone(), bus.clone()).await.unwrap();

        apply_transition(&manager.state, &bus, Mode::Ambient).await;
        assert_eq!(manager.current().await, Mode::Ambient);

        apply_transition(&manager.state, &bus, Mode::Interactive).await;
        assert_eq!(manager.current().await, Mode::Interactive);
        assert!(manager.history_len().await >= 4);

        handle.stop().await.unwrap();
        assert_eq!(manager.current().await, Mode::Idle);
    }

    #[tokio::test]
    async fn illegal_transition_leaves_mode_unchanged() {
        let bus = bus();
        let manager = ModeManager::new();
        let handle = start_service(manager.clone(), bus.clone()).await.unwrap();

        apply_transition(&manager.state, &bus, Mode::Startup).await;
        assert_eq!(manager.current().await, Mode::Idle);

        handle.stop().await.unwrap();
    }
}
