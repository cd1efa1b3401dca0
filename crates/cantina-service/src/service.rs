//! Service lifecycle (spec §4.3).

use std::sync::Arc;

use async_trait::async_trait;
use cantina_bus::{EventBus, ServiceStatus, StatusKind};

use crate::context::{ServiceContext, DEFAULT_STOP_GRACE};
use crate::error::LifecycleError;

/// A long-lived component with a name, declared subscriptions, and
/// optional supervised background work.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Register subscriptions (via `ctx.subscribe`) and start any
    /// background work (via `ctx.supervise`). Called once, before the
    /// service is marked RUNNING.
    async fn on_start(&self, ctx: &ServiceContext) -> Result<(), LifecycleError> {
        let _ = ctx;
        Ok(())
    }

    /// Called once at shutdown, before subscriptions are torn down.
    async fn on_stop(&self, ctx: &ServiceContext) -> Result<(), LifecycleError> {
        let _ = ctx;
        Ok(())
    }
}

/// Owns a started service's context and exposes `stop()`. Returned by
/// [`start_service`].
pub struct ServiceHandle {
    service: Arc<dyn Service>,
    ctx: Arc<ServiceContext>,
}

impl ServiceHandle {
    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.ctx
    }

    /// Stop the service: cancel supervised tasks (bounded by a grace
    /// period), run `on_stop`, then remove every subscription. The
    /// service's subscriptions are guaranteed gone once this returns.
    pub async fn stop(self) -> Result<(), LifecycleError> {
        self.ctx.cancel_tasks(DEFAULT_STOP_GRACE).await;

        let stop_result = self.service.on_stop(&self.ctx).await;
        self.ctx.teardown_subscriptions().await;

        match stop_result {
            Ok(()) => {
                self.ctx.emit_status(ServiceStatus::Stopped, StatusKind::Lifecycle, None).await;
                Ok(())
            }
            Err(err) => {
                self.ctx
                    .emit_status(ServiceStatus::Error, StatusKind::LifecycleError, Some(err.to_string()))
                    .await;
                Err(err)
            }
        }
    }
}

/// Start `service`: call its `on_start` hook, and only mark it RUNNING if
/// every declared subscription was established and the hook returned
/// without error. On failure, any subscriptions registered during the
/// failed attempt are torn down before returning — the framework never
/// leaves partial subscriptions behind (spec §4.3).
pub async fn start_service(
    service: Arc<dyn Service>,
    bus: Arc<EventBus>,
) -> Result<ServiceHandle, LifecycleError> {
    let ctx = ServiceContext::new(service.name(), bus);

    match service.on_start(&ctx).await {
        Ok(()) => {
            ctx.emit_status(ServiceStatus::Running, StatusKind::Lifecycle, None).await;
            Ok(ServiceHandle { service, ctx })
        }
        Err(err) => {
            ctx.teardown_subscriptions().await;
            ctx.emit_status(ServiceStatus::Error, StatusKind::LifecycleError, Some(err.to_string())).await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantina_bus::{HandlerError, Registry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Greeter {
        fail_start: bool,
        started: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Service for Greeter {
        fn name(&self) -> &'static str {
            "greeter"
        }

        async fn on_start(&self, ctx: &ServiceContext) -> Result<(), LifecycleError> {
            ctx.subscribe::<u32, _, _>(cantina_bus::topics::MUSIC_STARTED, |_| async {
                Ok::<(), HandlerError>(())
            })
            .await?;
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(LifecycleError::StartFailed {
                    service: "greeter".to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn bus() -> Arc<EventBus> {
        EventBus::shared(Arc::new(Registry::build()))
    }

    #[tokio::test]
    async fn running_only_after_subscriptions_established_and_start_ok() {
        let bus = bus();
        let service = Arc::new(Greeter {
            fail_start: false,
            started: Arc::new(AtomicUsize::new(0)),
        });
        let handle = start_service(service.clone(), bus.clone()).await.unwrap();

        assert_eq!(bus.handler_count(cantina_bus::topics::MUSIC_STARTED), 1);
        handle.stop().await.unwrap();
        assert_eq!(bus.handler_count(cantina_bus::topics::MUSIC_STARTED), 0);
    }

    #[tokio::test]
    async fn failed_start_leaves_no_partial_subscriptions() {
        let bus = bus();
        let service = Arc::new(Greeter {
            fail_start: true,
            started: Arc::new(AtomicUsize::new(0)),
        });

        let result = start_service(service, bus.clone()).await;
        assert!(result.is_err());
        assert_eq!(bus.handler_count(cantina_bus::topics::MUSIC_STARTED), 0);
    }
}
