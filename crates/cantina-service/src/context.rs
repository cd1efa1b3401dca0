//! Per-service capability handle (spec §4.3, §9 "pass only the event bus
//! + a narrow capability set into each service").

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cantina_bus::{BusError, Envelope, EventBus, HandlerError, ServiceStatus, ServiceStatusPayload, StatusKind, SubscriptionHandle, Validate};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default grace period for cancelling supervised tasks on stop (spec §4.3,
/// §5: "default 2 s").
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

struct SupervisedTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Everything a running service may touch: the bus, its own name, its
/// subscriptions, and its supervised background tasks. Services never
/// hold references to each other or to the bus's internals directly.
pub struct ServiceContext {
    pub bus: Arc<EventBus>,
    name: String,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
    tasks: Mutex<Vec<SupervisedTask>>,
    last_emitted: Mutex<Option<ServiceStatus>>,
}

impl ServiceContext {
    pub fn new(name: impl Into<String>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            name: name.into(),
            subscriptions: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            last_emitted: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a subscription and remember its handle for teardown.
    pub async fn subscribe<T, F, Fut>(
        &self,
        topic: &'static str,
        handler: F,
    ) -> Result<(), BusError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Envelope<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handle = self.bus.subscribe(topic, self.name.clone(), handler)?;
        self.subscriptions.lock().await.push(handle);
        Ok(())
    }

    /// Publish an event as this service.
    pub fn emit<T>(&self, topic: &str, body: T) -> Result<(), BusError>
    where
        T: Validate + Clone + Send + Sync + 'static,
    {
        self.bus.publish(topic, body)
    }

    /// Emit a `/system/service_status` event, eliding it if the status is
    /// unchanged from the last one this service emitted (spec §4.3 health
    /// check: "status on state change only").
    pub async fn emit_status(&self, status: ServiceStatus, kind: StatusKind, message: Option<String>) {
        let mut last = self.last_emitted.lock().await;
        if *last == Some(status) && kind == StatusKind::Lifecycle {
            return;
        }
        *last = Some(status);
        let _ = self.bus.publish(
            cantina_bus::topics::SYSTEM_SERVICE_STATUS,
            ServiceStatusPayload {
                service: self.name.clone(),
                status,
                kind,
                message,
            },
        );
    }

    /// Spawn a long-running task under a cancellation token. If the task
    /// returns an error it is translated into an `AdapterError` status
    /// event rather than lost.
    pub async fn supervise<F, Fut>(&self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child_token = token.clone();
        let future = task(child_token);
        let service = self.name.clone();
        let bus = self.bus.clone();
        let handle = tokio::spawn(async move {
            if let Err(message) = future.await {
                tracing::error!(service = %service, error = %message, "supervised task failed");
                let _ = bus.publish(
                    cantina_bus::topics::SYSTEM_SERVICE_STATUS,
                    ServiceStatusPayload {
                        service,
                        status: ServiceStatus::Degraded,
                        kind: StatusKind::AdapterError,
                        message: Some(message),
                    },
                );
            }
        });
        self.tasks.lock().await.push(SupervisedTask { token, handle });
    }

    /// Cancel all supervised tasks and await them within `grace`; any task
    /// still running past that is aborted and logged.
    pub(crate) async fn cancel_tasks(&self, grace: Duration) {
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            task.token.cancel();
            if tokio::time::timeout(grace, task.handle).await.is_err() {
                tracing::warn!(service = %self.name, "supervised task did not finish within grace period, abandoning");
            }
        }
    }

    /// Remove every subscription this service registered. After this
    /// returns, none of its handlers will run again.
    pub(crate) async fn teardown_subscriptions(&self) {
        let handles = std::mem::take(&mut *self.subscriptions.lock().await);
        for handle in handles {
            self.bus.unsubscribe(&handle).await;
        }
    }

    pub(crate) async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }
}
