//! The event bus itself (spec §4.1, §5).
//!
//! Each topic owns one `tokio::sync::broadcast` channel. Every subscriber
//! gets its own receiver and its own dedicated task, so a slow handler
//! only lags its own receiver — broadcast's ring buffer drops the oldest
//! unread message for a lagging receiver and reports how many were
//! skipped, which is exactly the "bounded per-handler queue, drop oldest,
//! log a warning" backpressure policy in spec §5.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{BusError, HandlerError};
use crate::payload::{Envelope, ServiceStatus, ServiceStatusPayload, StatusKind, Validate};
use crate::registry::Registry;
use crate::topics;

/// Default broadcast ring buffer size per topic (spec §5: "bounded,
/// default 64").
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

type AnyEnvelope = Arc<dyn Any + Send + Sync>;
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type AnyHandler = Arc<dyn Fn(AnyEnvelope) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// A JSON-erased view of a published envelope. Used where the concrete
/// payload type for a topic isn't known until runtime — e.g. a timeline
/// `wait` step, whose `event_topic`/`match` fields are plan data, not
/// something `subscribe::<T, _, _>` can be instantiated against.
#[derive(Debug, Clone)]
pub struct RawEnvelope {
    pub timestamp: f64,
    pub event_id: Uuid,
    pub body: serde_json::Value,
}

struct TopicChannel {
    sender: broadcast::Sender<AnyEnvelope>,
    raw_sender: broadcast::Sender<Arc<RawEnvelope>>,
}

struct SubscriberEntry {
    id: u64,
    service: String,
    task: JoinHandle<()>,
}

/// Opaque handle returned by [`EventBus::subscribe`].
pub struct SubscriptionHandle {
    topic: &'static str,
    id: u64,
}

/// Topic-keyed async publish/subscribe bus.
///
/// Always constructed via [`EventBus::shared`], which returns an `Arc`
/// the bus keeps a weak self-reference to — needed so a failed handler
/// can report itself back onto `/system/service_status` without every
/// caller threading an extra `Arc<EventBus>` through.
pub struct EventBus {
    channels: DashMap<&'static str, TopicChannel>,
    subscribers: DashMap<&'static str, Vec<SubscriberEntry>>,
    registry: Arc<Registry>,
    next_id: AtomicU64,
    self_ref: OnceLock<Weak<EventBus>>,
}

impl EventBus {
    pub fn shared(registry: Arc<Registry>) -> Arc<Self> {
        let bus = Arc::new(Self {
            channels: DashMap::new(),
            subscribers: DashMap::new(),
            registry,
            next_id: AtomicU64::new(1),
            self_ref: OnceLock::new(),
        });
        let _ = bus.self_ref.set(Arc::downgrade(&bus));
        bus
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn channel_for(&self, topic: &'static str) -> broadcast::Sender<AnyEnvelope> {
        self.channels
            .entry(topic)
            .or_insert_with(|| TopicChannel {
                sender: broadcast::channel(DEFAULT_QUEUE_CAPACITY).0,
                raw_sender: broadcast::channel(DEFAULT_QUEUE_CAPACITY).0,
            })
            .sender
            .clone()
    }

    fn raw_channel_for(&self, topic: &'static str) -> broadcast::Sender<Arc<RawEnvelope>> {
        self.channels
            .entry(topic)
            .or_insert_with(|| TopicChannel {
                sender: broadcast::channel(DEFAULT_QUEUE_CAPACITY).0,
                raw_sender: broadcast::channel(DEFAULT_QUEUE_CAPACITY).0,
            })
            .raw_sender
            .clone()
    }

    /// Register an asynchronous handler for `topic`, owned by `service`.
    /// Subscribing to an unregistered topic fails (spec §3).
    pub fn subscribe<T, F, Fut>(
        self: &Arc<Self>,
        topic: &'static str,
        service: impl Into<String>,
        handler: F,
    ) -> Result<SubscriptionHandle, BusError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Envelope<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let canonical = topics::canonicalize(topic);
        if !self.registry.is_known(canonical) {
            return Err(BusError::UnknownTopic(topic.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let service = service.into();
        let handler: AnyHandler = Arc::new(move |any: AnyEnvelope| {
            let envelope = any
                .downcast::<Envelope<T>>()
                .expect("payload type mismatch for topic subscription");
            Box::pin(handler((*envelope).clone()))
        });

        let mut receiver = self.channel_for(canonical).subscribe();
        let bus = Arc::downgrade(self);
        let service_for_task = service.clone();
        let report_failures = canonical != topics::SYSTEM_SERVICE_STATUS;

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(any) => {
                        if let Err(HandlerError::Failed { message, .. }) = (handler)(any).await {
                            tracing::error!(service = %service_for_task, error = %message, "handler failed");
                            if report_failures {
                                if let Some(bus) = bus.upgrade() {
                                    let _ = bus.publish(
                                        topics::SYSTEM_SERVICE_STATUS,
                                        ServiceStatusPayload {
                                            service: service_for_task.clone(),
                                            status: ServiceStatus::Error,
                                            kind: StatusKind::HandlerError,
                                            message: Some(message),
                                        },
                                    );
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            service = %service_for_task,
                            skipped,
                            "subscriber fell behind, dropped oldest queued events"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.subscribers
            .entry(canonical)
            .or_default()
            .push(SubscriberEntry {
                id,
                service,
                task,
            });

        Ok(SubscriptionHandle {
            topic: canonical,
            id,
        })
    }

    /// Register a handler that sees every published envelope on `topic`
    /// as a [`RawEnvelope`] (JSON body) rather than a concrete type. Used
    /// by callers that only learn the topic and a field-matcher at
    /// runtime, such as a timeline `wait` step.
    pub fn subscribe_raw<F, Fut>(
        self: &Arc<Self>,
        topic: &'static str,
        service: impl Into<String>,
        handler: F,
    ) -> Result<SubscriptionHandle, BusError>
    where
        F: Fn(RawEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let canonical = topics::canonicalize(topic);
        if !self.registry.is_known(canonical) {
            return Err(BusError::UnknownTopic(topic.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let service = service.into();
        let mut receiver = self.raw_channel_for(canonical).subscribe();
        let service_for_task = service.clone();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(raw) => {
                        if let Err(HandlerError::Failed { message, .. }) = (handler)((*raw).clone()).await {
                            tracing::error!(service = %service_for_task, error = %message, "raw handler failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            service = %service_for_task,
                            skipped,
                            "raw subscriber fell behind, dropped oldest queued events"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.subscribers
            .entry(canonical)
            .or_default()
            .push(SubscriberEntry {
                id,
                service,
                task,
            });

        Ok(SubscriptionHandle {
            topic: canonical,
            id,
        })
    }

    /// Remove exactly the handler registered for `handle`. After this
    /// returns, that handler is guaranteed not to be re-invoked: the
    /// dedicated task backing it has been aborted and awaited.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let entry = self
            .subscribers
            .get_mut(handle.topic)
            .and_then(|mut entries| {
                entries
                    .iter()
                    .position(|e| e.id == handle.id)
                    .map(|pos| entries.remove(pos))
            });

        if let Some(entry) = entry {
            entry.task.abort();
            let _ = entry.task.await;
        }
    }

    /// Service names currently subscribed to `topic`, in registration order.
    pub fn list_handlers(&self, topic: &str) -> Vec<String> {
        let canonical = topics::canonicalize(topic);
        self.subscribers
            .get(canonical)
            .map(|subs| subs.iter().map(|s| s.service.clone()).collect())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        let canonical = topics::canonicalize(topic);
        self.subscribers.get(canonical).map(|s| s.len()).unwrap_or(0)
    }

    /// Publish `body` on `topic`. Validates the topic is known and the
    /// payload well-formed, wraps the body in an [`Envelope`], and
    /// broadcasts it to every subscribed handler's queue. Returns as soon
    /// as delivery has been scheduled; it does not wait on any handler.
    pub fn publish<T>(&self, topic: &str, body: T) -> Result<(), BusError>
    where
        T: Validate + Clone + Serialize + Send + Sync + 'static,
    {
        let canonical = topics::canonicalize(topic);
        if !self.registry.is_known(canonical) {
            return Err(BusError::UnknownTopic(topic.to_string()));
        }
        if let Err(message) = body.validate() {
            self.emit_validation_failure(canonical, &message);
            return Err(BusError::Validation {
                topic: canonical.to_string(),
                message,
            });
        }

        let envelope = Envelope::new(body);
        let raw = Arc::new(RawEnvelope {
            timestamp: envelope.timestamp,
            event_id: envelope.event_id,
            body: serde_json::to_value(&envelope.body).unwrap_or(serde_json::Value::Null),
        });
        let typed: AnyEnvelope = Arc::new(envelope);

        // A sender only exists once something has subscribed; publishing
        // to a topic with zero subscribers is a successful no-op (spec
        // §4.1 tie-break).
        if let Some(channel) = self.channels.get(canonical) {
            let _ = channel.sender.send(typed);
            let _ = channel.raw_sender.send(raw);
        }
        Ok(())
    }

    fn emit_validation_failure(&self, topic: &str, message: &str) {
        tracing::warn!(topic, message, "publish failed validation");
        if topic != topics::SYSTEM_SERVICE_STATUS {
            let _ = self.publish(
                topics::SYSTEM_SERVICE_STATUS,
                ServiceStatusPayload {
                    service: "event_bus".to_string(),
                    status: ServiceStatus::Error,
                    kind: StatusKind::ValidationError,
                    message: Some(format!("{topic}: {message}")),
                },
            );
        }
    }
}
