//! In-process integration event bus.
//!
//! The bus is assembled once at start-up through [`EventBusBuilder`]; after
//! [`EventBusBuilder::build`] the subscription table is immutable and the bus
//! is shared (usually as `Arc<IntegrationEventBus>`) by every module.
//!
//! ## Delivery
//!
//! - **Publish after commit**: callers publish only once their own state change
//!   is durable. Handlers may read it back.
//! - **Per-kind fan-out**: every handler registered for the event's kind runs,
//!   in registration order (sequential mode) or all at once (concurrent mode).
//! - **Isolation**: each handler gets its own copy of the envelope, its own
//!   timeout, and runs on its own task, so a failure, timeout or panic is
//!   recorded for that handler only.
//! - **Synchronous completion**: `publish` returns only after every handler has
//!   finished or been accounted as failed.
//! - **Best effort**: no retries, no dead-letter queue, nothing survives a
//!   restart.
//!
//! `publish` spawns handler tasks and must run inside a tokio runtime.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use modulerp_core::{DomainError, TenantId};

use crate::{
    CancellationSignal, EventEnvelope, EventHandler, FnHandler, HandlerFailed, IntegrationEvent,
};

/// How handlers for one event are scheduled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One handler at a time, in registration order.
    #[default]
    Sequential,
    /// All handlers started together; outcomes still reported in registration
    /// order.
    Concurrent,
}

impl FromStr for DispatchMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            other => Err(DomainError::validation(format!(
                "unknown dispatch mode '{other}' (expected sequential|concurrent)"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Budget for each handler invocation; expiry is `HandlerFailed::Timeout`.
    pub handler_timeout: Duration,
    pub mode: DispatchMode,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(5),
            mode: DispatchMode::Sequential,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusBuildError {
    #[error("event kind '{kind}' is already bound to payload type {existing}, cannot bind {requested}")]
    KindConflict {
        kind: &'static str,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("handler '{handler}' is already subscribed to '{kind}'")]
    DuplicateHandler { kind: &'static str, handler: String },
}

/// Lifecycle of one published event. Terminal states are observational only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Created,
    Dispatching,
    Delivered,
    PartiallyFailed,
}

/// What happened to one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub handler: String,
    pub result: Result<(), HandlerFailed>,
}

/// Aggregate outcome of [`IntegrationEventBus::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub event_id: Uuid,
    pub kind: &'static str,
    pub tenant_id: TenantId,
    pub state: DispatchState,
    /// One entry per subscribed handler, in registration order.
    pub outcomes: Vec<HandlerOutcome>,
}

impl PublishResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &HandlerFailed)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.handler.as_str(), e)))
    }

    pub fn is_delivered(&self) -> bool {
        self.state == DispatchState::Delivered
    }
}

/// A registered (event kind, handler) pair, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub kind: &'static str,
    pub handler: String,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerFailed>> + Send>>;

trait ErasedHandler: Send + Sync {
    fn name(&self) -> &str;

    /// `None` if `envelope` is not the payload type this handler was bound to.
    fn invoke(&self, envelope: &dyn Any, cancel: CancellationSignal) -> Option<HandlerFuture>;
}

struct TypedHandler<E, H> {
    handler: Arc<H>,
    _event: PhantomData<fn(E)>,
}

impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: IntegrationEvent,
    H: EventHandler<E>,
{
    fn name(&self) -> &str {
        self.handler.name()
    }

    fn invoke(&self, envelope: &dyn Any, cancel: CancellationSignal) -> Option<HandlerFuture> {
        let envelope = envelope.downcast_ref::<EventEnvelope<E>>()?.clone();
        let handler = Arc::clone(&self.handler);
        Some(Box::pin(async move { handler.handle(envelope, cancel).await }))
    }
}

struct KindEntry {
    payload_type: TypeId,
    payload_type_name: &'static str,
    handlers: Vec<Arc<dyn ErasedHandler>>,
}

/// Start-up registration of subscriptions.
pub struct EventBusBuilder {
    config: BusConfig,
    kinds: HashMap<&'static str, KindEntry>,
}

impl EventBusBuilder {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            kinds: HashMap::new(),
        }
    }

    /// Subscribe `handler` to events of type `E`.
    pub fn subscribe<E, H>(&mut self, handler: Arc<H>) -> Result<&mut Self, BusBuildError>
    where
        E: IntegrationEvent,
        H: EventHandler<E>,
    {
        let entry = self.kinds.entry(E::KIND).or_insert_with(|| KindEntry {
            payload_type: TypeId::of::<E>(),
            payload_type_name: std::any::type_name::<E>(),
            handlers: Vec::new(),
        });

        if entry.payload_type != TypeId::of::<E>() {
            return Err(BusBuildError::KindConflict {
                kind: E::KIND,
                existing: entry.payload_type_name,
                requested: std::any::type_name::<E>(),
            });
        }
        if entry.handlers.iter().any(|h| h.name() == handler.name()) {
            return Err(BusBuildError::DuplicateHandler {
                kind: E::KIND,
                handler: handler.name().to_string(),
            });
        }

        tracing::debug!(event_kind = E::KIND, handler = handler.name(), "subscription registered");
        entry.handlers.push(Arc::new(TypedHandler::<E, H> {
            handler,
            _event: PhantomData,
        }));
        Ok(self)
    }

    /// Subscribe an async closure.
    pub fn subscribe_fn<E, F, Fut>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<&mut Self, BusBuildError>
    where
        E: IntegrationEvent,
        F: Fn(EventEnvelope<E>, CancellationSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerFailed>> + Send + 'static,
    {
        self.subscribe::<E, _>(Arc::new(FnHandler::new(name, f)))
    }

    pub fn build(self) -> IntegrationEventBus {
        IntegrationEventBus {
            config: self.config,
            kinds: self.kinds,
        }
    }
}

/// Immutable, shareable in-process publish/subscribe bus.
pub struct IntegrationEventBus {
    config: BusConfig,
    kinds: HashMap<&'static str, KindEntry>,
}

impl core::fmt::Debug for IntegrationEventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IntegrationEventBus")
            .field("config", &self.config)
            .field("subscriptions", &self.subscriptions())
            .finish()
    }
}

impl IntegrationEventBus {
    pub fn builder(config: BusConfig) -> EventBusBuilder {
        EventBusBuilder::new(config)
    }

    pub fn config(&self) -> BusConfig {
        self.config
    }

    /// All subscriptions, grouped by kind (sorted) in registration order.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let mut kinds: Vec<&'static str> = self.kinds.keys().copied().collect();
        kinds.sort_unstable();
        kinds
            .into_iter()
            .flat_map(|kind| {
                self.kinds[kind].handlers.iter().map(move |h| SubscriptionInfo {
                    kind,
                    handler: h.name().to_string(),
                })
            })
            .collect()
    }

    pub fn handler_count(&self, kind: &str) -> usize {
        self.kinds.get(kind).map_or(0, |e| e.handlers.len())
    }

    /// Publish without a cancellation signal.
    pub async fn publish<E: IntegrationEvent>(&self, event: E) -> PublishResult {
        self.publish_with_cancel(event, &CancellationSignal::never())
            .await
    }

    /// Deliver `event` to every handler bound to its kind.
    ///
    /// Call only after the publishing module's state change is committed.
    /// Cancellation stops handlers that have not started yet and is passed to
    /// running ones; it never undoes anything the publisher did.
    pub async fn publish_with_cancel<E: IntegrationEvent>(
        &self,
        event: E,
        cancel: &CancellationSignal,
    ) -> PublishResult {
        let envelope = EventEnvelope::wrap(event);
        let mut result = PublishResult {
            event_id: envelope.event_id(),
            kind: E::KIND,
            tenant_id: envelope.tenant_id(),
            state: DispatchState::Created,
            outcomes: Vec::new(),
        };

        let handlers: &[Arc<dyn ErasedHandler>] = match self.kinds.get(E::KIND) {
            Some(entry) => &entry.handlers,
            None => &[],
        };

        result.state = DispatchState::Dispatching;
        tracing::debug!(
            event_id = %result.event_id,
            event_kind = E::KIND,
            tenant_id = %result.tenant_id,
            handlers = handlers.len(),
            mode = ?self.config.mode,
            "dispatching integration event"
        );

        result.outcomes = match self.config.mode {
            DispatchMode::Sequential => {
                let mut outcomes = Vec::with_capacity(handlers.len());
                for handler in handlers {
                    let pending = self.start(handler, &envelope, cancel);
                    outcomes.push(pending.finish().await);
                }
                outcomes
            }
            DispatchMode::Concurrent => {
                let pending: Vec<Pending> = handlers
                    .iter()
                    .map(|handler| self.start(handler, &envelope, cancel))
                    .collect();
                let mut outcomes = Vec::with_capacity(pending.len());
                for p in pending {
                    outcomes.push(p.finish().await);
                }
                outcomes
            }
        };

        for (handler, failure) in result.failures() {
            tracing::warn!(
                event_id = %result.event_id,
                event_kind = E::KIND,
                tenant_id = %result.tenant_id,
                handler,
                error = %failure,
                "integration event handler failed"
            );
        }

        result.state = if result.failed() == 0 {
            DispatchState::Delivered
        } else {
            DispatchState::PartiallyFailed
        };

        tracing::info!(
            event_id = %result.event_id,
            event_kind = E::KIND,
            tenant_id = %result.tenant_id,
            state = ?result.state,
            succeeded = result.succeeded(),
            failed = result.failed(),
            "integration event published"
        );

        result
    }

    fn start<E: IntegrationEvent>(
        &self,
        handler: &Arc<dyn ErasedHandler>,
        envelope: &EventEnvelope<E>,
        cancel: &CancellationSignal,
    ) -> Pending {
        let name = handler.name().to_string();

        if cancel.is_cancelled() {
            return Pending::Done(HandlerOutcome {
                handler: name,
                result: Err(HandlerFailed::Cancelled),
            });
        }

        let Some(fut) = handler.invoke(envelope, cancel.clone()) else {
            return Pending::Done(HandlerOutcome {
                handler: name,
                result: Err(HandlerFailed::reason(format!(
                    "payload type mismatch for '{}'",
                    E::KIND
                ))),
            });
        };

        let timeout = self.config.handler_timeout;
        let task = tokio::spawn(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(HandlerFailed::Timeout(timeout)),
            }
        });

        Pending::Running { handler: name, task }
    }
}

enum Pending {
    Done(HandlerOutcome),
    Running {
        handler: String,
        task: tokio::task::JoinHandle<Result<(), HandlerFailed>>,
    },
}

impl Pending {
    async fn finish(self) -> HandlerOutcome {
        match self {
            Pending::Done(outcome) => outcome,
            Pending::Running { handler, task } => {
                let result = match task.await {
                    Ok(result) => result,
                    Err(err) if err.is_panic() => {
                        Err(HandlerFailed::Panicked(panic_message(err.into_panic())))
                    }
                    Err(_) => Err(HandlerFailed::Cancelled),
                };
                HandlerOutcome { handler, result }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
