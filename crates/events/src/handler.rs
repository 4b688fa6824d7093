use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{CancellationSignal, EventEnvelope, IntegrationEvent};

/// A subscriber's side effect did not complete.
///
/// Recorded per handler in the [`PublishResult`](crate::PublishResult); never
/// propagated to the publisher or to sibling handlers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerFailed {
    #[error("handler failed: {0}")]
    Reason(String),

    #[error("handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("handler cancelled before completion")]
    Cancelled,

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerFailed {
    pub fn reason(msg: impl Into<String>) -> Self {
        Self::Reason(msg.into())
    }
}

/// Handles one integration event kind inside a consuming module.
///
/// Handlers must be idempotent and must re-authorize their own side effects
/// (receiving an event is not a permission).
#[async_trait]
pub trait EventHandler<E: IntegrationEvent>: Send + Sync + 'static {
    /// Name used in publish outcomes and logs; unique per event kind.
    fn name(&self) -> &str;

    async fn handle(
        &self,
        envelope: EventEnvelope<E>,
        cancel: CancellationSignal,
    ) -> Result<(), HandlerFailed>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<E, F, Fut> EventHandler<E> for FnHandler<F>
where
    E: IntegrationEvent,
    F: Fn(EventEnvelope<E>, CancellationSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerFailed>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        envelope: EventEnvelope<E>,
        cancel: CancellationSignal,
    ) -> Result<(), HandlerFailed> {
        (self.f)(envelope, cancel).await
    }
}
