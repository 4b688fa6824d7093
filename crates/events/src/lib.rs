//! `modulerp-events`: typed, in-process integration events.
//!
//! Modules publish facts here and react to each other's facts without
//! compile-time coupling between them.

pub mod bus;
pub mod cancel;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod integration;

pub use bus::{
    BusBuildError, BusConfig, DispatchMode, DispatchState, EventBusBuilder, HandlerOutcome,
    IntegrationEventBus, PublishResult, SubscriptionInfo,
};
pub use cancel::{CancellationSignal, CancellationSource};
pub use envelope::EventEnvelope;
pub use event::IntegrationEvent;
pub use handler::{EventHandler, FnHandler, HandlerFailed};
pub use integration::{ProjectResourceAssignedEvent, ProjectResourceReleasedEvent};
