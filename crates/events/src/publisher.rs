//! Event publishing abstraction (mechanics only).
//!
//! The publisher accepts a keyed message and delivers it asynchronously; the
//! completion callback reports the per-message outcome. The contract makes
//! minimal assumptions:
//!
//! - **Transport-agnostic**: works with in-memory collectors, broker clients, etc.
//! - **Asynchronous acknowledgment**: `publish` returns as soon as the message
//!   is handed off; the completion fires later, possibly on another thread,
//!   possibly out of submission order.
//! - **Per-message failure**: a failed delivery surfaces through the completion
//!   for that message only; the publisher stays usable.
//! - **Shared and reentrant**: many producers may publish concurrently; no
//!   ordering is guaranteed between them. Messages from a single producer
//!   thread are submitted to the transport in call order.

use std::sync::Arc;

use thiserror::Error;

use crate::message::EventMessage;

/// Delivery failure for a single message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The transport rejected or failed to deliver the message.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The publisher is shut down and no longer accepts messages.
    #[error("publisher closed")]
    Closed,
}

/// Invoked exactly once per published message, on the publisher's own
/// execution context, when delivery is acknowledged or abandoned.
pub type PublishCompletion = Box<dyn FnOnce(Result<(), PublishError>) + Send + 'static>;

/// Asynchronous publish-with-completion contract.
pub trait EventPublisher: Send + Sync {
    /// Hand off one message for delivery.
    ///
    /// Must not block on the delivery itself. `completion` fires exactly once,
    /// success or failure, possibly before `publish` returns (synchronous
    /// transports) or on another thread later.
    fn publish(&self, message: EventMessage, completion: PublishCompletion);
}

impl<P> EventPublisher for Arc<P>
where
    P: EventPublisher + ?Sized,
{
    fn publish(&self, message: EventMessage, completion: PublishCompletion) {
        (**self).publish(message, completion)
    }
}
