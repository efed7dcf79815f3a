//! Outbound domain events and the publish contract.
//!
//! Every record mutation (and every reindexed record) leaves the service as an
//! [`EventMessage`] handed to an [`EventPublisher`]. The transport behind the
//! publisher (message broker, in-memory collector, ...) is an implementation
//! detail of the infrastructure layer.

pub mod event;
pub mod in_memory_publisher;
pub mod message;
pub mod publisher;

pub use event::{DomainEvent, DomainEventType};
pub use in_memory_publisher::InMemoryEventPublisher;
pub use message::{EventMessage, REINDEX_JOB_ID_HEADER, TENANT_HEADER};
pub use publisher::{EventPublisher, PublishCompletion, PublishError};
