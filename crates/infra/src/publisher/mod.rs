//! Infrastructure event publisher implementations.
//!
//! The publish contract lives in `recordstore-events` as pure mechanics.
//! This module provides infrastructure-backed transports (e.g. Redis).

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsError, RedisStreamsPublisher};
