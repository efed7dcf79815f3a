//! Redis Streams-backed event publisher (durable, at-least-once delivery).
//!
//! Messages are appended with XADD to a single stream; the key, headers and
//! payload travel as stream fields. Delivery runs on a dedicated writer
//! thread so `publish` never blocks on the network; the completion fires from
//! that thread once XADD is acknowledged.

use std::sync::{Arc, mpsc};
use std::thread;

use tracing::{error, info};

use recordstore_events::{EventMessage, EventPublisher, PublishCompletion, PublishError};

/// Default stream key for events
const DEFAULT_STREAM_KEY: &str = "recordstore:events";

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("redis connection error: {0}")]
    Connection(String),

    #[error("redis command error: {0}")]
    Command(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Event publisher appending to a Redis stream.
pub struct RedisStreamsPublisher {
    sender: mpsc::Sender<(EventMessage, PublishCompletion)>,
}

impl RedisStreamsPublisher {
    /// Connect and start the writer thread.
    ///
    /// `stream_key` defaults to `recordstore:events`.
    pub fn new(
        redis_url: impl AsRef<str>,
        stream_key: Option<String>,
    ) -> Result<Self, RedisStreamsError> {
        let client = Arc::new(
            redis::Client::open(redis_url.as_ref())
                .map_err(|e| RedisStreamsError::Connection(e.to_string()))?,
        );
        let stream_key = stream_key.unwrap_or_else(|| DEFAULT_STREAM_KEY.to_string());

        let (sender, receiver) = mpsc::channel::<(EventMessage, PublishCompletion)>();

        thread::Builder::new()
            .name("redis-streams-publisher".to_string())
            .spawn(move || {
                info!(stream_key = %stream_key, "redis streams publisher started");
                for (message, completion) in receiver {
                    let result = xadd(&client, &stream_key, &message)
                        .map_err(|e| PublishError::Delivery(e.to_string()));
                    if let Err(e) = &result {
                        error!(key = %message.key(), error = %e, "redis publish failed");
                    }
                    completion(result);
                }
                info!(stream_key = %stream_key, "redis streams publisher stopped");
            })
            .expect("failed to spawn redis streams publisher thread");

        Ok(Self { sender })
    }
}

fn xadd(
    client: &redis::Client,
    stream_key: &str,
    message: &EventMessage,
) -> Result<(), RedisStreamsError> {
    let payload = serde_json::to_string(message.payload())
        .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;
    let headers = serde_json::to_string(message.headers())
        .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;

    let mut conn = client
        .get_connection()
        .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

    // XADD with auto-generated ID (*); the record id doubles as the
    // partition/ordering key for downstream consumers.
    let _: String = redis::cmd("XADD")
        .arg(stream_key)
        .arg("*")
        .arg("key")
        .arg(message.key())
        .arg("headers")
        .arg(&headers)
        .arg("payload")
        .arg(&payload)
        .query(&mut conn)
        .map_err(|e| RedisStreamsError::Command(format!("XADD failed: {e}")))?;

    Ok(())
}

impl EventPublisher for RedisStreamsPublisher {
    fn publish(&self, message: EventMessage, completion: PublishCompletion) {
        if let Err(mpsc::SendError((_, completion))) = self.sender.send((message, completion)) {
            completion(Err(PublishError::Closed));
        }
    }
}
