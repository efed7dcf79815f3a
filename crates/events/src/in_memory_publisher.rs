//! In-memory event publisher for tests/dev.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use crate::message::EventMessage;
use crate::publisher::{EventPublisher, PublishCompletion, PublishError};

/// In-memory publisher backed by a single delivery thread.
///
/// - Collects every delivered message for later inspection
/// - Optional artificial delivery latency (to exercise backpressure)
/// - Optional failure injection (every n-th message fails)
/// - Tracks the high-water mark of unacknowledged messages
pub struct InMemoryEventPublisher {
    sender: mpsc::Sender<(EventMessage, PublishCompletion)>,
    messages: Arc<Mutex<Vec<EventMessage>>>,
    inflight: Arc<AtomicUsize>,
    max_inflight: Arc<AtomicUsize>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::build(Duration::ZERO, None)
    }

    /// Publisher whose deliveries take `latency` each.
    pub fn with_latency(latency: Duration) -> Self {
        Self::build(latency, None)
    }

    /// Publisher failing every `nth` delivery (1-indexed).
    pub fn failing_every(nth: usize) -> Self {
        Self::build(Duration::ZERO, Some(nth))
    }

    fn build(latency: Duration, fail_every: Option<usize>) -> Self {
        let (sender, receiver) = mpsc::channel::<(EventMessage, PublishCompletion)>();
        let messages: Arc<Mutex<Vec<EventMessage>>> = Arc::new(Mutex::new(Vec::new()));
        let inflight = Arc::new(AtomicUsize::new(0));
        let max_inflight = Arc::new(AtomicUsize::new(0));

        let thread_messages = messages.clone();
        let thread_inflight = inflight.clone();

        thread::Builder::new()
            .name("in-memory-publisher".to_string())
            .spawn(move || {
                let mut delivered = 0usize;

                for (message, completion) in receiver {
                    if latency > Duration::ZERO {
                        thread::sleep(latency);
                    }

                    delivered += 1;
                    let result = match fail_every {
                        Some(nth) if delivered % nth == 0 => {
                            Err(PublishError::Delivery("injected failure".to_string()))
                        }
                        _ => Ok(()),
                    };

                    if result.is_ok() {
                        if let Ok(mut m) = thread_messages.lock() {
                            m.push(message);
                        }
                    }

                    thread_inflight.fetch_sub(1, Ordering::SeqCst);
                    completion(result);
                }
            })
            .expect("failed to spawn in-memory publisher thread");

        Self {
            sender,
            messages,
            inflight,
            max_inflight,
        }
    }

    /// Messages delivered so far, in delivery order.
    pub fn messages(&self) -> Vec<EventMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Messages delivered for a given key.
    pub fn messages_for_key(&self, key: &str) -> Vec<EventMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.key() == key)
            .collect()
    }

    /// Highest number of simultaneously unacknowledged messages observed.
    pub fn max_inflight(&self) -> usize {
        self.max_inflight.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for InMemoryEventPublisher {
    fn publish(&self, message: EventMessage, completion: PublishCompletion) {
        let outstanding = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(outstanding, Ordering::SeqCst);

        if let Err(mpsc::SendError((_, completion))) = self.sender.send((message, completion)) {
            // Delivery thread is gone; the completion must still fire exactly once.
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            completion(Err(PublishError::Closed));
        }
    }
}
