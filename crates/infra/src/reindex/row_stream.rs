//! Row streaming with pause/resume flow control.
//!
//! A [`RowSource`] delivers an unbounded sequence of rows to exactly one
//! subscriber, on a dedicated producer thread, honoring flow control:
//!
//! - `pause()` takes effect at the next row boundary; the producer parks (no
//!   spinning) until `resume()` wakes it
//! - `close()` terminates production; after close no further callbacks fire
//! - exactly one of `on_end`/`on_error` fires, after the last `on_row`, unless
//!   the stream was closed first
//!
//! Control-plane calls (`pause`/`resume`/`close`) are safe from any thread at
//! any time; row delivery for one subscription is never concurrent with
//! itself.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use recordstore_core::{RecordId, TenantId};

/// One source record: the identifier needed to build the outbound event.
///
/// Never mutated after production; ownership passes to the subscriber for the
/// duration of one publish cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub id: RecordId,
}

impl Row {
    pub fn new(id: RecordId) -> Self {
        Self { id }
    }
}

/// Row stream error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowStreamError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("row source already subscribed")]
    AlreadySubscribed,
}

/// Subscriber callbacks. Invocations are serialized per subscription.
pub trait RowHandler: Send + 'static {
    fn on_row(&mut self, row: Row);
    fn on_end(&mut self);
    fn on_error(&mut self, error: RowStreamError);
}

/// An ordered, possibly unbounded sequence of rows with flow control.
pub trait RowSource: Send + Sync {
    /// Begin asynchronous production into `handler`.
    ///
    /// Production runs on a separate thread and may begin before this
    /// returns. A source accepts exactly one subscription; a second call
    /// reports `AlreadySubscribed` through `on_error`.
    fn subscribe(&self, handler: Box<dyn RowHandler>);

    /// Stop invoking `on_row` at the next row boundary. Rows are held back,
    /// never dropped.
    fn pause(&self);

    /// Continue delivery, waking a parked producer.
    fn resume(&self);

    /// Terminate production. After this, no further callbacks fire.
    fn close(&self);
}

/// Pull side of a stream: hands out the next row or the end of the sequence.
///
/// Implementations own their storage access (snapshot iterator, batched
/// keyset reads, ...) and are driven only from the producer thread.
pub trait RowFetch: Send + 'static {
    fn next_row(&mut self) -> Result<Option<Row>, RowStreamError>;
}

/// Opens a row source scoped to a tenant, one per reindex job.
pub trait RowSourceFactory: Send + Sync {
    fn open(&self, tenant_id: TenantId) -> Result<Arc<dyn RowSource>, RowStreamError>;
}

/// Factory calling a closure per subscription (tests, fixed wiring).
pub struct FnRowSourceFactory<F>(pub F);

impl<F> FnRowSourceFactory<F>
where
    F: Fn(TenantId) -> Result<Arc<dyn RowSource>, RowStreamError> + Send + Sync + 'static,
{
    pub fn arc(open: F) -> Arc<dyn RowSourceFactory> {
        Arc::new(Self(open))
    }
}

impl<F> RowSourceFactory for FnRowSourceFactory<F>
where
    F: Fn(TenantId) -> Result<Arc<dyn RowSource>, RowStreamError> + Send + Sync,
{
    fn open(&self, tenant_id: TenantId) -> Result<Arc<dyn RowSource>, RowStreamError> {
        (self.0)(tenant_id)
    }
}

#[derive(Debug, Default)]
struct StreamState {
    paused: bool,
    closed: bool,
}

#[derive(Debug, Default)]
struct StreamControl {
    state: Mutex<StreamState>,
    wake: Condvar,
}

impl StreamControl {
    /// Park until delivery may proceed. Returns false when the stream closed.
    fn wait_ready(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        while state.paused && !state.closed {
            state = self.wake.wait(state).unwrap();
        }
        !state.closed
    }

    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

/// Row source pulling rows from a [`RowFetch`] on a dedicated producer thread.
///
/// The producer pulls one row at a time, so a paused subscription holds no
/// more than the fetch's own read-ahead in memory.
pub struct FetchRowStream {
    control: Arc<StreamControl>,
    fetch: Mutex<Option<Box<dyn RowFetch>>>,
}

impl FetchRowStream {
    pub fn new(fetch: impl RowFetch) -> Self {
        Self {
            control: Arc::new(StreamControl::default()),
            fetch: Mutex::new(Some(Box::new(fetch))),
        }
    }

    pub fn arc(fetch: impl RowFetch) -> Arc<dyn RowSource> {
        Arc::new(Self::new(fetch))
    }
}

impl RowSource for FetchRowStream {
    fn subscribe(&self, mut handler: Box<dyn RowHandler>) {
        let taken = self.fetch.lock().unwrap().take();
        let Some(mut fetch) = taken else {
            handler.on_error(RowStreamError::AlreadySubscribed);
            return;
        };

        let control = self.control.clone();
        thread::Builder::new()
            .name("row-stream".to_string())
            .spawn(move || {
                loop {
                    if !control.wait_ready() {
                        return;
                    }

                    match fetch.next_row() {
                        Ok(Some(row)) => handler.on_row(row),
                        Ok(None) => {
                            if !control.is_closed() {
                                handler.on_end();
                            }
                            return;
                        }
                        Err(error) => {
                            if !control.is_closed() {
                                handler.on_error(error);
                            }
                            return;
                        }
                    }
                }
            })
            .expect("failed to spawn row stream thread");
    }

    fn pause(&self) {
        self.control.state.lock().unwrap().paused = true;
    }

    fn resume(&self) {
        self.control.state.lock().unwrap().paused = false;
        self.control.wake.notify_all();
    }

    fn close(&self) {
        self.control.state.lock().unwrap().closed = true;
        self.control.wake.notify_all();
    }
}

/// Fetch over a fixed list of record ids (in-memory stores, tests).
pub struct VecRowFetch {
    ids: std::vec::IntoIter<RecordId>,
}

impl VecRowFetch {
    pub fn new(ids: Vec<RecordId>) -> Self {
        Self {
            ids: ids.into_iter(),
        }
    }
}

impl RowFetch for VecRowFetch {
    fn next_row(&mut self) -> Result<Option<Row>, RowStreamError> {
        Ok(self.ids.next().map(Row::new))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::{Duration, Instant};

    use super::*;

    /// Generates `total` fresh record ids on the fly (large-stream tests).
    pub struct SyntheticRowFetch {
        remaining: u64,
    }

    impl SyntheticRowFetch {
        pub fn new(total: u64) -> Self {
            Self { remaining: total }
        }
    }

    impl RowFetch for SyntheticRowFetch {
        fn next_row(&mut self) -> Result<Option<Row>, RowStreamError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(Row::new(RecordId::new())))
        }
    }

    /// Delegates to an inner fetch, failing after `ok_rows` rows.
    pub struct FailingRowFetch {
        inner: Box<dyn RowFetch>,
        ok_rows: u64,
        produced: u64,
    }

    impl FailingRowFetch {
        pub fn new(inner: impl RowFetch, ok_rows: u64) -> Self {
            Self {
                inner: Box::new(inner),
                ok_rows,
                produced: 0,
            }
        }
    }

    impl RowFetch for FailingRowFetch {
        fn next_row(&mut self) -> Result<Option<Row>, RowStreamError> {
            if self.produced == self.ok_rows {
                return Err(RowStreamError::Storage("connection reset".to_string()));
            }
            self.produced += 1;
            self.inner.next_row()
        }
    }

    /// Poll `condition` until it holds or `timeout` elapses.
    pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }
}
