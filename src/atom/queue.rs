//! Deferred result stream.
//!
//! A [`QueueValue`] is filled by an engine thread while the consumer holds a
//! clone. The consumer blocks in [`QueueValue::wait_and_take_all`] until the
//! producer closes the queue, then drains every entry in push order.
//!
//! A consumer that gives up cancels the queue and still waits for the
//! producer to close it, so no producer outlives its consumer's call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{HubError, HubResult};

use super::Handle;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Handle>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<QueueState>,
    ready: Condvar,
    cancelled: AtomicBool,
}

/// Asynchronously filled, ordered stream of result atoms.
#[derive(Debug, Clone, Default)]
pub struct QueueValue {
    shared: Arc<Shared>,
}

impl QueueValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Entries pushed after close are dropped.
    pub fn push(&self, handle: Handle) {
        let mut state = self.shared.state.lock().expect("queue lock poisoned");
        if !state.closed {
            state.items.push_back(handle);
        }
    }

    /// Signal completion and wake waiters.
    pub fn close(&self) {
        self.shared.state.lock().expect("queue lock poisoned").closed = true;
        self.shared.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().expect("queue lock poisoned").closed
    }

    /// Ask the producer to stop early. Producers poll this.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Block until the queue is closed, then take every entry.
    ///
    /// `timeout` of `None` waits indefinitely. When the timeout expires the
    /// queue is cancelled, and the call returns `QueryTimeout` only after the
    /// producer has closed it.
    pub fn wait_and_take_all(&self, timeout: Option<Duration>) -> HubResult<Vec<Handle>> {
        let ready = &self.shared.ready;
        let mut state = self.shared.state.lock().expect("queue lock poisoned");
        let deadline = timeout.map(|t| (t, Instant::now() + t));

        while !state.closed {
            state = match deadline {
                None => ready.wait(state).expect("queue lock poisoned"),
                Some((limit, at)) => {
                    let now = Instant::now();
                    if now >= at {
                        self.cancel();
                        while !state.closed {
                            state = ready.wait(state).expect("queue lock poisoned");
                        }
                        state.items.clear();
                        return Err(HubError::QueryTimeout { timeout: limit });
                    }
                    ready.wait_timeout(state, at - now).expect("queue lock poisoned").0
                }
            };
        }

        Ok(state.items.drain(..).collect())
    }

    /// A guard that closes the queue when dropped, so a panicking producer
    /// still releases its consumer.
    pub fn closer(&self) -> QueueCloser {
        QueueCloser(self.clone())
    }
}

/// Closes the wrapped queue on drop.
#[derive(Debug)]
pub struct QueueCloser(QueueValue);

impl Drop for QueueCloser {
    fn drop(&mut self) {
        self.0.close();
    }
}
