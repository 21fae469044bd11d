//! Counting semaphore with FIFO wake-up.
//!
//! Each authenticator variant owns one, seeded at the allowed number of
//! concurrent login handshakes, so callers that all discover a stale session
//! queue up behind a single handshake instead of racing the SSO server.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

struct State {
    /// Negative values count the suspended waiters
    value: i64,
    waiters: VecDeque<oneshot::Sender<()>>,
}

pub struct Semaphore {
    state: Mutex<State>,
}

impl Semaphore {
    pub fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(State {
                value: i64::try_from(count).unwrap_or(i64::MAX),
                waiters: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decrement, suspending the caller if the count went negative.
    ///
    /// A caller dropped while suspended hands its turn to the next waiter.
    pub async fn wait(&self) {
        let rx = {
            let mut state = self.lock();
            state.value -= 1;
            if state.value >= 0 {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        let mut pending = PendingWait {
            semaphore: self,
            rx: Some(rx),
        };
        if let Some(rx) = pending.rx.as_mut() {
            // The sender only disappears with the semaphore itself
            let _ = rx.await;
        }
        pending.rx = None;
    }

    /// Increment `n` times, waking up to `n` waiters in arrival order.
    pub fn signal(&self, n: usize) {
        let mut state = self.lock();
        for _ in 0..n {
            state.value += 1;
            while let Some(tx) = state.waiters.pop_front() {
                if tx.send(()).is_ok() {
                    break;
                }
                // Abandoned waiter: give back the slot it reserved
                state.value += 1;
            }
        }
    }

    /// Wait, and signal once when the returned permit drops.
    pub async fn acquire(&self) -> Permit<'_> {
        self.wait().await;
        Permit { semaphore: self }
    }

    /// Current count; negative when callers are suspended
    pub fn value(&self) -> i64 {
        self.lock().value
    }
}

struct PendingWait<'a> {
    semaphore: &'a Semaphore,
    rx: Option<oneshot::Receiver<()>>,
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            // Woken between the send and our cancellation: pass the turn on
            if rx.try_recv().is_ok() {
                self.semaphore.signal(1);
            }
        }
    }
}

#[must_use = "the semaphore is signalled as soon as the permit drops"]
pub struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.signal(1);
    }
}
