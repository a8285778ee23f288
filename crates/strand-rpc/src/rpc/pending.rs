//! Correlation of outbound requests with their responses.
//!
//! Each registered call owns a single-slot cell with its own condition
//! variable. The table lock is only held to insert, look up, or remove a
//! cell; delivery synchronises on the cell alone. Only the waiting caller
//! removes its entry, so a response that arrives after the caller gave up
//! finds the cell abandoned (or gone) and is reported as unsolicited.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::message::Response;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
enum CallState {
    Waiting,
    Resolved(Response),
    Abandoned,
    Closed,
}

#[derive(Debug)]
struct CallCell {
    state: Mutex<CallState>,
    ready: Condvar,
}

/// Handle held by the caller of a correlated request.
#[derive(Debug)]
pub(crate) struct PendingCall {
    id: i64,
    cell: Arc<CallCell>,
}

impl PendingCall {
    pub(crate) fn id(&self) -> i64 {
        self.id
    }
}

/// How a wait on a [`PendingCall`] ended.
#[derive(Debug)]
pub(crate) enum WaitOutcome {
    Resolved(Response),
    TimedOut,
    Closed,
}

/// Result of routing an inbound response.
#[derive(Debug)]
pub(crate) enum Delivery {
    Delivered,
    Unsolicited(Response),
}

/// Table of calls awaiting a response, keyed by request id.
#[derive(Debug, Default)]
pub(crate) struct PendingCalls {
    calls: Mutex<HashMap<i64, Arc<CallCell>>>,
}

impl PendingCalls {
    /// Registers `id`. Callers allocate ids uniquely, so an entry never
    /// replaces another.
    pub(crate) fn register(&self, id: i64) -> PendingCall {
        let cell = Arc::new(CallCell {
            state: Mutex::new(CallState::Waiting),
            ready: Condvar::new(),
        });
        lock(&self.calls).insert(id, Arc::clone(&cell));
        PendingCall { id, cell }
    }

    /// Forgets a call whose request never reached the wire.
    pub(crate) fn discard(&self, call: PendingCall) {
        *lock(&call.cell.state) = CallState::Abandoned;
        lock(&self.calls).remove(&call.id);
    }

    /// Blocks until the call is resolved, the table is closed, or `timeout`
    /// elapses. `None` waits without bound. The entry is removed on return.
    pub(crate) fn wait(&self, call: PendingCall, timeout: Option<Duration>) -> WaitOutcome {
        let waiting = |state: &mut CallState| matches!(state, CallState::Waiting);
        let guard = lock(&call.cell.state);
        let mut state = match timeout {
            Some(timeout) => {
                call.cell
                    .ready
                    .wait_timeout_while(guard, timeout, waiting)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => call
                .cell
                .ready
                .wait_while(guard, waiting)
                .unwrap_or_else(PoisonError::into_inner),
        };
        let outcome = match std::mem::replace(&mut *state, CallState::Abandoned) {
            CallState::Resolved(response) => WaitOutcome::Resolved(response),
            CallState::Closed => WaitOutcome::Closed,
            CallState::Waiting | CallState::Abandoned => WaitOutcome::TimedOut,
        };
        drop(state);
        lock(&self.calls).remove(&call.id);
        outcome
    }

    /// Hands `response` to its waiting caller, exactly once.
    ///
    /// Responses without an integer id, for unknown ids, or for calls that
    /// were already resolved or abandoned are returned as unsolicited.
    pub(crate) fn deliver(&self, response: Response) -> Delivery {
        let Some(cell) = response
            .correlation_id()
            .and_then(|id| lock(&self.calls).get(&id).cloned())
        else {
            return Delivery::Unsolicited(response);
        };

        let mut state = lock(&cell.state);
        if !matches!(*state, CallState::Waiting) {
            return Delivery::Unsolicited(response);
        }
        *state = CallState::Resolved(response);
        drop(state);
        cell.ready.notify_one();
        Delivery::Delivered
    }

    /// Wakes every waiting caller with [`WaitOutcome::Closed`].
    pub(crate) fn close_all(&self) {
        let cells: Vec<_> = lock(&self.calls).values().cloned().collect();
        for cell in cells {
            let mut state = lock(&cell.state);
            if matches!(*state, CallState::Waiting) {
                *state = CallState::Closed;
                drop(state);
                cell.ready.notify_one();
            }
        }
    }

    /// Number of registered calls.
    pub(crate) fn len(&self) -> usize {
        lock(&self.calls).len()
    }
}
