//! Re-homes a single dispatch onto a freshly spawned worker.

use std::sync::Arc;

use crate::connection::Dispatcher;

use super::{Worker, WorkerContext, WorkerError};

/// Worker kind whose body performs exactly one dispatch.
///
/// The relay inherits its parent's label, so workers spawned from inside the
/// dispatch still describe the original resource. It decouples the thread
/// that decides to process a value from the thread that processes it.
#[derive(Debug, Clone, Copy)]
pub struct ThreadRelay;

impl ThreadRelay {
    /// Spawns a child of `parent` that hands `value` to `dispatcher`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] when the relay thread cannot start.
    pub fn spawn<V, D>(
        parent: &WorkerContext,
        value: V,
        dispatcher: Arc<D>,
    ) -> Result<Worker, WorkerError>
    where
        V: Send + 'static,
        D: Dispatcher<V> + ?Sized,
    {
        parent
            .child(parent.label())
            .spawn(move |relay| dispatcher.dispatch(relay, value))
    }
}
