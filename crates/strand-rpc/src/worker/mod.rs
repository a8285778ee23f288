//! Supervised worker threads arranged in a parent/child tree.
//!
//! Every [`Worker`] runs its body on a dedicated OS thread. A worker started
//! with a parent is registered in that parent's child set before its thread
//! starts and stays there until its body has returned and all of its own
//! children have finished. Shutdown is cooperative: [`Worker::shutdown`]
//! flags the whole subtree depth-first and runs any registered shutdown hooks,
//! but never waits for the threads to exit. Use [`Worker::join`] for that.

mod relay;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info_span, trace, warn};

pub use self::relay::ThreadRelay;

const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "w{}", self.0)
    }
}

/// Errors surfaced by worker lifecycle operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The OS refused to start a thread for the worker.
    #[error("failed to spawn worker thread for {label}: {source}")]
    Spawn {
        /// Label of the worker that could not start.
        label: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The worker's body panicked.
    #[error("worker {label} panicked")]
    Panicked {
        /// Label of the worker whose body panicked.
        label: String,
    },
    /// A worker attempted to join its own thread.
    #[error("worker {label} cannot join itself")]
    JoinSelf {
        /// Label of the worker.
        label: String,
    },
}

type ShutdownHook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Running,
    Finished,
    Panicked,
}

struct Node {
    id: WorkerId,
    label: String,
    parent: Option<Weak<Node>>,
    shutdown: AtomicBool,
    children: Mutex<HashMap<WorkerId, Arc<Node>>>,
    drained: Condvar,
    hooks: Mutex<Vec<ShutdownHook>>,
    completion: Mutex<Completion>,
    completed: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Node {
    fn new(label: String, parent: Option<&Arc<Self>>) -> Self {
        Self {
            id: WorkerId::next(),
            label,
            parent: parent.map(Arc::downgrade),
            shutdown: AtomicBool::new(false),
            children: Mutex::new(HashMap::new()),
            drained: Condvar::new(),
            hooks: Mutex::new(Vec::new()),
            completion: Mutex::new(Completion::Running),
            completed: Condvar::new(),
            thread: Mutex::new(None),
        }
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn adopt(&self, child: &Arc<Self>) {
        lock(&self.children).insert(child.id, Arc::clone(child));
        // A child registered while this node is already shutting down would
        // otherwise miss the cascade.
        if self.is_shutdown_requested() {
            child.request_shutdown();
        }
    }

    fn children_snapshot(&self) -> Vec<Arc<Self>> {
        lock(&self.children).values().cloned().collect()
    }

    fn request_shutdown(&self) {
        for child in self.children_snapshot() {
            child.request_shutdown();
        }

        if !self.shutdown.swap(true, Ordering::SeqCst) {
            debug!(
                target: WORKER_TARGET,
                worker = %self.id,
                label = %self.label,
                "shutdown requested"
            );
        }

        let hooks = std::mem::take(&mut *lock(&self.hooks));
        for hook in hooks {
            hook();
        }

        for child in self.children_snapshot() {
            if !child.is_shutdown_requested() {
                child.request_shutdown();
            }
        }
    }

    fn register_hook(&self, hook: ShutdownHook) {
        let mut hooks = lock(&self.hooks);
        if self.is_shutdown_requested() {
            drop(hooks);
            hook();
        } else {
            hooks.push(hook);
        }
    }

    fn join_children(&self) {
        let mut children = lock(&self.children);
        while !children.is_empty() {
            children = self
                .drained
                .wait(children)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn detach_from_parent(&self) {
        let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let mut siblings = lock(&parent.children);
        siblings.remove(&self.id);
        drop(siblings);
        parent.drained.notify_all();
    }

    fn finish(&self, outcome: Completion) {
        *lock(&self.completion) = outcome;
        self.completed.notify_all();
    }

    fn wait_completion(&self, timeout: Option<Duration>) -> Completion {
        let state = lock(&self.completion);
        let running = |state: &mut Completion| *state == Completion::Running;
        let state = match timeout {
            None => self
                .completed
                .wait_while(state, running)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                self.completed
                    .wait_timeout_while(state, timeout, running)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        *state
    }
}

/// Runs on the worker's thread after its body returns or unwinds.
struct Termination {
    node: Arc<Node>,
    started: Instant,
}

impl Drop for Termination {
    fn drop(&mut self) {
        let outcome = if thread::panicking() {
            warn!(
                target: WORKER_TARGET,
                worker = %self.node.id,
                label = %self.node.label,
                "worker body panicked"
            );
            Completion::Panicked
        } else {
            Completion::Finished
        };
        self.node.join_children();
        self.node.detach_from_parent();
        trace!(
            target: WORKER_TARGET,
            worker = %self.node.id,
            label = %self.node.label,
            elapsed_ms = self.started.elapsed().as_millis(),
            "worker finished"
        );
        self.node.finish(outcome);
    }
}

/// View of the running worker handed to its body.
pub struct WorkerContext {
    node: Arc<Node>,
}

impl WorkerContext {
    /// Identifier of the running worker.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.node.id
    }

    /// Description of the resource the worker owns.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.node.label
    }

    /// Returns `true` once shutdown has been requested for this worker.
    ///
    /// Bodies must poll this at bounded intervals and return promptly once it
    /// becomes `true`.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.node.is_shutdown_requested()
    }

    /// Registers a hook that runs when shutdown is requested.
    ///
    /// The hook runs immediately when shutdown has already been requested.
    pub fn on_shutdown(&self, hook: impl FnOnce() + Send + 'static) {
        self.node.register_hook(Box::new(hook));
    }

    /// Starts describing a child worker of this one.
    #[must_use]
    pub fn child(&self, label: impl Into<String>) -> WorkerBuilder<'_> {
        Worker::builder(label).parent(self)
    }

    /// Returns an owning handle to the running worker.
    #[must_use]
    pub fn handle(&self) -> Worker {
        Worker {
            node: Arc::clone(&self.node),
        }
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WorkerContext")
            .field("id", &self.node.id)
            .field("label", &self.node.label)
            .finish_non_exhaustive()
    }
}

/// Describes a worker before it is started.
#[must_use]
pub struct WorkerBuilder<'a> {
    label: String,
    parent: Option<&'a WorkerContext>,
    hooks: Vec<ShutdownHook>,
}

impl<'a> WorkerBuilder<'a> {
    /// Registers the new worker as a child of `parent`.
    pub fn parent(mut self, parent: &'a WorkerContext) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Registers a shutdown hook before the worker's thread starts.
    pub fn on_shutdown(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Starts the worker's body on a new thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] when the thread cannot be created.
    pub fn spawn<F>(self, body: F) -> Result<Worker, WorkerError>
    where
        F: FnOnce(&WorkerContext) + Send + 'static,
    {
        self.spawn_with_hook(body, |_| ()).map(|(worker, ())| worker)
    }

    /// Starts the worker's body on a new thread, then runs `on_parent_side`
    /// synchronously on the caller's thread while the body executes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] when the thread cannot be created. The
    /// worker is removed from its parent again and the hook does not run.
    pub fn spawn_with_hook<F, H, R>(
        self,
        body: F,
        on_parent_side: H,
    ) -> Result<(Worker, R), WorkerError>
    where
        F: FnOnce(&WorkerContext) + Send + 'static,
        H: FnOnce(&Worker) -> R,
    {
        let parent = self.parent.map(|context| &context.node);
        let node = Arc::new(Node::new(self.label, parent));
        for hook in self.hooks {
            node.register_hook(hook);
        }
        if let Some(parent) = parent {
            parent.adopt(&node);
        }

        let context = WorkerContext {
            node: Arc::clone(&node),
        };
        let spawned = thread::Builder::new()
            .name(format!("strand-{}", node.id))
            .spawn(move || run_body(&context, body));

        match spawned {
            Ok(handle) => {
                *lock(&node.thread) = Some(handle);
            }
            Err(source) => {
                node.detach_from_parent();
                node.finish(Completion::Finished);
                return Err(WorkerError::Spawn {
                    label: node.label.clone(),
                    source,
                });
            }
        }

        trace!(
            target: WORKER_TARGET,
            worker = %node.id,
            label = %node.label,
            parent = ?self.parent.map(WorkerContext::id),
            "worker started"
        );

        let worker = Worker { node };
        let output = on_parent_side(&worker);
        Ok((worker, output))
    }
}

fn run_body<F>(context: &WorkerContext, body: F)
where
    F: FnOnce(&WorkerContext),
{
    let span = info_span!(
        target: WORKER_TARGET,
        "worker",
        id = %context.node.id,
        label = %context.node.label
    );
    let _entered = span.enter();
    let _termination = Termination {
        node: Arc::clone(&context.node),
        started: Instant::now(),
    };
    body(context);
}

/// Owning handle to a supervised worker thread.
///
/// Handles are cheap to clone; every clone refers to the same worker.
#[derive(Clone)]
pub struct Worker {
    node: Arc<Node>,
}

impl Worker {
    /// Starts describing a root worker.
    pub fn builder(label: impl Into<String>) -> WorkerBuilder<'static> {
        WorkerBuilder {
            label: label.into(),
            parent: None,
            hooks: Vec::new(),
        }
    }

    /// Identifier of the worker.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.node.id
    }

    /// Description of the resource the worker owns.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.node.label
    }

    /// Requests cooperative shutdown of this worker and all its descendants.
    ///
    /// Children are flagged depth-first before this worker; the call returns
    /// without waiting for any thread to exit.
    pub fn shutdown(&self) {
        self.node.request_shutdown();
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.node.is_shutdown_requested()
    }

    /// Number of children that have not finished yet.
    #[must_use]
    pub fn child_count(&self) -> usize {
        lock(&self.node.children).len()
    }

    /// Returns `true` once the body has returned and all children finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *lock(&self.node.completion) != Completion::Running
    }

    /// Waits up to `timeout` for the worker to finish.
    ///
    /// Returns `true` when the worker finished within the timeout.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.node.wait_completion(Some(timeout)) != Completion::Running
    }

    /// Blocks until the worker and all of its descendants have finished.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Panicked`] when the body panicked and
    /// [`WorkerError::JoinSelf`] when called from the worker's own thread.
    pub fn join(&self) -> Result<(), WorkerError> {
        let handle = lock(&self.node.thread).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                *lock(&self.node.thread) = Some(handle);
                return Err(WorkerError::JoinSelf {
                    label: self.node.label.clone(),
                });
            }
            // The body's outcome is recorded by the termination guard.
            drop(handle.join());
        }

        match self.node.wait_completion(None) {
            Completion::Panicked => Err(WorkerError::Panicked {
                label: self.node.label.clone(),
            }),
            Completion::Finished | Completion::Running => Ok(()),
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Worker")
            .field("id", &self.node.id)
            .field("label", &self.node.label)
            .field("shutdown_requested", &self.is_shutdown_requested())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
