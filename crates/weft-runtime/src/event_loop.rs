//! Single-worker task queue.
//!
//! An [`EventLoop<S>`] owns exactly one worker thread, and that thread
//! exclusively owns the loop state `S`. Tasks are closures over `&mut S`,
//! so the only way to touch the state is to [`post`](EventLoop::post) a task
//! and let a [`tick`](EventLoop::tick) hand it over. `S` is built on the
//! worker thread itself and is never required to be `Send`.
//!
//! `tick` swaps out the whole pending queue and hands it to the worker over
//! a rendezvous channel: the caller blocks until the worker *accepts* the
//! batch, not until it finishes. A bursty producer is thereby throttled to
//! the speed of the worker. Tasks within a batch run in post order, each
//! under `catch_unwind`; a panicking task is logged with the backtrace the
//! panic hook captured at the panic site.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, error, warn};
use weft_core::logging::{install_panic_hook, panic_message, take_panic_backtrace};

/// A unit of work executed on the loop's worker thread.
pub type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

struct Shared<S> {
    name: String,
    pending: Mutex<Vec<Task<S>>>,
    /// Serializes swap-and-hand-off so concurrent tickers keep FIFO order.
    tick_lock: Mutex<()>,
    sender: Mutex<Option<SyncSender<Vec<Task<S>>>>>,
    destroyed: AtomicBool,
    worker: OnceLock<ThreadId>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a single-threaded task queue. Clones share the same loop.
pub struct EventLoop<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for EventLoop<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: 'static> EventLoop<S> {
    /// Create a loop that queues tasks but has no worker yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                pending: Mutex::new(Vec::new()),
                tick_lock: Mutex::new(()),
                sender: Mutex::new(None),
                destroyed: AtomicBool::new(false),
                worker: OnceLock::new(),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Create a loop and start its worker.
    pub fn spawn<F>(name: impl Into<String>, init: F) -> std::io::Result<Self>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        let event_loop = Self::new(name);
        event_loop.start(init)?;
        Ok(event_loop)
    }

    /// Start the worker thread. `init` builds the loop state on that thread.
    ///
    /// The worker inherits the caller's tracing dispatcher. Starting twice is
    /// a logged no-op.
    pub fn start<F>(&self, init: F) -> std::io::Result<()>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        let mut sender = self.shared.sender.lock();
        if sender.is_some() || self.is_destroyed() {
            warn!(event_loop = %self.shared.name, "event loop already started or destroyed");
            return Ok(());
        }

        install_panic_hook();
        let (tx, rx) = sync_channel::<Vec<Task<S>>>(0);
        let shared = self.shared.clone();
        let dispatch = tracing::dispatcher::get_default(Clone::clone);
        let handle = thread::Builder::new()
            .name(format!("weft-loop-{}", self.shared.name))
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || run_worker(&shared, &rx, init));
            })?;

        let _ = self.shared.worker.set(handle.thread().id());
        *self.shared.handle.lock() = Some(handle);
        *sender = Some(tx);
        debug!(event_loop = %self.shared.name, "event loop started");
        Ok(())
    }

    /// Append a task to the pending queue. Never blocks.
    ///
    /// Posting to a destroyed loop is logged and the task is dropped.
    pub fn post(&self, task: impl FnOnce(&mut S) + Send + 'static) {
        if self.is_destroyed() {
            error!(event_loop = %self.shared.name, "post on destroyed event loop");
            return;
        }
        self.shared.pending.lock().push(Box::new(task));
    }

    /// Hand the pending queue to the worker as one batch.
    ///
    /// Blocks until the worker accepts the batch. Calling this from the
    /// worker itself would deadlock, so it is ignored there with a warning;
    /// tasks posted from inside the loop are picked up by the next external
    /// tick.
    pub fn tick(&self) {
        if self.is_destroyed() {
            error!(event_loop = %self.shared.name, "tick on destroyed event loop");
            return;
        }
        if self.is_loop_thread() {
            warn!(event_loop = %self.shared.name, "tick from inside the event loop ignored");
            return;
        }

        let _guard = self.shared.tick_lock.lock();
        let batch = std::mem::take(&mut *self.shared.pending.lock());
        if batch.is_empty() {
            return;
        }
        let Some(sender) = self.shared.sender.lock().clone() else {
            warn!(
                event_loop = %self.shared.name,
                discarded = batch.len(),
                "tick on event loop without worker"
            );
            return;
        };
        if sender.send(batch).is_err() {
            error!(event_loop = %self.shared.name, "event loop worker is gone, batch discarded");
        }
    }

    /// Stop the worker and discard everything still queued. Idempotent.
    ///
    /// Does not wait: a task currently running finishes, remaining tasks of
    /// its batch are skipped, then the worker drops the loop state.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let discarded = std::mem::take(&mut *self.shared.pending.lock());
        drop(self.shared.sender.lock().take());
        debug!(
            event_loop = %self.shared.name,
            discarded = discarded.len(),
            "event loop destroyed"
        );
    }

    /// Run every task posted before this call, then [`destroy`](Self::destroy).
    ///
    /// Blocks the caller until a barrier task has run. Must not be called
    /// from inside the loop; doing so destroys without draining. Idempotent.
    pub fn shutdown(&self) {
        if self.is_destroyed() {
            return;
        }
        if self.is_loop_thread() {
            error!(
                event_loop = %self.shared.name,
                "shutdown called from inside the event loop, destroying without draining"
            );
            self.destroy();
            return;
        }

        let (tx, rx) = sync_channel::<()>(1);
        self.post(move |_| {
            let _ = tx.send(());
        });
        self.tick();
        // Err means the barrier was discarded by a concurrent destroy.
        let _ = rx.recv();
        self.destroy();
    }

    /// Block until the worker thread has exited and dropped the loop state.
    ///
    /// Only meaningful after [`destroy`](Self::destroy); ignored on the worker
    /// itself.
    pub fn join(&self) {
        if self.is_loop_thread() {
            warn!(event_loop = %self.shared.name, "join from inside the event loop ignored");
            return;
        }
        let handle = self.shared.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(event_loop = %self.shared.name, "event loop worker panicked");
            }
        }
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    /// Whether the current thread is this loop's worker.
    pub fn is_loop_thread(&self) -> bool {
        self.shared
            .worker
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    /// Whether tasks are waiting for the next tick.
    pub fn has_pending(&self) -> bool {
        !self.shared.pending.lock().is_empty()
    }

    /// Loop name used in logs and the worker thread name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

fn run_worker<S, F>(shared: &Shared<S>, rx: &Receiver<Vec<Task<S>>>, init: F)
where
    F: FnOnce() -> S,
{
    let mut state = init();
    while let Ok(batch) = rx.recv() {
        for task in batch {
            if shared.destroyed.load(Ordering::Acquire) {
                break;
            }
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task(&mut state))) {
                counter!("event_loop_task_panics_total").increment(1);
                let backtrace = take_panic_backtrace()
                    .map_or_else(|| "<not captured>".to_owned(), |bt| bt.to_string());
                error!(
                    event_loop = %shared.name,
                    panic = %panic_message(payload.as_ref()),
                    %backtrace,
                    "task panicked"
                );
            }
        }
        if shared.destroyed.load(Ordering::Acquire) {
            break;
        }
    }
    debug!(event_loop = %shared.name, "event loop worker stopping");
    drop(state);
}
