//! Bounded-concurrency FIFO task queue
//!
//! `SerialTaskQueue` admits submitted operations strictly in submission order
//! and runs at most `max_concurrent` of them at a time. Anything beyond that
//! waits in an unbounded FIFO buffer. With `max_concurrent == 1` the queue is
//! a serial execution lane, which is what the channel registry builds on.
//!
//! Every submission carries its own `CancellationToken`:
//! - cancelled before it starts: removed from the buffer, never runs, never
//!   takes a slot
//! - cancelled while running: the operation observes the token and its future
//!   is dropped, so it may stop at its next await point
//!
//! Operations submitted with [`SerialTaskQueue::submit_to_completion`] are
//! never dropped once started; they only see the token and decide for
//! themselves where it is safe to stop.
//!
//! Cancelling one submission never affects any other. A panicking operation
//! resolves to `Panicked` and frees its slot like any other completion.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{ArtworkError, ArtworkResult};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct PendingTask {
    id: u64,
    token: CancellationToken,
    job: Job,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingTask>,
    running: HashMap<u64, CancellationToken>,
    next_id: u64,
    disposed: bool,
}

struct QueueInner {
    max_concurrent: usize,
    state: Mutex<QueueState>,
    running_tx: watch::Sender<usize>,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start as many pending tasks as there are free slots, in FIFO order.
    fn pump(self: &Arc<Self>) {
        let mut started = Vec::new();
        // Jobs own caller state (channel leases among others), so they are
        // dropped only after the lock is released.
        let mut skipped = Vec::new();
        {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            while state.running.len() < self.max_concurrent {
                let Some(task) = state.pending.pop_front() else {
                    break;
                };
                if task.token.is_cancelled() {
                    skipped.push(task);
                    continue;
                }
                state.running.insert(task.id, task.token.clone());
                started.push(task);
            }
            self.running_tx.send_replace(state.running.len());
        }
        drop(skipped);

        for task in started {
            let guard = FinishGuard {
                inner: Arc::clone(self),
                id: task.id,
            };
            tokio::spawn(async move {
                let _guard = guard;
                (task.job)().await;
            });
        }
    }

    fn finish(self: &Arc<Self>, id: u64) {
        {
            let mut state = self.lock();
            state.running.remove(&id);
            self.running_tx.send_replace(state.running.len());
        }
        self.pump();
    }

    /// Remove a not-yet-started task. Returns false if it already started.
    fn remove_pending(&self, id: u64) -> bool {
        let removed = {
            let mut state = self.lock();
            state
                .pending
                .iter()
                .position(|task| task.id == id)
                .and_then(|index| state.pending.remove(index))
        };
        removed.is_some()
    }
}

/// Frees a running slot however the spawned job ends, unwinding included.
struct FinishGuard {
    inner: Arc<QueueInner>,
    id: u64,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.inner.finish(self.id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A bounded-concurrency operation scheduler.
///
/// Cloning yields another handle to the same queue.
///
/// Submissions spawn onto the ambient Tokio runtime, so `submit` must be
/// called from within one.
#[derive(Clone)]
pub struct SerialTaskQueue {
    inner: Arc<QueueInner>,
}

impl SerialTaskQueue {
    /// Create a queue running at most `max_concurrent` operations at once.
    /// Values below 1 are treated as 1.
    pub fn new(max_concurrent: usize) -> Self {
        let (running_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(QueueInner {
                max_concurrent: max_concurrent.max(1),
                state: Mutex::new(QueueState::default()),
                running_tx,
            }),
        }
    }

    /// A queue that runs exactly one operation at a time.
    pub fn serial() -> Self {
        Self::new(1)
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Number of operations currently running.
    pub fn running(&self) -> usize {
        self.inner.lock().running.len()
    }

    /// Number of operations waiting for a free slot.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Observe the running-operation count as it changes.
    pub fn watch_running(&self) -> watch::Receiver<usize> {
        self.inner.running_tx.subscribe()
    }

    /// Enqueue `operation` and return a handle resolving to its result.
    ///
    /// The operation receives the submission's cancellation token. Dropping
    /// the returned handle before it resolves cancels the submission; use
    /// [`TaskHandle::detach`] to let it run unobserved.
    pub fn submit<F, Fut, T>(&self, operation: F) -> TaskHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ArtworkResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(operation, true)
    }

    /// Like [`submit`](Self::submit), but once the operation has started it
    /// runs until it returns. Cancellation before the start still removes
    /// it; afterwards it is only signalled through the token.
    pub fn submit_to_completion<F, Fut, T>(&self, operation: F) -> TaskHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ArtworkResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(operation, false)
    }

    fn enqueue<F, Fut, T>(&self, operation: F, interruptible: bool) -> TaskHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ArtworkResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let task_token = token.clone();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let op_token = task_token.clone();
                let run = AssertUnwindSafe(async move { operation(op_token).await })
                    .catch_unwind()
                    .map(|outcome| {
                        outcome.unwrap_or_else(|payload| {
                            let message = panic_message(payload.as_ref());
                            tracing::error!(error = %message, "Queued operation panicked");
                            Err(ArtworkError::Panicked(message))
                        })
                    });

                let result = if interruptible {
                    tokio::select! {
                        biased;
                        _ = task_token.cancelled() => Err(ArtworkError::Cancelled),
                        result = run => result,
                    }
                } else {
                    run.await
                };
                let _ = tx.send(result);
            })
        });

        let id = {
            let mut state = self.inner.lock();
            if state.disposed {
                None
            } else {
                let id = state.next_id;
                state.next_id += 1;
                state.pending.push_back(PendingTask {
                    id,
                    token: token.clone(),
                    job,
                });
                Some(id)
            }
        };

        let Some(id) = id else {
            tracing::debug!("Rejecting submission to disposed task queue");
            return TaskHandle::rejected(rx, token, ArtworkError::QueueDisposed);
        };

        self.inner.pump();

        TaskHandle {
            receiver: rx,
            token,
            queue: Arc::downgrade(&self.inner),
            id,
            rejected: None,
            finished: false,
            detached: false,
        }
    }

    /// Stop accepting submissions and cancel everything pending or running.
    ///
    /// Pending handles resolve to `Cancelled`; running operations see their
    /// token cancelled. Idempotent.
    pub fn dispose(&self) {
        let (pending, running) = {
            let mut state = self.inner.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            let pending: Vec<_> = state.pending.drain(..).collect();
            let running: Vec<_> = state.running.values().cloned().collect();
            (pending, running)
        };

        tracing::debug!(
            pending = pending.len(),
            running = running.len(),
            "Disposing task queue"
        );

        for task in &pending {
            task.token.cancel();
        }
        for token in running {
            token.cancel();
        }
        drop(pending);
    }
}

impl std::fmt::Debug for SerialTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SerialTaskQueue")
            .field("max_concurrent", &self.inner.max_concurrent)
            .field("running", &state.running.len())
            .field("pending", &state.pending.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

/// Handle to a submitted operation. Resolves to the operation's result, or
/// `Cancelled` if the submission was cancelled or its queue disposed.
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<ArtworkResult<T>>,
    token: CancellationToken,
    queue: Weak<QueueInner>,
    id: u64,
    rejected: Option<ArtworkError>,
    finished: bool,
    detached: bool,
}

impl<T> TaskHandle<T> {
    fn rejected(
        receiver: oneshot::Receiver<ArtworkResult<T>>,
        token: CancellationToken,
        error: ArtworkError,
    ) -> Self {
        Self {
            receiver,
            token,
            queue: Weak::new(),
            id: 0,
            rejected: Some(error),
            finished: false,
            detached: false,
        }
    }

    /// Cancel this submission only.
    pub fn cancel(&self) {
        self.token.cancel();
        if let Some(queue) = self.queue.upgrade() {
            if queue.remove_pending(self.id) {
                tracing::trace!(task = self.id, "Removed cancelled task before start");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token the operation observes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Let the operation run to completion without awaiting it.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = ArtworkResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(error) = self.rejected.take() {
            self.finished = true;
            return Poll::Ready(Err(error));
        }
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(result) => {
                self.finished = true;
                Poll::Ready(result.unwrap_or_else(|_| Err(ArtworkError::Cancelled)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if !self.finished && !self.detached {
            self.cancel();
        }
    }
}
