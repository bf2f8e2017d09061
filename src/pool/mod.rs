//! A generic, fixed-size worker pool with an unbuffered task queue.
//!
//! `Submit` rendezvous-hands a task directly to an idle worker: it blocks
//! until one claims it, rather than piling tasks into a backlog. Workers
//! push results onto a single shared output channel; callers that need a
//! result routed back to a specific submitter (see `crate::rpc`) must
//! correlate it themselves, typically by embedding an id in `O`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Emitted on the event channel once the outstanding task count returns
/// to zero after having been above it. Advisory only: a `Submit` racing
/// the observation may already have pushed the count back up by the time
/// a receiver observes this event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// No task is currently claimed or queued.
    AllTasksDone,
}

type TaskFn<I, O> = Box<dyn Fn(usize, I) -> Pin<Box<dyn Future<Output = O> + Send>> + Send + Sync>;

/// Work handed to the pool: an input value and the function each worker
/// applies to it.
pub struct Task<I, O> {
    input: I,
    task_fn: TaskFn<I, O>,
}

impl<I, O> Task<I, O> {
    /// Bind an input to a task function. `task_fn` receives the claiming
    /// worker's id and the input, and returns the output pushed onto the
    /// pool's output channel.
    pub fn new<F, Fut>(input: I, task_fn: F) -> Self
    where
        F: Fn(usize, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        Self {
            input,
            task_fn: Box::new(move |worker_id, input| Box::pin(task_fn(worker_id, input))),
        }
    }
}

/// Error returned by [`WorkerPool::submit`] when the pool is not running.
#[derive(Debug, thiserror::Error)]
#[error("no new tasks are accepted for a stopped worker pool")]
pub struct PoolStoppedError;

/// A running or stopped pool of `worker_count` workers sharing one
/// rendezvous task queue and one output channel.
pub struct WorkerPool<I, O> {
    worker_count: usize,
    task_tx: flume::Sender<Task<I, O>>,
    task_rx: flume::Receiver<Task<I, O>>,
    output_tx: flume::Sender<O>,
    output_rx: flume::Receiver<O>,
    event_tx: flume::Sender<WorkerEvent>,
    event_rx: flume::Receiver<WorkerEvent>,
    outstanding: Arc<AtomicI64>,
    running: Arc<std::sync::atomic::AtomicBool>,
    cancel: CancellationToken,
    worker_handles: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl<I, O> WorkerPool<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Build a pool with `worker_count` workers. The pool does not start
    /// processing until [`WorkerPool::start`] is called.
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        let (task_tx, task_rx) = flume::bounded(0);
        let (output_tx, output_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::bounded(1);
        Self {
            worker_count,
            task_tx,
            task_rx,
            output_tx,
            output_rx,
            event_tx,
            event_rx,
            outstanding: Arc::new(AtomicI64::new(0)),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            worker_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Spawn `worker_count` worker tasks. A no-op if already running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.worker_handles.lock().unwrap_or_else(|e| e.into_inner());
        for worker_id in 0..self.worker_count {
            let task_rx = self.task_rx.clone();
            let output_tx = self.output_tx.clone();
            let event_tx = self.event_tx.clone();
            let outstanding = Arc::clone(&self.outstanding);
            let running = Arc::clone(&self.running);
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, task_rx, output_tx, event_tx, outstanding, running, cancel).await;
            }));
        }
    }

    /// Signal every worker to stop claiming new tasks after its current
    /// one, if any, and wake any worker idle-blocked on the rendezvous
    /// queue so it observes the stop instead of waiting for a task that
    /// will never come. Does not wait for in-flight tasks to finish.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// Hand a task directly to an idle worker, blocking until one claims
    /// it. Returns [`PoolStoppedError`] if the pool is not running.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool has been stopped.
    pub async fn submit(&self, task: Task<I, O>) -> Result<(), PoolStoppedError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(PoolStoppedError);
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.task_tx.send_async(task).await.is_err() {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolStoppedError);
        }
        Ok(())
    }

    /// Shared output channel every worker pushes its task's result onto.
    #[must_use]
    pub fn output_receiver(&self) -> flume::Receiver<O> {
        self.output_rx.clone()
    }

    /// Best-effort `AllTasksDone` notifications.
    #[must_use]
    pub fn event_receiver(&self) -> flume::Receiver<WorkerEvent> {
        self.event_rx.clone()
    }

    /// Number of tasks claimed or waiting to be claimed.
    #[must_use]
    pub fn task_count(&self) -> i64 {
        self.outstanding.load(Ordering::SeqCst)
    }
}

async fn worker_loop<I, O>(
    worker_id: usize,
    task_rx: flume::Receiver<Task<I, O>>,
    output_tx: flume::Sender<O>,
    event_tx: flume::Sender<WorkerEvent>,
    outstanding: Arc<AtomicI64>,
    running: Arc<std::sync::atomic::AtomicBool>,
    cancel: CancellationToken,
) where
    I: Send + 'static,
    O: Send + 'static,
{
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }

        let task = tokio::select! {
            () = cancel.cancelled() => return,
            received = task_rx.recv_async() => match received {
                Ok(task) => task,
                Err(_) => return,
            },
        };

        let output = (task.task_fn)(worker_id, task.input).await;
        if output_tx.send_async(output).await.is_err() {
            debug!(worker_id, "output channel closed, dropping result");
        }

        let previous = outstanding.fetch_sub(1, Ordering::SeqCst);
        if previous <= 1 {
            let _ = event_tx.try_send(WorkerEvent::AllTasksDone);
        }
    }
}
