//! Transport-agnostic job submission surface.
//!
//! [`JobService`] mints a job id, routes the request through the shared
//! [`WorkerPool`], and resolves the originating caller's waiter once the
//! pool's background dispatcher observes that id on the output channel.
//! This is the fixed form of the upstream design, which let `Submit` run
//! jobs directly and left the pool's output channel unread.

pub mod http;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{error, warn};
use uuid::Uuid;

use crate::job::{JobError, JobExecutor, JobRequest, JobResponse};
use crate::pool::{Task, WorkerPool};

/// One job's outcome, tagged with the id that [`JobService::submit`] minted.
struct TaskOutput {
    id: Uuid,
    result: Result<JobResponse, String>,
}

type Waiters = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Result<JobResponse, String>>>>>;

/// Bound to one [`WorkerPool`] and [`JobExecutor`]; safe to share behind
/// an `Arc` across every RPC connection.
pub struct JobService {
    pool: Arc<WorkerPool<(Uuid, JobRequest), TaskOutput>>,
    waiters: Waiters,
    executor: Arc<JobExecutor>,
}

impl JobService {
    /// Start `worker_count` workers around `executor` and spawn the
    /// background dispatcher that resolves submitters' waiters.
    #[must_use]
    pub fn new(executor: JobExecutor, worker_count: usize) -> Self {
        let pool = Arc::new(WorkerPool::new(worker_count));
        pool.start();

        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));
        spawn_dispatcher(Arc::clone(&pool), Arc::clone(&waiters));

        Self {
            pool,
            waiters,
            executor: Arc::new(executor),
        }
    }

    /// Submit a job, block until the worker pool produces its result, and
    /// return it. The pool boundary is still crossed for every job, even
    /// though this call waits synchronously — see module docs.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Provisioning`] mapped from any pre-setup
    /// sandbox failure, or a service-level error if the pool rejected the
    /// submission (e.g. it has been stopped).
    pub async fn submit(&self, request: JobRequest) -> Result<JobResponse, JobError> {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, tx);

        let executor = self.executor_handle();
        let task = Task::new((id, request), move |_worker_id, (id, request)| {
            let executor = Arc::clone(&executor);
            async move {
                let result = executor
                    .execute(&request)
                    .await
                    .map_err(|err| err.to_string());
                TaskOutput { id, result }
            }
        });

        if self.pool.submit(task).await.is_err() {
            self.waiters
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(&id);
            return Err(JobError::Dispatch(
                "job service is not accepting submissions".to_owned(),
            ));
        }

        match rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(message)) => Err(JobError::Dispatch(message)),
            Err(_) => Err(JobError::Dispatch(
                "dispatcher dropped without a result".to_owned(),
            )),
        }
    }

    fn executor_handle(&self) -> Arc<JobExecutor> {
        Arc::clone(&self.executor)
    }
}

fn spawn_dispatcher(pool: Arc<WorkerPool<(Uuid, JobRequest), TaskOutput>>, waiters: Waiters) {
    let output_rx = pool.output_receiver();
    tokio::spawn(async move {
        while let Ok(output) = output_rx.recv_async().await {
            let waiter = waiters
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(&output.id);
            match waiter {
                Some(sender) => {
                    if sender.send(output.result).is_err() {
                        warn!(job_id = %output.id, "submitter vanished before result delivery");
                    }
                }
                None => error!(job_id = %output.id, "no waiter registered for completed job"),
            }
        }
    });
}
