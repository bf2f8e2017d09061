//! The per-job state machine: provision a sandbox, run setup → compile →
//! run, and assemble a status-classified [`JobResponse`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bollard::container::{LogOutput, WaitContainerOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::container::{SandboxDriver, SandboxHandle, WORKSPACE_DIR};

use super::types::{
    validate_source_file_name, JobError, JobRequest, JobResponse, JobStatus, ResourceStatistics,
    UNEXECUTED_EXIT_CODE,
};

const SOURCE_MODE: u32 = 0o644;
const SCRIPT_MODE: u32 = 0o644;
const SETUP_SCRIPT: &str = "setup.sh";
const COMPILE_SCRIPT: &str = "compile.sh";
const RUN_SCRIPT: &str = "run.sh";

/// Bound on how long the executor waits for the stdout/stderr demux task
/// to drain after the container-wait already resolved, before giving up
/// and reading whatever has been buffered so far.
const DRAIN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Drives one job's sandbox lifecycle from creation to disposal.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    driver: Arc<SandboxDriver>,
    image: String,
    max_execution_time_ceiling_ms: u64,
}

impl JobExecutor {
    /// Build an executor bound to one sandbox image. Every call to
    /// [`JobExecutor::execute`] creates and destroys its own container.
    /// `max_execution_time_ceiling_ms` caps every request's requested run
    /// deadline, per [`crate::config::Config::clamp_execution_time_ms`].
    pub fn new(
        driver: Arc<SandboxDriver>,
        image: impl Into<String>,
        max_execution_time_ceiling_ms: u64,
    ) -> Self {
        Self {
            driver,
            image: image.into(),
            max_execution_time_ceiling_ms,
        }
    }

    /// Run one job end to end.
    ///
    /// Returns `Err` only for pre-setup provisioning failures (create,
    /// start, copy-in), which produce no `JobResponse`. Every other
    /// outcome — setup/compile non-zero, run success, run abort — is an
    /// `Ok(JobResponse)` whose `status`/`error_string` carry the
    /// classification. In every case the sandbox is stopped and removed
    /// before this function returns.
    pub async fn execute(&self, request: &JobRequest) -> Result<JobResponse, JobError> {
        validate_source_file_name(&request.source_code_file_name)?;

        let handle = self
            .driver
            .create(&self.image, &request.environment_variables, None)
            .await?;
        debug!(container_id = handle.id(), "sandbox created");

        let outcome = self.drive_job(&handle, request).await;

        if let Err(err) = self.driver.stop(&handle).await {
            warn!(container_id = handle.id(), %err, "failed to stop sandbox");
        }
        if let Err(err) = self.driver.remove(&handle).await {
            warn!(container_id = handle.id(), %err, "failed to remove sandbox");
        }

        outcome
    }

    async fn drive_job(
        &self,
        handle: &SandboxHandle,
        request: &JobRequest,
    ) -> Result<JobResponse, JobError> {
        self.driver.start(handle).await?;

        self.driver
            .copy_text(
                handle,
                WORKSPACE_DIR,
                &request.source_code_file_name,
                request.source_code.as_bytes(),
                SOURCE_MODE,
            )
            .await?;
        self.driver
            .copy_text(
                handle,
                WORKSPACE_DIR,
                SETUP_SCRIPT,
                request.setup_script.as_bytes(),
                SCRIPT_MODE,
            )
            .await?;
        self.driver
            .copy_text(
                handle,
                WORKSPACE_DIR,
                COMPILE_SCRIPT,
                request.compile_script.as_bytes(),
                SCRIPT_MODE,
            )
            .await?;
        self.driver
            .copy_text(
                handle,
                WORKSPACE_DIR,
                RUN_SCRIPT,
                request.run_script.as_bytes(),
                SCRIPT_MODE,
            )
            .await?;

        let setup = self
            .driver
            .exec_sync(handle, &script_path(SETUP_SCRIPT))
            .await?;
        if setup.exit_code != 0 {
            let mut response =
                JobResponse::unexecuted(JobStatus::InternalError, "setup script exited with non-zero code");
            response.setup_stdout = lossy(&setup.stdout);
            response.setup_stderr = lossy(&setup.stderr);
            response.setup_exit_code = setup.exit_code;
            return Ok(response);
        }

        let compile = self
            .driver
            .exec_sync(handle, &script_path(COMPILE_SCRIPT))
            .await?;
        if compile.exit_code != 0 {
            let mut response =
                JobResponse::unexecuted(JobStatus::CompileError, "compile script exited with non-zero code");
            response.setup_stdout = lossy(&setup.stdout);
            response.setup_stderr = lossy(&setup.stderr);
            response.setup_exit_code = setup.exit_code;
            response.compile_stdout = lossy(&compile.stdout);
            response.compile_stderr = lossy(&compile.stderr);
            response.compile_exit_code = compile.exit_code;
            return Ok(response);
        }

        self.run_phase(handle, request, &setup, &compile).await
    }

    async fn run_phase(
        &self,
        handle: &SandboxHandle,
        request: &JobRequest,
        setup: &crate::container::ScriptResult,
        compile: &crate::container::ScriptResult,
    ) -> Result<JobResponse, JobError> {
        let deadline_ms = crate::config::clamp_execution_time_ms(
            self.max_execution_time_ceiling_ms,
            request.resource_limits.max_execution_time_ms,
        )
        .max(1);
        let deadline = Duration::from_millis(deadline_ms);
        let start = Instant::now();

        let exec = self
            .driver
            .exec_async(handle, &script_path(RUN_SCRIPT))
            .await?;

        let stdout_buf = Arc::new(Mutex::new(Vec::<u8>::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (pump_err_tx, mut pump_err_rx) = mpsc::channel::<String>(2);

        let mut stdin_writer = exec.stdin;
        let stdin_payload = request.stdin.clone();
        let stdin_err_tx = pump_err_tx.clone();
        let stdin_task = tokio::spawn(async move {
            if let Err(err) = stdin_writer.write_all(&stdin_payload).await {
                let _ = stdin_err_tx.send(format!("stdin pump failed: {err}")).await;
                return;
            }
            if let Err(err) = stdin_writer.shutdown().await {
                let _ = stdin_err_tx
                    .send(format!("stdin half-close failed: {err}"))
                    .await;
            }
        });

        let mut output_stream = exec.output;
        let demux_stdout = Arc::clone(&stdout_buf);
        let demux_stderr = Arc::clone(&stderr_buf);
        let demux_err_tx = pump_err_tx.clone();
        let mut demux_task = tokio::spawn(async move {
            while let Some(frame) = output_stream.next().await {
                match frame {
                    Ok(LogOutput::StdOut { message }) => {
                        demux_stdout.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(&message);
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        demux_stderr.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(&message);
                    }
                    Ok(LogOutput::Console { message }) => {
                        demux_stdout.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(&message);
                    }
                    Ok(LogOutput::StdIn { .. }) => {}
                    Err(err) => {
                        let _ = demux_err_tx
                            .send(format!("stdout/stderr demux failed: {err}"))
                            .await;
                        return;
                    }
                }
            }
        });

        let mut wait_stream =
            Box::pin(self.driver.docker().wait_container(
                handle.id(),
                Some(WaitContainerOptions {
                    condition: "not-running",
                }),
            ));

        let (status, error_string, run_exit_code) = tokio::select! {
            wait_result = wait_stream.next() => {
                stdin_task.abort();
                let _ = tokio::time::timeout(DRAIN_GRACE_PERIOD, &mut demux_task).await;
                match wait_result {
                    Some(Ok(response)) => {
                        let error_string = response
                            .error
                            .and_then(|e| e.message)
                            .unwrap_or_default();
                        let exit_code = i32::try_from(response.status_code).unwrap_or(UNEXECUTED_EXIT_CODE);
                        (JobStatus::Finished, error_string, exit_code)
                    }
                    Some(Err(err)) => {
                        let _ = self.driver.stop(handle).await;
                        (JobStatus::Aborted, err.to_string(), UNEXECUTED_EXIT_CODE)
                    }
                    None => {
                        let _ = self.driver.stop(handle).await;
                        (JobStatus::Aborted, "container-wait stream ended unexpectedly".to_owned(), UNEXECUTED_EXIT_CODE)
                    }
                }
            }
            Some(pump_error) = pump_err_rx.recv() => {
                stdin_task.abort();
                demux_task.abort();
                let _ = self.driver.stop(handle).await;
                (JobStatus::Aborted, pump_error, UNEXECUTED_EXIT_CODE)
            }
            () = tokio::time::sleep(deadline) => {
                stdin_task.abort();
                demux_task.abort();
                let _ = self.driver.stop(handle).await;
                (JobStatus::Aborted, format!("run phase exceeded {}ms deadline", deadline.as_millis()), UNEXECUTED_EXIT_CODE)
            }
        };

        let run_stdout = lossy(&stdout_buf.lock().unwrap_or_else(|e| e.into_inner()));
        let run_stderr = lossy(&stderr_buf.lock().unwrap_or_else(|e| e.into_inner()));

        Ok(JobResponse {
            status,
            error_string,
            setup_stdout: lossy(&setup.stdout),
            setup_stderr: lossy(&setup.stderr),
            setup_exit_code: setup.exit_code,
            compile_stdout: lossy(&compile.stdout),
            compile_stderr: lossy(&compile.stderr),
            compile_exit_code: compile.exit_code,
            run_stdout,
            run_stderr,
            run_exit_code,
            resource_statistics: ResourceStatistics {
                execution_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                max_memory_used: super::types::MAX_MEMORY_USED_SENTINEL,
            },
        })
    }
}

fn script_path(file_name: &str) -> String {
    format!("{WORKSPACE_DIR}/{file_name}")
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
