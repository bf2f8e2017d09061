//! Request/response schema for the job pipeline.

use serde::{Deserialize, Serialize};

/// Exit code reported for a phase that never ran.
pub const UNEXECUTED_EXIT_CODE: i32 = -1;

/// Sentinel value for the unimplemented memory-usage measurement.
pub const MAX_MEMORY_USED_SENTINEL: i64 = -1;

/// A single submission: source file, three build/run scripts, stdin, and
/// a wall-clock budget. Immutable for the lifetime of the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Full text of the submitted source file.
    pub source_code: String,
    /// Relative path the source file is written to inside `/workspace`.
    /// Must not contain `..` components or be absolute.
    pub source_code_file_name: String,
    /// Shell script run before compilation; may be empty.
    #[serde(default)]
    pub setup_script: String,
    /// Shell script that builds the submission; may be empty.
    #[serde(default)]
    pub compile_script: String,
    /// Shell script that runs the submission; may be empty.
    #[serde(default)]
    pub run_script: String,
    /// Bytes fed to the run phase's stdin.
    #[serde(default)]
    pub stdin: Vec<u8>,
    /// `KEY=VALUE` environment variables, applied to the sandbox container.
    #[serde(default)]
    pub environment_variables: Vec<String>,
    /// Resource limits for this job.
    pub resource_limits: ResourceLimits,
}

/// Wall-clock and resource budget applied to the run phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum run-phase wall-clock time, in milliseconds. Must be > 0.
    pub max_execution_time_ms: u64,
}

/// Terminal classification of a job, per the status-assignment rules:
/// `Finished` iff setup and compile both exited 0 and the run phase
/// reached a wait result; `CompileError` iff setup exited 0 and compile
/// did not; `InternalError` iff setup did not exit 0; `Aborted` iff the
/// run phase was interrupted by deadline, runtime error, or I/O-pump
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Setup, compile, and run all completed; run's exit code may be non-zero.
    #[serde(rename = "Finished")]
    Finished,
    /// Setup exited 0, compile exited non-zero.
    #[serde(rename = "Compile Error")]
    CompileError,
    /// Setup exited non-zero.
    #[serde(rename = "Internal Error")]
    InternalError,
    /// The run phase was interrupted before it reached a wait result.
    #[serde(rename = "Aborted")]
    Aborted,
}

/// Run-phase timing and (unimplemented) memory usage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceStatistics {
    /// Milliseconds from just before the run phase started to its
    /// terminal branch firing.
    pub execution_time_ms: u64,
    /// Always `-1`: memory-usage measurement is out of scope.
    pub max_memory_used: i64,
}

impl Default for ResourceStatistics {
    fn default() -> Self {
        Self {
            execution_time_ms: 0,
            max_memory_used: MAX_MEMORY_USED_SENTINEL,
        }
    }
}

/// Full result of one job: per-phase output, the overall status, and
/// resource statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    /// Overall classification of this job.
    pub status: JobStatus,
    /// Human-readable diagnostic; empty on pure success.
    #[serde(default)]
    pub error_string: String,
    /// Setup phase stdout.
    #[serde(default)]
    pub setup_stdout: String,
    /// Setup phase stderr.
    #[serde(default)]
    pub setup_stderr: String,
    /// Setup phase exit code, or `-1` if it did not run.
    pub setup_exit_code: i32,
    /// Compile phase stdout.
    #[serde(default)]
    pub compile_stdout: String,
    /// Compile phase stderr.
    #[serde(default)]
    pub compile_stderr: String,
    /// Compile phase exit code, or `-1` if it did not run.
    pub compile_exit_code: i32,
    /// Run phase stdout.
    #[serde(default)]
    pub run_stdout: String,
    /// Run phase stderr.
    #[serde(default)]
    pub run_stderr: String,
    /// Run phase exit code, or `-1` if it was interrupted or never ran.
    pub run_exit_code: i32,
    /// Run-phase timing and memory statistics.
    pub resource_statistics: ResourceStatistics,
}

impl JobResponse {
    /// A response with every phase populated with the "did not execute"
    /// sentinels: exit code `-1`, empty streams.
    pub fn unexecuted(status: JobStatus, error_string: impl Into<String>) -> Self {
        Self {
            status,
            error_string: error_string.into(),
            setup_stdout: String::new(),
            setup_stderr: String::new(),
            setup_exit_code: UNEXECUTED_EXIT_CODE,
            compile_stdout: String::new(),
            compile_stderr: String::new(),
            compile_exit_code: UNEXECUTED_EXIT_CODE,
            run_stdout: String::new(),
            run_stderr: String::new(),
            run_exit_code: UNEXECUTED_EXIT_CODE,
            resource_statistics: ResourceStatistics::default(),
        }
    }
}

/// Errors that abort a job before any `JobResponse` can be produced:
/// sandbox provisioning failures (create, start, copy-in).
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The sandbox could not be created, started, or populated.
    #[error("sandbox provisioning failed: {0}")]
    Provisioning(#[from] crate::container::DriverError),
    /// The requested source file name is unsafe (absolute or escapes `/workspace`).
    #[error("invalid source file name: {0}")]
    InvalidFileName(String),
    /// The job could not be routed through the worker pool, or the pool
    /// dropped it without producing a result.
    #[error("job dispatch failed: {0}")]
    Dispatch(String),
}

/// Reject a source file name that is absolute or contains a `..`
/// component, so it cannot escape `/workspace` once copied in.
pub fn validate_source_file_name(name: &str) -> Result<(), JobError> {
    let path = std::path::Path::new(name);
    if path.is_absolute() {
        return Err(JobError::InvalidFileName(format!(
            "{name} is an absolute path"
        )));
    }
    for component in path.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return Err(JobError::InvalidFileName(format!(
                "{name} contains a parent-directory component"
            )));
        }
    }
    if name.trim().is_empty() {
        return Err(JobError::InvalidFileName("file name is empty".to_owned()));
    }
    Ok(())
}
