//! Job request/response schema and the per-job execution pipeline.

pub mod executor;
pub mod types;

pub use executor::JobExecutor;
pub use types::{
    validate_source_file_name, JobError, JobRequest, JobResponse, JobStatus, ResourceLimits,
    ResourceStatistics,
};
