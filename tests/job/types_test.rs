//! `validate_source_file_name` and `JobResponse` construction tests.

use codecrucible::job::{validate_source_file_name, JobResponse, JobStatus};

#[test]
fn plain_relative_name_is_valid() {
    assert!(validate_source_file_name("main.rs").is_ok());
}

#[test]
fn nested_relative_name_is_valid() {
    assert!(validate_source_file_name("src/main.rs").is_ok());
}

#[test]
fn absolute_path_is_rejected() {
    assert!(validate_source_file_name("/etc/passwd").is_err());
}

#[test]
fn parent_dir_traversal_is_rejected() {
    assert!(validate_source_file_name("../../etc/passwd").is_err());
}

#[test]
fn parent_dir_traversal_mid_path_is_rejected() {
    assert!(validate_source_file_name("project/../../escape").is_err());
}

#[test]
fn empty_name_is_rejected() {
    assert!(validate_source_file_name("").is_err());
    assert!(validate_source_file_name("   ").is_err());
}

#[test]
fn unexecuted_response_uses_sentinel_exit_codes() {
    let response = JobResponse::unexecuted(JobStatus::InternalError, "setup script exited with non-zero code");
    assert_eq!(response.status, JobStatus::InternalError);
    assert_eq!(response.setup_exit_code, -1);
    assert_eq!(response.compile_exit_code, -1);
    assert_eq!(response.run_exit_code, -1);
    assert_eq!(response.resource_statistics.max_memory_used, -1);
}

#[test]
fn job_status_serializes_to_exact_spec_strings() {
    assert_eq!(
        serde_json::to_string(&JobStatus::Finished).expect("serialize"),
        "\"Finished\""
    );
    assert_eq!(
        serde_json::to_string(&JobStatus::CompileError).expect("serialize"),
        "\"Compile Error\""
    );
    assert_eq!(
        serde_json::to_string(&JobStatus::InternalError).expect("serialize"),
        "\"Internal Error\""
    );
    assert_eq!(
        serde_json::to_string(&JobStatus::Aborted).expect("serialize"),
        "\"Aborted\""
    );
}
