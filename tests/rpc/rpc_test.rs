//! `JobService` submission round-trip against a real Docker daemon.
//!
//! Ignored by default — run with `cargo test -- --ignored` on a machine
//! with a Docker daemon reachable via the standard environment.

use std::sync::Arc;

use codecrucible::container::SandboxDriver;
use codecrucible::job::{JobExecutor, JobRequest, JobStatus, ResourceLimits};
use codecrucible::rpc::JobService;

const TEST_IMAGE: &str = "bash:5";

fn request(run: &str) -> JobRequest {
    JobRequest {
        source_code: String::new(),
        source_code_file_name: "submission.txt".to_owned(),
        setup_script: "exit 0".to_owned(),
        compile_script: "exit 0".to_owned(),
        run_script: run.to_owned(),
        stdin: Vec::new(),
        environment_variables: Vec::new(),
        resource_limits: ResourceLimits {
            max_execution_time_ms: 5_000,
        },
    }
}

fn service(worker_count: usize) -> JobService {
    let driver = Arc::new(SandboxDriver::connect().expect("docker daemon should be reachable"));
    let executor = JobExecutor::new(driver, TEST_IMAGE, 60_000);
    JobService::new(executor, worker_count)
}

#[tokio::test]
#[ignore = "requires a reachable Docker daemon"]
async fn submit_routes_through_the_pool_and_resolves_the_waiter() {
    let service = service(1);
    let response = service
        .submit(request("echo hi"))
        .await
        .expect("submission should succeed");
    assert_eq!(response.status, JobStatus::Finished);
    assert_eq!(response.run_stdout, "hi\n");
}

#[tokio::test]
#[ignore = "requires a reachable Docker daemon"]
async fn concurrent_submissions_each_get_their_own_result() {
    let service = Arc::new(service(4));

    let mut handles = Vec::new();
    for i in 0..4 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let response = service
                .submit(request(&format!("echo job-{i}")))
                .await
                .expect("submission should succeed");
            (i, response)
        }));
    }

    for handle in handles {
        let (i, response) = handle.await.expect("task should not panic");
        assert_eq!(response.status, JobStatus::Finished);
        assert_eq!(response.run_stdout, format!("job-{i}\n"));
    }
}
