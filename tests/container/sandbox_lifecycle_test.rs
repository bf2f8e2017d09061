//! End-to-end sandbox lifecycle tests against a real Docker daemon.
//!
//! Ignored by default — run with `cargo test -- --ignored` on a machine
//! with a Docker daemon reachable via the standard environment.

use codecrucible::container::SandboxDriver;

#[tokio::test]
#[ignore = "requires a reachable Docker daemon"]
async fn create_start_exec_stop_remove_round_trip() {
    let driver = SandboxDriver::connect().expect("docker daemon should be reachable");

    let handle = driver
        .create("busybox:latest", &[], None)
        .await
        .expect("container should be created");

    driver.start(&handle).await.expect("container should start");

    driver
        .copy_text(&handle, "/workspace", "run.sh", b"echo hi\n", 0o755)
        .await
        .expect("file should copy in");

    let result = driver
        .exec_sync(&handle, "/workspace/run.sh")
        .await
        .expect("script should run");
    assert_eq!(result.exit_code, 0);
    assert_eq!(String::from_utf8_lossy(&result.stdout).trim(), "hi");

    driver.stop(&handle).await.expect("stop should succeed");
    driver.remove(&handle).await.expect("remove should succeed");
}

#[tokio::test]
#[ignore = "requires a reachable Docker daemon"]
async fn stop_and_remove_are_idempotent() {
    let driver = SandboxDriver::connect().expect("docker daemon should be reachable");
    let handle = driver
        .create("busybox:latest", &[], None)
        .await
        .expect("container should be created");

    driver.stop(&handle).await.expect("first stop tolerates not-running");
    driver.stop(&handle).await.expect("second stop tolerates already-stopped");
    driver.remove(&handle).await.expect("first remove succeeds");
    driver.remove(&handle).await.expect("second remove tolerates already-gone");
}
