//! `WorkerPool` protocol tests.

use std::time::Duration;

use codecrucible::pool::{Task, WorkerEvent, WorkerPool};

#[tokio::test]
async fn submit_before_start_is_rejected() {
    let pool: WorkerPool<u32, u32> = WorkerPool::new(2);
    let result = pool.submit(Task::new(1, |_worker_id, input| async move { input * 2 })).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn submitted_task_output_appears_on_output_channel() {
    let pool: WorkerPool<u32, u32> = WorkerPool::new(2);
    pool.start();

    let output_rx = pool.output_receiver();
    pool.submit(Task::new(21, |_worker_id, input| async move { input * 2 }))
        .await
        .expect("pool should accept task while running");

    let output = tokio::time::timeout(Duration::from_secs(2), output_rx.recv_async())
        .await
        .expect("should not time out")
        .expect("channel should not be closed");
    assert_eq!(output, 42);
}

#[tokio::test]
async fn task_count_drains_to_zero_after_completion() {
    let pool: WorkerPool<u32, u32> = WorkerPool::new(4);
    pool.start();
    let output_rx = pool.output_receiver();

    for i in 0..8 {
        pool.submit(Task::new(i, |_worker_id, input| async move { input }))
            .await
            .expect("submit should succeed");
    }

    for _ in 0..8 {
        tokio::time::timeout(Duration::from_secs(2), output_rx.recv_async())
            .await
            .expect("should not time out")
            .expect("channel should not be closed");
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.task_count(), 0);
}

#[tokio::test]
async fn all_tasks_done_event_fires_once_queue_drains() {
    let pool: WorkerPool<u32, u32> = WorkerPool::new(1);
    pool.start();
    let output_rx = pool.output_receiver();
    let event_rx = pool.event_receiver();

    pool.submit(Task::new(1, |_worker_id, input| async move { input }))
        .await
        .expect("submit should succeed");
    let _ = tokio::time::timeout(Duration::from_secs(2), output_rx.recv_async())
        .await
        .expect("should not time out");

    let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv_async())
        .await
        .expect("should not time out")
        .expect("event channel should not be closed");
    assert_eq!(event, WorkerEvent::AllTasksDone);
}

#[tokio::test]
async fn submit_blocks_until_an_idle_worker_claims_it() {
    // A single-worker pool with one in-flight long task means a second
    // submit must wait for the rendezvous handoff rather than queuing.
    let pool: WorkerPool<u32, u32> = WorkerPool::new(1);
    pool.start();

    pool.submit(Task::new(1, |_worker_id, input| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        input
    }))
    .await
    .expect("first submit should succeed");

    let second_submit = pool.submit(Task::new(2, |_worker_id, input| async move { input }));
    let result = tokio::time::timeout(Duration::from_millis(50), second_submit).await;
    assert!(result.is_err(), "second submit should still be blocked on the rendezvous handoff");
}
