use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use sluice_core::{
    CapacityGate, ExtendOutcome, HolderId, LeaseRegistry, LeaseToken, ReleaseOutcome, ValveConfig,
    ValveKind, ValveStatus,
};
use sluice_worker::{Regulator, RegulatorConfig, RegulatorError, RegulatorHandle, RegulatorStats};

const WAIT: Duration = Duration::from_secs(2);

fn spawn_regulator(max: usize) -> RegulatorHandle {
    Regulator::spawn(
        ValveKind::Capacity,
        LeaseRegistry::new(),
        ValveConfig::new(max),
        RegulatorConfig::default(),
    )
    .unwrap()
}

/// Poll regulator stats until `predicate` holds or the test times out.
async fn wait_for(
    handle: &RegulatorHandle,
    predicate: impl Fn(&RegulatorStats) -> bool,
) -> RegulatorStats {
    timeout(WAIT, async {
        loop {
            let stats = handle.stats().await.unwrap();
            if predicate(&stats) {
                return stats;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("regulator did not reach expected state")
}

/// Requesters wait while closed and are admitted oldest first.
#[tokio::test]
async fn test_waiters_admitted_in_fifo_order() {
    let handle = spawn_regulator(1);
    let first = handle.ask(HolderId::new()).await.unwrap();
    assert_eq!(handle.status().await.unwrap(), ValveStatus::Closed);

    let (order_tx, mut order_rx) = mpsc::unbounded_channel();
    for (expected_waiting, name) in [(1, "b"), (2, "c")] {
        let h = handle.clone();
        let tx = order_tx.clone();
        tokio::spawn(async move {
            let lease = h.ask(HolderId::new()).await.unwrap();
            tx.send(name).unwrap();
            lease.done().await.unwrap();
        });
        wait_for(&handle, |s| s.waiting == expected_waiting).await;
    }

    assert_eq!(first.done().await.unwrap(), ReleaseOutcome::Released);

    let a = timeout(WAIT, order_rx.recv()).await.unwrap().unwrap();
    let b = timeout(WAIT, order_rx.recv()).await.unwrap().unwrap();
    assert_eq!((a, b), ("b", "c"));

    let stats = wait_for(&handle, |s| s.size == 0).await;
    assert_eq!(stats.status, ValveStatus::Open);
    assert_eq!(stats.waiting, 0);
}

#[tokio::test]
async fn test_dropped_lease_releases_slot() {
    let handle = spawn_regulator(1);
    let lease = handle.ask(HolderId::new()).await.unwrap();
    assert_eq!(handle.size().await.unwrap(), 1);

    drop(lease);

    let stats = wait_for(&handle, |s| s.size == 0).await;
    assert_eq!(stats.status, ValveStatus::Open);
}

/// An aborted holder task counts as a crash and frees capacity.
#[tokio::test]
async fn test_aborted_holder_releases_slot() {
    let handle = spawn_regulator(1);
    let h = handle.clone();
    let (admitted_tx, admitted_rx) = tokio::sync::oneshot::channel();
    let holder = tokio::spawn(async move {
        let _lease = h.ask(HolderId::new()).await.unwrap();
        admitted_tx.send(()).unwrap();
        std::future::pending::<()>().await;
    });

    timeout(WAIT, admitted_rx).await.unwrap().unwrap();
    assert_eq!(handle.status().await.unwrap(), ValveStatus::Closed);

    holder.abort();

    let stats = wait_for(&handle, |s| s.size == 0).await;
    assert_eq!(stats.status, ValveStatus::Open);

    // The slot is usable again.
    let lease = timeout(WAIT, handle.ask(HolderId::new())).await.unwrap().unwrap();
    lease.done().await.unwrap();
}

/// Lowering capacity at runtime drains leases through extend.
#[tokio::test]
async fn test_reconfigure_drains_through_extend() {
    let handle = spawn_regulator(3);
    let mut leases = Vec::new();
    for _ in 0..3 {
        leases.push(handle.ask(HolderId::new()).await.unwrap());
    }
    assert_eq!(handle.status().await.unwrap(), ValveStatus::Closed);

    let status = handle.reconfigure(ValveConfig::new(1usize)).await.unwrap();
    assert_eq!(status, ValveStatus::Closed);

    let mut third = leases.pop().unwrap();
    let mut second = leases.pop().unwrap();
    let mut first = leases.pop().unwrap();

    assert_eq!(first.extend().await.unwrap(), ExtendOutcome::Released);
    assert!(!first.is_active());
    assert_eq!(handle.size().await.unwrap(), 2);

    assert_eq!(second.extend().await.unwrap(), ExtendOutcome::Released);
    assert_eq!(handle.size().await.unwrap(), 1);

    assert_eq!(third.extend().await.unwrap(), ExtendOutcome::Extended);
    assert!(third.is_active());
    assert_eq!(handle.status().await.unwrap(), ValveStatus::Closed);

    // Drained leases dropping later must not disturb the remaining one.
    drop(first);
    drop(second);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.size().await.unwrap(), 1);

    assert_eq!(third.done().await.unwrap(), ReleaseOutcome::Released);
    assert_eq!(handle.status().await.unwrap(), ValveStatus::Open);
}

#[tokio::test]
async fn test_shutdown_hands_over_registry() {
    let handle = spawn_regulator(2);
    let kept = handle.ask(HolderId::new()).await.unwrap();
    let token = kept.token();

    let registry = handle.shutdown().await.unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(&token));

    assert!(matches!(
        handle.stats().await,
        Err(RegulatorError::Stopped)
    ));
    assert!(matches!(kept.done().await, Err(RegulatorError::Stopped)));

    let successor = Regulator::spawn(
        ValveKind::Capacity,
        registry,
        ValveConfig::new(2usize),
        RegulatorConfig::default(),
    )
    .unwrap();
    assert_eq!(successor.size().await.unwrap(), 1);
    assert_eq!(successor.release(token).await.unwrap(), ReleaseOutcome::Released);
    assert_eq!(
        successor.release(token).await.unwrap(),
        ReleaseOutcome::NotFound
    );
}

#[tokio::test]
async fn test_queued_requesters_see_stopped_on_shutdown() {
    let handle = spawn_regulator(0);
    let h = handle.clone();
    let waiter = tokio::spawn(async move { h.ask(HolderId::new()).await });
    wait_for(&handle, |s| s.waiting == 1).await;

    handle.shutdown().await.unwrap();
    let result = timeout(WAIT, waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(RegulatorError::Stopped)));
}

/// A requester that gives up while queued is skipped on dispatch.
#[tokio::test]
async fn test_abandoned_request_is_skipped() {
    let handle = spawn_regulator(1);
    let lease = handle.ask(HolderId::new()).await.unwrap();

    let gave_up = timeout(Duration::from_millis(20), handle.ask(HolderId::new())).await;
    assert!(gave_up.is_err());
    assert_eq!(handle.stats().await.unwrap().waiting, 1);

    lease.done().await.unwrap();
    let stats = wait_for(&handle, |s| s.waiting == 0).await;
    assert_eq!(stats.size, 0);
    assert_eq!(stats.status, ValveStatus::Open);
}

#[tokio::test]
async fn test_capacity_gate_follows_status() {
    let handle = spawn_regulator(1);
    assert!(handle.can_accept_task().await);

    let lease = handle.ask(HolderId::new()).await.unwrap();
    assert!(!handle.can_accept_task().await);

    lease.done().await.unwrap();
    assert!(handle.can_accept_task().await);

    handle.shutdown().await.unwrap();
    assert!(!handle.can_accept_task().await);
}

#[tokio::test]
async fn test_update_signal_and_unknown_tokens() {
    let handle = spawn_regulator(2);
    assert_eq!(handle.update_signal(0.9).await.unwrap(), ValveStatus::Open);
    assert_eq!(
        handle.extend(LeaseToken::new()).await.unwrap(),
        ExtendOutcome::NotFound
    );
    assert_eq!(
        handle.release(LeaseToken::new()).await.unwrap(),
        ReleaseOutcome::NotFound
    );
    assert_eq!(handle.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_stats_serialize_for_reporting() {
    let handle = spawn_regulator(4);
    let stats = handle.stats().await.unwrap();
    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["size"], 0);
    assert_eq!(json["status"], "open");
    assert_eq!(json["waiting"], 0);
}

#[tokio::test]
async fn test_zero_command_buffer_rejected() {
    let result = Regulator::spawn(
        ValveKind::Capacity,
        LeaseRegistry::new(),
        ValveConfig::unbounded(),
        RegulatorConfig { command_buffer: 0 },
    );
    assert!(matches!(
        result,
        Err(RegulatorError::InvalidConfiguration(_))
    ));
}

/// A holder panicking on a blocking thread reports itself down during unwind.
#[tokio::test]
async fn test_panicking_blocking_holder_releases_slot() {
    let handle = spawn_regulator(1);
    let lease = handle.ask(HolderId::new()).await.unwrap();
    assert_eq!(handle.status().await.unwrap(), ValveStatus::Closed);

    let worker = tokio::task::spawn_blocking(move || {
        let _lease = lease;
        panic!("holder failed mid-work");
    });
    assert!(timeout(WAIT, worker).await.unwrap().unwrap_err().is_panic());

    let stats = wait_for(&handle, |s| s.size == 0).await;
    assert_eq!(stats.status, ValveStatus::Open);
}

/// Down notices sent before shutdown are applied, never handed over.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_applies_pending_down_notices() {
    for _ in 0..20 {
        let handle = spawn_regulator(4);
        let mut leases = Vec::new();
        for _ in 0..4 {
            leases.push(handle.ask(HolderId::new()).await.unwrap());
        }
        let kept = leases.pop().unwrap();
        drop(leases);

        let registry = timeout(WAIT, handle.shutdown()).await.unwrap().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&kept.token()));
    }
}
