//! Bootstrap monitor properties: monotonic callbacks, single terminal
//! transition, failure on stream end, timeout, and cancellation.

use onionhost::bootstrap::{
    BootstrapMonitor, BootstrapPhase, BootstrapState, WatchOutcome,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

type Calls = Arc<Mutex<Vec<(u8, String)>>>;

fn recorder() -> (Calls, impl FnMut(u8, &str)) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let callback = move |percent: u8, message: &str| {
        sink.lock().unwrap().push((percent, message.to_string()));
    };
    (calls, callback)
}

fn shared_state() -> Arc<Mutex<BootstrapState>> {
    Arc::new(Mutex::new(BootstrapState::default()))
}

async fn feed_lines(lines: &[&str]) -> tokio::io::DuplexStream {
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);
    for line in lines {
        tx.write_all(line.as_bytes()).await.unwrap();
        tx.write_all(b"\n").await.unwrap();
    }
    // Dropping the writer ends the stream
    rx
}

#[tokio::test]
async fn callbacks_are_strictly_increasing() {
    let rx = feed_lines(&[
        "[notice] Bootstrapped 10% (conn): Connecting",
        "[notice] Bootstrapped 5% (conn): Replayed lower value",
        "[notice] Bootstrapped 10% (conn): Duplicate",
        "[notice] Bootstrapped 50% (loading_descriptors): Loading relay descriptors",
        "[notice] Bootstrapped 50% (loading_descriptors): Duplicate again",
        "[notice] Bootstrapped 100% (done): Done",
    ])
    .await;

    let (calls, callback) = recorder();
    let monitor = BootstrapMonitor::new(Duration::from_secs(5));
    let outcome = monitor
        .watch(rx, CancellationToken::new(), shared_state(), callback)
        .await;

    assert_eq!(outcome, WatchOutcome::Live);

    let calls = calls.lock().unwrap();
    let percents: Vec<u8> = calls.iter().map(|(p, _)| *p).collect();
    assert_eq!(percents, vec![10, 50, 100]);
    for pair in percents.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[tokio::test]
async fn repeated_hundred_terminates_once() {
    let rx = feed_lines(&[
        "[notice] Bootstrapped 90% (circuit_create): Establishing circuits",
        "[notice] Bootstrapped 100% (done): Done",
        "[notice] Bootstrapped 100% (done): Done again",
    ])
    .await;

    let (calls, callback) = recorder();
    let monitor = BootstrapMonitor::new(Duration::from_secs(5));
    let outcome = monitor
        .watch(rx, CancellationToken::new(), shared_state(), callback)
        .await;

    assert_eq!(outcome, WatchOutcome::Live);

    let calls = calls.lock().unwrap();
    let hundreds = calls.iter().filter(|(p, _)| *p == 100).count();
    assert_eq!(hundreds, 1);
}

#[tokio::test]
async fn state_tracks_progress() {
    let rx = feed_lines(&[
        "[notice] Bootstrapped 75% (enough_dirinfo): Loaded enough directory info",
        "[notice] Bootstrapped 100% (done): Done",
    ])
    .await;

    let state = shared_state();
    let monitor = BootstrapMonitor::new(Duration::from_secs(5));
    let outcome = monitor
        .watch(rx, CancellationToken::new(), Arc::clone(&state), |_, _| {})
        .await;

    assert_eq!(outcome, WatchOutcome::Live);
    let state = state.lock().unwrap();
    assert_eq!(state.percent, 100);
    assert_eq!(state.phase, BootstrapPhase::Live);
}

#[tokio::test]
async fn stream_end_before_live_is_failure() {
    let rx = feed_lines(&[
        "[notice] Bootstrapped 25% (loading_status): Loading networkstatus consensus",
        "[err] Reading config failed; exiting.",
    ])
    .await;

    let monitor = BootstrapMonitor::new(Duration::from_secs(5));
    let outcome = monitor
        .watch(rx, CancellationToken::new(), shared_state(), |_, _| {})
        .await;

    match outcome {
        WatchOutcome::Failed { last_line } => {
            let line = last_line.expect("last diagnostic line captured");
            assert!(line.contains("exiting"));
        },
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn stalled_stream_times_out() {
    // Keep the writer alive so the stream never ends
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);
    tx.write_all(b"[notice] Bootstrapped 40% (requesting_descriptors): Asking for relay descriptors\n")
        .await
        .unwrap();

    let monitor = BootstrapMonitor::new(Duration::from_millis(300));
    let outcome = monitor
        .watch(rx, CancellationToken::new(), shared_state(), |_, _| {})
        .await;

    assert_eq!(outcome, WatchOutcome::TimedOut { percent: 40 });
    drop(tx);
}

#[tokio::test]
async fn cancellation_returns_immediately() {
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);
    tx.write_all(b"[notice] Bootstrapped 10% (conn): Connecting\n")
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let monitor = BootstrapMonitor::new(Duration::from_secs(30));

    let state = shared_state();
    let watch = {
        let cancel = cancel.clone();
        let state = Arc::clone(&state);
        tokio::spawn(async move { monitor.watch(rx, cancel, state, |_, _| {}).await })
    };

    // Let the first line land, then cancel
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let outcome = watch.await.unwrap();
    assert_eq!(outcome, WatchOutcome::Cancelled);
    assert_eq!(state.lock().unwrap().percent, 10);
    drop(tx);
}
