#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ray_core::{ReconcileError, UnitOfWork};
use ray_queue::{RetryPolicy, RetryQueue};
use tokio::sync::mpsc;

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log { Arc::new(Mutex::new(Vec::new())) }

/// Unit that records its label and then succeeds.
fn ok_unit(label: &str, log: &Log) -> UnitOfWork {
    let label = label.to_string();
    let log = Arc::clone(log);
    UnitOfWork::new(label.clone(), move || {
        log.lock().unwrap().push(label.clone());
        async { Ok(()) }
    })
}

/// Unit that records its label and always fails.
fn failing_unit(label: &str, log: &Log) -> UnitOfWork {
    let label = label.to_string();
    let log = Arc::clone(log);
    UnitOfWork::new(label.clone(), move || {
        log.lock().unwrap().push(label.clone());
        async { Err(ReconcileError::failed("nope")) }
    })
}

/// Unit that signals `done` once it has run.
fn marker(done: mpsc::UnboundedSender<()>) -> UnitOfWork {
    UnitOfWork::new("marker", move || {
        let done = done.clone();
        async move {
            let _ = done.send(());
            Ok(())
        }
    })
}

async fn wait(rx: &mut mpsc::UnboundedReceiver<()>) {
    tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.expect("queue did not finish").expect("marker dropped");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runs_units_in_submission_order() {
    let q = RetryQueue::new("order", 64);
    let l = log();
    for i in 0..20 {
        q.submit(ok_unit(&format!("e{i}"), &l), RetryPolicy::never()).await.unwrap();
    }
    let (tx, mut rx) = mpsc::unbounded_channel();
    q.submit(marker(tx), RetryPolicy::never()).await.unwrap();
    wait(&mut rx).await;
    let expected: Vec<String> = (0..20).map(|i| format!("e{i}")).collect();
    assert_eq!(*l.lock().unwrap(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retries_until_policy_returns_false() {
    let q = RetryQueue::new("retry", 8);
    let l = log();
    let k = 4u32;
    q.submit(failing_unit("bad", &l), RetryPolicy::from_fn(move |n| n < k)).await.unwrap();
    q.submit(ok_unit("next", &l), RetryPolicy::never()).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    q.submit(marker(tx), RetryPolicy::never()).await.unwrap();
    wait(&mut rx).await;
    assert_eq!(*l.lock().unwrap(), vec!["bad", "bad", "bad", "bad", "next"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn never_retry_moves_on_after_one_attempt() {
    let q = RetryQueue::new("once", 8);
    let l = log();
    q.submit(failing_unit("bad", &l), RetryPolicy::never()).await.unwrap();
    q.submit(ok_unit("good", &l), RetryPolicy::never()).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    q.submit(marker(tx), RetryPolicy::never()).await.unwrap();
    wait(&mut rx).await;
    assert_eq!(*l.lock().unwrap(), vec!["bad", "good"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flaky_unit_succeeds_within_limit() {
    let q = RetryQueue::new("flaky", 8);
    let calls = Arc::new(AtomicU32::new(0));
    let c = Arc::clone(&calls);
    let work = UnitOfWork::new("flaky", move || {
        let n = c.fetch_add(1, Ordering::SeqCst) + 1;
        async move { if n < 3 { Err(ReconcileError::failed("transient")) } else { Ok(()) } }
    });
    q.submit(work, RetryPolicy::limit(5).with_backoff(Duration::from_millis(1), Duration::from_millis(4))).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    q.submit(marker(tx), RetryPolicy::never()).await.unwrap();
    wait(&mut rx).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Policy that behaves like `limit(max)` and counts how often it is asked.
fn counting_policy(max: u32, asked: &Arc<AtomicU32>) -> RetryPolicy {
    let asked = Arc::clone(asked);
    RetryPolicy::from_fn(move |attempt| {
        asked.fetch_add(1, Ordering::SeqCst);
        attempt < max
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn policy_is_consulted_only_after_failures() {
    let q = RetryQueue::new("asked", 8);
    let l = log();

    let first_try = Arc::new(AtomicU32::new(0));
    q.submit(ok_unit("ok", &l), counting_policy(5, &first_try)).await.unwrap();

    let flaky = Arc::new(AtomicU32::new(0));
    let runs = Arc::new(AtomicU32::new(0));
    let r = Arc::clone(&runs);
    let work = UnitOfWork::new("flaky", move || {
        let n = r.fetch_add(1, Ordering::SeqCst) + 1;
        async move { if n <= 2 { Err(ReconcileError::failed("transient")) } else { Ok(()) } }
    });
    q.submit(work, counting_policy(5, &flaky)).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    q.submit(marker(tx), RetryPolicy::never()).await.unwrap();
    wait(&mut rx).await;
    assert_eq!(first_try.load(Ordering::SeqCst), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(flaky.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_exits_without_draining_backlog() {
    let q = RetryQueue::new("stop", 16);
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate_rx)));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let blocker = UnitOfWork::new("blocker", move || {
        let gate = gate.lock().unwrap().take();
        let started = started_tx.clone();
        async move {
            let _ = started.send(());
            if let Some(g) = gate {
                let _ = g.await;
            }
            Err(ReconcileError::failed("keep retrying"))
        }
    });
    let l = log();
    q.submit(blocker, RetryPolicy::from_fn(|_| true)).await.unwrap();
    q.submit(ok_unit("never-runs", &l), RetryPolicy::never()).await.unwrap();
    wait(&mut started_rx).await;

    // The running attempt is not interrupted; the stop is seen before the retry.
    q.stop();
    let _ = gate_tx.send(());
    tokio::time::timeout(Duration::from_secs(2), q.stopped()).await.expect("worker did not exit");
    assert!(l.lock().unwrap().is_empty());
    assert!(q.submit(ok_unit("late", &l), RetryPolicy::never()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_interrupts_backoff_sleep() {
    let q = RetryQueue::new("sleepy", 4);
    let l = log();
    let policy = RetryPolicy::from_fn(|_| true).with_backoff(Duration::from_secs(30), Duration::from_secs(30));
    q.submit(failing_unit("bad", &l), policy).await.unwrap();
    while l.lock().unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    q.stop();
    tokio::time::timeout(Duration::from_secs(2), q.stopped()).await.expect("backoff sleep not interrupted");
    assert_eq!(l.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_backlog_blocks_submitter() {
    let q = Arc::new(RetryQueue::new("bp", 1));
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate_rx)));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let blocker = UnitOfWork::new("blocker", move || {
        let gate = gate.lock().unwrap().take();
        let started = started_tx.clone();
        async move {
            let _ = started.send(());
            if let Some(g) = gate {
                let _ = g.await;
            }
            Ok(())
        }
    });
    let l = log();
    q.submit(blocker, RetryPolicy::never()).await.unwrap();
    wait(&mut started_rx).await;
    // Worker is busy: one unit fits in the backlog, the next must wait.
    q.submit(ok_unit("a", &l), RetryPolicy::never()).await.unwrap();
    assert_eq!(q.backlog(), 1);
    let blocked = tokio::time::timeout(Duration::from_millis(50), q.submit(ok_unit("b", &l), RetryPolicy::never())).await;
    assert!(blocked.is_err(), "submit should wait while backlog is full");

    let _ = gate_tx.send(());
    q.submit(ok_unit("c", &l), RetryPolicy::never()).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    q.submit(marker(tx), RetryPolicy::never()).await.unwrap();
    wait(&mut rx).await;
    assert_eq!(*l.lock().unwrap(), vec!["a", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queues_do_not_block_each_other() {
    let stuck = RetryQueue::new("kind-a", 4);
    let healthy = RetryQueue::new("kind-b", 4);
    let l = log();
    stuck.submit(failing_unit("a", &l), RetryPolicy::from_fn(|_| true).with_backoff(Duration::from_millis(5), Duration::from_millis(5))).await.unwrap();
    while l.lock().unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    for i in 0..3 {
        healthy.submit(ok_unit(&format!("b{i}"), &l), RetryPolicy::never()).await.unwrap();
    }
    let (tx, mut rx) = mpsc::unbounded_channel();
    healthy.submit(marker(tx), RetryPolicy::never()).await.unwrap();
    wait(&mut rx).await;
    let seen = l.lock().unwrap().clone();
    assert!(seen.iter().any(|s| s == "a"));
    assert_eq!(seen.iter().filter(|s| s.starts_with('b')).count(), 3);
    stuck.stop();
}
