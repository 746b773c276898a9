//! Integration tests for the six concrete scenarios spec §8 pins down
//! with literal expected outcomes. Timing assertions use
//! `#[tokio::test(start_paused = true)]` plus `tokio::time::advance` so
//! they're deterministic instead of racing a wall clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use spark_sync::runtime::TokioRuntime;
use spark_sync::{AsyncCountdownEvent, AsyncSemaphore, BoxError, CancellationSource, Promise, TaskPriority, TaskQueue};

/// Scenario 1 — a semaphore with `value = 3`; five tasks each wait, hold
/// the permit for 5s, then signal. Exactly three are admitted before any
/// has exited; total elapsed ≈ 10s.
#[tokio::test(start_paused = true)]
async fn semaphore_parallelism() {
    let sem = Arc::new(AsyncSemaphore::new(3));
    let concurrent = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let sem = sem.clone();
        let concurrent = concurrent.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            sem.wait().await.unwrap();
            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            concurrent.fetch_sub(1, Ordering::SeqCst);
            sem.signal();
        }));
    }

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(peak.load(Ordering::SeqCst), 3, "exactly three tasks admitted up front");

    tokio::time::advance(Duration::from_secs(10)).await;
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(concurrent.load(Ordering::SeqCst), 0);
}

/// Scenario 2 — same shape, but each wait is bounded by a 3s timeout. The
/// first three acquire immediately; the remaining two time out at ≈3s.
#[tokio::test(start_paused = true)]
async fn semaphore_timeout() {
    let sem = Arc::new(AsyncSemaphore::new(3));

    let mut acquired = 0;
    let mut timed_out = 0;
    let mut handles = Vec::new();
    for _ in 0..5 {
        let sem = sem.clone();
        handles.push(tokio::spawn(async move {
            sem.wait_timeout(Duration::from_secs(3), &TokioRuntime).await
        }));
    }

    tokio::time::advance(Duration::from_secs(3)).await;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => acquired += 1,
            Err(e) => {
                assert!(e.is_timed_out());
                timed_out += 1;
            }
        }
    }
    assert_eq!(acquired, 3);
    assert_eq!(timed_out, 2);
}

/// Scenario 3 — `until = 0, initial = 0`; `increment(10)`; a concurrent
/// writer signals ten times at 0.5s intervals while `wait()` races it.
/// `wait()` returns once the tenth signal lands, at t ≈ 5.0s.
#[tokio::test(start_paused = true)]
async fn countdown_reset_drains_at_final_signal() {
    let countdown = Arc::new(AsyncCountdownEvent::new(0, 0));
    countdown.increment(10);

    let writer = {
        let countdown = countdown.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                tokio::time::sleep(Duration::from_millis(500)).await;
                countdown.signal();
            }
        })
    };

    let start = tokio::time::Instant::now();
    countdown.wait().await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_millis(5000));
    writer.await.unwrap();
}

/// Same shape, but a concurrent `reset()` at t = 3s drops `currentCount`
/// straight back to `initialCount` (0), so `wait()` resolves at t ≈ 3s
/// instead of riding out all ten signals.
#[tokio::test(start_paused = true)]
async fn countdown_concurrent_reset_admits_early() {
    let countdown = Arc::new(AsyncCountdownEvent::new(0, 0));
    countdown.increment(10);

    let writer = {
        let countdown = countdown.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                tokio::time::sleep(Duration::from_millis(500)).await;
                countdown.signal();
            }
        })
    };
    let resetter = {
        let countdown = countdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            countdown.reset();
        })
    };

    let start = tokio::time::Instant::now();
    countdown.wait().await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_millis(3000));

    resetter.await.unwrap();
    writer.await.unwrap();
}

/// Scenario 4 — a parent source `p`, a child `c = linked([p])`, a task `T`
/// registered on `c`. Cancelling `p` propagates to `c`: `T` observes
/// cancellation, `c.is_cancelled()` becomes true, `c.wait()` returns.
#[tokio::test]
async fn cancellation_propagates_through_linked_source() {
    let parent = CancellationSource::new();
    let child = CancellationSource::linked(&[parent.clone()]);

    let task_cancelled = Arc::new(std::sync::atomic::AtomicBool::new(false));
    struct Probe(Arc<std::sync::atomic::AtomicBool>);
    #[async_trait::async_trait]
    impl spark_sync::Cancellable for Probe {
        fn cancel(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
        async fn wait(&self) {}
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }
    child.register(Arc::new(Probe(task_cancelled.clone())));

    parent.cancel();

    child.wait().await.unwrap();
    assert!(child.is_cancelled());
    assert!(task_cancelled.load(Ordering::SeqCst));
}

/// Scenario 5 — a `TaskQueue` Q; submit 3 non-barrier tasks N1-N3
/// (~100ms each), then a barrier B (~100ms), then N4, N5 (~100ms each).
/// N1-N3 run in parallel (phase boundary ≈100ms), then B runs alone
/// (≈200ms), then N4, N5 run in parallel (≈300ms). Total elapsed ≈300ms.
#[tokio::test(start_paused = true)]
async fn barrier_queue_ordering() {
    let queue = Arc::new(TaskQueue::new(TaskPriority::Normal));
    let log: Arc<parking_lot::Mutex<Vec<(&'static str, Duration)>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let start = tokio::time::Instant::now();

    fn logged(
        log: Arc<parking_lot::Mutex<Vec<(&'static str, Duration)>>>,
        start: tokio::time::Instant,
        label: &'static str,
    ) -> impl std::future::Future<Output = Result<(), BoxError>> {
        async move {
            log.lock().push((label, start.elapsed()));
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }

    // Built (and thus admitted-or-queued) in this exact order, synchronously
    // and before any of them is polled — matching "submit N1, N2, N3, then
    // B, then N4, N5".
    let n1 = queue.exec(false, logged(log.clone(), start, "n1"));
    let n2 = queue.exec(false, logged(log.clone(), start, "n2"));
    let n3 = queue.exec(false, logged(log.clone(), start, "n3"));
    let b = queue.exec(true, logged(log.clone(), start, "b"));
    let n4 = queue.exec(false, logged(log.clone(), start, "n4"));
    let n5 = queue.exec(false, logged(log.clone(), start, "n5"));

    let handles = vec![
        tokio::spawn(n1),
        tokio::spawn(n2),
        tokio::spawn(n3),
        tokio::spawn(b),
        tokio::spawn(n4),
        tokio::spawn(n5),
    ];

    tokio::time::advance(Duration::from_millis(300)).await;
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let log = log.lock();
    let at = |label: &str| log.iter().find(|entry| entry.0 == label).unwrap().1;
    assert_eq!(at("n1"), Duration::ZERO);
    assert_eq!(at("n2"), Duration::ZERO);
    assert_eq!(at("n3"), Duration::ZERO);
    assert_eq!(at("b"), Duration::from_millis(100), "barrier must wait for N1-N3 to finish");
    assert_eq!(at("n4"), Duration::from_millis(200), "N4 must wait for the barrier to finish");
    assert_eq!(at("n5"), Duration::from_millis(200), "N5 must wait for the barrier to finish");
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

/// Scenario 6 — `Promise::all` preserves input order, not completion
/// order; `race` resolves with whichever input settles first.
#[tokio::test(start_paused = true)]
async fn promise_all_preserves_order_race_takes_fastest() {
    let f1: Arc<Promise<u32, ()>> = Promise::new();
    let f2: Arc<Promise<u32, ()>> = Promise::new();
    let f3: Arc<Promise<u32, ()>> = Promise::new();

    {
        let (f1, f2, f3) = (f1.clone(), f2.clone(), f3.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            f1.fulfill(1);
        });
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            f2.fulfill(2);
        });
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            f3.fulfill(3);
        });
    }

    let all = spark_sync::all(vec![f1.clone(), f2.clone(), f3.clone()], &TokioRuntime);
    let start = tokio::time::Instant::now();
    let outputs = all.get().await.unwrap();
    assert_eq!(outputs, vec![1, 2, 3], "all preserves input order, not completion order");
    assert_eq!(start.elapsed(), Duration::from_millis(30));

    let g1: Arc<Promise<u32, ()>> = Promise::new();
    let g2: Arc<Promise<u32, ()>> = Promise::new();
    let g3: Arc<Promise<u32, ()>> = Promise::new();
    {
        let (g1, g2, g3) = (g1.clone(), g2.clone(), g3.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            g1.fulfill(1);
        });
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            g2.fulfill(2);
        });
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            g3.fulfill(3);
        });
    }
    let race = spark_sync::race(vec![g1, g2, g3], &TokioRuntime);
    let start = tokio::time::Instant::now();
    let winner = race.get().await.unwrap();
    assert_eq!(winner, 3);
    assert_eq!(start.elapsed(), Duration::from_millis(10));
}
