use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use spark_sync::{AsyncCountdownEvent, AsyncEvent, AsyncSemaphore, TaskQueue};
use tokio::runtime::Runtime;

/// Benchmark: uncontended `wait()`/`signal()` round trips on a semaphore
/// preloaded with one permit, i.e. the fast path that never touches the
/// waiter registry.
fn bench_semaphore_uncontended_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("build tokio runtime");
    c.bench_function("semaphore_uncontended_round_trip", |b| {
        b.iter(|| {
            rt.block_on(async {
                let sem = AsyncSemaphore::new(1);
                sem.wait().await.unwrap();
                sem.signal();
                criterion::black_box(&sem);
            });
        });
    });
}

/// Benchmark: `AsyncEvent::signal()` waking a batch of suspended waiters,
/// exercising the FIFO drain path rather than the already-signalled fast
/// path.
fn bench_event_wakes_waiters(c: &mut Criterion) {
    let rt = Runtime::new().expect("build tokio runtime");
    c.bench_function("event_wakes_100_waiters", |b| {
        b.iter(|| {
            rt.block_on(async {
                let event = Arc::new(AsyncEvent::new(false));
                let mut handles = Vec::with_capacity(100);
                for _ in 0..100 {
                    let event = event.clone();
                    handles.push(tokio::spawn(async move { event.wait().await }));
                }
                tokio::task::yield_now().await;
                event.signal();
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }
            });
        });
    });
}

/// Benchmark: a countdown event's admission drain under a `signal_repeat`
/// large enough to admit every queued waiter in one call.
fn bench_countdown_admission_drain(c: &mut Criterion) {
    let rt = Runtime::new().expect("build tokio runtime");
    c.bench_function("countdown_admission_drain_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                let countdown = Arc::new(AsyncCountdownEvent::new(0, 0));
                countdown.increment(50);
                let mut handles = Vec::with_capacity(50);
                for _ in 0..50 {
                    let countdown = countdown.clone();
                    handles.push(tokio::spawn(async move { countdown.wait().await }));
                }
                tokio::task::yield_now().await;
                countdown.signal_repeat(50);
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }
            });
        });
    });
}

/// Benchmark: a `TaskQueue`'s fast path for non-barrier submissions
/// against an idle queue, the common case in a serialization layer that
/// rarely contends.
fn bench_task_queue_fast_path(c: &mut Criterion) {
    let rt = Runtime::new().expect("build tokio runtime");
    c.bench_function("task_queue_non_barrier_fast_path", |b| {
        b.iter(|| {
            rt.block_on(async {
                let queue = TaskQueue::new(spark_sync::TaskPriority::Normal);
                queue.exec(false, async { Ok::<_, spark_sync::BoxError>(()) }).await.unwrap();
            });
        });
    });
}

criterion_group!(
    primitive_benches,
    bench_semaphore_uncontended_round_trip,
    bench_event_wakes_waiters,
    bench_countdown_admission_drain,
    bench_task_queue_fast_path,
);
criterion_main!(primitive_benches);
