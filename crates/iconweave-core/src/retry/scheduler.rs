//! RetryScheduler - 失敗した操作をバッチで再試行
//!
//! # 設計原則
//! - ドレインタスクは同時に高々 1 つだけ（`draining` フラグで保証）
//! - 1 tick で `batch_size` 件まで順番に再試行
//! - オフライン時はキュー全体を即座に reject（試行回数は消費しない）
//! - Permanent / Validation エラーは再試行せずに即 reject
//! - `max_retries` を超えたら最後の失敗を `RetryExhausted` で包んで返す

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::policy::RetryPolicy;
use super::state::RetryState;
use crate::domain::FetchError;
use crate::ports::NetworkMonitor;

/// Re-runnable operation. Each call starts a fresh attempt.
pub type RetryOp<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;

/// What to retry, plus a label for logs and snapshots.
pub struct RetryDescriptor<T> {
    label: String,
    op: RetryOp<T>,
}

impl<T> RetryDescriptor<T> {
    pub fn new<F>(label: impl Into<String>, op: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            op: Arc::new(op),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> Clone for RetryDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            op: Arc::clone(&self.op),
        }
    }
}

impl<T> std::fmt::Debug for RetryDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryDescriptor")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

struct RetryItem<T> {
    descriptor: RetryDescriptor<T>,
    attempt: u32,
    state: RetryState,
    reply: oneshot::Sender<Result<T, FetchError>>,
}

impl<T> RetryItem<T> {
    fn settle(mut self, result: Result<T, FetchError>) {
        self.state = RetryState::Settled;
        // caller may have dropped its future
        let _ = self.reply.send(result);
    }
}

/// Queue entry as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRetry {
    pub label: String,
    pub attempt: u32,
    pub state: RetryState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounts {
    /// Items accepted into the queue.
    pub scheduled: u64,
    /// Re-attempts actually run.
    pub attempted: u64,
    pub succeeded: u64,
    /// Rejected after hitting the ceiling.
    pub exhausted: u64,
    /// Rejected by an offline drain.
    pub offline_drops: u64,
}

struct Shared<T> {
    queue: VecDeque<RetryItem<T>>,
    draining: bool,
    counts: RetryCounts,
}

struct Inner<T> {
    policy: RetryPolicy,
    network: Arc<dyn NetworkMonitor>,
    shared: Mutex<Shared<T>>,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Batched, delayed re-attempt queue.
pub struct RetryScheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RetryScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> RetryScheduler<T> {
    pub fn new(policy: RetryPolicy, network: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                network,
                shared: Mutex::new(Shared {
                    queue: VecDeque::new(),
                    draining: false,
                    counts: RetryCounts::default(),
                }),
            }),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Queue `descriptor` after it failed with `error`.
    ///
    /// `attempt` is the 1-indexed retry about to be made. The returned
    /// future settles once the item succeeds, hits a permanent error,
    /// runs out of retries, or is dropped by an offline drain.
    ///
    /// Must be called inside a tokio runtime; the drain runs on a spawned task.
    pub fn enqueue(
        &self,
        descriptor: RetryDescriptor<T>,
        attempt: u32,
        error: FetchError,
    ) -> BoxFuture<'static, Result<T, FetchError>> {
        if !error.kind().is_retryable() {
            tracing::debug!(label = %descriptor.label, error = %error, "not retrying non-transient failure");
            return Box::pin(async move { Err(error) });
        }
        let attempt = attempt.max(1);
        if !self.inner.policy.allows(attempt) {
            return Box::pin(async move {
                Err(FetchError::RetryExhausted {
                    attempts: attempt - 1,
                    source: Box::new(error),
                })
            });
        }

        let (tx, rx) = oneshot::channel();
        let spawn_drain = {
            let mut shared = self.inner.lock();
            tracing::debug!(label = %descriptor.label, attempt, "retry queued");
            shared.queue.push_back(RetryItem {
                descriptor,
                attempt,
                state: RetryState::Queued,
                reply: tx,
            });
            shared.counts.scheduled += 1;
            !std::mem::replace(&mut shared.draining, true)
        };
        if spawn_drain {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }

        Box::pin(async move { rx.await.unwrap_or(Err(error)) })
    }

    /// Waiting items, front first.
    pub fn snapshot(&self) -> Vec<QueuedRetry> {
        self.inner
            .lock()
            .queue
            .iter()
            .map(|item| QueuedRetry {
                label: item.descriptor.label.clone(),
                attempt: item.attempt,
                state: item.state,
            })
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }

    pub fn counts(&self) -> RetryCounts {
        self.inner.lock().counts
    }
}

async fn drain<T: Send + 'static>(inner: Arc<Inner<T>>) {
    loop {
        let delay = {
            let mut shared = inner.lock();
            let Some(front) = shared.queue.front() else {
                shared.draining = false;
                return;
            };
            let attempt = front.attempt;
            for item in shared.queue.iter_mut() {
                item.state = RetryState::Scheduled;
            }
            inner
                .policy
                .delay_with_quality(attempt, inner.network.quality())
        };

        tokio::time::sleep(delay).await;

        if !inner.network.is_online() {
            let dropped: Vec<_> = {
                let mut shared = inner.lock();
                let dropped: Vec<_> = shared.queue.drain(..).collect();
                shared.counts.offline_drops += dropped.len() as u64;
                dropped
            };
            tracing::info!(count = dropped.len(), "offline, dropping retry queue");
            for item in dropped {
                item.settle(Err(FetchError::Offline));
            }
            continue;
        }

        let batch: Vec<_> = {
            let mut shared = inner.lock();
            let take = inner.policy.batch_size.min(shared.queue.len());
            shared.queue.drain(..take).collect()
        };

        for mut item in batch {
            item.state = RetryState::Attempted;
            let result = (item.descriptor.op)().await;
            inner.lock().counts.attempted += 1;
            match result {
                Ok(value) => {
                    tracing::debug!(label = %item.descriptor.label, attempt = item.attempt, "retry succeeded");
                    inner.lock().counts.succeeded += 1;
                    item.settle(Ok(value));
                }
                Err(e) if !e.kind().is_retryable() => {
                    tracing::debug!(label = %item.descriptor.label, error = %e, "retry hit non-transient failure");
                    item.settle(Err(e));
                }
                Err(e) if !inner.policy.allows(item.attempt + 1) => {
                    tracing::warn!(
                        label = %item.descriptor.label,
                        attempts = item.attempt,
                        error = %e,
                        "retries exhausted"
                    );
                    inner.lock().counts.exhausted += 1;
                    let attempts = item.attempt;
                    item.settle(Err(FetchError::RetryExhausted {
                        attempts,
                        source: Box::new(e),
                    }));
                }
                Err(e) => {
                    tracing::debug!(label = %item.descriptor.label, attempt = item.attempt, error = %e, "retry failed, requeueing");
                    item.attempt += 1;
                    item.state = RetryState::Requeued;
                    inner.lock().queue.push_back(item);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::impls::StaticNetwork;
    use crate::ports::NetworkQuality;

    fn counting(
        label: &str,
        calls: Arc<AtomicU32>,
        outcome: impl Fn(u32) -> Result<u32, FetchError> + Send + Sync + 'static,
    ) -> RetryDescriptor<u32> {
        let outcome = Arc::new(outcome);
        RetryDescriptor::new(label, move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let outcome = Arc::clone(&outcome);
            Box::pin(async move { outcome(n) })
        })
    }

    fn scheduler(network: Arc<StaticNetwork>) -> RetryScheduler<u32> {
        RetryScheduler::new(RetryPolicy::default(), network)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_second_attempt() {
        let network = Arc::new(StaticNetwork::online());
        let sched = scheduler(network);
        let calls = Arc::new(AtomicU32::new(0));
        let desc = counting("a", Arc::clone(&calls), |n| {
            if n >= 2 { Ok(7) } else { Err(FetchError::Timeout) }
        });

        let result = sched.enqueue(desc, 1, FetchError::Timeout).await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let counts = sched.counts();
        assert_eq!(counts.scheduled, 1);
        assert_eq!(counts.attempted, 2);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(sched.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_runs_at_most_max_retries() {
        let network = Arc::new(StaticNetwork::online());
        let sched = scheduler(network);
        let calls = Arc::new(AtomicU32::new(0));
        let desc = counting("a", Arc::clone(&calls), |_| {
            Err(FetchError::connection("reset"))
        });

        let result = sched.enqueue(desc, 1, FetchError::Timeout).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(matches!(err, FetchError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(err.root(), &FetchError::connection("reset"));
        assert!(err.is_terminal());
        assert_eq!(sched.counts().exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried_again() {
        let network = Arc::new(StaticNetwork::online());
        let sched = scheduler(network);
        let calls = Arc::new(AtomicU32::new(0));
        let desc = counting("a", Arc::clone(&calls), |_| {
            Err(FetchError::status(404, "http://x/a.svg"))
        });

        let result = sched.enqueue(desc, 1, FetchError::Timeout).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result, Err(FetchError::status(404, "http://x/a.svg")));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_rejected_without_queueing() {
        let network = Arc::new(StaticNetwork::online());
        let sched = scheduler(network);
        let calls = Arc::new(AtomicU32::new(0));
        let desc = counting("a", Arc::clone(&calls), |_| Ok(1));

        let err = FetchError::validation("empty");
        let result = sched.enqueue(desc, 1, err.clone()).await;

        assert_eq!(result, Err(err));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sched.counts().scheduled, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_past_ceiling_is_rejected_immediately() {
        let network = Arc::new(StaticNetwork::online());
        let sched = scheduler(network);
        let calls = Arc::new(AtomicU32::new(0));
        let desc = counting("a", Arc::clone(&calls), |_| Ok(1));

        let result = sched.enqueue(desc, 4, FetchError::Timeout).await;

        assert!(matches!(result, Err(FetchError::RetryExhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_drain_rejects_everything_without_attempting() {
        let network = Arc::new(StaticNetwork::offline());
        let sched = scheduler(network);
        let calls = Arc::new(AtomicU32::new(0));

        let a = sched.enqueue(counting("a", Arc::clone(&calls), |_| Ok(1)), 1, FetchError::Timeout);
        let b = sched.enqueue(counting("b", Arc::clone(&calls), |_| Ok(2)), 1, FetchError::Timeout);

        let (a, b) = tokio::join!(a, b);
        assert_eq!(a, Err(FetchError::Offline));
        assert_eq!(b, Err(FetchError::Offline));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sched.counts().offline_drops, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_drain_processes_batches_in_order() {
        let network = Arc::new(StaticNetwork::online());
        let sched = scheduler(network);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut futures = Vec::new();
        for i in 0..5u32 {
            let order = Arc::clone(&order);
            let desc = RetryDescriptor::new(format!("item-{i}"), move || {
                order.lock().unwrap().push(i);
                Box::pin(async move { Ok(i) })
            });
            futures.push(sched.enqueue(desc, 1, FetchError::Timeout));
        }
        assert!(sched.is_draining());
        assert_eq!(sched.pending(), 5);

        let results = futures::future::join_all(futures).await;

        assert_eq!(results, vec![Ok(0), Ok(1), Ok(2), Ok(3), Ok(4)]);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(!sched.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_waits_for_backoff_delay() {
        let network = Arc::new(StaticNetwork::online());
        let sched = scheduler(network);
        let calls = Arc::new(AtomicU32::new(0));
        let fut = sched.enqueue(
            counting("a", Arc::clone(&calls), |_| Ok(1)),
            2,
            FetchError::Timeout,
        );
        let handle = tokio::spawn(fut);

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.await.unwrap(), Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_link_lengthens_delay() {
        let network = Arc::new(StaticNetwork::online());
        network.set_quality(Some(NetworkQuality::TwoG));
        let sched = scheduler(Arc::clone(&network));
        let calls = Arc::new(AtomicU32::new(0));
        let handle = tokio::spawn(sched.enqueue(
            counting("a", Arc::clone(&calls), |_| Ok(1)),
            1,
            FetchError::Timeout,
        ));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(handle.await.unwrap(), Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_state() {
        let network = Arc::new(StaticNetwork::online());
        let sched = scheduler(network);
        let calls = Arc::new(AtomicU32::new(0));
        let _fut = sched.enqueue(
            counting("icon", Arc::clone(&calls), |_| Ok(1)),
            1,
            FetchError::Timeout,
        );

        let snap = sched.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].label, "icon");
        assert_eq!(snap[0].attempt, 1);
        assert!(snap[0].state.is_waiting());
    }
}
