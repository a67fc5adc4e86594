//! Bounded worker pool for SYNC integration calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use common::{CafRefNo, CorrelationId};
use domain::{OutboxEntry, Target};
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::error::{Result, SagaError};

/// A SYNC outbox entry waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub correlation_id: CorrelationId,
    pub caf_ref_no: CafRefNo,
    pub target: Target,
}

impl SyncJob {
    pub fn for_entry(entry: &OutboxEntry) -> Self {
        Self {
            correlation_id: entry.correlation_id.clone(),
            caf_ref_no: entry.caf_ref_no.clone(),
            target: entry.target,
        }
    }
}

/// Executes one job. Implementations report their own failures.
#[async_trait]
pub trait SyncJobHandler: Send + Sync + 'static {
    async fn handle(self: Arc<Self>, job: SyncJob);
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when the job is finished or dropped.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Worker pool fed by an unbounded queue.
///
/// A supervisor task receives jobs, waits for a semaphore permit, and runs each
/// job in a `JoinSet`; panicking jobs are logged. The pool holds only a weak
/// reference to its handler and stops once the handler is dropped.
pub struct SyncWorkerPool {
    sender: mpsc::UnboundedSender<(SyncJob, InFlightGuard)>,
    in_flight: Arc<InFlight>,
}

impl SyncWorkerPool {
    /// Starts the supervisor task. Must be called within a Tokio runtime.
    pub fn spawn<H: SyncJobHandler>(handler: Weak<H>, max_concurrency: usize) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(SyncJob, InFlightGuard)>();
        let max_concurrency = max_concurrency.max(1);

        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(max_concurrency));
            let mut tasks = JoinSet::new();

            loop {
                tokio::select! {
                    received = receiver.recv() => {
                        let Some((job, guard)) = received else { break };
                        let Some(handler) = handler.upgrade() else { break };
                        let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
                        tasks.spawn(async move {
                            let _permit = permit;
                            let _guard = guard;
                            handler.handle(job).await;
                        });
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        log_join(joined);
                    }
                }
            }

            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
            tracing::debug!("SYNC worker pool stopped");
        });

        Self {
            sender,
            in_flight: Arc::default(),
        }
    }

    pub fn submit(&self, job: SyncJob) -> Result<()> {
        self.in_flight.count.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(self.in_flight.clone());
        self.sender
            .send((job, guard))
            .map_err(|_| SagaError::WorkerPoolClosed)
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Waits until no job is queued or running, including jobs enqueued by
    /// jobs that were running when this was called.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "SYNC job panicked");
        } else {
            tracing::warn!(error = %e, "SYNC job cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<CorrelationId>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl SyncJobHandler for Recorder {
        async fn handle(self: Arc<Self>, job: SyncJob) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if job.correlation_id.as_str() == "PANIC" {
                self.active.fetch_sub(1, Ordering::SeqCst);
                panic!("boom");
            }
            self.seen.lock().unwrap().push(job.correlation_id);
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn job(id: &str) -> SyncJob {
        SyncJob {
            correlation_id: CorrelationId::new(id),
            caf_ref_no: CafRefNo::parse("CAF-W").unwrap(),
            target: Target::PreAct,
        }
    }

    #[tokio::test]
    async fn test_runs_all_jobs_with_bounded_concurrency() {
        let handler = Arc::new(Recorder::default());
        let pool = SyncWorkerPool::spawn(Arc::downgrade(&handler), 2);

        for i in 0..10 {
            pool.submit(job(&format!("J{i}"))).unwrap();
        }
        tokio::time::timeout(Duration::from_secs(5), pool.wait_idle())
            .await
            .unwrap();

        assert_eq!(handler.seen.lock().unwrap().len(), 10);
        assert!(handler.max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_the_pool() {
        let handler = Arc::new(Recorder::default());
        let pool = SyncWorkerPool::spawn(Arc::downgrade(&handler), 4);

        pool.submit(job("PANIC")).unwrap();
        pool.submit(job("OK")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), pool.wait_idle())
            .await
            .unwrap();

        pool.submit(job("AFTER")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), pool.wait_idle())
            .await
            .unwrap();

        let seen = handler.seen.lock().unwrap().clone();
        assert!(seen.contains(&CorrelationId::new("OK")));
        assert!(seen.contains(&CorrelationId::new("AFTER")));
    }

    #[tokio::test]
    async fn test_dropped_handler_closes_pool() {
        let handler = Arc::new(Recorder::default());
        let pool = SyncWorkerPool::spawn(Arc::downgrade(&handler), 1);
        drop(handler);

        pool.submit(job("J")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), pool.wait_idle())
            .await
            .unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Err(SagaError::WorkerPoolClosed) = pool.submit(job("J2")) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(closed.is_ok());
    }
}
