use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::worker::QueueWorker;

/// A deferred unit of work bound to a queue.
pub struct Job {
    label: String,
    run: Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>,
}

impl Job {
    pub fn new<F, Fut>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(move || run().boxed()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Consume the job and start its future.
    pub(super) fn start(self) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.run)()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("label", &self.label).finish()
    }
}

/// Sending side of one queue.
struct QueueSender {
    tx: mpsc::UnboundedSender<Job>,
    /// Jobs enqueued and not yet finished, including the running one.
    pending: Arc<AtomicUsize>,
}

struct SchedulerInner {
    delay: Duration,
    queues: Mutex<HashMap<String, QueueSender>>,
    /// Pending jobs across every queue.
    total: Arc<watch::Sender<usize>>,
}

/// Handle to the scheduler.
///
/// Cheaply cloneable; clones share the same queues. A queue's worker task is
/// spawned on the first `enqueue` for that name, so enqueueing must happen
/// inside a tokio runtime.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    /// Create a scheduler waiting `delay` between consecutive jobs of a queue.
    pub fn new(delay: Duration) -> Self {
        let (total, _) = watch::channel(0);
        Self {
            inner: Arc::new(SchedulerInner {
                delay,
                queues: Mutex::new(HashMap::new()),
                total: Arc::new(total),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Append a job to `queue`.
    ///
    /// An idle queue dispatches the job immediately; a busy one runs it after
    /// the jobs already waiting.
    pub fn enqueue<F, Fut>(&self, queue: &str, label: impl Into<String>, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.enqueue_job(queue, Job::new(label, job));
    }

    /// Append an already built job to `queue`.
    pub fn enqueue_job(&self, queue: &str, job: Job) {
        let mut queues = self
            .inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let sender = queues
            .entry(queue.to_string())
            .or_insert_with(|| self.spawn_worker(queue));

        debug!(queue, job = job.label(), "Enqueueing job");
        sender.pending.fetch_add(1, Ordering::SeqCst);
        self.inner.total.send_modify(|n| *n += 1);

        if let Err(mpsc::error::SendError(job)) = sender.tx.send(job) {
            // Worker gone (runtime shutting down); undo the bookkeeping.
            tracing::error!(
                queue,
                job = job.label(),
                "Queue worker is not running, job dropped"
            );
            sender.pending.fetch_sub(1, Ordering::SeqCst);
            self.inner.total.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    fn spawn_worker(&self, queue: &str) -> QueueSender {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = QueueWorker::new(
            queue.to_string(),
            rx,
            Arc::clone(&pending),
            Arc::clone(&self.inner.total),
            self.inner.delay,
        );
        tokio::spawn(worker.run());
        QueueSender { tx, pending }
    }

    /// Whether `queue` has a job running or waiting.
    pub fn is_queue_active(&self, queue: &str) -> bool {
        self.inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(queue)
            .is_some_and(|q| q.pending.load(Ordering::SeqCst) > 0)
    }

    /// Whether any queue has a job running or waiting.
    pub fn is_any_queue_active(&self) -> bool {
        *self.inner.total.borrow() > 0
    }

    /// Number of jobs running or waiting across all queues.
    pub fn pending_jobs(&self) -> usize {
        *self.inner.total.borrow()
    }

    /// Wait until every queue has drained.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.total.subscribe();
        // The sender lives in `inner`, which we hold, so this cannot fail.
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::time::Instant;

    const FAST: Duration = Duration::from_millis(20);

    fn recorder() -> Arc<StdMutex<Vec<String>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    async fn failing_job() -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }

    async fn panicking_job() -> anyhow::Result<()> {
        panic!("job exploded")
    }

    fn push(log: &Arc<StdMutex<Vec<String>>>, entry: &str) {
        log.lock().unwrap().push(entry.to_string());
    }

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order() {
        let scheduler = JobScheduler::new(FAST);
        let log = recorder();

        for name in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            scheduler.enqueue("q", name, move || async move {
                push(&log, name);
                anyhow::Ok(())
            });
        }

        scheduler.wait_idle().await;
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_job_enqueued_from_job_runs_after_waiting_jobs() {
        let scheduler = JobScheduler::new(FAST);
        let log = recorder();

        {
            let log = Arc::clone(&log);
            let inner_scheduler = scheduler.clone();
            scheduler.enqueue("q", "a", move || async move {
                push(&log, "a:start");
                let log_c = Arc::clone(&log);
                inner_scheduler.enqueue("q", "c", move || async move {
                    push(&log_c, "c");
                    anyhow::Ok(())
                });
                push(&log, "a:end");
                anyhow::Ok(())
            });
        }
        {
            let log = Arc::clone(&log);
            scheduler.enqueue("q", "b", move || async move {
                push(&log, "b");
                anyhow::Ok(())
            });
        }

        scheduler.wait_idle().await;
        assert_eq!(*log.lock().unwrap(), vec!["a:start", "a:end", "b", "c"]);
    }

    #[tokio::test]
    async fn test_jobs_in_one_queue_never_overlap() {
        let scheduler = JobScheduler::new(Duration::from_millis(1));
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let running = Arc::clone(&running);
            let max_seen = Arc::clone(&max_seen);
            scheduler.enqueue("q", format!("job-{}", i), move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                anyhow::Ok(())
            });
        }

        scheduler.wait_idle().await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_queues_overlap() {
        let scheduler = JobScheduler::new(FAST);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        // Job on "a" blocks until the job on "b" signals it.
        scheduler.enqueue("a", "waiter", move || async move {
            rx.await?;
            anyhow::Ok(())
        });
        scheduler.enqueue("b", "signaller", move || async move {
            let _ = tx.send(());
            anyhow::Ok(())
        });

        tokio::time::timeout(Duration::from_secs(2), scheduler.wait_idle())
            .await
            .expect("queues should run concurrently");
    }

    #[tokio::test]
    async fn test_failing_and_panicking_jobs_do_not_stall_queue() {
        let scheduler = JobScheduler::new(FAST);
        let log = recorder();

        scheduler.enqueue("q", "fails", failing_job);
        scheduler.enqueue("q", "panics", panicking_job);
        {
            let log = Arc::clone(&log);
            scheduler.enqueue("q", "after", move || async move {
                push(&log, "after");
                anyhow::Ok(())
            });
        }

        tokio::time::timeout(Duration::from_secs(2), scheduler.wait_idle())
            .await
            .expect("queue should keep going");
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[tokio::test]
    async fn test_first_dispatch_immediate_then_delayed() {
        let delay = Duration::from_millis(150);
        let scheduler = JobScheduler::new(delay);
        let stamps = Arc::new(StdMutex::new(Vec::new()));
        let start = Instant::now();

        for _ in 0..2 {
            let stamps = Arc::clone(&stamps);
            scheduler.enqueue("q", "stamp", move || async move {
                stamps.lock().unwrap().push(Instant::now());
                anyhow::Ok(())
            });
        }

        scheduler.wait_idle().await;
        let stamps = stamps.lock().unwrap();
        assert!(stamps[0] - start < delay, "first job should not wait");
        assert!(stamps[1] - stamps[0] >= delay, "second job should wait the delay");
    }

    #[tokio::test]
    async fn test_activity_flags() {
        let scheduler = JobScheduler::new(FAST);
        assert!(!scheduler.is_any_queue_active());
        assert!(!scheduler.is_queue_active("q"));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        scheduler.enqueue("q", "blocked", move || async move {
            let _ = rx.await;
            anyhow::Ok(())
        });

        assert!(scheduler.is_any_queue_active());
        assert!(scheduler.is_queue_active("q"));
        assert!(!scheduler.is_queue_active("other"));
        assert_eq!(scheduler.pending_jobs(), 1);

        tx.send(()).unwrap();
        scheduler.wait_idle().await;
        assert!(!scheduler.is_any_queue_active());
        assert!(!scheduler.is_queue_active("q"));
    }

    #[tokio::test]
    async fn test_idle_queue_restarts_without_delay() {
        let delay = Duration::from_millis(300);
        let scheduler = JobScheduler::new(delay);

        scheduler.enqueue("q", "first", || async { anyhow::Ok(()) });
        scheduler.wait_idle().await;

        let start = Instant::now();
        let (tx, rx) = tokio::sync::oneshot::channel();
        scheduler.enqueue("q", "second", move || async move {
            let _ = tx.send(Instant::now());
            anyhow::Ok(())
        });
        let ran_at = rx.await.unwrap();
        assert!(ran_at - start < delay);
    }
}
