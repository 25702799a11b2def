use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::metrics::{SCHEDULER_JOBS, SCHEDULER_JOB_DURATION};

use super::Job;

/// Background task draining one named queue.
///
/// Runs one job at a time. After a job finishes, the next one is started only
/// after the configured delay; when nothing is left the worker idles until a
/// new job arrives, which then starts immediately.
pub struct QueueWorker {
    name: String,
    rx: mpsc::UnboundedReceiver<Job>,
    pending: Arc<AtomicUsize>,
    total: Arc<watch::Sender<usize>>,
    delay: Duration,
}

impl QueueWorker {
    pub fn new(
        name: String,
        rx: mpsc::UnboundedReceiver<Job>,
        pending: Arc<AtomicUsize>,
        total: Arc<watch::Sender<usize>>,
        delay: Duration,
    ) -> Self {
        Self {
            name,
            rx,
            pending,
            total,
            delay,
        }
    }

    /// Run the worker until every scheduler handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        debug!(queue = %self.name, "Queue worker started");

        while let Some(job) = self.rx.recv().await {
            self.execute(job).await;

            let remaining = self.pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            self.total.send_modify(|n| *n = n.saturating_sub(1));

            if remaining > 0 {
                tokio::time::sleep(self.delay).await;
            } else {
                info!(queue = %self.name, "All jobs finished");
            }
        }

        debug!(queue = %self.name, "Queue worker shutting down");
    }

    /// Run a single job, containing any error or panic it produces.
    async fn execute(&self, job: Job) {
        let label = job.label().to_string();
        debug!(queue = %self.name, job = %label, "Executing job");

        let started = Instant::now();
        let outcome = AssertUnwindSafe(async move { job.start().await })
            .catch_unwind()
            .await;
        SCHEDULER_JOB_DURATION
            .with_label_values(&[self.name.as_str()])
            .observe(started.elapsed().as_secs_f64());

        let outcome_label = match outcome {
            Ok(Ok(())) => "ok",
            Ok(Err(e)) => {
                error!(queue = %self.name, job = %label, "Job failed: {:#}", e);
                "error"
            }
            Err(panic) => {
                error!(
                    queue = %self.name,
                    job = %label,
                    "Job panicked: {}",
                    panic_message(panic.as_ref())
                );
                "panic"
            }
        };
        SCHEDULER_JOBS
            .with_label_values(&[self.name.as_str(), outcome_label])
            .inc();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42u32);

        assert_eq!(panic_message(static_str.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_worker_exits_when_channel_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (total, _) = watch::channel(0);
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = QueueWorker::new(
            "q".to_string(),
            rx,
            Arc::clone(&pending),
            Arc::new(total),
            Duration::from_millis(1),
        );
        let handle = tokio::spawn(worker.run());

        pending.fetch_add(1, Ordering::SeqCst);
        tx.send(Job::new("noop", || async { anyhow::Ok(()) })).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should exit")
            .unwrap();
        assert_eq!(pending.load(Ordering::SeqCst), 0);
    }
}
