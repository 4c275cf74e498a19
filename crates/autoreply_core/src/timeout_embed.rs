use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;
use tracing::warn;

use crate::embed::EmbeddingProvider;

pub const DEFAULT_EMBED_WORKERS: usize = 4;

#[derive(Error, Debug, Clone, Copy)]
#[error("embedding did not finish within {0:?}")]
pub struct EmbedTimeout(pub Duration);

#[derive(Error, Debug, Clone, Copy)]
#[error("all {0} embedding workers are busy")]
pub struct EmbedBusy(pub usize);

type Job = Box<dyn FnOnce(&dyn EmbeddingProvider) + Send>;

/// Runs the wrapped provider on a fixed pool of worker threads and stops
/// waiting after `timeout` or the caller's deadline, whichever comes first.
///
/// At most `workers` calls run and `workers` more wait in the queue; a call
/// arriving when the queue is full fails at once with [`EmbedBusy`]. A call
/// that outlives its caller keeps its worker until the provider returns, and
/// queued calls whose caller already gave up are dropped unrun.
pub struct TimeoutEmbeddingProvider {
    jobs: Sender<Job>,
    timeout: Duration,
    workers: usize,
}

impl TimeoutEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self::with_workers(inner, timeout, DEFAULT_EMBED_WORKERS)
    }

    pub fn with_workers(
        inner: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
        workers: usize,
    ) -> Self {
        let workers = workers.max(1);
        let (jobs, queue) = bounded::<Job>(workers);

        for idx in 0..workers {
            let queue = queue.clone();
            let inner = inner.clone();
            let spawned = thread::Builder::new()
                .name(format!("embed-worker-{idx}"))
                .spawn(move || {
                    // Exits once the provider (and its sender) is dropped.
                    for job in queue.iter() {
                        // A panicking provider only loses the current call.
                        let _ = panic::catch_unwind(AssertUnwindSafe(|| job(inner.as_ref())));
                    }
                });
            if let Err(err) = spawned {
                warn!(worker = idx, error = %err, "failed to start embedding worker");
            }
        }

        Self {
            jobs,
            timeout,
            workers,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn run<T, F>(&self, deadline: Option<Instant>, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EmbeddingProvider) -> Result<T> + Send + 'static,
    {
        let started = Instant::now();
        let until = deadline.map_or(started + self.timeout, |d| d.min(started + self.timeout));
        let budget = until.saturating_duration_since(started);
        if budget.is_zero() {
            return Err(EmbedTimeout(budget).into());
        }

        let (tx, rx) = bounded(1);
        let job: Job = Box::new(move |provider| {
            if Instant::now() >= until {
                return;
            }
            // Receiver is gone once the caller timed out.
            let _ = tx.send(work(provider));
        });

        match self.jobs.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(workers = self.workers, "embedding workers busy, failing fast");
                return Err(EmbedBusy(self.workers).into());
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(anyhow!("no embedding workers running"));
            }
        }

        match rx.recv_deadline(until) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?budget, "embedding call timed out");
                Err(EmbedTimeout(budget).into())
            }
            Err(RecvTimeoutError::Disconnected) if Instant::now() >= until => {
                Err(EmbedTimeout(budget).into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("embedding worker panicked")),
        }
    }
}

impl EmbeddingProvider for TimeoutEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_until(text, None)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch_until(texts, None)
    }

    fn embed_until(&self, text: &str, deadline: Option<Instant>) -> Result<Vec<f32>> {
        let text = text.to_string();
        self.run(deadline, move |p| p.embed(&text))
    }

    fn embed_batch_until(
        &self,
        texts: &[String],
        deadline: Option<Instant>,
    ) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        self.run(deadline, move |p| p.embed_batch(&texts))
    }
}
