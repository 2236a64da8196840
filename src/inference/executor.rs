use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task;

use crate::config::Config;
use crate::error::InferenceError;

/// Runs blocking model calls on tokio's blocking pool so request tasks never stall the runtime.
#[derive(Clone, Debug)]
pub struct InferenceExecutor {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl InferenceExecutor {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_concurrent_inferences, config.inference_timeout())
    }

    /// Queues `job` for a free slot and waits at most `timeout` for it to finish.
    ///
    /// A timed out job keeps running on its blocking thread and keeps its slot until it
    /// returns, its result is discarded.
    #[tracing::instrument(level = "debug", skip(self, job))]
    pub async fn run<F, T>(&self, job: F) -> Result<T, InferenceError>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let queued = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| InferenceError::Unavailable)?;
            task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|err| InferenceError::Aborted(err.to_string()))?
            .map_err(InferenceError::from_job)
        };

        tokio::time::timeout(self.timeout, queued)
            .await
            .map_err(|_| InferenceError::TimedOut(self.timeout))?
    }

    /// Refuses new jobs, queued jobs fail with [`InferenceError::Unavailable`].
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;
    use crate::error::InvalidInput;

    #[tokio::test]
    async fn returns_job_output() {
        let executor = InferenceExecutor::new(1, Duration::from_secs(5));
        let out = executor.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn job_errors_become_failures() {
        let executor = InferenceExecutor::new(1, Duration::from_secs(5));
        let err = executor
            .run(|| -> anyhow::Result<()> { Err(anyhow!("bad weights")) })
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Failed(_)));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let executor = InferenceExecutor::new(1, Duration::from_secs(5));
        let err = executor
            .run(|| -> anyhow::Result<()> {
                Err(InvalidInput("Question is too long".into()).into())
            })
            .await
            .unwrap_err();
        assert!(
            matches!(err, InferenceError::Rejected(message) if message == "Question is too long")
        );
    }

    #[tokio::test]
    async fn panics_become_aborts() {
        let executor = InferenceExecutor::new(1, Duration::from_secs(5));
        let err = executor
            .run(|| -> anyhow::Result<()> { panic!("model exploded") })
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Aborted(_)));
    }

    #[tokio::test]
    async fn slow_jobs_time_out() {
        let executor = InferenceExecutor::new(1, Duration::from_millis(20));
        let err = executor
            .run(|| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::TimedOut(_)));
    }

    #[tokio::test]
    async fn closed_executor_is_unavailable() {
        let executor = InferenceExecutor::new(1, Duration::from_secs(5));
        executor.close();
        let err = executor.run(|| Ok(())).await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded() {
        let executor = InferenceExecutor::new(2, Duration::from_secs(10));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|_| {
            let executor = executor.clone();
            let running = running.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                executor
                    .run(move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(30));
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        });
        for job in jobs.collect::<Vec<_>>() {
            job.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
