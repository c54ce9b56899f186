//! Engine configuration.

use std::time::Duration;

/// Tunables for the concurrent wave executor.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Max tasks of one job dispatched at once; a wider wave is split into
    /// micro-batches so one oversized wave cannot starve other jobs.
    pub max_concurrent_per_job: usize,

    /// Worker-pool capacity shared by all jobs on this engine.
    pub max_concurrent_global: usize,

    /// Deadline for a whole wave to settle. Applies uniformly to every wave;
    /// per-task-type overrides (retrieval vs report budgets) are a known
    /// configuration gap.
    pub wave_timeout: Duration,

    /// Retries per task, shared by transient failures and quality re-queues.
    pub max_task_retries: u32,

    /// Base delay before re-dispatching a wave's retry set.
    pub retry_delay: Duration,

    /// Multiplier applied to the retry delay per consumed retry.
    pub retry_backoff: f64,

    /// Abort the job when more than this fraction of a wave fails terminally.
    pub max_wave_failure_ratio: f64,

    /// Dispatch-to-start latency target. Recorded for the performance
    /// monitor; the scheduler does not enforce it.
    pub dispatch_latency_target: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_job: 5,
            max_concurrent_global: 20,
            wave_timeout: Duration::from_secs(300),
            max_task_retries: 2,
            retry_delay: Duration::from_secs(2),
            retry_backoff: 1.5,
            max_wave_failure_ratio: 0.5,
            dispatch_latency_target: Duration::from_millis(100),
        }
    }
}

impl EngineConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-job concurrency cap.
    pub fn with_max_concurrent_per_job(mut self, max: usize) -> Self {
        self.max_concurrent_per_job = max.max(1);
        self
    }

    /// Set the global worker-pool capacity.
    pub fn with_max_concurrent_global(mut self, max: usize) -> Self {
        self.max_concurrent_global = max.max(1);
        self
    }

    /// Set the wave timeout.
    pub fn with_wave_timeout(mut self, timeout: Duration) -> Self {
        self.wave_timeout = timeout;
        self
    }

    /// Set the per-task retry budget.
    pub fn with_max_task_retries(mut self, retries: u32) -> Self {
        self.max_task_retries = retries;
        self
    }

    /// Set the retry delay and backoff multiplier.
    pub fn with_retry_backoff(mut self, delay: Duration, multiplier: f64) -> Self {
        self.retry_delay = delay;
        self.retry_backoff = multiplier;
        self
    }

    /// Delay before re-dispatching a retry set whose worst task has consumed
    /// `retries` attempts.
    pub fn backoff_delay(&self, retries: u32) -> Duration {
        let factor = self.retry_backoff.powi(retries.saturating_sub(1) as i32);
        self.retry_delay.mul_f64(factor)
    }
}
