//! Performance monitor - turns an execution snapshot into diagnostics.

use std::sync::Arc;

use harness_core::{ExecutionMetrics, JobId, TaskDuration, TaskStatus};
use harness_storage::{StorageError, Store};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sla::SlaReport;

/// Detection thresholds for bottleneck identification.
#[derive(Debug, Clone, Copy)]
pub struct MonitorThresholds {
    /// Parallelism ratio below this is a regression outright.
    pub parallelism_regression: f64,
    /// Ratio below this counts as "essentially sequential".
    pub sequential_ratio: f64,
    /// Sequential execution is only a finding when the DAG offered at least
    /// this much width.
    pub min_potential_for_sequential: f64,
    /// A task slower than this multiple of the job mean is reported alone.
    pub slow_task_factor: f64,
    /// Dispatch-to-start latency target, in milliseconds.
    pub dispatch_latency_target_ms: f64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            parallelism_regression: 0.5,
            sequential_ratio: 1.5,
            min_potential_for_sequential: 0.5,
            slow_task_factor: 2.0,
            dispatch_latency_target_ms: 100.0,
        }
    }
}

/// A diagnosed performance problem, localized where possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Bottleneck {
    /// Wall clock dominated by scheduling or idle overhead.
    LowParallelism {
        /// Observed parallelism ratio
        ratio: f64,
        /// Regression threshold it fell below
        threshold: f64,
    },
    /// The job ran essentially sequentially despite a wider DAG.
    SequentialExecution {
        /// Observed parallelism ratio
        ratio: f64,
        /// The DAG's parallelism potential
        potential: f64,
    },
    /// The run exceeded its task-count tier's wall-clock target.
    SlaViolation {
        /// Tier name
        tier: String,
        /// Actual duration in seconds
        duration_seconds: f64,
        /// Tier target in seconds
        target_seconds: f64,
    },
    /// One task ran far slower than the job's mean task duration.
    SlowTask {
        /// The slow task
        task_key: String,
        /// Its duration in seconds
        duration_seconds: f64,
        /// duration / mean
        ratio_to_mean: f64,
    },
    /// A wave took too long to move tasks from dispatched to running.
    SlowDispatch {
        /// Wave index (1-based)
        wave: usize,
        /// Worst observed latency in milliseconds
        latency_ms: f64,
        /// Target latency in milliseconds
        target_ms: f64,
    },
}

impl std::fmt::Display for Bottleneck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bottleneck::LowParallelism { ratio, threshold } => write!(
                f,
                "parallelism ratio {:.2} below regression threshold {:.2}",
                ratio, threshold
            ),
            Bottleneck::SequentialExecution { ratio, potential } => write!(
                f,
                "ran essentially sequentially (ratio {:.2}) despite parallelism potential {:.2}",
                ratio, potential
            ),
            Bottleneck::SlaViolation {
                tier,
                duration_seconds,
                target_seconds,
            } => write!(
                f,
                "{} tier SLA missed: {:.1}s against a {:.0}s target",
                tier, duration_seconds, target_seconds
            ),
            Bottleneck::SlowTask {
                task_key,
                duration_seconds,
                ratio_to_mean,
            } => write!(
                f,
                "task '{}' took {:.1}s, {:.1}x the job mean",
                task_key, duration_seconds, ratio_to_mean
            ),
            Bottleneck::SlowDispatch {
                wave,
                latency_ms,
                target_ms,
            } => write!(
                f,
                "wave {} dispatch latency {:.0}ms exceeded {:.0}ms target",
                wave, latency_ms, target_ms
            ),
        }
    }
}

/// Store-backed performance analysis for settled jobs.
pub struct PerformanceMonitor {
    store: Arc<dyn Store>,
    thresholds: MonitorThresholds,
}

impl PerformanceMonitor {
    /// Create a monitor over a store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            thresholds: MonitorThresholds::default(),
        }
    }

    /// Set the detection thresholds.
    pub fn with_thresholds(mut self, thresholds: MonitorThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Fetch the metrics snapshot for a job.
    ///
    /// Prefers the snapshot the engine wrote at completion; if it is absent
    /// (older runs, partial writes), rebuilds what it can from the task rows.
    /// Wave timings and the parallelism potential are not recoverable that
    /// way and stay empty.
    pub async fn collect(&self, job_id: JobId) -> Result<ExecutionMetrics, StorageError> {
        let job = self
            .store
            .load_job(job_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {}", job_id)))?;

        if let Some(metrics) = job.execution_metrics {
            debug!(%job_id, "using stored metrics snapshot");
            return Ok(metrics);
        }

        info!(%job_id, "no stored snapshot, rebuilding metrics from task rows");
        let tasks = self.store.list_tasks(job_id).await?;

        let mut metrics = ExecutionMetrics::new(job_id);
        metrics.total_tasks = tasks.len();
        for task in &tasks {
            match task.status {
                TaskStatus::Complete => metrics.completed_tasks += 1,
                TaskStatus::Failed => metrics.failed_tasks += 1,
                TaskStatus::Skipped => metrics.skipped_tasks += 1,
                _ => {}
            }
            if task.retry_count > 0 {
                metrics.retried_tasks += 1;
            }
            if let Some(seconds) = task.duration_seconds {
                metrics.task_durations.push(TaskDuration {
                    task_key: task.task_key.clone(),
                    task_type: task.task_type,
                    seconds,
                });
            }
        }

        if let (Some(started), Some(completed)) = (job.started_at, job.completed_at) {
            metrics.total_duration_seconds = (completed - started)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
        }

        metrics.finalize();
        Ok(metrics)
    }

    /// Check a run against its task-count SLA tier.
    pub fn check_sla(&self, metrics: &ExecutionMetrics) -> SlaReport {
        SlaReport::evaluate(metrics.total_tasks, metrics.total_duration_seconds)
    }

    /// Diagnose performance problems in a settled run.
    pub fn identify_bottlenecks(&self, metrics: &ExecutionMetrics) -> Vec<Bottleneck> {
        let mut findings = Vec::new();
        let t = &self.thresholds;

        let sla = self.check_sla(metrics);
        if !sla.compliant {
            findings.push(Bottleneck::SlaViolation {
                tier: sla.tier.to_string(),
                duration_seconds: sla.duration_seconds,
                target_seconds: sla.target_seconds,
            });
        }

        if metrics.total_tasks > 1 && metrics.total_duration_seconds > 0.0 {
            if metrics.parallelism_ratio < t.parallelism_regression {
                findings.push(Bottleneck::LowParallelism {
                    ratio: metrics.parallelism_ratio,
                    threshold: t.parallelism_regression,
                });
            } else if metrics.parallelism_ratio < t.sequential_ratio
                && metrics.parallelism_potential >= t.min_potential_for_sequential
            {
                findings.push(Bottleneck::SequentialExecution {
                    ratio: metrics.parallelism_ratio,
                    potential: metrics.parallelism_potential,
                });
            }
        }

        if metrics.task_durations.len() > 1 && metrics.avg_task_duration_seconds > 0.0 {
            for duration in &metrics.task_durations {
                let ratio = duration.seconds / metrics.avg_task_duration_seconds;
                if ratio > t.slow_task_factor {
                    findings.push(Bottleneck::SlowTask {
                        task_key: duration.task_key.clone(),
                        duration_seconds: duration.seconds,
                        ratio_to_mean: ratio,
                    });
                }
            }
        }

        for wave in &metrics.wave_timings {
            if wave.dispatch_latency_ms > t.dispatch_latency_target_ms {
                findings.push(Bottleneck::SlowDispatch {
                    wave: wave.wave,
                    latency_ms: wave.dispatch_latency_ms,
                    target_ms: t.dispatch_latency_target_ms,
                });
            }
        }

        info!(
            job_id = %metrics.job_id,
            findings = findings.len(),
            "bottleneck analysis complete"
        );
        findings
    }
}
