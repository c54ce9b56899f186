//! Execution metrics snapshot, written once at job completion.

use serde::{Deserialize, Serialize};

use crate::id::JobId;
use crate::task::TaskType;

/// Duration of one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDuration {
    /// Task key
    pub task_key: String,
    /// Task type
    pub task_type: TaskType,
    /// Wall seconds of the final attempt
    pub seconds: f64,
}

/// Timing for one execution wave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveTiming {
    /// Wave index (1-based)
    pub wave: usize,
    /// Tasks dispatched in this wave
    pub task_count: usize,
    /// Worst dispatch-to-start latency observed in the wave, in milliseconds
    pub dispatch_latency_ms: f64,
    /// Wall seconds from wave dispatch to settlement
    pub duration_seconds: f64,
}

/// Performance snapshot for one job execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// The job measured
    pub job_id: JobId,

    /// Total planned tasks
    pub total_tasks: usize,
    /// Tasks that completed
    pub completed_tasks: usize,
    /// Tasks that failed terminally
    pub failed_tasks: usize,
    /// Tasks skipped because a dependency failed
    pub skipped_tasks: usize,
    /// Tasks that consumed at least one retry
    pub retried_tasks: usize,

    /// Number of execution waves
    pub wave_count: usize,
    /// Widest batch actually dispatched at once
    pub max_parallel: usize,
    /// Mean batch width across waves
    pub avg_parallel: f64,

    /// Sum of task durations divided by wall-clock duration
    pub parallelism_ratio: f64,
    /// max_wave_size / total_tasks, the theoretical ceiling from the DAG
    pub parallelism_potential: f64,

    /// Wall-clock duration of the whole run, in seconds
    pub total_duration_seconds: f64,
    /// Mean task duration, in seconds
    pub avg_task_duration_seconds: f64,

    /// Per-task durations
    pub task_durations: Vec<TaskDuration>,
    /// Per-wave timings
    pub wave_timings: Vec<WaveTiming>,

    /// Quality-gate warnings accepted during the run
    pub quality_warnings: usize,
}

impl ExecutionMetrics {
    /// Empty snapshot for a job.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            skipped_tasks: 0,
            retried_tasks: 0,
            wave_count: 0,
            max_parallel: 0,
            avg_parallel: 0.0,
            parallelism_ratio: 0.0,
            parallelism_potential: 0.0,
            total_duration_seconds: 0.0,
            avg_task_duration_seconds: 0.0,
            task_durations: Vec::new(),
            wave_timings: Vec::new(),
            quality_warnings: 0,
        }
    }

    /// Recompute the derived ratio fields from the recorded durations.
    pub fn finalize(&mut self) {
        let sequential: f64 = self.task_durations.iter().map(|d| d.seconds).sum();
        if self.total_duration_seconds > 0.0 {
            self.parallelism_ratio = sequential / self.total_duration_seconds;
        }
        if !self.task_durations.is_empty() {
            self.avg_task_duration_seconds = sequential / self.task_durations.len() as f64;
        }
        if self.wave_count > 0 {
            self.avg_parallel = self
                .wave_timings
                .iter()
                .map(|w| w.task_count as f64)
                .sum::<f64>()
                / self.wave_count as f64;
        }
    }
}
