//! Concurrent wave executor - the scheduling core.
//!
//! Executes a job's waves in sequence, dispatching each wave as bounded
//! micro-batches onto the worker pool, blocking on wave-barrier
//! synchronization, and running the quality gate over results before
//! advancing. Dependency satisfaction is computed per wave, not per task, so
//! the gate always evaluates a settled wave.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use harness_core::{
    ExecutionMetrics, ExecutorRole, Job, JobId, JobStatus, Task, TaskDuration, TaskOutcome,
    TaskStatus, WaveTiming,
};
use harness_quality::{GateDecision, QualityGate, QualityWarning};
use harness_storage::{JobPatch, StorageError, Store, TaskPatch};
use tokio::task::JoinSet;
use tokio::time::timeout_at;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::graph::ExecutionGraph;
use crate::notifier::ProgressNotifier;
use crate::registry::{ExecutorError, ExecutorRegistry};

/// Infrastructure failure while driving a job.
///
/// Job-level outcomes (planning defects, task failures, cancellation) are
/// reported through [`JobResult`], not through this error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The backing store failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The referenced job does not exist
    #[error("job {0} not found")]
    JobNotFound(JobId),
}

/// Terminal result of one job execution.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// The executed job
    pub job_id: JobId,
    /// Terminal status
    pub status: JobStatus,
    /// Tasks that completed
    pub completed_tasks: usize,
    /// Tasks that failed terminally
    pub failed_tasks: usize,
    /// Tasks skipped because a dependency failed
    pub skipped_tasks: usize,
    /// Quality shortfalls accepted during the run
    pub warnings: Vec<QualityWarning>,
    /// Performance snapshot
    pub metrics: ExecutionMetrics,
    /// Terminal error, if the job failed
    pub error_message: Option<String>,
}

/// Record a critical-path failure as the job's terminal error.
fn note_critical_failure(task: &Task, job_error: &mut Option<String>) {
    if task.task_type.is_critical() && job_error.is_none() {
        *job_error = Some(format!(
            "critical task '{}' failed: {}",
            task.task_key,
            task.error_message.as_deref().unwrap_or("unknown error")
        ));
    }
}

/// Result of one task attempt, reported back from the worker pool.
struct Attempt {
    task_key: String,
    dispatch_latency_ms: f64,
    duration_seconds: f64,
    outcome: AttemptOutcome,
}

enum AttemptOutcome {
    Completed(TaskOutcome),
    Recoverable(String),
    Unrecoverable(String),
    TimedOut,
}

/// The concurrent research task execution engine.
///
/// Constructed with explicit references to its collaborators; holds no
/// global state. One engine instance can drive many jobs, which share its
/// global worker-pool budget.
pub struct Engine {
    store: Arc<dyn Store>,
    registry: ExecutorRegistry,
    notifier: Arc<dyn ProgressNotifier>,
    gate: QualityGate,
    config: EngineConfig,
    global_slots: Arc<tokio::sync::Semaphore>,
}

impl Engine {
    /// Create an engine with default configuration and quality gate.
    pub fn new(
        store: Arc<dyn Store>,
        registry: ExecutorRegistry,
        notifier: Arc<dyn ProgressNotifier>,
    ) -> Self {
        let config = EngineConfig::default();
        let global_slots = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent_global));
        Self {
            store,
            registry,
            notifier,
            gate: QualityGate::new(),
            config,
            global_slots,
        }
    }

    /// Set the configuration. Resizes the global worker pool.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.global_slots = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent_global));
        self.config = config;
        self
    }

    /// Set the quality gate.
    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    /// Submit an already-planned job: persist it with its task list, then run.
    pub async fn submit(&self, mut job: Job, mut tasks: Vec<Task>) -> Result<JobResult, EngineError> {
        job.total_tasks = tasks.len();
        job.status = JobStatus::Planned;
        self.store.save_job(&job).await?;

        for task in &mut tasks {
            task.job_id = job.id;
            self.store.save_task(task).await?;
        }

        self.run_job(job.id).await
    }

    /// Request cancellation of a job.
    ///
    /// In-flight tasks are not forcibly killed; the run loop observes the
    /// cancelled status between batches and abandons their results.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<(), EngineError> {
        info!(%job_id, "cancel requested");
        self.store
            .update_job(
                job_id,
                JobPatch {
                    status: Some(JobStatus::Cancelled),
                    completed_at: Some(chrono::Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Execute a planned job to a terminal state.
    pub async fn run_job(&self, job_id: JobId) -> Result<JobResult, EngineError> {
        if self.store.load_job(job_id).await?.is_none() {
            return Err(EngineError::JobNotFound(job_id));
        }
        let tasks = self.store.list_tasks(job_id).await?;

        let graph = match ExecutionGraph::build(&tasks) {
            Ok(graph) => graph,
            Err(defect) => {
                let message = format!("planning defect: {}", defect);
                error!(%job_id, %defect, "rejecting malformed task graph");
                return self.fail_job(job_id, message, ExecutionMetrics::new(job_id)).await;
            }
        };

        info!(
            %job_id,
            total_tasks = graph.total_tasks,
            wave_count = graph.wave_count(),
            parallelism_potential = graph.parallelism_potential,
            "starting job execution"
        );

        let run_started = Instant::now();
        self.store
            .update_job(
                job_id,
                JobPatch {
                    status: Some(JobStatus::Executing),
                    started_at: Some(chrono::Utc::now()),
                    total_tasks: Some(graph.total_tasks),
                    ..Default::default()
                },
            )
            .await?;

        let mut tasks_by_key: HashMap<String, Task> = tasks
            .into_iter()
            .map(|t| (t.task_key.clone(), t))
            .collect();

        let mut completed: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut retried: HashSet<String> = HashSet::new();
        let mut warnings: Vec<QualityWarning> = Vec::new();

        let mut metrics = ExecutionMetrics::new(job_id);
        metrics.total_tasks = graph.total_tasks;
        metrics.parallelism_potential = graph.parallelism_potential;

        let mut phase = JobStatus::Executing;
        let mut job_error: Option<String> = None;
        let mut cancelled = false;

        'waves: for (wave_index, wave) in graph.waves.iter().enumerate() {
            if self.is_cancelled(job_id).await? {
                cancelled = true;
                break;
            }

            phase = self
                .advance_phase(job_id, phase, &graph, wave_index, &tasks_by_key)
                .await?;

            // Tasks whose dependencies did not complete can never run.
            let mut runnable: Vec<String> = Vec::new();
            for key in wave {
                let Some(task) = tasks_by_key.get(key) else { continue };
                if task.depends_on.iter().all(|d| completed.contains(d)) {
                    runnable.push(key.clone());
                } else {
                    self.skip_task(task, &mut skipped).await?;
                    if task.task_type.is_critical() && job_error.is_none() {
                        job_error = Some(format!(
                            "critical task '{}' skipped: dependency failed",
                            key
                        ));
                    }
                }
            }
            if job_error.is_some() {
                break;
            }

            let wave_started = Instant::now();
            let deadline = tokio::time::Instant::now() + self.config.wave_timeout;
            let mut wave_failed = 0usize;
            let mut worst_latency_ms = 0.0f64;

            debug!(%job_id, wave = wave_index + 1, task_count = runnable.len(), "dispatching wave");

            let mut pending = runnable.clone();
            while !pending.is_empty() {
                let mut retry_set: Vec<String> = Vec::new();

                for batch in pending.chunks(self.config.max_concurrent_per_job) {
                    if let Some(first) = batch.first() {
                        self.store
                            .update_job(
                                job_id,
                                JobPatch {
                                    current_task_key: Some(first.clone()),
                                    ..Default::default()
                                },
                            )
                            .await?;
                    }
                    metrics.max_parallel = metrics.max_parallel.max(batch.len());

                    let attempts = self.run_batch(job_id, batch, &tasks_by_key, deadline).await;

                    if self.is_cancelled(job_id).await? {
                        // Results of a cancelled job are abandoned, not persisted.
                        cancelled = true;
                        break 'waves;
                    }

                    for attempt in attempts {
                        self.settle_attempt(
                            attempt,
                            &mut tasks_by_key,
                            &mut completed,
                            &mut failed,
                            &mut retried,
                            &mut retry_set,
                            &mut warnings,
                            &mut metrics,
                            &mut wave_failed,
                            &mut worst_latency_ms,
                            &mut job_error,
                        )
                        .await?;
                    }

                    self.update_progress(job_id, completed.len(), graph.total_tasks)
                        .await?;
                }

                pending = retry_set;
                if !pending.is_empty() {
                    let worst_retry = pending
                        .iter()
                        .filter_map(|k| tasks_by_key.get(k))
                        .map(|t| t.retry_count)
                        .max()
                        .unwrap_or(1);
                    let delay = self.config.backoff_delay(worst_retry);
                    debug!(
                        %job_id,
                        wave = wave_index + 1,
                        retry_count = pending.len(),
                        delay_ms = delay.as_millis() as u64,
                        "re-dispatching wave retry set"
                    );
                    tokio::time::sleep(delay).await;
                }
            }

            metrics.wave_timings.push(WaveTiming {
                wave: wave_index + 1,
                task_count: runnable.len(),
                dispatch_latency_ms: worst_latency_ms,
                duration_seconds: wave_started.elapsed().as_secs_f64(),
            });

            if job_error.is_some() {
                break;
            }

            if !runnable.is_empty()
                && wave_failed as f64 > runnable.len() as f64 * self.config.max_wave_failure_ratio
            {
                job_error = Some(format!(
                    "too many task failures in wave {} ({}/{})",
                    wave_index + 1,
                    wave_failed,
                    runnable.len()
                ));
                break;
            }
        }

        metrics.wave_count = metrics.wave_timings.len();
        metrics.completed_tasks = completed.len();
        metrics.failed_tasks = failed.len();
        metrics.skipped_tasks = skipped.len();
        metrics.retried_tasks = retried.len();
        metrics.quality_warnings = warnings.len();
        metrics.total_duration_seconds = run_started.elapsed().as_secs_f64();
        metrics.finalize();

        if cancelled {
            self.abandon_remaining(&tasks_by_key, TaskStatus::Cancelled)
                .await?;
            return self
                .finish_job(job_id, JobStatus::Cancelled, metrics, warnings, None)
                .await;
        }

        if let Some(message) = job_error {
            self.abandon_remaining(&tasks_by_key, TaskStatus::Skipped)
                .await?;
            return self.fail_job_with(job_id, message, metrics, warnings).await;
        }

        self.finish_job(job_id, JobStatus::Complete, metrics, warnings, None)
            .await
    }

    // === Wave internals ===

    /// Dispatch one micro-batch and wait for every member to settle.
    async fn run_batch(
        &self,
        job_id: JobId,
        batch: &[String],
        tasks_by_key: &HashMap<String, Task>,
        deadline: tokio::time::Instant,
    ) -> Vec<Attempt> {
        let dispatched = Instant::now();
        let mut join_set: JoinSet<Attempt> = JoinSet::new();

        for key in batch {
            let Some(task) = tasks_by_key.get(key) else { continue };
            let task = task.clone();
            let store = Arc::clone(&self.store);
            let notifier = Arc::clone(&self.notifier);
            let executor = Arc::clone(self.registry.executor_for(task.task_type.role()));
            let slots = Arc::clone(&self.global_slots);

            join_set.spawn(async move {
                let task_key = task.task_key.clone();

                let _ = store
                    .update_task(task.id, TaskPatch::status(TaskStatus::Queued))
                    .await;

                let permit = match timeout_at(deadline, slots.acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => {
                        return Attempt {
                            task_key,
                            dispatch_latency_ms: dispatched.elapsed().as_secs_f64() * 1000.0,
                            duration_seconds: 0.0,
                            outcome: AttemptOutcome::Unrecoverable(
                                "worker pool closed".to_string(),
                            ),
                        }
                    }
                    Err(_) => {
                        return Attempt {
                            task_key,
                            dispatch_latency_ms: dispatched.elapsed().as_secs_f64() * 1000.0,
                            duration_seconds: 0.0,
                            outcome: AttemptOutcome::TimedOut,
                        }
                    }
                };
                let _permit = permit;

                let dispatch_latency_ms = dispatched.elapsed().as_secs_f64() * 1000.0;
                let _ = store
                    .update_task(
                        task.id,
                        TaskPatch {
                            status: Some(TaskStatus::Running),
                            started_at: Some(chrono::Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await;
                notifier.task_started(job_id, &task).await;

                let attempt_started = Instant::now();
                let result = timeout_at(deadline, executor.execute(&task, job_id)).await;
                let duration_seconds = attempt_started.elapsed().as_secs_f64();

                let outcome = match result {
                    Ok(Ok(outcome)) => AttemptOutcome::Completed(outcome),
                    Ok(Err(ExecutorError::Recoverable(message))) => {
                        AttemptOutcome::Recoverable(message)
                    }
                    Ok(Err(ExecutorError::Unrecoverable(message))) => {
                        AttemptOutcome::Unrecoverable(message)
                    }
                    Err(_) => AttemptOutcome::TimedOut,
                };

                Attempt {
                    task_key,
                    dispatch_latency_ms,
                    duration_seconds,
                    outcome,
                }
            });
        }

        let mut attempts = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(attempt) => attempts.push(attempt),
                Err(e) => error!(%job_id, error = %e, "task join failed"),
            }
        }
        attempts
    }

    /// Apply one attempt result: accept, re-queue, or fail the task.
    #[allow(clippy::too_many_arguments)]
    async fn settle_attempt(
        &self,
        attempt: Attempt,
        tasks_by_key: &mut HashMap<String, Task>,
        completed: &mut HashSet<String>,
        failed: &mut HashSet<String>,
        retried: &mut HashSet<String>,
        retry_set: &mut Vec<String>,
        warnings: &mut Vec<QualityWarning>,
        metrics: &mut ExecutionMetrics,
        wave_failed: &mut usize,
        worst_latency_ms: &mut f64,
        job_error: &mut Option<String>,
    ) -> Result<(), EngineError> {
        *worst_latency_ms = worst_latency_ms.max(attempt.dispatch_latency_ms);

        let Some(task) = tasks_by_key.get_mut(&attempt.task_key) else {
            return Ok(());
        };
        let job_id = task.job_id;

        match attempt.outcome {
            AttemptOutcome::Completed(outcome) => {
                let decision = self.gate.evaluate(
                    &task.task_key,
                    task.task_type,
                    outcome.quality_score,
                    task.retry_count,
                );

                match decision {
                    GateDecision::RetryWithExpansion(hint) => {
                        task.retry_count += 1;
                        task.retry_hint = hint;
                        task.status = TaskStatus::Pending;
                        retried.insert(task.task_key.clone());
                        self.store
                            .update_task(
                                task.id,
                                TaskPatch {
                                    status: Some(TaskStatus::Pending),
                                    retry_count: Some(task.retry_count),
                                    retry_hint: Some(hint),
                                    ..Default::default()
                                },
                            )
                            .await?;
                        retry_set.push(task.task_key.clone());
                    }
                    GateDecision::Accept => {
                        self.accept_task(task, outcome, attempt.duration_seconds, completed, metrics)
                            .await?;
                    }
                    GateDecision::AcceptWithWarning(warning) => {
                        warnings.push(warning);
                        self.accept_task(task, outcome, attempt.duration_seconds, completed, metrics)
                            .await?;
                    }
                }
            }
            AttemptOutcome::Recoverable(message) => {
                if task.retry_count < self.config.max_task_retries {
                    task.retry_count += 1;
                    task.status = TaskStatus::Pending;
                    retried.insert(task.task_key.clone());
                    warn!(
                        %job_id,
                        task_key = %task.task_key,
                        attempt = task.retry_count,
                        error = %message,
                        "transient task failure, re-queueing"
                    );
                    self.store
                        .update_task(
                            task.id,
                            TaskPatch {
                                status: Some(TaskStatus::Pending),
                                retry_count: Some(task.retry_count),
                                error_message: Some(message),
                                ..Default::default()
                            },
                        )
                        .await?;
                    retry_set.push(task.task_key.clone());
                } else {
                    self.fail_task(task, message, attempt.duration_seconds, metrics, failed)
                        .await?;
                    *wave_failed += 1;
                    note_critical_failure(task, job_error);
                }
            }
            AttemptOutcome::Unrecoverable(message) => {
                self.fail_task(task, message, attempt.duration_seconds, metrics, failed)
                    .await?;
                *wave_failed += 1;
                note_critical_failure(task, job_error);
            }
            AttemptOutcome::TimedOut => {
                let message = format!(
                    "timed out: wave deadline of {:?} elapsed",
                    self.config.wave_timeout
                );
                self.fail_task(task, message, attempt.duration_seconds, metrics, failed)
                    .await?;
                *wave_failed += 1;
                note_critical_failure(task, job_error);
            }
        }

        Ok(())
    }

    /// Persist a completed task, its result data, and its artifacts.
    async fn accept_task(
        &self,
        task: &mut Task,
        outcome: TaskOutcome,
        duration_seconds: f64,
        completed: &mut HashSet<String>,
        metrics: &mut ExecutionMetrics,
    ) -> Result<(), EngineError> {
        task.status = TaskStatus::Complete;
        task.quality_score = Some(outcome.quality_score);
        task.completed_at = Some(chrono::Utc::now());
        task.duration_seconds = Some(duration_seconds);
        task.summary = Some(outcome.summary.clone());

        self.store
            .update_task(
                task.id,
                TaskPatch {
                    status: Some(TaskStatus::Complete),
                    quality_score: Some(outcome.quality_score),
                    completed_at: task.completed_at,
                    duration_seconds: Some(duration_seconds),
                    summary: Some(outcome.summary),
                    result_data: Some(outcome.data),
                    ..Default::default()
                },
            )
            .await?;
        if !outcome.artifacts.is_empty() {
            self.store
                .store_artifacts(task.job_id, task.id, &outcome.artifacts)
                .await?;
        }

        completed.insert(task.task_key.clone());
        metrics.task_durations.push(TaskDuration {
            task_key: task.task_key.clone(),
            task_type: task.task_type,
            seconds: duration_seconds,
        });
        self.notifier.task_completed(task.job_id, task).await;
        Ok(())
    }

    /// Persist a terminal task failure.
    async fn fail_task(
        &self,
        task: &mut Task,
        message: String,
        duration_seconds: f64,
        metrics: &mut ExecutionMetrics,
        failed: &mut HashSet<String>,
    ) -> Result<(), EngineError> {
        warn!(
            job_id = %task.job_id,
            task_key = %task.task_key,
            error = %message,
            "task failed terminally"
        );
        task.status = TaskStatus::Failed;
        task.error_message = Some(message.clone());
        task.completed_at = Some(chrono::Utc::now());
        task.duration_seconds = Some(duration_seconds);

        self.store
            .update_task(
                task.id,
                TaskPatch {
                    status: Some(TaskStatus::Failed),
                    completed_at: task.completed_at,
                    duration_seconds: Some(duration_seconds),
                    error_message: Some(message.clone()),
                    ..Default::default()
                },
            )
            .await?;

        failed.insert(task.task_key.clone());
        if duration_seconds > 0.0 {
            metrics.task_durations.push(TaskDuration {
                task_key: task.task_key.clone(),
                task_type: task.task_type,
                seconds: duration_seconds,
            });
        }
        self.notifier.task_failed(task.job_id, task, &message).await;
        Ok(())
    }

    /// Mark a task skipped because a dependency did not complete.
    async fn skip_task(
        &self,
        task: &Task,
        skipped: &mut HashSet<String>,
    ) -> Result<(), EngineError> {
        warn!(
            job_id = %task.job_id,
            task_key = %task.task_key,
            "skipping task: dependency did not complete"
        );
        self.store
            .update_task(
                task.id,
                TaskPatch {
                    status: Some(TaskStatus::Skipped),
                    completed_at: Some(chrono::Utc::now()),
                    error_message: Some("dependency did not complete".to_string()),
                    ..Default::default()
                },
            )
            .await?;
        skipped.insert(task.task_key.clone());
        Ok(())
    }

    /// Mark every non-terminal task with the given terminal status.
    async fn abandon_remaining(
        &self,
        tasks_by_key: &HashMap<String, Task>,
        status: TaskStatus,
    ) -> Result<(), EngineError> {
        for task in tasks_by_key.values() {
            let stored = self.store.load_task(task.id).await?;
            let current = stored.map(|t| t.status).unwrap_or(task.status);
            if !current.is_terminal() {
                self.store
                    .update_task(
                        task.id,
                        TaskPatch {
                            status: Some(status),
                            completed_at: Some(chrono::Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Update job status for the remaining work, if the phase changed.
    async fn advance_phase(
        &self,
        job_id: JobId,
        current: JobStatus,
        graph: &ExecutionGraph,
        wave_index: usize,
        tasks_by_key: &HashMap<String, Task>,
    ) -> Result<JobStatus, EngineError> {
        let mut has_retrieval = false;
        let mut has_non_report = false;
        for wave in &graph.waves[wave_index..] {
            for key in wave {
                if let Some(task) = tasks_by_key.get(key) {
                    match task.task_type.role() {
                        ExecutorRole::Retrieval => {
                            has_retrieval = true;
                            has_non_report = true;
                        }
                        ExecutorRole::Synthesis => has_non_report = true,
                        ExecutorRole::Report => {}
                    }
                }
            }
        }

        let target = if !has_non_report {
            JobStatus::GeneratingReport
        } else if !has_retrieval {
            JobStatus::Synthesizing
        } else {
            JobStatus::Executing
        };

        if target != current && current.can_transition_to(target) {
            debug!(%job_id, from = %current, to = %target, "job phase transition");
            self.store
                .update_job(job_id, JobPatch::status(target))
                .await?;
            Ok(target)
        } else {
            Ok(current)
        }
    }

    async fn update_progress(
        &self,
        job_id: JobId,
        completed: usize,
        total: usize,
    ) -> Result<(), EngineError> {
        let progress = if total > 0 {
            (completed as f32 / total as f32) * 100.0
        } else {
            0.0
        };
        self.store
            .update_job(
                job_id,
                JobPatch {
                    completed_tasks: Some(completed),
                    progress_percentage: Some(progress),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn is_cancelled(&self, job_id: JobId) -> Result<bool, EngineError> {
        let job = self.store.load_job(job_id).await?;
        Ok(matches!(job.map(|j| j.status), Some(JobStatus::Cancelled)))
    }

    /// Fail a job before any wave ran (planning defect path).
    async fn fail_job(
        &self,
        job_id: JobId,
        message: String,
        metrics: ExecutionMetrics,
    ) -> Result<JobResult, EngineError> {
        self.fail_job_with(job_id, message, metrics, Vec::new()).await
    }

    async fn fail_job_with(
        &self,
        job_id: JobId,
        message: String,
        metrics: ExecutionMetrics,
        warnings: Vec<QualityWarning>,
    ) -> Result<JobResult, EngineError> {
        self.finish_job(job_id, JobStatus::Failed, metrics, warnings, Some(message))
            .await
    }

    /// Persist the terminal job state and assemble the result.
    async fn finish_job(
        &self,
        job_id: JobId,
        status: JobStatus,
        metrics: ExecutionMetrics,
        warnings: Vec<QualityWarning>,
        error_message: Option<String>,
    ) -> Result<JobResult, EngineError> {
        let progress = if metrics.total_tasks > 0 {
            (metrics.completed_tasks as f32 / metrics.total_tasks as f32) * 100.0
        } else {
            0.0
        };

        self.store
            .update_job(
                job_id,
                JobPatch {
                    // A cancelled job keeps its Cancelled status.
                    status: if status == JobStatus::Cancelled {
                        None
                    } else {
                        Some(status)
                    },
                    completed_tasks: Some(metrics.completed_tasks),
                    progress_percentage: Some(progress),
                    completed_at: Some(chrono::Utc::now()),
                    error_message: error_message.clone(),
                    execution_metrics: Some(metrics.clone()),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(job) = self.store.load_job(job_id).await? {
            match status {
                JobStatus::Complete => self.notifier.job_completed(&job).await,
                JobStatus::Failed => {
                    self.notifier
                        .job_failed(&job, error_message.as_deref().unwrap_or("job failed"))
                        .await
                }
                _ => {}
            }
        }

        info!(
            %job_id,
            %status,
            completed = metrics.completed_tasks,
            failed = metrics.failed_tasks,
            duration_seconds = metrics.total_duration_seconds,
            parallelism_ratio = metrics.parallelism_ratio,
            "job settled"
        );

        Ok(JobResult {
            job_id,
            status,
            completed_tasks: metrics.completed_tasks,
            failed_tasks: metrics.failed_tasks,
            skipped_tasks: metrics.skipped_tasks,
            warnings,
            metrics,
            error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NullNotifier;
    use harness_core::{Artifact, ArtifactKind, RetryHint, TaskType};
    use harness_storage::MemoryStore;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::{Barrier, Mutex};

    /// One scripted behavior for a task attempt.
    #[derive(Clone)]
    enum Behavior {
        Ok(f64),
        OkAfter(f64, Duration),
        Recoverable(&'static str),
        Unrecoverable(&'static str),
    }

    /// What the executor observed about one attempt.
    #[derive(Debug, Clone)]
    struct CallRecord {
        task_key: String,
        retry_count: u32,
        hint: RetryHint,
    }

    /// Hand-scripted executor: plays back a per-task behavior sequence and
    /// records every call it receives.
    struct ScriptedExecutor {
        scripts: Mutex<HashMap<String, VecDeque<Behavior>>>,
        calls: Mutex<Vec<CallRecord>>,
        // Checks the store to assert dependencies completed before running.
        store: Option<Arc<dyn Store>>,
        violations: Mutex<Vec<String>>,
        // All participants rendezvous here before returning, proving
        // simultaneous dispatch.
        barrier: Option<Arc<Barrier>>,
        // Cancels the job when this task runs, simulating a user cancel
        // arriving mid-wave.
        cancel_on: Option<String>,
        emit_artifacts: bool,
    }

    impl ScriptedExecutor {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                store: None,
                violations: Mutex::new(Vec::new()),
                barrier: None,
                cancel_on: None,
                emit_artifacts: false,
            }
        }

        fn script(self, task_key: &str, behaviors: Vec<Behavior>) -> Self {
            {
                let mut scripts = self.scripts.try_lock().expect("unlocked during setup");
                scripts.insert(task_key.to_string(), behaviors.into());
            }
            self
        }

        fn with_store(mut self, store: Arc<dyn Store>) -> Self {
            self.store = Some(store);
            self
        }

        fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
            self.barrier = Some(barrier);
            self
        }

        fn with_cancel_on(mut self, task_key: &str) -> Self {
            self.cancel_on = Some(task_key.to_string());
            self
        }

        fn with_artifacts(mut self) -> Self {
            self.emit_artifacts = true;
            self
        }

        async fn calls(&self) -> Vec<CallRecord> {
            self.calls.lock().await.clone()
        }

        async fn violations(&self) -> Vec<String> {
            self.violations.lock().await.clone()
        }

        fn outcome(&self, task: &Task, score: f64) -> TaskOutcome {
            let artifacts = if self.emit_artifacts {
                vec![Artifact::new(
                    task.job_id,
                    task.id,
                    ArtifactKind::Passage,
                    format!("{} output", task.task_key),
                    "content",
                )
                .with_quality_score(score)]
            } else {
                Vec::new()
            };
            TaskOutcome {
                summary: format!("{} done", task.task_key),
                data: serde_json::json!({ "task": task.task_key }),
                artifacts,
                quality_score: score,
            }
        }
    }

    #[async_trait::async_trait]
    impl crate::registry::TaskExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            task: &Task,
            job_id: JobId,
        ) -> Result<TaskOutcome, ExecutorError> {
            self.calls.lock().await.push(CallRecord {
                task_key: task.task_key.clone(),
                retry_count: task.retry_count,
                hint: task.retry_hint,
            });

            if let Some(store) = &self.store {
                for dep in &task.depends_on {
                    let dep_complete = store
                        .list_tasks(job_id)
                        .await
                        .ok()
                        .map(|tasks| {
                            tasks
                                .iter()
                                .any(|t| t.task_key == *dep && t.status == TaskStatus::Complete)
                        })
                        .unwrap_or(false);
                    if !dep_complete {
                        self.violations
                            .lock()
                            .await
                            .push(format!("{} ran before {}", task.task_key, dep));
                    }
                }

                if self.cancel_on.as_deref() == Some(task.task_key.as_str()) {
                    store
                        .update_job(job_id, JobPatch::status(JobStatus::Cancelled))
                        .await
                        .ok();
                }
            }

            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }

            let behavior = {
                let mut scripts = self.scripts.lock().await;
                scripts
                    .get_mut(&task.task_key)
                    .and_then(|queue| queue.pop_front())
                    .unwrap_or(Behavior::Ok(0.95))
            };

            match behavior {
                Behavior::Ok(score) => Ok(self.outcome(task, score)),
                Behavior::OkAfter(score, delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(self.outcome(task, score))
                }
                Behavior::Recoverable(message) => {
                    Err(ExecutorError::Recoverable(message.to_string()))
                }
                Behavior::Unrecoverable(message) => {
                    Err(ExecutorError::Unrecoverable(message.to_string()))
                }
            }
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig::default()
            .with_wave_timeout(Duration::from_secs(5))
            .with_retry_backoff(Duration::from_millis(10), 1.5)
    }

    fn engine_with(store: Arc<dyn Store>, executor: Arc<ScriptedExecutor>) -> Engine {
        Engine::new(
            store,
            ExecutorRegistry::uniform(executor),
            Arc::new(NullNotifier),
        )
        .with_config(fast_config())
    }

    /// The six-task research plan: three retrievals, a synthesis over them,
    /// then fact-check and report in parallel.
    fn research_plan(job_id: JobId) -> Vec<Task> {
        let deps = |keys: &[&str]| keys.iter().map(|k| k.to_string()).collect::<Vec<_>>();
        vec![
            Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![]).with_sequence_order(0),
            Task::new(job_id, "retrieval_b", TaskType::RetrievalVector, vec![])
                .with_sequence_order(1),
            Task::new(job_id, "retrieval_c", TaskType::RetrievalGraph, vec![])
                .with_sequence_order(2),
            Task::new(
                job_id,
                "synthesis",
                TaskType::Synthesis,
                deps(&["retrieval_a", "retrieval_b", "retrieval_c"]),
            )
            .with_sequence_order(3),
            Task::new(job_id, "fact_check", TaskType::FactCheck, deps(&["synthesis"]))
                .with_sequence_order(4),
            Task::new(
                job_id,
                "write_report",
                TaskType::WriteReport,
                deps(&["synthesis"]),
            )
            .with_sequence_order(5),
        ]
    }

    #[tokio::test]
    async fn test_research_plan_runs_to_completion() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new().with_artifacts());
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("history of rust");
        let job_id = job.id;
        let result = engine.submit(job, research_plan(job_id)).await.unwrap();

        assert_eq!(result.status, JobStatus::Complete);
        assert_eq!(result.completed_tasks, 6);
        assert_eq!(result.failed_tasks, 0);
        assert!(result.warnings.is_empty());

        assert_eq!(result.metrics.total_tasks, 6);
        assert_eq!(result.metrics.wave_count, 3);
        assert_eq!(result.metrics.max_parallel, 3);
        assert!((result.metrics.parallelism_potential - 0.5).abs() < 1e-9);

        let stored = store.load_job(job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Complete);
        assert_eq!(stored.completed_tasks, 6);
        assert!((stored.progress_percentage - 100.0).abs() < 1e-3);
        assert!(stored.execution_metrics.is_some());

        // One artifact per completed task was persisted.
        assert_eq!(store.list_artifacts(job_id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_dependencies_complete_before_dependents_run() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor =
            Arc::new(ScriptedExecutor::new().with_store(Arc::clone(&store)));
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let result = engine.submit(job, research_plan(job_id)).await.unwrap();

        assert_eq!(result.status, JobStatus::Complete);
        assert!(executor.violations().await.is_empty());

        // Wave barrier: every retrieval call precedes the synthesis call.
        let calls = executor.calls().await;
        let position = |key: &str| calls.iter().position(|c| c.task_key == key).unwrap();
        assert!(position("retrieval_a") < position("synthesis"));
        assert!(position("retrieval_b") < position("synthesis"));
        assert!(position("retrieval_c") < position("synthesis"));
        assert!(position("synthesis") < position("write_report"));
    }

    #[tokio::test]
    async fn test_full_wave_dispatches_simultaneously() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        // All five tasks must rendezvous before any can return; a serialized
        // dispatch would deadlock until the wave timeout and fail the job.
        let barrier = Arc::new(Barrier::new(5));
        let executor = Arc::new(ScriptedExecutor::new().with_barrier(barrier));
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks: Vec<Task> = (0..5)
            .map(|i| {
                Task::new(job_id, format!("retrieval_{}", i), TaskType::RetrievalWeb, vec![])
                    .with_sequence_order(i as u32)
            })
            .collect();

        let result = engine.submit(job, tasks).await.unwrap();

        assert_eq!(result.status, JobStatus::Complete);
        assert_eq!(result.completed_tasks, 5);
        assert_eq!(result.metrics.max_parallel, 5);
        assert_eq!(result.metrics.wave_count, 1);
    }

    #[tokio::test]
    async fn test_oversized_wave_splits_into_micro_batches() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new());
        let engine = Engine::new(
            Arc::clone(&store),
            ExecutorRegistry::uniform(Arc::clone(&executor) as Arc<dyn crate::registry::TaskExecutor>),
            Arc::new(NullNotifier),
        )
        .with_config(fast_config().with_max_concurrent_per_job(2));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks: Vec<Task> = (0..5)
            .map(|i| {
                Task::new(job_id, format!("retrieval_{}", i), TaskType::RetrievalWeb, vec![])
                    .with_sequence_order(i as u32)
            })
            .collect();

        let result = engine.submit(job, tasks).await.unwrap();

        // Excess tasks defer to following micro-batches instead of dropping.
        assert_eq!(result.status, JobStatus::Complete);
        assert_eq!(result.completed_tasks, 5);
        assert_eq!(result.metrics.max_parallel, 2);
        assert_eq!(executor.calls().await.len(), 5);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new().script(
            "retrieval_a",
            vec![
                Behavior::Recoverable("connection reset"),
                Behavior::Recoverable("connection reset"),
                Behavior::Ok(0.9),
            ],
        ));
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![
            Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![]),
            Task::new(job_id, "retrieval_b", TaskType::RetrievalWeb, vec![])
                .with_sequence_order(1),
        ];

        let result = engine.submit(job, tasks).await.unwrap();

        assert_eq!(result.status, JobStatus::Complete);
        assert_eq!(result.completed_tasks, 2);
        assert_eq!(result.metrics.retried_tasks, 1);

        let stored = store.list_tasks(job_id).await.unwrap();
        let task_a = stored.iter().find(|t| t.task_key == "retrieval_a").unwrap();
        assert_eq!(task_a.status, TaskStatus::Complete);
        assert_eq!(task_a.retry_count, 2);
        assert_eq!(executor.calls().await.len(), 4);
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails_task_but_not_job() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new().script(
            "retrieval_a",
            vec![
                Behavior::Recoverable("flaky"),
                Behavior::Recoverable("flaky"),
                Behavior::Recoverable("flaky"),
            ],
        ));
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![
            Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![]),
            Task::new(job_id, "retrieval_b", TaskType::RetrievalWeb, vec![])
                .with_sequence_order(1),
        ];

        let result = engine.submit(job, tasks).await.unwrap();

        // One failure in a two-task wave is within the abort ratio.
        assert_eq!(result.status, JobStatus::Complete);
        assert_eq!(result.failed_tasks, 1);
        assert_eq!(result.completed_tasks, 1);

        let stored = store.list_tasks(job_id).await.unwrap();
        let task_a = stored.iter().find(|t| t.task_key == "retrieval_a").unwrap();
        assert_eq!(task_a.status, TaskStatus::Failed);
        assert_eq!(task_a.retry_count, 2);
        assert!(task_a.error_message.as_deref().unwrap().contains("flaky"));
    }

    #[tokio::test]
    async fn test_quality_retry_requeues_with_expanded_query() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(
            ScriptedExecutor::new()
                .script("retrieval_a", vec![Behavior::Ok(0.5), Behavior::Ok(0.9)]),
        );
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![])];

        let result = engine.submit(job, tasks).await.unwrap();

        assert_eq!(result.status, JobStatus::Complete);
        assert!(result.warnings.is_empty());

        let calls = executor.calls().await;
        assert_eq!(calls.len(), 2);
        // First attempt carries no hint; the gate re-queue sets one.
        assert!(!calls[0].hint.expand_query);
        assert!(calls[1].hint.expand_query);
        assert_eq!(calls[1].hint.quality_target, Some(0.75));
        assert_eq!(calls[1].retry_count, 1);

        let stored = store.list_tasks(job_id).await.unwrap();
        assert_eq!(stored[0].status, TaskStatus::Complete);
        assert_eq!(stored[0].retry_count, 1);
        assert_eq!(stored[0].quality_score, Some(0.9));
    }

    #[tokio::test]
    async fn test_quality_retries_exhausted_accepts_with_warning() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new().script(
            "synthesis",
            vec![Behavior::Ok(0.5), Behavior::Ok(0.55), Behavior::Ok(0.6)],
        ));
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![Task::new(job_id, "synthesis", TaskType::Synthesis, vec![])];

        let result = engine.submit(job, tasks).await.unwrap();

        // A persistently low-quality task never blocks the job.
        assert_eq!(result.status, JobStatus::Complete);
        assert_eq!(result.completed_tasks, 1);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].task_key, "synthesis");
        assert_eq!(result.metrics.quality_warnings, 1);
        assert_eq!(executor.calls().await.len(), 3);

        let stored = store.list_tasks(job_id).await.unwrap();
        assert_eq!(stored[0].status, TaskStatus::Complete);
        assert_eq!(stored[0].quality_score, Some(0.6));
    }

    #[tokio::test]
    async fn test_critical_task_failure_fails_job() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new().script(
            "write_report",
            vec![Behavior::Unrecoverable("model refused")],
        ));
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![
            Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![]),
            Task::new(
                job_id,
                "write_report",
                TaskType::WriteReport,
                vec!["retrieval_a".to_string()],
            )
            .with_sequence_order(1),
        ];

        let result = engine.submit(job, tasks).await.unwrap();

        assert_eq!(result.status, JobStatus::Failed);
        let message = result.error_message.unwrap();
        assert!(message.contains("write_report"));
        assert!(message.contains("model refused"));

        let stored = store.load_job(job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error_message.unwrap().contains("write_report"));
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_any_executor_runs() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new());
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![
            Task::new(job_id, "a", TaskType::RetrievalWeb, vec!["b".to_string()]),
            Task::new(job_id, "b", TaskType::RetrievalWeb, vec!["a".to_string()])
                .with_sequence_order(1),
        ];

        let result = engine.submit(job, tasks).await.unwrap();

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result
            .error_message
            .unwrap()
            .contains("circular dependency"));
        assert!(executor.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_downstream_of_failed_task_is_skipped() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new().script(
            "retrieval_a",
            vec![
                Behavior::Unrecoverable("bad input"),
            ],
        ));
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![
            Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![]),
            Task::new(job_id, "retrieval_b", TaskType::RetrievalWeb, vec![])
                .with_sequence_order(1),
            Task::new(
                job_id,
                "synthesis",
                TaskType::Synthesis,
                vec!["retrieval_a".to_string()],
            )
            .with_sequence_order(2),
        ];

        let result = engine.submit(job, tasks).await.unwrap();

        assert_eq!(result.status, JobStatus::Complete);
        assert_eq!(result.failed_tasks, 1);
        assert_eq!(result.skipped_tasks, 1);

        let stored = store.list_tasks(job_id).await.unwrap();
        let synthesis = stored.iter().find(|t| t.task_key == "synthesis").unwrap();
        assert_eq!(synthesis.status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn test_wave_timeout_marks_tasks_failed() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new().script(
            "retrieval_a",
            vec![Behavior::OkAfter(0.9, Duration::from_secs(10))],
        ));
        let engine = Engine::new(
            Arc::clone(&store),
            ExecutorRegistry::uniform(Arc::clone(&executor) as Arc<dyn crate::registry::TaskExecutor>),
            Arc::new(NullNotifier),
        )
        .with_config(
            fast_config().with_wave_timeout(Duration::from_millis(100)),
        );

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![])];

        let result = engine.submit(job, tasks).await.unwrap();

        // The only task in the wave failed, so the wave abort ratio trips.
        assert_eq!(result.status, JobStatus::Failed);

        let stored = store.list_tasks(job_id).await.unwrap();
        assert_eq!(stored[0].status, TaskStatus::Failed);
        assert!(stored[0].error_message.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancel_mid_wave_abandons_results() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(
            ScriptedExecutor::new()
                .with_store(Arc::clone(&store))
                .with_cancel_on("retrieval_a"),
        );
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![
            Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![]),
            Task::new(
                job_id,
                "synthesis",
                TaskType::Synthesis,
                vec!["retrieval_a".to_string()],
            )
            .with_sequence_order(1),
        ];

        let result = engine.submit(job, tasks).await.unwrap();

        assert_eq!(result.status, JobStatus::Cancelled);
        assert_eq!(result.completed_tasks, 0);

        let stored = store.list_tasks(job_id).await.unwrap();
        // The in-flight result was discarded, the pending task never ran.
        for task in &stored {
            assert_eq!(task.status, TaskStatus::Cancelled, "{}", task.task_key);
        }
        assert_eq!(executor.calls().await.len(), 1);

        let stored_job = store.load_job(job_id).await.unwrap().unwrap();
        assert_eq!(stored_job.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_wave_majority_failure_aborts_job() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(
            ScriptedExecutor::new()
                .script("retrieval_a", vec![Behavior::Unrecoverable("boom")])
                .script("retrieval_b", vec![Behavior::Unrecoverable("boom")]),
        );
        let engine = engine_with(Arc::clone(&store), Arc::clone(&executor));

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![
            Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![]),
            Task::new(job_id, "retrieval_b", TaskType::RetrievalWeb, vec![])
                .with_sequence_order(1),
            Task::new(job_id, "retrieval_c", TaskType::RetrievalWeb, vec![])
                .with_sequence_order(2),
        ];

        let result = engine.submit(job, tasks).await.unwrap();

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result
            .error_message
            .unwrap()
            .contains("too many task failures"));
    }

    struct PhaseProbe {
        store: Arc<dyn Store>,
        observed: Mutex<Vec<(String, JobStatus)>>,
    }

    #[async_trait::async_trait]
    impl crate::registry::TaskExecutor for PhaseProbe {
        async fn execute(
            &self,
            task: &Task,
            job_id: JobId,
        ) -> Result<TaskOutcome, ExecutorError> {
            if let Ok(Some(job)) = self.store.load_job(job_id).await {
                self.observed
                    .lock()
                    .await
                    .push((task.task_key.clone(), job.status));
            }
            Ok(TaskOutcome {
                summary: String::new(),
                data: serde_json::Value::Null,
                artifacts: Vec::new(),
                quality_score: 0.95,
            })
        }
    }

    fn phase_probe_engine(store: &Arc<dyn Store>) -> (Engine, Arc<PhaseProbe>) {
        let probe = Arc::new(PhaseProbe {
            store: Arc::clone(store),
            observed: Mutex::new(Vec::new()),
        });
        let engine = Engine::new(
            Arc::clone(store),
            ExecutorRegistry::uniform(Arc::clone(&probe) as Arc<dyn crate::registry::TaskExecutor>),
            Arc::new(NullNotifier),
        )
        .with_config(fast_config());
        (engine, probe)
    }

    #[tokio::test]
    async fn test_job_phase_follows_remaining_work() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (engine, probe) = phase_probe_engine(&store);

        let job = Job::new("q");
        let job_id = job.id;
        let result = engine.submit(job, research_plan(job_id)).await.unwrap();
        assert_eq!(result.status, JobStatus::Complete);

        let observed = probe.observed.lock().await.clone();
        let phase_of = |key: &str| {
            observed
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, status)| *status)
                .unwrap()
        };
        assert_eq!(phase_of("retrieval_a"), JobStatus::Executing);
        assert_eq!(phase_of("synthesis"), JobStatus::Synthesizing);
        // fact_check shares the final wave, keeping it out of report-only phase
        assert_eq!(phase_of("write_report"), JobStatus::Synthesizing);
    }

    #[tokio::test]
    async fn test_report_only_tail_enters_generating_report() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (engine, probe) = phase_probe_engine(&store);

        let job = Job::new("q");
        let job_id = job.id;
        let tasks = vec![
            Task::new(job_id, "retrieval_a", TaskType::RetrievalWeb, vec![]),
            Task::new(
                job_id,
                "write_report",
                TaskType::WriteReport,
                vec!["retrieval_a".to_string()],
            )
            .with_sequence_order(1),
        ];

        let result = engine.submit(job, tasks).await.unwrap();
        assert_eq!(result.status, JobStatus::Complete);

        let observed = probe.observed.lock().await.clone();
        let report_phase = observed
            .iter()
            .find(|(k, _)| k == "write_report")
            .map(|(_, status)| *status)
            .unwrap();
        assert_eq!(report_phase, JobStatus::GeneratingReport);
    }

    #[tokio::test]
    async fn test_run_job_on_unknown_job_is_an_error() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new());
        let engine = engine_with(store, executor);

        let err = engine.run_job(JobId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::JobNotFound(_)));
    }
}
