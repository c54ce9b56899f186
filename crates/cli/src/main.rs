//! Harness CLI - run and inspect research task plans.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, Level};

use harness_core::{
    Artifact, ArtifactKind, ExecutorRole, Job, JobId, Task, TaskOutcome, TaskType,
};
use harness_engine::{
    Engine, EngineConfig, ExecutionGraph, ExecutorError, ExecutorRegistry, LogNotifier,
    TaskExecutor,
};
use harness_perf::PerformanceMonitor;
use harness_storage::{JsonStore, Store};

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Concurrent research task execution engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a plan file and print its execution waves
    Plan {
        /// Path to the plan JSON file
        plan: PathBuf,
    },
    /// Execute a plan with simulated executors
    Run {
        /// Path to the plan JSON file
        plan: PathBuf,
        /// Storage directory
        #[arg(long, default_value = ".harness")]
        data_dir: PathBuf,
        /// Per-job concurrency cap
        #[arg(long, default_value = "5")]
        max_concurrent: usize,
        /// Wave timeout in seconds
        #[arg(long, default_value = "300")]
        wave_timeout: u64,
    },
    /// Show stored metrics, SLA report, and bottlenecks for a job
    Metrics {
        /// Job ID
        job_id: String,
        /// Storage directory
        #[arg(long, default_value = ".harness")]
        data_dir: PathBuf,
    },
}

/// One task entry in a plan file.
#[derive(Debug, Clone, Deserialize)]
struct PlanTask {
    task_key: String,
    task_type: TaskType,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    description: String,
    /// Simulated execution time in milliseconds
    #[serde(default = "default_simulate_ms")]
    simulate_ms: u64,
    /// Simulated self-reported quality score
    #[serde(default = "default_simulate_quality")]
    simulate_quality: f64,
}

fn default_simulate_ms() -> u64 {
    100
}

fn default_simulate_quality() -> f64 {
    0.9
}

/// A planned research job.
#[derive(Debug, Clone, Deserialize)]
struct PlanFile {
    query: String,
    #[serde(default)]
    context: String,
    tasks: Vec<PlanTask>,
}

impl PlanFile {
    fn load(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading plan file {}", path.display()))?;
        let plan: PlanFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing plan file {}", path.display()))?;
        Ok(plan)
    }

    fn tasks_for(&self, job_id: JobId) -> Vec<Task> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Task::new(job_id, t.task_key.clone(), t.task_type, t.depends_on.clone())
                    .with_sequence_order(i as u32)
                    .with_description(t.description.clone())
            })
            .collect()
    }
}

/// Stand-in executor for dry runs: sleeps for the configured time and
/// reports the configured quality score. An expanded-query retry improves
/// the score, the way a broadened retrieval usually would.
struct SimulatedExecutor {
    behaviors: HashMap<String, (u64, f64)>,
}

impl SimulatedExecutor {
    fn from_plan(plan: &PlanFile) -> Self {
        Self {
            behaviors: plan
                .tasks
                .iter()
                .map(|t| (t.task_key.clone(), (t.simulate_ms, t.simulate_quality)))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task, job_id: JobId) -> Result<TaskOutcome, ExecutorError> {
        let (sleep_ms, base_quality) = self
            .behaviors
            .get(&task.task_key)
            .copied()
            .unwrap_or((default_simulate_ms(), default_simulate_quality()));

        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;

        let quality_score = if task.retry_hint.expand_query {
            (base_quality + 0.15 * task.retry_count as f64).min(1.0)
        } else {
            base_quality
        };

        let kind = match task.task_type.role() {
            ExecutorRole::Retrieval => ArtifactKind::Passage,
            ExecutorRole::Synthesis => ArtifactKind::Finding,
            ExecutorRole::Report => match task.task_type {
                TaskType::WriteSection => ArtifactKind::Section,
                _ => ArtifactKind::Report,
            },
        };

        let artifact = Artifact::new(
            job_id,
            task.id,
            kind,
            format!("{} output", task.task_key),
            format!("simulated {} result", task.task_type),
        )
        .with_quality_score(quality_score);

        Ok(TaskOutcome {
            summary: format!("simulated {} in {}ms", task.task_key, sleep_ms),
            data: serde_json::json!({ "simulated": true, "sleep_ms": sleep_ms }),
            artifacts: vec![artifact],
            quality_score,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { plan } => {
            let plan = PlanFile::load(&plan)?;
            let tasks = plan.tasks_for(JobId::new());
            let graph = ExecutionGraph::build(&tasks)?;

            println!("Plan: {}", plan.query);
            println!(
                "  {} tasks, {} waves, parallelism potential {:.2}",
                graph.total_tasks,
                graph.wave_count(),
                graph.parallelism_potential
            );
            for (i, wave) in graph.waves.iter().enumerate() {
                println!("  wave {}: {}", i + 1, wave.join(", "));
            }
        }
        Commands::Run {
            plan,
            data_dir,
            max_concurrent,
            wave_timeout,
        } => {
            let plan = PlanFile::load(&plan)?;
            let store: Arc<dyn Store> = Arc::new(JsonStore::new(&data_dir).await?);

            let executor = Arc::new(SimulatedExecutor::from_plan(&plan));
            let engine = Engine::new(
                Arc::clone(&store),
                ExecutorRegistry::uniform(executor),
                Arc::new(LogNotifier),
            )
            .with_config(
                EngineConfig::default()
                    .with_max_concurrent_per_job(max_concurrent)
                    .with_wave_timeout(Duration::from_secs(wave_timeout)),
            );

            let job = Job::new(plan.query.clone()).with_context(plan.context.clone());
            let job_id = job.id;
            let tasks = plan.tasks_for(job_id);

            info!(%job_id, task_count = tasks.len(), "submitting job");
            let result = engine.submit(job, tasks).await?;

            println!("Job {} settled: {}", result.job_id, result.status);
            println!(
                "  {} complete, {} failed, {} skipped",
                result.completed_tasks, result.failed_tasks, result.skipped_tasks
            );
            println!(
                "  wall {:.2}s | parallelism ratio {:.2} (potential {:.2}) | max parallel {}",
                result.metrics.total_duration_seconds,
                result.metrics.parallelism_ratio,
                result.metrics.parallelism_potential,
                result.metrics.max_parallel,
            );
            for warning in &result.warnings {
                println!("  quality warning: {}", warning);
            }
            if let Some(error) = &result.error_message {
                println!("  error: {}", error);
            }
        }
        Commands::Metrics { job_id, data_dir } => {
            let job_id: JobId = job_id
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid job ID"))?;
            let store: Arc<dyn Store> = Arc::new(JsonStore::new(&data_dir).await?);
            let monitor = PerformanceMonitor::new(Arc::clone(&store));

            let metrics = monitor.collect(job_id).await?;
            let sla = monitor.check_sla(&metrics);
            let bottlenecks = monitor.identify_bottlenecks(&metrics);

            println!("Job {}", job_id);
            println!(
                "  {} tasks | {} complete | {} failed | {} retried | {} waves",
                metrics.total_tasks,
                metrics.completed_tasks,
                metrics.failed_tasks,
                metrics.retried_tasks,
                metrics.wave_count,
            );
            println!(
                "  wall {:.2}s | mean task {:.2}s | parallelism ratio {:.2}",
                metrics.total_duration_seconds,
                metrics.avg_task_duration_seconds,
                metrics.parallelism_ratio,
            );
            println!(
                "  SLA: {} tier, target {:.0}s, {} (margin {:+.1}s)",
                sla.tier,
                sla.target_seconds,
                if sla.compliant { "met" } else { "MISSED" },
                sla.margin_seconds,
            );

            if bottlenecks.is_empty() {
                println!("  no bottlenecks identified");
            } else {
                println!("  bottlenecks:");
                for bottleneck in &bottlenecks {
                    println!("    - {}", bottleneck);
                }
            }
        }
    }

    Ok(())
}
