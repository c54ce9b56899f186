//! Execution graph - partitions a task plan into dependency waves.
//!
//! Tasks within a wave have no unresolved dependencies on each other and can
//! be dispatched in parallel; wave N must settle fully before wave N+1 is
//! considered.

use std::collections::{HashMap, HashSet};

use harness_core::Task;

/// A plan that cannot be scheduled. Planning defects are fatal and never
/// retried; the plan must be fixed upstream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    /// The dependency graph contains a cycle.
    #[error("circular dependency among tasks: {}", tasks.join(", "))]
    CircularDependency {
        /// Task keys involved in (or downstream of) the cycle, sorted.
        tasks: Vec<String>,
    },

    /// A task references a dependency key that is not in the plan.
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// The referencing task.
        task: String,
        /// The missing dependency key.
        dependency: String,
    },

    /// Two tasks share the same task key.
    #[error("duplicate task key: '{key}'")]
    DuplicateTaskKey {
        /// The duplicated key.
        key: String,
    },
}

/// Waves of mutually independent tasks, derived once per job run.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    /// Ordered waves; each wave lists task keys sorted by sequence hint.
    pub waves: Vec<Vec<String>>,
    /// Total tasks in the plan.
    pub total_tasks: usize,
    /// Size of the widest wave.
    pub max_wave_size: usize,
    /// max_wave_size / total_tasks: the theoretical parallelism ceiling.
    pub parallelism_potential: f64,
}

impl ExecutionGraph {
    /// Partition a task plan into execution waves (Kahn's algorithm).
    ///
    /// Repeatedly collects every task whose remaining in-degree is zero into
    /// the next wave, then releases its dependents. If no task is free while
    /// tasks remain, the plan contains a cycle.
    pub fn build(tasks: &[Task]) -> Result<Self, GraphError> {
        let mut order: HashMap<&str, u32> = HashMap::with_capacity(tasks.len());
        for task in tasks {
            if order.insert(&task.task_key, task.sequence_order).is_some() {
                return Err(GraphError::DuplicateTaskKey {
                    key: task.task_key.clone(),
                });
            }
        }

        let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in tasks {
            let mut seen: HashSet<&str> = HashSet::new();
            for dep in &task.depends_on {
                if !order.contains_key(dep.as_str()) {
                    return Err(GraphError::UnknownDependency {
                        task: task.task_key.clone(),
                        dependency: dep.clone(),
                    });
                }
                // A repeated dependency entry counts once.
                if seen.insert(dep.as_str()) {
                    dependents
                        .entry(dep.as_str())
                        .or_default()
                        .push(&task.task_key);
                }
            }
            in_degree.insert(&task.task_key, seen.len());
        }

        let mut waves: Vec<Vec<String>> = Vec::new();
        let mut remaining = tasks.len();

        while remaining > 0 {
            let mut wave: Vec<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree == 0)
                .map(|(key, _)| *key)
                .collect();

            if wave.is_empty() {
                let mut stuck: Vec<String> =
                    in_degree.keys().map(|k| (*k).to_string()).collect();
                stuck.sort();
                return Err(GraphError::CircularDependency { tasks: stuck });
            }

            wave.sort_by_key(|key| (order[key], *key));

            for key in &wave {
                in_degree.remove(key);
                if let Some(deps) = dependents.get(key) {
                    for dependent in deps {
                        if let Some(degree) = in_degree.get_mut(dependent) {
                            *degree -= 1;
                        }
                    }
                }
            }

            remaining -= wave.len();
            waves.push(wave.into_iter().map(|k| k.to_string()).collect());
        }

        let total_tasks = tasks.len();
        let max_wave_size = waves.iter().map(|w| w.len()).max().unwrap_or(0);
        let parallelism_potential = if total_tasks > 0 {
            max_wave_size as f64 / total_tasks as f64
        } else {
            0.0
        };

        Ok(Self {
            waves,
            total_tasks,
            max_wave_size,
            parallelism_potential,
        })
    }

    /// Number of waves.
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_core::{JobId, TaskType};

    fn plan(specs: &[(&str, TaskType, &[&str])]) -> Vec<Task> {
        let job_id = JobId::new();
        specs
            .iter()
            .enumerate()
            .map(|(i, (key, ty, deps))| {
                Task::new(
                    job_id,
                    *key,
                    *ty,
                    deps.iter().map(|d| d.to_string()).collect(),
                )
                .with_sequence_order(i as u32)
            })
            .collect()
    }

    #[test]
    fn test_empty_plan_builds_no_waves() {
        let graph = ExecutionGraph::build(&[]).unwrap();
        assert!(graph.waves.is_empty());
        assert_eq!(graph.total_tasks, 0);
        assert_eq!(graph.parallelism_potential, 0.0);
    }

    #[test]
    fn test_independent_tasks_form_one_wave() {
        let tasks = plan(&[
            ("a", TaskType::RetrievalWeb, &[]),
            ("b", TaskType::RetrievalVector, &[]),
            ("c", TaskType::RetrievalGraph, &[]),
        ]);
        let graph = ExecutionGraph::build(&tasks).unwrap();

        assert_eq!(graph.wave_count(), 1);
        assert_eq!(graph.waves[0], vec!["a", "b", "c"]);
        assert_eq!(graph.max_wave_size, 3);
        assert!((graph.parallelism_potential - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_research_plan_produces_three_waves() {
        // retrieval fan-out, one synthesis, fact-check and report in parallel
        let tasks = plan(&[
            ("retrieval_a", TaskType::RetrievalWeb, &[]),
            ("retrieval_b", TaskType::RetrievalVector, &[]),
            ("retrieval_c", TaskType::RetrievalGraph, &[]),
            (
                "synthesis",
                TaskType::Synthesis,
                &["retrieval_a", "retrieval_b", "retrieval_c"],
            ),
            ("fact_check", TaskType::FactCheck, &["synthesis"]),
            ("write_report", TaskType::WriteReport, &["synthesis"]),
        ]);
        let graph = ExecutionGraph::build(&tasks).unwrap();

        assert_eq!(graph.total_tasks, 6);
        assert_eq!(graph.wave_count(), 3);
        assert_eq!(
            graph.waves[0],
            vec!["retrieval_a", "retrieval_b", "retrieval_c"]
        );
        assert_eq!(graph.waves[1], vec!["synthesis"]);
        assert_eq!(graph.waves[2], vec!["fact_check", "write_report"]);
        assert_eq!(graph.max_wave_size, 3);
        assert!((graph.parallelism_potential - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_waves_cover_input_exactly_once() {
        let tasks = plan(&[
            ("a", TaskType::RetrievalWeb, &[]),
            ("b", TaskType::RetrievalWeb, &["a"]),
            ("c", TaskType::Synthesis, &["a"]),
            ("d", TaskType::Synthesis, &["b", "c"]),
            ("e", TaskType::WriteReport, &["d"]),
        ]);
        let graph = ExecutionGraph::build(&tasks).unwrap();

        let mut seen: Vec<String> = graph.waves.iter().flatten().cloned().collect();
        assert_eq!(seen.len(), tasks.len());
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), tasks.len());
    }

    #[test]
    fn test_two_task_cycle_is_rejected() {
        let tasks = plan(&[
            ("a", TaskType::RetrievalWeb, &["b"]),
            ("b", TaskType::RetrievalWeb, &["a"]),
        ]);
        let err = ExecutionGraph::build(&tasks).unwrap_err();

        match err {
            GraphError::CircularDependency { tasks } => {
                assert_eq!(tasks, vec!["a", "b"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_behind_valid_prefix_is_rejected() {
        let tasks = plan(&[
            ("root", TaskType::RetrievalWeb, &[]),
            ("x", TaskType::Synthesis, &["root", "y"]),
            ("y", TaskType::Synthesis, &["x"]),
        ]);
        let err = ExecutionGraph::build(&tasks).unwrap_err();
        assert!(matches!(err, GraphError::CircularDependency { .. }));
        assert!(err.to_string().contains("x"));
        assert!(err.to_string().contains("y"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let tasks = plan(&[("a", TaskType::RetrievalWeb, &["a"])]);
        let err = ExecutionGraph::build(&tasks).unwrap_err();
        assert!(matches!(err, GraphError::CircularDependency { .. }));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let tasks = plan(&[("a", TaskType::RetrievalWeb, &["ghost"])]);
        let err = ExecutionGraph::build(&tasks).unwrap_err();

        match err {
            GraphError::UnknownDependency { task, dependency } => {
                assert_eq!(task, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected unknown dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_task_key_is_rejected() {
        let tasks = plan(&[
            ("a", TaskType::RetrievalWeb, &[]),
            ("a", TaskType::Synthesis, &[]),
        ]);
        let err = ExecutionGraph::build(&tasks).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateTaskKey { key } if key == "a"));
    }

    #[test]
    fn test_repeated_dependency_entry_counts_once() {
        let mut tasks = plan(&[("a", TaskType::RetrievalWeb, &[])]);
        let job_id = tasks[0].job_id;
        tasks.push(
            Task::new(
                job_id,
                "b",
                TaskType::Synthesis,
                vec!["a".to_string(), "a".to_string()],
            )
            .with_sequence_order(1),
        );

        let graph = ExecutionGraph::build(&tasks).unwrap();
        assert_eq!(graph.wave_count(), 2);
        assert_eq!(graph.waves[1], vec!["b"]);
    }

    #[test]
    fn test_wave_order_follows_sequence_hint() {
        let job_id = JobId::new();
        let tasks = vec![
            Task::new(job_id, "zeta", TaskType::RetrievalWeb, vec![]).with_sequence_order(0),
            Task::new(job_id, "alpha", TaskType::RetrievalWeb, vec![]).with_sequence_order(1),
        ];
        let graph = ExecutionGraph::build(&tasks).unwrap();
        assert_eq!(graph.waves[0], vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_diamond_shape() {
        let tasks = plan(&[
            ("a", TaskType::RetrievalWeb, &[]),
            ("b", TaskType::Synthesis, &["a"]),
            ("c", TaskType::Synthesis, &["a"]),
            ("d", TaskType::WriteReport, &["b", "c"]),
        ]);
        let graph = ExecutionGraph::build(&tasks).unwrap();

        assert_eq!(graph.wave_count(), 3);
        assert_eq!(graph.waves[0], vec!["a"]);
        assert_eq!(graph.waves[1], vec!["b", "c"]);
        assert_eq!(graph.waves[2], vec!["d"]);
        assert!((graph.parallelism_potential - 0.5).abs() < 1e-9);
    }
}
