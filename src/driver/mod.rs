//! Leave-one-task-out evaluation driver
//!
//! Tasks are processed one at a time in ascending id order:
//!
//! ```text
//! partition(T) ─> train meta + baseline ─> predict every test row
//!                                              │
//!          global meta ◄── record ──┬──────────┤
//!          global baseline ◄────────┤          │
//!          per-task meta ◄──────────┘          └─> stream aggregator
//! ```
//!
//! All predictions of a task are computed before anything is recorded, so a
//! failing task leaves the shared [`EvaluationContext`] exactly as the
//! previous task left it.

mod runner;

pub use runner::run;

use crate::config::FailurePolicy;
use crate::evaluation::Evaluation;
use crate::learner::Learner;
use crate::partition::TaskPartitioner;
use crate::projection::{CLASS_COLUMN, INTERVAL_COLUMN, TASK_ID_COLUMN};
use crate::sink::{LogSink, ReportSink};
use crate::stream::{ScoreRow, StreamAggregator};
use crate::table::MetaTable;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use tracing::{info, warn};

/// Accumulators shared across all tasks of a run
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Global meta-learner evaluation
    pub meta: Evaluation,
    /// Global baseline evaluation
    pub baseline: Evaluation,
    /// Per-task, per-interval curves
    pub stream: StreamAggregator,
    completed: Vec<i64>,
    skipped: Vec<(i64, String)>,
}

impl EvaluationContext {
    /// Fresh context over the class labels
    #[must_use]
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            meta: Evaluation::new(labels.clone()),
            baseline: Evaluation::new(labels),
            stream: StreamAggregator::new(),
            completed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Tasks whose results were recorded, in processing order
    #[must_use]
    pub fn completed(&self) -> &[i64] {
        &self.completed
    }

    /// Tasks dropped under the skip policy, with the reason
    #[must_use]
    pub fn skipped(&self) -> &[(i64, String)] {
        &self.skipped
    }

    /// Final multi-line summary block
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("Global Evaluation: ");
        out.push_str(&self.meta.to_summary_string());
        out.push_str(&self.meta.to_matrix_string("Confusion Matrix"));
        out.push_str("Majority class: ");
        out.push_str(&self.baseline.to_summary_string());
        out.push_str(&self.baseline.to_matrix_string("Confusion Matrix"));
        if !self.skipped.is_empty() {
            out.push_str("\nPARTIAL RESULTS, skipped tasks:\n");
            for (task_id, reason) in &self.skipped {
                let _ = writeln!(out, "  task {task_id}: {reason}");
            }
        }
        out.push('\n');
        out.push_str(&self.stream.to_string());
        out
    }
}

/// One test row's predictions, buffered until the whole task succeeded
struct Prediction {
    actual: usize,
    meta: usize,
    baseline: usize,
    interval: i64,
    scores: ScoreRow,
}

/// Result of one completed task
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Held-out task
    pub task_id: i64,
    /// Test rows evaluated
    pub instances: usize,
    /// Meta-learner evaluation on this task alone
    pub evaluation: Evaluation,
}

/// Leave-one-task-out driver over a relabeled meta-dataset
pub struct LeaveOneTaskOut<'a> {
    table: &'a MetaTable,
    partitioner: TaskPartitioner,
    labels: Vec<String>,
    meta: &'a dyn Learner,
    baseline: &'a dyn Learner,
    policy: FailurePolicy,
}

impl<'a> LeaveOneTaskOut<'a> {
    /// Prepare evaluation of `table`
    ///
    /// # Errors
    /// Returns `Error::Schema` if a reserved column is absent or the class
    /// column is not categorical
    pub fn new(
        table: &'a MetaTable,
        meta: &'a dyn Learner,
        baseline: &'a dyn Learner,
    ) -> Result<Self> {
        for column in [CLASS_COLUMN, TASK_ID_COLUMN, INTERVAL_COLUMN] {
            if table.column_index(column).is_none() {
                return Err(Error::Schema(format!("reserved column `{column}` is absent")));
            }
        }
        let class = table.column_index(CLASS_COLUMN).unwrap_or_default();
        let labels = table
            .categories(class)
            .map_err(|_| Error::Schema(format!("column `{CLASS_COLUMN}` is not categorical")))?;

        Ok(Self {
            table,
            partitioner: TaskPartitioner::new(table)?,
            labels,
            meta,
            baseline,
            policy: FailurePolicy::default(),
        })
    }

    /// Set the failure policy
    #[must_use]
    pub const fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Distinct tasks (ascending) with their row counts
    #[must_use]
    pub fn tasks(&self) -> BTreeMap<i64, usize> {
        self.partitioner.tasks()
    }

    /// Class labels of the meta-dataset
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Fresh context matching this driver's labels
    #[must_use]
    pub fn context(&self) -> EvaluationContext {
        EvaluationContext::new(self.labels.clone())
    }

    /// Evaluate one held-out task and record it into `ctx`
    ///
    /// # Errors
    /// Returns a task-scoped error (`Partition`/`Capability`) if the task
    /// fails; `ctx` is untouched in that case
    pub fn evaluate_task(&self, task_id: i64, ctx: &mut EvaluationContext) -> Result<TaskOutcome> {
        let predictions = self.predict_task(task_id)?;

        let mut evaluation = Evaluation::new(self.labels.clone());
        for p in &predictions {
            ctx.meta.record(p.actual, p.meta)?;
            ctx.baseline.record(p.actual, p.baseline)?;
            evaluation.record(p.actual, p.meta)?;
            ctx.stream.add_prediction(
                task_id,
                p.interval,
                &self.labels[p.meta],
                &self.labels[p.baseline],
                &p.scores,
            )?;
        }
        ctx.completed.push(task_id);

        Ok(TaskOutcome {
            task_id,
            instances: predictions.len(),
            evaluation,
        })
    }

    fn predict_task(&self, task_id: i64) -> Result<Vec<Prediction>> {
        let split = self.partitioner.partition(self.table, task_id)?;
        let partition_error = |e: Error| Error::Partition {
            task_id,
            reason: e.to_string(),
        };

        let class = split
            .train
            .column_index(CLASS_COLUMN)
            .ok_or_else(|| partition_error(Error::Schema(CLASS_COLUMN.to_string())))?;
        let interval = split
            .test
            .column_index(INTERVAL_COLUMN)
            .ok_or_else(|| partition_error(Error::Schema(INTERVAL_COLUMN.to_string())))?;

        let meta_model = self
            .meta
            .train(&split.train, class)
            .map_err(|e| e.for_task(task_id))?;
        let baseline_model = self
            .baseline
            .train(&split.train, class)
            .map_err(|e| e.for_task(task_id))?;

        let mut predictions = Vec::with_capacity(split.test.num_rows());
        for row in 0..split.test.num_rows() {
            let meta = meta_model
                .predict(&split.test, row)
                .map_err(|e| e.for_task(task_id))?;
            let baseline = baseline_model
                .predict(&split.test, row)
                .map_err(|e| e.for_task(task_id))?;
            for predicted in [meta, baseline] {
                if predicted >= self.labels.len() {
                    return Err(Error::Capability {
                        task_id,
                        reason: format!("prediction {predicted} is not a class label"),
                    });
                }
            }

            let scores = ScoreRow::from_table(&split.scores, row).map_err(partition_error)?;
            for predicted in [meta, baseline] {
                let label = &self.labels[predicted];
                if scores.get(label).is_none() {
                    return Err(partition_error(Error::Schema(format!(
                        "no score column for predicted `{label}`"
                    ))));
                }
            }
            if scores.max().is_none() {
                return Err(partition_error(Error::Schema(format!(
                    "test row {row} has no comparable score"
                ))));
            }

            predictions.push(Prediction {
                actual: split.test.label_index(row, class).map_err(partition_error)?,
                meta,
                baseline,
                interval: split.test.integer(row, interval).map_err(partition_error)?,
                scores,
            });
        }
        Ok(predictions)
    }

    /// Evaluate every task, writing the log and the report as it goes
    ///
    /// # Errors
    /// Returns the first task error under `FailurePolicy::Abort`, or any
    /// sink error
    pub fn run<L: Write, R: Write>(
        &self,
        ctx: &mut EvaluationContext,
        log: &mut LogSink<L>,
        report: &mut ReportSink<R>,
    ) -> Result<()> {
        let tasks = self.tasks();
        let total = tasks.len();
        info!(tasks = total, rows = self.table.num_rows(), "starting leave-one-task-out");

        for (position, (&task_id, &count)) in tasks.iter().enumerate() {
            let progress = format!(
                "Running task {task_id} ~ {count} instances ({}/{total})",
                position + 1
            );
            info!("{progress}");
            log.line("OK", &progress)?;

            match self.evaluate_task(task_id, ctx) {
                Ok(outcome) => {
                    report.write_tuples(&ctx.stream.sql_tuples(task_id))?;
                    log.block(&outcome.evaluation.to_summary_string())?;
                    let score = format!(
                        "Current score {:.4}, Majority class: {:.4}",
                        ctx.meta.pct_correct(),
                        ctx.baseline.pct_correct()
                    );
                    info!(task_id, instances = outcome.instances, "{score}");
                    log.line("OK", &score)?;
                }
                Err(e) if e.is_task_scoped() && self.policy == FailurePolicy::Skip => {
                    warn!(task_id, error = %e, "skipping task");
                    log.line("SKIP", &format!("Task {task_id}: {e}"))?;
                    ctx.skipped.push((task_id, e.to_string()));
                }
                Err(e) => {
                    log.line("FAIL", &format!("Task {task_id}: {e}"))?;
                    return Err(e);
                }
            }
        }

        log.line("OK", "Global Evaluation")?;
        log.block(&ctx.summary())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::{MajorityClass, Model};

    fn table() -> MetaTable {
        MetaTable::builder("meta")
            .numeric(TASK_ID_COLUMN, vec![1.0, 1.0, 2.0, 2.0, 3.0])
            .numeric(INTERVAL_COLUMN, vec![0.0, 100.0, 0.0, 100.0, 0.0])
            .numeric("openml_classifier_A", vec![0.9, 0.2, 0.1, 0.8, 0.6])
            .numeric("openml_classifier_B", vec![0.1, 0.8, 0.9, 0.2, 0.4])
            .categorical(CLASS_COLUMN, ["A", "B"], ["A", "B", "B", "A", "A"])
            .build()
            .unwrap()
    }

    /// Refuses to train on tables with exactly `.0` rows
    struct FailOn(usize);

    impl Learner for FailOn {
        fn name(&self) -> &str {
            "fail-on"
        }

        fn train(&self, table: &MetaTable, class: usize) -> Result<Box<dyn Model>> {
            if table.num_rows() == self.0 {
                return Err(Error::Learner("refusing".to_string()));
            }
            MajorityClass.train(table, class)
        }
    }

    #[test]
    fn test_missing_reserved_column_is_schema_error() {
        let table = MetaTable::builder("meta")
            .numeric(TASK_ID_COLUMN, vec![1.0])
            .categorical(CLASS_COLUMN, ["A"], ["A"])
            .build()
            .unwrap();
        let result = LeaveOneTaskOut::new(&table, &MajorityClass, &MajorityClass);
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_evaluate_task_records_all_accumulators() {
        let table = table();
        let driver = LeaveOneTaskOut::new(&table, &MajorityClass, &MajorityClass).unwrap();
        let mut ctx = driver.context();

        let outcome = driver.evaluate_task(1, &mut ctx).unwrap();
        assert_eq!(outcome.instances, 2);
        // train rows: B, A, A -> majority A; test actual A, B
        assert_eq!(outcome.evaluation.correct(), 1);
        assert_eq!(ctx.meta.total(), 2);
        assert_eq!(ctx.baseline.total(), 2);
        assert_eq!(ctx.completed(), &[1]);

        let stats = ctx.stream.stats(1, 100).unwrap();
        assert!((stats.mean_meta() - 0.2).abs() < 1e-12);
        assert!((stats.mean_max() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_failed_task_leaves_context_untouched() {
        let table = table();
        // training table for task 3 has 4 rows
        let failing = FailOn(4);
        let driver = LeaveOneTaskOut::new(&table, &failing, &MajorityClass).unwrap();
        let mut ctx = driver.context();
        driver.evaluate_task(1, &mut ctx).unwrap();
        let before = ctx.meta.clone();

        let err = driver.evaluate_task(3, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::Capability { task_id: 3, .. }));
        assert_eq!(ctx.meta, before);
        assert_eq!(ctx.stream.stats(3, 0), None);
    }

    #[test]
    fn test_run_abort_and_skip_policies() {
        let table = table();
        let failing = FailOn(4);

        let driver = LeaveOneTaskOut::new(&table, &failing, &MajorityClass).unwrap();
        let mut ctx = driver.context();
        let mut log = LogSink::new(Vec::new());
        let mut report = ReportSink::new(Vec::new());
        assert!(driver.run(&mut ctx, &mut log, &mut report).is_err());
        // task 1 and 2 have 3-row training tables; task 3 fails
        assert_eq!(ctx.completed(), &[1, 2]);

        let driver = driver.failure_policy(FailurePolicy::Skip);
        let mut ctx = driver.context();
        let mut log = LogSink::new(Vec::new());
        let mut report = ReportSink::new(Vec::new());
        driver.run(&mut ctx, &mut log, &mut report).unwrap();
        assert_eq!(ctx.completed(), &[1, 2]);
        assert_eq!(ctx.skipped().len(), 1);
        assert!(ctx.summary().contains("PARTIAL RESULTS"));

        let log = String::from_utf8(log.finish().unwrap()).unwrap();
        assert!(log.contains("Running task 1 ~ 2 instances (1/3)"));
        assert!(log.contains("[SKIP] Task 3"));
        assert_eq!(report.tuples_written(), 4);
    }
}
