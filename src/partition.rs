//! Task partitioning for leave-one-task-out evaluation
//!
//! For a task `T` every row of the meta-dataset lands in exactly one of:
//! - `test`: rows of `T`, under the train/test schema, in source order
//! - `train`: every other row, under the train/test schema, in source order
//!
//! plus `scores`, the test rows under the score schema (same order as `test`).

use crate::projection::{AttributeProjector, RowMapping, SCORE_PREFIX, TASK_ID_COLUMN};
use crate::table::MetaTable;
use crate::{Error, Result};
use arrow::array::BooleanArray;
use std::collections::BTreeMap;
use tracing::debug;

/// Fresh per-task views of the meta-dataset
#[derive(Debug, Clone)]
pub struct TaskSplit {
    /// Held-out task
    pub task_id: i64,
    /// Rows of every other task
    pub train: MetaTable,
    /// Rows of the held-out task
    pub test: MetaTable,
    /// Raw candidate scores of the test rows
    pub scores: MetaTable,
}

/// Splits the meta-dataset by task id
///
/// Task ids are read once at construction; derived schemas are projected once
/// and row mappings are resolved per partition call.
#[derive(Debug, Clone)]
pub struct TaskPartitioner {
    projector: AttributeProjector,
    task_ids: Vec<i64>,
}

impl TaskPartitioner {
    /// Prepare partitioning of `table`
    ///
    /// # Errors
    /// Returns `Error::Schema` if the task id column is absent, or
    /// `Error::InvalidInput` if a task id is not a finite number
    pub fn new(table: &MetaTable) -> Result<Self> {
        let column = table.column_index(TASK_ID_COLUMN).ok_or_else(|| {
            Error::Schema(format!("reserved column `{TASK_ID_COLUMN}` is absent"))
        })?;
        let task_ids = (0..table.num_rows())
            .map(|row| table.integer(row, column))
            .collect::<Result<Vec<i64>>>()?;
        Ok(Self {
            projector: AttributeProjector::new(&table.schema()),
            task_ids,
        })
    }

    /// Derived schemas
    #[must_use]
    pub const fn projector(&self) -> &AttributeProjector {
        &self.projector
    }

    /// Distinct task ids in ascending order with their row counts
    #[must_use]
    pub fn tasks(&self) -> BTreeMap<i64, usize> {
        let mut tasks = BTreeMap::new();
        for &id in &self.task_ids {
            *tasks.entry(id).or_insert(0) += 1;
        }
        tasks
    }

    /// Split `table` into train/test/score tables for `task_id`
    ///
    /// A task id with no rows yields an empty test table and a train table
    /// holding every row.
    ///
    /// # Errors
    /// Returns `Error::Partition` if `table` is not the table the partitioner
    /// was built for, or a derived column has no source column
    pub fn partition(&self, table: &MetaTable, task_id: i64) -> Result<TaskSplit> {
        let fail = |reason: String| Error::Partition { task_id, reason };
        if table.num_rows() != self.task_ids.len() {
            return Err(fail(format!(
                "table has {} rows, partitioner was built for {}",
                table.num_rows(),
                self.task_ids.len()
            )));
        }

        let schema = table.schema();
        let plain = RowMapping::builder(&schema)
            .build(self.projector.train_test())
            .map_err(|e| fail(schema_reason(e)))?;
        let scores = RowMapping::builder(&schema)
            .source_prefix(SCORE_PREFIX)
            .build(self.projector.scores())
            .map_err(|e| fail(schema_reason(e)))?;

        let in_task: BooleanArray = self.task_ids.iter().map(|&id| Some(id == task_id)).collect();
        let out_task: BooleanArray = self.task_ids.iter().map(|&id| Some(id != task_id)).collect();

        let test_rows = table.filter(format!("task_{task_id}_test"), &in_task)?;
        let train_rows = table.filter(format!("task_{task_id}_train"), &out_task)?;

        let split = TaskSplit {
            task_id,
            train: plain.apply(&train_rows, train_rows.name().to_string())?,
            scores: scores.apply(&test_rows, format!("task_{task_id}_scores"))?,
            test: plain.apply(&test_rows, test_rows.name().to_string())?,
        };
        debug!(
            task_id,
            train = split.train.num_rows(),
            test = split.test.num_rows(),
            "partitioned meta-dataset"
        );
        Ok(split)
    }
}

fn schema_reason(error: Error) -> String {
    match error {
        Error::Schema(reason) => reason,
        other => other.to_string(),
    }
}

/// Partition `table` for `task_id` in one call
///
/// # Errors
/// See [`TaskPartitioner::new`] and [`TaskPartitioner::partition`]
pub fn partition(table: &MetaTable, task_id: i64) -> Result<TaskSplit> {
    TaskPartitioner::new(table)?.partition(table, task_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{CLASS_COLUMN, INTERVAL_COLUMN};

    fn table() -> MetaTable {
        MetaTable::builder("meta")
            .numeric(TASK_ID_COLUMN, vec![1.0, 2.0, 1.0, 3.0, 2.0])
            .numeric("feature", vec![10.0, 20.0, 30.0, 40.0, 50.0])
            .numeric("openml_classifier_A", vec![0.9, 0.2, 0.1, 0.5, 0.4])
            .numeric(INTERVAL_COLUMN, vec![0.0, 0.0, 100.0, 0.0, 100.0])
            .numeric("openml_classifier_B", vec![0.1, 0.8, 0.9, 0.6, 0.3])
            .categorical(CLASS_COLUMN, ["A", "B"], ["A", "B", "B", "B", "A"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_tasks_ascending_with_counts() {
        let partitioner = TaskPartitioner::new(&table()).unwrap();
        let tasks: Vec<_> = partitioner.tasks().into_iter().collect();
        assert_eq!(tasks, vec![(1, 2), (2, 2), (3, 1)]);
    }

    #[test]
    fn test_partition_routes_rows_in_order() {
        let table = table();
        let split = partition(&table, 1).unwrap();

        assert_eq!(split.test.num_rows(), 2);
        assert_eq!(split.train.num_rows(), 3);
        assert_eq!(split.test.name(), "task_1_test");
        assert_eq!(split.train.name(), "task_1_train");

        let feature = split.test.column_index("feature").unwrap();
        assert!((split.test.numeric(0, feature).unwrap() - 10.0).abs() < f64::EPSILON);
        assert!((split.test.numeric(1, feature).unwrap() - 30.0).abs() < f64::EPSILON);

        let train_features: Vec<f64> = (0..3)
            .map(|r| split.train.numeric(r, feature).unwrap())
            .collect();
        assert_eq!(train_features, vec![20.0, 40.0, 50.0]);
    }

    #[test]
    fn test_partition_projects_schemas() {
        let split = partition(&table(), 2).unwrap();
        let names: Vec<String> = split.test.columns().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["feature", INTERVAL_COLUMN, CLASS_COLUMN]);
        assert_eq!(split.train.schema(), split.test.schema());

        let score_names: Vec<String> =
            split.scores.columns().into_iter().map(|c| c.name).collect();
        assert_eq!(score_names, vec!["A", "B"]);
        assert_eq!(split.scores.num_rows(), split.test.num_rows());
        assert!((split.scores.numeric(0, 1).unwrap() - 0.8).abs() < f64::EPSILON);
        assert!((split.scores.numeric(1, 0).unwrap() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partition_unknown_task_keeps_all_rows_in_train() {
        let split = partition(&table(), 99).unwrap();
        assert_eq!(split.test.num_rows(), 0);
        assert_eq!(split.scores.num_rows(), 0);
        assert_eq!(split.train.num_rows(), 5);
    }

    #[test]
    fn test_partition_wrong_table_is_partition_error() {
        let partitioner = TaskPartitioner::new(&table()).unwrap();
        let other = table().take_rows(&[0, 1]).unwrap();
        let err = partitioner.partition(&other, 1).unwrap_err();
        assert!(matches!(err, Error::Partition { task_id: 1, .. }));
        assert!(err.is_task_scoped());
    }

    #[test]
    fn test_missing_task_column_is_schema_error() {
        let table = MetaTable::builder("meta")
            .numeric("feature", vec![1.0])
            .build()
            .unwrap();
        assert!(matches!(TaskPartitioner::new(&table), Err(Error::Schema(_))));
    }
}
