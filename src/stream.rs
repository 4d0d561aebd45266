//! Stream aggregation of meta-learner predictions into score curves
//!
//! For every `(task_id, interval_start)` the aggregator keeps running sums of:
//! - the score the meta-learner's pick achieved on that row
//! - the score the baseline's pick achieved
//! - the best score any candidate achieved (the ceiling)
//!
//! plus how often each pick was the row's best candidate. Rendered values are
//! per-interval means. The aggregator never deduplicates: pushing the same
//! row twice counts it twice.

use crate::labels::best_candidate;
use crate::table::MetaTable;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Raw candidate scores of one test row, in score-schema order
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    names: Vec<String>,
    values: Vec<f64>,
}

impl ScoreRow {
    /// Create a score row from parallel names and values
    ///
    /// # Errors
    /// Returns error if the lengths differ
    pub fn new(names: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(Error::InvalidInput(format!(
                "{} score names for {} values",
                names.len(),
                values.len()
            )));
        }
        Ok(Self { names, values })
    }

    /// Read row `row` of a score table
    ///
    /// # Errors
    /// Returns error if the row is out of bounds
    pub fn from_table(table: &MetaTable, row: usize) -> Result<Self> {
        let schema = table.schema();
        let names = schema.fields().iter().map(|f| f.name().clone()).collect();
        let values = (0..table.num_columns())
            .map(|col| table.numeric(row, col))
            .collect::<Result<Vec<f64>>>()?;
        Self::new(names, values)
    }

    /// Score of `algorithm`, if present
    #[must_use]
    pub fn get(&self, algorithm: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == algorithm)
            .map(|i| self.values[i])
    }

    /// Best algorithm of the row (first-seen wins on ties)
    #[must_use]
    pub fn best(&self) -> Option<&str> {
        best_candidate(&self.names, &self.values).map(|b| b.label)
    }

    /// Best score of the row
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        best_candidate(&self.names, &self.values).map(|b| b.score)
    }
}

/// Running sums for one `(task_id, interval_start)`
///
/// A pick whose realized score is missing (NaN) still counts as a prediction
/// but adds nothing to its score sum; the realized means average over the
/// scored picks only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalStats {
    /// Predictions pushed
    pub count: u64,
    /// Meta-learner picked the row's best candidate
    pub meta_correct: u64,
    /// Baseline picked the row's best candidate
    pub baseline_correct: u64,
    /// Meta-learner picks with a known score
    pub meta_scored: u64,
    /// Baseline picks with a known score
    pub baseline_scored: u64,
    /// Sum of known scores realized by the meta-learner's picks
    pub meta_score: f64,
    /// Sum of known scores realized by the baseline's picks
    pub baseline_score: f64,
    /// Sum of row maxima
    pub max_score: f64,
}

impl IntervalStats {
    #[allow(clippy::cast_precision_loss)]
    fn mean(sum: f64, count: u64) -> f64 {
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Mean score realized by the meta-learner (NaN if no pick was scored)
    #[must_use]
    pub fn mean_meta(&self) -> f64 {
        Self::mean(self.meta_score, self.meta_scored)
    }

    /// Mean score realized by the baseline (NaN if no pick was scored)
    #[must_use]
    pub fn mean_baseline(&self) -> f64 {
        Self::mean(self.baseline_score, self.baseline_scored)
    }

    /// Mean best achievable score (NaN if nothing was pushed)
    #[must_use]
    pub fn mean_max(&self) -> f64 {
        Self::mean(self.max_score, self.count)
    }

    fn add_realized(sum: &mut f64, scored: &mut u64, score: f64) {
        if !score.is_nan() {
            *sum += score;
            *scored += 1;
        }
    }
}

/// SQL literal of a mean; undefined means become `NULL`
fn sql_number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        "NULL".to_string()
    }
}

/// Per-task, per-interval curve accumulator
#[derive(Debug, Clone, Default)]
pub struct StreamAggregator {
    intervals: BTreeMap<(i64, i64), IntervalStats>,
}

impl StreamAggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if no prediction was pushed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Push one prediction pair with the row's raw scores
    ///
    /// # Errors
    /// Returns error, leaving the aggregator unchanged, if either prediction
    /// has no score in `scores` or the row has no comparable score
    pub fn add_prediction(
        &mut self,
        task_id: i64,
        interval_start: i64,
        meta: &str,
        baseline: &str,
        scores: &ScoreRow,
    ) -> Result<()> {
        let missing = |algorithm: &str| {
            Error::InvalidInput(format!(
                "task {task_id} interval {interval_start}: no score for `{algorithm}`"
            ))
        };
        let meta_score = scores.get(meta).ok_or_else(|| missing(meta))?;
        let baseline_score = scores.get(baseline).ok_or_else(|| missing(baseline))?;
        let best = best_candidate(&scores.names, &scores.values).ok_or_else(|| {
            Error::InvalidInput(format!(
                "task {task_id} interval {interval_start}: score row has no comparable value"
            ))
        })?;

        let stats = self.intervals.entry((task_id, interval_start)).or_default();
        stats.count += 1;
        stats.meta_correct += u64::from(meta == best.label);
        stats.baseline_correct += u64::from(baseline == best.label);
        IntervalStats::add_realized(&mut stats.meta_score, &mut stats.meta_scored, meta_score);
        IntervalStats::add_realized(
            &mut stats.baseline_score,
            &mut stats.baseline_scored,
            baseline_score,
        );
        stats.max_score += best.score;
        Ok(())
    }

    /// Stats for one interval
    #[must_use]
    pub fn stats(&self, task_id: i64, interval_start: i64) -> Option<&IntervalStats> {
        self.intervals.get(&(task_id, interval_start))
    }

    /// Intervals of one task in ascending order
    pub fn intervals(&self, task_id: i64) -> impl Iterator<Item = (i64, &IntervalStats)> + '_ {
        self.intervals
            .range((task_id, i64::MIN)..=(task_id, i64::MAX))
            .map(|(&(_, interval), stats)| (interval, stats))
    }

    /// Distinct tasks seen, ascending
    #[must_use]
    pub fn tasks(&self) -> Vec<i64> {
        let mut tasks: Vec<i64> = self.intervals.keys().map(|&(t, _)| t).collect();
        tasks.dedup();
        tasks
    }

    /// `(task_id,interval_start,score,baseline,max)` tuples of one task
    #[must_use]
    pub fn sql_tuples(&self, task_id: i64) -> Vec<String> {
        self.intervals(task_id)
            .map(|(interval, stats)| {
                format!(
                    "({task_id},{interval},{},{},{})",
                    sql_number(stats.mean_meta()),
                    sql_number(stats.mean_baseline()),
                    sql_number(stats.mean_max())
                )
            })
            .collect()
    }

    /// Tuples of one task joined for a bulk insert
    #[must_use]
    pub fn get_sql(&self, task_id: i64) -> String {
        self.sql_tuples(task_id).join(",\n")
    }
}

impl fmt::Display for StreamAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stream evaluation ({} tasks)", self.tasks().len())?;
        for task_id in self.tasks() {
            let mut total = IntervalStats::default();
            for (_, stats) in self.intervals(task_id) {
                total.count += stats.count;
                total.meta_correct += stats.meta_correct;
                total.baseline_correct += stats.baseline_correct;
                total.meta_scored += stats.meta_scored;
                total.baseline_scored += stats.baseline_scored;
                total.meta_score += stats.meta_score;
                total.baseline_score += stats.baseline_score;
                total.max_score += stats.max_score;
            }
            writeln!(
                f,
                "Task {task_id}: {} intervals, {} rows, best picked {}/{} (baseline {}), \
                 score {:.4}, baseline {:.4}, max {:.4}",
                self.intervals(task_id).count(),
                total.count,
                total.meta_correct,
                total.count,
                total.baseline_correct,
                total.mean_meta(),
                total.mean_baseline(),
                total.mean_max()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: f64, b: f64) -> ScoreRow {
        ScoreRow::new(vec!["A".to_string(), "B".to_string()], vec![a, b]).unwrap()
    }

    #[test]
    fn test_score_row_lookup() {
        let scores = row(0.9, 0.1);
        assert_eq!(scores.get("A"), Some(0.9));
        assert_eq!(scores.get("Z"), None);
        assert_eq!(scores.best(), Some("A"));
        assert_eq!(scores.max(), Some(0.9));
        assert!(ScoreRow::new(vec!["A".to_string()], vec![]).is_err());
    }

    #[test]
    fn test_add_prediction_accumulates() {
        let mut agg = StreamAggregator::new();
        agg.add_prediction(1, 0, "A", "B", &row(0.9, 0.1)).unwrap();
        agg.add_prediction(1, 0, "B", "B", &row(0.2, 0.8)).unwrap();

        let stats = agg.stats(1, 0).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.meta_correct, 2);
        assert_eq!(stats.baseline_correct, 1);
        assert!((stats.mean_meta() - 0.85).abs() < 1e-12);
        assert!((stats.mean_baseline() - 0.45).abs() < 1e-12);
        assert!((stats.mean_max() - 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_no_deduplication() {
        let mut agg = StreamAggregator::new();
        let scores = row(0.5, 0.4);
        agg.add_prediction(3, 10, "A", "A", &scores).unwrap();
        agg.add_prediction(3, 10, "A", "A", &scores).unwrap();
        assert_eq!(agg.stats(3, 10).unwrap().count, 2);
    }

    #[test]
    fn test_unknown_prediction_leaves_state_untouched() {
        let mut agg = StreamAggregator::new();
        assert!(agg.add_prediction(1, 0, "Z", "A", &row(0.9, 0.1)).is_err());
        assert!(agg.is_empty());
    }

    #[test]
    fn test_sql_tuple_contains_max() {
        let mut agg = StreamAggregator::new();
        agg.add_prediction(1, 0, "A", "B", &row(0.9, 0.1)).unwrap();
        let sql = agg.get_sql(1);
        assert_eq!(sql, "(1,0,0.9,0.1,0.9)");
    }

    #[test]
    fn test_missing_realized_score_renders_null() {
        let mut agg = StreamAggregator::new();
        agg.add_prediction(1, 0, "A", "A", &row(f64::NAN, 0.8)).unwrap();

        let stats = agg.stats(1, 0).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.meta_scored, 0);
        assert!(stats.mean_meta().is_nan());
        assert_eq!(agg.get_sql(1), "(1,0,NULL,NULL,0.8)");

        // a scored pick in the same interval defines the mean on its own
        agg.add_prediction(1, 0, "B", "A", &row(f64::NAN, 0.6)).unwrap();
        let stats = agg.stats(1, 0).unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.mean_meta() - 0.6).abs() < 1e-12);
        assert!((stats.mean_max() - 0.7).abs() < 1e-12);
        assert_eq!(agg.get_sql(1), "(1,0,0.6,NULL,0.7)");
    }

    #[test]
    fn test_intervals_are_per_task_and_ordered() {
        let mut agg = StreamAggregator::new();
        agg.add_prediction(2, 100, "A", "A", &row(0.5, 0.4)).unwrap();
        agg.add_prediction(1, 0, "A", "A", &row(0.5, 0.4)).unwrap();
        agg.add_prediction(2, 0, "B", "A", &row(0.5, 0.4)).unwrap();

        let intervals: Vec<i64> = agg.intervals(2).map(|(i, _)| i).collect();
        assert_eq!(intervals, vec![0, 100]);
        assert_eq!(agg.tasks(), vec![1, 2]);
        assert_eq!(agg.sql_tuples(2).len(), 2);
        assert!(agg.sql_tuples(7).is_empty());

        let text = agg.to_string();
        assert!(text.contains("Task 1:"));
        assert!(text.contains("Task 2: 2 intervals"));
    }
}
