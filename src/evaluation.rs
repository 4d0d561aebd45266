//! Running classification accuracy with a confusion matrix

use crate::{Error, Result};
use std::fmt::Write as _;

/// Running evaluation of one classifier
///
/// Every recorded prediction counts exactly once; `pct_correct` is
/// `correct / total * 100` with no smoothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    labels: Vec<String>,
    /// `matrix[actual][predicted]`
    matrix: Vec<Vec<u64>>,
}

impl Evaluation {
    /// Create an evaluation over the given class labels
    #[must_use]
    pub fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            labels,
            matrix: vec![vec![0; n]; n],
        }
    }

    /// Class labels
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Record one prediction
    ///
    /// # Errors
    /// Returns error if either index is not a known label
    pub fn record(&mut self, actual: usize, predicted: usize) -> Result<()> {
        let n = self.labels.len();
        if actual >= n || predicted >= n {
            return Err(Error::InvalidInput(format!(
                "label index out of range: actual {actual}, predicted {predicted}, {n} labels"
            )));
        }
        self.matrix[actual][predicted] += 1;
        Ok(())
    }

    /// Number of correct predictions
    #[must_use]
    pub fn correct(&self) -> u64 {
        (0..self.labels.len()).map(|i| self.matrix[i][i]).sum()
    }

    /// Number of predictions recorded
    #[must_use]
    pub fn total(&self) -> u64 {
        self.matrix.iter().flatten().sum()
    }

    /// Number of wrong predictions
    #[must_use]
    pub fn incorrect(&self) -> u64 {
        self.total() - self.correct()
    }

    /// Percentage of correct predictions (0 when nothing was recorded)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pct_correct(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64 * 100.0
        }
    }

    /// Percentage of wrong predictions (0 when nothing was recorded)
    #[must_use]
    pub fn pct_incorrect(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            100.0 - self.pct_correct()
        }
    }

    /// Count of `actual` rows predicted as `predicted`
    #[must_use]
    pub fn count(&self, actual: usize, predicted: usize) -> u64 {
        self.matrix
            .get(actual)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    /// Short multi-line accuracy summary
    #[must_use]
    pub fn to_summary_string(&self) -> String {
        format!(
            "\nCorrectly Classified Instances   {:>10} {:>14.4} %\n\
             Incorrectly Classified Instances {:>10} {:>14.4} %\n\
             Total Number of Instances        {:>10}\n",
            self.correct(),
            self.pct_correct(),
            self.incorrect(),
            self.pct_incorrect(),
            self.total()
        )
    }

    /// Confusion matrix, rows = actual, columns = predicted
    #[must_use]
    pub fn to_matrix_string(&self, title: &str) -> String {
        let width = self
            .matrix
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1)
            .max(self.labels.len().to_string().len() + 1);
        let mut out = format!("=== {title} ===\n\n");
        for i in 0..self.labels.len() {
            let _ = write!(out, " {:>width$}", column_code(i));
        }
        out.push_str("   <-- classified as\n");
        for (i, row) in self.matrix.iter().enumerate() {
            for count in row {
                let _ = write!(out, " {count:>width$}");
            }
            let _ = writeln!(out, " | {:>width$} = {}", column_code(i), self.labels[i]);
        }
        out
    }
}

/// Spreadsheet-style column code: a..z, aa, ab, ...
fn column_code(mut index: usize) -> String {
    let mut code = Vec::new();
    loop {
        code.push(b'a' + u8::try_from(index % 26).unwrap_or(0));
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    code.reverse();
    String::from_utf8(code).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    #[test]
    fn test_empty_evaluation() {
        let eval = Evaluation::new(labels());
        assert_eq!(eval.total(), 0);
        assert!(eval.pct_correct().abs() < f64::EPSILON);
        assert!(eval.pct_incorrect().abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_counts() {
        let mut eval = Evaluation::new(labels());
        eval.record(0, 0).unwrap();
        eval.record(1, 0).unwrap();
        eval.record(1, 1).unwrap();
        eval.record(1, 1).unwrap();
        assert_eq!(eval.correct(), 3);
        assert_eq!(eval.incorrect(), 1);
        assert_eq!(eval.total(), 4);
        assert!((eval.pct_correct() - 75.0).abs() < 1e-9);
        assert_eq!(eval.count(1, 0), 1);
    }

    #[test]
    fn test_record_rejects_unknown_label() {
        let mut eval = Evaluation::new(labels());
        assert!(eval.record(2, 0).is_err());
        assert_eq!(eval.total(), 0);
    }

    #[test]
    fn test_summary_and_matrix_strings() {
        let mut eval = Evaluation::new(labels());
        eval.record(0, 1).unwrap();
        eval.record(0, 0).unwrap();
        let summary = eval.to_summary_string();
        assert!(summary.contains("Correctly Classified Instances"));
        assert!(summary.contains("50.0000 %"));

        let matrix = eval.to_matrix_string("Confusion Matrix");
        assert!(matrix.starts_with("=== Confusion Matrix ==="));
        assert!(matrix.contains("<-- classified as"));
        assert!(matrix.contains("a = A"));
        assert!(matrix.contains("b = B"));
    }

    #[test]
    fn test_column_codes() {
        assert_eq!(column_code(0), "a");
        assert_eq!(column_code(25), "z");
        assert_eq!(column_code(26), "aa");
        assert_eq!(column_code(27), "ab");
    }
}
