//! Label synthesis: the best-scoring candidate becomes the class
//!
//! For every row the candidate scores are scanned left to right in
//! configuration order and the strictly greatest wins, so on an exact tie the
//! earliest-listed candidate keeps the label. NaN scores never win.

use crate::projection::{score_column, CLASS_COLUMN};
use crate::table::{categorical_from_keys, categorical_type, MetaTable};
use crate::{Error, Result};
use arrow::datatypes::Field;
use std::collections::HashSet;
use tracing::debug;

/// Winner of one row's candidate scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestAlgorithm<'a> {
    /// Candidate name
    pub label: &'a str,
    /// Position in the candidate list
    pub index: usize,
    /// Winning score
    pub score: f64,
}

/// Pick the candidate with the strictly greatest score
///
/// `scores[i]` belongs to `candidates[i]`. Returns `None` if every score is
/// NaN or the list is empty.
#[must_use]
pub fn best_candidate<'a, S: AsRef<str>>(
    candidates: &'a [S],
    scores: &[f64],
) -> Option<BestAlgorithm<'a>> {
    let mut best: Option<BestAlgorithm<'a>> = None;
    for (index, (candidate, &score)) in candidates.iter().zip(scores).enumerate() {
        if score.is_nan() {
            continue;
        }
        if best.map_or(true, |b| score > b.score) {
            best = Some(BestAlgorithm {
                label: candidate.as_ref(),
                index,
                score,
            });
        }
    }
    best
}

/// Replace the class column with the best candidate of each row
///
/// The new class column is categorical over exactly `candidates` (order
/// preserved) and is appended at the end of the schema. Score columns stay in
/// place for later projection.
///
/// # Errors
/// - `Error::Config` if `candidates` is empty or repeats a name
/// - `Error::Schema` if the class column or a candidate's score column is missing
/// - `Error::InvalidInput` if a row has no comparable candidate score
pub fn synthesize<S: AsRef<str>>(table: &MetaTable, candidates: &[S]) -> Result<MetaTable> {
    let candidates: Vec<String> = candidates.iter().map(|c| c.as_ref().to_string()).collect();
    if candidates.is_empty() {
        return Err(Error::Config("no candidate algorithms configured".to_string()));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = candidates.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(Error::Config(format!("candidate `{dup}` listed twice")));
    }
    if table.column_index(CLASS_COLUMN).is_none() {
        return Err(Error::Schema(format!(
            "reserved column `{CLASS_COLUMN}` is absent"
        )));
    }

    let score_columns = candidates
        .iter()
        .map(|c| {
            let name = score_column(c);
            table.column_index(&name).ok_or_else(|| {
                Error::Schema(format!("candidate `{c}` has no score column `{name}`"))
            })
        })
        .collect::<Result<Vec<usize>>>()?;

    let mut keys = Vec::with_capacity(table.num_rows());
    let mut scores = vec![0.0; candidates.len()];
    for row in 0..table.num_rows() {
        for (slot, &col) in scores.iter_mut().zip(&score_columns) {
            *slot = table.numeric(row, col)?;
        }
        let best = best_candidate(&candidates, &scores).ok_or_else(|| {
            Error::InvalidInput(format!("row {row} has no comparable candidate score"))
        })?;
        keys.push(i32::try_from(best.index).map_err(|_| {
            Error::Config("too many candidate algorithms".to_string())
        })?);
    }

    let mut relabeled = table.clone();
    relabeled.remove_column(CLASS_COLUMN)?;
    relabeled.add_column(
        Field::new(CLASS_COLUMN, categorical_type(), false),
        categorical_from_keys(&candidates, keys)?,
    )?;
    debug!(
        rows = relabeled.num_rows(),
        candidates = candidates.len(),
        "relabeled meta-dataset"
    );
    Ok(relabeled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MetaTable {
        MetaTable::builder("meta")
            .numeric("openml_classifier_A", vec![0.9, 0.2, 0.5])
            .numeric("openml_classifier_B", vec![0.1, 0.8, 0.5])
            .numeric("openml_classifier_C", vec![0.95, 0.0, 0.1])
            .categorical("class", ["old"], ["old", "old", "old"])
            .numeric("f", vec![1.0, 2.0, 3.0])
            .build()
            .unwrap()
    }

    #[test]
    fn test_best_candidate_strict_greater() {
        let best = best_candidate(&["A", "B", "C"], &[0.3, 0.7, 0.5]).unwrap();
        assert_eq!(best.label, "B");
        assert_eq!(best.index, 1);
        assert!((best.score - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_best_candidate_tie_keeps_first() {
        let best = best_candidate(&["A", "B"], &[0.5, 0.5]).unwrap();
        assert_eq!(best.label, "A");
    }

    #[test]
    fn test_best_candidate_negative_and_nan() {
        let best = best_candidate(&["A", "B"], &[f64::NAN, -3.0]).unwrap();
        assert_eq!(best.label, "B");
        assert!(best_candidate(&["A"], &[f64::NAN]).is_none());
        assert!(best_candidate::<&str>(&[], &[]).is_none());
    }

    #[test]
    fn test_synthesize_restricted_to_candidates() {
        let relabeled = synthesize(&table(), &["A", "B"]).unwrap();
        let class = relabeled.column_index("class").unwrap();
        assert_eq!(class, relabeled.num_columns() - 1);
        assert_eq!(
            relabeled.categories(class).unwrap(),
            vec!["A".to_string(), "B".to_string()]
        );
        // C is ignored even where it scores highest; row 2 ties -> A
        let labels: Vec<_> = (0..3).map(|r| relabeled.label(r, class).unwrap()).collect();
        assert_eq!(labels, vec!["A", "B", "A"]);
        // score columns survive
        assert!(relabeled.column_index("openml_classifier_C").is_some());
    }

    #[test]
    fn test_synthesize_missing_score_column() {
        let err = synthesize(&table(), &["A", "Z"]).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert!(err.to_string().contains("openml_classifier_Z"));
    }

    #[test]
    fn test_synthesize_requires_class_column() {
        let table = MetaTable::builder("meta")
            .numeric("openml_classifier_A", vec![0.9])
            .build()
            .unwrap();
        assert!(matches!(synthesize(&table, &["A"]), Err(Error::Schema(_))));
    }

    #[test]
    fn test_synthesize_rejects_bad_candidate_lists() {
        assert!(matches!(
            synthesize::<&str>(&table(), &[]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            synthesize(&table(), &["A", "A"]),
            Err(Error::Config(_))
        ));
    }
}
