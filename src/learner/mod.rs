//! Learning capability
//!
//! The driver only sees [`Learner`] and [`Model`]; any classifier can be
//! plugged in as the meta-learner or the baseline.
//!
//! ```rust
//! use metastream::learner::{Learner, MajorityClass};
//! use metastream::table::MetaTable;
//!
//! # fn main() -> metastream::Result<()> {
//! let table = MetaTable::builder("train")
//!     .numeric("x", vec![1.0, 2.0, 3.0])
//!     .categorical("class", ["a", "b"], ["b", "b", "a"])
//!     .build()?;
//!
//! let model = MajorityClass.train(&table, 1)?;
//! assert_eq!(model.predict(&table, 0)?, 1);
//! # Ok(())
//! # }
//! ```

mod forest;
mod majority;

pub use forest::{ForestParams, RandomForest};
pub use majority::MajorityClass;

use crate::projection::INTERVAL_COLUMN;
use crate::table::MetaTable;
use crate::{Error, Result};

/// Trains a model from a table with a categorical class column
pub trait Learner {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Train on every row of `table`, predicting column `class`
    ///
    /// # Errors
    /// Returns `Error::Learner` if the table cannot be learned from
    fn train(&self, table: &MetaTable, class: usize) -> Result<Box<dyn Model>>;
}

/// A trained classifier
pub trait Model {
    /// Predict the class of `table`'s row `row`
    ///
    /// Returns an index into the class column's value set.
    ///
    /// # Errors
    /// Returns `Error::Learner` if the row cannot be classified
    fn predict(&self, table: &MetaTable, row: usize) -> Result<usize>;
}

/// Column indices usable as predictive features
///
/// Everything except the class column and the interval key.
#[must_use]
pub fn feature_columns(table: &MetaTable, class: usize) -> Vec<usize> {
    (0..table.num_columns())
        .filter(|&c| c != class && table.schema().field(c).name() != INTERVAL_COLUMN)
        .collect()
}

/// Class labels of every row, validating the class column first
fn class_labels(table: &MetaTable, class: usize) -> Result<(usize, Vec<usize>)> {
    let categories = table
        .categories(class)
        .map_err(|e| Error::Learner(format!("class column: {e}")))?;
    if categories.is_empty() {
        return Err(Error::Learner("class column has no labels".to_string()));
    }
    if table.num_rows() == 0 {
        return Err(Error::Learner(format!(
            "cannot train on empty table `{}`",
            table.name()
        )));
    }
    let labels = (0..table.num_rows())
        .map(|row| table.label_index(row, class))
        .collect::<Result<Vec<usize>>>()
        .map_err(|e| Error::Learner(e.to_string()))?;
    Ok((categories.len(), labels))
}

/// Index of the largest count, lowest index on ties
fn argmax(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_columns_skip_class_and_interval() {
        let table = MetaTable::builder("t")
            .numeric("x", vec![1.0])
            .numeric(INTERVAL_COLUMN, vec![0.0])
            .numeric("y", vec![2.0])
            .categorical("class", ["a"], ["a"])
            .build()
            .unwrap();
        assert_eq!(feature_columns(&table, 3), vec![0, 2]);
    }

    #[test]
    fn test_argmax_lowest_index_on_ties() {
        assert_eq!(argmax(&[1, 3, 3]), 1);
        assert_eq!(argmax(&[0, 0]), 0);
    }

    #[test]
    fn test_class_labels_rejects_numeric_class() {
        let table = MetaTable::builder("t")
            .numeric("x", vec![1.0])
            .build()
            .unwrap();
        assert!(matches!(class_labels(&table, 0), Err(Error::Learner(_))));
    }
}
