//! Majority-class baseline

use super::{argmax, class_labels, Learner, Model};
use crate::table::MetaTable;
use crate::Result;

/// Always predicts the most frequent training label (lowest index on ties)
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityClass;

struct Constant(usize);

impl Model for Constant {
    fn predict(&self, _table: &MetaTable, _row: usize) -> Result<usize> {
        Ok(self.0)
    }
}

impl Learner for MajorityClass {
    fn name(&self) -> &str {
        "majority-class"
    }

    fn train(&self, table: &MetaTable, class: usize) -> Result<Box<dyn Model>> {
        let (num_classes, labels) = class_labels(table, class)?;
        let mut counts = vec![0; num_classes];
        for label in labels {
            counts[label] += 1;
        }
        Ok(Box::new(Constant(argmax(&counts))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_predicts_majority() {
        let table = MetaTable::builder("t")
            .categorical("class", ["a", "b", "c"], ["c", "b", "c", "a"])
            .build()
            .unwrap();
        let model = MajorityClass.train(&table, 0).unwrap();
        assert_eq!(model.predict(&table, 1).unwrap(), 2);
    }

    #[test]
    fn test_tie_picks_first_label() {
        let table = MetaTable::builder("t")
            .categorical("class", ["a", "b"], ["b", "a"])
            .build()
            .unwrap();
        let model = MajorityClass.train(&table, 0).unwrap();
        assert_eq!(model.predict(&table, 0).unwrap(), 0);
    }

    #[test]
    fn test_empty_table_fails() {
        let table = MetaTable::builder("t")
            .categorical("class", ["a"], Vec::<String>::new())
            .build()
            .unwrap();
        assert!(matches!(
            MajorityClass.train(&table, 0),
            Err(Error::Learner(_))
        ));
    }
}
