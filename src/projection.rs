//! Attribute projection between the full meta-dataset and derived tables
//!
//! Two schemas are derived from the full one:
//! - **train/test**: every column except the task id and the score columns
//! - **score**: one column per score column, reserved prefix stripped
//!
//! Rows are moved between schemas by a [`RowMapping`], resolved by column name
//! once per table pair. A destination column without a source is reported
//! when the mapping is built, never per row.

use crate::table::MetaTable;
use crate::{Error, Result};
use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema, SchemaRef};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Task identifier column (partition key only)
pub const TASK_ID_COLUMN: &str = "openml_task_id";

/// Prefix of per-algorithm score columns
pub const SCORE_PREFIX: &str = "openml_classifier_";

/// Class column holding the best-algorithm label
pub const CLASS_COLUMN: &str = "class";

/// Interval key column (aggregation only)
pub const INTERVAL_COLUMN: &str = "openml_interval_start";

/// Score column name for an algorithm
#[must_use]
pub fn score_column(algorithm: &str) -> String {
    format!("{SCORE_PREFIX}{algorithm}")
}

/// Algorithm name of a score column, if `column` is one
#[must_use]
pub fn algorithm_name(column: &str) -> Option<&str> {
    column.strip_prefix(SCORE_PREFIX)
}

/// Schema used for the train and test tables
///
/// Pure, order-preserving filter of `source`.
#[must_use]
pub fn train_test_schema(source: &Schema) -> Schema {
    Schema::new(
        source
            .fields()
            .iter()
            .filter(|f| f.name() != TASK_ID_COLUMN && algorithm_name(f.name()).is_none())
            .map(|f| f.as_ref().clone())
            .collect::<Vec<Field>>(),
    )
}

/// Schema used for the score table
///
/// Pure, order-preserving filter and rename of `source`.
#[must_use]
pub fn score_schema(source: &Schema) -> Schema {
    Schema::new(
        source
            .fields()
            .iter()
            .filter(|f| f.name() != TASK_ID_COLUMN)
            .filter_map(|f| {
                algorithm_name(f.name()).map(|name| f.as_ref().clone().with_name(name))
            })
            .collect::<Vec<Field>>(),
    )
}

/// Both derived schemas of a meta-dataset
#[derive(Debug, Clone)]
pub struct AttributeProjector {
    train_test: SchemaRef,
    scores: SchemaRef,
}

impl AttributeProjector {
    /// Derive the train/test and score schemas from `source`
    #[must_use]
    pub fn new(source: &Schema) -> Self {
        Self {
            train_test: Arc::new(train_test_schema(source)),
            scores: Arc::new(score_schema(source)),
        }
    }

    /// Train/test schema
    #[must_use]
    pub fn train_test(&self) -> SchemaRef {
        Arc::clone(&self.train_test)
    }

    /// Score schema
    #[must_use]
    pub fn scores(&self) -> SchemaRef {
        Arc::clone(&self.scores)
    }
}

/// Destination column -> source column index, resolved once per table pair
#[derive(Debug, Clone)]
pub struct RowMapping {
    destination: SchemaRef,
    sources: Vec<usize>,
}

impl RowMapping {
    /// Start building a mapping out of `source`
    #[must_use]
    pub fn builder(source: &Schema) -> RowMappingBuilder<'_> {
        RowMappingBuilder::new(source)
    }

    /// Destination schema
    #[must_use]
    pub fn destination(&self) -> SchemaRef {
        Arc::clone(&self.destination)
    }

    /// Source column index feeding destination column `col`
    #[must_use]
    pub fn source_of(&self, col: usize) -> Option<usize> {
        self.sources.get(col).copied()
    }

    /// Rewrite every row of `table` under the destination schema
    ///
    /// # Errors
    /// Returns error if `table` is narrower than the schema the mapping was
    /// built from
    pub fn apply(&self, table: &MetaTable, name: impl Into<String>) -> Result<MetaTable> {
        let batch = table.batch();
        let columns = self
            .sources
            .iter()
            .map(|&i| {
                if i < batch.num_columns() {
                    Ok(Arc::clone(batch.column(i)))
                } else {
                    Err(Error::InvalidInput(format!(
                        "Source column {i} out of bounds (table has {} columns)",
                        batch.num_columns()
                    )))
                }
            })
            .collect::<Result<Vec<ArrayRef>>>()?;
        MetaTable::from_parts(name, self.destination(), columns, table.num_rows())
    }
}

/// Builder for [`RowMapping`]
pub struct RowMappingBuilder<'a> {
    source: &'a Schema,
    prefix: &'a str,
}

impl<'a> RowMappingBuilder<'a> {
    fn new(source: &'a Schema) -> Self {
        Self { source, prefix: "" }
    }

    /// Prefix re-added to destination names before the source lookup
    #[must_use]
    pub const fn source_prefix(mut self, prefix: &'a str) -> Self {
        self.prefix = prefix;
        self
    }

    /// Resolve every destination column against the source
    ///
    /// # Errors
    /// Returns `Error::Schema` naming the first destination column with no
    /// source column, or whose type differs from its source
    pub fn build(self, destination: SchemaRef) -> Result<RowMapping> {
        let lookup: FxHashMap<&str, usize> = self
            .source
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().as_str(), i))
            .collect();

        let sources = destination
            .fields()
            .iter()
            .map(|field| {
                let wanted = format!("{}{}", self.prefix, field.name());
                let index = *lookup.get(wanted.as_str()).ok_or_else(|| {
                    Error::Schema(format!(
                        "no source column `{wanted}` for `{}`",
                        field.name()
                    ))
                })?;
                let found = self.source.field(index).data_type();
                if found != field.data_type() {
                    return Err(Error::Schema(format!(
                        "column `{wanted}` has type {found}, expected {}",
                        field.data_type()
                    )));
                }
                Ok(index)
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(RowMapping {
            destination,
            sources,
        })
    }
}
