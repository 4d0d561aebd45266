//! Meta-Table: the in-memory meta-dataset (Arrow `RecordBatch`)
//!
//! **Column kinds**:
//! - Numeric: `Float64` (integer source columns are read as numbers too)
//! - Categorical: `Dictionary(Int32, Utf8)`. The dictionary values array is the
//!   ordered, fixed set of permitted labels, so out-of-set values cannot be
//!   represented at all.
//!
//! Tables are append-only. Every derived table (projection, filter, take) is a
//! fresh copy; the source is never touched.

pub mod io;

use crate::{Error, Result};
use arrow::array::{
    Array, ArrayRef, BooleanArray, DictionaryArray, Float32Array, Float64Array, Int32Array,
    Int64Array, StringArray, UInt32Array,
};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Int32Type, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::fmt;
use std::sync::Arc;

/// Kind of a meta-dataset column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// Continuous value
    Numeric,
    /// One of an ordered, fixed set of labels
    Categorical(Vec<String>),
}

impl ColumnKind {
    /// Arrow type used to store this kind
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Numeric => DataType::Float64,
            Self::Categorical(_) => categorical_type(),
        }
    }
}

/// Arrow type of categorical columns
#[must_use]
pub fn categorical_type() -> DataType {
    DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
}

/// Named, typed column description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name, unique within a table
    pub name: String,
    /// Column kind
    pub kind: ColumnKind,
}

/// Meta-dataset table
#[derive(Debug, Clone)]
pub struct MetaTable {
    name: String,
    batch: RecordBatch,
}

impl MetaTable {
    /// Wrap an existing record batch
    ///
    /// # Errors
    /// Returns error if the batch contains a column type the meta-table
    /// cannot read, or duplicate column names
    pub fn new(name: impl Into<String>, batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        for (i, field) in schema.fields().iter().enumerate() {
            if !is_supported(field.data_type()) {
                return Err(Error::Storage(format!(
                    "Unsupported type {} for column `{}`",
                    field.data_type(),
                    field.name()
                )));
            }
            if schema.fields()[..i].iter().any(|f| f.name() == field.name()) {
                return Err(Error::Storage(format!(
                    "Duplicate column `{}`",
                    field.name()
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            batch,
        })
    }

    /// Assemble a table from a schema and matching columns
    ///
    /// Works for zero-column schemas too (the row count is explicit).
    ///
    /// # Errors
    /// Returns error if the columns don't match the schema
    pub fn from_parts(
        name: impl Into<String>,
        schema: SchemaRef,
        columns: Vec<ArrayRef>,
        num_rows: usize,
    ) -> Result<Self> {
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        let batch = RecordBatch::try_new_with_options(schema, columns, &options)?;
        Self::new(name, batch)
    }

    /// Create a builder for a table
    #[must_use]
    pub fn builder(name: impl Into<String>) -> MetaTableBuilder {
        MetaTableBuilder::new(name)
    }

    /// Relation name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying Arrow batch
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Arrow schema
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Number of columns
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// Column descriptions in schema order
    #[must_use]
    pub fn columns(&self) -> Vec<Column> {
        (0..self.num_columns())
            .map(|i| Column {
                name: self.batch.schema().field(i).name().clone(),
                kind: self.kind(i),
            })
            .collect()
    }

    /// Index of the column with the given name
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.batch.schema().index_of(name).ok()
    }

    /// Kind of the column at `col`
    ///
    /// # Panics
    /// Panics if `col` is out of bounds
    #[must_use]
    pub fn kind(&self, col: usize) -> ColumnKind {
        match self.batch.schema().field(col).data_type() {
            DataType::Dictionary(_, _) => ColumnKind::Categorical(
                self.categories(col).unwrap_or_default(),
            ),
            _ => ColumnKind::Numeric,
        }
    }

    /// Ordered permitted values of a categorical column
    ///
    /// # Errors
    /// Returns error if the column is not categorical
    pub fn categories(&self, col: usize) -> Result<Vec<String>> {
        let values = self.dictionary(col)?.1;
        Ok((0..values.len()).map(|i| values.value(i).to_string()).collect())
    }

    /// Numeric value at (`row`, `col`)
    ///
    /// Categorical columns yield their category index.
    ///
    /// # Errors
    /// Returns error if `row`/`col` are out of bounds
    #[allow(clippy::cast_precision_loss)]
    pub fn numeric(&self, row: usize, col: usize) -> Result<f64> {
        self.check_bounds(row, col)?;
        let array = self.batch.column(col);
        if array.is_null(row) {
            return Ok(f64::NAN);
        }
        let value = match array.data_type() {
            DataType::Float64 => downcast::<Float64Array>(array)?.value(row),
            DataType::Float32 => f64::from(downcast::<Float32Array>(array)?.value(row)),
            DataType::Int32 => f64::from(downcast::<Int32Array>(array)?.value(row)),
            DataType::Int64 => downcast::<Int64Array>(array)?.value(row) as f64,
            DataType::Dictionary(_, _) => f64::from(self.dictionary(col)?.0.keys().value(row)),
            other => {
                return Err(Error::InvalidInput(format!(
                    "Column `{}` has non-numeric type {other}",
                    self.column_name(col)
                )))
            }
        };
        Ok(value)
    }

    /// Integer value at (`row`, `col`), used for task ids and interval keys
    ///
    /// # Errors
    /// Returns error if the value is missing or not finite
    #[allow(clippy::cast_possible_truncation)]
    pub fn integer(&self, row: usize, col: usize) -> Result<i64> {
        let value = self.numeric(row, col)?;
        if !value.is_finite() {
            return Err(Error::InvalidInput(format!(
                "Column `{}` row {row}: expected an integer, found {value}",
                self.column_name(col)
            )));
        }
        Ok(value as i64)
    }

    /// Category index at (`row`, `col`)
    ///
    /// # Errors
    /// Returns error if the column is not categorical or the cell is missing
    pub fn label_index(&self, row: usize, col: usize) -> Result<usize> {
        self.check_bounds(row, col)?;
        let (dict, _) = self.dictionary(col)?;
        if dict.is_null(row) {
            return Err(Error::InvalidInput(format!(
                "Column `{}` row {row}: missing label",
                self.column_name(col)
            )));
        }
        usize::try_from(dict.keys().value(row)).map_err(|_| {
            Error::InvalidInput(format!(
                "Column `{}` row {row}: negative category key",
                self.column_name(col)
            ))
        })
    }

    /// Label at (`row`, `col`)
    ///
    /// # Errors
    /// Returns error if the column is not categorical or the cell is missing
    pub fn label(&self, row: usize, col: usize) -> Result<&str> {
        let index = self.label_index(row, col)?;
        Ok(self.dictionary(col)?.1.value(index))
    }

    /// Append a column at the end of the schema
    ///
    /// # Errors
    /// Returns error if the name is taken or the length doesn't match
    pub fn add_column(&mut self, field: Field, array: ArrayRef) -> Result<()> {
        if self.column_index(field.name()).is_some() {
            return Err(Error::InvalidInput(format!(
                "Column `{}` already exists",
                field.name()
            )));
        }
        if array.len() != self.num_rows() {
            return Err(Error::InvalidInput(format!(
                "Column `{}` has {} values, table has {} rows",
                field.name(),
                array.len(),
                self.num_rows()
            )));
        }
        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        fields.push(field);
        let mut columns = self.batch.columns().to_vec();
        columns.push(array);
        let num_rows = self.num_rows();
        *self = Self::from_parts(
            self.name.clone(),
            Arc::new(Schema::new(fields)),
            columns,
            num_rows,
        )?;
        Ok(())
    }

    /// Remove a column by name, returning its data
    ///
    /// # Errors
    /// Returns error if the column doesn't exist
    pub fn remove_column(&mut self, name: &str) -> Result<ArrayRef> {
        let index = self
            .column_index(name)
            .ok_or_else(|| Error::InvalidInput(format!("Column not found: {name}")))?;
        let removed = self.batch.remove_column(index);
        Ok(removed)
    }

    /// Append all rows of `other` (OLAP-style bulk append)
    ///
    /// # Errors
    /// Returns error if the schemas differ
    pub fn append(&mut self, other: &Self) -> Result<()> {
        if other.schema() != self.schema() {
            return Err(Error::InvalidInput(format!(
                "Schema mismatch: expected {:?}, got {:?}",
                self.schema(),
                other.schema()
            )));
        }
        let combined = compute::concat_batches(&self.schema(), [&self.batch, &other.batch])?;
        self.batch = combined;
        Ok(())
    }

    /// Keep the rows where `mask` is true, in order
    ///
    /// # Errors
    /// Returns error if the mask length doesn't match
    pub fn filter(&self, name: impl Into<String>, mask: &BooleanArray) -> Result<Self> {
        if mask.len() != self.num_rows() {
            return Err(Error::InvalidInput(format!(
                "Mask has {} entries, table has {} rows",
                mask.len(),
                self.num_rows()
            )));
        }
        let batch = compute::filter_record_batch(&self.batch, mask)?;
        Ok(Self {
            name: name.into(),
            batch,
        })
    }

    /// Copy the rows at `indices`, in the given order
    ///
    /// # Errors
    /// Returns error if an index is out of bounds
    pub fn take_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.num_rows()) {
            return Err(Error::InvalidInput(format!(
                "Row {bad} out of bounds (table has {} rows)",
                self.num_rows()
            )));
        }
        let indices = UInt32Array::from_iter_values(
            indices
                .iter()
                .map(|&i| u32::try_from(i).unwrap_or(u32::MAX)),
        );
        let columns = self
            .batch
            .columns()
            .iter()
            .map(|c| compute::take(c.as_ref(), &indices, None))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::from_parts(self.name.clone(), self.schema(), columns, indices.len())
    }

    fn column_name(&self, col: usize) -> String {
        self.batch.schema().field(col).name().clone()
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        if col >= self.num_columns() {
            return Err(Error::InvalidInput(format!(
                "Column index {col} out of bounds (table has {} columns)",
                self.num_columns()
            )));
        }
        if row >= self.num_rows() {
            return Err(Error::InvalidInput(format!(
                "Row {row} out of bounds (table has {} rows)",
                self.num_rows()
            )));
        }
        Ok(())
    }

    fn dictionary(&self, col: usize) -> Result<(&DictionaryArray<Int32Type>, &StringArray)> {
        let array = self.batch.column(col);
        let dict = array
            .as_any()
            .downcast_ref::<DictionaryArray<Int32Type>>()
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Column `{}` is not categorical",
                    self.column_name(col)
                ))
            })?;
        let values = downcast::<StringArray>(dict.values())?;
        Ok((dict, values))
    }
}

impl fmt::Display for MetaTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} rows x {} columns)",
            self.name,
            self.num_rows(),
            self.num_columns()
        )
    }
}

fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Other(format!("Failed to downcast {}", array.data_type())))
}

fn is_supported(data_type: &DataType) -> bool {
    match data_type {
        DataType::Float64 | DataType::Float32 | DataType::Int32 | DataType::Int64 => true,
        DataType::Dictionary(key, value) => {
            key.as_ref() == &DataType::Int32 && value.as_ref() == &DataType::Utf8
        }
        _ => false,
    }
}

/// Build a categorical array from labels and the permitted value set
///
/// # Errors
/// Returns error if a label is not one of `categories`
pub fn categorical_array<S: AsRef<str>>(
    column: &str,
    categories: &[String],
    labels: &[S],
) -> Result<ArrayRef> {
    let keys = labels
        .iter()
        .map(|label| {
            let label = label.as_ref();
            categories
                .iter()
                .position(|c| c == label)
                .and_then(|i| i32::try_from(i).ok())
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Label `{label}` is not a permitted value of `{column}`"
                    ))
                })
        })
        .collect::<Result<Vec<i32>>>()?;
    categorical_from_keys(categories, keys)
}

/// Build a categorical array from category keys
///
/// Keys may be `Vec<i32>` or, for columns with missing labels, `Vec<Option<i32>>`.
///
/// # Errors
/// Returns error if a key doesn't index into `categories`
pub fn categorical_from_keys(
    categories: &[String],
    keys: impl Into<Int32Array>,
) -> Result<ArrayRef> {
    let values = StringArray::from_iter_values(categories.iter());
    let dict = DictionaryArray::<Int32Type>::try_new(keys.into(), Arc::new(values))?;
    Ok(Arc::new(dict))
}

enum ColumnData {
    Numeric(Vec<f64>),
    Categorical {
        categories: Vec<String>,
        labels: Vec<String>,
    },
}

/// Builder for `MetaTable`, one column at a time
#[derive(Default)]
pub struct MetaTableBuilder {
    name: String,
    columns: Vec<(String, ColumnData)>,
}

impl MetaTableBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a numeric column
    #[must_use]
    pub fn numeric(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.push((name.into(), ColumnData::Numeric(values)));
        self
    }

    /// Add a categorical column with its permitted values
    #[must_use]
    pub fn categorical<S: Into<String>, L: Into<String>>(
        mut self,
        name: impl Into<String>,
        categories: impl IntoIterator<Item = S>,
        labels: impl IntoIterator<Item = L>,
    ) -> Self {
        self.columns.push((
            name.into(),
            ColumnData::Categorical {
                categories: categories.into_iter().map(Into::into).collect(),
                labels: labels.into_iter().map(Into::into).collect(),
            },
        ));
        self
    }

    /// Build the table
    ///
    /// # Errors
    /// Returns error if column lengths differ, names repeat or a label is
    /// outside its column's value set
    pub fn build(self) -> Result<MetaTable> {
        let num_rows = self.columns.first().map_or(0, |(_, data)| match data {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Categorical { labels, .. } => labels.len(),
        });

        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());
        for (name, data) in self.columns {
            let (field, array) = match data {
                ColumnData::Numeric(values) => (
                    Field::new(&name, DataType::Float64, false),
                    Arc::new(Float64Array::from(values)) as ArrayRef,
                ),
                ColumnData::Categorical { categories, labels } => (
                    Field::new(&name, categorical_type(), false),
                    categorical_array(&name, &categories, &labels)?,
                ),
            };
            if array.len() != num_rows {
                return Err(Error::InvalidInput(format!(
                    "Column `{name}` has {} values, expected {num_rows}",
                    array.len()
                )));
            }
            fields.push(field);
            arrays.push(array);
        }

        MetaTable::from_parts(self.name, Arc::new(Schema::new(fields)), arrays, num_rows)
    }
}
