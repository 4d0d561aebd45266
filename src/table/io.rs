//! Table I/O: ARFF and Parquet
//!
//! `load`/`save` dispatch on the file extension. ARFF is the meta-dataset's
//! native format; Parquet round-trips the Arrow batch unchanged.
//!
//! Supported ARFF subset:
//! - `@relation`, `@attribute <name> numeric|real|integer|{v1,v2,...}`, `@data`
//! - dense comma-separated rows, `%` comments, quoted names and values
//! - `?` for missing values (NaN in numeric columns, null in nominal ones)

use super::{categorical_from_keys, ColumnKind, MetaTable};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// Load a table, choosing the reader by extension
///
/// # Errors
/// Returns error if the file cannot be read or parsed, or the extension is
/// neither `.arff` nor `.parquet`
pub fn load<P: AsRef<Path>>(path: P) -> Result<MetaTable> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("arff") => load_arff(path),
        Some("parquet") => load_parquet(path),
        _ => Err(Error::Storage(format!(
            "Unsupported table format: {}",
            path.display()
        ))),
    }
}

/// Save a table, choosing the writer by extension
///
/// # Errors
/// Returns error if the file cannot be written or the extension is unknown
pub fn save<P: AsRef<Path>>(table: &MetaTable, path: P) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("arff") => save_arff(table, path),
        Some("parquet") => save_parquet(table, path),
        _ => Err(Error::Storage(format!(
            "Unsupported table format: {}",
            path.display()
        ))),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn relation_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("table")
        .to_string()
}

/// Load table from Parquet file
///
/// # Errors
/// Returns error if file cannot be read or parsed
pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<MetaTable> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::Storage(format!("Failed to open Parquet file {}: {e}", path.display()))
    })?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
        Error::Storage(format!("Failed to parse Parquet file: {e}"))
    })?;
    let schema = builder.schema().clone();

    let reader = builder.build().map_err(|e| {
        Error::Storage(format!("Failed to create Parquet reader: {e}"))
    })?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| {
            Error::Storage(format!("Failed to read record batch: {e}"))
        })?;
        batches.push(batch);
    }

    let batch = arrow::compute::concat_batches(&schema, &batches)?;
    MetaTable::new(relation_name(path), batch)
}

/// Save table to Parquet file
///
/// # Errors
/// Returns error if the file cannot be created or written
pub fn save_parquet<P: AsRef<Path>>(table: &MetaTable, path: P) -> Result<()> {
    use parquet::arrow::ArrowWriter;

    let file = File::create(path.as_ref())?;
    let mut writer = ArrowWriter::try_new(file, table.schema(), None)?;
    writer.write(table.batch())?;
    writer.close()?;
    Ok(())
}

/// Load table from an ARFF file
///
/// # Errors
/// Returns error if the file cannot be read or is malformed
pub fn load_arff<P: AsRef<Path>>(path: P) -> Result<MetaTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::Storage(format!("Failed to open ARFF file {}: {e}", path.display()))
    })?;
    read_arff(BufReader::new(file), &relation_name(path))
}

/// Parse ARFF text from any buffered reader
///
/// # Errors
/// Returns error on malformed headers, unknown labels or ragged rows
pub fn read_arff<R: BufRead>(reader: R, default_name: &str) -> Result<MetaTable> {
    let mut relation = default_name.to_string();
    let mut attributes: Vec<(String, ColumnKind)> = Vec::new();
    let mut cells: Vec<Vec<String>> = Vec::new();
    let mut in_data = false;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = line_no + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }

        if in_data {
            let row = split_values(trimmed);
            if row.len() != attributes.len() {
                return Err(Error::Storage(format!(
                    "Line {line_no}: expected {} values, found {}",
                    attributes.len(),
                    row.len()
                )));
            }
            if cells.is_empty() {
                cells = vec![Vec::new(); attributes.len()];
            }
            for (column, value) in cells.iter_mut().zip(row) {
                column.push(value);
            }
            continue;
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("@relation") {
            relation = unquote(trimmed["@relation".len()..].trim());
        } else if lower.starts_with("@attribute") {
            attributes.push(parse_attribute(&trimmed["@attribute".len()..], line_no)?);
        } else if lower.starts_with("@data") {
            in_data = true;
        } else {
            return Err(Error::Storage(format!(
                "Line {line_no}: unexpected header line `{trimmed}`"
            )));
        }
    }

    if attributes.is_empty() {
        return Err(Error::Storage("ARFF file declares no attributes".to_string()));
    }
    if cells.is_empty() {
        cells = vec![Vec::new(); attributes.len()];
    }

    let num_rows = cells[0].len();
    let mut fields = Vec::with_capacity(attributes.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(attributes.len());
    for ((name, kind), values) in attributes.into_iter().zip(cells) {
        let array: ArrayRef = match &kind {
            ColumnKind::Numeric => Arc::new(Float64Array::from(
                values
                    .iter()
                    .map(|v| parse_number(&name, v))
                    .collect::<Result<Vec<f64>>>()?,
            )),
            ColumnKind::Categorical(categories) => nominal_array(&name, categories, &values)?,
        };
        let nullable =
            matches!(kind, ColumnKind::Categorical(_)) && values.iter().any(|v| v == "?");
        fields.push(Field::new(&name, kind.data_type(), nullable));
        arrays.push(array);
    }

    MetaTable::from_parts(relation, Arc::new(Schema::new(fields)), arrays, num_rows)
}

/// Nominal column; `?` becomes a null cell
fn nominal_array(name: &str, categories: &[String], values: &[String]) -> Result<ArrayRef> {
    let keys = values
        .iter()
        .map(|value| {
            if value == "?" {
                return Ok(None);
            }
            categories
                .iter()
                .position(|c| c == value)
                .and_then(|i| i32::try_from(i).ok())
                .map(Some)
                .ok_or_else(|| {
                    Error::Storage(format!(
                        "Label `{value}` is not a permitted value of `{name}`"
                    ))
                })
        })
        .collect::<Result<Vec<Option<i32>>>>()?;
    categorical_from_keys(categories, keys)
}

fn parse_attribute(rest: &str, line_no: usize) -> Result<(String, ColumnKind)> {
    let rest = rest.trim();
    let (name, type_decl) = split_name(rest).ok_or_else(|| {
        Error::Storage(format!("Line {line_no}: malformed @attribute `{rest}`"))
    })?;
    let type_decl = type_decl.trim();

    if type_decl.starts_with('{') {
        let inner = type_decl
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| {
                Error::Storage(format!("Line {line_no}: unterminated value set for `{name}`"))
            })?;
        return Ok((name, ColumnKind::Categorical(split_values(inner))));
    }

    match type_decl.to_ascii_lowercase().as_str() {
        "numeric" | "real" | "integer" => Ok((name, ColumnKind::Numeric)),
        other => Err(Error::Storage(format!(
            "Line {line_no}: unsupported attribute type `{other}` for `{name}`"
        ))),
    }
}

/// Split `name rest` where `name` may be quoted
fn split_name(text: &str) -> Option<(String, &str)> {
    let first = text.chars().next()?;
    if first == '\'' || first == '"' {
        let end = text[1..].find(first)? + 1;
        Some((text[1..end].to_string(), &text[end + 1..]))
    } else {
        let end = text.find(char::is_whitespace)?;
        Some((text[..end].to_string(), &text[end..]))
    }
}

/// Split a comma-separated list, honouring single and double quotes
fn split_values(text: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(c),
            (None, ',') => values.push(std::mem::take(&mut current).trim().to_string()),
            (None, c) => current.push(c),
        }
    }
    values.push(current.trim().to_string());
    values
}

fn unquote(text: &str) -> String {
    split_values(text).into_iter().next().unwrap_or_default()
}

fn parse_number(column: &str, value: &str) -> Result<f64> {
    if value == "?" {
        return Ok(f64::NAN);
    }
    value
        .parse()
        .map_err(|_| Error::Storage(format!("Column `{column}`: invalid number `{value}`")))
}

/// Save table to an ARFF file
///
/// # Errors
/// Returns error if the file cannot be written
pub fn save_arff<P: AsRef<Path>>(table: &MetaTable, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    write_arff(table, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Render a table as ARFF
///
/// # Errors
/// Returns error if writing fails
pub fn write_arff<W: Write>(table: &MetaTable, writer: &mut W) -> Result<()> {
    writeln!(writer, "@relation {}", quote(table.name()))?;
    writeln!(writer)?;
    for column in &table.columns() {
        let type_decl = match &column.kind {
            ColumnKind::Numeric => "numeric".to_string(),
            ColumnKind::Categorical(values) => format!(
                "{{{}}}",
                values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(",")
            ),
        };
        writeln!(writer, "@attribute {} {type_decl}", quote(&column.name))?;
    }
    writeln!(writer)?;
    writeln!(writer, "@data")?;

    let kinds: Vec<bool> = (0..table.num_columns())
        .map(|c| matches!(table.schema().field(c).data_type(), DataType::Dictionary(_, _)))
        .collect();
    for row in 0..table.num_rows() {
        let mut values = Vec::with_capacity(kinds.len());
        for (col, &categorical) in kinds.iter().enumerate() {
            if table.batch().column(col).is_null(row) {
                values.push("?".to_string());
            } else if categorical {
                values.push(quote(table.label(row, col)?));
            } else {
                let value = table.numeric(row, col)?;
                values.push(if value.is_nan() {
                    "?".to_string()
                } else {
                    value.to_string()
                });
            }
        }
        writeln!(writer, "{}", values.join(","))?;
    }
    Ok(())
}

fn quote(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '{' | '}' | '%' | '\'' | '"'));
    if needs_quotes {
        format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "% meta stream\n\
        @relation meta_stream\n\
        @attribute openml_task_id numeric\n\
        @attribute 'openml_classifier_moa.kNN(1)' numeric\n\
        @attribute class {'moa.kNN(1)', other}\n\
        @data\n\
        1,0.5,'moa.kNN(1)'\n\
        2,?,other\n";

    #[test]
    fn test_read_arff() {
        let table = read_arff(Cursor::new(SAMPLE), "fallback").unwrap();
        assert_eq!(table.name(), "meta_stream");
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column_index("openml_classifier_moa.kNN(1)"), Some(1));
        assert_eq!(table.label(0, 2).unwrap(), "moa.kNN(1)");
        assert!(table.numeric(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_read_arff_unknown_label() {
        let text = "@relation r\n@attribute class {a,b}\n@data\nc\n";
        let err = read_arff(Cursor::new(text), "r").unwrap_err();
        assert!(err.to_string().contains("Storage error"));
    }

    #[test]
    fn test_read_arff_missing_nominal_value() {
        let text = "@relation r\n@attribute x numeric\n@attribute class {a,b}\n@data\n1,?\n2,b\n";
        let table = read_arff(Cursor::new(text), "r").unwrap();
        assert!(table.schema().field(1).is_nullable());
        assert!(table.label_index(0, 1).is_err());
        assert_eq!(table.label(1, 1).unwrap(), "b");

        let mut out = Vec::new();
        write_arff(&table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1,?\n2,b\n"));
        let reread = read_arff(Cursor::new(text), "r").unwrap();
        assert_eq!(reread.schema(), table.schema());
    }

    #[test]
    fn test_read_arff_ragged_row() {
        let text = "@relation r\n@attribute x numeric\n@attribute y numeric\n@data\n1\n";
        let err = read_arff(Cursor::new(text), "r").unwrap_err();
        assert!(err.to_string().contains("Line 5"));
    }

    #[test]
    fn test_read_arff_unsupported_type() {
        let text = "@relation r\n@attribute when date\n@data\n";
        assert!(read_arff(Cursor::new(text), "r").is_err());
    }

    #[test]
    fn test_write_then_read_arff_keeps_labels_and_missing() {
        let table = read_arff(Cursor::new(SAMPLE), "fallback").unwrap();
        let mut out = Vec::new();
        write_arff(&table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("@attribute openml_classifier_moa.kNN(1) numeric"));
        assert!(text.contains("@attribute class {moa.kNN(1),other}"));
        assert!(text.contains("2,?,other"));

        let reread = read_arff(Cursor::new(text), "x").unwrap();
        assert_eq!(reread.schema(), table.schema());
        assert_eq!(reread.label(0, 2).unwrap(), "moa.kNN(1)");
    }

    #[test]
    fn test_parquet_file_round_trip() {
        let table = read_arff(Cursor::new(SAMPLE), "meta").unwrap();
        let path = std::env::temp_dir().join("metastream_io_test.parquet");
        save(&table, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.num_rows(), 2);
        assert_eq!(loaded.label(1, 2).unwrap(), "other");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unknown_extension() {
        let err = load("/tmp/meta.csv").unwrap_err();
        assert!(err.to_string().contains("Unsupported table format"));
    }
}
