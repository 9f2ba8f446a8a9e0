//! Conversion engine
//!
//! Applies a registered schema to a normalized all-text batch. A value that
//! fails conversion becomes null in its typed column, keeps its original
//! text in the auxiliary column (when the schema has one) and is counted.
//! Conversion never touches the store.

use super::types::{ConversionOutput, ErrorCounts};
use crate::coerce::{days_since_epoch, is_integer_literal, parse_bool_token, parse_decimal, parse_yyyymmdd, DateParse};
use crate::error::{Error, Result};
use crate::schema::{Schema, SchemaColumn, TargetType, NUMERIC_PRECISION, NUMERIC_SCALE};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanBuilder, Date32Builder, Decimal128Builder, Int16Builder,
    Int32Builder, Int64Builder, StringArray, StringBuilder,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;
use tracing::debug;

/// Outcome of converting one raw value
enum Parsed<T> {
    Null,
    Value(T),
    /// Usable value, but the original text is kept and counted
    Repaired(T),
    Failed,
}

/// Auxiliary raw-value column under construction
struct AuxColumn {
    builder: StringBuilder,
    failures: u64,
}

impl AuxColumn {
    fn with_capacity(rows: usize) -> Self {
        Self {
            builder: StringBuilder::with_capacity(rows, 0),
            failures: 0,
        }
    }

    fn pass(&mut self) {
        self.builder.append_null();
    }

    fn fail(&mut self, original: &str) {
        self.builder.append_value(original);
        self.failures += 1;
    }
}

/// Convert a normalized batch to the schema's target types
pub fn convert(batch: &RecordBatch, schema: &Schema) -> Result<ConversionOutput> {
    let missing: Vec<&str> = schema
        .columns
        .iter()
        .filter(|c| batch.column_by_name(&c.name).is_none())
        .map(|c| c.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(Error::StructuralMismatch {
            record_group: schema.record_group.clone(),
            expected: schema.columns.len(),
            found: schema.columns.len() - missing.len(),
            message: format!("missing columns: {}", missing.join(", ")),
        });
    }

    let rows = batch.num_rows();
    let mut fields = Vec::with_capacity(schema.columns.len() * 2 + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.columns.len() * 2 + 1);
    let mut aux_fields = Vec::new();
    let mut aux_arrays: Vec<ArrayRef> = Vec::new();
    let mut error_counts = ErrorCounts::new();

    for column in &schema.columns {
        let raw = batch
            .column_by_name(&column.name)
            .ok_or_else(|| Error::conversion(&column.name, "column disappeared from batch"))?;
        let text = text_column(&column.name, raw)?;
        let values = text.as_string::<i32>();

        let mut aux = AuxColumn::with_capacity(rows);
        let typed = convert_column(column, values, &mut aux)?;

        fields.push(Field::new(&column.name, column.target_type.arrow_type(), true));
        arrays.push(typed);
        error_counts.insert(column.name.clone(), aux.failures);

        // Auxiliary columns only survive when something failed in this batch
        if column.has_auxiliary && aux.failures > 0 {
            aux_fields.push(Field::new(column.auxiliary_name(), DataType::Utf8, true));
            aux_arrays.push(Arc::new(aux.builder.finish()));
        }
    }

    fields.extend(aux_fields);
    arrays.extend(aux_arrays);

    // The partition key, when the unit carries one, passes through for tagging
    if schema.column(&schema.partition_key).is_none() {
        if let Some(key) = batch.column_by_name(&schema.partition_key) {
            fields.push(Field::new(&schema.partition_key, DataType::Utf8, true));
            arrays.push(text_column(&schema.partition_key, key)?);
        }
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    let converted =
        RecordBatch::try_new_with_options(Arc::new(ArrowSchema::new(fields)), arrays, &options)?;
    let output = ConversionOutput {
        batch: converted,
        error_counts,
    };

    debug!(
        record_group = %schema.record_group,
        rows,
        errors = output.total_errors(),
        "Converted batch"
    );
    Ok(output)
}

fn text_column(name: &str, array: &ArrayRef) -> Result<ArrayRef> {
    if array.data_type() == &DataType::Utf8 {
        return Ok(Arc::clone(array));
    }
    cast(array, &DataType::Utf8).map_err(|e| Error::conversion(name, format!("cannot read as text: {e}")))
}

fn convert_column(column: &SchemaColumn, values: &StringArray, aux: &mut AuxColumn) -> Result<ArrayRef> {
    let rows = values.len();
    let array: ArrayRef = match column.target_type {
        TargetType::SmallInt => {
            let mut b = Int16Builder::with_capacity(rows);
            drive(values, aux, parse_int::<i16>, |v| b.append_option(v));
            Arc::new(b.finish())
        }
        TargetType::Integer => {
            let mut b = Int32Builder::with_capacity(rows);
            drive(values, aux, parse_int::<i32>, |v| b.append_option(v));
            Arc::new(b.finish())
        }
        TargetType::BigInt => {
            let mut b = Int64Builder::with_capacity(rows);
            drive(values, aux, parse_int::<i64>, |v| b.append_option(v));
            Arc::new(b.finish())
        }
        TargetType::Numeric => {
            let mut b = Decimal128Builder::with_capacity(rows)
                .with_precision_and_scale(NUMERIC_PRECISION, NUMERIC_SCALE)
                .map_err(|e| Error::conversion(&column.name, e.to_string()))?;
            let scale = NUMERIC_SCALE as u32;
            drive(
                values,
                aux,
                |v| parse_decimal(v, scale).map_or(Parsed::Failed, Parsed::Value),
                |v| b.append_option(v),
            );
            Arc::new(b.finish())
        }
        TargetType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(rows);
            drive(
                values,
                aux,
                |v| parse_bool_token(v).map_or(Parsed::Failed, Parsed::Value),
                |v| b.append_option(v),
            );
            Arc::new(b.finish())
        }
        TargetType::Date => {
            let mut b = Date32Builder::with_capacity(rows);
            drive(values, aux, parse_date, |v| b.append_option(v));
            Arc::new(b.finish())
        }
        // Declared widths are advisory; text is only trimmed
        TargetType::FixedText(_) | TargetType::VarText(_) | TargetType::Text => {
            let mut b = StringBuilder::with_capacity(rows, values.value_data().len());
            drive(values, aux, Parsed::Value, |v| b.append_option(v));
            Arc::new(b.finish())
        }
    };
    Ok(array)
}

/// Run every value through `parse`, feeding results to `append` and failures to `aux`
fn drive<'a, T>(
    values: &'a StringArray,
    aux: &mut AuxColumn,
    parse: impl Fn(&'a str) -> Parsed<T>,
    mut append: impl FnMut(Option<T>),
) {
    for value in values {
        let Some(original) = value else {
            append(None);
            aux.pass();
            continue;
        };
        let trimmed = original.trim();
        let parsed = if trimmed.is_empty() {
            Parsed::Null
        } else {
            parse(trimmed)
        };

        match parsed {
            Parsed::Null => {
                append(None);
                aux.pass();
            }
            Parsed::Value(v) => {
                append(Some(v));
                aux.pass();
            }
            Parsed::Repaired(v) => {
                append(Some(v));
                aux.fail(original);
            }
            Parsed::Failed => {
                append(None);
                aux.fail(original);
            }
        }
    }
}

fn parse_int<T: TryFrom<i64>>(value: &str) -> Parsed<T> {
    if !is_integer_literal(value) {
        return Parsed::Failed;
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|n| T::try_from(n).ok())
        .map_or(Parsed::Failed, Parsed::Value)
}

fn parse_date(value: &str) -> Parsed<i32> {
    match parse_yyyymmdd(value) {
        DateParse::Valid(d) => Parsed::Value(days_since_epoch(d)),
        DateParse::NoDate => Parsed::Null,
        DateParse::Repaired(d) => Parsed::Repaired(days_since_epoch(d)),
        DateParse::Invalid => Parsed::Failed,
    }
}
