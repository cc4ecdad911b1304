//! Columns, values and the row abstraction consumed by the evaluator.

use std::collections::HashMap;
use std::fmt;

use arrow::array::{
    Array, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, LargeStringArray, StringArray, StringViewArray, UInt16Array, UInt32Array,
    UInt64Array, UInt8Array,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use serde::{Deserialize, Serialize};

use crate::error::{RefDataError, Result};

/// One analyzed field, identified by name, with its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    name: String,
    data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    /// Creates a string-typed column.
    pub fn utf8(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Utf8)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A raw cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the canonical string form of the value, `None` for nulls.
    pub fn to_canonical_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A record the evaluator can read column values from.
pub trait InputRow {
    /// Returns the value of `column` in this row.
    ///
    /// Errors are row-level faults: the evaluator records `Unavailable` for every
    /// output slot of the column and carries on.
    fn value(&self, column: &Column) -> Result<Value>;
}

impl InputRow for HashMap<String, Value> {
    fn value(&self, column: &Column) -> Result<Value> {
        self.get(column.name())
            .cloned()
            .ok_or_else(|| RefDataError::ColumnNotFound {
                column: column.name().to_string(),
            })
    }
}

/// A view of a single row inside an Arrow [`RecordBatch`].
#[derive(Debug, Clone, Copy)]
pub struct BatchRow<'a> {
    batch: &'a RecordBatch,
    row: usize,
}

impl<'a> BatchRow<'a> {
    pub fn new(batch: &'a RecordBatch, row: usize) -> Self {
        Self { batch, row }
    }

    /// Iterates over every row of the batch.
    pub fn iter(batch: &'a RecordBatch) -> impl Iterator<Item = BatchRow<'a>> + 'a {
        (0..batch.num_rows()).map(move |row| BatchRow::new(batch, row))
    }
}

macro_rules! downcast_value {
    ($array:expr, $row:expr, $ty:ty, $variant:ident, $conv:expr) => {
        $array
            .as_any()
            .downcast_ref::<$ty>()
            .map(|a| Value::$variant($conv(a.value($row))))
    };
}

impl InputRow for BatchRow<'_> {
    fn value(&self, column: &Column) -> Result<Value> {
        let array = self
            .batch
            .column_by_name(column.name())
            .ok_or_else(|| RefDataError::ColumnNotFound {
                column: column.name().to_string(),
            })?;

        if self.row >= array.len() {
            return Err(RefDataError::invalid_value(
                column.name(),
                format!("row {} out of bounds ({} rows)", self.row, array.len()),
            ));
        }
        if array.is_null(self.row) {
            return Ok(Value::Null);
        }

        let row = self.row;
        let typed = match array.data_type() {
            DataType::Boolean => downcast_value!(array, row, BooleanArray, Boolean, |v| v),
            DataType::Int8 => downcast_value!(array, row, Int8Array, Integer, i64::from),
            DataType::Int16 => downcast_value!(array, row, Int16Array, Integer, i64::from),
            DataType::Int32 => downcast_value!(array, row, Int32Array, Integer, i64::from),
            DataType::Int64 => downcast_value!(array, row, Int64Array, Integer, |v| v),
            DataType::UInt8 => downcast_value!(array, row, UInt8Array, Integer, i64::from),
            DataType::UInt16 => downcast_value!(array, row, UInt16Array, Integer, i64::from),
            DataType::UInt32 => downcast_value!(array, row, UInt32Array, Integer, i64::from),
            DataType::UInt64 => array
                .as_any()
                .downcast_ref::<UInt64Array>()
                .map(|a| match i64::try_from(a.value(row)) {
                    Ok(v) => Value::Integer(v),
                    Err(_) => Value::Text(a.value(row).to_string()),
                }),
            DataType::Float32 => downcast_value!(array, row, Float32Array, Float, f64::from),
            DataType::Float64 => downcast_value!(array, row, Float64Array, Float, |v| v),
            DataType::Utf8 => downcast_value!(array, row, StringArray, Text, str::to_string),
            DataType::LargeUtf8 => {
                downcast_value!(array, row, LargeStringArray, Text, str::to_string)
            }
            DataType::Utf8View => {
                downcast_value!(array, row, StringViewArray, Text, str::to_string)
            }
            _ => None,
        };

        match typed {
            Some(value) => Ok(value),
            // dates, decimals, timestamps and friends match on their display form
            None => Ok(Value::Text(array_value_to_string(array.as_ref(), row)?)),
        }
    }
}
