//! In-Memory Tables
//!
//! A [`Table`] is an immutable, ordered list of dictionary-encoded [`Column`]s.
//! Each column keeps its sorted distinct domain; rows store the code of their
//! value in that domain, so code order equals value order.

use crate::value::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised while building or addressing a table
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Column '{column}' has {got} rows, expected {expected}")]
    RaggedColumns {
        column: String,
        expected: usize,
        got: usize,
    },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Value {value} of column '{column}' is outside its declared domain")]
    ValueOutsideDomain { column: String, value: String },
}

/// Storage type of a column, inferred from its domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// All values are integers
    Int,
    /// Numeric with at least one non-integer
    Float,
    /// At least one non-numeric value
    Text,
}

/// A named, dictionary-encoded attribute of a table
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    domain: Vec<Value>,
    codes: Vec<u32>,
    column_type: ColumnType,
}

impl Column {
    /// Build a column whose domain is exactly the distinct observed values.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let domain: Vec<Value> = values.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let codes = values
            .iter()
            .map(|v| domain.binary_search(v).map(|i| i as u32).unwrap_or_default())
            .collect();
        let column_type = infer_type(&domain);
        Self {
            name: name.into(),
            domain,
            codes,
            column_type,
        }
    }

    /// Build a column with a declared domain that may be larger than the rows observed.
    pub fn with_domain(
        name: impl Into<String>,
        domain: Vec<Value>,
        values: Vec<Value>,
    ) -> Result<Self, TableError> {
        let name = name.into();
        let domain: Vec<Value> = domain.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut codes = Vec::with_capacity(values.len());
        for v in &values {
            match domain.binary_search(v) {
                Ok(i) => codes.push(i as u32),
                Err(_) => {
                    return Err(TableError::ValueOutsideDomain {
                        column: name,
                        value: v.to_string(),
                    });
                }
            }
        }
        let column_type = infer_type(&domain);
        Ok(Self {
            name,
            domain,
            codes,
            column_type,
        })
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of distinct values in the domain
    pub fn distribution_size(&self) -> usize {
        self.domain.len()
    }

    /// Sorted distinct domain
    pub fn all_distinct_values(&self) -> &[Value] {
        &self.domain
    }

    /// Inferred storage type
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether the column has no rows
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Dictionary codes, one per row
    pub fn codes(&self) -> &[u32] {
        &self.codes
    }

    /// Value stored at `row`
    pub fn value_at(&self, row: usize) -> &Value {
        &self.domain[self.codes[row] as usize]
    }

    /// Domain value for a dictionary code
    pub fn value(&self, code: u32) -> &Value {
        &self.domain[code as usize]
    }

    /// Code of `value` if it is part of the domain
    pub fn code_of(&self, value: &Value) -> Option<u32> {
        self.domain.binary_search(value).ok().map(|i| i as u32)
    }

    /// Index of the first domain entry that is `>= value`
    pub fn lower_bound(&self, value: &Value) -> usize {
        self.domain.partition_point(|d| d < value)
    }

    /// Index of the first domain entry that is `> value`
    pub fn upper_bound(&self, value: &Value) -> usize {
        self.domain.partition_point(|d| d <= value)
    }

    /// Parse a literal (e.g. from the command line) into this column's type.
    pub fn parse_value(&self, text: &str) -> Value {
        let text = text.trim();
        match self.column_type {
            ColumnType::Int => text
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| text.parse::<f64>().map(Value::Float))
                .unwrap_or_else(|_| Value::Text(text.to_string())),
            ColumnType::Float => text
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::Text(text.to_string())),
            ColumnType::Text => Value::Text(text.to_string()),
        }
    }
}

fn infer_type(domain: &[Value]) -> ColumnType {
    if domain.iter().any(|v| matches!(v, Value::Text(_))) {
        ColumnType::Text
    } else if domain.iter().any(|v| matches!(v, Value::Float(_))) {
        ColumnType::Float
    } else {
        ColumnType::Int
    }
}

/// A named dataset: an ordered sequence of columns of equal length
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    cardinality: usize,
}

impl Table {
    /// Assemble a table, checking that every column has the same row count.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self, TableError> {
        let cardinality = columns.first().map(Column::len).unwrap_or(0);
        for column in &columns {
            if column.len() != cardinality {
                return Err(TableError::RaggedColumns {
                    column: column.name().to_string(),
                    expected: cardinality,
                    got: column.len(),
                });
            }
        }
        Ok(Self {
            name: name.into(),
            columns,
            cardinality,
        })
    }

    /// Dataset name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in table order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column at `index`
    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    /// Number of rows
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    /// Position of the column called `name`
    pub fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    /// Materialize one row
    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.value_at(index).clone()).collect()
    }
}
