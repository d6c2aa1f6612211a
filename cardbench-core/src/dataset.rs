//! CSV Dataset Loading
//!
//! Thin wrapper that turns a headered CSV file into a [`Table`]. Only the
//! requested columns are kept, in the requested order. Column types are
//! inferred: integer if every field parses as `i64`, float if every field
//! parses as `f64`, text otherwise.

use crate::table::{Column, Table, TableError};
use crate::value::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Columns of the DMV vehicle registration dataset
pub const DMV_COLUMNS: &[&str] = &[
    "Record Type",
    "State",
    "County",
    "Body Type",
    "Fuel Type",
    "Reg Valid Date",
    "Scofflaw Indicator",
    "Suspension Indicator",
    "Revocation Indicator",
    "Registration Class",
    "Model Year",
];

/// Errors raised while loading a dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("Dataset '{0}' is not registered; a column list is required")]
    MissingColumnList(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Where a dataset lives and which columns to load
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    /// Table name used in reports and SQL rendering
    pub table_name: String,
    /// CSV file path
    pub path: PathBuf,
    /// Columns to keep, in table order
    pub columns: Vec<String>,
}

impl DatasetSpec {
    /// Resolve a dataset selector.
    ///
    /// `dmv` and `dmv-tiny` are registered with the DMV schema. Any other
    /// name is read from `<datasets_dir>/<name>[.csv]` and needs `columns`.
    pub fn resolve(
        name: &str,
        datasets_dir: &Path,
        columns: Option<&[String]>,
    ) -> Result<Self, DatasetError> {
        let dmv_columns = || DMV_COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        match name {
            "dmv-tiny" => Ok(Self {
                table_name: "DMV".to_string(),
                path: datasets_dir.join("dmv-tiny.csv"),
                columns: dmv_columns(),
            }),
            "dmv" => Ok(Self {
                table_name: "DMV".to_string(),
                path: datasets_dir.join("Vehicle__Snowmobile__and_Boat_Registrations.csv"),
                columns: dmv_columns(),
            }),
            other => {
                let columns = columns
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| DatasetError::MissingColumnList(other.to_string()))?;
                let file = if other.ends_with(".csv") {
                    other.to_string()
                } else {
                    format!("{}.csv", other)
                };
                Ok(Self {
                    table_name: other.trim_end_matches(".csv").to_string(),
                    path: datasets_dir.join(file),
                    columns: columns.to_vec(),
                })
            }
        }
    }

    /// Load the table described by this spec
    pub fn load(&self) -> Result<Table, DatasetError> {
        load_csv_table(&self.table_name, &self.path, &self.columns)
    }
}

/// Load selected columns of a headered CSV file into a table.
pub fn load_csv_table(
    name: &str,
    path: &Path,
    columns: &[String],
) -> Result<Table, DatasetError> {
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let mut positions = Vec::with_capacity(columns.len());
    for column in columns {
        let pos = headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DatasetError::MissingColumn {
                column: column.clone(),
                path: path.to_path_buf(),
            })?;
        positions.push(pos);
    }

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); columns.len()];
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        for (slot, &pos) in positions.iter().enumerate() {
            raw[slot].push(record.get(pos).unwrap_or_default().to_string());
        }
    }

    let built: Vec<Column> = columns
        .iter()
        .zip(raw)
        .map(|(name, fields)| {
            let values = parse_fields(fields);
            let column = Column::new(name.clone(), values);
            debug!(
                column = column.name(),
                distinct = column.distribution_size(),
                "loaded column"
            );
            column
        })
        .collect();

    let table = Table::new(name, built)?;
    info!(
        "Loaded table {} from {}: {} rows, {} columns",
        table.name(),
        path.display(),
        table.cardinality(),
        table.columns().len()
    );
    Ok(table)
}

fn parse_fields(fields: Vec<String>) -> Vec<Value> {
    if fields.iter().all(|f| f.trim().parse::<i64>().is_ok()) {
        return fields
            .iter()
            .map(|f| Value::Int(f.trim().parse().unwrap_or_default()))
            .collect();
    }
    if fields.iter().all(|f| f.trim().parse::<f64>().is_ok()) {
        return fields
            .iter()
            .map(|f| Value::Float(f.trim().parse().unwrap_or_default()))
            .collect();
    }
    fields.into_iter().map(Value::Text).collect()
}
