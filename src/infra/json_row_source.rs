use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::RowSource;
use crate::error::{Result, TimetableError};
use crate::types::RawRow;

/// Reads the spreadsheet export: a JSON array of row objects keyed by column header
pub struct JsonRowSource {
    path: PathBuf,
}

impl JsonRowSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Parse a JSON document into rows, rejecting anything but an array of objects
pub fn parse_rows(content: &str) -> Result<Vec<RawRow>> {
    let document: Value = serde_json::from_str(content)?;
    let Value::Array(items) = document else {
        return Err(TimetableError::Source(
            "input JSON must be an array of objects".to_string(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(row) => Ok(row),
            other => Err(TimetableError::Source(format!(
                "row {i} is not an object: {other}"
            ))),
        })
        .collect()
}

impl RowSource for JsonRowSource {
    fn read_rows(&self) -> Result<Vec<RawRow>> {
        let content = fs::read_to_string(&self.path)?;
        let rows = parse_rows(&content)?;
        info!("Read {} rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
