//! Column model for generated table definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// TMDL column data type
///
/// Generated column lists use loose type names; [`DataType::from_alias`]
/// folds them onto the four types the integration step emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Int64,
    Double,
    DateTime,
    String,
}

impl DataType {
    /// Map a type alias (`int`, `float`, `date`, ...) to a TMDL type;
    /// anything unrecognized is a string
    pub fn from_alias(alias: &str) -> Self {
        match alias.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "int64" | "long" => DataType::Int64,
            "double" | "real" | "float" | "decimal" => DataType::Double,
            "datetime" | "date" | "timestamp" => DataType::DateTime,
            _ => DataType::String,
        }
    }

    pub fn as_tmdl(&self) -> &'static str {
        match self {
            DataType::Int64 => "int64",
            DataType::Double => "double",
            DataType::DateTime => "dateTime",
            DataType::String => "string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tmdl())
    }
}

/// One column of a generated table
///
/// # Example
///
/// ```rust
/// use pbip_tmdl::models::{ColumnSpec, DataType};
///
/// let column = ColumnSpec::parse_row("Discount, float, sum").unwrap();
/// assert_eq!(column.data_type, DataType::Double);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarize_by: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            summarize_by: None,
        }
    }

    /// Parse `name,type,summarize` or `name | type | summarize`
    ///
    /// Blank lines and `#` comments yield `None`. A bare name is a string
    /// column; `none` and `default` aggregations are dropped.
    pub fn parse_row(row: &str) -> Option<Self> {
        let row = row.trim();
        if row.is_empty() || row.starts_with('#') {
            return None;
        }

        let parts: Vec<&str> = if row.contains(',') {
            row.split(',').map(str::trim).collect()
        } else if row.contains('|') {
            row.split('|').map(str::trim).collect()
        } else {
            vec![row]
        };

        let name = parts.first().copied().filter(|n| !n.is_empty())?;
        let data_type = parts
            .get(1)
            .map(|t| DataType::from_alias(t))
            .unwrap_or(DataType::String);
        let summarize_by = parts
            .get(2)
            .filter(|agg| {
                !agg.is_empty()
                    && !agg.eq_ignore_ascii_case("none")
                    && !agg.eq_ignore_ascii_case("default")
            })
            .map(|agg| agg.to_string());

        Some(Self {
            name: name.to_string(),
            data_type,
            summarize_by,
        })
    }

    /// Render the column as a label-style TMDL block at `indent`
    pub fn to_tmdl_lines(&self, indent: &str) -> Vec<String> {
        let mut lines = vec![
            format!("{indent}column {}", self.name),
            format!("{indent}  dataType: {}", self.data_type),
        ];
        if let Some(agg) = &self.summarize_by {
            lines.push(format!("{indent}  summarizeBy: {agg}"));
        }
        lines.push(format!("{indent}  sourceColumn: {}", self.name));
        lines
    }
}
