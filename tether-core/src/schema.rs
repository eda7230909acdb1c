//! Schema description returned by a webservice's `describe` call.

use serde::{Deserialize, Serialize};

/// The data type of a schema column, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Boolean column.
    Bool,
    /// Integer column.
    Int,
    /// Float column.
    Float,
    /// String column.
    String,
    /// Nested/structured column.
    Json,
}

/// One column of an endpoint's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub data_type: ColumnType,
}

impl Column {
    /// Create a column description.
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Schema description for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Primary key field name(s).
    pub primary_key: Vec<String>,
}

impl Schema {
    /// Create a schema from columns and a primary key.
    pub fn new(
        columns: impl IntoIterator<Item = Column>,
        primary_key: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            columns: columns.into_iter().collect(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}
