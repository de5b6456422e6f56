// ============================================================
// COLUMN SCHEMA
// ============================================================
// Ordered, all-text column layout derived from a header row

use serde::{Deserialize, Serialize};

use super::naming::{quote_identifier, sanitize_identifier};

/// Column type used for every created column.
pub const TEXT_COLUMN_TYPE: &str = "TEXT";

/// Sanitized column names in header order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    columns: Vec<String>,
}

impl ColumnSchema {
    /// Build from raw header fields. Surrounding whitespace is dropped before
    /// sanitizing so `id, name` yields `id` and `name`. A blank field is named
    /// after its position (`Unnamed__2` for the third column).
    pub fn from_header<S: AsRef<str>>(header: &[S]) -> Self {
        let columns = header
            .iter()
            .enumerate()
            .map(|(index, name)| match name.as_ref().trim() {
                "" => sanitize_identifier(&format!("Unnamed: {}", index)),
                name => sanitize_identifier(name),
            })
            .collect();

        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.columns
    }

    /// `"a", "b", ...` for column lists
    pub fn quoted_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `"a" TEXT, "b" TEXT, ...` for CREATE TABLE
    pub fn column_definitions(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(c), TEXT_COLUMN_TYPE))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
