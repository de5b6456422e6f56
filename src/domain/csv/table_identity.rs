// ============================================================
// SOURCE FILES AND TABLE IDENTITY
// ============================================================
// Value objects tying an input file to its destination table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::naming::{quote_identifier, table_name_for};

/// A discovered input file. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Full path to the file
    pub path: PathBuf,

    /// File name without directory and extension
    pub base_name: String,
}

impl SourceFile {
    pub fn from_path(path: &Path) -> Self {
        let base_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            path: path.to_path_buf(),
            base_name,
        }
    }

    /// File name for log lines
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Destination `{schema, table}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdentity {
    pub schema: String,
    pub table: String,
}

impl TableIdentity {
    /// Build an identity, sanitizing the table part.
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table_name_for(table),
        }
    }

    /// Identity derived from a source file's base name
    pub fn for_source(schema: &str, source: &SourceFile) -> Self {
        Self::new(schema, &source.base_name)
    }

    /// `"schema"."table"` for use in SQL text
    pub fn qualified(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.table)
        )
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
