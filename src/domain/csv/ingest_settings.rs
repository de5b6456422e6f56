// ============================================================
// INGEST SETTINGS
// ============================================================
// Immutable per-run knobs handed to the ingestion use cases

use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_PROBE_ROWS: usize = 5;

/// Settings for one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Target schema for every created table (default: public)
    pub schema: String,

    /// Truncate tables that already exist before loading
    pub truncate_existing: bool,

    /// Rows per insert chunk / transaction (default: 10000)
    pub chunk_size: usize,

    /// Data rows read by the pre-load probe (default: 5)
    pub probe_rows: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            truncate_existing: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            probe_rows: DEFAULT_PROBE_ROWS,
        }
    }
}

impl IngestSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings used by the `ship` entry point, which always truncates.
    pub fn ship() -> Self {
        Self {
            truncate_existing: true,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.schema.trim().is_empty() {
            return Err("schema must not be empty".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }
        if self.probe_rows == 0 {
            return Err("probe_rows must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = IngestSettings::default();
        assert_eq!(settings.schema, "public");
        assert_eq!(settings.chunk_size, 10_000);
        assert!(!settings.truncate_existing);
        assert!(IngestSettings::ship().truncate_existing);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_and_blank_schema() {
        let zero_chunk = IngestSettings {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(zero_chunk.validate().is_err());

        let blank_schema = IngestSettings {
            schema: "  ".to_string(),
            ..Default::default()
        };
        assert!(blank_schema.validate().is_err());
    }
}
