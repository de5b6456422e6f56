pub mod use_cases;

pub use use_cases::ingestion::{IngestError, IngestionOrchestrator};
pub use use_cases::row_loader::{LoadError, PassError, ResilientRowLoader};
pub use use_cases::schema_synthesizer::{SchemaError, SchemaSynthesizer, TableEnsured};
pub use use_cases::table_dropper::TableDropper;
