pub mod ingestion;
pub mod row_loader;
pub mod schema_synthesizer;
pub mod table_dropper;
