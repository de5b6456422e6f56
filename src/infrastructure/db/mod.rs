#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod sink;

pub use postgres::{PgConnector, PgSink};
pub use sink::{Sink, SinkConnector};
