//! Batches container log records and ships them to a LogDNA-style ingestion
//! endpoint over HTTP.

pub mod batcher;
pub mod config;
pub mod endpoint;
pub mod exporter;
pub mod record;
pub mod transform;

#[cfg(test)]
mod testing;

pub use batcher::{BatcherConfig, BatcherHandle, BatcherTask, IntakeError};
pub use config::{Compression, Config, ConfigError};
pub use endpoint::{EndpointError, EndpointTarget};
pub use exporter::{ExportError, Exporter, HttpExporter};
pub use record::{Batch, Record};
pub use transform::{HostEvent, TransformError};
