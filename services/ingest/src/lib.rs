//! Plant data ingestion: utility exports in, one reconciled fact per
//! (time block, plant) out.

pub mod aggregate;
pub mod alias;
pub mod classify;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod reader;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod sources;
pub mod store;
pub mod time_key;

pub use config::Config;
pub use error::{IngestError, IngestResult};
pub use model::{Category, FactRow, SourceFactRow};
pub use pipeline::{IngestOutcome, Pipeline, PipelineConfig};
pub use report::IngestReport;
pub use store::{FactStore, RunRecord};
