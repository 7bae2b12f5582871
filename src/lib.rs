pub mod config;
pub mod disambiguate;
pub mod error;
pub mod extract;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod scoring;
pub mod structure;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use models::{
    DocumentInput, ExpectedTotals, HoldingRecord, PipelineOutput, ValidationReport,
};
pub use pipeline::{run_batch, Pipeline};
