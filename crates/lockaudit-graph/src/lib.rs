use lockaudit_advisory::AdvisoryError;
use lockaudit_store::StoreError;
use thiserror::Error;

mod enrich;
mod ingest;
mod resolve;
mod statements;

pub use enrich::{EnrichOptions, EnrichmentSummary, enrich_graph};
pub use ingest::{IngestSummary, ingest_manifest};
pub use resolve::resolve_dependency;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph store error: {0}")]
    Store(#[from] StoreError),
    #[error("advisory source error: {0}")]
    Advisory(#[from] AdvisoryError),
}
