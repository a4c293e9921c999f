use thiserror::Error;

use crate::store::StoreError;

/// Failures that abort a whole invocation.
///
/// Per-item and per-call failures never show up here; the pipelines absorb them.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
