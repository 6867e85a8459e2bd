use crate::record::{AnalysisId, LotId, ReplicateId};

/// All errors that can be returned by a LabStorage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// No lot with the given id.
    #[error("lot not found: {lot_id}")]
    LotNotFound { lot_id: LotId },

    /// No analysis with the given id.
    #[error("analysis not found: {analysis_id}")]
    AnalysisNotFound { analysis_id: AnalysisId },

    /// No replicate with the given id.
    #[error("replicate not found: {replicate_id}")]
    ReplicateNotFound { replicate_id: ReplicateId },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
