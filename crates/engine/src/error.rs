use rust_decimal::Decimal;
use seedlab_storage::{AnalysisId, AnalysisKind, AnalysisState, LotId, StorageError};

use crate::history::HistoryError;
use crate::statistics::StatsError;

pub type Result<T> = std::result::Result<T, LabError>;

/// Errors returned by engine operations.
///
/// Everything up to `InvalidRequest` is a business-rule violation raised to
/// the caller as-is and never retried. `Storage` and `History` are
/// infrastructure failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("analysis {analysis_id} is inactive")]
    InactiveAnalysis { analysis_id: AnalysisId },

    #[error("cannot {operation} analysis {analysis_id} in state {state}")]
    InvalidState {
        analysis_id: AnalysisId,
        state: AnalysisState,
        operation: &'static str,
    },

    #[error("analysis {analysis_id} lacks evidence: {reason}")]
    IncompleteEvidence {
        analysis_id: AnalysisId,
        reason: String,
    },

    #[error("lot {lot_id} already has a valid {kind} analysis ({existing_id})")]
    ConflictingValidAnalysis {
        analysis_id: AnalysisId,
        lot_id: LotId,
        kind: AnalysisKind,
        existing_id: AnalysisId,
    },

    #[error("analysis {analysis_id} already holds the maximum of {limit} replicates")]
    BatchLimitReached { analysis_id: AnalysisId, limit: u32 },

    #[error(
        "analysis {analysis_id} needs no more replicates: CV {coefficient_of_variation} is within {threshold}"
    )]
    NoMoreReplicatesNeeded {
        analysis_id: AnalysisId,
        coefficient_of_variation: Decimal,
        threshold: Decimal,
    },

    #[error("analysis {analysis_id} is already finalized ({state})")]
    AlreadyFinalized {
        analysis_id: AnalysisId,
        state: AnalysisState,
    },

    #[error("analysis {analysis_id} is already active")]
    AlreadyActive { analysis_id: AnalysisId },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Statistics(#[from] StatsError),

    #[error(transparent)]
    Storage(StorageError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

impl LabError {
    /// True for the business-rule taxonomy, false for infrastructure failures.
    pub fn is_business_rule(&self) -> bool {
        !matches!(
            self,
            LabError::Statistics(_) | LabError::Storage(_) | LabError::History(_)
        )
    }
}

impl From<StorageError> for LabError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::LotNotFound { lot_id } => LabError::NotFound {
                entity: "lot",
                id: lot_id,
            },
            StorageError::AnalysisNotFound { analysis_id } => LabError::NotFound {
                entity: "analysis",
                id: analysis_id,
            },
            StorageError::ReplicateNotFound { replicate_id } => LabError::NotFound {
                entity: "replicate",
                id: replicate_id,
            },
            other => LabError::Storage(other),
        }
    }
}
