pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{
    AnalysisDetail, AnalysisId, AnalysisKind, AnalysisRecord, AnalysisState, GerminationCount,
    GerminationDetail, LotId, LotRecord, OtherSeedContentDetail, OtherSeedFinding,
    PmsAggregates, PmsDetail, PurityDetail, ReplicateId, ReplicateRecord, ReplicateValidity,
    TetrazoliumCount, TetrazoliumDetail,
};
pub use traits::LabStorage;
