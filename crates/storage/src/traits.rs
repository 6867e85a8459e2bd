use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    AnalysisId, AnalysisKind, AnalysisRecord, LotId, LotRecord, ReplicateId, ReplicateRecord,
};

/// The storage trait for seedlab backends.
///
/// A `LabStorage` implementation provides transactional storage for lots,
/// analyses (all kinds), and PMS replicates.
///
/// ## Snapshot Semantics
///
/// Every read and write takes `&mut Self::Snapshot`, a type representing an
/// in-progress unit of work. The lifecycle is:
///
/// 1. `begin_snapshot()` — start a unit of work, returns a `Snapshot`
/// 2. Call read/write methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` — apply all staged writes at once
///    OR `abort_snapshot(snapshot)` — discard them
///
/// Reads inside a snapshot observe that snapshot's own staged writes.
/// Writes staged in one snapshot are invisible to every other snapshot until
/// committed. Dropping a snapshot without committing MUST discard it.
///
/// ## Identity
///
/// `insert_*` methods ignore the `id` field of the record they are given and
/// return the id assigned by the backend.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so the engine can share
/// them across async task boundaries.
#[async_trait]
pub trait LabStorage: Send + Sync + 'static {
    /// The snapshot (unit of work) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Lots ──────────────────────────────────────────────────────────────────

    async fn insert_lot(
        &self,
        snapshot: &mut Self::Snapshot,
        record: LotRecord,
    ) -> Result<LotId, StorageError>;

    /// Returns `Err(StorageError::LotNotFound)` if the lot does not exist.
    async fn get_lot(
        &self,
        snapshot: &mut Self::Snapshot,
        lot_id: LotId,
    ) -> Result<LotRecord, StorageError>;

    // ── Analyses ──────────────────────────────────────────────────────────────

    async fn insert_analysis(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AnalysisRecord,
    ) -> Result<AnalysisId, StorageError>;

    /// Returns `Err(StorageError::AnalysisNotFound)` if the analysis does not exist.
    async fn get_analysis(
        &self,
        snapshot: &mut Self::Snapshot,
        analysis_id: AnalysisId,
    ) -> Result<AnalysisRecord, StorageError>;

    /// Overwrite an existing analysis.
    ///
    /// Returns `Err(StorageError::AnalysisNotFound)` if `record.id` is unknown.
    async fn save_analysis(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AnalysisRecord,
    ) -> Result<(), StorageError>;

    /// All analyses of `kind` referencing `lot_id`, active or not, ordered by id.
    async fn find_same_kind_by_lot(
        &self,
        snapshot: &mut Self::Snapshot,
        kind: AnalysisKind,
        lot_id: LotId,
    ) -> Result<Vec<AnalysisRecord>, StorageError>;

    // ── Replicates ────────────────────────────────────────────────────────────

    /// Replicates of an analysis ordered by (batch, sequence, id).
    async fn list_replicates(
        &self,
        snapshot: &mut Self::Snapshot,
        analysis_id: AnalysisId,
    ) -> Result<Vec<ReplicateRecord>, StorageError>;

    async fn count_replicates(
        &self,
        snapshot: &mut Self::Snapshot,
        analysis_id: AnalysisId,
    ) -> Result<usize, StorageError>;

    /// Returns `Err(StorageError::ReplicateNotFound)` if the replicate does not exist.
    async fn get_replicate(
        &self,
        snapshot: &mut Self::Snapshot,
        replicate_id: ReplicateId,
    ) -> Result<ReplicateRecord, StorageError>;

    async fn insert_replicate(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ReplicateRecord,
    ) -> Result<ReplicateId, StorageError>;

    /// Overwrite an existing replicate.
    ///
    /// Returns `Err(StorageError::ReplicateNotFound)` if `record.id` is unknown.
    async fn save_replicate(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ReplicateRecord,
    ) -> Result<(), StorageError>;

    /// Overwrite several existing replicates. Fails without staging anything
    /// if any id is unknown.
    async fn save_replicates(
        &self,
        snapshot: &mut Self::Snapshot,
        records: Vec<ReplicateRecord>,
    ) -> Result<(), StorageError>;

    /// Returns `Err(StorageError::ReplicateNotFound)` if the replicate does not exist.
    async fn delete_replicate(
        &self,
        snapshot: &mut Self::Snapshot,
        replicate_id: ReplicateId,
    ) -> Result<(), StorageError>;
}
