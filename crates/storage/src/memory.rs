//! In-memory `LabStorage` backend.
//!
//! Committed data lives behind a single `RwLock`. A snapshot is a write
//! overlay: reads merge the overlay over committed data, commit applies the
//! overlay under the write lock. Ids come from atomic counters, so an
//! aborted insert burns its id.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{
    AnalysisId, AnalysisKind, AnalysisRecord, LotId, LotRecord, ReplicateId, ReplicateRecord,
};
use crate::traits::LabStorage;

#[derive(Debug, Default)]
struct Tables {
    lots: BTreeMap<LotId, LotRecord>,
    analyses: BTreeMap<AnalysisId, AnalysisRecord>,
    replicates: BTreeMap<ReplicateId, ReplicateRecord>,
}

/// Staged writes of one unit of work. `None` marks a deleted replicate.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    lots: BTreeMap<LotId, LotRecord>,
    analyses: BTreeMap<AnalysisId, AnalysisRecord>,
    replicates: BTreeMap<ReplicateId, Option<ReplicateRecord>>,
}

#[derive(Debug)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    next_lot_id: AtomicI64,
    next_analysis_id: AtomicI64,
    next_replicate_id: AtomicI64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_lot_id: AtomicI64::new(1),
            next_analysis_id: AtomicI64::new(1),
            next_replicate_id: AtomicI64::new(1),
        }
    }

    async fn replicate_exists(&self, snapshot: &MemorySnapshot, replicate_id: ReplicateId) -> bool {
        match snapshot.replicates.get(&replicate_id) {
            Some(staged) => staged.is_some(),
            None => self.tables.read().await.replicates.contains_key(&replicate_id),
        }
    }

    async fn analysis_exists(&self, snapshot: &MemorySnapshot, analysis_id: AnalysisId) -> bool {
        snapshot.analyses.contains_key(&analysis_id)
            || self.tables.read().await.analyses.contains_key(&analysis_id)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LabStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.lots.extend(snapshot.lots);
        tables.analyses.extend(snapshot.analyses);
        for (id, staged) in snapshot.replicates {
            match staged {
                Some(record) => {
                    tables.replicates.insert(id, record);
                }
                None => {
                    tables.replicates.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert_lot(
        &self,
        snapshot: &mut MemorySnapshot,
        mut record: LotRecord,
    ) -> Result<LotId, StorageError> {
        let id = self.next_lot_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;
        snapshot.lots.insert(id, record);
        Ok(id)
    }

    async fn get_lot(
        &self,
        snapshot: &mut MemorySnapshot,
        lot_id: LotId,
    ) -> Result<LotRecord, StorageError> {
        if let Some(lot) = snapshot.lots.get(&lot_id) {
            return Ok(lot.clone());
        }
        self.tables
            .read()
            .await
            .lots
            .get(&lot_id)
            .cloned()
            .ok_or(StorageError::LotNotFound { lot_id })
    }

    async fn insert_analysis(
        &self,
        snapshot: &mut MemorySnapshot,
        mut record: AnalysisRecord,
    ) -> Result<AnalysisId, StorageError> {
        let id = self.next_analysis_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;
        snapshot.analyses.insert(id, record);
        Ok(id)
    }

    async fn get_analysis(
        &self,
        snapshot: &mut MemorySnapshot,
        analysis_id: AnalysisId,
    ) -> Result<AnalysisRecord, StorageError> {
        if let Some(analysis) = snapshot.analyses.get(&analysis_id) {
            return Ok(analysis.clone());
        }
        self.tables
            .read()
            .await
            .analyses
            .get(&analysis_id)
            .cloned()
            .ok_or(StorageError::AnalysisNotFound { analysis_id })
    }

    async fn save_analysis(
        &self,
        snapshot: &mut MemorySnapshot,
        record: AnalysisRecord,
    ) -> Result<(), StorageError> {
        if !self.analysis_exists(snapshot, record.id).await {
            return Err(StorageError::AnalysisNotFound {
                analysis_id: record.id,
            });
        }
        snapshot.analyses.insert(record.id, record);
        Ok(())
    }

    async fn find_same_kind_by_lot(
        &self,
        snapshot: &mut MemorySnapshot,
        kind: AnalysisKind,
        lot_id: LotId,
    ) -> Result<Vec<AnalysisRecord>, StorageError> {
        let mut merged = self.tables.read().await.analyses.clone();
        merged.extend(
            snapshot
                .analyses
                .iter()
                .map(|(id, record)| (*id, record.clone())),
        );
        Ok(merged
            .into_values()
            .filter(|a| a.lot_id == lot_id && a.kind() == kind)
            .collect())
    }

    async fn list_replicates(
        &self,
        snapshot: &mut MemorySnapshot,
        analysis_id: AnalysisId,
    ) -> Result<Vec<ReplicateRecord>, StorageError> {
        let mut merged: BTreeMap<ReplicateId, ReplicateRecord> = self
            .tables
            .read()
            .await
            .replicates
            .iter()
            .filter(|(_, r)| r.analysis_id == analysis_id)
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        for (id, staged) in &snapshot.replicates {
            merged.remove(id);
            if let Some(record) = staged {
                if record.analysis_id == analysis_id {
                    merged.insert(*id, record.clone());
                }
            }
        }
        let mut replicates: Vec<ReplicateRecord> = merged.into_values().collect();
        replicates.sort_by_key(|r| (r.batch_number, r.sequence_in_batch, r.id));
        Ok(replicates)
    }

    async fn count_replicates(
        &self,
        snapshot: &mut MemorySnapshot,
        analysis_id: AnalysisId,
    ) -> Result<usize, StorageError> {
        Ok(self.list_replicates(snapshot, analysis_id).await?.len())
    }

    async fn get_replicate(
        &self,
        snapshot: &mut MemorySnapshot,
        replicate_id: ReplicateId,
    ) -> Result<ReplicateRecord, StorageError> {
        let found = match snapshot.replicates.get(&replicate_id) {
            Some(staged) => staged.clone(),
            None => self
                .tables
                .read()
                .await
                .replicates
                .get(&replicate_id)
                .cloned(),
        };
        found.ok_or(StorageError::ReplicateNotFound { replicate_id })
    }

    async fn insert_replicate(
        &self,
        snapshot: &mut MemorySnapshot,
        mut record: ReplicateRecord,
    ) -> Result<ReplicateId, StorageError> {
        let id = self.next_replicate_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;
        snapshot.replicates.insert(id, Some(record));
        Ok(id)
    }

    async fn save_replicate(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ReplicateRecord,
    ) -> Result<(), StorageError> {
        if !self.replicate_exists(snapshot, record.id).await {
            return Err(StorageError::ReplicateNotFound {
                replicate_id: record.id,
            });
        }
        snapshot.replicates.insert(record.id, Some(record));
        Ok(())
    }

    async fn save_replicates(
        &self,
        snapshot: &mut MemorySnapshot,
        records: Vec<ReplicateRecord>,
    ) -> Result<(), StorageError> {
        for record in &records {
            if !self.replicate_exists(snapshot, record.id).await {
                return Err(StorageError::ReplicateNotFound {
                    replicate_id: record.id,
                });
            }
        }
        for record in records {
            snapshot.replicates.insert(record.id, Some(record));
        }
        Ok(())
    }

    async fn delete_replicate(
        &self,
        snapshot: &mut MemorySnapshot,
        replicate_id: ReplicateId,
    ) -> Result<(), StorageError> {
        if !self.replicate_exists(snapshot, replicate_id).await {
            return Err(StorageError::ReplicateNotFound { replicate_id });
        }
        snapshot.replicates.insert(replicate_id, None);
        Ok(())
    }
}
