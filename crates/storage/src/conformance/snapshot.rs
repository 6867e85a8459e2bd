//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted writes are discarded.

use std::future::Future;

use super::{make_lot, make_pms_analysis, make_replicate, seed_pms, TestResult};
use crate::{AnalysisState, LabStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LabStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "reads_see_own_staged_writes",
            reads_see_own_staged_writes(factory().await).await,
        ),
        TestResult::from_result(
            "snapshot",
            "uncommitted_analysis_invisible",
            uncommitted_analysis_invisible(factory().await).await,
        ),
        TestResult::from_result(
            "snapshot",
            "committed_update_visible",
            committed_update_visible(factory().await).await,
        ),
        TestResult::from_result(
            "snapshot",
            "abort_discards_update",
            abort_discards_update(factory().await).await,
        ),
        TestResult::from_result(
            "snapshot",
            "abort_discards_replicate_delete",
            abort_discards_replicate_delete(factory().await).await,
        ),
    ]
}

async fn reads_see_own_staged_writes<S: LabStorage>(storage: S) -> Result<(), String> {
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let lot_id = storage
        .insert_lot(&mut snap, make_lot("L-stage"))
        .await
        .map_err(|e| e.to_string())?;
    let analysis_id = storage
        .insert_analysis(&mut snap, make_pms_analysis(lot_id))
        .await
        .map_err(|e| e.to_string())?;
    storage
        .insert_replicate(&mut snap, make_replicate(analysis_id, 1, 1, 5_100))
        .await
        .map_err(|e| e.to_string())?;

    let lot = storage
        .get_lot(&mut snap, lot_id)
        .await
        .map_err(|e| format!("staged lot not readable: {e}"))?;
    if lot.code != "L-stage" {
        return Err(format!("unexpected lot code {}", lot.code));
    }
    let count = storage
        .count_replicates(&mut snap, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    if count != 1 {
        return Err(format!("expected 1 staged replicate, got {count}"));
    }
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| e.to_string())
}

async fn uncommitted_analysis_invisible<S: LabStorage>(storage: S) -> Result<(), String> {
    let (lot_id, _) = seed_pms(&storage).await?;

    let mut writer = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let staged_id = storage
        .insert_analysis(&mut writer, make_pms_analysis(lot_id))
        .await
        .map_err(|e| e.to_string())?;

    let mut reader = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    match storage.get_analysis(&mut reader, staged_id).await {
        Err(StorageError::AnalysisNotFound { .. }) => {}
        Ok(_) => return Err("uncommitted analysis visible to another snapshot".to_string()),
        Err(e) => return Err(format!("unexpected error: {e}")),
    }
    storage
        .abort_snapshot(reader)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .abort_snapshot(writer)
        .await
        .map_err(|e| e.to_string())
}

async fn committed_update_visible<S: LabStorage>(storage: S) -> Result<(), String> {
    let (_, analysis_id) = seed_pms(&storage).await?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut analysis = storage
        .get_analysis(&mut snap, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    analysis.state = AnalysisState::InProgress;
    storage
        .save_analysis(&mut snap, analysis)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut reader = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let analysis = storage
        .get_analysis(&mut reader, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    if analysis.state != AnalysisState::InProgress {
        return Err(format!("expected IN_PROGRESS, got {}", analysis.state));
    }
    storage
        .abort_snapshot(reader)
        .await
        .map_err(|e| e.to_string())
}

async fn abort_discards_update<S: LabStorage>(storage: S) -> Result<(), String> {
    let (_, analysis_id) = seed_pms(&storage).await?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut analysis = storage
        .get_analysis(&mut snap, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    analysis.active = false;
    storage
        .save_analysis(&mut snap, analysis)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut reader = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let analysis = storage
        .get_analysis(&mut reader, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    if !analysis.active {
        return Err("aborted update was applied".to_string());
    }
    storage
        .abort_snapshot(reader)
        .await
        .map_err(|e| e.to_string())
}

async fn abort_discards_replicate_delete<S: LabStorage>(storage: S) -> Result<(), String> {
    let (_, analysis_id) = seed_pms(&storage).await?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let replicate_id = storage
        .insert_replicate(&mut snap, make_replicate(analysis_id, 1, 1, 5_234))
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .delete_replicate(&mut snap, replicate_id)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut reader = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .get_replicate(&mut reader, replicate_id)
        .await
        .map_err(|e| format!("aborted delete was applied: {e}"))?;
    storage
        .abort_snapshot(reader)
        .await
        .map_err(|e| e.to_string())
}
