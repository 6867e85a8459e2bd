//! Analysis record conformance tests.

use std::future::Future;

use super::{make_lot, make_pms_analysis, make_purity_analysis, seed_pms, TestResult};
use crate::{AnalysisKind, LabStorage, StorageError};

pub(super) async fn run_analysis_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LabStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "analysis",
            "insert_assigns_distinct_ids",
            insert_assigns_distinct_ids(factory().await).await,
        ),
        TestResult::from_result(
            "analysis",
            "same_kind_by_lot_filters_kind_and_lot",
            same_kind_by_lot_filters_kind_and_lot(factory().await).await,
        ),
        TestResult::from_result(
            "analysis",
            "unknown_ids_return_not_found",
            unknown_ids_return_not_found(factory().await).await,
        ),
    ]
}

async fn insert_assigns_distinct_ids<S: LabStorage>(storage: S) -> Result<(), String> {
    let (lot_id, first) = seed_pms(&storage).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let second = storage
        .insert_analysis(&mut snap, make_pms_analysis(lot_id))
        .await
        .map_err(|e| e.to_string())?;
    if first == second {
        return Err(format!("id {first} assigned twice"));
    }
    let stored = storage
        .get_analysis(&mut snap, second)
        .await
        .map_err(|e| e.to_string())?;
    if stored.id != second {
        return Err(format!("record carries id {}, expected {second}", stored.id));
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())
}

async fn same_kind_by_lot_filters_kind_and_lot<S: LabStorage>(storage: S) -> Result<(), String> {
    let (lot_id, pms_id) = seed_pms(&storage).await?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let other_lot = storage
        .insert_lot(&mut snap, make_lot("L-002"))
        .await
        .map_err(|e| e.to_string())?;
    storage
        .insert_analysis(&mut snap, make_pms_analysis(other_lot))
        .await
        .map_err(|e| e.to_string())?;
    storage
        .insert_analysis(&mut snap, make_purity_analysis(lot_id))
        .await
        .map_err(|e| e.to_string())?;
    let second_pms = storage
        .insert_analysis(&mut snap, make_pms_analysis(lot_id))
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut reader = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let found = storage
        .find_same_kind_by_lot(&mut reader, AnalysisKind::Pms, lot_id)
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<_> = found.iter().map(|a| a.id).collect();
    if ids != vec![pms_id, second_pms] {
        return Err(format!(
            "expected [{pms_id}, {second_pms}], got {ids:?}"
        ));
    }
    storage
        .abort_snapshot(reader)
        .await
        .map_err(|e| e.to_string())
}

async fn unknown_ids_return_not_found<S: LabStorage>(storage: S) -> Result<(), String> {
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    match storage.get_lot(&mut snap, 404).await {
        Err(StorageError::LotNotFound { lot_id: 404 }) => {}
        other => return Err(format!("get_lot: expected LotNotFound, got {other:?}")),
    }
    match storage.get_analysis(&mut snap, 404).await {
        Err(StorageError::AnalysisNotFound { analysis_id: 404 }) => {}
        other => {
            return Err(format!(
                "get_analysis: expected AnalysisNotFound, got {other:?}"
            ))
        }
    }
    let mut ghost = make_pms_analysis(1);
    ghost.id = 404;
    match storage.save_analysis(&mut snap, ghost).await {
        Err(StorageError::AnalysisNotFound { analysis_id: 404 }) => {}
        other => {
            return Err(format!(
                "save_analysis: expected AnalysisNotFound, got {other:?}"
            ))
        }
    }
    match storage.delete_replicate(&mut snap, 404).await {
        Err(StorageError::ReplicateNotFound { replicate_id: 404 }) => {}
        other => {
            return Err(format!(
                "delete_replicate: expected ReplicateNotFound, got {other:?}"
            ))
        }
    }
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| e.to_string())
}
