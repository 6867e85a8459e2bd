//! Replicate record conformance tests.

use std::future::Future;

use super::{make_replicate, seed_pms, TestResult};
use crate::{LabStorage, ReplicateValidity};

pub(super) async fn run_replicate_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LabStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "replicate",
            "list_orders_by_batch_then_sequence",
            list_orders_by_batch_then_sequence(factory().await).await,
        ),
        TestResult::from_result(
            "replicate",
            "save_replicates_updates_all",
            save_replicates_updates_all(factory().await).await,
        ),
        TestResult::from_result(
            "replicate",
            "delete_removes_from_list_and_count",
            delete_removes_from_list_and_count(factory().await).await,
        ),
        TestResult::from_result(
            "replicate",
            "list_is_scoped_to_analysis",
            list_is_scoped_to_analysis(factory().await).await,
        ),
    ]
}

async fn list_orders_by_batch_then_sequence<S: LabStorage>(storage: S) -> Result<(), String> {
    let (_, analysis_id) = seed_pms(&storage).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    for (batch, seq, mg) in [(2, 1, 5_300), (1, 2, 5_200), (1, 1, 5_100)] {
        storage
            .insert_replicate(&mut snap, make_replicate(analysis_id, batch, seq, mg))
            .await
            .map_err(|e| e.to_string())?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut reader = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let listed = storage
        .list_replicates(&mut reader, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    let positions: Vec<_> = listed
        .iter()
        .map(|r| (r.batch_number, r.sequence_in_batch))
        .collect();
    if positions != vec![(1, 1), (1, 2), (2, 1)] {
        return Err(format!("unexpected order {positions:?}"));
    }
    storage
        .abort_snapshot(reader)
        .await
        .map_err(|e| e.to_string())
}

async fn save_replicates_updates_all<S: LabStorage>(storage: S) -> Result<(), String> {
    let (_, analysis_id) = seed_pms(&storage).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    for seq in 1..=3 {
        storage
            .insert_replicate(&mut snap, make_replicate(analysis_id, 1, seq, 5_000))
            .await
            .map_err(|e| e.to_string())?;
    }
    let mut replicates = storage
        .list_replicates(&mut snap, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    for r in &mut replicates {
        r.validity = ReplicateValidity::Valid;
    }
    storage
        .save_replicates(&mut snap, replicates)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut reader = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let listed = storage
        .list_replicates(&mut reader, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    if listed
        .iter()
        .any(|r| r.validity != ReplicateValidity::Valid)
    {
        return Err("bulk save did not update every replicate".to_string());
    }
    storage
        .abort_snapshot(reader)
        .await
        .map_err(|e| e.to_string())
}

async fn delete_removes_from_list_and_count<S: LabStorage>(storage: S) -> Result<(), String> {
    let (_, analysis_id) = seed_pms(&storage).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let keep = storage
        .insert_replicate(&mut snap, make_replicate(analysis_id, 1, 1, 5_000))
        .await
        .map_err(|e| e.to_string())?;
    let gone = storage
        .insert_replicate(&mut snap, make_replicate(analysis_id, 1, 2, 5_010))
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .delete_replicate(&mut snap, gone)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut reader = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let count = storage
        .count_replicates(&mut reader, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    let listed = storage
        .list_replicates(&mut reader, analysis_id)
        .await
        .map_err(|e| e.to_string())?;
    if count != 1 || listed.len() != 1 || listed[0].id != keep {
        return Err(format!("expected only replicate {keep}, got {listed:?}"));
    }
    storage
        .abort_snapshot(reader)
        .await
        .map_err(|e| e.to_string())
}

async fn list_is_scoped_to_analysis<S: LabStorage>(storage: S) -> Result<(), String> {
    let (_, first) = seed_pms(&storage).await?;
    let (_, second) = seed_pms(&storage).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .insert_replicate(&mut snap, make_replicate(first, 1, 1, 5_000))
        .await
        .map_err(|e| e.to_string())?;
    let count = storage
        .count_replicates(&mut snap, second)
        .await
        .map_err(|e| e.to_string())?;
    if count != 0 {
        return Err(format!("analysis {second} sees {count} foreign replicates"));
    }
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| e.to_string())
}
