//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use seedlab_engine::{
    HistoryRecorder, MemoryHistory, NotificationDispatcher, RecordingDispatcher, ReplicateRequest,
    SeedLab, StaticRoleAuthority,
};
use seedlab_storage::{
    AnalysisDetail, AnalysisRecord, MemoryStorage, PmsDetail, PurityDetail, ReplicateRecord,
};

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// One lab seen by an analyst and by an administrator.
pub struct Harness {
    pub analyst: SeedLab<MemoryStorage>,
    pub admin: SeedLab<MemoryStorage>,
    pub notices: Arc<RecordingDispatcher>,
    pub history: Arc<MemoryHistory>,
}

pub fn harness() -> Harness {
    let notices = Arc::new(RecordingDispatcher::new());
    let history = Arc::new(MemoryHistory::new());
    harness_with(history.clone(), notices.clone(), notices, history)
}

pub fn harness_with(
    recorder: Arc<dyn HistoryRecorder>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    notices: Arc<RecordingDispatcher>,
    history: Arc<MemoryHistory>,
) -> Harness {
    let analyst = SeedLab::new(
        MemoryStorage::new(),
        Arc::new(StaticRoleAuthority::analyst("ana")),
        recorder,
        dispatcher,
    );
    let admin = analyst.acting_as(Arc::new(StaticRoleAuthority::administrator("root")));
    Harness {
        analyst,
        admin,
        notices,
        history,
    }
}

pub async fn pms_analysis(lab: &SeedLab<MemoryStorage>, expected: u32, fluffy: bool) -> AnalysisRecord {
    let lot = lab.create_lot("L-2026-001", "Lolium perenne").await.unwrap();
    lab.create_analysis(
        lot.id,
        AnalysisDetail::Pms(PmsDetail::new(expected, fluffy)),
        None,
    )
    .await
    .unwrap()
}

pub fn complete_purity() -> AnalysisDetail {
    AnalysisDetail::Purity(PurityDetail {
        sample_weight: Some(d("100")),
        pure_seed: Some(d("98")),
        inert_matter: Some(d("1.5")),
        other_seeds: Some(d("0.5")),
    })
}

/// Weigh every value in order, failing the test on the first refusal.
pub async fn weigh(
    lab: &SeedLab<MemoryStorage>,
    analysis_id: i64,
    weights: &[&str],
) -> Vec<ReplicateRecord> {
    let mut added = Vec::new();
    for w in weights {
        let replicate = lab
            .add_replicate(analysis_id, ReplicateRequest { weight: d(w) })
            .await
            .unwrap_or_else(|e| panic!("weighing {w} failed: {e}"));
        added.push(replicate);
    }
    added
}
