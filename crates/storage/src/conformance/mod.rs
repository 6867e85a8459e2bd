//! Conformance test suite for `LabStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `LabStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes
//!   visible, aborted writes discarded
//! - **Analyses**: id assignment, overwrite, same-kind-by-lot lookup
//! - **Replicates**: ordering, counting, bulk save, delete
//! - **Error handling**: correct not-found variants for unknown ids
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use seedlab_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod analysis;
mod replicate;
mod snapshot;

use std::fmt;
use std::future::Future;

use rust_decimal::Decimal;

use crate::record::{
    AnalysisDetail, AnalysisId, AnalysisRecord, AnalysisState, LotId, LotRecord, PmsDetail,
    PurityDetail, ReplicateRecord, ReplicateValidity,
};
use crate::LabStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "snapshot", "analysis", "replicate").
    pub category: String,
    /// Test name (e.g. "uncommitted_analysis_invisible").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: LabStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(analysis::run_analysis_tests(&factory).await);
    results.extend(replicate::run_replicate_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors and committed setup ─────────────────────────

fn make_lot(code: &str) -> LotRecord {
    LotRecord {
        id: 0,
        code: code.to_string(),
        species: "Lolium perenne".to_string(),
        active: true,
    }
}

fn make_pms_analysis(lot_id: LotId) -> AnalysisRecord {
    AnalysisRecord {
        id: 0,
        lot_id,
        state: AnalysisState::Registered,
        started_at: None,
        finished_at: None,
        active: true,
        comments: None,
        detail: AnalysisDetail::Pms(PmsDetail::new(4, false)),
    }
}

fn make_purity_analysis(lot_id: LotId) -> AnalysisRecord {
    AnalysisRecord {
        detail: AnalysisDetail::Purity(PurityDetail::default()),
        ..make_pms_analysis(lot_id)
    }
}

fn make_replicate(
    analysis_id: AnalysisId,
    batch_number: u32,
    sequence_in_batch: u32,
    weight_milligrams: i64,
) -> ReplicateRecord {
    ReplicateRecord {
        id: 0,
        analysis_id,
        batch_number,
        sequence_in_batch,
        weight: Decimal::new(weight_milligrams, 3),
        validity: ReplicateValidity::Indeterminate,
    }
}

/// Commit a lot plus one PMS analysis and return their ids.
async fn seed_pms<S: LabStorage>(storage: &S) -> Result<(LotId, AnalysisId), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let lot_id = storage
        .insert_lot(&mut snap, make_lot("L-001"))
        .await
        .map_err(|e| format!("insert lot: {e}"))?;
    let analysis_id = storage
        .insert_analysis(&mut snap, make_pms_analysis(lot_id))
        .await
        .map_err(|e| format!("insert analysis: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    Ok((lot_id, analysis_id))
}
