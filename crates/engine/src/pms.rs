//! Thousand-seed-weight (PMS) replicate acceptance.
//!
//! Pure functions over a PMS analysis' detail and its full replicate set.
//! Replicates are grouped in batches that open one after another while the
//! evidence is insufficient:
//!
//! 1. Intake places a new replicate in the first batch still short of
//!    valid replicates, or opens a new batch (never beyond the hard cap).
//! 2. Validation rejects replicates outside `mean ± sigma * std_dev` of the
//!    whole set, then opens another batch while the valid set is too
//!    variable.
//! 3. Readiness accepts the first batch whose own valid replicates pass the
//!    CV threshold, or any analysis that exhausted the cap.
//!
//! Aggregates cached on the detail are derived from the valid replicates
//! and only ever written here.

use rust_decimal::Decimal;
use seedlab_storage::{AnalysisId, PmsAggregates, PmsDetail, ReplicateRecord, ReplicateValidity};
use serde::Serialize;

use crate::config::PmsPolicy;
use crate::error::{LabError, Result};
use crate::statistics::{ReplicateStatistics, StatsError};

/// Whether a PMS analysis has enough consistent evidence to be finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Readiness {
    /// A batch's valid replicates passed the CV threshold.
    Accepted {
        batch: u32,
        coefficient_of_variation: Decimal,
    },
    /// No batch passed but the replicate cap is exhausted.
    ForcedAtCap,
    NotReady,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        !matches!(self, Readiness::NotReady)
    }
}

/// What a validation pass changed besides replicate validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationOutcome {
    /// Batch opened because the valid set was too variable.
    pub opened_batch: Option<u32>,
    pub valid: usize,
    pub invalid: usize,
}

fn expected(detail: &PmsDetail) -> usize {
    detail.expected_replicates_per_batch as usize
}

fn valid_weights<'a>(replicates: impl IntoIterator<Item = &'a ReplicateRecord>) -> Vec<Decimal> {
    replicates
        .into_iter()
        .filter(|r| r.validity == ReplicateValidity::Valid)
        .map(|r| r.weight)
        .collect()
}

fn batch_members(
    replicates: &[ReplicateRecord],
    batch: u32,
) -> impl Iterator<Item = &ReplicateRecord> {
    replicates.iter().filter(move |r| r.batch_number == batch)
}

fn valid_in_batch(replicates: &[ReplicateRecord], batch: u32) -> usize {
    batch_members(replicates, batch)
        .filter(|r| r.validity == ReplicateValidity::Valid)
        .count()
}

/// True when every open batch already holds its quota of valid replicates.
fn all_batches_filled(detail: &PmsDetail, replicates: &[ReplicateRecord]) -> bool {
    (1..=detail.batch_count).all(|batch| valid_in_batch(replicates, batch) >= expected(detail))
}

/// Number of replicates currently stored in `batch`.
pub fn batch_size(replicates: &[ReplicateRecord], batch: u32) -> usize {
    batch_members(replicates, batch).count()
}

/// Next free sequence number inside `batch`.
pub fn next_sequence(replicates: &[ReplicateRecord], batch: u32) -> u32 {
    batch_members(replicates, batch)
        .map(|r| r.sequence_in_batch)
        .max()
        .unwrap_or(0)
        + 1
}

/// Choose the batch a new replicate goes into.
///
/// May open a new batch, in which case `detail.batch_count` is incremented.
pub fn plan_intake(
    analysis_id: AnalysisId,
    detail: &mut PmsDetail,
    replicates: &[ReplicateRecord],
    policy: &PmsPolicy,
) -> Result<u32> {
    let limit = policy.max_replicates;
    if replicates.len() >= limit as usize {
        return Err(LabError::BatchLimitReached { analysis_id, limit });
    }

    if let Some(batch) = (1..=detail.batch_count)
        .find(|batch| valid_in_batch(replicates, *batch) < expected(detail))
    {
        return Ok(batch);
    }

    let valid = valid_weights(replicates);
    if !valid.is_empty() {
        let stats = ReplicateStatistics::compute(&valid)?;
        let threshold = policy.cv_threshold(detail.is_fluffy_seed);
        if stats.coefficient_of_variation <= threshold {
            return Err(LabError::NoMoreReplicatesNeeded {
                analysis_id,
                coefficient_of_variation: stats.coefficient_of_variation,
                threshold,
            });
        }
    }

    detail.batch_count += 1;
    tracing::info!(
        analysis_id,
        batch = detail.batch_count,
        "opened batch for incoming replicate"
    );
    Ok(detail.batch_count)
}

/// Recompute validity of every replicate and the cached aggregates.
///
/// With fewer replicates than one batch's quota nothing can be judged: every
/// replicate becomes indeterminate and the aggregates are cleared.
pub fn validate_all(
    analysis_id: AnalysisId,
    detail: &mut PmsDetail,
    replicates: &mut [ReplicateRecord],
    policy: &PmsPolicy,
) -> std::result::Result<ValidationOutcome, StatsError> {
    if replicates.len() < expected(detail) {
        for r in replicates.iter_mut() {
            r.validity = ReplicateValidity::Indeterminate;
        }
        detail.aggregates = None;
        tracing::debug!(
            analysis_id,
            replicates = replicates.len(),
            "too few replicates to judge"
        );
        return Ok(ValidationOutcome::default());
    }

    let weights: Vec<Decimal> = replicates.iter().map(|r| r.weight).collect();
    let overall = ReplicateStatistics::compute(&weights)?;
    let (lower, upper) = overall.acceptance_bounds(policy.outlier_sigma);
    for r in replicates.iter_mut() {
        r.validity = if lower <= r.weight && r.weight <= upper {
            ReplicateValidity::Valid
        } else {
            ReplicateValidity::Invalid
        };
    }

    let valid = valid_weights(replicates.iter());
    let mut outcome = ValidationOutcome {
        opened_batch: None,
        valid: valid.len(),
        invalid: replicates.len() - valid.len(),
    };

    if valid.len() >= expected(detail) {
        let accepted = ReplicateStatistics::compute(&valid)?;
        let threshold = policy.cv_threshold(detail.is_fluffy_seed);
        if accepted.coefficient_of_variation > threshold
            && replicates.len() < policy.max_replicates as usize
            && all_batches_filled(detail, replicates)
        {
            detail.batch_count += 1;
            outcome.opened_batch = Some(detail.batch_count);
            tracing::info!(
                analysis_id,
                batch = detail.batch_count,
                cv = %accepted.coefficient_of_variation,
                threshold = %threshold,
                "valid set too variable; opened batch"
            );
        }
    }

    refresh_aggregates(detail, replicates)?;
    tracing::debug!(
        analysis_id,
        valid = outcome.valid,
        invalid = outcome.invalid,
        lower = %lower,
        upper = %upper,
        "validated replicates"
    );
    Ok(outcome)
}

/// Recompute the cached aggregates from the currently valid replicates,
/// clearing them when none is valid.
pub fn refresh_aggregates(
    detail: &mut PmsDetail,
    replicates: &[ReplicateRecord],
) -> std::result::Result<(), StatsError> {
    let valid = valid_weights(replicates);
    detail.aggregates = if valid.is_empty() {
        None
    } else {
        let stats = ReplicateStatistics::compute(&valid)?;
        Some(PmsAggregates {
            mean_weight: stats.mean,
            std_dev: stats.std_dev,
            coefficient_of_variation: stats.coefficient_of_variation,
            derived_weight_unrounded: stats.derived_weight,
        })
    };
    Ok(())
}

/// Decide whether the replicate evidence supports finalization.
///
/// This does not look at `derived_weight_rounded`; see the PMS completeness
/// validator for that requirement.
pub fn readiness(
    detail: &PmsDetail,
    replicates: &[ReplicateRecord],
    policy: &PmsPolicy,
) -> std::result::Result<Readiness, StatsError> {
    let threshold = policy.cv_threshold(detail.is_fluffy_seed);
    for batch in 1..=detail.batch_count {
        let valid = valid_weights(batch_members(replicates, batch));
        if valid.len() >= expected(detail) {
            let stats = ReplicateStatistics::compute(&valid)?;
            if stats.coefficient_of_variation <= threshold {
                return Ok(Readiness::Accepted {
                    batch,
                    coefficient_of_variation: stats.coefficient_of_variation,
                });
            }
        }
    }
    if replicates.len() >= policy.max_replicates as usize {
        return Ok(Readiness::ForcedAtCap);
    }
    Ok(Readiness::NotReady)
}
