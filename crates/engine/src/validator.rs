//! Per-kind completeness validators.
//!
//! A validator answers one question for the lifecycle: does the stored
//! evidence justify finalizing, approving or repeating this analysis? The
//! answer is `Ok(())` or a human-readable reason.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use seedlab_storage::{
    AnalysisDetail, AnalysisKind, AnalysisRecord, GerminationDetail, OtherSeedContentDetail,
    PurityDetail, ReplicateRecord, TetrazoliumCount, TetrazoliumDetail,
};

use crate::config::PmsPolicy;
use crate::pms::{self, Readiness};

/// Everything a validator may look at.
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    pub analysis: &'a AnalysisRecord,
    /// Replicates of the analysis; empty for kinds without replicates.
    pub replicates: &'a [ReplicateRecord],
}

pub trait CompletenessValidator: Send + Sync {
    fn kind(&self) -> AnalysisKind;

    fn check(&self, evidence: &Evidence<'_>) -> Result<(), String>;
}

fn mismatch(expected: AnalysisKind, record: &AnalysisRecord) -> String {
    format!("expected a {expected} analysis, found {}", record.kind())
}

// ── Germination ───────────────────────────────────────────────────────────────

pub struct GerminationCompleteness;

impl GerminationCompleteness {
    fn check_detail(detail: &GerminationDetail) -> Result<(), String> {
        let recorded = detail.counts.len();
        if recorded < detail.expected_replicates as usize {
            return Err(format!(
                "{recorded} of {} germination replicates recorded",
                detail.expected_replicates
            ));
        }
        for (index, count) in detail.counts.iter().enumerate() {
            let evaluated: u64 = [count.normal, count.abnormal, count.hard, count.fresh, count.dead]
                .into_iter()
                .map(u64::from)
                .sum();
            if count.seeds == 0 || evaluated != u64::from(count.seeds) {
                return Err(format!(
                    "replicate {} evaluates {evaluated} of {} seeds",
                    index + 1,
                    count.seeds
                ));
            }
        }
        Ok(())
    }
}

impl CompletenessValidator for GerminationCompleteness {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Germination
    }

    fn check(&self, evidence: &Evidence<'_>) -> Result<(), String> {
        match &evidence.analysis.detail {
            AnalysisDetail::Germination(detail) => Self::check_detail(detail),
            _ => Err(mismatch(self.kind(), evidence.analysis)),
        }
    }
}

// ── Purity ────────────────────────────────────────────────────────────────────

pub struct PurityCompleteness;

impl PurityCompleteness {
    fn check_detail(detail: &PurityDetail) -> Result<(), String> {
        let (Some(sample), Some(pure), Some(inert), Some(other)) = (
            detail.sample_weight,
            detail.pure_seed,
            detail.inert_matter,
            detail.other_seeds,
        ) else {
            return Err("every purity fraction must be weighed".to_string());
        };
        if sample <= Decimal::ZERO {
            return Err("sample weight must be positive".to_string());
        }
        let fractions = pure
            .checked_add(inert)
            .and_then(|sum| sum.checked_add(other))
            .ok_or_else(|| "purity fractions overflow".to_string())?;
        if fractions > sample {
            return Err(format!(
                "fractions weigh {fractions} g, more than the {sample} g sample"
            ));
        }
        Ok(())
    }
}

impl CompletenessValidator for PurityCompleteness {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Purity
    }

    fn check(&self, evidence: &Evidence<'_>) -> Result<(), String> {
        match &evidence.analysis.detail {
            AnalysisDetail::Purity(detail) => Self::check_detail(detail),
            _ => Err(mismatch(self.kind(), evidence.analysis)),
        }
    }
}

// ── PMS ───────────────────────────────────────────────────────────────────────

/// Replicate readiness plus the operator-confirmed rounded weight.
pub struct PmsCompleteness {
    policy: PmsPolicy,
}

impl PmsCompleteness {
    pub fn new(policy: PmsPolicy) -> Self {
        Self { policy }
    }
}

impl CompletenessValidator for PmsCompleteness {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Pms
    }

    fn check(&self, evidence: &Evidence<'_>) -> Result<(), String> {
        let Some(detail) = evidence.analysis.pms() else {
            return Err(mismatch(self.kind(), evidence.analysis));
        };
        let readiness = pms::readiness(detail, evidence.replicates, &self.policy)
            .map_err(|e| e.to_string())?;
        if readiness == Readiness::NotReady {
            return Err(format!(
                "no batch reached a coefficient of variation within {}",
                self.policy.cv_threshold(detail.is_fluffy_seed)
            ));
        }
        if detail.derived_weight_rounded.is_none() {
            return Err("rounded thousand-seed weight has not been entered".to_string());
        }
        Ok(())
    }
}

// ── Tetrazolium ───────────────────────────────────────────────────────────────

pub struct TetrazoliumCompleteness;

fn classified(count: &TetrazoliumCount) -> u64 {
    u64::from(count.viable) + u64::from(count.non_viable)
}

impl TetrazoliumCompleteness {
    fn check_detail(detail: &TetrazoliumDetail) -> Result<(), String> {
        if detail.counts.is_empty() {
            return Err("no tetrazolium replicate recorded".to_string());
        }
        if let Some((index, count)) = detail
            .counts
            .iter()
            .enumerate()
            .find(|(_, c)| c.seeds == 0 || classified(c) != u64::from(c.seeds))
        {
            return Err(format!(
                "replicate {} classifies {} of {} seeds",
                index + 1,
                classified(count),
                count.seeds
            ));
        }
        if detail.viability_rounded.is_none() {
            return Err("rounded viability has not been entered".to_string());
        }
        Ok(())
    }
}

impl CompletenessValidator for TetrazoliumCompleteness {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Tetrazolium
    }

    fn check(&self, evidence: &Evidence<'_>) -> Result<(), String> {
        match &evidence.analysis.detail {
            AnalysisDetail::Tetrazolium(detail) => Self::check_detail(detail),
            _ => Err(mismatch(self.kind(), evidence.analysis)),
        }
    }
}

// ── Other seed content ────────────────────────────────────────────────────────

pub struct OtherSeedContentCompleteness;

impl OtherSeedContentCompleteness {
    fn check_detail(detail: &OtherSeedContentDetail) -> Result<(), String> {
        match detail.sample_weight {
            Some(weight) if weight > Decimal::ZERO => {}
            _ => return Err("sample weight must be recorded and positive".to_string()),
        }
        if detail.findings.is_empty() && !detail.none_found {
            return Err("record a finding or confirm that none were found".to_string());
        }
        Ok(())
    }
}

impl CompletenessValidator for OtherSeedContentCompleteness {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::OtherSeedContent
    }

    fn check(&self, evidence: &Evidence<'_>) -> Result<(), String> {
        match &evidence.analysis.detail {
            AnalysisDetail::OtherSeedContent(detail) => Self::check_detail(detail),
            _ => Err(mismatch(self.kind(), evidence.analysis)),
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Maps each analysis kind to its validator.
#[derive(Clone)]
pub struct ValidatorRegistry {
    validators: BTreeMap<AnalysisKind, Arc<dyn CompletenessValidator>>,
}

impl ValidatorRegistry {
    /// One validator per kind, PMS governed by `policy`.
    pub fn standard(policy: PmsPolicy) -> Self {
        Self {
            validators: BTreeMap::new(),
        }
        .with(Arc::new(GerminationCompleteness))
        .with(Arc::new(PurityCompleteness))
        .with(Arc::new(PmsCompleteness::new(policy)))
        .with(Arc::new(TetrazoliumCompleteness))
        .with(Arc::new(OtherSeedContentCompleteness))
    }

    /// Install `validator`, replacing any previous one for its kind.
    pub fn with(mut self, validator: Arc<dyn CompletenessValidator>) -> Self {
        self.validators.insert(validator.kind(), validator);
        self
    }

    pub fn get(&self, kind: AnalysisKind) -> Option<&dyn CompletenessValidator> {
        self.validators.get(&kind).map(|v| v.as_ref())
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.validators.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedlab_storage::{
        AnalysisState, GerminationCount, OtherSeedFinding, PmsDetail, ReplicateValidity,
    };

    fn analysis(detail: AnalysisDetail) -> AnalysisRecord {
        AnalysisRecord {
            id: 1,
            lot_id: 1,
            state: AnalysisState::InProgress,
            started_at: None,
            finished_at: None,
            active: true,
            comments: None,
            detail,
        }
    }

    fn check(detail: AnalysisDetail, replicates: &[ReplicateRecord]) -> Result<(), String> {
        let registry = ValidatorRegistry::standard(PmsPolicy::default());
        let record = analysis(detail);
        let validator = registry.get(record.kind()).unwrap();
        validator.check(&Evidence {
            analysis: &record,
            replicates,
        })
    }

    #[test]
    fn registry_covers_every_kind() {
        let registry = ValidatorRegistry::standard(PmsPolicy::default());
        for kind in AnalysisKind::ALL {
            assert_eq!(registry.get(kind).map(|v| v.kind()), Some(kind));
        }
    }

    #[test]
    fn germination_needs_balanced_counts() {
        let count = GerminationCount {
            seeds: 100,
            normal: 90,
            abnormal: 4,
            hard: 2,
            fresh: 1,
            dead: 3,
        };
        let short = GerminationDetail {
            expected_replicates: 2,
            counts: vec![count],
        };
        assert!(check(AnalysisDetail::Germination(short), &[]).is_err());

        let unbalanced = GerminationDetail {
            expected_replicates: 2,
            counts: vec![count, GerminationCount { dead: 0, ..count }],
        };
        let reason = check(AnalysisDetail::Germination(unbalanced), &[]).unwrap_err();
        assert!(reason.contains("replicate 2"));

        let complete = GerminationDetail {
            expected_replicates: 2,
            counts: vec![count, count],
        };
        assert_eq!(check(AnalysisDetail::Germination(complete), &[]), Ok(()));
    }

    #[test]
    fn purity_fractions_must_fit_sample() {
        let over = PurityDetail {
            sample_weight: Some(Decimal::new(100, 0)),
            pure_seed: Some(Decimal::new(98, 0)),
            inert_matter: Some(Decimal::new(3, 0)),
            other_seeds: Some(Decimal::ZERO),
        };
        assert!(check(AnalysisDetail::Purity(over.clone()), &[]).is_err());
        let ok = PurityDetail {
            inert_matter: Some(Decimal::new(15, 1)),
            ..over
        };
        assert_eq!(check(AnalysisDetail::Purity(ok), &[]), Ok(()));
        assert!(check(AnalysisDetail::Purity(PurityDetail::default()), &[]).is_err());
    }

    #[test]
    fn oversized_purity_fractions_are_refused() {
        let huge = Decimal::from_scientific("3e28").unwrap();
        let detail = PurityDetail {
            sample_weight: Some(huge),
            pure_seed: Some(huge),
            inert_matter: Some(huge),
            other_seeds: Some(huge),
        };
        assert_eq!(
            check(AnalysisDetail::Purity(detail), &[]),
            Err("purity fractions overflow".to_string())
        );
    }

    #[test]
    fn pms_requires_rounded_weight() {
        let replicates: Vec<_> = [5000, 5010]
            .into_iter()
            .enumerate()
            .map(|(i, mg)| ReplicateRecord {
                id: i as i64 + 1,
                analysis_id: 1,
                batch_number: 1,
                sequence_in_batch: i as u32 + 1,
                weight: Decimal::new(mg, 3),
                validity: ReplicateValidity::Valid,
            })
            .collect();
        let mut detail = PmsDetail::new(2, false);
        let reason = check(AnalysisDetail::Pms(detail.clone()), &replicates).unwrap_err();
        assert!(reason.contains("rounded"));

        detail.derived_weight_rounded = Some(Decimal::new(501, 1));
        assert_eq!(check(AnalysisDetail::Pms(detail.clone()), &replicates), Ok(()));
        assert!(check(AnalysisDetail::Pms(detail), &[]).is_err());
    }

    #[test]
    fn tetrazolium_needs_classified_seeds_and_rounding() {
        let mut detail = TetrazoliumDetail {
            counts: vec![TetrazoliumCount {
                seeds: 50,
                viable: 45,
                non_viable: 5,
            }],
            viability_rounded: None,
        };
        assert!(check(AnalysisDetail::Tetrazolium(detail.clone()), &[]).is_err());
        detail.viability_rounded = Some(Decimal::new(90, 0));
        assert_eq!(check(AnalysisDetail::Tetrazolium(detail.clone()), &[]), Ok(()));
        detail.counts[0].non_viable = 4;
        assert!(check(AnalysisDetail::Tetrazolium(detail), &[]).is_err());
    }

    #[test]
    fn other_seed_content_needs_finding_or_confirmation() {
        let mut detail = OtherSeedContentDetail {
            sample_weight: Some(Decimal::new(250, 0)),
            findings: Vec::new(),
            none_found: false,
        };
        assert!(check(AnalysisDetail::OtherSeedContent(detail.clone()), &[]).is_err());
        detail.none_found = true;
        assert_eq!(
            check(AnalysisDetail::OtherSeedContent(detail.clone()), &[]),
            Ok(())
        );
        detail.none_found = false;
        detail.findings.push(OtherSeedFinding {
            species: "Lolium rigidum".to_string(),
            count: 3,
        });
        assert_eq!(check(AnalysisDetail::OtherSeedContent(detail), &[]), Ok(()));
    }

    #[test]
    fn validator_rejects_other_kind() {
        let record = analysis(AnalysisDetail::Purity(PurityDetail::default()));
        let reason = GerminationCompleteness
            .check(&Evidence {
                analysis: &record,
                replicates: &[],
            })
            .unwrap_err();
        assert!(reason.contains("germination"));
    }
}
