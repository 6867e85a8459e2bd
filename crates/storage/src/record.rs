use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type LotId = i64;
pub type AnalysisId = i64;
pub type ReplicateId = i64;

/// A physical lot of seed. Analyses reference lots but never own them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotRecord {
    /// Assigned by the backend on insert; ignored when inserting.
    pub id: LotId,
    pub code: String,
    pub species: String,
    pub active: bool,
}

/// Position of an analysis in the approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    Registered,
    InProgress,
    PendingApproval,
    Approved,
    ToRepeat,
}

impl AnalysisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisState::Registered => "REGISTERED",
            AnalysisState::InProgress => "IN_PROGRESS",
            AnalysisState::PendingApproval => "PENDING_APPROVAL",
            AnalysisState::Approved => "APPROVED",
            AnalysisState::ToRepeat => "TO_REPEAT",
        }
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Germination,
    Purity,
    Pms,
    Tetrazolium,
    OtherSeedContent,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 5] = [
        AnalysisKind::Germination,
        AnalysisKind::Purity,
        AnalysisKind::Pms,
        AnalysisKind::Tetrazolium,
        AnalysisKind::OtherSeedContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Germination => "germination",
            AnalysisKind::Purity => "purity",
            AnalysisKind::Pms => "pms",
            AnalysisKind::Tetrazolium => "tetrazolium",
            AnalysisKind::OtherSeedContent => "other_seed_content",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analysis of a lot, whatever its kind.
///
/// `finished_at` is only set when the analysis is sent to
/// `PENDING_APPROVAL` or `APPROVED`. Inactive analyses are soft-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Assigned by the backend on insert; ignored when inserting.
    pub id: AnalysisId,
    pub lot_id: LotId,
    pub state: AnalysisState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    pub active: bool,
    pub comments: Option<String>,
    pub detail: AnalysisDetail,
}

impl AnalysisRecord {
    pub fn kind(&self) -> AnalysisKind {
        self.detail.kind()
    }

    /// The PMS payload, if this is a PMS analysis.
    pub fn pms(&self) -> Option<&PmsDetail> {
        match &self.detail {
            AnalysisDetail::Pms(pms) => Some(pms),
            _ => None,
        }
    }

    pub fn pms_mut(&mut self) -> Option<&mut PmsDetail> {
        match &mut self.detail {
            AnalysisDetail::Pms(pms) => Some(pms),
            _ => None,
        }
    }
}

/// Kind-specific payload of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisDetail {
    Germination(GerminationDetail),
    Purity(PurityDetail),
    Pms(PmsDetail),
    Tetrazolium(TetrazoliumDetail),
    OtherSeedContent(OtherSeedContentDetail),
}

impl AnalysisDetail {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisDetail::Germination(_) => AnalysisKind::Germination,
            AnalysisDetail::Purity(_) => AnalysisKind::Purity,
            AnalysisDetail::Pms(_) => AnalysisKind::Pms,
            AnalysisDetail::Tetrazolium(_) => AnalysisKind::Tetrazolium,
            AnalysisDetail::OtherSeedContent(_) => AnalysisKind::OtherSeedContent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GerminationDetail {
    pub expected_replicates: u32,
    #[serde(default)]
    pub counts: Vec<GerminationCount>,
}

/// Seedling evaluation of one germination replicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GerminationCount {
    pub seeds: u32,
    pub normal: u32,
    pub abnormal: u32,
    pub hard: u32,
    pub fresh: u32,
    pub dead: u32,
}

/// Physical purity fractions, in grams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurityDetail {
    pub sample_weight: Option<Decimal>,
    pub pure_seed: Option<Decimal>,
    pub inert_matter: Option<Decimal>,
    pub other_seeds: Option<Decimal>,
}

/// Thousand-seed-weight analysis state.
///
/// `aggregates` is a cache over the currently valid replicates and is only
/// written by the batch validator. `derived_weight_rounded` is entered by an
/// operator and never computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmsDetail {
    pub expected_replicates_per_batch: u32,
    pub batch_count: u32,
    pub is_fluffy_seed: bool,
    pub aggregates: Option<PmsAggregates>,
    pub derived_weight_rounded: Option<Decimal>,
}

impl PmsDetail {
    pub fn new(expected_replicates_per_batch: u32, is_fluffy_seed: bool) -> Self {
        Self {
            expected_replicates_per_batch,
            batch_count: 1,
            is_fluffy_seed,
            aggregates: None,
            derived_weight_rounded: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmsAggregates {
    pub mean_weight: Decimal,
    pub std_dev: Decimal,
    pub coefficient_of_variation: Decimal,
    pub derived_weight_unrounded: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetrazoliumDetail {
    #[serde(default)]
    pub counts: Vec<TetrazoliumCount>,
    pub viability_rounded: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetrazoliumCount {
    pub seeds: u32,
    pub viable: u32,
    pub non_viable: u32,
}

/// Determination of other seeds (by number) in a working sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherSeedContentDetail {
    pub sample_weight: Option<Decimal>,
    #[serde(default)]
    pub findings: Vec<OtherSeedFinding>,
    #[serde(default)]
    pub none_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherSeedFinding {
    pub species: String,
    pub count: u32,
}

/// Outcome of outlier evaluation for one replicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicateValidity {
    Valid,
    Invalid,
    /// Not enough replicates yet to judge.
    Indeterminate,
}

/// One 100-seed weighing of a PMS analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateRecord {
    /// Assigned by the backend on insert; ignored when inserting.
    pub id: ReplicateId,
    pub analysis_id: AnalysisId,
    pub batch_number: u32,
    pub sequence_in_batch: u32,
    pub weight: Decimal,
    pub validity: ReplicateValidity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn state_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&AnalysisState::PendingApproval).unwrap();
        assert_eq!(json, "\"PENDING_APPROVAL\"");
        assert_eq!(AnalysisState::ToRepeat.to_string(), "TO_REPEAT");
    }

    #[test]
    fn detail_is_tagged_by_kind() {
        let detail = AnalysisDetail::Pms(PmsDetail::new(8, false));
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "pms");
        assert_eq!(json["batch_count"], 1);
        assert_eq!(detail.kind(), AnalysisKind::Pms);
    }

    #[test]
    fn decimals_serialize_as_strings() {
        let replicate = ReplicateRecord {
            id: 1,
            analysis_id: 1,
            batch_number: 1,
            sequence_in_batch: 1,
            weight: Decimal::from_str("5.234").unwrap(),
            validity: ReplicateValidity::Indeterminate,
        };
        let json = serde_json::to_value(&replicate).unwrap();
        assert_eq!(json["weight"], "5.234");
        assert_eq!(json["validity"], "indeterminate");
    }

    #[test]
    fn analysis_timestamps_are_rfc3339() {
        let record = AnalysisRecord {
            id: 3,
            lot_id: 1,
            state: AnalysisState::Registered,
            started_at: Some(OffsetDateTime::UNIX_EPOCH),
            finished_at: None,
            active: true,
            comments: None,
            detail: AnalysisDetail::Purity(PurityDetail::default()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["started_at"], "1970-01-01T00:00:00Z");
        assert!(json["finished_at"].is_null());
        let back: AnalysisRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
