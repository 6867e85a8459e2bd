//! The engine facade.
//!
//! [`SeedLab`] runs every operation inside one storage snapshot. Mutations
//! of an analysis hold its lock for the whole unit of work, so concurrent
//! replicate intake on one analysis is serialized. A failure anywhere aborts
//! the snapshot; notifications are sent only after a successful commit and
//! their failures are logged, never returned.

use std::sync::Arc;

use rust_decimal::Decimal;
use seedlab_storage::{
    AnalysisDetail, AnalysisId, AnalysisKind, AnalysisRecord, AnalysisState, LabStorage, LotId,
    LotRecord, ReplicateId, ReplicateRecord, ReplicateValidity,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::OwnedMutexGuard;

use crate::config::{ConfigError, PmsPolicy};
use crate::error::{LabError, Result};
use crate::history::{HistoryEntry, HistoryRecorder};
use crate::lifecycle::{self, TransitionContext};
use crate::locks::{LockKey, LockTable};
use crate::notify::{NotificationDispatcher, NotificationKind};
use crate::pms::{self, Readiness};
use crate::role::RoleAuthority;
use crate::validator::{CompletenessValidator, ValidatorRegistry};

/// A new or corrected 100-seed weighing, in grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub weight: Decimal,
}

/// Operator changes to an existing analysis. `None` leaves a field as is.
///
/// For PMS only `derived_weight_rounded` and `is_fluffy_seed` are taken
/// from `detail`; batch layout and aggregates belong to the validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEdit {
    pub comments: Option<String>,
    pub detail: Option<AnalysisDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Finalize,
    Approve,
    MarkForRepeat,
    Deactivate,
    Reactivate,
}

impl Transition {
    fn as_str(&self) -> &'static str {
        match self {
            Transition::Finalize => "finalize",
            Transition::Approve => "approve",
            Transition::MarkForRepeat => "mark_for_repeat",
            Transition::Deactivate => "deactivate",
            Transition::Reactivate => "reactivate",
        }
    }
}

fn entity(kind: AnalysisKind) -> &'static str {
    match kind {
        AnalysisKind::Germination => "germination analysis",
        AnalysisKind::Purity => "purity analysis",
        AnalysisKind::Pms => "pms analysis",
        AnalysisKind::Tetrazolium => "tetrazolium analysis",
        AnalysisKind::OtherSeedContent => "other seed content analysis",
    }
}

fn ensure_active(record: &AnalysisRecord) -> Result<()> {
    if record.active {
        Ok(())
    } else {
        Err(LabError::InactiveAnalysis {
            analysis_id: record.id,
        })
    }
}

fn positive_weight(request: &ReplicateRequest) -> Result<Decimal> {
    if request.weight <= Decimal::ZERO {
        return Err(LabError::InvalidRequest(format!(
            "replicate weight must be positive, got {}",
            request.weight
        )));
    }
    Ok(request.weight)
}

fn pms_detail(record: &mut AnalysisRecord) -> Result<&mut seedlab_storage::PmsDetail> {
    let id = record.id;
    record.pms_mut().ok_or(LabError::NotFound {
        entity: entity(AnalysisKind::Pms),
        id,
    })
}

/// Seed analysis workflow over a [`LabStorage`] backend.
pub struct SeedLab<S: LabStorage> {
    storage: Arc<S>,
    roles: Arc<dyn RoleAuthority>,
    history: Arc<dyn HistoryRecorder>,
    notifier: Arc<dyn NotificationDispatcher>,
    validators: ValidatorRegistry,
    policy: PmsPolicy,
    locks: Arc<LockTable>,
}

impl<S: LabStorage> Clone for SeedLab<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            roles: Arc::clone(&self.roles),
            history: Arc::clone(&self.history),
            notifier: Arc::clone(&self.notifier),
            validators: self.validators.clone(),
            policy: self.policy,
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S: LabStorage> std::fmt::Debug for SeedLab<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedLab")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<S: LabStorage> SeedLab<S> {
    pub fn new(
        storage: S,
        roles: Arc<dyn RoleAuthority>,
        history: Arc<dyn HistoryRecorder>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let policy = PmsPolicy::default();
        Self {
            storage: Arc::new(storage),
            roles,
            history,
            notifier,
            validators: ValidatorRegistry::standard(policy),
            policy,
            locks: Arc::new(LockTable::new()),
        }
    }

    /// Replace the PMS policy, rebuilding the standard validators with it.
    ///
    /// Fails if the policy is invalid, e.g. a cap above 16 replicates.
    pub fn with_policy(mut self, policy: PmsPolicy) -> std::result::Result<Self, ConfigError> {
        policy.validate()?;
        self.policy = policy;
        self.validators = ValidatorRegistry::standard(policy);
        Ok(self)
    }

    /// Override the completeness validators.
    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }

    /// The same lab (storage, locks, history, notifications) acting for
    /// another user.
    pub fn acting_as(&self, roles: Arc<dyn RoleAuthority>) -> Self {
        Self {
            roles,
            ..self.clone()
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn policy(&self) -> &PmsPolicy {
        &self.policy
    }

    // ── Unit of work plumbing ─────────────────────────────────────────────────

    /// Commit on success, abort on failure.
    async fn settle<T>(&self, snapshot: S::Snapshot, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.storage.commit_snapshot(snapshot).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort) = self.storage.abort_snapshot(snapshot).await {
                    tracing::warn!(error = %abort, "failed to abort snapshot");
                }
                Err(err)
            }
        }
    }

    async fn dispatch(&self, notification: Option<NotificationKind>, analysis_id: AnalysisId) {
        let Some(event) = notification else {
            return;
        };
        if let Err(e) = self.notifier.notify(event, analysis_id).await {
            tracing::warn!(analysis_id, event = %event, error = %e, "notification failed");
        }
    }

    fn validator(&self, kind: AnalysisKind) -> Result<&dyn CompletenessValidator> {
        self.validators
            .get(kind)
            .ok_or_else(|| LabError::InvalidRequest(format!("no validator for {kind} analyses")))
    }

    async fn load(
        &self,
        snapshot: &mut S::Snapshot,
        kind: AnalysisKind,
        analysis_id: AnalysisId,
    ) -> Result<AnalysisRecord> {
        let record = self.storage.get_analysis(snapshot, analysis_id).await?;
        if record.kind() != kind {
            return Err(LabError::NotFound {
                entity: entity(kind),
                id: analysis_id,
            });
        }
        Ok(record)
    }

    async fn replicates_of(
        &self,
        snapshot: &mut S::Snapshot,
        record: &AnalysisRecord,
    ) -> Result<Vec<ReplicateRecord>> {
        if record.kind() == AnalysisKind::Pms {
            Ok(self.storage.list_replicates(snapshot, record.id).await?)
        } else {
            Ok(Vec::new())
        }
    }

    /// Persist a changed analysis and its audit entry.
    ///
    /// The entry is written before commit; see [`HistoryRecorder`] for what
    /// a failed commit leaves behind.
    async fn store(&self, snapshot: &mut S::Snapshot, record: &AnalysisRecord) -> Result<()> {
        self.storage.save_analysis(snapshot, record.clone()).await?;
        self.history
            .record_modification(record, &self.roles.current_actor())
            .await?;
        Ok(())
    }

    /// Find the analysis owning a replicate without holding any lock.
    async fn owner_of(&self, replicate_id: ReplicateId) -> Result<AnalysisId> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self.storage.get_replicate(&mut snapshot, replicate_id).await;
        self.settle(snapshot, outcome.map_err(LabError::from))
            .await
            .map(|r| r.analysis_id)
    }

    // ── Lots and analyses ─────────────────────────────────────────────────────

    pub async fn create_lot(
        &self,
        code: impl Into<String>,
        species: impl Into<String>,
    ) -> Result<LotRecord> {
        let mut record = LotRecord {
            id: 0,
            code: code.into(),
            species: species.into(),
            active: true,
        };
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self.storage.insert_lot(&mut snapshot, record.clone()).await;
        record.id = self.settle(snapshot, outcome.map_err(LabError::from)).await?;
        tracing::info!(lot_id = record.id, code = %record.code, "lot registered");
        Ok(record)
    }

    /// Register a new analysis of `lot_id` in `REGISTERED`.
    pub async fn create_analysis(
        &self,
        lot_id: LotId,
        detail: AnalysisDetail,
        comments: Option<String>,
    ) -> Result<AnalysisRecord> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self
            .create_analysis_in(&mut snapshot, lot_id, detail, comments)
            .await;
        self.settle(snapshot, outcome).await
    }

    async fn create_analysis_in(
        &self,
        snapshot: &mut S::Snapshot,
        lot_id: LotId,
        detail: AnalysisDetail,
        comments: Option<String>,
    ) -> Result<AnalysisRecord> {
        self.storage.get_lot(snapshot, lot_id).await?;
        let detail = self.admit_detail(detail)?;
        let mut record = AnalysisRecord {
            id: 0,
            lot_id,
            state: AnalysisState::Registered,
            started_at: Some(OffsetDateTime::now_utc()),
            finished_at: None,
            active: true,
            comments,
            detail,
        };
        record.id = self
            .storage
            .insert_analysis(snapshot, record.clone())
            .await?;
        self.history
            .record_creation(&record, &self.roles.current_actor())
            .await?;
        tracing::info!(
            analysis_id = record.id,
            lot_id,
            kind = %record.kind(),
            "analysis registered"
        );
        Ok(record)
    }

    /// Check a caller-supplied detail and strip what engine-owned fields it
    /// carries.
    fn admit_detail(&self, detail: AnalysisDetail) -> Result<AnalysisDetail> {
        match detail {
            AnalysisDetail::Pms(pms) => {
                let expected = pms.expected_replicates_per_batch;
                if expected == 0 || expected > self.policy.max_replicates {
                    return Err(LabError::InvalidRequest(format!(
                        "expected replicates per batch must be between 1 and {}, got {expected}",
                        self.policy.max_replicates
                    )));
                }
                let mut fresh = seedlab_storage::PmsDetail::new(expected, pms.is_fluffy_seed);
                fresh.derived_weight_rounded = pms.derived_weight_rounded;
                Ok(AnalysisDetail::Pms(fresh))
            }
            AnalysisDetail::Germination(germination) if germination.expected_replicates == 0 => {
                Err(LabError::InvalidRequest(
                    "germination needs at least one expected replicate".to_string(),
                ))
            }
            other => Ok(other),
        }
    }

    /// Look up any analysis by id.
    pub async fn analysis(&self, analysis_id: AnalysisId) -> Result<AnalysisRecord> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self.storage.get_analysis(&mut snapshot, analysis_id).await;
        self.settle(snapshot, outcome.map_err(LabError::from)).await
    }

    /// Replicates of a PMS analysis, ordered by batch and sequence.
    pub async fn replicates(&self, analysis_id: AnalysisId) -> Result<Vec<ReplicateRecord>> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = async {
            self.load(&mut snapshot, AnalysisKind::Pms, analysis_id)
                .await?;
            Ok::<_, LabError>(
                self.storage
                    .list_replicates(&mut snapshot, analysis_id)
                    .await?,
            )
        }
        .await;
        self.settle(snapshot, outcome).await
    }

    /// Audit trail of an analysis, most recent first.
    pub async fn history(&self, analysis_id: AnalysisId) -> Result<Vec<HistoryEntry>> {
        self.analysis(analysis_id).await?;
        Ok(self.history.history(analysis_id).await?)
    }

    /// Apply operator edits to an analysis.
    pub async fn update_analysis(
        &self,
        kind: AnalysisKind,
        analysis_id: AnalysisId,
        edit: AnalysisEdit,
    ) -> Result<AnalysisRecord> {
        let guard = self.locks.lock(LockKey::Analysis(analysis_id)).await;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self
            .update_analysis_in(&mut snapshot, kind, analysis_id, edit)
            .await;
        let (record, notification) = self.settle(snapshot, outcome).await?;
        drop(guard);
        self.dispatch(notification, analysis_id).await;
        Ok(record)
    }

    async fn update_analysis_in(
        &self,
        snapshot: &mut S::Snapshot,
        kind: AnalysisKind,
        analysis_id: AnalysisId,
        edit: AnalysisEdit,
    ) -> Result<(AnalysisRecord, Option<NotificationKind>)> {
        let mut record = self.load(snapshot, kind, analysis_id).await?;
        ensure_active(&record)?;

        if let Some(comments) = edit.comments {
            record.comments = Some(comments);
        }
        let mut revalidate = false;
        match (edit.detail, &mut record.detail) {
            (None, _) => {}
            (Some(AnalysisDetail::Pms(incoming)), AnalysisDetail::Pms(current)) => {
                revalidate = incoming.is_fluffy_seed != current.is_fluffy_seed;
                current.is_fluffy_seed = incoming.is_fluffy_seed;
                current.derived_weight_rounded = incoming.derived_weight_rounded;
            }
            (Some(incoming), current) if incoming.kind() == current.kind() => {
                *current = self.admit_detail(incoming)?;
            }
            (Some(incoming), current) => {
                return Err(LabError::InvalidRequest(format!(
                    "cannot replace {} detail with {} detail",
                    current.kind(),
                    incoming.kind()
                )));
            }
        }

        if revalidate {
            let mut replicates = self.storage.list_replicates(snapshot, analysis_id).await?;
            let detail = pms_detail(&mut record)?;
            pms::validate_all(analysis_id, detail, &mut replicates, &self.policy)?;
            self.storage.save_replicates(snapshot, replicates).await?;
        }

        let privileged = self.roles.current_actor_has_privileged_role();
        let notification = lifecycle::edit_after_approval(&mut record, privileged);
        self.store(snapshot, &record).await?;
        Ok((record, notification))
    }

    // ── PMS replicates ────────────────────────────────────────────────────────

    /// Weigh a new replicate into the first batch that still needs one.
    pub async fn add_replicate(
        &self,
        analysis_id: AnalysisId,
        request: ReplicateRequest,
    ) -> Result<ReplicateRecord> {
        let weight = positive_weight(&request)?;
        let guard = self.locks.lock(LockKey::Analysis(analysis_id)).await;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self
            .add_replicate_in(&mut snapshot, analysis_id, weight)
            .await;
        let (replicate, notification) = self.settle(snapshot, outcome).await?;
        drop(guard);
        self.dispatch(notification, analysis_id).await;
        Ok(replicate)
    }

    async fn add_replicate_in(
        &self,
        snapshot: &mut S::Snapshot,
        analysis_id: AnalysisId,
        weight: Decimal,
    ) -> Result<(ReplicateRecord, Option<NotificationKind>)> {
        let mut record = self.load(snapshot, AnalysisKind::Pms, analysis_id).await?;
        ensure_active(&record)?;
        let mut replicates = self.storage.list_replicates(snapshot, analysis_id).await?;

        let detail = pms_detail(&mut record)?;
        let batch = pms::plan_intake(analysis_id, detail, &replicates, &self.policy)?;
        let mut replicate = ReplicateRecord {
            id: 0,
            analysis_id,
            batch_number: batch,
            sequence_in_batch: pms::next_sequence(&replicates, batch),
            weight,
            validity: ReplicateValidity::Indeterminate,
        };
        replicate.id = self
            .storage
            .insert_replicate(snapshot, replicate.clone())
            .await?;
        replicates.push(replicate.clone());
        tracing::debug!(
            analysis_id,
            replicate_id = replicate.id,
            batch,
            sequence = replicate.sequence_in_batch,
            "replicate weighed"
        );

        if pms::batch_size(&replicates, batch) >= detail.expected_replicates_per_batch as usize {
            pms::validate_all(analysis_id, detail, &mut replicates, &self.policy)?;
            if let Some(current) = replicates.iter().find(|r| r.id == replicate.id) {
                replicate.validity = current.validity;
            }
            self.storage.save_replicates(snapshot, replicates).await?;
        } else {
            pms::refresh_aggregates(detail, &replicates)?;
        }

        if record.state == AnalysisState::Registered {
            tracing::info!(analysis_id, "first replicate recorded; analysis in progress");
            record.state = AnalysisState::InProgress;
        }
        let privileged = self.roles.current_actor_has_privileged_role();
        let notification = lifecycle::edit_after_approval(&mut record, privileged);
        self.store(snapshot, &record).await?;
        Ok((replicate, notification))
    }

    /// Correct the weight of a replicate and revalidate its analysis.
    pub async fn update_replicate(
        &self,
        replicate_id: ReplicateId,
        request: ReplicateRequest,
    ) -> Result<ReplicateRecord> {
        let weight = positive_weight(&request)?;
        let analysis_id = self.owner_of(replicate_id).await?;
        let guard = self.locks.lock(LockKey::Analysis(analysis_id)).await;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self
            .rework_replicate_in(&mut snapshot, analysis_id, replicate_id, Some(weight))
            .await;
        let (replicate, notification) = self.settle(snapshot, outcome).await?;
        drop(guard);
        self.dispatch(notification, analysis_id).await;
        replicate.ok_or(LabError::NotFound {
            entity: "replicate",
            id: replicate_id,
        })
    }

    /// Remove a replicate and revalidate its analysis.
    pub async fn delete_replicate(&self, replicate_id: ReplicateId) -> Result<()> {
        let analysis_id = self.owner_of(replicate_id).await?;
        let guard = self.locks.lock(LockKey::Analysis(analysis_id)).await;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self
            .rework_replicate_in(&mut snapshot, analysis_id, replicate_id, None)
            .await;
        let (_, notification) = self.settle(snapshot, outcome).await?;
        drop(guard);
        self.dispatch(notification, analysis_id).await;
        Ok(())
    }

    /// Reweigh (`Some`) or delete (`None`) a replicate, then revalidate.
    async fn rework_replicate_in(
        &self,
        snapshot: &mut S::Snapshot,
        analysis_id: AnalysisId,
        replicate_id: ReplicateId,
        weight: Option<Decimal>,
    ) -> Result<(Option<ReplicateRecord>, Option<NotificationKind>)> {
        let mut record = self.load(snapshot, AnalysisKind::Pms, analysis_id).await?;
        ensure_active(&record)?;
        let mut replicate = self.storage.get_replicate(snapshot, replicate_id).await?;
        match weight {
            Some(weight) => {
                replicate.weight = weight;
                self.storage.save_replicate(snapshot, replicate).await?;
            }
            None => self.storage.delete_replicate(snapshot, replicate_id).await?,
        }

        let mut replicates = self.storage.list_replicates(snapshot, analysis_id).await?;
        let detail = pms_detail(&mut record)?;
        pms::validate_all(analysis_id, detail, &mut replicates, &self.policy)?;
        let reworked = replicates.iter().find(|r| r.id == replicate_id).cloned();
        self.storage.save_replicates(snapshot, replicates).await?;

        let privileged = self.roles.current_actor_has_privileged_role();
        let notification = lifecycle::edit_after_approval(&mut record, privileged);
        self.store(snapshot, &record).await?;
        Ok((reworked, notification))
    }

    /// Recompute replicate validity and aggregates of a PMS analysis.
    pub async fn validate_all(&self, analysis_id: AnalysisId) -> Result<AnalysisRecord> {
        let _guard = self.locks.lock(LockKey::Analysis(analysis_id)).await;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self.validate_all_in(&mut snapshot, analysis_id).await;
        self.settle(snapshot, outcome).await
    }

    async fn validate_all_in(
        &self,
        snapshot: &mut S::Snapshot,
        analysis_id: AnalysisId,
    ) -> Result<AnalysisRecord> {
        let mut record = self.load(snapshot, AnalysisKind::Pms, analysis_id).await?;
        ensure_active(&record)?;
        let before = record.clone();
        let mut replicates = self.storage.list_replicates(snapshot, analysis_id).await?;
        let stored = replicates.clone();

        let detail = pms_detail(&mut record)?;
        pms::validate_all(analysis_id, detail, &mut replicates, &self.policy)?;
        if replicates != stored {
            self.storage.save_replicates(snapshot, replicates).await?;
        }
        if record != before {
            self.store(snapshot, &record).await?;
        }
        Ok(record)
    }

    /// Whether the replicate evidence of a PMS analysis supports finalizing.
    pub async fn is_ready_to_finalize(&self, analysis_id: AnalysisId) -> Result<Readiness> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = async {
            let record = self
                .load(&mut snapshot, AnalysisKind::Pms, analysis_id)
                .await?;
            let replicates = self
                .storage
                .list_replicates(&mut snapshot, analysis_id)
                .await?;
            let detail = record.pms().ok_or(LabError::NotFound {
                entity: entity(AnalysisKind::Pms),
                id: analysis_id,
            })?;
            Ok::<_, LabError>(pms::readiness(detail, &replicates, &self.policy)?)
        }
        .await;
        self.settle(snapshot, outcome).await
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Close data entry: analysts send to approval, privileged users approve.
    pub async fn finalize(
        &self,
        kind: AnalysisKind,
        analysis_id: AnalysisId,
    ) -> Result<AnalysisRecord> {
        self.transition(kind, analysis_id, Transition::Finalize)
            .await
    }

    pub async fn approve(&self, kind: AnalysisKind, analysis_id: AnalysisId) -> Result<AnalysisRecord> {
        self.transition(kind, analysis_id, Transition::Approve).await
    }

    pub async fn mark_for_repeat(
        &self,
        kind: AnalysisKind,
        analysis_id: AnalysisId,
    ) -> Result<AnalysisRecord> {
        self.transition(kind, analysis_id, Transition::MarkForRepeat)
            .await
    }

    /// Soft-delete an analysis.
    pub async fn deactivate(
        &self,
        kind: AnalysisKind,
        analysis_id: AnalysisId,
    ) -> Result<AnalysisRecord> {
        self.transition(kind, analysis_id, Transition::Deactivate)
            .await
    }

    pub async fn reactivate(
        &self,
        kind: AnalysisKind,
        analysis_id: AnalysisId,
    ) -> Result<AnalysisRecord> {
        self.transition(kind, analysis_id, Transition::Reactivate)
            .await
    }

    async fn transition(
        &self,
        kind: AnalysisKind,
        analysis_id: AnalysisId,
        transition: Transition,
    ) -> Result<AnalysisRecord> {
        let guard = self.locks.lock(LockKey::Analysis(analysis_id)).await;
        let mut lot_guard = None;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let outcome = self
            .transition_in(&mut snapshot, kind, analysis_id, transition, &mut lot_guard)
            .await;
        let outcome = self.settle(snapshot, outcome).await;
        drop(lot_guard);
        drop(guard);

        let (record, notification) = outcome.inspect_err(|e| {
            tracing::debug!(
                analysis_id,
                operation = transition.as_str(),
                error = %e,
                "transition refused"
            );
        })?;
        self.dispatch(notification, analysis_id).await;
        Ok(record)
    }

    async fn transition_in(
        &self,
        snapshot: &mut S::Snapshot,
        kind: AnalysisKind,
        analysis_id: AnalysisId,
        transition: Transition,
        lot_guard: &mut Option<OwnedMutexGuard<()>>,
    ) -> Result<(AnalysisRecord, Option<NotificationKind>)> {
        let mut record = self.load(snapshot, kind, analysis_id).await?;

        let notification = match transition {
            Transition::Deactivate => {
                lifecycle::deactivate(&mut record)?;
                None
            }
            Transition::Reactivate => {
                lifecycle::reactivate(&mut record)?;
                None
            }
            Transition::Finalize | Transition::Approve | Transition::MarkForRepeat => {
                let replicates = self.replicates_of(snapshot, &record).await?;
                let same_kind_by_lot = if transition == Transition::Approve
                    && record.active
                    && record.state == AnalysisState::ToRepeat
                {
                    *lot_guard = Some(self.locks.lock(LockKey::Lot(record.lot_id)).await);
                    self.storage
                        .find_same_kind_by_lot(snapshot, kind, record.lot_id)
                        .await?
                } else {
                    Vec::new()
                };
                let ctx = TransitionContext {
                    validator: self.validator(kind)?,
                    replicates: &replicates,
                    privileged: self.roles.current_actor_has_privileged_role(),
                    now: OffsetDateTime::now_utc(),
                };
                match transition {
                    Transition::Finalize => lifecycle::finalize(&mut record, &ctx)?,
                    Transition::Approve => {
                        lifecycle::approve(&mut record, &ctx, &same_kind_by_lot)?
                    }
                    _ => lifecycle::mark_for_repeat(&mut record, &ctx)?,
                }
            }
        };

        self.store(snapshot, &record).await?;
        Ok((record, notification))
    }
}
