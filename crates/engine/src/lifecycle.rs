//! Analysis approval workflow.
//!
//! ```text
//! REGISTERED -> IN_PROGRESS -> PENDING_APPROVAL -> APPROVED
//!                          \_________________/        |
//!                                   |                 v
//!                                   +-----------> TO_REPEAT -> APPROVED
//! ```
//!
//! Transitions mutate an [`AnalysisRecord`] in place and report the
//! notification the caller should emit. Every guard runs before the first
//! mutation, so a rejected transition leaves the record untouched. The
//! `active` flag is orthogonal: inactive analyses refuse every transition
//! except [`reactivate`].

use seedlab_storage::{AnalysisRecord, AnalysisState, ReplicateRecord};
use time::OffsetDateTime;

use crate::error::{LabError, Result};
use crate::notify::NotificationKind;
use crate::validator::{CompletenessValidator, Evidence};

/// Inputs shared by the evidence-checked transitions.
pub struct TransitionContext<'a> {
    pub validator: &'a dyn CompletenessValidator,
    pub replicates: &'a [ReplicateRecord],
    /// Whether the acting user holds a privileged role.
    pub privileged: bool,
    pub now: OffsetDateTime,
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

fn require_evidence(record: &AnalysisRecord, ctx: &TransitionContext<'_>) -> Result<()> {
    ctx.validator
        .check(&Evidence {
            analysis: record,
            replicates: ctx.replicates,
        })
        .map_err(|reason| LabError::IncompleteEvidence {
            analysis_id: record.id,
            reason,
        })
}

fn enter(record: &mut AnalysisRecord, state: AnalysisState) {
    tracing::info!(
        analysis_id = record.id,
        from = %record.state,
        to = %state,
        "analysis transitioned"
    );
    record.state = state;
}

/// Close data entry. Analysts send the analysis to approval, privileged
/// users approve it directly.
pub fn finalize(
    record: &mut AnalysisRecord,
    ctx: &TransitionContext<'_>,
) -> Result<Option<NotificationKind>> {
    ensure_active(record)?;
    if matches!(
        record.state,
        AnalysisState::Approved | AnalysisState::ToRepeat
    ) {
        return Err(LabError::AlreadyFinalized {
            analysis_id: record.id,
            state: record.state,
        });
    }
    require_evidence(record, ctx)?;

    record.finished_at = Some(ctx.now);
    if ctx.privileged {
        enter(record, AnalysisState::Approved);
        Ok(None)
    } else {
        enter(record, AnalysisState::PendingApproval);
        Ok(Some(NotificationKind::Finalized))
    }
}

/// Approve a pending or repeated analysis.
///
/// `same_kind_by_lot` lists the analyses of the same kind on the same lot;
/// the record itself may appear in it and is ignored. Approving out of
/// `TO_REPEAT` is refused while another active analysis of the kind stands
/// outside `TO_REPEAT`.
pub fn approve(
    record: &mut AnalysisRecord,
    ctx: &TransitionContext<'_>,
    same_kind_by_lot: &[AnalysisRecord],
) -> Result<Option<NotificationKind>> {
    ensure_active(record)?;
    match record.state {
        AnalysisState::PendingApproval => {}
        AnalysisState::ToRepeat => {
            if let Some(existing) = same_kind_by_lot.iter().find(|other| {
                other.id != record.id && other.active && other.state != AnalysisState::ToRepeat
            }) {
                return Err(LabError::ConflictingValidAnalysis {
                    analysis_id: record.id,
                    lot_id: record.lot_id,
                    kind: record.kind(),
                    existing_id: existing.id,
                });
            }
        }
        state => {
            return Err(LabError::InvalidState {
                analysis_id: record.id,
                state,
                operation: "approve",
            })
        }
    }
    require_evidence(record, ctx)?;

    if record.finished_at.is_none() {
        record.finished_at = Some(ctx.now);
    }
    enter(record, AnalysisState::Approved);
    Ok(Some(NotificationKind::Approved))
}

/// Send the analysis back for repetition. Allowed from any state.
pub fn mark_for_repeat(
    record: &mut AnalysisRecord,
    ctx: &TransitionContext<'_>,
) -> Result<Option<NotificationKind>> {
    ensure_active(record)?;
    require_evidence(record, ctx)?;
    enter(record, AnalysisState::ToRepeat);
    Ok(Some(NotificationKind::ToRepeat))
}

/// Demote an approved analysis edited by an analyst back to approval.
pub fn edit_after_approval(
    record: &mut AnalysisRecord,
    privileged: bool,
) -> Option<NotificationKind> {
    if record.state != AnalysisState::Approved || privileged {
        return None;
    }
    enter(record, AnalysisState::PendingApproval);
    Some(NotificationKind::PendingReapproval)
}

pub fn deactivate(record: &mut AnalysisRecord) -> Result<()> {
    ensure_active(record)?;
    record.active = false;
    tracing::info!(analysis_id = record.id, "analysis deactivated");
    Ok(())
}

pub fn reactivate(record: &mut AnalysisRecord) -> Result<()> {
    if record.active {
        return Err(LabError::AlreadyActive {
            analysis_id: record.id,
        });
    }
    record.active = true;
    tracing::info!(analysis_id = record.id, "analysis reactivated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedlab_storage::{AnalysisDetail, AnalysisKind, PurityDetail};

    struct Always(std::result::Result<(), String>);

    impl CompletenessValidator for Always {
        fn kind(&self) -> AnalysisKind {
            AnalysisKind::Purity
        }

        fn check(&self, _: &Evidence<'_>) -> std::result::Result<(), String> {
            self.0.clone()
        }
    }

    const COMPLETE: Always = Always(Ok(()));

    fn record(id: i64, state: AnalysisState) -> AnalysisRecord {
        AnalysisRecord {
            id,
            lot_id: 10,
            state,
            started_at: Some(OffsetDateTime::UNIX_EPOCH),
            finished_at: None,
            active: true,
            comments: None,
            detail: AnalysisDetail::Purity(PurityDetail::default()),
        }
    }

    fn ctx(validator: &dyn CompletenessValidator, privileged: bool) -> TransitionContext<'_> {
        TransitionContext {
            validator,
            replicates: &[],
            privileged,
            now: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn analyst_finalize_awaits_approval() {
        let mut rec = record(1, AnalysisState::InProgress);
        let note = finalize(&mut rec, &ctx(&COMPLETE, false)).unwrap();
        assert_eq!(rec.state, AnalysisState::PendingApproval);
        assert_eq!(rec.finished_at, Some(OffsetDateTime::UNIX_EPOCH));
        assert_eq!(note, Some(NotificationKind::Finalized));
    }

    #[test]
    fn privileged_finalize_approves_silently() {
        let mut rec = record(1, AnalysisState::Registered);
        let note = finalize(&mut rec, &ctx(&COMPLETE, true)).unwrap();
        assert_eq!(rec.state, AnalysisState::Approved);
        assert_eq!(note, None);
    }

    #[test]
    fn finalize_guards() {
        let mut approved = record(1, AnalysisState::Approved);
        assert!(matches!(
            finalize(&mut approved, &ctx(&COMPLETE, false)),
            Err(LabError::AlreadyFinalized { .. })
        ));

        let mut inactive = record(2, AnalysisState::InProgress);
        inactive.active = false;
        assert_eq!(
            finalize(&mut inactive, &ctx(&COMPLETE, false)),
            Err(LabError::InactiveAnalysis { analysis_id: 2 })
        );

        let incomplete = Always(Err("missing weights".to_string()));
        let mut rec = record(3, AnalysisState::InProgress);
        let err = finalize(&mut rec, &ctx(&incomplete, false)).unwrap_err();
        assert_eq!(
            err,
            LabError::IncompleteEvidence {
                analysis_id: 3,
                reason: "missing weights".to_string()
            }
        );
        assert_eq!(rec.state, AnalysisState::InProgress);
        assert_eq!(rec.finished_at, None);
    }

    #[test]
    fn approve_requires_pending_or_repeat() {
        let mut rec = record(1, AnalysisState::InProgress);
        assert!(matches!(
            approve(&mut rec, &ctx(&COMPLETE, true), &[]),
            Err(LabError::InvalidState {
                operation: "approve",
                ..
            })
        ));

        let mut pending = record(1, AnalysisState::PendingApproval);
        pending.finished_at = Some(OffsetDateTime::UNIX_EPOCH + time::Duration::days(1));
        let note = approve(&mut pending, &ctx(&COMPLETE, true), &[]).unwrap();
        assert_eq!(note, Some(NotificationKind::Approved));
        assert_eq!(pending.state, AnalysisState::Approved);
        // an existing finish time is kept
        assert_eq!(
            pending.finished_at,
            Some(OffsetDateTime::UNIX_EPOCH + time::Duration::days(1))
        );
    }

    #[test]
    fn approve_from_repeat_checks_for_standing_analysis() {
        let mut repeated = record(1, AnalysisState::ToRepeat);
        let standing = record(2, AnalysisState::PendingApproval);
        let siblings = [repeated.clone(), standing.clone()];
        let err = approve(&mut repeated, &ctx(&COMPLETE, true), &siblings).unwrap_err();
        assert_eq!(
            err,
            LabError::ConflictingValidAnalysis {
                analysis_id: 1,
                lot_id: 10,
                kind: AnalysisKind::Purity,
                existing_id: 2
            }
        );

        let mut retired = standing;
        retired.active = false;
        let also_repeated = record(3, AnalysisState::ToRepeat);
        approve(
            &mut repeated,
            &ctx(&COMPLETE, true),
            &[retired, also_repeated],
        )
        .unwrap();
        assert_eq!(repeated.state, AnalysisState::Approved);
        assert_eq!(repeated.finished_at, Some(OffsetDateTime::UNIX_EPOCH));
    }

    #[test]
    fn repeat_from_any_state() {
        for state in [
            AnalysisState::Registered,
            AnalysisState::PendingApproval,
            AnalysisState::Approved,
        ] {
            let mut rec = record(1, state);
            let note = mark_for_repeat(&mut rec, &ctx(&COMPLETE, false)).unwrap();
            assert_eq!(rec.state, AnalysisState::ToRepeat);
            assert_eq!(note, Some(NotificationKind::ToRepeat));
        }
    }

    #[test]
    fn analyst_edit_demotes_approved() {
        let mut rec = record(1, AnalysisState::Approved);
        assert_eq!(edit_after_approval(&mut rec, true), None);
        assert_eq!(rec.state, AnalysisState::Approved);
        assert_eq!(
            edit_after_approval(&mut rec, false),
            Some(NotificationKind::PendingReapproval)
        );
        assert_eq!(rec.state, AnalysisState::PendingApproval);
        assert_eq!(edit_after_approval(&mut rec, false), None);
    }

    #[test]
    fn active_flag_toggles() {
        let mut rec = record(1, AnalysisState::InProgress);
        assert_eq!(
            reactivate(&mut rec),
            Err(LabError::AlreadyActive { analysis_id: 1 })
        );
        deactivate(&mut rec).unwrap();
        assert!(!rec.active);
        assert!(matches!(
            deactivate(&mut rec),
            Err(LabError::InactiveAnalysis { .. })
        ));
        reactivate(&mut rec).unwrap();
        assert!(rec.active);
        assert_eq!(rec.state, AnalysisState::InProgress);
    }
}
