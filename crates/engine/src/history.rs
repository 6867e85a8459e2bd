//! Audit trail of analysis creation and modification.

use std::collections::HashMap;

use async_trait::async_trait;
use seedlab_storage::{AnalysisId, AnalysisRecord, AnalysisState};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("history recorder error: {0}")]
    Recorder(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub actor: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub action: HistoryAction,
    /// Workflow state right after the recorded change.
    pub state: AnalysisState,
}

/// Records who created or changed an analysis, and when.
///
/// The engine calls the recorder inside the unit of work, before the storage
/// commit, so a recorder error aborts the change. The recorder is not part of
/// that unit of work: if the commit itself fails afterwards, an entry already
/// written stays in the trail. Recorders that must never hold such entries
/// should write through the same transaction as the storage backend.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record_creation(
        &self,
        analysis: &AnalysisRecord,
        actor: &str,
    ) -> Result<(), HistoryError>;

    async fn record_modification(
        &self,
        analysis: &AnalysisRecord,
        actor: &str,
    ) -> Result<(), HistoryError>;

    /// Entries for one analysis, most recent first.
    async fn history(&self, analysis_id: AnalysisId) -> Result<Vec<HistoryEntry>, HistoryError>;
}

/// Process-local history, kept in insertion order per analysis.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<HashMap<AnalysisId, Vec<HistoryEntry>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    async fn append(&self, analysis: &AnalysisRecord, actor: &str, action: HistoryAction) {
        let entry = HistoryEntry {
            actor: actor.to_string(),
            timestamp: OffsetDateTime::now_utc(),
            action,
            state: analysis.state,
        };
        self.entries
            .lock()
            .await
            .entry(analysis.id)
            .or_default()
            .push(entry);
    }
}

#[async_trait]
impl HistoryRecorder for MemoryHistory {
    async fn record_creation(
        &self,
        analysis: &AnalysisRecord,
        actor: &str,
    ) -> Result<(), HistoryError> {
        self.append(analysis, actor, HistoryAction::Created).await;
        Ok(())
    }

    async fn record_modification(
        &self,
        analysis: &AnalysisRecord,
        actor: &str,
    ) -> Result<(), HistoryError> {
        self.append(analysis, actor, HistoryAction::Modified).await;
        Ok(())
    }

    async fn history(&self, analysis_id: AnalysisId) -> Result<Vec<HistoryEntry>, HistoryError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&analysis_id)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedlab_storage::{AnalysisDetail, PurityDetail};

    fn analysis(id: AnalysisId, state: AnalysisState) -> AnalysisRecord {
        AnalysisRecord {
            id,
            lot_id: 1,
            state,
            started_at: None,
            finished_at: None,
            active: true,
            comments: None,
            detail: AnalysisDetail::Purity(PurityDetail::default()),
        }
    }

    #[tokio::test]
    async fn history_is_most_recent_first() {
        let history = MemoryHistory::new();
        history
            .record_creation(&analysis(1, AnalysisState::Registered), "ana")
            .await
            .unwrap();
        history
            .record_modification(&analysis(1, AnalysisState::PendingApproval), "dir")
            .await
            .unwrap();

        let entries = history.history(1).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, HistoryAction::Modified);
        assert_eq!(entries[0].actor, "dir");
        assert_eq!(entries[0].state, AnalysisState::PendingApproval);
        assert_eq!(entries[1].action, HistoryAction::Created);
    }

    #[tokio::test]
    async fn unknown_analysis_has_empty_history() {
        let history = MemoryHistory::new();
        assert!(history.history(42).await.unwrap().is_empty());
    }
}
