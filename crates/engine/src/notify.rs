//! Workflow notifications.
//!
//! Dispatch is fire-and-forget: [`SeedLab`](crate::SeedLab) logs a failed
//! `notify` and carries on. A notification never fails or rolls back the
//! operation that produced it.

use std::fmt;

use async_trait::async_trait;
use seedlab_storage::AnalysisId;
use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An analyst finalized; the analysis awaits approval.
    Finalized,
    Approved,
    ToRepeat,
    /// An analyst edited an approved analysis, which needs approval again.
    PendingReapproval,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Finalized => "finalized",
            NotificationKind::Approved => "approved",
            NotificationKind::ToRepeat => "to_repeat",
            NotificationKind::PendingReapproval => "pending_reapproval",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(
        &self,
        event: NotificationKind,
        analysis_id: AnalysisId,
    ) -> Result<(), NotifyError>;
}

/// Keeps every notification in memory, in dispatch order.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(NotificationKind, AnalysisId)>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(NotificationKind, AnalysisId)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(
        &self,
        event: NotificationKind,
        analysis_id: AnalysisId,
    ) -> Result<(), NotifyError> {
        self.sent.lock().await.push((event, analysis_id));
        Ok(())
    }
}

/// Emits each notification as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify(
        &self,
        event: NotificationKind,
        analysis_id: AnalysisId,
    ) -> Result<(), NotifyError> {
        tracing::info!(target: "seedlab::notify", analysis_id, event = %event, "notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_dispatcher_keeps_order() {
        let dispatcher = RecordingDispatcher::new();
        dispatcher
            .notify(NotificationKind::Finalized, 3)
            .await
            .unwrap();
        dispatcher.notify(NotificationKind::Approved, 3).await.unwrap();
        assert_eq!(
            dispatcher.sent().await,
            vec![
                (NotificationKind::Finalized, 3),
                (NotificationKind::Approved, 3)
            ]
        );
    }

    #[test]
    fn kind_display() {
        assert_eq!(
            NotificationKind::PendingReapproval.to_string(),
            "pending_reapproval"
        );
    }
}
