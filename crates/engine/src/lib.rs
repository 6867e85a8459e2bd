//! Seed-testing analysis engine -- tracks analyses of seed lots through an
//! approval workflow and accepts thousand-seed-weight (PMS) replicates.
//!
//! The pure pieces ([`statistics`], [`pms`], [`lifecycle`], [`validator`])
//! compute decisions over records; [`SeedLab`] runs them inside storage
//! snapshots, serialized per analysis, with history and notification side
//! effects.

pub mod config;
pub mod error;
pub mod history;
pub mod lab;
pub mod lifecycle;
pub mod locks;
pub mod notify;
pub mod pms;
pub mod role;
pub mod statistics;
pub mod validator;

pub use config::{ConfigError, LabConfig, LogFormat, LogSettings, PmsPolicy};
pub use error::{LabError, Result};
pub use history::{HistoryAction, HistoryEntry, HistoryError, HistoryRecorder, MemoryHistory};
pub use lab::{AnalysisEdit, ReplicateRequest, SeedLab};
pub use notify::{
    LogDispatcher, NotificationDispatcher, NotificationKind, NotifyError, RecordingDispatcher,
};
pub use pms::Readiness;
pub use role::{Role, RoleAuthority, StaticRoleAuthority};
pub use statistics::{ReplicateStatistics, StatsError};
pub use validator::{CompletenessValidator, Evidence, ValidatorRegistry};
