//! Per-key serialization of engine operations.
//!
//! Every mutation of an analysis reads its whole replicate set, recomputes,
//! and writes back. Two such operations on the same analysis must not
//! interleave, so each holds the analysis guard for its whole unit of work.
//! Operations on different keys never contend.

use std::collections::HashMap;
use std::sync::Arc;

use seedlab_storage::{AnalysisId, LotId};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Analysis(AnalysisId),
    /// Held while checking for a competing valid analysis of a lot.
    /// Always acquired after the analysis guard.
    Lot(LotId),
}

#[derive(Debug, Default)]
pub struct LockTable {
    slots: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Access ends when the guard drops.
    pub async fn lock(&self, key: LockKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            // A slot only referenced by the table is neither held nor awaited.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub async fn active_keys(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}
