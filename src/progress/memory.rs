//! In-process progress store.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{ProgressState, ProgressStore};
use crate::error::StoreError;

/// Keeps the last saved state in memory. Can be told to fail the next N
/// saves to exercise persistence-failure handling.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<ProgressState>>,
    fail_next: AtomicU32,
    save_count: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state, as if loaded from disk.
    pub fn with_state(state: ProgressState) -> Self {
        Self {
            saved: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// Make the next `n` calls to `save` fail.
    pub fn fail_next_saves(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Last successfully saved state.
    pub async fn snapshot(&self) -> Option<ProgressState> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn load(&self) -> Result<ProgressState, StoreError> {
        Ok(self.saved.lock().await.clone().unwrap_or_default())
    }

    async fn save(&self, state: &mut ProgressState) -> Result<(), StoreError> {
        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StoreError::Persistence {
                path: "memory".into(),
                reason: "injected failure".to_string(),
            });
        }

        state.last_run_time = Some(Utc::now());
        *self.saved.lock().await = Some(state.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
