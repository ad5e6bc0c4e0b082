//! Durable campaign progress.
//!
//! The progress file is the only source of truth for the resume position.
//! - `state`: `ProgressState` / `FailureRecord` and their invariants
//! - `file_store`: JSON file persistence with atomic replace
//! - `memory`: in-process store for tests and dry runs

pub mod file_store;
pub mod memory;
pub mod state;

pub use file_store::JsonFileStore;
pub use memory::MemoryStore;
pub use state::{FailureRecord, ProgressState};

use async_trait::async_trait;

use crate::error::StoreError;

/// Load/save access to the persisted `ProgressState`.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Persisted state, or a fresh one when nothing has been saved yet.
    /// Unreadable data is `StoreError::Corrupt` and must not be repaired
    /// automatically.
    async fn load(&self) -> Result<ProgressState, StoreError>;

    /// Replace the persisted state. Stamps `last_run_time` on `state`.
    async fn save(&self, state: &mut ProgressState) -> Result<(), StoreError>;

    /// Where the state lives, for operator-facing messages.
    fn location(&self) -> String;
}
