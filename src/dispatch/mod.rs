//! Sequential, resumable dispatch.
//!
//! Core components:
//! - `state`: per-recipient state machine (Idle → … → Exhausted/Interrupted)
//! - `shutdown`: cooperative cancellation signal
//! - `dispatcher`: drives recipients through the state machine

pub mod dispatcher;
pub mod shutdown;
pub mod state;

pub use dispatcher::{Dispatcher, DispatcherDeps, RunReport, Termination, render_message};
pub use shutdown::{Shutdown, ShutdownTrigger, shutdown_channel, spawn_ctrl_c_handler};
pub use state::DispatchState;

use crate::error::ProviderError;
use crate::mailer::ProviderResponse;

/// Result of one send attempt. Consumed immediately by the Recording step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { status_code: u16 },
    Failed(String),
}

impl DispatchOutcome {
    /// Classify the provider's answer: 2xx is sent, anything else failed
    /// with the status (and provider detail) or the error description.
    pub fn classify(result: Result<ProviderResponse, ProviderError>) -> Self {
        match result {
            Ok(resp) if resp.is_accepted() => Self::Sent {
                status_code: resp.status_code,
            },
            Ok(resp) => {
                let mut reason = format!("Status code: {}", resp.status_code);
                if let Some(detail) = resp.detail {
                    reason.push_str(" - ");
                    reason.push_str(detail.trim());
                }
                Self::Failed(reason)
            }
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}
