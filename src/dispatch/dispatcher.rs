//! The dispatcher: one recipient at a time through
//! personalize → send → record → pace.
//!
//! Progress is saved after every attempt and before any delay, so an
//! interruption at any point leaves the progress file consistent with what
//! was actually attempted. A save that failed mid-run is retried once before
//! the run ends. A send cut short by shutdown records nothing and is retried
//! on the next run; a send that already completed is always recorded.

use std::sync::Arc;

use chrono::Utc;

use super::shutdown::Shutdown;
use super::state::DispatchState;
use super::DispatchOutcome;
use crate::audit::AuditLog;
use crate::config::CampaignConfig;
use crate::error::{Error, StoreError};
use crate::mailer::{Mailer, OutgoingEmail, Sender};
use crate::pacing::PacingPolicy;
use crate::progress::{ProgressState, ProgressStore};
use crate::progress::state::NONE_PROCESSED;
use crate::recipients::RecipientRecord;
use crate::template::{Template, first_name};

/// Build the outgoing message for `recipient`: configured sender and
/// subject, template personalized with the first name, click tracking off.
pub fn render_message(
    config: &CampaignConfig,
    template: &Template,
    recipient: &RecipientRecord,
) -> OutgoingEmail {
    OutgoingEmail {
        from: Sender {
            address: config.from_address.clone(),
            name: config.from_name.clone(),
        },
        to_email: recipient.email.clone(),
        to_name: recipient.display_name.clone(),
        subject: config.subject.clone(),
        html_body: template.render(&recipient.display_name),
        tracking_disabled: true,
    }
}

/// Collaborators the dispatcher calls out to.
#[derive(Clone)]
pub struct DispatcherDeps {
    pub mailer: Arc<dyn Mailer>,
    pub store: Arc<dyn ProgressStore>,
    pub pacing: Arc<dyn PacingPolicy>,
    pub audit: AuditLog,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exhausted,
    Interrupted,
}

/// What one run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub termination: Termination,
    /// Attempts recorded during this run.
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Recipient whose send was abandoned by shutdown, if any.
    pub abandoned_index: Option<usize>,
    /// Index still recorded on disk when the final progress could not be
    /// saved. `None` when the store is up to date.
    pub stale_saved_index: Option<i64>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            termination: Termination::Exhausted,
            attempted: 0,
            sent: 0,
            failed: 0,
            abandoned_index: None,
            stale_saved_index: None,
        }
    }

    /// The run found nothing left to send.
    pub fn nothing_to_do(&self) -> bool {
        self.termination == Termination::Exhausted && self.attempted == 0
    }
}

/// Drives the per-recipient state machine.
pub struct Dispatcher {
    config: CampaignConfig,
    template: Template,
    deps: DispatcherDeps,
    state: DispatchState,
    consecutive_persist_failures: u32,
    /// Last index known to be in the store.
    saved_index: i64,
    unsaved: bool,
}

impl Dispatcher {
    pub fn new(config: CampaignConfig, template: Template, deps: DispatcherDeps) -> Self {
        Self {
            config,
            template,
            deps,
            state: DispatchState::Idle,
            consecutive_persist_failures: 0,
            saved_index: NONE_PROCESSED,
            unsaved: false,
        }
    }

    /// Current state-machine position.
    pub fn state(&self) -> DispatchState {
        self.state
    }

    fn enter(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal dispatch transition {} -> {}",
            self.state,
            next
        );
        tracing::trace!(from = %self.state, to = %next, "Dispatch transition");
        self.state = next;
    }

    /// Render the message for one recipient.
    pub fn personalize(&self, recipient: &RecipientRecord) -> OutgoingEmail {
        render_message(&self.config, &self.template, recipient)
    }

    /// Process `recipients` in order, updating and persisting `progress`
    /// after each attempt.
    ///
    /// Per-recipient failures are recorded and never returned. The only
    /// error is repeated failure to persist progress, past the configured
    /// threshold.
    pub async fn run(
        &mut self,
        recipients: Vec<RecipientRecord>,
        progress: &mut ProgressState,
        shutdown: &mut Shutdown,
    ) -> Result<RunReport, Error> {
        self.state = DispatchState::Idle;
        self.saved_index = progress.last_processed_index;
        self.unsaved = false;
        let mut report = RunReport::new();
        let mut queue = recipients.into_iter().peekable();

        loop {
            let Some(recipient) = queue.next() else {
                self.enter(DispatchState::Exhausted);
                break;
            };
            if shutdown.is_triggered() {
                self.enter(DispatchState::Interrupted);
                break;
            }

            self.enter(DispatchState::Personalizing);
            let email = self.personalize(&recipient);

            self.enter(DispatchState::Sending);
            self.deps
                .audit
                .record(format!(
                    "Sending to {} ({})...",
                    recipient.display_name, recipient.email
                ))
                .await;

            let mailer = Arc::clone(&self.deps.mailer);
            // Send first: a finished send is recorded even if shutdown
            // fired in the meantime.
            let result = tokio::select! {
                biased;
                result = mailer.send(&email) => result,
                _ = shutdown.wait() => {
                    self.enter(DispatchState::Interrupted);
                    report.abandoned_index = Some(recipient.index);
                    tracing::info!(index = recipient.index, "Send abandoned by shutdown");
                    break;
                }
            };

            self.enter(DispatchState::Recording);
            let outcome = DispatchOutcome::classify(result);
            self.record(&recipient, &outcome, progress, &mut report).await?;

            if queue.peek().is_none() {
                self.enter(DispatchState::Idle);
                continue;
            }

            self.enter(DispatchState::Pacing);
            let delay = self.deps.pacing.next_delay();
            self.deps
                .audit
                .record(format!(
                    "Waiting {:.2} seconds before next email...",
                    delay.as_secs_f64()
                ))
                .await;
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    self.enter(DispatchState::Interrupted);
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            self.enter(DispatchState::Idle);
        }

        report.termination = match self.state {
            DispatchState::Interrupted => Termination::Interrupted,
            _ => Termination::Exhausted,
        };
        self.flush_unsaved(progress, &mut report).await;
        Ok(report)
    }

    /// Retry the save once if the last attempt's progress never reached
    /// the store.
    async fn flush_unsaved(&mut self, progress: &mut ProgressState, report: &mut RunReport) {
        if !self.unsaved {
            return;
        }
        match self.deps.store.save(progress).await {
            Ok(()) => {
                self.unsaved = false;
                self.saved_index = progress.last_processed_index;
                tracing::info!(index = self.saved_index, "Progress saved on retry");
            }
            Err(e) => {
                tracing::error!(
                    saved_index = self.saved_index,
                    last_processed_index = progress.last_processed_index,
                    error = %e,
                    "Final progress save failed"
                );
                report.stale_saved_index = Some(self.saved_index);
            }
        }
    }

    /// Apply one outcome to `progress` and persist it.
    async fn record(
        &mut self,
        recipient: &RecipientRecord,
        outcome: &DispatchOutcome,
        progress: &mut ProgressState,
        report: &mut RunReport,
    ) -> Result<(), Error> {
        report.attempted += 1;
        match outcome {
            DispatchOutcome::Sent { status_code } => {
                progress.record_sent(recipient.index);
                report.sent += 1;
                tracing::debug!(
                    index = recipient.index,
                    status = status_code,
                    "Recipient sent"
                );
                self.deps
                    .audit
                    .record(format!(
                        "✓ Sent successfully (Total sent: {})",
                        progress.sent_count
                    ))
                    .await;
            }
            DispatchOutcome::Failed(reason) => {
                progress.record_failure(recipient, reason.clone(), Utc::now());
                report.failed += 1;
                tracing::warn!(index = recipient.index, email = %recipient.email, %reason, "Recipient failed");
                self.deps.audit.record(format!("✗ Failed: {reason}")).await;
            }
        }

        match self.deps.store.save(progress).await {
            Ok(()) => {
                self.consecutive_persist_failures = 0;
                self.saved_index = progress.last_processed_index;
                self.unsaved = false;
                Ok(())
            }
            Err(e) => {
                self.unsaved = true;
                self.persist_failed(e, recipient).await
            }
        }
    }

    async fn persist_failed(
        &mut self,
        err: StoreError,
        recipient: &RecipientRecord,
    ) -> Result<(), Error> {
        self.consecutive_persist_failures += 1;
        let limit = self.config.max_consecutive_persist_failures.max(1);
        tracing::error!(
            index = recipient.index,
            consecutive = self.consecutive_persist_failures,
            limit,
            error = %err,
            "Failed to save progress"
        );
        self.deps
            .audit
            .record(format!(
                "WARNING: progress not saved after {} ({}): {err}",
                recipient.email,
                first_name(&recipient.display_name)
            ))
            .await;

        if self.consecutive_persist_failures >= limit {
            self.deps
                .audit
                .record(format!(
                    "ERROR: {limit} consecutive progress writes failed, stopping. Last attempted index: {}",
                    recipient.index
                ))
                .await;
            return Err(err.into());
        }
        Ok(())
    }
}
