//! One campaign run: load state, pick up after the resume offset, dispatch,
//! report.

use std::sync::Arc;

use chrono::{Local, Utc};

use crate::audit::{AuditLog, CampaignSummary, format_elapsed, summarize};
use crate::config::CampaignConfig;
use crate::dispatch::{
    DispatchOutcome, Dispatcher, DispatcherDeps, RunReport, Shutdown, Termination, render_message,
};
use crate::error::Result;
use crate::mailer::Mailer;
use crate::pacing::PacingPolicy;
use crate::progress::{ProgressState, ProgressStore};
use crate::recipients::{RecipientRecord, RecipientSource};
use crate::template::{Template, first_name};

const RULE_WIDTH: usize = 60;

/// Failures listed individually in the completion report.
const MAX_LISTED_FAILURES: usize = 10;

/// Everything a campaign run needs besides configuration.
#[derive(Clone)]
pub struct CampaignDeps {
    pub mailer: Arc<dyn Mailer>,
    pub source: Arc<dyn RecipientSource>,
    pub store: Arc<dyn ProgressStore>,
    pub pacing: Arc<dyn PacingPolicy>,
    pub audit: AuditLog,
}

/// Result of a completed or interrupted run.
#[derive(Debug, Clone)]
pub struct CampaignOutcome {
    pub report: RunReport,
    pub summary: CampaignSummary,
    pub state: ProgressState,
}

/// Run (or resume) the campaign described by `config`.
///
/// Configuration, source and corrupt-state errors are returned before any
/// message is sent.
pub async fn run_campaign(
    config: &CampaignConfig,
    deps: CampaignDeps,
    shutdown: &mut Shutdown,
) -> Result<CampaignOutcome> {
    let audit = deps.audit.clone();

    audit.record("Loading HTML template...").await;
    let template = Template::load(&config.template_path).await?;

    let mut state = deps.store.load().await?;
    if state.mark_started(Utc::now()) {
        audit.record("Starting new email campaign...").await;
    } else {
        audit
            .record(format!(
                "Resuming campaign from index {}",
                state.resume_offset()
            ))
            .await;
        audit
            .record(format!(
                "Previous stats - Sent: {}, Failed: {}",
                state.sent_count, state.failed_count
            ))
            .await;
    }

    let offset = state.resume_offset();
    let total = deps.source.count().await?;
    let recipients = deps.source.list(offset).await?;
    audit
        .record(format!("Found {} customers to process", recipients.len()))
        .await;
    tracing::info!(offset, total, remaining = recipients.len(), "Campaign batch loaded");

    let dispatcher_deps = DispatcherDeps {
        mailer: Arc::clone(&deps.mailer),
        store: Arc::clone(&deps.store),
        pacing: Arc::clone(&deps.pacing),
        audit: audit.clone(),
    };
    let mut dispatcher = Dispatcher::new(config.clone(), template, dispatcher_deps);
    let report = dispatcher.run(recipients, &mut state, shutdown).await?;

    let summary = summarize(&state, Utc::now());
    report_run(&audit, &report, &summary, &state, &deps.store.location()).await;

    Ok(CampaignOutcome {
        report,
        summary,
        state,
    })
}

async fn report_run(
    audit: &AuditLog,
    report: &RunReport,
    summary: &CampaignSummary,
    state: &ProgressState,
    progress_location: &str,
) {
    if report.nothing_to_do() {
        audit
            .record("Campaign complete! No more customers to process.")
            .await;
        report_failures(audit, state, progress_location).await;
        return;
    }

    match report.termination {
        Termination::Interrupted => {
            match report.stale_saved_index {
                None => {
                    audit
                        .record("Campaign interrupted by user. Progress saved.")
                        .await
                }
                Some(index) => {
                    audit
                        .record(format!(
                            "Campaign interrupted by user. WARNING: progress could not be saved; \
                             {progress_location} still records index {index}."
                        ))
                        .await
                }
            }
            if let Some(index) = report.abandoned_index {
                audit
                    .record(format!(
                        "Send to recipient #{index} did not complete; it will be retried on resume."
                    ))
                    .await;
            }
            audit
                .record(format!(
                    "Sent: {}, Failed: {}",
                    summary.sent, summary.failed
                ))
                .await;
            if let Some(elapsed) = summary.elapsed {
                audit
                    .record(format!("Elapsed: {}", format_elapsed(elapsed)))
                    .await;
            }
        }
        Termination::Exhausted => {
            let rule = "=".repeat(RULE_WIDTH);
            audit.record(&rule).await;
            audit.record("CAMPAIGN COMPLETE!").await;
            for line in summary.lines() {
                audit.record(line).await;
            }
            audit
                .record(format!(
                    "End time: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                ))
                .await;
            audit.record(&rule).await;

            if let Some(index) = report.stale_saved_index {
                audit
                    .record(format!(
                        "WARNING: final progress could not be saved; {progress_location} still records index {index}."
                    ))
                    .await;
            }
            report_failures(audit, state, progress_location).await;
        }
    }
}

async fn report_failures(audit: &AuditLog, state: &ProgressState, progress_location: &str) {
    if state.failed_entries.is_empty() {
        return;
    }
    audit
        .record(format!(
            "{} failed emails saved in {progress_location}",
            state.failed_entries.len()
        ))
        .await;
    for failure in state.failed_entries.iter().take(MAX_LISTED_FAILURES) {
        audit
            .record(format!(
                "  {} ({}): {}",
                failure.email, failure.display_name, failure.error_description
            ))
            .await;
    }
}

/// Send one personalized message outside the campaign, leaving progress
/// untouched. Used to check template and credentials before a real run.
pub async fn send_test_message(
    config: &CampaignConfig,
    mailer: &dyn Mailer,
    to_email: &str,
    to_name: &str,
) -> Result<DispatchOutcome> {
    let template = Template::load(&config.template_path).await?;
    let recipient = RecipientRecord::new(0, to_email, to_name);
    let email = render_message(config, &template, &recipient);

    tracing::info!(
        to = to_email,
        first_name = first_name(to_name),
        provider = mailer.name(),
        "Sending test message"
    );
    Ok(DispatchOutcome::classify(mailer.send(&email).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::dispatch::shutdown_channel;
    use crate::error::{Error, ProviderError};
    use crate::mailer::{OutgoingEmail, ProviderResponse};
    use crate::pacing::NoPacing;
    use crate::progress::MemoryStore;
    use crate::recipients::StaticRecipientSource;

    /// Accepts everything with a fixed status and remembers recipients.
    struct FixedMailer {
        status: u16,
        sent_to: Mutex<Vec<String>>,
    }

    impl FixedMailer {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                sent_to: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Mailer for FixedMailer {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn send(&self, email: &OutgoingEmail) -> std::result::Result<ProviderResponse, ProviderError> {
            self.sent_to.lock().unwrap().push(email.to_email.clone());
            Ok(ProviderResponse::new(self.status))
        }
    }

    fn config_in(dir: &TempDir) -> CampaignConfig {
        let template_path = dir.path().join("template.html");
        std::fs::write(&template_path, "<p>Hola {{CUSTOMER_NAME}}</p>").unwrap();
        CampaignConfig {
            template_path,
            progress_path: dir.path().join("progress.json"),
            log_path: dir.path().join("audit.log"),
            ..CampaignConfig::default()
        }
    }

    fn deps(mailer: Arc<FixedMailer>, store: Arc<MemoryStore>, dir: &TempDir) -> CampaignDeps {
        deps_for(
            &[
                ("a@example.com", "Ana López"),
                ("b@example.com", "Beto"),
                ("c@example.com", ""),
            ],
            mailer,
            store,
            dir,
        )
    }

    fn deps_for(
        pairs: &[(&str, &str)],
        mailer: Arc<FixedMailer>,
        store: Arc<MemoryStore>,
        dir: &TempDir,
    ) -> CampaignDeps {
        CampaignDeps {
            mailer,
            source: Arc::new(StaticRecipientSource::from_pairs(pairs.iter().copied())),
            store,
            pacing: Arc::new(NoPacing),
            audit: AuditLog::new(dir.path().join("audit.log")).quiet(),
        }
    }

    #[tokio::test]
    async fn resumes_after_saved_offset() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut saved = ProgressState::new();
        saved.record_sent(0);
        let store = Arc::new(MemoryStore::with_state(saved));
        let mailer = FixedMailer::new(202);

        let outcome = run_campaign(
            &config,
            deps(mailer.clone(), store.clone(), &dir),
            &mut Shutdown::never(),
        )
        .await
        .unwrap();

        assert_eq!(
            *mailer.sent_to.lock().unwrap(),
            vec!["b@example.com".to_string(), "c@example.com".to_string()]
        );
        assert_eq!(outcome.summary.sent, 3);
        assert_eq!(outcome.report.attempted, 2);
        assert_eq!(store.snapshot().await.unwrap().last_processed_index, 2);

        let log = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert!(log.contains("Resuming campaign from index 1"));
        assert!(log.contains("CAMPAIGN COMPLETE!"));
    }

    #[tokio::test]
    async fn shutdown_before_start_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let store = Arc::new(MemoryStore::new());
        let mailer = FixedMailer::new(202);
        let (trigger, mut shutdown) = shutdown_channel();
        trigger.trigger();

        let outcome = run_campaign(&config, deps(mailer.clone(), store.clone(), &dir), &mut shutdown)
            .await
            .unwrap();

        assert_eq!(outcome.report.termination, Termination::Interrupted);
        assert!(mailer.sent_to.lock().unwrap().is_empty());
        assert_eq!(store.save_count(), 0);

        let log = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert!(log.contains("Progress saved."));
        assert!(log.contains("Elapsed: "));
    }

    #[tokio::test]
    async fn failed_save_of_last_recipient_does_not_cause_resend() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let store = Arc::new(MemoryStore::new());
        store.fail_next_saves(1);
        let mailer = FixedMailer::new(202);
        let only = [("a@example.com", "Ana")];

        for _ in 0..2 {
            run_campaign(
                &config,
                deps_for(&only, mailer.clone(), store.clone(), &dir),
                &mut Shutdown::never(),
            )
            .await
            .unwrap();
        }

        assert_eq!(*mailer.sent_to.lock().unwrap(), vec!["a@example.com".to_string()]);
        assert_eq!(store.snapshot().await.unwrap().last_processed_index, 0);
    }

    #[tokio::test]
    async fn unsaved_final_progress_is_reported() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let store = Arc::new(MemoryStore::new());
        store.fail_next_saves(2);

        let outcome = run_campaign(
            &config,
            deps_for(&[("a@example.com", "Ana")], FixedMailer::new(202), store, &dir),
            &mut Shutdown::never(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.report.stale_saved_index, Some(-1));

        let log = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert!(log.contains("final progress could not be saved; memory still records index -1"));
    }

    #[tokio::test]
    async fn nothing_to_do_still_lists_failures() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut saved = ProgressState::new();
        saved.mark_started(Utc::now());
        saved.record_sent(0);
        saved.record_sent(1);
        saved.record_failure(
            &RecipientRecord::new(2, "c@example.com", "Carla"),
            "Status code: 400",
            Utc::now(),
        );
        let store = Arc::new(MemoryStore::with_state(saved));
        let mailer = FixedMailer::new(202);

        let outcome = run_campaign(&config, deps(mailer.clone(), store, &dir), &mut Shutdown::never())
            .await
            .unwrap();
        assert!(outcome.report.nothing_to_do());
        assert!(mailer.sent_to.lock().unwrap().is_empty());

        let log = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert!(log.contains("No more customers to process"));
        assert!(log.contains("1 failed emails saved in memory"));
        assert!(log.contains("c@example.com (Carla): Status code: 400"));
    }

    #[tokio::test]
    async fn failures_are_listed_in_report() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let store = Arc::new(MemoryStore::new());

        let outcome = run_campaign(
            &config,
            deps(FixedMailer::new(500), store, &dir),
            &mut Shutdown::never(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.summary.failed, 3);
        assert_eq!(outcome.state.failed_entries.len(), 3);

        let log = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert!(log.contains("3 failed emails saved in memory"));
        assert!(log.contains("a@example.com (Ana López): Status code: 500"));
    }

    #[tokio::test]
    async fn test_message_leaves_progress_alone() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mailer = FixedMailer::new(202);

        let outcome = send_test_message(&config, mailer.as_ref(), "me@example.com", "Carla Ruiz")
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent { status_code: 202 });
        assert_eq!(*mailer.sent_to.lock().unwrap(), vec!["me@example.com".to_string()]);
        assert!(!config.progress_path.exists());
    }

    #[tokio::test]
    async fn test_message_needs_template() {
        let dir = TempDir::new().unwrap();
        let config = CampaignConfig {
            template_path: dir.path().join("missing.html"),
            ..CampaignConfig::default()
        };
        let result = send_test_message(&config, FixedMailer::new(202).as_ref(), "me@example.com", "").await;
        assert!(matches!(result, Err(Error::Template(_))));
    }
}
