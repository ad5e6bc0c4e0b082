use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use mail_campaign::audit::AuditLog;
use mail_campaign::campaign::{CampaignDeps, run_campaign, send_test_message};
use mail_campaign::config::{CampaignConfig, secs_to_duration};
use mail_campaign::dispatch::{DispatchOutcome, shutdown_channel, spawn_ctrl_c_handler};
use mail_campaign::error::ConfigError;
use mail_campaign::mailer::{MailerConfig, create_mailer};
use mail_campaign::pacing::UniformPacing;
use mail_campaign::progress::JsonFileStore;
use mail_campaign::recipients::CsvRecipientSource;

#[derive(Parser)]
#[command(version, about = "Send a paced, resumable email campaign")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Recipient CSV export (overrides CAMPAIGN_RECIPIENTS)
    #[arg(long)]
    recipients: Option<PathBuf>,

    /// HTML template (overrides CAMPAIGN_TEMPLATE)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Progress file (overrides CAMPAIGN_PROGRESS)
    #[arg(long)]
    progress: Option<PathBuf>,

    /// Audit log file (overrides CAMPAIGN_LOG)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Minimum seconds between sends
    #[arg(long)]
    min_delay: Option<f64>,

    /// Maximum seconds between sends
    #[arg(long)]
    max_delay: Option<f64>,
}

#[derive(Subcommand)]
enum Command {
    /// Run or resume the campaign (default)
    Run,
    /// Send one personalized message without touching campaign progress
    SendTest {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Recipient display name
        #[arg(long, default_value = "")]
        name: String,
    },
}

fn build_config(args: &Args) -> Result<CampaignConfig, ConfigError> {
    let mut config = CampaignConfig::from_env()?;
    if let Some(path) = &args.recipients {
        config.recipients_path = path.clone();
    }
    if let Some(path) = &args.template {
        config.template_path = path.clone();
    }
    if let Some(path) = &args.progress {
        config.progress_path = path.clone();
    }
    if let Some(path) = &args.log {
        config.log_path = path.clone();
    }
    if let Some(secs) = args.min_delay {
        config.min_delay = secs_to_duration("--min-delay", secs)?;
    }
    if let Some(secs) = args.max_delay {
        config.max_delay = secs_to_duration("--max-delay", secs)?;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Audit lines go to stdout; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let audit = AuditLog::new(&config.log_path);

    let mailer_config = match MailerConfig::from_env() {
        Ok(c) => c,
        Err(ConfigError::MissingEnvVar(var)) => {
            audit
                .record(format!("ERROR: {var} environment variable not set!"))
                .await;
            audit
                .record(format!("Please set it with: export {var}='...'"))
                .await;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let mailer = create_mailer(&mailer_config)?;

    match args.command.unwrap_or(Command::Run) {
        Command::SendTest { to, name } => {
            println!("Sending test email to: {to}");
            match send_test_message(&config, mailer.as_ref(), &to, &name).await? {
                DispatchOutcome::Sent { status_code } => {
                    println!("✓ Test email sent successfully! Status: {status_code}");
                    println!("Check your inbox at: {to}");
                }
                DispatchOutcome::Failed(reason) => println!("✗ Failed: {reason}"),
            }
        }
        Command::Run => {
            let deps = CampaignDeps {
                mailer,
                source: Arc::new(CsvRecipientSource::new(&config.recipients_path)),
                store: Arc::new(JsonFileStore::new(&config.progress_path)),
                pacing: Arc::new(UniformPacing::new(config.min_delay, config.max_delay)?),
                audit,
            };

            let (trigger, mut shutdown) = shutdown_channel();
            let ctrl_c = spawn_ctrl_c_handler(trigger);

            let outcome = run_campaign(&config, deps, &mut shutdown).await;
            ctrl_c.abort();
            let outcome = outcome?;

            tracing::info!(
                termination = ?outcome.report.termination,
                attempted = outcome.report.attempted,
                sent = outcome.summary.sent,
                failed = outcome.summary.failed,
                "Campaign run finished"
            );
        }
    }

    Ok(())
}
