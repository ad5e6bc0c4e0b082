//! Append-only audit log and end-of-run summary.
//!
//! Every line is `[YYYY-MM-DD HH:MM:SS] message` in local time, written to
//! the log file and echoed to stdout for the operator. Writing the log never
//! fails the run.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::progress::ProgressState;

/// Timestamp format of audit lines.
const LINE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Durable, human-readable event trail.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    echo: bool,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            echo: true,
        }
    }

    /// Write to the file only, without echoing to stdout.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped event. Best-effort.
    pub async fn record(&self, event: impl AsRef<str>) {
        let line = format_line(Local::now(), event.as_ref());
        if self.echo {
            println!("{line}");
        }
        if let Err(e) = self.append(&line).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write audit log");
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await
    }
}

fn format_line(at: DateTime<Local>, message: &str) -> String {
    format!("[{}] {message}", at.format(LINE_TIME_FORMAT))
}

/// Counts and timing for one campaign, as of the moment it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignSummary {
    pub sent: u64,
    pub failed: u64,
    pub failures_recorded: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Option<chrono::Duration>,
}

/// Summarize `state`, measuring elapsed time from its start to `now`.
pub fn summarize(state: &ProgressState, now: DateTime<Utc>) -> CampaignSummary {
    CampaignSummary {
        sent: state.sent_count,
        failed: state.failed_count,
        failures_recorded: state.failed_entries.len(),
        started_at: state.start_time,
        elapsed: state.start_time.map(|start| now - start),
    }
}

impl CampaignSummary {
    /// Summary as individual audit lines.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Total sent: {}", self.sent),
            format!("Total failed: {}", self.failed),
        ];
        if let Some(start) = self.started_at {
            lines.push(format!(
                "Start time: {}",
                start.with_timezone(&Local).format(LINE_TIME_FORMAT)
            ));
        }
        if let Some(elapsed) = self.elapsed {
            lines.push(format!("Elapsed: {}", format_elapsed(elapsed)));
        }
        lines
    }
}

impl fmt::Display for CampaignSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join(", "))
    }
}

/// `1h 02m 03s`, `4m 05s` or `6s`.
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
