//! Campaign progress state.
//!
//! Serialized field names match the progress files written by earlier
//! versions of the campaign tooling, so an in-flight campaign can be resumed
//! across the upgrade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recipients::RecipientRecord;

/// Sentinel for "no recipient processed yet".
pub const NONE_PROCESSED: i64 = -1;

/// A recipient whose attempt failed. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub email: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "error")]
    pub error_description: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Durable dispatch state for one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Index of the last recipient whose attempt was recorded.
    pub last_processed_index: i64,
    pub sent_count: u64,
    pub failed_count: u64,
    #[serde(rename = "failed_emails", default)]
    pub failed_entries: Vec<FailureRecord>,
    #[serde(with = "timestamp::option", default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(with = "timestamp::option", default)]
    pub last_run_time: Option<DateTime<Utc>>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            last_processed_index: NONE_PROCESSED,
            sent_count: 0,
            failed_count: 0,
            failed_entries: Vec::new(),
            start_time: None,
            last_run_time: None,
        }
    }
}

impl ProgressState {
    /// Fresh state for a campaign that has not started.
    pub fn new() -> Self {
        Self::default()
    }

    /// First index that has not been attempted.
    ///
    /// An index past the addressable range saturates, so nothing is ever
    /// re-sent; `validate` rejects such states before they get here.
    pub fn resume_offset(&self) -> usize {
        next_index(self.last_processed_index).unwrap_or(usize::MAX)
    }

    /// Stamp the campaign start time if this is the first run.
    pub fn mark_started(&mut self, now: DateTime<Utc>) -> bool {
        if self.start_time.is_none() {
            self.start_time = Some(now);
            true
        } else {
            false
        }
    }

    /// Account a successful send and advance past `index`.
    pub fn record_sent(&mut self, index: usize) {
        self.sent_count += 1;
        self.advance_to(index);
    }

    /// Account a failed attempt and advance past the recipient anyway, so a
    /// resume never retries it automatically.
    pub fn record_failure(
        &mut self,
        recipient: &RecipientRecord,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        self.failed_count += 1;
        self.failed_entries.push(FailureRecord {
            email: recipient.email.clone(),
            display_name: recipient.display_name.clone(),
            error_description: reason.into(),
            timestamp: at,
        });
        self.advance_to(recipient.index);
    }

    /// Check invariants of a loaded state.
    pub fn validate(&self) -> Result<(), String> {
        if self.last_processed_index < NONE_PROCESSED {
            return Err(format!(
                "last_processed_index {} is below {NONE_PROCESSED}",
                self.last_processed_index
            ));
        }
        if next_index(self.last_processed_index).is_none() {
            return Err(format!(
                "last_processed_index {} is out of range",
                self.last_processed_index
            ));
        }
        if self.failed_entries.len() as u64 > self.failed_count {
            return Err(format!(
                "{} failure entries but failed_count is {}",
                self.failed_entries.len(),
                self.failed_count
            ));
        }
        Ok(())
    }

    fn advance_to(&mut self, index: usize) {
        let index = i64::try_from(index).unwrap_or(i64::MAX);
        debug_assert!(
            index > self.last_processed_index,
            "progress must advance monotonically"
        );
        self.last_processed_index = self.last_processed_index.max(index);
    }
}

fn next_index(last: i64) -> Option<usize> {
    last.checked_add(1).and_then(|n| usize::try_from(n).ok())
}

/// Timestamps are written as RFC 3339. Older progress files carry naive
/// local-time ISO strings; those are read as local time.
pub(crate) mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| format!("invalid timestamp '{raw}': {e}"))?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| format!("timestamp '{raw}' does not exist in local time"))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| super::parse(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
