//! Recipient dataset access.
//!
//! The dispatcher only sees the [`RecipientSource`] trait: an ordered list of
//! records that can be re-read from a resume offset.

pub mod csv_source;

pub use csv_source::CsvRecipientSource;

use async_trait::async_trait;

use crate::error::SourceError;

/// One addressable target, as read from the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRecord {
    /// Position in the unfiltered dataset. Stable across runs.
    pub index: usize,
    pub email: String,
    pub display_name: String,
    /// Empty when the dataset has no phone for this recipient.
    pub raw_phone: String,
    /// Empty when the dataset has no location for this recipient.
    pub raw_location: String,
}

impl RecipientRecord {
    pub fn new(index: usize, email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            index,
            email: email.into(),
            display_name: display_name.into(),
            raw_phone: String::new(),
            raw_location: String::new(),
        }
    }
}

/// Ordered recipient list, skippable by a resume offset.
#[async_trait]
pub trait RecipientSource: Send + Sync {
    /// Records whose original position is `>= start_index`, in original
    /// order, with their original indices.
    async fn list(&self, start_index: usize) -> Result<Vec<RecipientRecord>, SourceError>;

    /// Total number of records in the dataset.
    async fn count(&self) -> Result<usize, SourceError>;
}

/// In-memory source, for tests and for single-message sends.
pub struct StaticRecipientSource {
    records: Vec<RecipientRecord>,
}

impl StaticRecipientSource {
    /// Build a source from `(email, name)` pairs, indexed in order.
    pub fn from_pairs<I, E, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (E, N)>,
        E: Into<String>,
        N: Into<String>,
    {
        let records = pairs
            .into_iter()
            .enumerate()
            .map(|(i, (email, name))| RecipientRecord::new(i, email, name))
            .collect();
        Self { records }
    }
}

#[async_trait]
impl RecipientSource for StaticRecipientSource {
    async fn list(&self, start_index: usize) -> Result<Vec<RecipientRecord>, SourceError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.index >= start_index)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, SourceError> {
        Ok(self.records.len())
    }
}
