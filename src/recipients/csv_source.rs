//! CSV-backed recipient source (customer export format).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use super::{RecipientRecord, RecipientSource};
use crate::error::SourceError;

/// Column headers in the customer export.
pub mod columns {
    pub const EMAIL: &str = "Email address";
    pub const NAME: &str = "Customer name";
    pub const PHONE: &str = "Phone number";
    pub const LOCATION: &str = "Location";
}

const BOM: char = '\u{feff}';

/// Reads recipients from a UTF-8 CSV file with a header row.
pub struct CsvRecipientSource {
    path: PathBuf,
}

impl CsvRecipientSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Result<Vec<RecipientRecord>, SourceError> {
        let content =
            fs::read_to_string(&self.path)
                .await
                .map_err(|e| SourceError::Unavailable {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })?;
        parse_recipients(&content)
    }
}

#[async_trait]
impl RecipientSource for CsvRecipientSource {
    async fn list(&self, start_index: usize) -> Result<Vec<RecipientRecord>, SourceError> {
        let mut records = self.read_all().await?;
        records.retain(|r| r.index >= start_index);
        tracing::debug!(
            path = %self.path.display(),
            start_index,
            remaining = records.len(),
            "Loaded recipients"
        );
        Ok(records)
    }

    async fn count(&self) -> Result<usize, SourceError> {
        Ok(self.read_all().await?.len())
    }
}

/// Parse the full CSV text into indexed records.
///
/// A leading byte-order mark is dropped. Short rows are tolerated: missing
/// optional columns read as empty strings, missing required ones are a
/// schema error.
pub fn parse_recipients(content: &str) -> Result<Vec<RecipientRecord>, SourceError> {
    let content = content.strip_prefix(BOM).unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| SourceError::Malformed(format!("Failed to read header row: {e}")))?
        .clone();

    let position = |name: &str| headers.iter().position(|h| h.trim() == name);
    let required = |name: &str| {
        position(name).ok_or_else(|| SourceError::Schema {
            field: name.to_string(),
            location: "from header row".to_string(),
        })
    };

    let email_col = required(columns::EMAIL)?;
    let name_col = required(columns::NAME)?;
    let phone_col = position(columns::PHONE);
    let location_col = position(columns::LOCATION);

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| SourceError::Malformed(format!("Record {index}: {e}")))?;

        let field = |col: usize, name: &str| {
            row.get(col)
                .map(str::to_string)
                .ok_or_else(|| SourceError::Schema {
                    field: name.to_string(),
                    location: format!("in record {index}"),
                })
        };
        let optional = |col: Option<usize>| {
            col.and_then(|c| row.get(c))
                .map(str::to_string)
                .unwrap_or_default()
        };

        records.push(RecipientRecord {
            index,
            email: field(email_col, columns::EMAIL)?,
            display_name: field(name_col, columns::NAME)?,
            raw_phone: optional(phone_col),
            raw_location: optional(location_col),
        });
    }

    Ok(records)
}
