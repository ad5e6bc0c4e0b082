//! HTML message template and per-recipient personalization.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::TemplateError;

/// Token replaced with the recipient's first name.
pub const NAME_PLACEHOLDER: &str = "{{CUSTOMER_NAME}}";

/// Greeting used when a recipient has no name on file.
pub const DEFAULT_FIRST_NAME: &str = "amigo";

/// A loaded HTML template.
#[derive(Debug, Clone)]
pub struct Template {
    html: String,
}

impl Template {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    /// Read the template from disk.
    pub async fn load(path: &Path) -> Result<Self, TemplateError> {
        let html = fs::read_to_string(path)
            .await
            .map_err(|source| TemplateError::Unavailable {
                path: PathBuf::from(path),
                source,
            })?;
        if !html.contains(NAME_PLACEHOLDER) {
            tracing::warn!(
                path = %path.display(),
                "Template has no {NAME_PLACEHOLDER} placeholder; messages will not be personalized"
            );
        }
        Ok(Self { html })
    }

    /// Render the template for one recipient.
    pub fn render(&self, display_name: &str) -> String {
        personalize(&self.html, display_name)
    }
}

/// First whitespace-delimited token of `display_name`, or the default
/// greeting when there is none.
pub fn first_name(display_name: &str) -> &str {
    display_name
        .split_whitespace()
        .next()
        .unwrap_or(DEFAULT_FIRST_NAME)
}

/// Substitute the recipient's first name for every placeholder occurrence.
pub fn personalize(html: &str, display_name: &str) -> String {
    html.replace(NAME_PLACEHOLDER, first_name(display_name))
}
