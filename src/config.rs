//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default subject line for campaign messages.
pub const DEFAULT_SUBJECT: &str = "PROMOCIÓN ESPECIAL - $200 de descuento 🕶️";

/// Campaign configuration.
///
/// Built once at startup and handed to the dispatcher; nothing reads
/// configuration from globals after that.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    /// Sender address on every message.
    pub from_address: String,
    /// Display name paired with `from_address`.
    pub from_name: String,
    /// Fixed subject line.
    pub subject: String,
    /// CSV recipient export.
    pub recipients_path: PathBuf,
    /// HTML template containing the name placeholder.
    pub template_path: PathBuf,
    /// JSON progress file (resume state).
    pub progress_path: PathBuf,
    /// Append-only audit log.
    pub log_path: PathBuf,
    /// Lower bound of the inter-send delay.
    pub min_delay: Duration,
    /// Upper bound of the inter-send delay.
    pub max_delay: Duration,
    /// Consecutive failed progress writes tolerated before the run stops.
    pub max_consecutive_persist_failures: u32,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            from_address: "sales@cxsunglassesmx.com".to_string(),
            from_name: "CX Sunglasses".to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
            recipients_path: PathBuf::from("customers.csv"),
            template_path: PathBuf::from("email_template.html"),
            progress_path: PathBuf::from("email_campaign_progress.json"),
            log_path: PathBuf::from("email_campaign_log.txt"),
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
            max_consecutive_persist_failures: 5,
        }
    }
}

impl CampaignConfig {
    /// Build config from `CAMPAIGN_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let min_delay = env_parse::<f64>("CAMPAIGN_MIN_DELAY_SECS")?
            .map(|s| secs_to_duration("CAMPAIGN_MIN_DELAY_SECS", s))
            .transpose()?
            .unwrap_or(defaults.min_delay);
        let max_delay = env_parse::<f64>("CAMPAIGN_MAX_DELAY_SECS")?
            .map(|s| secs_to_duration("CAMPAIGN_MAX_DELAY_SECS", s))
            .transpose()?
            .unwrap_or(defaults.max_delay);

        let config = Self {
            from_address: env_string("CAMPAIGN_FROM_ADDRESS").unwrap_or(defaults.from_address),
            from_name: env_string("CAMPAIGN_FROM_NAME").unwrap_or(defaults.from_name),
            subject: env_string("CAMPAIGN_SUBJECT").unwrap_or(defaults.subject),
            recipients_path: env_string("CAMPAIGN_RECIPIENTS")
                .map(PathBuf::from)
                .unwrap_or(defaults.recipients_path),
            template_path: env_string("CAMPAIGN_TEMPLATE")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_path),
            progress_path: env_string("CAMPAIGN_PROGRESS")
                .map(PathBuf::from)
                .unwrap_or(defaults.progress_path),
            log_path: env_string("CAMPAIGN_LOG")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_path),
            min_delay,
            max_delay,
            max_consecutive_persist_failures: env_parse("CAMPAIGN_MAX_PERSIST_FAILURES")?
                .unwrap_or(defaults.max_consecutive_persist_failures),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay > self.max_delay {
            return Err(ConfigError::InvalidValue {
                key: "min_delay".to_string(),
                message: format!(
                    "{:?} is greater than max_delay {:?}",
                    self.min_delay, self.max_delay
                ),
            });
        }
        if self.from_address.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "from_address".to_string(),
                hint: "Set CAMPAIGN_FROM_ADDRESS".to_string(),
            });
        }
        Ok(())
    }
}

/// Read a non-empty environment variable.
pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an environment variable. Unset is `Ok(None)`; set but
/// unparseable is an error rather than a silent default.
pub(crate) fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
    }
}

/// Convert fractional seconds, rejecting negative and non-finite values.
pub fn secs_to_duration(key: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
