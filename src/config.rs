use std::collections::HashMap;
use std::path::PathBuf;

use config as config_crate;
use serde::Deserialize;

/// Operational configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log filter, e.g. "info" or "barghman=debug".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Cron expression for the notification job (with seconds field).
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// Cron expression for the cache janitor.
    #[serde(default = "default_janitor_schedule")]
    pub janitor_schedule: String,
    /// When false, run the notification job once and exit.
    #[serde(default = "default_use_cron")]
    pub use_cron: bool,
    /// Directory holding one JSON entry per tracked outage.
    pub cache_dir: PathBuf,
    #[serde(default = "default_retention_hours")]
    pub cache_retention_hours: u64,
    /// Pause between bills to throttle outbound calls. Zero disables it.
    #[serde(default)]
    pub wait_secs: u64,
    /// Fetch window relative to "now": [now - lookback, now + lookahead].
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: i64,
    pub accounts: HashMap<String, AccountConfig>,
    pub smtp: HashMap<String, SmtpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub bill_ids: Vec<String>,
    pub auth_token: String,
    pub recipients: Vec<String>,
    /// Name of the `[smtp.*]` section used to deliver this account's mail.
    pub smtp: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Sender address.
    pub mail: String,
    /// Sender display name.
    pub from: String,
    pub username: String,
    pub password: String,
    pub auth_method: AuthMethod,
    /// Accept invalid TLS certificates on STARTTLS.
    #[serde(default)]
    pub skip_tls: bool,
}

/// Closed set of supported SMTP auth mechanisms; anything else fails
/// configuration loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Plain,
    /// CRAM-MD5 challenge-response.
    Md5,
    /// AUTH LOGIN, for servers that only speak the legacy prompt exchange.
    Custom,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let settings = config_crate::Config::builder()
            .add_source(config_crate::File::with_name(path))
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.accounts.is_empty() {
            anyhow::bail!("no accounts configured");
        }
        for (name, account) in &self.accounts {
            if account.bill_ids.is_empty() {
                anyhow::bail!("account `{name}` has no bill ids");
            }
            if account.recipients.is_empty() {
                anyhow::bail!("account `{name}` has no recipients");
            }
            if !self.smtp.contains_key(&account.smtp) {
                anyhow::bail!(
                    "account `{name}` references unknown smtp section `{}`",
                    account.smtp
                );
            }
        }
        if self.cache_retention_hours == 0 {
            anyhow::bail!("cache_retention_hours must be greater than zero");
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_schedule() -> String {
    // Every day at 08:00.
    "0 0 8 * * *".to_string()
}

fn default_janitor_schedule() -> String {
    "0 30 3 * * *".to_string()
}

fn default_use_cron() -> bool {
    true
}

fn default_retention_hours() -> u64 {
    24 * 30
}

fn default_lookback_days() -> i64 {
    1
}

fn default_lookahead_days() -> i64 {
    5
}
