mod cache;
mod config;
mod invite;
mod jalali;
mod janitor;
mod mail;
mod notifier;
mod provider;
mod scheduler;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration problems are startup-fatal; nothing is retried here.
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let config = config::Config::load(&config_path)
        .with_context(|| format!("cannot load configuration `{config_path}`"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level)
                .with_context(|| format!("invalid log level `{}`", config.log_level))?,
        )
        .init();
    debug!(?config_path, "configuration loaded");

    // One mail client per smtp section, built once so that a bad auth method
    // or sender address fails before any polling starts.
    let mut mailers = HashMap::new();
    for (name, smtp) in &config.smtp {
        let mailer = mail::Mailer::new(smtp)
            .with_context(|| format!("cannot build mail client for smtp section `{name}`"))?;
        mailers.insert(name.clone(), mailer);
    }

    let cache = cache::OutageCache::new(&config.cache_dir)
        .with_context(|| format!("cannot open cache directory {}", config.cache_dir.display()))?;
    let janitor = janitor::Janitor::new(&config.cache_dir);
    let provider = provider::ProviderClient::new().context("cannot build provider client")?;

    let notifier = Arc::new(notifier::Notifier::new(provider, mailers, cache, &config));

    if !config.use_cron {
        notifier.run(&CancellationToken::new()).await;
        return Ok(());
    }

    scheduler::run(&config, notifier, janitor).await
}
