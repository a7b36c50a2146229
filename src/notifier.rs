use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Asia::Tehran;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::{CacheKey, OutageCache};
use crate::config::{AccountConfig, Config};
use crate::mail::MailSender;
use crate::provider::OutageProvider;
use crate::types::CachedOutage;

/// Drives one notification cycle: fetch, reconcile against the cache, send,
/// persist. Accounts and their records are processed sequentially; a failure
/// in one record or account never aborts the others.
pub struct Notifier<P, M> {
    provider: P,
    mailers: HashMap<String, M>,
    cache: OutageCache,
    accounts: HashMap<String, AccountConfig>,
    wait: Duration,
    lookback: chrono::Duration,
    lookahead: chrono::Duration,
}

impl<P, M> Notifier<P, M>
where
    P: OutageProvider + Send + Sync,
    M: MailSender + Send + Sync,
{
    pub fn new(provider: P, mailers: HashMap<String, M>, cache: OutageCache, config: &Config) -> Self {
        Self {
            provider,
            mailers,
            cache,
            accounts: config.accounts.clone(),
            wait: Duration::from_secs(config.wait_secs),
            lookback: chrono::Duration::days(config.lookback_days),
            lookahead: chrono::Duration::days(config.lookahead_days),
        }
    }

    /// One scheduled run. The cancellation token is honored at every network
    /// boundary; a cache write that follows a completed send is not
    /// cancellable, so a delivered invite is never re-sent because of
    /// shutdown timing.
    pub async fn run(&self, cancel: &CancellationToken) {
        debug!("notification job started");

        for (name, account) in &self.accounts {
            let Some(mailer) = self.mailers.get(&account.smtp) else {
                error!(account = %name, smtp = %account.smtp, "no mail client for account");
                continue;
            };

            for bill_id in &account.bill_ids {
                // 1. Fetch the current outage list for this bill. A fetch
                // failure skips the whole bill for this cycle.
                let from = Utc::now() - self.lookback;
                let to = Utc::now() + self.lookahead;
                let records = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("notification job cancelled");
                        return;
                    }
                    result = self
                        .provider
                        .planned_blackouts(&account.auth_token, bill_id, from, to) =>
                    {
                        match result {
                            Ok(records) => records,
                            Err(e) => {
                                error!(account = %name, bill_id, error = %e, "outage fetch failed");
                                continue;
                            }
                        }
                    }
                };

                for record in &records {
                    // 2. Parse the provider window; a bad record never
                    // aborts its siblings.
                    let (start, end) = match record.parse_window() {
                        Ok(window) => window,
                        Err(e) => {
                            error!(
                                bill_id,
                                outage_number = record.outage_number,
                                error = %e,
                                "unparseable outage record"
                            );
                            continue;
                        }
                    };

                    let key = CacheKey::new(
                        bill_id,
                        record.outage_number,
                        start.with_timezone(&Tehran).date_naive(),
                    );

                    // 3. Decide notify-or-skip against the cached entry.
                    let decision = match self.cache.reconcile(&key, start, end) {
                        Ok(decision) => decision,
                        Err(e) => {
                            error!(bill_id, file = %key.file_name(), error = %e, "cache lookup failed");
                            continue;
                        }
                    };
                    if !decision.should_notify {
                        info!(file = %key.file_name(), "already notified");
                        continue;
                    }
                    if let Some(prior) = &decision.prior {
                        debug!(
                            uid = %prior.uid,
                            old_start = %prior.start,
                            old_end = %prior.end,
                            "outage window changed"
                        );
                    }

                    let entry = CachedOutage::new(
                        record,
                        bill_id,
                        account.recipients.clone(),
                        decision.sequence,
                        start,
                        end,
                    );

                    // 4. Deliver. The cache is only updated after a
                    // successful send.
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!("notification job cancelled");
                            return;
                        }
                        result = mailer.send_invite(&entry) => result,
                    };
                    if let Err(e) = sent {
                        error!(bill_id, uid = %entry.uid, error = %e, "mail send failed");
                        continue;
                    }

                    // 5. A write failure here risks a duplicate next cycle;
                    // logged, not retried inline.
                    match self.cache.persist(&key, &entry) {
                        Ok(()) => {
                            info!(uid = %entry.uid, sequence = entry.sequence, "notification sent")
                        }
                        Err(e) => {
                            error!(file = %key.file_name(), error = %e, "cache write failed after send")
                        }
                    }
                }

                // 6. Optional throttle between bills.
                if !self.wait.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!("notification job cancelled");
                            return;
                        }
                        _ = tokio::time::sleep(self.wait) => {}
                    }
                }
            }
        }

        debug!("notification job finished");
    }
}
