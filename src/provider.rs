use chrono::{DateTime, Utc};
use chrono_tz::Asia::Tehran;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::jalali::{self, JalaliError};
use crate::types::OutageRecord;

pub const DEFAULT_BASE_URL: &str = "https://uiapi.saapa.ir/api/ebills";

// The provider rejects requests that do not look like its own mobile client.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36";
const ORIGIN: &str = "https://ios.bargheman.com";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("provider rejected request: status {status} {message}")]
    Api { status: i64, message: String },
    #[error("cannot express request window in the provider calendar: {0}")]
    Calendar(#[from] JalaliError),
}

/// Fetches planned blackouts for one bill over a date range.
pub trait OutageProvider {
    fn planned_blackouts(
        &self,
        auth_token: &str,
        bill_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<OutageRecord>, ProviderError>> + Send;
}

#[derive(Serialize)]
struct BlackoutRequest<'a> {
    bill_id: &'a str,
    from_date: String,
    to_date: String,
}

#[derive(Deserialize)]
struct BlackoutResponse {
    status: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<OutageRecord>,
}

pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProviderClient {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// The request range travels in the provider's own calendar.
    fn request_payload<'a>(
        bill_id: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BlackoutRequest<'a>, JalaliError> {
        Ok(BlackoutRequest {
            bill_id,
            from_date: jalali::format_jalali(from.with_timezone(&Tehran).date_naive())?,
            to_date: jalali::format_jalali(to.with_timezone(&Tehran).date_naive())?,
        })
    }
}

impl OutageProvider for ProviderClient {
    async fn planned_blackouts(
        &self,
        auth_token: &str,
        bill_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OutageRecord>, ProviderError> {
        let payload = Self::request_payload(bill_id, from, to)?;
        debug!(
            bill_id,
            from_date = %payload.from_date,
            to_date = %payload.to_date,
            "requesting planned blackouts"
        );

        let response = self
            .http
            .post(format!("{}/PlannedBlackoutsReport", self.base_url))
            .bearer_auth(auth_token)
            .header("Origin", ORIGIN)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus(status));
        }

        let body: BlackoutResponse = response.json().await?;
        if body.status != 200 {
            return Err(ProviderError::Api {
                status: body.status,
                message: body.message,
            });
        }

        debug!(bill_id, records = body.data.len(), "planned blackouts fetched");
        Ok(body.data)
    }
}
