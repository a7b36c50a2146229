use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Tehran;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jalali::{self, JalaliError};

#[derive(Debug, Error)]
pub enum WindowParseError {
    #[error("invalid outage date `{0}`")]
    InvalidDate(String),
    #[error("invalid outage time `{0}`")]
    InvalidTime(String),
    #[error(transparent)]
    Calendar(#[from] JalaliError),
    #[error("outage time {0}:{1:02} does not exist in the provider timezone")]
    NonexistentLocalTime(u32, u32),
}

/// One planned-blackout record as returned by the provider. Transient; a
/// fresh set is fetched on every poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutageRecord {
    pub outage_number: i64,
    /// Jalali date text, "YYYY/MM/DD".
    pub outage_date: String,
    /// "HH:MM" in the provider's local time.
    pub outage_start_time: String,
    pub outage_stop_time: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub reason_outage: String,
    #[serde(default)]
    pub is_planned: bool,
    #[serde(default)]
    pub tracking_code: i64,
}

impl OutageRecord {
    /// Resolves the record's Jalali date plus local start/stop times into
    /// absolute UTC instants. Both times fall on the same provider-local day.
    pub fn parse_window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), WindowParseError> {
        let (jy, jm, jd) = split_date(&self.outage_date)?;
        let (start_hour, start_minute) = split_time(&self.outage_start_time)?;
        let (stop_hour, stop_minute) = split_time(&self.outage_stop_time)?;

        let date = jalali::jalali_to_gregorian(jy, jm, jd)?;
        let start = local_instant(date, start_hour, start_minute)?;
        let stop = local_instant(date, stop_hour, stop_minute)?;

        Ok((start, stop))
    }
}

/// Durable per-outage entry, one JSON file per cache key. Whole-record
/// replaced on every update; `sequence` doubles as the iCalendar SEQUENCE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedOutage {
    pub uid: String,
    pub bill_id: String,
    pub sequence: u32,
    pub outage_number: i64,
    pub outage_date: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub recipients: Vec<String>,
    pub address: String,
    pub reason: String,
}

impl CachedOutage {
    pub fn new(
        record: &OutageRecord,
        bill_id: &str,
        recipients: Vec<String>,
        sequence: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let start_date = start.with_timezone(&Tehran).date_naive();
        Self {
            uid: format!(
                "{}_{}_{}",
                bill_id,
                record.outage_number,
                start_date.format("%Y-%m-%d")
            ),
            bill_id: bill_id.to_string(),
            sequence,
            outage_number: record.outage_number,
            outage_date: record.outage_date.clone(),
            start,
            end,
            recipients,
            address: record.address.clone(),
            reason: record.reason_outage.clone(),
        }
    }

    pub fn summary(&self) -> String {
        format!("Power Outage on {}", self.address)
    }

    pub fn description(&self) -> String {
        let start = self.start.with_timezone(&Tehran);
        let end = self.end.with_timezone(&Tehran);
        format!(
            "Blackout!\nAddress: {}\nDate: {}\nFrom {} until {}\nReason: {}",
            self.address,
            self.outage_date,
            start.format("%H:%M"),
            end.format("%H:%M"),
            self.reason,
        )
    }
}

fn split_date(raw: &str) -> Result<(i64, i64, i64), WindowParseError> {
    let parts: Vec<&str> = raw.split('/').collect();
    let [year, month, day] = parts.as_slice() else {
        return Err(WindowParseError::InvalidDate(raw.to_string()));
    };
    let parse = |s: &&str| -> Result<i64, WindowParseError> {
        s.trim()
            .parse()
            .map_err(|_| WindowParseError::InvalidDate(raw.to_string()))
    };
    Ok((parse(year)?, parse(month)?, parse(day)?))
}

fn split_time(raw: &str) -> Result<(u32, u32), WindowParseError> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [hour, minute] = parts.as_slice() else {
        return Err(WindowParseError::InvalidTime(raw.to_string()));
    };
    let parse = |s: &&str| -> Result<u32, WindowParseError> {
        s.trim()
            .parse()
            .map_err(|_| WindowParseError::InvalidTime(raw.to_string()))
    };
    Ok((parse(hour)?, parse(minute)?))
}

fn local_instant(
    date: NaiveDate,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Utc>, WindowParseError> {
    Tehran
        .with_ymd_and_hms(date.year(), date.month(), date.day(), hour, minute, 0)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(WindowParseError::NonexistentLocalTime(hour, minute))
}
