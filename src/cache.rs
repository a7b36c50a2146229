//! cache.rs — change-detection-and-dedup cache
//!
//! One JSON file per (bill id, outage number, start date) key. `reconcile`
//! is read-only and decides notify-or-skip plus the sequence to use;
//! `persist` replaces the whole entry through a temp-file rename so a crash
//! mid-write leaves either the old or the new content, never a torn mix.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::types::CachedOutage;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache entry {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Identity of one tracked outage: the date portion is the provider-local
/// date of the start instant, not the full timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub bill_id: String,
    pub outage_number: i64,
    pub start_date: NaiveDate,
}

impl CacheKey {
    pub fn new(bill_id: &str, outage_number: i64, start_date: NaiveDate) -> Self {
        Self {
            bill_id: bill_id.to_string(),
            outage_number,
            start_date,
        }
    }

    /// Pattern: "{bill_id}_{outage_number}_{start_date}.json".
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.json",
            self.bill_id,
            self.outage_number,
            self.start_date.format("%Y-%m-%d")
        )
    }
}

/// Outcome of comparing an incoming outage window against the stored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub should_notify: bool,
    /// Sequence the next notification must carry for this key.
    pub sequence: u32,
    pub prior: Option<CachedOutage>,
}

pub struct OutageCache {
    dir: PathBuf,
}

impl OutageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Decides whether the incoming window is news for this key.
    ///
    /// A record is treated as already notified when either the stored start
    /// or the stored end matches the incoming one; only when both boundaries
    /// moved does the sequence advance. Read-only: nothing is written until
    /// the caller persists after a successful delivery.
    pub fn reconcile(
        &self,
        key: &CacheKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Reconciliation, CacheError> {
        match self.load(key)? {
            None => Ok(Reconciliation {
                should_notify: true,
                sequence: 0,
                prior: None,
            }),
            Some(prior) => {
                if prior.start == start || prior.end == end {
                    Ok(Reconciliation {
                        should_notify: false,
                        sequence: prior.sequence,
                        prior: Some(prior),
                    })
                } else {
                    Ok(Reconciliation {
                        should_notify: true,
                        sequence: prior.sequence.saturating_add(1),
                        prior: Some(prior),
                    })
                }
            }
        }
    }

    /// Replaces the entry at the given key with the full incoming record.
    pub fn persist(&self, key: &CacheKey, entry: &CachedOutage) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        let content = serde_json::to_vec(entry).map_err(|source| CacheError::Corrupt {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &content).map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })
    }

    fn load(&self, key: &CacheKey) -> Result<Option<CachedOutage>, CacheError> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        // An empty file carries no prior notification; it will be overwritten
        // by the next persist.
        if bytes.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Corrupt { path, source })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutageRecord;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn window(start_hour: u32, end_hour: u32) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 7, 22, start_hour, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 22, end_hour, 30, 0).unwrap(),
        )
    }

    fn key() -> CacheKey {
        CacheKey::new("11111", 100, NaiveDate::from_ymd_opt(2024, 7, 22).unwrap())
    }

    fn entry(sequence: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> CachedOutage {
        let record = OutageRecord {
            outage_number: 100,
            outage_date: "1403/05/01".to_string(),
            outage_start_time: String::new(),
            outage_stop_time: String::new(),
            address: "Valiasr St".to_string(),
            reason_outage: "maintenance".to_string(),
            is_planned: true,
            tracking_code: 0,
        };
        CachedOutage::new(
            &record,
            "11111",
            vec!["a@example.com".to_string()],
            sequence,
            start,
            end,
        )
    }

    #[test]
    fn first_sighting_notifies_with_sequence_zero() {
        let tmp = TempDir::new().unwrap();
        let cache = OutageCache::new(tmp.path()).unwrap();

        let (start, end) = window(6, 8);
        let rec = cache.reconcile(&key(), start, end).unwrap();
        assert!(rec.should_notify);
        assert_eq!(rec.sequence, 0);
        assert!(rec.prior.is_none());
    }

    #[test]
    fn reconcile_is_idempotent_without_persist() {
        let tmp = TempDir::new().unwrap();
        let cache = OutageCache::new(tmp.path()).unwrap();

        let (start, end) = window(6, 8);
        let first = cache.reconcile(&key(), start, end).unwrap();
        let second = cache.reconcile(&key(), start, end).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn matching_start_or_end_is_a_duplicate() {
        let tmp = TempDir::new().unwrap();
        let cache = OutageCache::new(tmp.path()).unwrap();

        let (start, end) = window(6, 8);
        cache.persist(&key(), &entry(0, start, end)).unwrap();

        // Identical window.
        let rec = cache.reconcile(&key(), start, end).unwrap();
        assert!(!rec.should_notify);

        // Only the end moved; the matching start still counts as unchanged.
        let (_, later_end) = window(6, 9);
        let rec = cache.reconcile(&key(), start, later_end).unwrap();
        assert!(!rec.should_notify);

        // Only the start moved; the matching end still counts as unchanged.
        let (later_start, _) = window(7, 8);
        let rec = cache.reconcile(&key(), later_start, end).unwrap();
        assert!(!rec.should_notify);
    }

    #[test]
    fn shifted_window_advances_the_sequence() {
        let tmp = TempDir::new().unwrap();
        let cache = OutageCache::new(tmp.path()).unwrap();

        let (start, end) = window(6, 8);
        cache.persist(&key(), &entry(0, start, end)).unwrap();

        let (new_start, new_end) = window(7, 9);
        let rec = cache.reconcile(&key(), new_start, new_end).unwrap();
        assert!(rec.should_notify);
        assert_eq!(rec.sequence, 1);
        assert_eq!(rec.prior.as_ref().map(|p| p.sequence), Some(0));

        cache.persist(&key(), &entry(1, new_start, new_end)).unwrap();

        let (third_start, third_end) = window(8, 10);
        let rec = cache.reconcile(&key(), third_start, third_end).unwrap();
        assert!(rec.should_notify);
        assert_eq!(rec.sequence, 2);
    }

    #[test]
    fn sequence_saturates_instead_of_wrapping() {
        let tmp = TempDir::new().unwrap();
        let cache = OutageCache::new(tmp.path()).unwrap();

        let (start, end) = window(6, 8);
        cache.persist(&key(), &entry(u32::MAX, start, end)).unwrap();

        let (new_start, new_end) = window(7, 9);
        let rec = cache.reconcile(&key(), new_start, new_end).unwrap();
        assert!(rec.should_notify);
        assert_eq!(rec.sequence, u32::MAX);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let cache = OutageCache::new(tmp.path()).unwrap();

        let (start, end) = window(6, 8);
        let written = entry(3, start, end);
        cache.persist(&key(), &written).unwrap();

        let rec = cache.reconcile(&key(), start, end).unwrap();
        assert_eq!(rec.prior, Some(written));
    }

    #[test]
    fn empty_entry_counts_as_never_seen() {
        let tmp = TempDir::new().unwrap();
        let cache = OutageCache::new(tmp.path()).unwrap();
        std::fs::write(tmp.path().join(key().file_name()), b"").unwrap();

        let (start, end) = window(6, 8);
        let rec = cache.reconcile(&key(), start, end).unwrap();
        assert!(rec.should_notify);
        assert_eq!(rec.sequence, 0);
    }

    #[test]
    fn corrupt_entry_surfaces_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let cache = OutageCache::new(tmp.path()).unwrap();
        std::fs::write(tmp.path().join(key().file_name()), b"{not json").unwrap();

        let (start, end) = window(6, 8);
        assert!(matches!(
            cache.reconcile(&key(), start, end),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn distinct_keys_use_distinct_files() {
        let other = CacheKey::new("22222", 100, NaiveDate::from_ymd_opt(2024, 7, 22).unwrap());
        assert_ne!(key().file_name(), other.file_name());
        assert_eq!(key().file_name(), "11111_100_2024-07-22.json");
    }
}
