use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

/// Age-based sweeper for the cache directory. Entries are plain files whose
/// modification time tells when the outage was last notified.
pub struct Janitor {
    dir: PathBuf,
}

impl Janitor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Deletes every entry whose mtime is older than `now - retention`.
    /// Entries that cannot be inspected or removed are logged and skipped;
    /// the sweep always continues with the remaining files.
    pub fn sweep(&self, retention: Duration) {
        // A retention reaching past the epoch means nothing can be old
        // enough to expire.
        let Some(cutoff) = SystemTime::now().checked_sub(retention) else {
            debug!("retention exceeds representable time, nothing to sweep");
            return;
        };

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot read cache directory");
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "cannot stat cache entry");
                    continue;
                }
            };

            if modified >= cutoff {
                continue;
            }

            debug!(file = %path.display(), "removing expired cache entry");
            if let Err(e) = fs::remove_file(&path) {
                warn!(file = %path.display(), error = %e, "cannot remove cache entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    #[test]
    fn removes_only_entries_older_than_retention() {
        let tmp = TempDir::new().unwrap();
        let old = tmp.path().join("old.json");
        let fresh = tmp.path().join("fresh.json");
        fs::write(&old, b"{}").unwrap();
        fs::write(&fresh, b"{}").unwrap();

        let two_days_ago =
            FileTime::from_system_time(SystemTime::now() - Duration::from_secs(48 * 3600));
        filetime::set_file_mtime(&old, two_days_ago).unwrap();
        let one_hour_ago =
            FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
        filetime::set_file_mtime(&fresh, one_hour_ago).unwrap();

        Janitor::new(tmp.path()).sweep(Duration::from_secs(24 * 3600));

        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn oversized_retention_sweeps_nothing() {
        let tmp = TempDir::new().unwrap();
        let entry = tmp.path().join("entry.json");
        fs::write(&entry, b"{}").unwrap();

        Janitor::new(tmp.path()).sweep(Duration::from_secs(u64::MAX));

        assert!(entry.exists());
    }

    #[test]
    fn missing_directory_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("nonexistent");
        Janitor::new(&gone).sweep(Duration::from_secs(60));
    }
}
