//! Persisted run state: the delivered-links store and the failure counter.
//!
//! Both files live in the state directory and are rewritten atomically:
//! serialize into a temporary file in the same directory, then rename it
//! over the target. A crash mid-write leaves either the old file or the new
//! one, never a half-written hybrid.
//!
//! The delivered-links store is scoped to a calendar date. A stored scope
//! that differs from the current run's reference date means the set is
//! treated as empty — a new day opens a fresh dedup window, which also keeps
//! the file from growing without bound. The pre-scoping format (a bare JSON
//! array of links) is still readable and treated as valid for any date, on
//! the conservative assumption that everything in it was already sent.

use crate::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Consecutive fetch failures tolerated before an operator alert fires.
pub const FAILURE_ALERT_THRESHOLD: u32 = 3;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredSentState {
    Scoped {
        scope_date: NaiveDate,
        links: Vec<String>,
    },
    /// Legacy shape: a bare list with no scope marker.
    Legacy(Vec<String>),
}

#[derive(Serialize)]
struct ScopedSentState<'a> {
    scope_date: NaiveDate,
    links: Vec<&'a str>,
}

/// The date-scoped set of already-delivered article links.
#[derive(Debug)]
pub struct SentState {
    path: PathBuf,
    scope_date: NaiveDate,
    delivered: HashSet<String>,
}

impl SentState {
    /// Load the store, re-scoping it to `reference_date`.
    ///
    /// A missing file yields an empty store. A stored scope other than
    /// `reference_date` is discarded (logically emptied). A legacy bare
    /// list is accepted as-is.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, reference_date: NaiveDate) -> Result<Self> {
        let delivered = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<StoredSentState>(&raw)? {
                StoredSentState::Scoped { scope_date, links } if scope_date == reference_date => {
                    links.into_iter().collect()
                }
                StoredSentState::Scoped { scope_date, .. } => {
                    info!(%scope_date, %reference_date, "Scope rollover; starting a fresh dedup window");
                    HashSet::new()
                }
                StoredSentState::Legacy(links) => {
                    warn!(count = links.len(), "Upgrading legacy unscoped sent-links file");
                    links.into_iter().collect()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(count = delivered.len(), "Loaded sent state");
        Ok(Self {
            path: path.to_path_buf(),
            scope_date: reference_date,
            delivered,
        })
    }

    pub fn is_delivered(&self, link: &str) -> bool {
        self.delivered.contains(link)
    }

    pub fn mark_delivered(&mut self, link: &str) {
        self.delivered.insert(link.to_string());
    }

    pub fn len(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }

    /// Atomically rewrite the backing file with the current set.
    pub fn persist(&self) -> Result<()> {
        let mut links: Vec<&str> = self.delivered.iter().map(String::as_str).collect();
        links.sort_unstable();
        let payload = serde_json::to_string_pretty(&ScopedSentState {
            scope_date: self.scope_date,
            links,
        })?;
        write_atomic(&self.path, payload.as_bytes())
    }
}

/// The persisted consecutive-fetch-failure counter.
///
/// Incremented on any final fetch failure, reset on any fetch success.
/// Crossing [`FAILURE_ALERT_THRESHOLD`] reports exactly one alert and resets
/// to zero, so a dead publisher cannot produce an alert storm.
#[derive(Debug)]
pub struct FailureTracker {
    path: PathBuf,
    consecutive: u32,
}

impl FailureTracker {
    pub fn load(path: &Path) -> Result<Self> {
        let consecutive = match std::fs::read_to_string(path) {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(path = %path.display(), "Unreadable failure counter; resetting to 0");
                0
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            consecutive,
        })
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Record a fetch failure. Returns `true` exactly when the threshold was
    /// just crossed (the counter resets so the next alert needs another full
    /// streak).
    pub fn record_failure(&mut self) -> Result<bool> {
        self.consecutive += 1;
        let crossed = self.consecutive >= FAILURE_ALERT_THRESHOLD;
        if crossed {
            self.consecutive = 0;
        }
        self.persist()?;
        Ok(crossed)
    }

    /// Record a fetch success, resetting the streak.
    pub fn record_success(&mut self) -> Result<()> {
        if self.consecutive != 0 {
            self.consecutive = 0;
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        write_atomic(&self.path, format!("{}\n", self.consecutive).as_bytes())
    }
}

/// Write via a temporary file in the target's directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = SentState::load(&dir.path().join("sent.json"), date("2026-02-12")).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_persist_and_reload_same_scope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");

        let mut state = SentState::load(&path, date("2026-02-12")).unwrap();
        state.mark_delivered("https://site.tld/a/123");
        state.persist().unwrap();

        let reloaded = SentState::load(&path, date("2026-02-12")).unwrap();
        assert!(reloaded.is_delivered("https://site.tld/a/123"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_scope_rollover_empties_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");

        let mut state = SentState::load(&path, date("2026-02-12")).unwrap();
        state.mark_delivered("https://site.tld/a/123");
        state.persist().unwrap();

        // Next day: the stored scope no longer matches.
        let rolled = SentState::load(&path, date("2026-02-13")).unwrap();
        assert!(!rolled.is_delivered("https://site.tld/a/123"));
        assert!(rolled.is_empty());
    }

    #[test]
    fn test_legacy_bare_list_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");
        std::fs::write(&path, r#"["https://old.tld/x", "https://old.tld/y"]"#).unwrap();

        let state = SentState::load(&path, date("2026-02-12")).unwrap();
        assert!(state.is_delivered("https://old.tld/x"));
        assert!(state.is_delivered("https://old.tld/y"));

        // Persisting writes the scoped shape.
        state.persist().unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("scope_date"));
        assert!(raw.contains("2026-02-12"));
    }

    #[test]
    fn test_failure_tracker_threshold_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failures.txt");

        let mut tracker = FailureTracker::load(&path).unwrap();
        assert!(!tracker.record_failure().unwrap());
        assert!(!tracker.record_failure().unwrap());
        assert!(tracker.record_failure().unwrap());
        // Counter reset after the alert: the next failure starts a new streak.
        assert_eq!(tracker.consecutive(), 0);
        assert!(!tracker.record_failure().unwrap());
    }

    #[test]
    fn test_failure_tracker_success_resets_without_alert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failures.txt");

        let mut tracker = FailureTracker::load(&path).unwrap();
        assert!(!tracker.record_failure().unwrap());
        assert!(!tracker.record_failure().unwrap());
        tracker.record_success().unwrap();
        assert_eq!(tracker.consecutive(), 0);

        // The streak persisted across a reload too.
        let reloaded = FailureTracker::load(&path).unwrap();
        assert_eq!(reloaded.consecutive(), 0);
    }

    #[test]
    fn test_failure_tracker_persists_streak() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failures.txt");

        let mut tracker = FailureTracker::load(&path).unwrap();
        tracker.record_failure().unwrap();
        tracker.record_failure().unwrap();

        let reloaded = FailureTracker::load(&path).unwrap();
        assert_eq!(reloaded.consecutive(), 2);
    }
}
