//! The on-disk report store.
//!
//! Layout: `<dir>/<app>-report-<id:016x>.json` per report, plus a
//! `.store-state.json` sidecar holding the next id to hand out. Listing and
//! counting walk the directory; only the id counter is cached in memory, as
//! an atomic, because allocation has to work from the constrained capture
//! path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

const STATE_FILE: &str = ".store-state.json";
const DEFAULT_MAX_REPORTS: usize = 5;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState
{
    next_report_id: i64,
}

/// Bounded, id-ordered collection of report files.
pub struct ReportStore
{
    app_name: String,
    directory: PathBuf,
    state_path: PathBuf,
    next_id: AtomicI64,
    max_reports: AtomicUsize,
}

impl ReportStore
{
    /// Open (creating if absent) the store under `directory`.
    ///
    /// The next-id counter recovers from prior sessions: the maximum of the
    /// persisted sidecar and the highest id still on disk, so ids keep
    /// increasing across restarts even if the sidecar was lost.
    pub fn initialize(app_name: &str, directory: &Path) -> StoreResult<Self>
    {
        fs::create_dir_all(directory)?;
        let state_path = directory.join(STATE_FILE);

        let persisted_next = match fs::read(&state_path) {
            Ok(bytes) => serde_json::from_slice::<PersistedState>(&bytes)
                .map_err(|e| StoreError::CorruptState(e.to_string()))
                .map(|s| s.next_report_id)
                .unwrap_or_else(|err| {
                    warn!(%err, "ignoring unreadable store state");
                    1
                }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => 1,
            Err(err) => return Err(err.into()),
        };

        let store = ReportStore {
            app_name: app_name.to_string(),
            directory: directory.to_path_buf(),
            state_path,
            next_id: AtomicI64::new(1),
            max_reports: AtomicUsize::new(DEFAULT_MAX_REPORTS),
        };

        let highest_on_disk = store.scan()?.last().map_or(0, |(id, _)| *id);
        let next = persisted_next.max(highest_on_disk + 1).max(1);
        store.next_id.store(next, Ordering::SeqCst);
        store.persist_state();

        debug!(app = app_name, next_id = next, "report store initialized");
        Ok(store)
    }

    /// Change the maximum number of retained reports.
    pub fn set_max_report_count(&self, max: usize)
    {
        self.max_reports.store(max.max(1), Ordering::SeqCst);
    }

    pub fn max_report_count(&self) -> usize
    {
        self.max_reports.load(Ordering::SeqCst)
    }

    /// Claim the next report id and its file path.
    ///
    /// A single atomic increment: callable from the capture context, where
    /// every other thread is suspended and no lock may be taken. The counter
    /// is persisted best-effort; recovery re-derives it from disk anyway.
    pub fn allocate_next(&self) -> (i64, PathBuf)
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.persist_state();
        (id, self.path_for_id(id))
    }

    /// File path for a report id.
    pub fn path_for_id(&self, id: i64) -> PathBuf
    {
        self.directory.join(format!("{}-report-{:016x}.json", self.app_name, id))
    }

    /// Number of reports currently on disk.
    pub fn count(&self) -> usize
    {
        self.scan().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Up to `max` report ids, ascending (oldest first).
    pub fn list_ids(&self, max: usize) -> Vec<i64>
    {
        match self.scan() {
            Ok(entries) => entries.into_iter().map(|(id, _)| id).take(max).collect(),
            Err(err) => {
                warn!(%err, "failed to list reports");
                Vec::new()
            }
        }
    }

    /// Raw bytes of a report, or `None` if no such id exists.
    pub fn read(&self, id: i64) -> StoreResult<Option<Vec<u8>>>
    {
        match fs::read(self.path_for_id(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete one report. Missing ids are not an error.
    pub fn delete_one(&self, id: i64) -> StoreResult<()>
    {
        match fs::remove_file(self.path_for_id(id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete every report. The id counter is deliberately left alone.
    pub fn delete_all(&self)
    {
        if let Ok(entries) = self.scan() {
            for (_, path) in entries {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(%err, path = %path.display(), "failed to delete report");
                }
            }
        }
    }

    /// Accept a caller-formatted report through the same id-allocation and
    /// eviction path as crash-triggered reports.
    pub fn add_user_report(&self, report: &[u8]) -> StoreResult<i64>
    {
        let (id, path) = self.allocate_next();
        fs::write(&path, report)?;
        self.prune();
        Ok(id)
    }

    /// Evict oldest reports until the store is within its bound.
    ///
    /// Runs on the capture path (after every report write), so it stays
    /// silent: the subscriber's writer lock may be held by a suspended
    /// thread. Failed removals are retried by the next prune anyway.
    pub fn prune(&self)
    {
        let max = self.max_report_count();
        let Ok(entries) = self.scan() else {
            return;
        };
        if entries.len() <= max {
            return;
        }
        for (_, path) in &entries[..entries.len() - max] {
            let _ = fs::remove_file(path);
        }
    }

    /// Best effort and silent, same constraint as [`Self::prune`]; recovery
    /// re-derives the counter from disk.
    fn persist_state(&self)
    {
        let state = PersistedState {
            next_report_id: self.next_id.load(Ordering::SeqCst),
        };
        if let Ok(bytes) = serde_json::to_vec(&state) {
            let _ = fs::write(&self.state_path, bytes);
        }
    }

    /// All report files in the directory, sorted ascending by id.
    fn scan(&self) -> StoreResult<Vec<(i64, PathBuf)>>
    {
        let prefix = format!("{}-report-", self.app_name);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(id) = parse_report_id(name, &prefix) {
                entries.push((id, entry.path()));
            }
        }
        entries.sort_unstable_by_key(|(id, _)| *id);
        Ok(entries)
    }
}

/// Extract the id from `<prefix><id:016x>.json`, or `None` for foreign files.
fn parse_report_id(file_name: &str, prefix: &str) -> Option<i64>
{
    let rest = file_name.strip_prefix(prefix)?;
    let hex = rest.strip_suffix(".json")?;
    i64::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests
{
    use super::parse_report_id;

    #[test]
    fn parses_well_formed_report_names()
    {
        assert_eq!(parse_report_id("app-report-0000000000000001.json", "app-report-"), Some(1));
        assert_eq!(parse_report_id("app-report-00000000000000ff.json", "app-report-"), Some(255));
    }

    #[test]
    fn rejects_foreign_files()
    {
        assert_eq!(parse_report_id(".store-state.json", "app-report-"), None);
        assert_eq!(parse_report_id("app-report-xyz.json", "app-report-"), None);
        assert_eq!(parse_report_id("other-report-0000000000000001.json", "app-report-"), None);
        assert_eq!(parse_report_id("app-report-0000000000000001.txt", "app-report-"), None);
    }
}
