//! # Application Crash State
//!
//! Cross-launch bookkeeping: did the previous launch crash, and how many
//! launches and foreground sessions have passed since the last crash.
//!
//! The live state is a handful of atomics so the crash path can flip
//! `crashed_this_launch` without taking a lock; persistence is a small JSON
//! file rewritten on every lifecycle transition. Losing a write costs one
//! transition of bookkeeping, never a report.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::{fs, io};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The most recent lifecycle notification, kept for replay at install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState
{
    /// No lifecycle notification has been recorded yet.
    None = 0,
    /// The application became active.
    Active = 1,
    /// The application became inactive.
    Inactive = 2,
    /// The application moved to the background.
    Background = 3,
    /// The application moved to the foreground.
    Foreground = 4,
    /// The application is terminating.
    Terminating = 5,
}

impl LifecycleState
{
    pub(crate) fn from_u8(raw: u8) -> Self
    {
        match raw {
            1 => LifecycleState::Active,
            2 => LifecycleState::Inactive,
            3 => LifecycleState::Background,
            4 => LifecycleState::Foreground,
            5 => LifecycleState::Terminating,
            _ => LifecycleState::None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCrashState
{
    crashed_this_launch: bool,
    launches_since_last_crash: u32,
    sessions_since_last_crash: u32,
}

/// Per-launch crash state with a persisted backing file.
#[derive(Debug)]
pub struct CrashState
{
    path: PathBuf,
    active: AtomicBool,
    in_foreground: AtomicBool,
    crashed_this_launch: AtomicBool,
    crashed_last_launch: AtomicBool,
    launches_since_last_crash: AtomicU32,
    sessions_since_last_crash: AtomicU32,
}

impl CrashState
{
    /// Load the previous launch's state from `path` and begin this launch.
    ///
    /// A crash recorded by the previous launch resets the since-last-crash
    /// counters; either way this launch counts as one new launch and one new
    /// session. An unreadable or corrupt state file is treated as a first
    /// launch.
    ///
    /// ## Errors
    ///
    /// Returns an error only when the new state cannot be written back.
    pub fn initialize(path: &Path) -> io::Result<Self>
    {
        let previous = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<PersistedCrashState>(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Corrupt crash state file; starting fresh");
                PersistedCrashState::default()
            }),
            Err(_) => PersistedCrashState::default(),
        };

        let crashed_last_launch = previous.crashed_this_launch;
        let (launches, sessions) = if crashed_last_launch {
            (1, 1)
        } else {
            (
                previous.launches_since_last_crash.saturating_add(1),
                previous.sessions_since_last_crash.saturating_add(1),
            )
        };

        let state = CrashState {
            path: path.to_path_buf(),
            active: AtomicBool::new(false),
            in_foreground: AtomicBool::new(false),
            crashed_this_launch: AtomicBool::new(false),
            crashed_last_launch: AtomicBool::new(crashed_last_launch),
            launches_since_last_crash: AtomicU32::new(launches),
            sessions_since_last_crash: AtomicU32::new(sessions),
        };
        state.persist()?;

        debug!(
            crashed_last_launch,
            launches_since_last_crash = launches,
            sessions_since_last_crash = sessions,
            "Crash state initialized"
        );
        Ok(state)
    }

    /// Whether the previous launch ended in a recorded crash.
    pub fn crashed_last_launch(&self) -> bool
    {
        self.crashed_last_launch.load(Ordering::SeqCst)
    }

    /// Whether a crash has been recorded during this launch.
    pub fn crashed_this_launch(&self) -> bool
    {
        self.crashed_this_launch.load(Ordering::SeqCst)
    }

    /// Launches since the last recorded crash, including this one.
    pub fn launches_since_last_crash(&self) -> u32
    {
        self.launches_since_last_crash.load(Ordering::SeqCst)
    }

    /// Foreground sessions since the last recorded crash.
    pub fn sessions_since_last_crash(&self) -> u32
    {
        self.sessions_since_last_crash.load(Ordering::SeqCst)
    }

    /// Record an active/inactive transition. Becoming active starts a new
    /// session.
    pub fn notify_app_active(&self, active: bool)
    {
        let was_active = self.active.swap(active, Ordering::SeqCst);
        if active && !was_active {
            self.sessions_since_last_crash.fetch_add(1, Ordering::SeqCst);
        }
        self.persist_best_effort();
    }

    /// Record a foreground/background transition.
    pub fn notify_app_in_foreground(&self, in_foreground: bool)
    {
        self.in_foreground.store(in_foreground, Ordering::SeqCst);
        self.persist_best_effort();
    }

    /// Record an orderly termination.
    pub fn notify_app_terminate(&self)
    {
        self.active.store(false, Ordering::SeqCst);
        self.persist_best_effort();
    }

    /// Record that this launch crashed.
    ///
    /// Called from the capture path while the world is stopped, so the write
    /// is silent: logging could block on a writer lock a suspended thread
    /// holds. The persisted file is what the *next* launch reads as
    /// `crashed_last_launch`.
    pub fn notify_app_crash(&self)
    {
        self.crashed_this_launch.store(true, Ordering::SeqCst);
        let _ = self.persist();
    }

    fn persist(&self) -> io::Result<()>
    {
        let snapshot = PersistedCrashState {
            crashed_this_launch: self.crashed_this_launch.load(Ordering::SeqCst),
            launches_since_last_crash: self.launches_since_last_crash.load(Ordering::SeqCst),
            sessions_since_last_crash: self.sessions_since_last_crash.load(Ordering::SeqCst),
        };
        let body = serde_json::to_vec_pretty(&snapshot).map_err(io::Error::other)?;
        fs::write(&self.path, body)
    }

    fn persist_best_effort(&self)
    {
        if let Err(e) = self.persist() {
            warn!(path = %self.path.display(), error = %e, "Failed to persist crash state");
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn first_launch_starts_at_one()
    {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crash-state.json");

        let state = CrashState::initialize(&path).unwrap();
        assert!(!state.crashed_last_launch());
        assert!(!state.crashed_this_launch());
        assert_eq!(state.launches_since_last_crash(), 1);
        assert_eq!(state.sessions_since_last_crash(), 1);
    }

    #[test]
    fn clean_relaunch_accumulates_counters()
    {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crash-state.json");

        {
            let state = CrashState::initialize(&path).unwrap();
            state.notify_app_active(true);
            state.notify_app_terminate();
        }

        let relaunched = CrashState::initialize(&path).unwrap();
        assert!(!relaunched.crashed_last_launch());
        assert_eq!(relaunched.launches_since_last_crash(), 2);
        // launch session + the explicit activation, plus this launch
        assert_eq!(relaunched.sessions_since_last_crash(), 3);
    }

    #[test]
    fn crash_resets_counters_on_next_launch()
    {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crash-state.json");

        {
            let state = CrashState::initialize(&path).unwrap();
            state.notify_app_crash();
            assert!(state.crashed_this_launch());
        }

        let relaunched = CrashState::initialize(&path).unwrap();
        assert!(relaunched.crashed_last_launch());
        assert!(!relaunched.crashed_this_launch());
        assert_eq!(relaunched.launches_since_last_crash(), 1);
        assert_eq!(relaunched.sessions_since_last_crash(), 1);
    }

    #[test]
    fn corrupt_state_file_is_treated_as_first_launch()
    {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crash-state.json");
        fs::write(&path, "{not json").unwrap();

        let state = CrashState::initialize(&path).unwrap();
        assert!(!state.crashed_last_launch());
        assert_eq!(state.launches_since_last_crash(), 1);
    }

    #[test]
    fn repeated_activation_counts_one_session()
    {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crash-state.json");

        let state = CrashState::initialize(&path).unwrap();
        state.notify_app_active(true);
        state.notify_app_active(true);
        state.notify_app_active(false);
        state.notify_app_active(true);
        assert_eq!(state.sessions_since_last_crash(), 3);
    }
}
