//! Session isolation context.
//!
//! A [`SessionContext`] is created once per build. It owns:
//! - a random 128-bit session id
//! - the resolved configuration, fixed for the rest of the build
//! - a private temp dir at `<work_dir>/.zume/sessions/<id>/` holding a debug
//!   snapshot of the config, the append-only journal and per-attempt logs
//! - an advisory lock on the session's working directory, and one on the
//!   temp dir itself so `sessions clean` leaves running sessions alone
//!
//! Nothing in the temp dir is read back by the pipeline. Closing the session
//! after a successful run removes it; aborted sessions keep it for inspection.

mod journal;
mod lock;

pub use journal::{Journal, JournalEntry};
pub use lock::{SessionLock, lock_path_for};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::build_config::settings_dir;
use crate::config::ResolvedConfig;
use crate::errors::SessionError;
use crate::stage::Stage;

const SNAPSHOT_FILE: &str = "build_config.json";
const JOURNAL_FILE: &str = "journal";
const LIVE_LOCK_FILE: &str = "session.lock";

/// Directory holding every session's temp dir.
pub fn sessions_root(work_dir: &Path) -> PathBuf {
    settings_dir(work_dir).join("sessions")
}

fn locks_dir(work_dir: &Path) -> PathBuf {
    settings_dir(work_dir).join("locks")
}

/// Opaque unique session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 hex chars, for log lines and file names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Active,
    Closed,
}

/// Debug snapshot written to `build_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub working_dir: PathBuf,
    pub config: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct SessionContext {
    id: SessionId,
    created_at: DateTime<Utc>,
    work_dir: PathBuf,
    working_dir: PathBuf,
    temp_dir: PathBuf,
    config: ResolvedConfig,
    state: SessionState,
    journal: Journal,
    lock: Option<SessionLock>,
    live: Option<SessionLock>,
}

impl SessionContext {
    /// Create a session for a build run from `work_dir` (where the stage tools live).
    ///
    /// The working directory is the resolved `project_path`; callers must keep
    /// it disjoint across concurrent sessions. A clash is detected through the
    /// working-directory lock and logged, but the session still proceeds.
    pub fn create(work_dir: &Path, config: ResolvedConfig) -> Result<Self, SessionError> {
        match std::fs::metadata(work_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(SessionError::WorkingDirUnavailable {
                    path: work_dir.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotADirectory,
                        "not a directory",
                    ),
                });
            }
            Err(source) => {
                return Err(SessionError::WorkingDirUnavailable {
                    path: work_dir.to_path_buf(),
                    source,
                });
            }
        }

        let id = SessionId::generate();
        let created_at = Utc::now();
        let temp_dir = sessions_root(work_dir).join(id.to_string());
        std::fs::create_dir_all(temp_dir.join("logs")).map_err(|source| {
            SessionError::TempDirCreateFailed {
                path: temp_dir.clone(),
                source,
            }
        })?;

        let live = match SessionLock::acquire(&temp_dir.join(LIVE_LOCK_FILE), &id.to_string()) {
            Ok(lock) => Some(lock),
            Err(e) => {
                tracing::warn!(session = %id.short(), error = %e, "Could not lock session temp dir");
                None
            }
        };

        let working_dir = match config.project_path() {
            Some(p) if p.is_absolute() => p,
            Some(p) => work_dir.join(p),
            None => temp_dir.clone(),
        };

        let snapshot = SessionSnapshot {
            session_id: id,
            created_at,
            working_dir: working_dir.clone(),
            config: config.snapshot(),
        };
        if let Err(e) = write_snapshot(&temp_dir.join(SNAPSHOT_FILE), &snapshot) {
            tracing::warn!(session = %id.short(), error = %e, "Could not write config snapshot");
        }

        let lock_path = lock_path_for(&locks_dir(work_dir), &working_dir);
        let lock = match SessionLock::acquire(&lock_path, &id.to_string()) {
            Ok(lock) => Some(lock),
            Err(e @ SessionError::IsolationViolation { .. }) => {
                tracing::error!(
                    session = %id.short(),
                    working_dir = %working_dir.display(),
                    error = %e,
                    "Isolation violation: working directory is in use by another session"
                );
                None
            }
            Err(e) => {
                tracing::warn!(session = %id.short(), error = %e, "Could not take session lock");
                None
            }
        };

        tracing::debug!(
            session = %id.short(),
            temp_dir = %temp_dir.display(),
            "Session created"
        );

        Ok(Self {
            id,
            created_at,
            work_dir: work_dir.to_path_buf(),
            working_dir,
            journal: Journal::new(temp_dir.join(JOURNAL_FILE)),
            temp_dir,
            config,
            state: SessionState::Created,
            lock,
            live,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Directory the stage tools run from.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether this session holds its working-directory lock.
    pub fn is_isolated(&self) -> bool {
        self.lock.is_some()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn activate(&mut self) {
        if self.state == SessionState::Created {
            self.state = SessionState::Active;
        }
    }

    /// Record a journal line. Journal failures are logged and otherwise ignored.
    pub fn record(&self, stage: Stage, attempt: u32, status: &str) {
        if let Err(e) = self.journal.append(stage.name(), attempt, status) {
            tracing::warn!(session = %self.id.short(), error = %e, "Journal write failed");
        }
    }

    pub fn attempt_log_path(&self, stage: Stage, attempt: u32) -> PathBuf {
        self.temp_dir
            .join("logs")
            .join(format!("{}-attempt-{}.log", stage.name(), attempt))
    }

    /// Close the session and release its lock. The temp dir is deleted unless
    /// `keep_temp` is set.
    pub fn close(&mut self, keep_temp: bool) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.lock = None;
        self.live = None;

        if keep_temp {
            tracing::info!(
                session = %self.id.short(),
                temp_dir = %self.temp_dir.display(),
                "Session files kept"
            );
        } else if let Err(e) = std::fs::remove_dir_all(&self.temp_dir) {
            tracing::warn!(session = %self.id.short(), error = %e, "Could not remove session temp dir");
        }
    }
}

fn write_snapshot(path: &Path, snapshot: &SessionSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// A retained session directory, as shown by `sessions list`.
#[derive(Debug, Clone)]
pub struct RetainedSession {
    pub dir: PathBuf,
    pub snapshot: Option<SessionSnapshot>,
    pub last_entry: Option<JournalEntry>,
    /// A build still owns this directory.
    pub live: bool,
}

/// List session temp dirs left under `work_dir`, oldest first.
pub fn list_sessions(work_dir: &Path) -> Result<Vec<RetainedSession>> {
    let root = sessions_root(work_dir);
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in std::fs::read_dir(&root)
        .with_context(|| format!("Failed to read {}", root.display()))?
    {
        let dir = entry?.path();
        if !dir.is_dir() {
            continue;
        }
        let snapshot = std::fs::read_to_string(dir.join(SNAPSHOT_FILE))
            .ok()
            .and_then(|s| serde_json::from_str::<SessionSnapshot>(&s).ok());
        let last_entry = Journal::new(dir.join(JOURNAL_FILE)).last();
        let live = SessionLock::is_held(&dir.join(LIVE_LOCK_FILE));
        sessions.push(RetainedSession {
            dir,
            snapshot,
            last_entry,
            live,
        });
    }

    sessions.sort_by_key(|s| s.snapshot.as_ref().map(|snap| snap.created_at));
    Ok(sessions)
}

/// Delete every retained session dir not owned by a running build. Returns
/// how many were removed.
pub fn clean_sessions(work_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for session in list_sessions(work_dir)? {
        if session.live {
            tracing::info!(dir = %session.dir.display(), "Skipping session in use");
            continue;
        }
        std::fs::remove_dir_all(&session.dir)
            .with_context(|| format!("Failed to remove {}", session.dir.display()))?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, ConfigKey, ConfigResolver, Environment};
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn config(project: &Path) -> ResolvedConfig {
        let cli = CliArgs::new()
            .with(ConfigKey::ProjectPath, project.to_string_lossy())
            .with(ConfigKey::LanguageCode, "en");
        ConfigResolver::new()
            .resolve(&cli, &Environment::new(), None)
            .unwrap()
    }

    #[test]
    fn test_session_ids_unique() {
        let ids: HashSet<SessionId> = (0..10_000).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_create_writes_snapshot_and_temp_dir() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("out").join("en");
        let session = SessionContext::create(dir.path(), config(&project)).unwrap();

        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(session.working_dir(), project.as_path());
        assert!(session.temp_dir().join("logs").is_dir());
        assert!(session.is_isolated());

        let snapshot: SessionSnapshot = serde_json::from_str(
            &std::fs::read_to_string(session.temp_dir().join(SNAPSHOT_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(snapshot.session_id, session.id());
        assert_eq!(snapshot.config.get("language_code").map(String::as_str), Some("en"));
    }

    #[test]
    fn test_missing_work_dir_is_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = SessionContext::create(&missing, ResolvedConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::WorkingDirUnavailable { .. }));
    }

    #[test]
    fn test_two_sessions_get_disjoint_temp_dirs() {
        let dir = tempdir().unwrap();
        let a = SessionContext::create(dir.path(), config(&dir.path().join("en"))).unwrap();
        let b = SessionContext::create(dir.path(), config(&dir.path().join("es"))).unwrap();
        assert_ne!(a.temp_dir(), b.temp_dir());
        assert_ne!(
            a.attempt_log_path(Stage::Setup, 1),
            b.attempt_log_path(Stage::Setup, 1)
        );
        assert!(a.is_isolated() && b.is_isolated());
    }

    #[test]
    fn test_shared_working_dir_detected_but_session_proceeds() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("en");
        let first = SessionContext::create(dir.path(), config(&project)).unwrap();
        let second = SessionContext::create(dir.path(), config(&project)).unwrap();
        assert!(first.is_isolated());
        assert!(!second.is_isolated());
        assert_eq!(second.state(), SessionState::Created);
    }

    #[test]
    fn test_lifecycle_and_close_removes_temp() {
        let dir = tempdir().unwrap();
        let mut session = SessionContext::create(dir.path(), config(&dir.path().join("en"))).unwrap();
        session.activate();
        assert_eq!(session.state(), SessionState::Active);
        session.record(Stage::Setup, 1, "succeeded");
        assert_eq!(session.journal().entries().len(), 1);

        let temp = session.temp_dir().to_path_buf();
        session.close(false);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!temp.exists());
    }

    #[test]
    fn test_close_keep_temp_and_list_then_clean() {
        let dir = tempdir().unwrap();
        let mut session = SessionContext::create(dir.path(), config(&dir.path().join("en"))).unwrap();
        session.activate();
        session.record(Stage::VideoDownload, 2, "failed");
        session.close(true);
        assert!(session.temp_dir().exists());

        let retained = list_sessions(dir.path()).unwrap();
        assert_eq!(retained.len(), 1);
        let last = retained[0].last_entry.as_ref().unwrap();
        assert_eq!(last.stage, "video-download");
        assert_eq!(last.attempt, 2);

        assert_eq!(clean_sessions(dir.path()).unwrap(), 1);
        assert!(list_sessions(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_clean_leaves_running_session_alone() {
        let dir = tempdir().unwrap();
        let mut finished = SessionContext::create(dir.path(), config(&dir.path().join("en"))).unwrap();
        finished.close(true);
        let mut running = SessionContext::create(dir.path(), config(&dir.path().join("es"))).unwrap();
        running.activate();
        running.record(Stage::Setup, 1, "running");

        let listed = list_sessions(dir.path()).unwrap();
        assert_eq!(listed.iter().filter(|s| s.live).count(), 1);

        assert_eq!(clean_sessions(dir.path()).unwrap(), 1);
        assert!(!finished.temp_dir().exists());
        assert!(running.temp_dir().join(JOURNAL_FILE).is_file());

        running.close(true);
        assert_eq!(clean_sessions(dir.path()).unwrap(), 1);
        assert!(list_sessions(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_equivalent_project_paths_detected_as_shared() {
        let dir = tempdir().unwrap();
        let first = SessionContext::create(dir.path(), config(Path::new("en"))).unwrap();
        let second = SessionContext::create(dir.path(), config(Path::new("./en"))).unwrap();
        assert!(first.is_isolated());
        assert!(!second.is_isolated());
    }

    #[test]
    fn test_close_releases_lock() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("en");
        let mut first = SessionContext::create(dir.path(), config(&project)).unwrap();
        first.close(false);
        let second = SessionContext::create(dir.path(), config(&project)).unwrap();
        assert!(second.is_isolated());
    }
}
