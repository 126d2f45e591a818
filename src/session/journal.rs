use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::SessionError;

/// One line of the session journal: `stage|attempt|status|timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub stage: String,
    pub attempt: u32,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of what a session did. Debug output only; the pipeline
/// never reads it back to decide anything.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, stage: &str, attempt: u32, status: &str) -> Result<(), SessionError> {
        let line = format!(
            "{}|{}|{}|{}\n",
            stage,
            attempt,
            status,
            Utc::now().to_rfc3339()
        );

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .map_err(|source| SessionError::JournalWriteFailed {
                path: self.path.clone(),
                source,
            })
    }

    /// Read all entries. Malformed lines are skipped.
    pub fn entries(&self) -> Vec<JournalEntry> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };

        content
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split('|').collect();
                if parts.len() != 4 {
                    return None;
                }
                Some(JournalEntry {
                    stage: parts[0].to_string(),
                    attempt: parts[1].parse().unwrap_or(0),
                    status: parts[2].to_string(),
                    timestamp: DateTime::parse_from_rfc3339(parts[3])
                        .ok()?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    pub fn last(&self) -> Option<JournalEntry> {
        self.entries().pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_read_entries() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path().join("journal"));

        journal.append("setup", 1, "succeeded").unwrap();
        journal.append("video-download", 1, "failed").unwrap();
        journal.append("video-download", 2, "succeeded").unwrap();

        let entries = journal.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].stage, "video-download");
        assert_eq!(entries[1].status, "failed");
        assert_eq!(journal.last().unwrap().attempt, 2);
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path().join("journal"));
        assert!(journal.entries().is_empty());
        assert!(journal.last().is_none());
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal");
        std::fs::write(
            &path,
            "garbage\nsetup|1|succeeded|2026-01-01T00:00:00+00:00\nrename|x|failed|nope\n",
        )
        .unwrap();
        let entries = Journal::new(path).entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].stage, "setup");
    }

    #[test]
    fn test_append_to_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path().join("gone").join("journal"));
        assert!(matches!(
            journal.append("setup", 1, "started"),
            Err(SessionError::JournalWriteFailed { .. })
        ));
    }
}
