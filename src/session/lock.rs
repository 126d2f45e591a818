//! Advisory working-directory lock.
//!
//! Each session locks a file keyed by its working directory. A second live
//! session on the same working directory cannot take the lock, which is how
//! an isolation violation is detected. Locks are released when the
//! [`SessionLock`] is dropped, including when the holding process dies.

use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::errors::SessionError;

/// An acquired exclusive lock on a working directory.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Try to take the lock at `lock_path`, recording `holder` in the file.
    ///
    /// Fails with [`SessionError::IsolationViolation`] if another session holds it.
    pub fn acquire(lock_path: &Path, holder: &str) -> Result<Self, SessionError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SessionError::TempDirCreateFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(|source| SessionError::TempDirCreateFailed {
                path: lock_path.to_path_buf(),
                source,
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(SessionError::IsolationViolation {
                path: lock_path.to_path_buf(),
            });
        }

        // Holder id is informational only.
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", holder);

        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a live [`SessionLock`] currently holds `lock_path`. A missing
    /// file is never held.
    pub fn is_held(lock_path: &Path) -> bool {
        let Ok(file) = OpenOptions::new().read(true).write(true).open(lock_path) else {
            return false;
        };
        if file.try_lock_exclusive().is_err() {
            return true;
        }
        let _ = FileExt::unlock(&file);
        false
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Lock file path for a working directory, under the work dir's `.zume/locks`.
///
/// The file is named by a SHA-256 digest of the normalised directory path, so
/// distinct directories never share a lock and `en`, `./en` and `x/../en` all
/// map to the same one. The lock never creates anything inside the directory
/// it guards.
pub fn lock_path_for(locks_dir: &Path, working_dir: &Path) -> PathBuf {
    let absolute = std::path::absolute(working_dir).unwrap_or_else(|_| working_dir.to_path_buf());
    let dir = resolve_parent(&normalize(&absolute));
    let mut hasher = Sha256::new();
    hasher.update(dir.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let label: String = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let name = if label.is_empty() {
        digest
    } else {
        format!("{}-{}", label, digest)
    };
    locks_dir.join(format!("{}.lock", name))
}

/// Lexically drop `.` components and fold `..` into the preceding component.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve symlinks in the parent when it exists. The directory itself may
/// not exist until setup creates it.
fn resolve_parent(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            match std::fs::canonicalize(parent) {
                Ok(parent) => parent.join(name),
                Err(_) => path.to_path_buf(),
            }
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_lock_on_same_path_is_violation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locks").join("builds_en.lock");

        let first = SessionLock::acquire(&path, "session-a").unwrap();
        let second = SessionLock::acquire(&path, "session-b");
        assert!(matches!(
            second,
            Err(SessionError::IsolationViolation { .. })
        ));

        drop(first);
        assert!(SessionLock::acquire(&path, "session-b").is_ok());
    }

    #[test]
    fn test_distinct_working_dirs_get_distinct_locks() {
        let locks = Path::new("/w/.zume/locks");
        let en = lock_path_for(locks, Path::new("/builds/en"));
        let es = lock_path_for(locks, Path::new("/builds/es"));
        assert_ne!(en, es);
        assert_eq!(en.parent(), Some(locks));
        let name = en.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("en-") && name.ends_with(".lock"));
    }

    #[test]
    fn test_similar_names_do_not_share_a_lock() {
        let locks = Path::new("/w/.zume/locks");
        assert_ne!(
            lock_path_for(locks, Path::new("/builds/pt-br")),
            lock_path_for(locks, Path::new("/builds/pt_br"))
        );
        assert_ne!(
            lock_path_for(locks, Path::new("/builds/a/b")),
            lock_path_for(locks, Path::new("/builds/a_b"))
        );
    }

    #[test]
    fn test_equivalent_spellings_share_a_lock() {
        let dir = tempdir().unwrap();
        let locks = dir.path().join("locks");
        let plain = lock_path_for(&locks, &dir.path().join("en"));
        assert_eq!(plain, lock_path_for(&locks, &dir.path().join(".").join("en")));
        assert_eq!(
            plain,
            lock_path_for(&locks, &dir.path().join("other").join("..").join("en"))
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("./en")), PathBuf::from("en"));
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize(Path::new("../en")), PathBuf::from("../en"));
    }

    #[test]
    fn test_is_held_tracks_live_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.lock");
        assert!(!SessionLock::is_held(&path));

        let lock = SessionLock::acquire(&path, "abc123").unwrap();
        assert!(SessionLock::is_held(&path));
        drop(lock);
        assert!(!SessionLock::is_held(&path));
    }

    #[test]
    fn test_lock_records_holder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.lock");
        let lock = SessionLock::acquire(&path, "abc123").unwrap();
        assert_eq!(lock.path(), path.as_path());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "abc123");
    }
}
