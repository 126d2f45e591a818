//! Typed error hierarchy for the build orchestrator.
//!
//! Three enums cover the three places a build can go wrong:
//! - `ConfigError`: configuration could not be resolved; fatal before any stage runs
//! - `StageError`: classification of one failed stage attempt (fatal or transient)
//! - `SessionError`: the session's isolation context could not be set up or kept

use std::path::PathBuf;
use thiserror::Error;

use crate::stage::Stage;

/// Errors from configuration resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration '{key}' for stage {stage}")]
    MissingRequiredConfig { key: String, stage: Stage },

    #[error("Invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read legacy config file at {path}: {message}")]
    LegacyFileUnreadable { path: PathBuf, message: String },

    #[error("Invalid settings file {path}: {message}")]
    SettingsFile { path: PathBuf, message: String },
}

/// Classification of a single failed stage attempt.
///
/// The runner retries `Transient` failures and settles immediately on `Fatal`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("{stage} failed: {message}")]
    Fatal { stage: Stage, message: String },

    #[error("{stage} failed (transient): {message}")]
    Transient { stage: Stage, message: String },
}

impl StageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Transient { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            StageError::Fatal { message, .. } | StageError::Transient { message, .. } => message,
        }
    }
}

/// Errors from session setup and teardown.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Working directory {path} is unavailable: {source}")]
    WorkingDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create session temp dir at {path}: {source}")]
    TempDirCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write session journal at {path}: {source}")]
    JournalWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Another session holds the working directory lock at {path}")]
    IsolationViolation { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_config_names_key_and_stage() {
        let err = ConfigError::MissingRequiredConfig {
            key: "vimeo_folder_id".to_string(),
            stage: Stage::VideoDownload,
        };
        let msg = err.to_string();
        assert!(msg.contains("vimeo_folder_id"));
        assert!(msg.contains("video-download"));
    }

    #[test]
    fn stage_error_retryable_only_when_transient() {
        let fatal = StageError::Fatal {
            stage: Stage::Setup,
            message: "bad language".into(),
        };
        let transient = StageError::Transient {
            stage: Stage::Setup,
            message: "connection reset".into(),
        };
        assert!(!fatal.is_retryable());
        assert!(transient.is_retryable());
        assert_eq!(transient.message(), "connection reset");
    }

    #[test]
    fn session_error_isolation_violation_carries_path() {
        let path = PathBuf::from("/work/.zume/locks/builds_en.lock");
        let err = SessionError::IsolationViolation { path: path.clone() };
        match &err {
            SessionError::IsolationViolation { path: p } => assert_eq!(p, &path),
            _ => panic!("Expected IsolationViolation"),
        }
        assert!(err.to_string().contains("builds_en.lock"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ConfigError::InvalidValue {
            key: "zoom".into(),
            value: "x".into(),
            reason: "not a number".into(),
        });
        assert_std_error(&StageError::Fatal {
            stage: Stage::Rename,
            message: "x".into(),
        });
        assert_std_error(&SessionError::IsolationViolation {
            path: PathBuf::from("/tmp"),
        });
    }
}
