//! Retry policy and failure classification.

use std::time::Duration;

use super::invoker::AttemptOutcome;
use crate::build_config::{BuildToml, RetrySection};
use crate::errors::StageError;
use crate::stage::Stage;

/// How many times, and how patiently, a stage is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout: Duration::from_secs(3600),
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &BuildToml) -> Self {
        Self {
            max_retries: settings.defaults.max_retries,
            timeout: settings.timeout(),
            retry_delay: settings.retry_delay(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Maps a failed attempt to a fatal or transient [`StageError`].
///
/// Fatal: a listed exit code, a listed marker anywhere in the tool's stdout or
/// stderr, or a tool that cannot be found. Transient: any other non-zero exit,
/// death by signal, and timeouts.
///
/// The stage tools report validation errors on stdout, so both streams are
/// searched. An interactive attempt inherits the terminal and captures
/// nothing, leaving only the exit-code convention.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    fatal_exit_codes: Vec<i32>,
    fatal_markers: Vec<String>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::from_settings(&RetrySection::default())
    }
}

impl FailureClassifier {
    pub fn from_settings(retry: &RetrySection) -> Self {
        Self {
            fatal_exit_codes: retry.fatal_exit_codes.clone(),
            fatal_markers: retry.fatal_markers.clone(),
        }
    }

    /// Classify an attempt. Returns `None` for a successful exit.
    ///
    /// A cancelled attempt is reported as fatal so that it is never retried.
    pub fn classify(
        &self,
        stage: Stage,
        outcome: &AttemptOutcome,
        timeout: Duration,
    ) -> Option<StageError> {
        let fatal = |message: String| StageError::Fatal { stage, message };
        let transient = |message: String| StageError::Transient { stage, message };

        match outcome {
            AttemptOutcome::Exited { code: Some(0), .. } => None,
            AttemptOutcome::Exited {
                code,
                stdout,
                stderr,
            } => {
                let marker_line = self.marker_line(stderr).or_else(|| self.marker_line(stdout));
                let detail = marker_line
                    .clone()
                    .or_else(|| error_detail(stderr))
                    .or_else(|| error_detail(stdout));
                let message = match (code, &detail) {
                    (Some(c), Some(d)) => format!("exit code {}: {}", c, d),
                    (Some(c), None) => format!("exit code {}", c),
                    (None, Some(d)) => format!("terminated by signal: {}", d),
                    (None, None) => "terminated by signal".to_string(),
                };
                let fatal_code = code.is_some_and(|c| self.fatal_exit_codes.contains(&c));
                if fatal_code || marker_line.is_some() {
                    Some(fatal(message))
                } else {
                    Some(transient(message))
                }
            }
            AttemptOutcome::TimedOut => Some(transient(format!(
                "timed out after {}s",
                timeout.as_secs()
            ))),
            AttemptOutcome::Cancelled => Some(fatal("cancelled".to_string())),
            AttemptOutcome::SpawnFailed { message, not_found } => {
                if *not_found {
                    Some(fatal(message.clone()))
                } else {
                    Some(transient(message.clone()))
                }
            }
        }
    }

    /// First output line carrying a fatal marker.
    fn marker_line(&self, output: &str) -> Option<String> {
        output
            .lines()
            .map(str::trim)
            .find(|line| {
                self.fatal_markers
                    .iter()
                    .any(|m| !m.is_empty() && line.contains(m.as_str()))
            })
            .map(bounded)
    }
}

const MAX_DETAIL_CHARS: usize = 500;

fn bounded(text: &str) -> String {
    if text.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = text.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Last meaningful output lines, bounded in size.
fn error_detail(output: &str) -> Option<String> {
    const MAX_LINES: usize = 3;

    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }
    let tail = lines[lines.len().saturating_sub(MAX_LINES)..].join(" | ");
    Some(bounded(&tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(60);

    #[test]
    fn test_success_is_not_an_error() {
        let c = FailureClassifier::default();
        assert!(c.classify(Stage::Setup, &AttemptOutcome::success(), T).is_none());
    }

    #[test]
    fn test_fatal_exit_code() {
        let c = FailureClassifier::default();
        let err = c
            .classify(Stage::Setup, &AttemptOutcome::exit(2, "usage: setup"), T)
            .unwrap();
        assert!(!err.is_retryable());
        assert_eq!(err.message(), "exit code 2: usage: setup");
    }

    #[test]
    fn test_fatal_marker_beats_ordinary_exit_code() {
        let c = FailureClassifier::default();
        let outcome = AttemptOutcome::exit(1, "Error: Invalid configuration: bad language");
        assert!(!c.classify(Stage::Setup, &outcome, T).unwrap().is_retryable());
    }

    #[test]
    fn test_marker_on_stdout_is_fatal() {
        let c = FailureClassifier::default();
        let outcome = AttemptOutcome::printed(
            1,
            "Downloading videos...\nError: No folder found for language code 'xx' in vimeo-folders.json\nDone.",
        );
        let err = c.classify(Stage::VideoDownload, &outcome, T).unwrap();
        assert!(!err.is_retryable());
        assert_eq!(
            err.message(),
            "exit code 1: Error: No folder found for language code 'xx' in vimeo-folders.json"
        );
    }

    #[test]
    fn test_stdout_tail_used_when_stderr_is_empty() {
        let c = FailureClassifier::default();
        let outcome = AttemptOutcome::printed(1, "step one\nupload interrupted\n");
        let err = c.classify(Stage::SlidesDownload, &outcome, T).unwrap();
        assert!(err.is_retryable());
        assert_eq!(err.message(), "exit code 1: step one | upload interrupted");
    }

    #[test]
    fn test_other_failures_are_transient() {
        let c = FailureClassifier::default();
        let network = AttemptOutcome::exit(1, "ConnectionResetError: peer reset");
        assert!(c.classify(Stage::VideoDownload, &network, T).unwrap().is_retryable());

        let timeout = c
            .classify(Stage::VideoDownload, &AttemptOutcome::TimedOut, T)
            .unwrap();
        assert!(timeout.is_retryable());
        assert_eq!(timeout.message(), "timed out after 60s");

        let signal = AttemptOutcome::Exited {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(c.classify(Stage::Rename, &signal, T).unwrap().is_retryable());
    }

    #[test]
    fn test_spawn_not_found_is_fatal() {
        let c = FailureClassifier::default();
        let outcome = AttemptOutcome::SpawnFailed {
            message: "no such file".into(),
            not_found: true,
        };
        assert!(!c.classify(Stage::Setup, &outcome, T).unwrap().is_retryable());
    }

    #[test]
    fn test_custom_convention() {
        let c = FailureClassifier::from_settings(&RetrySection {
            fatal_exit_codes: vec![9],
            fatal_markers: vec![],
        });
        assert!(!c.classify(Stage::Setup, &AttemptOutcome::exit(9, ""), T).unwrap().is_retryable());
        assert!(c.classify(Stage::Setup, &AttemptOutcome::exit(2, ""), T).unwrap().is_retryable());
    }

    #[test]
    fn test_error_detail_keeps_tail() {
        let detail = error_detail("a\n\nb\nc\nd\n").unwrap();
        assert_eq!(detail, "b | c | d");
        assert!(error_detail("  \n").is_none());
    }

    #[test]
    fn test_policy_from_settings() {
        let mut settings = BuildToml::default();
        settings.defaults.max_retries = 4;
        settings.defaults.timeout_secs = 10;
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.timeout, Duration::from_secs(10));
    }
}
