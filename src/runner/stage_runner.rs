use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::command::{Invocation, build_invocation};
use super::invoker::{AttemptOutcome, StageInvoker};
use super::policy::{FailureClassifier, RetryPolicy};
use crate::build_config::BuildToml;
use crate::errors::StageError;
use crate::session::SessionContext;
use crate::stage::{Stage, StageResult};

/// Runs one stage to a settled [`StageResult`], retrying transient failures.
///
/// Every attempt is a fresh invocation with identical arguments. The caller
/// only ever sees the settled result; retries never leak upward.
pub struct StageRunner {
    invoker: Arc<dyn StageInvoker>,
    settings: Arc<BuildToml>,
    classifier: FailureClassifier,
    verify_artifacts: bool,
    cancel: CancellationToken,
}

impl StageRunner {
    pub fn new(
        invoker: Arc<dyn StageInvoker>,
        settings: Arc<BuildToml>,
        cancel: CancellationToken,
    ) -> Self {
        let classifier = FailureClassifier::from_settings(&settings.retry);
        Self {
            invoker,
            settings,
            classifier,
            verify_artifacts: true,
            cancel,
        }
    }

    /// Trust a zero exit without checking the stage's output artifacts.
    pub fn without_artifact_checks(mut self) -> Self {
        self.verify_artifacts = false;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn run(
        &self,
        stage: Stage,
        session: &SessionContext,
        policy: &RetryPolicy,
    ) -> StageResult {
        let invocation = build_invocation(
            stage,
            &self.settings.tool_for(stage),
            session.config(),
            &self.settings.defaults,
            session.id(),
            session.work_dir(),
        );
        let max_attempts = policy.max_attempts();
        let session_tag = session.id().short();

        tracing::debug!(
            session = %session_tag,
            stage = %stage,
            command = %invocation.display_command(),
            "Invoking stage tool"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            session.record(stage, attempt, "started");

            let outcome = self
                .invoker
                .invoke(&invocation, policy.timeout, &self.cancel)
                .await;
            write_attempt_log(session, &invocation, attempt, &outcome);

            let mut error = self.classifier.classify(stage, &outcome, policy.timeout);
            if error.is_none()
                && self.verify_artifacts
                && let Err(missing) = stage.verify_artifacts(session.work_dir(), session.config())
            {
                error = Some(StageError::Fatal {
                    stage,
                    message: missing,
                });
            }

            let cancelled = outcome == AttemptOutcome::Cancelled;
            let label = match &error {
                None => "succeeded",
                Some(_) if cancelled => "cancelled",
                Some(e) if e.is_retryable() => "transient_failure",
                Some(_) => "fatal_failure",
            };
            tracing::info!(
                session = %session_tag,
                stage = %stage,
                attempt,
                max_attempts,
                outcome = label,
                exit_code = ?outcome.exit_code(),
                "Stage attempt finished"
            );

            let Some(err) = error else {
                session.record(stage, attempt, "succeeded");
                return StageResult::succeeded(stage, attempt);
            };

            if err.is_retryable() && attempt < max_attempts {
                session.record(stage, attempt, "retrying");
                tracing::warn!(
                    session = %session_tag,
                    stage = %stage,
                    attempt,
                    max_attempts,
                    delay_secs = policy.retry_delay.as_secs(),
                    error = %err,
                    "Transient stage failure, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(policy.retry_delay) => {}
                    _ = self.cancel.cancelled() => {
                        session.record(stage, attempt, "cancelled");
                        return StageResult::failed(stage, attempt, "cancelled");
                    }
                }
                continue;
            }

            session.record(stage, attempt, if cancelled { "cancelled" } else { "failed" });
            tracing::error!(
                session = %session_tag,
                stage = %stage,
                attempts = attempt,
                retryable = err.is_retryable(),
                error = %err,
                "Stage failed"
            );
            return StageResult::failed(stage, attempt, err.message());
        }
    }
}

fn write_attempt_log(
    session: &SessionContext,
    invocation: &Invocation,
    attempt: u32,
    outcome: &AttemptOutcome,
) {
    let path = session.attempt_log_path(invocation.stage, attempt);
    let mut text = String::new();
    let _ = writeln!(text, "# stage: {}", invocation.stage);
    let _ = writeln!(text, "# attempt: {}", attempt);
    let _ = writeln!(text, "# command: {}", invocation.display_command());
    let _ = writeln!(text, "# outcome: {}", outcome.label());
    match outcome {
        AttemptOutcome::Exited {
            code,
            stdout,
            stderr,
        } => {
            let _ = writeln!(text, "# exit_code: {:?}", code);
            let _ = writeln!(text, "--- stdout ---\n{}", stdout);
            let _ = writeln!(text, "--- stderr ---\n{}", stderr);
        }
        AttemptOutcome::SpawnFailed { message, .. } => {
            let _ = writeln!(text, "# error: {}", message);
        }
        AttemptOutcome::TimedOut | AttemptOutcome::Cancelled => {}
    }

    if let Err(e) = std::fs::write(&path, text) {
        tracing::warn!(path = %path.display(), error = %e, "Could not write attempt log");
    }
}
