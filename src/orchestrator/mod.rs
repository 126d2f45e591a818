//! Sequences the four stages for one session.
//!
//! The orchestrator walks `Pending(Setup)` through `Done`, asking its gate
//! before each stage and handing runnable stages to the [`StageRunner`]. A
//! failed stage aborts the session: every later stage depends on artifacts
//! the failed one was supposed to produce. Retries are entirely the runner's
//! business; the orchestrator runs each stage at most once.

mod gate;
mod state;

pub use gate::{GateDecision, InteractiveGate, SkipList, StageGate};
pub use state::{PipelineState, StateTrace};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::runner::{RetryPolicy, StageRunner};
use crate::session::{SessionContext, SessionId};
use crate::stage::{Stage, StageResult, StageStatus};
use crate::ui::BuildUI;

/// Why a session ended in `Aborted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    StageFailed { stage: Stage, error: String },
    Cancelled { stage: Option<Stage> },
    UserAborted { stage: Stage },
}

impl AbortReason {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AbortReason::StageFailed { stage, .. } | AbortReason::UserAborted { stage } => {
                Some(*stage)
            }
            AbortReason::Cancelled { stage } => *stage,
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::StageFailed { stage, error } => write!(f, "{} failed: {}", stage, error),
            AbortReason::Cancelled { stage: Some(stage) } => write!(f, "cancelled during {}", stage),
            AbortReason::Cancelled { stage: None } => write!(f, "cancelled"),
            AbortReason::UserAborted { stage } => write!(f, "aborted by user before {}", stage),
        }
    }
}

/// Terminal result of one orchestrated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub trace: StateTrace,
    pub results: Vec<StageResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReason>,
    /// Session temp dir, when it was kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retained_dir: Option<PathBuf>,
}

impl SessionOutcome {
    pub fn final_state(&self) -> PipelineState {
        self.trace.current()
    }

    pub fn is_done(&self) -> bool {
        self.final_state() == PipelineState::Done
    }

    pub fn result_for(&self, stage: Stage) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage == stage)
    }

    /// Last stage that ran or was reached, and its error.
    pub fn last_error(&self) -> Option<(Option<Stage>, String)> {
        let abort = self.abort.as_ref()?;
        let message = match abort {
            AbortReason::StageFailed { error, .. } => error.clone(),
            other => other.to_string(),
        };
        Some((abort.stage(), message))
    }
}

pub struct Orchestrator {
    runner: Arc<StageRunner>,
    policy: RetryPolicy,
    ui: Option<Arc<BuildUI>>,
    keep_session: bool,
}

impl Orchestrator {
    pub fn new(runner: Arc<StageRunner>, policy: RetryPolicy) -> Self {
        Self {
            runner,
            policy,
            ui: None,
            keep_session: false,
        }
    }

    pub fn with_ui(mut self, ui: Arc<BuildUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Keep the session temp dir even after a successful run.
    pub fn keep_session(mut self, keep: bool) -> Self {
        self.keep_session = keep;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.runner.cancel_token()
    }

    /// Drive `session` to a terminal state and close it.
    pub async fn run(
        &self,
        mut session: SessionContext,
        gate: &mut dyn StageGate,
    ) -> SessionOutcome {
        let mut trace = StateTrace::default();
        let mut results = Vec::new();
        let mut abort = None;
        let cancel = self.runner.cancel_token().clone();

        session.activate();
        tracing::info!(
            session = %session.id().short(),
            working_dir = %session.working_dir().display(),
            "Session started"
        );

        while let PipelineState::Pending(stage) = trace.current() {
            if cancel.is_cancelled() {
                abort = Some(AbortReason::Cancelled { stage: Some(stage) });
                trace.transition(PipelineState::Aborted);
                break;
            }

            let decision = match gate.decide(stage) {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!(stage = %stage, error = %e, "Stage gate failed");
                    GateDecision::Abort
                }
            };

            match decision {
                GateDecision::Skip => {
                    session.record(stage, 0, "skipped");
                    tracing::info!(session = %session.id().short(), stage = %stage, "Stage skipped");
                    let result = StageResult::skipped(stage);
                    if let Some(ui) = &self.ui {
                        ui.stage_finished(&result);
                    }
                    results.push(result);
                    trace.transition(PipelineState::Skipped(stage));
                    trace.transition(PipelineState::after(stage));
                }
                GateDecision::Abort => {
                    abort = Some(AbortReason::UserAborted { stage });
                    trace.transition(PipelineState::Aborted);
                }
                GateDecision::Run => {
                    if let Some(ui) = &self.ui {
                        ui.start_stage(stage);
                    }
                    let result = self.runner.run(stage, &session, &self.policy).await;
                    if let Some(ui) = &self.ui {
                        ui.stage_finished(&result);
                    }

                    match result.status {
                        StageStatus::Succeeded => trace.transition(PipelineState::after(stage)),
                        StageStatus::Failed | StageStatus::Skipped => {
                            abort = Some(if cancel.is_cancelled() {
                                AbortReason::Cancelled { stage: Some(stage) }
                            } else {
                                AbortReason::StageFailed {
                                    stage,
                                    error: result.last_error.clone().unwrap_or_default(),
                                }
                            });
                            trace.transition(PipelineState::Aborted);
                        }
                    }
                    results.push(result);
                }
            }
        }

        let done = trace.current() == PipelineState::Done;
        match (&abort, &self.ui) {
            (Some(reason), Some(ui)) => ui.aborted(&reason.to_string()),
            (None, Some(ui)) => ui.done(),
            _ => {}
        }
        if let Some(reason) = &abort {
            tracing::error!(
                session = %session.id().short(),
                reason = %reason,
                states = %trace.render(),
                "Session aborted"
            );
        } else {
            tracing::info!(
                session = %session.id().short(),
                states = %trace.render(),
                "Session done"
            );
        }

        let keep = !done || self.keep_session;
        session.close(keep);

        SessionOutcome {
            session_id: session.id(),
            trace,
            results,
            abort,
            retained_dir: keep.then(|| session.temp_dir().to_path_buf()),
        }
    }
}
