use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Pipeline state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    Pending(Stage),
    Skipped(Stage),
    Done,
    Aborted,
}

impl PipelineState {
    pub fn initial() -> Self {
        PipelineState::Pending(Stage::first())
    }

    /// State that follows a settled (succeeded or skipped) stage.
    pub fn after(stage: Stage) -> Self {
        stage
            .next()
            .map(PipelineState::Pending)
            .unwrap_or(PipelineState::Done)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Pending(s) => write!(f, "Pending({})", s),
            PipelineState::Skipped(s) => write!(f, "Skipped({})", s),
            PipelineState::Done => write!(f, "Done"),
            PipelineState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Ordered record of every state a session passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTrace {
    states: Vec<PipelineState>,
}

impl Default for StateTrace {
    fn default() -> Self {
        Self {
            states: vec![PipelineState::initial()],
        }
    }
}

impl StateTrace {
    pub fn current(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or_else(PipelineState::initial)
    }

    /// Move to `next`. Transitions out of a terminal state are ignored.
    pub fn transition(&mut self, next: PipelineState) {
        let current = self.current();
        if current.is_terminal() {
            tracing::warn!(from = %current, to = %next, "Ignoring transition out of terminal state");
            return;
        }
        tracing::debug!(from = %current, to = %next, "Pipeline transition");
        self.states.push(next);
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    /// `Pending(setup) -> Pending(video-download) -> Aborted`
    pub fn render(&self) -> String {
        self.states
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_after_last_stage_is_done() {
        assert_eq!(
            PipelineState::after(Stage::Setup),
            PipelineState::Pending(Stage::VideoDownload)
        );
        assert_eq!(PipelineState::after(Stage::Rename), PipelineState::Done);
    }

    #[test]
    fn test_terminal_states_absorb() {
        let mut trace = StateTrace::default();
        trace.transition(PipelineState::Aborted);
        trace.transition(PipelineState::Pending(Stage::Rename));
        assert_eq!(trace.current(), PipelineState::Aborted);
        assert_eq!(trace.states().len(), 2);
    }

    #[test]
    fn test_render() {
        let mut trace = StateTrace::default();
        trace.transition(PipelineState::Skipped(Stage::Setup));
        trace.transition(PipelineState::Pending(Stage::VideoDownload));
        assert_eq!(
            trace.render(),
            "Pending(setup) -> Skipped(setup) -> Pending(video-download)"
        );
    }
}
