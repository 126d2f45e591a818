//! Per-stage run/skip decisions.

use anyhow::Result;
use dialoguer::{Select, theme::ColorfulTheme};
use std::collections::BTreeSet;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    Skip,
    Abort,
}

/// Decides, before each pending stage, whether it runs.
pub trait StageGate: Send {
    fn decide(&mut self, stage: Stage) -> Result<GateDecision>;
}

/// Skips a fixed set of stages and runs the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipList {
    skipped: BTreeSet<Stage>,
}

impl SkipList {
    pub fn new(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            skipped: stages.into_iter().collect(),
        }
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.skipped.contains(&stage)
    }

    /// Stages that will run, in pipeline order.
    pub fn active_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .iter()
            .copied()
            .filter(|s| !self.contains(*s))
            .collect()
    }
}

impl StageGate for SkipList {
    fn decide(&mut self, stage: Stage) -> Result<GateDecision> {
        Ok(if self.contains(stage) {
            GateDecision::Skip
        } else {
            GateDecision::Run
        })
    }
}

/// Asks the user before each stage, after applying a skip list.
pub struct InteractiveGate {
    skip: SkipList,
    run_remaining: bool,
}

impl InteractiveGate {
    pub fn new(skip: SkipList) -> Self {
        Self {
            skip,
            run_remaining: false,
        }
    }

    fn prompt(&mut self, stage: Stage) -> Result<GateDecision> {
        let options = &[
            "Run this stage",
            "Run this and all remaining stages",
            "Skip this stage",
            "Abort build",
        ];

        let selection = blocking(|| {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("Stage {}: {}?", stage.ordinal(), stage.label()))
                .items(options)
                .default(0)
                .interact()
        })?;

        match selection {
            0 => Ok(GateDecision::Run),
            1 => {
                self.run_remaining = true;
                Ok(GateDecision::Run)
            }
            2 => Ok(GateDecision::Skip),
            _ => Ok(GateDecision::Abort),
        }
    }
}

/// Run a blocking terminal prompt without stalling other tasks on a
/// multi-threaded runtime. Elsewhere it runs in place.
fn blocking<T>(prompt: impl FnOnce() -> T) -> T {
    let multi_thread = Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if multi_thread {
        tokio::task::block_in_place(prompt)
    } else {
        prompt()
    }
}

impl StageGate for InteractiveGate {
    fn decide(&mut self, stage: Stage) -> Result<GateDecision> {
        if self.skip.contains(stage) {
            return Ok(GateDecision::Skip);
        }
        if self.run_remaining {
            return Ok(GateDecision::Run);
        }
        self.prompt(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_outside_runtime() {
        assert_eq!(blocking(|| 7), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_on_multi_thread_runtime() {
        let ticker = tokio::spawn(async { tokio::time::sleep(std::time::Duration::from_millis(10)).await });
        let value = blocking(|| {
            std::thread::sleep(std::time::Duration::from_millis(50));
            "answer"
        });
        assert_eq!(value, "answer");
        ticker.await.unwrap();
    }

    #[test]
    fn test_skip_list_decisions() {
        let mut gate = SkipList::new([Stage::VideoDownload, Stage::Rename]);
        assert_eq!(gate.decide(Stage::Setup).unwrap(), GateDecision::Run);
        assert_eq!(gate.decide(Stage::VideoDownload).unwrap(), GateDecision::Skip);
        assert_eq!(
            gate.active_stages(),
            vec![Stage::Setup, Stage::SlidesDownload]
        );
    }

    #[test]
    fn test_interactive_gate_honours_skip_list_without_prompting() {
        let mut gate = InteractiveGate::new(SkipList::new([Stage::Setup]));
        assert_eq!(gate.decide(Stage::Setup).unwrap(), GateDecision::Skip);
    }

    #[test]
    fn test_interactive_gate_run_remaining_skips_prompt() {
        let mut gate = InteractiveGate::new(SkipList::default());
        gate.run_remaining = true;
        assert_eq!(gate.decide(Stage::Rename).unwrap(), GateDecision::Run);
    }
}
