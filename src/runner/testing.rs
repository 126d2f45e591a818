//! Scripted [`StageInvoker`] double for unit tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::command::Invocation;
use super::invoker::{AttemptOutcome, StageInvoker};
use crate::stage::Stage;

type Responder = dyn Fn(&Invocation, u32) -> AttemptOutcome + Send + Sync;

/// Answers each invocation from a closure and records every call.
///
/// The closure receives the invocation and how many times that stage has
/// been invoked before (0 on the first call).
pub struct ScriptedInvoker {
    respond: Box<Responder>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedInvoker {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&Invocation, u32) -> AttemptOutcome + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_succeeds() -> Self {
        Self::new(|_, _| AttemptOutcome::success())
    }

    /// Every stage succeeds except `stage`, which always returns `outcome`.
    pub fn failing(stage: Stage, outcome: AttemptOutcome) -> Self {
        Self::new(move |inv, _| {
            if inv.stage == stage {
                outcome.clone()
            } else {
                AttemptOutcome::success()
            }
        })
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage: Stage) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.stage == stage)
            .count()
    }

    pub fn invoked_stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self.calls.lock().unwrap().iter().map(|c| c.stage).collect();
        stages.dedup();
        stages
    }
}

#[async_trait]
impl StageInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        invocation: &Invocation,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }
        let previous = self.calls_for(invocation.stage) as u32;
        self.calls.lock().unwrap().push(invocation.clone());
        (self.respond)(invocation, previous)
    }
}

/// A session over `work_dir` with `project_path = <work_dir>/<lang>`.
pub fn session_for(work_dir: &std::path::Path, lang: &str) -> crate::session::SessionContext {
    use crate::config::{CliArgs, ConfigKey, ConfigResolver, Environment};

    let cli = CliArgs::new()
        .with(ConfigKey::LanguageCode, lang)
        .with(ConfigKey::FolderLocation, work_dir.to_string_lossy())
        .with(ConfigKey::VimeoFolderId, "12345");
    let config = ConfigResolver::new()
        .requiring(&Stage::ALL)
        .resolve(&cli, &Environment::new(), None)
        .unwrap();
    crate::session::SessionContext::create(work_dir, config).unwrap()
}
