use std::path::{Path, PathBuf};
use std::time::Instant;

use super::report::{BatchRun, CombinationReport};
use super::Combination;
use crate::config::{ConfigKey, ConfigResolver, ConfigSources};
use crate::orchestrator::{Orchestrator, SkipList};
use crate::session::SessionContext;

/// Runs one orchestrated session per combination, in order.
///
/// A failing combination never stops the batch: configuration errors,
/// session setup errors and aborted pipelines are all recorded against that
/// combination and the next one starts. Only cancellation ends a batch early.
pub struct BatchCoordinator {
    orchestrator: Orchestrator,
    resolver: ConfigResolver,
    work_dir: PathBuf,
    skip: SkipList,
}

impl BatchCoordinator {
    pub fn new(
        orchestrator: Orchestrator,
        resolver: ConfigResolver,
        work_dir: impl Into<PathBuf>,
        skip: SkipList,
    ) -> Self {
        Self {
            orchestrator,
            resolver,
            work_dir: work_dir.into(),
            skip,
        }
    }

    /// Overlay a combination onto the shared sources at CLI precedence.
    ///
    /// Each combination gets `<output_dir>/<type>/<lang>` as its project path,
    /// which keeps working directories disjoint across combinations.
    pub fn sources_for(
        shared: &ConfigSources,
        combination: &Combination,
        output_dir: &Path,
    ) -> ConfigSources {
        let mut sources = shared.clone();
        let type_dir = output_dir.join(combination.training_type.as_str());
        let cli = &mut sources.cli;
        cli.set(ConfigKey::TrainingType, combination.training_type.as_str());
        cli.set(ConfigKey::LanguageCode, combination.language.clone());
        cli.set(ConfigKey::FolderLocation, type_dir.to_string_lossy());
        cli.set(
            ConfigKey::ProjectPath,
            type_dir
                .join(combination.language.to_lowercase())
                .to_string_lossy(),
        );
        sources
    }

    pub async fn run_batch(
        &self,
        combinations: &[Combination],
        shared: &ConfigSources,
        output_dir: &Path,
    ) -> BatchRun {
        let mut run = BatchRun::new(combinations.to_vec());
        let total = combinations.len();
        let cancel = self.orchestrator.cancel_token().clone();

        tracing::info!(
            run_id = %run.run_id,
            total,
            output_dir = %output_dir.display(),
            "Starting batch build"
        );

        for (index, combination) in combinations.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(combination = %combination, "Batch cancelled, combination not run");
                run.record(CombinationReport::not_started(
                    combination.clone(),
                    "not run: batch cancelled",
                ));
                continue;
            }

            tracing::info!(
                progress = format!("{}/{}", index + 1, total),
                combination = %combination,
                "Building combination"
            );
            let report = self.run_one(combination, shared, output_dir).await;
            if report.succeeded() {
                tracing::info!(combination = %combination, duration_secs = report.duration_secs, "Combination succeeded");
            } else {
                tracing::error!(
                    combination = %combination,
                    stage = ?report.failed_stage,
                    error = report.error.as_deref().unwrap_or_default(),
                    "Combination failed"
                );
            }
            run.record(report);
        }

        run.finish();
        run
    }

    async fn run_one(
        &self,
        combination: &Combination,
        shared: &ConfigSources,
        output_dir: &Path,
    ) -> CombinationReport {
        let started = Instant::now();
        let sources = Self::sources_for(shared, combination, output_dir);

        let config = match sources.resolve(&self.resolver) {
            Ok(config) => config,
            Err(e) => return CombinationReport::not_started(combination.clone(), e.to_string()),
        };
        let session = match SessionContext::create(&self.work_dir, config) {
            Ok(session) => session,
            Err(e) => return CombinationReport::not_started(combination.clone(), e.to_string()),
        };

        let mut gate = self.skip.clone();
        let outcome = self.orchestrator.run(session, &mut gate).await;
        CombinationReport::from_outcome(
            combination.clone(),
            outcome,
            started.elapsed().as_secs_f64(),
        )
    }
}
