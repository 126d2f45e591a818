//! Batch builds (`zume-build batch`).

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use zume_build::batch::{BatchCoordinator, BatchRun, TrainingType, combinations};
use zume_build::config::{CliArgs, ConfigSources, LEGACY_CONFIG_FILE};
use zume_build::orchestrator::{Orchestrator, SkipList};
use zume_build::ui::BuildUI;
use zume_build::ui::icons::{CHECK, CLOCK, CROSS, FOLDER, REPORT};

use super::super::{RunOptions, StageOptions};

/// Batch log written alongside the packages in the output directory.
pub const BATCH_LOG_FILE: &str = "batch_build.log";

/// Everything `batch` was asked to do.
pub struct BatchRequest<'a> {
    pub types: &'a [TrainingType],
    pub languages: &'a [String],
    pub output_dir: &'a Path,
    pub stage: &'a StageOptions,
    pub run: &'a RunOptions,
}

pub async fn cmd_batch(
    work_dir: &Path,
    verbose: bool,
    request: BatchRequest<'_>,
    cancel: CancellationToken,
) -> Result<()> {
    let settings = super::load_settings(work_dir)?;
    let skip = SkipList::new(request.run.skip.iter().copied());
    let active = skip.active_stages();
    super::preflight(work_dir, &settings, &active)?;

    let output_dir = super::resolve_dir(work_dir, request.output_dir);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut args = CliArgs::new();
    super::stage_cli_args(request.stage, &mut args);
    super::check_credentials(work_dir, &mut args, &active);
    let shared = ConfigSources::new(
        args,
        super::capture_env(),
        Some(work_dir.join(LEGACY_CONFIG_FILE)),
    );

    let policy = super::retry_policy(&settings, request.run);
    let orchestrator = Orchestrator::new(super::process_runner(settings, cancel), policy)
        .with_ui(Arc::new(BuildUI::new(verbose)))
        .keep_session(request.run.keep_session);
    let coordinator = BatchCoordinator::new(
        orchestrator,
        super::resolver(work_dir, &active),
        work_dir,
        skip,
    );

    let combos = combinations(request.types, request.languages);
    println!(
        "{}Building {} combination(s) into {}",
        REPORT,
        combos.len(),
        output_dir.display()
    );

    let run = coordinator.run_batch(&combos, &shared, &output_dir).await;
    let report_path = run.write_report(&output_dir.join("reports"))?;
    log_summary(&run);
    print_summary(&run, &output_dir, &report_path, &rerun_args(&request));

    if !run.all_succeeded() {
        anyhow::bail!(
            "{} of {} combination(s) failed",
            run.failed_combinations().len(),
            combos.len()
        );
    }
    Ok(())
}

/// Flags that make a re-run command reproduce this batch's settings.
fn rerun_args(request: &BatchRequest<'_>) -> Vec<String> {
    let mut args = vec![
        "--output-dir".to_string(),
        request.output_dir.display().to_string(),
    ];
    for stage in &request.run.skip {
        args.push("--skip".to_string());
        args.push(stage.name().to_string());
    }
    args
}

fn log_summary(run: &BatchRun) {
    let summary = run.summary();
    tracing::info!(
        run_id = %run.run_id,
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        duration_secs = summary.duration_secs,
        "Batch finished"
    );
    if !summary.failures.is_empty() {
        let failed: Vec<String> = summary
            .failures
            .iter()
            .map(|f| f.combination.to_string())
            .collect();
        tracing::error!(failed = ?failed, "Failed combinations");
    }
}

fn print_summary(run: &BatchRun, output_dir: &Path, report_path: &Path, rerun_args: &[String]) {
    let summary = run.summary();
    println!();
    println!("{}", style("Batch summary").bold());
    println!("  Total:     {}", summary.total);
    println!("  {}Succeeded: {}", CHECK, style(summary.succeeded).green());
    println!("  {}Failed:    {}", CROSS, style(summary.failed).red());
    println!(
        "  {}Duration:  {}",
        CLOCK,
        super::format_duration(summary.duration_secs)
    );

    if !summary.failures.is_empty() {
        println!();
        println!("{}", style("Failed combinations").red().bold());
        for failure in &summary.failures {
            match failure.stage {
                Some(stage) => println!(
                    "  {} [{}]: {}",
                    failure.combination,
                    stage,
                    failure.error
                ),
                None => println!("  {}: {}", failure.combination, failure.error),
            }
        }
        println!();
        println!("Re-run the failures with:");
        for command in run.rerun_commands(rerun_args) {
            println!("  {}", style(command).cyan());
        }
    }

    println!();
    println!("  {}Output: {}", FOLDER, output_dir.display());
    println!("  {}Report: {}", REPORT, report_path.display());
}
