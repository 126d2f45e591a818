//! Single package build (`zume-build build`).

use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use zume_build::batch::TrainingType;
use zume_build::config::{CliArgs, ConfigKey, ConfigSources, LEGACY_CONFIG_FILE};
use zume_build::orchestrator::{InteractiveGate, Orchestrator, SessionOutcome, SkipList, StageGate};
use zume_build::session::SessionContext;
use zume_build::ui::BuildUI;
use zume_build::ui::icons::{CHECK, CROSS, FOLDER};

use super::super::{RunOptions, StageOptions};

/// What to build, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct BuildTarget {
    pub project_path: Option<PathBuf>,
    pub language: Option<String>,
    pub folder: Option<PathBuf>,
    pub training_type: Option<TrainingType>,
}

impl BuildTarget {
    pub fn apply(&self, cli: &mut CliArgs) {
        cli.set_opt(
            ConfigKey::ProjectPath,
            self.project_path.as_ref().map(|p| p.display()),
        );
        cli.set_opt(ConfigKey::LanguageCode, self.language.as_ref());
        cli.set_opt(
            ConfigKey::FolderLocation,
            self.folder.as_ref().map(|p| p.display()),
        );
        cli.set_opt(ConfigKey::TrainingType, self.training_type);
    }
}

pub async fn cmd_build(
    work_dir: &Path,
    verbose: bool,
    target: BuildTarget,
    stage: &StageOptions,
    run: &RunOptions,
    interactive: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let settings = super::load_settings(work_dir)?;
    let skip = SkipList::new(run.skip.iter().copied());
    let active = skip.active_stages();
    super::preflight(work_dir, &settings, &active)?;

    let mut args = CliArgs::new();
    target.apply(&mut args);
    super::stage_cli_args(stage, &mut args);
    super::check_credentials(work_dir, &mut args, &active);

    let sources = ConfigSources::new(
        args,
        super::capture_env(),
        Some(work_dir.join(LEGACY_CONFIG_FILE)),
    );
    let config = sources.resolve(&super::resolver(work_dir, &active))?;
    let session = SessionContext::create(work_dir, config)?;

    let ui = Arc::new(BuildUI::new(verbose));
    ui.session_header(&session.id().short(), &describe(&session));

    let policy = super::retry_policy(&settings, run);
    let orchestrator = Orchestrator::new(super::process_runner(settings, cancel), policy)
        .with_ui(ui)
        .keep_session(run.keep_session);

    let mut gate: Box<dyn StageGate> = if interactive {
        Box::new(InteractiveGate::new(skip))
    } else {
        Box::new(skip)
    };
    let outcome = orchestrator.run(session, gate.as_mut()).await;
    print_outcome(&outcome);

    match &outcome.abort {
        Some(reason) => anyhow::bail!("Build aborted: {}", reason),
        None => Ok(()),
    }
}

fn describe(session: &SessionContext) -> String {
    let config = session.config();
    let mut parts = Vec::new();
    if let Some(lang) = config.get(ConfigKey::LanguageCode) {
        parts.push(format!("lang={}", lang));
    }
    if let Some(t) = config.get(ConfigKey::TrainingType) {
        parts.push(format!("type={}", t));
    }
    parts.push(format!("dir={}", session.working_dir().display()));
    parts.join(" ")
}

fn print_outcome(outcome: &SessionOutcome) {
    println!();
    if outcome.is_done() {
        println!("{}{}", CHECK, style("Build complete").green().bold());
    } else {
        println!("{}{}", CROSS, style("Build aborted").red().bold());
        if let Some((stage, error)) = outcome.last_error() {
            if let Some(stage) = stage {
                println!("  Stage: {}", stage);
            }
            println!("  Error: {}", error);
        }
    }
    println!("  States: {}", style(outcome.trace.render()).dim());
    if let Some(dir) = &outcome.retained_dir {
        println!("  {}Session files: {}", FOLDER, dir.display());
    }
}
