//! CLI command implementations.
//!
//! | Module     | Commands handled      |
//! |------------|-----------------------|
//! | `build`    | `Build`               |
//! | `batch`    | `Batch`               |
//! | `config`   | `Config Show`, `Init` |
//! | `sessions` | `Sessions List/Clean` |
//!
//! The helpers below are shared by `build` and `batch`: settings loading,
//! preflight checks, and turning CLI flags into resolver input.

pub mod batch;
pub mod build;
pub mod config;
pub mod sessions;

pub use batch::cmd_batch;
pub use build::cmd_build;
pub use config::cmd_config;
pub use sessions::cmd_sessions;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use zume_build::build_config::{BuildToml, SETTINGS_FILE, settings_dir};
use zume_build::config::{CliArgs, ConfigKey, ConfigResolver, Environment};
use zume_build::credentials::{ENV_FILE, missing_credentials};
use zume_build::errors::ConfigError;
use zume_build::runner::{ProcessInvoker, RetryPolicy, StageRunner};
use zume_build::stage::Stage;
use zume_build::ui::icons::WARN;
use zume_build::vimeo_folders::VimeoFolderMap;

use super::{RunOptions, StageOptions};

/// Curriculum definitions the rename tool organises output by.
pub const CURRICULUM_FILES: [&str; 3] = ["10.json", "20.json", "intensive.json"];

/// `path` relative to `work_dir` unless it is already absolute.
pub fn resolve_dir(work_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        work_dir.join(path)
    }
}

pub fn capture_env() -> Environment {
    std::env::vars().collect()
}

pub fn load_settings(work_dir: &Path) -> Result<BuildToml> {
    BuildToml::load_or_default(work_dir).map_err(|e| {
        ConfigError::SettingsFile {
            path: settings_dir(work_dir).join(SETTINGS_FILE),
            message: format!("{:#}", e),
        }
        .into()
    })
}

/// Check that every stage that will run has its tool, and warn about
/// missing curriculum files when Rename will run.
pub fn preflight(work_dir: &Path, settings: &BuildToml, active: &[Stage]) -> Result<()> {
    let missing = settings.missing_scripts(work_dir, active);
    if !missing.is_empty() {
        let list: Vec<String> = missing
            .iter()
            .map(|p| format!("  {}", p.display()))
            .collect();
        anyhow::bail!(
            "Missing stage tool scripts:\n{}\nConfigure them in {} or skip their stages with --skip",
            list.join("\n"),
            settings_dir(work_dir).join(SETTINGS_FILE).display()
        );
    }

    if active.contains(&Stage::Rename) {
        let absent: Vec<&str> = CURRICULUM_FILES
            .iter()
            .copied()
            .filter(|f| !work_dir.join(f).exists())
            .collect();
        if !absent.is_empty() {
            tracing::warn!(files = ?absent, "Curriculum files missing; rename may not organise every session");
            eprintln!(
                "{}Missing curriculum files: {}",
                WARN,
                absent.join(", ")
            );
        }
    }
    Ok(())
}

/// Force Setup to prompt when the `.env` file lacks any Vimeo credential.
pub fn check_credentials(work_dir: &Path, cli: &mut CliArgs, active: &[Stage]) {
    if !active.contains(&Stage::Setup) {
        return;
    }
    let missing = missing_credentials(&work_dir.join(ENV_FILE));
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, "Vimeo credentials incomplete, setup will prompt for them");
        cli.set_flag(ConfigKey::ForceInteractive, true);
    }
}

pub fn stage_cli_args(options: &StageOptions, cli: &mut CliArgs) {
    cli.set_opt(ConfigKey::VimeoFolderId, options.folder_id.as_ref());
    cli.set_opt(ConfigKey::MaxWorkers, options.max_workers);
    cli.set_flag(ConfigKey::ListOnly, options.list_only);
    cli.set_opt(ConfigKey::SlideWidth, options.width);
    cli.set_opt(ConfigKey::SlideHeight, options.height);
    cli.set_opt(ConfigKey::SlideWait, options.wait);
    cli.set_opt(ConfigKey::Curriculum, options.curriculum.as_ref());
    cli.set_flag(ConfigKey::Resume, options.resume);
    cli.set_flag(ConfigKey::MissingOnly, options.missing_only);
    cli.set_opt(ConfigKey::Session, options.session);
    cli.set_opt(ConfigKey::StartSession, options.start_session);
    cli.set_opt(ConfigKey::Zoom, options.zoom);
    cli.set_flag(ConfigKey::ForceInteractive, options.force_interactive);
}

pub fn resolver(work_dir: &Path, active: &[Stage]) -> ConfigResolver {
    let resolver = ConfigResolver::new().requiring(active);
    match VimeoFolderMap::load_optional(work_dir) {
        Some(map) => resolver.with_folder_map(map),
        None => resolver,
    }
}

pub fn retry_policy(settings: &BuildToml, run: &RunOptions) -> RetryPolicy {
    let mut policy = RetryPolicy::from_settings(settings);
    if let Some(n) = run.max_retries {
        policy = policy.with_max_retries(n);
    }
    if let Some(secs) = run.timeout {
        policy = policy.with_timeout(std::time::Duration::from_secs(secs));
    }
    if let Some(secs) = run.retry_delay {
        policy = policy.with_retry_delay(std::time::Duration::from_secs(secs));
    }
    policy
}

pub fn process_runner(settings: BuildToml, cancel: CancellationToken) -> Arc<StageRunner> {
    Arc::new(StageRunner::new(
        Arc::new(ProcessInvoker),
        Arc::new(settings),
        cancel,
    ))
}

pub fn format_duration(secs: f64) -> String {
    let secs = secs.round() as u64;
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
