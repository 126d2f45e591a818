//! Builds the external command line for each stage.
//!
//! Each tool receives only the keys its stage declares, passed as explicit
//! arguments. Nothing is handed over through a shared file.

use std::path::{Path, PathBuf};

use crate::build_config::{DefaultsSection, ToolCommand};
use crate::config::{ConfigKey, ResolvedConfig};
use crate::session::SessionId;
use crate::stage::Stage;

/// Environment variable carrying the session id into every stage tool.
pub const SESSION_ENV_VAR: &str = "ZUME_SESSION_ID";

/// A fully specified external invocation. Identical across retry attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub stage: Stage,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    /// Attach the tool to the terminal instead of capturing its output, so
    /// setup can prompt for credentials.
    pub interactive: bool,
}

impl Invocation {
    /// Value following `flag` in the argument list, if present.
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Shell-style rendering for logs.
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.contains(char::is_whitespace) {
                    format!("'{}'", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Curriculum selector passed to the slide tool.
///
/// An explicit `curriculum` wins; otherwise the training type picks its own
/// curriculum, and with neither every curriculum is captured.
pub fn curriculum_for(config: &ResolvedConfig) -> &str {
    if let Some(curriculum) = config.get(ConfigKey::Curriculum) {
        return curriculum;
    }
    match config.get(ConfigKey::TrainingType) {
        Some("10") => "ten_session",
        Some("20") => "twenty_session",
        Some("intensive") => "intensive_session",
        _ => "all",
    }
}

struct ArgList(Vec<String>);

impl ArgList {
    fn value(&mut self, flag: &str, value: impl ToString) {
        self.0.push(flag.to_string());
        self.0.push(value.to_string());
    }

    fn opt(&mut self, flag: &str, config: &ResolvedConfig, key: ConfigKey) {
        if let Some(v) = config.get(key) {
            self.value(flag, v);
        }
    }

    fn flag(&mut self, flag: &str, config: &ResolvedConfig, key: ConfigKey) {
        if config.flag(key) {
            self.0.push(flag.to_string());
        }
    }

    /// `--session N` narrows to one unit; `--start-session N` only applies without it.
    fn session_narrowing(&mut self, config: &ResolvedConfig) {
        if config.contains(ConfigKey::Session) {
            self.opt("--session", config, ConfigKey::Session);
        } else {
            self.opt("--start-session", config, ConfigKey::StartSession);
        }
    }
}

/// Stage-specific arguments. Required keys are assumed resolved; a missing one
/// is simply omitted and left for the tool to reject.
pub fn stage_args(
    stage: Stage,
    config: &ResolvedConfig,
    defaults: &DefaultsSection,
    session_id: SessionId,
) -> Vec<String> {
    let mut args = ArgList(Vec::new());
    match stage {
        Stage::Setup => {
            args.opt("--language", config, ConfigKey::LanguageCode);
            args.opt("--folder", config, ConfigKey::FolderLocation);
            args.value("--session-id", session_id);
            args.flag("--force-interactive", config, ConfigKey::ForceInteractive);
        }
        Stage::VideoDownload => {
            args.opt("--project-path", config, ConfigKey::ProjectPath);
            args.opt("--language", config, ConfigKey::LanguageCode);
            args.opt("--folder-id", config, ConfigKey::VimeoFolderId);
            args.value(
                "--max-workers",
                config
                    .parsed::<u32>(ConfigKey::MaxWorkers)
                    .unwrap_or(defaults.max_workers),
            );
            args.flag("--list-only", config, ConfigKey::ListOnly);
            args.session_narrowing(config);
        }
        Stage::SlidesDownload => {
            args.opt("--project-path", config, ConfigKey::ProjectPath);
            args.opt("--language", config, ConfigKey::LanguageCode);
            args.value(
                "--width",
                config
                    .parsed::<u32>(ConfigKey::SlideWidth)
                    .unwrap_or(defaults.slide_width),
            );
            args.value(
                "--height",
                config
                    .parsed::<u32>(ConfigKey::SlideHeight)
                    .unwrap_or(defaults.slide_height),
            );
            args.value(
                "--wait",
                config
                    .parsed::<u32>(ConfigKey::SlideWait)
                    .unwrap_or(defaults.slide_wait),
            );
            args.value("--curriculum", curriculum_for(config));
            args.flag("--resume", config, ConfigKey::Resume);
            args.flag("--missing-only", config, ConfigKey::MissingOnly);
            args.session_narrowing(config);
            args.opt("--zoom", config, ConfigKey::Zoom);
        }
        Stage::Rename => {
            args.opt("--project-path", config, ConfigKey::ProjectPath);
        }
    }
    args.0
}

pub fn build_invocation(
    stage: Stage,
    tool: &ToolCommand,
    config: &ResolvedConfig,
    defaults: &DefaultsSection,
    session_id: SessionId,
    work_dir: &Path,
) -> Invocation {
    let mut args = tool.args.clone();
    args.extend(stage_args(stage, config, defaults, session_id));
    Invocation {
        stage,
        program: tool.program.clone(),
        args,
        cwd: work_dir.to_path_buf(),
        env: vec![(SESSION_ENV_VAR.to_string(), session_id.to_string())],
        interactive: stage == Stage::Setup && config.flag(ConfigKey::ForceInteractive),
    }
}
