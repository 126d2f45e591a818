//! Pipeline stage definitions.
//!
//! This module provides:
//! - `Stage`, the four ordered steps of a language package build
//! - the configuration keys each stage requires or accepts
//! - `StageResult`, the settled outcome of one stage in one session
//! - post-run artifact checks that back each stage's success signal

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{ConfigKey, ResolvedConfig};

/// One of the four pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Setup,
    VideoDownload,
    SlidesDownload,
    Rename,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Setup,
        Stage::VideoDownload,
        Stage::SlidesDownload,
        Stage::Rename,
    ];

    pub fn first() -> Stage {
        Stage::Setup
    }

    /// 1-based position in the pipeline.
    pub fn ordinal(&self) -> u8 {
        match self {
            Stage::Setup => 1,
            Stage::VideoDownload => 2,
            Stage::SlidesDownload => 3,
            Stage::Rename => 4,
        }
    }

    /// The stage that follows this one, or `None` for the last stage.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Setup => Some(Stage::VideoDownload),
            Stage::VideoDownload => Some(Stage::SlidesDownload),
            Stage::SlidesDownload => Some(Stage::Rename),
            Stage::Rename => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::VideoDownload => "video-download",
            Stage::SlidesDownload => "slides-download",
            Stage::Rename => "rename",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Setup => "Project Setup",
            Stage::VideoDownload => "Video Download",
            Stage::SlidesDownload => "Slides Download",
            Stage::Rename => "File Rename and Organization",
        }
    }

    /// Keys that must resolve to a value before this stage can run.
    pub fn required_keys(&self) -> &'static [ConfigKey] {
        match self {
            Stage::Setup => &[ConfigKey::LanguageCode, ConfigKey::FolderLocation],
            Stage::VideoDownload => &[
                ConfigKey::ProjectPath,
                ConfigKey::LanguageCode,
                ConfigKey::VimeoFolderId,
            ],
            Stage::SlidesDownload => &[ConfigKey::ProjectPath, ConfigKey::LanguageCode],
            Stage::Rename => &[ConfigKey::ProjectPath],
        }
    }

    /// Keys passed to the stage's tool when present.
    pub fn optional_keys(&self) -> &'static [ConfigKey] {
        match self {
            Stage::Setup => &[ConfigKey::ForceInteractive],
            Stage::VideoDownload => &[
                ConfigKey::MaxWorkers,
                ConfigKey::ListOnly,
                ConfigKey::Session,
                ConfigKey::StartSession,
            ],
            Stage::SlidesDownload => &[
                ConfigKey::SlideWidth,
                ConfigKey::SlideHeight,
                ConfigKey::SlideWait,
                ConfigKey::Curriculum,
                ConfigKey::TrainingType,
                ConfigKey::Resume,
                ConfigKey::MissingOnly,
                ConfigKey::Session,
                ConfigKey::StartSession,
                ConfigKey::Zoom,
            ],
            Stage::Rename => &[],
        }
    }

    /// Check the artifacts that signal success after a zero exit.
    ///
    /// A relative project path is taken relative to `base`, the directory the
    /// tools run in. Returns a description of what is missing on failure.
    pub fn verify_artifacts(&self, base: &Path, config: &ResolvedConfig) -> Result<(), String> {
        let Some(project_path) = config.project_path().map(|p| base.join(p)) else {
            return Ok(());
        };
        match self {
            Stage::Setup => require_dir(&project_path),
            Stage::VideoDownload => {
                if config.flag(ConfigKey::ListOnly) {
                    return Ok(());
                }
                let manifest = project_path.join("videos").join("download_results.json");
                if manifest.is_file() {
                    Ok(())
                } else {
                    Err(format!("download manifest not written: {}", manifest.display()))
                }
            }
            // Slide counts are owned by the capture tool; a zero exit is the signal.
            Stage::SlidesDownload => Ok(()),
            Stage::Rename => require_dir(&project_path.join("output")),
        }
    }
}

fn require_dir(path: &Path) -> Result<(), String> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(format!("expected directory not created: {}", path.display()))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "setup" | "1" => Ok(Stage::Setup),
            "video-download" | "video" | "videos" | "2" => Ok(Stage::VideoDownload),
            "slides-download" | "slides" | "3" => Ok(Stage::SlidesDownload),
            "rename" | "4" => Ok(Stage::Rename),
            _ => anyhow::bail!(
                "Invalid stage '{}'. Valid values: setup, video-download, slides-download, rename",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Succeeded => write!(f, "succeeded"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Settled outcome of one stage in one session.
///
/// `attempts` counts external invocations; it is zero only for skipped stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub status: StageStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StageResult {
    pub fn succeeded(stage: Stage, attempts: u32) -> Self {
        Self {
            stage,
            status: StageStatus::Succeeded,
            attempts,
            last_error: None,
        }
    }

    pub fn failed(stage: Stage, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            attempts,
            last_error: Some(error.into()),
        }
    }

    pub fn skipped(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}
