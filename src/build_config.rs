//! Orchestrator settings read from `.zume/build.toml`.
//!
//! The settings file describes *how* to run the pipeline, not *what* to build:
//! which external tool implements each stage, default retry and timeout
//! policy, and the exit-code convention used to classify failures. Build
//! inputs such as the language or project path never live here; they go
//! through the config resolver.
//!
//! # Settings File Format
//!
//! ```toml
//! [defaults]
//! max_retries = 2
//! timeout_secs = 3600
//! retry_delay_secs = 2
//! slide_width = 3000
//! slide_height = 1680
//! slide_wait = 5
//! max_workers = 3
//!
//! [tools.setup]
//! program = "python3"
//! args = ["1-setup.py"]
//!
//! [tools.slides-download]
//! program = "python3"
//! args = ["parts/3-slides-download.py"]
//!
//! [retry]
//! fatal_exit_codes = [2, 64, 65, 78]
//! fatal_markers = ["Invalid configuration"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::stage::Stage;

pub const SETTINGS_DIR: &str = ".zume";
pub const SETTINGS_FILE: &str = "build.toml";

/// Returns the `.zume` directory for a work directory.
pub fn settings_dir(work_dir: &Path) -> PathBuf {
    work_dir.join(SETTINGS_DIR)
}

/// External command implementing one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    fn python(script: &str) -> Self {
        Self {
            program: "python3".to_string(),
            args: vec![script.to_string()],
        }
    }

    /// The script this command runs, when its first argument names a file.
    pub fn script(&self) -> Option<&str> {
        self.args
            .first()
            .map(String::as_str)
            .filter(|a| !a.starts_with('-'))
    }
}

/// Default numeric settings applied when neither the CLI nor the config supplies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_slide_width")]
    pub slide_width: u32,
    #[serde(default = "default_slide_height")]
    pub slide_height: u32,
    #[serde(default = "default_slide_wait")]
    pub slide_wait: u32,
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_slide_width() -> u32 {
    3000
}

fn default_slide_height() -> u32 {
    1680
}

fn default_slide_wait() -> u32 {
    5
}

fn default_max_workers() -> u32 {
    3
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            slide_width: default_slide_width(),
            slide_height: default_slide_height(),
            slide_wait: default_slide_wait(),
            max_workers: default_max_workers(),
        }
    }
}

/// Exit-code and message convention agreed with the stage tools.
///
/// A failure is fatal when the exit code is listed in `fatal_exit_codes` or
/// the tool's stdout or stderr contains one of `fatal_markers`. Everything else
/// (other non-zero exits, timeouts, signals) is treated as transient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_fatal_exit_codes")]
    pub fatal_exit_codes: Vec<i32>,
    #[serde(default = "default_fatal_markers")]
    pub fatal_markers: Vec<String>,
}

fn default_fatal_exit_codes() -> Vec<i32> {
    // argparse usage errors, EX_USAGE, EX_DATAERR, EX_CONFIG
    vec![2, 64, 65, 78]
}

fn default_fatal_markers() -> Vec<String> {
    [
        "Invalid configuration",
        "Invalid type",
        "not found in vimeo-folders.json",
        "No folder found for language code",
        "does not exist",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            fatal_exit_codes: default_fatal_exit_codes(),
            fatal_markers: default_fatal_markers(),
        }
    }
}

/// The complete build.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildToml {
    #[serde(default)]
    pub defaults: DefaultsSection,
    /// Per-stage tool overrides keyed by stage name.
    #[serde(default)]
    pub tools: BTreeMap<Stage, ToolCommand>,
    #[serde(default)]
    pub retry: RetrySection,
}

impl BuildToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse build.toml")
    }

    /// Load `.zume/build.toml` from a work directory, or defaults if it doesn't exist.
    pub fn load_or_default(work_dir: &Path) -> Result<Self> {
        let path = settings_dir(work_dir).join(SETTINGS_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize build.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }

    /// The tool for a stage: the configured override, else the stock script.
    pub fn tool_for(&self, stage: Stage) -> ToolCommand {
        self.tools.get(&stage).cloned().unwrap_or_else(|| match stage {
            Stage::Setup => ToolCommand::python("1-setup.py"),
            Stage::VideoDownload => ToolCommand::python("2-video-download.py"),
            Stage::SlidesDownload => ToolCommand::python("3-slides-download.py"),
            Stage::Rename => ToolCommand::python("4-rename-files.py"),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.defaults.retry_delay_secs)
    }

    /// Scripts referenced by the given stages that don't exist under `work_dir`.
    pub fn missing_scripts(&self, work_dir: &Path, stages: &[Stage]) -> Vec<PathBuf> {
        stages
            .iter()
            .filter_map(|stage| {
                let tool = self.tool_for(*stage);
                let script = tool.script()?;
                let path = if Path::new(script).is_absolute() {
                    PathBuf::from(script)
                } else {
                    work_dir.join(script)
                };
                (!path.exists()).then_some(path)
            })
            .collect()
    }
}
