//! Language to Vimeo folder lookup, loaded from `vimeo-folders.json`.
//!
//! ```json
//! {"languages": [{"language_code": "en", "folder_id": "12345", "name": "English"}]}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const VIMEO_FOLDERS_FILE: &str = "vimeo-folders.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VimeoFolder {
    pub language_code: String,
    pub folder_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VimeoFolderMap {
    #[serde(default)]
    pub languages: Vec<VimeoFolder>,
}

impl VimeoFolderMap {
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse vimeo-folders.json")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content)
    }

    /// Load the map from a work directory. Missing or malformed files yield `None`
    /// with a warning, since the folder id can still come from other sources.
    pub fn load_optional(work_dir: &Path) -> Option<Self> {
        let path = work_dir.join(VIMEO_FOLDERS_FILE);
        if !path.exists() {
            return None;
        }
        match Self::load(&path) {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable folder map");
                None
            }
        }
    }

    pub fn folder_for(&self, language_code: &str) -> Option<&VimeoFolder> {
        self.languages
            .iter()
            .find(|l| l.language_code.eq_ignore_ascii_case(language_code))
    }
}
