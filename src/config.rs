//! Configuration resolution for a build session.
//!
//! Values come from three sources with strict precedence:
//! CLI arguments > `ZUME_*` environment variables > the legacy `.config.json`.
//! A fourth, lowest layer (`Derived`) only fills keys that no source supplied:
//! `project_path` from `folder_location/language_code`, and `vimeo_folder_id`
//! from the `vimeo-folders.json` lookup.
//!
//! Resolution never writes anything. Given the same inputs it returns the same
//! [`ResolvedConfig`]; the environment is passed in as a captured map rather than
//! read from the process.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::stage::Stage;
use crate::vimeo_folders::VimeoFolderMap;

/// Name of the legacy configuration file, relative to the work directory.
pub const LEGACY_CONFIG_FILE: &str = ".config.json";

/// Captured process environment.
pub type Environment = HashMap<String, String>;

/// Configuration keys the orchestrator recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    ProjectPath,
    LanguageCode,
    FolderLocation,
    VimeoFolderId,
    TrainingType,
    MaxWorkers,
    ListOnly,
    SlideWidth,
    SlideHeight,
    SlideWait,
    Curriculum,
    Resume,
    MissingOnly,
    Session,
    StartSession,
    Zoom,
    ForceInteractive,
}

/// How a key's raw value is validated and normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Path,
    Language,
    TrainingType,
    Curriculum,
    PositiveInt,
    Int,
    Zoom,
    Flag,
    Text,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 17] = [
        ConfigKey::ProjectPath,
        ConfigKey::LanguageCode,
        ConfigKey::FolderLocation,
        ConfigKey::VimeoFolderId,
        ConfigKey::TrainingType,
        ConfigKey::MaxWorkers,
        ConfigKey::ListOnly,
        ConfigKey::SlideWidth,
        ConfigKey::SlideHeight,
        ConfigKey::SlideWait,
        ConfigKey::Curriculum,
        ConfigKey::Resume,
        ConfigKey::MissingOnly,
        ConfigKey::Session,
        ConfigKey::StartSession,
        ConfigKey::Zoom,
        ConfigKey::ForceInteractive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::ProjectPath => "project_path",
            ConfigKey::LanguageCode => "language_code",
            ConfigKey::FolderLocation => "folder_location",
            ConfigKey::VimeoFolderId => "vimeo_folder_id",
            ConfigKey::TrainingType => "training_type",
            ConfigKey::MaxWorkers => "max_workers",
            ConfigKey::ListOnly => "list_only",
            ConfigKey::SlideWidth => "slide_width",
            ConfigKey::SlideHeight => "slide_height",
            ConfigKey::SlideWait => "slide_wait",
            ConfigKey::Curriculum => "curriculum",
            ConfigKey::Resume => "resume",
            ConfigKey::MissingOnly => "missing_only",
            ConfigKey::Session => "session",
            ConfigKey::StartSession => "start_session",
            ConfigKey::Zoom => "zoom",
            ConfigKey::ForceInteractive => "force_interactive",
        }
    }

    /// Environment variable consulted for this key, e.g. `ZUME_PROJECT_PATH`.
    pub fn env_var(&self) -> String {
        format!("ZUME_{}", self.as_str().to_uppercase())
    }

    fn kind(&self) -> ValueKind {
        match self {
            ConfigKey::ProjectPath | ConfigKey::FolderLocation => ValueKind::Path,
            ConfigKey::LanguageCode => ValueKind::Language,
            ConfigKey::TrainingType => ValueKind::TrainingType,
            ConfigKey::Curriculum => ValueKind::Curriculum,
            ConfigKey::MaxWorkers
            | ConfigKey::SlideWidth
            | ConfigKey::SlideHeight
            | ConfigKey::Session
            | ConfigKey::StartSession => ValueKind::PositiveInt,
            ConfigKey::SlideWait => ValueKind::Int,
            ConfigKey::Zoom => ValueKind::Zoom,
            ConfigKey::ListOnly
            | ConfigKey::Resume
            | ConfigKey::MissingOnly
            | ConfigKey::ForceInteractive => ValueKind::Flag,
            ConfigKey::VimeoFolderId => ValueKind::Text,
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfigKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ConfigKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("Unknown configuration key '{}'", s))
    }
}

/// Where a configuration value came from. Ordered by ascending precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Derived,
    LegacyFile,
    Env,
    Cli,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Derived => write!(f, "derived"),
            Provenance::LegacyFile => write!(f, "legacy-file"),
            Provenance::Env => write!(f, "env"),
            Provenance::Cli => write!(f, "cli"),
        }
    }
}

/// A value that lost to a higher-precedence source. Kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowedValue {
    pub provenance: Provenance,
    pub value: String,
}

/// The effective value of one key plus the values it shadowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: ConfigKey,
    pub value: String,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shadowed: Vec<ShadowedValue>,
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    values: BTreeMap<ConfigKey, String>,
}

impl CliArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: ConfigKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    /// Set the key only when a value is present.
    pub fn set_opt<T: ToString>(&mut self, key: ConfigKey, value: Option<T>) {
        if let Some(v) = value {
            self.values.insert(key, v.to_string());
        }
    }

    /// Set a boolean flag only when it is on, so an absent flag does not
    /// shadow lower-precedence sources.
    pub fn set_flag(&mut self, key: ConfigKey, on: bool) {
        if on {
            self.values.insert(key, "true".to_string());
        }
    }

    pub fn with(mut self, key: ConfigKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn remove(&mut self, key: ConfigKey) -> Option<String> {
        self.values.remove(&key)
    }
}

/// The legacy flat key/value file, read for backward compatibility.
#[derive(Debug, Clone, Default)]
pub struct LegacyConfig {
    values: BTreeMap<ConfigKey, String>,
}

impl LegacyConfig {
    /// Load the legacy file. A missing file yields `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::LegacyFileUnreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Self::parse(&content)
            .map(Some)
            .map_err(|message| ConfigError::LegacyFileUnreadable {
                path: path.to_path_buf(),
                message,
            })
    }

    /// Parse the flat JSON object. Unknown keys and nested values are ignored.
    pub fn parse(content: &str) -> Result<Self, String> {
        let raw: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(content).map_err(|e| e.to_string())?;

        let mut values = BTreeMap::new();
        for (name, value) in raw {
            let Ok(key) = name.parse::<ConfigKey>() else {
                continue;
            };
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            values.insert(key, text);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }
}

/// Everything a build's configuration is resolved from.
///
/// The batch driver clones this per combination and overlays the combination's
/// type and language onto `cli`.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub cli: CliArgs,
    pub env: Environment,
    pub legacy_file: Option<PathBuf>,
}

impl ConfigSources {
    pub fn new(cli: CliArgs, env: Environment, legacy_file: Option<PathBuf>) -> Self {
        Self {
            cli,
            env,
            legacy_file,
        }
    }

    pub fn resolve(&self, resolver: &ConfigResolver) -> Result<ResolvedConfig, ConfigError> {
        resolver.resolve(&self.cli, &self.env, self.legacy_file.as_deref())
    }
}

/// Merges the configuration sources into one effective configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    required_by: Vec<Stage>,
    folder_map: Option<VimeoFolderMap>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every key these stages declare.
    pub fn requiring(mut self, stages: &[Stage]) -> Self {
        self.required_by = stages.to_vec();
        self.required_by.sort();
        self.required_by.dedup();
        self
    }

    /// Use a Vimeo folder map to derive `vimeo_folder_id` when no source has it.
    pub fn with_folder_map(mut self, map: VimeoFolderMap) -> Self {
        self.folder_map = Some(map);
        self
    }

    pub fn resolve(
        &self,
        cli: &CliArgs,
        env: &Environment,
        legacy_path: Option<&Path>,
    ) -> Result<ResolvedConfig, ConfigError> {
        let legacy = match legacy_path {
            Some(path) => match LegacyConfig::load(path) {
                Ok(legacy) => legacy,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unreadable legacy config file");
                    None
                }
            },
            None => None,
        };

        let mut entries = BTreeMap::new();
        for key in ConfigKey::ALL {
            let mut candidates: Vec<(Provenance, String)> = Vec::new();
            if let Some(v) = cli.get(key) {
                candidates.push((Provenance::Cli, v.to_string()));
            }
            if let Some(v) = env.get(&key.env_var()).filter(|v| !v.trim().is_empty()) {
                candidates.push((Provenance::Env, v.clone()));
            }
            if let Some(v) = legacy.as_ref().and_then(|l| l.get(key)) {
                candidates.push((Provenance::LegacyFile, v.to_string()));
            }

            let mut iter = candidates.into_iter();
            let Some((provenance, raw)) = iter.next() else {
                continue;
            };
            let value = normalize(key, &raw)?;
            let shadowed = iter
                .map(|(provenance, value)| ShadowedValue { provenance, value })
                .collect();
            entries.insert(
                key,
                ConfigEntry {
                    key,
                    value,
                    provenance,
                    shadowed,
                },
            );
        }

        let mut config = ResolvedConfig { entries };
        self.derive(&mut config);
        self.check_required(&config)?;
        Ok(config)
    }

    fn derive(&self, config: &mut ResolvedConfig) {
        if !config.contains(ConfigKey::ProjectPath)
            && let (Some(folder), Some(lang)) = (
                config.get(ConfigKey::FolderLocation),
                config.get(ConfigKey::LanguageCode),
            )
        {
            let path = Path::new(folder).join(lang);
            config.insert_derived(ConfigKey::ProjectPath, path.to_string_lossy().to_string());
        }

        if !config.contains(ConfigKey::VimeoFolderId)
            && let Some(map) = &self.folder_map
            && let Some(lang) = config.get(ConfigKey::LanguageCode)
            && let Some(folder) = map.folder_for(lang)
        {
            let id = folder.folder_id.clone();
            config.insert_derived(ConfigKey::VimeoFolderId, id);
        }
    }

    fn check_required(&self, config: &ResolvedConfig) -> Result<(), ConfigError> {
        for stage in &self.required_by {
            for key in stage.required_keys() {
                if !config.contains(*key) {
                    return Err(ConfigError::MissingRequiredConfig {
                        key: key.to_string(),
                        stage: *stage,
                    });
                }
            }
        }
        Ok(())
    }
}

fn invalid(key: ConfigKey, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate a raw value and return its canonical form.
fn normalize(key: ConfigKey, raw: &str) -> Result<String, ConfigError> {
    let value = raw.trim();
    match key.kind() {
        ValueKind::Path | ValueKind::Text => {
            if value.is_empty() {
                return Err(invalid(key, raw, "must not be empty"));
            }
            Ok(value.to_string())
        }
        ValueKind::Language => {
            let lang = value.to_lowercase();
            let primary = lang.split(['-', '_']).next().unwrap_or_default();
            let valid = primary.len() >= 2
                && primary.chars().all(|c| c.is_ascii_alphabetic())
                && lang
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(invalid(
                    key,
                    raw,
                    "expected a language code of at least 2 letters (e.g. 'en', 'pt-br')",
                ));
            }
            Ok(lang)
        }
        ValueKind::TrainingType => match value {
            "10" | "20" | "intensive" => Ok(value.to_string()),
            _ => Err(invalid(key, raw, "must be one of: 10, 20, intensive")),
        },
        ValueKind::Curriculum => match value {
            "all" | "ten_session" | "twenty_session" | "intensive_session" => {
                Ok(value.to_string())
            }
            _ => Err(invalid(
                key,
                raw,
                "must be one of: all, ten_session, twenty_session, intensive_session",
            )),
        },
        ValueKind::PositiveInt => match value.parse::<u32>() {
            Ok(n) if n > 0 => Ok(n.to_string()),
            _ => Err(invalid(key, raw, "must be a positive integer")),
        },
        ValueKind::Int => value
            .parse::<u32>()
            .map(|n| n.to_string())
            .map_err(|_| invalid(key, raw, "must be a non-negative integer")),
        ValueKind::Zoom => match value.parse::<f64>() {
            Ok(z) if z > 0.0 && z <= 5.0 => Ok(z.to_string()),
            _ => Err(invalid(key, raw, "must be a number in (0, 5]")),
        },
        ValueKind::Flag => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok("true".to_string()),
            "false" | "0" | "no" | "off" => Ok("false".to_string()),
            _ => Err(invalid(key, raw, "must be true or false")),
        },
    }
}

/// The effective configuration of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    entries: BTreeMap<ConfigKey, ConfigEntry>,
}

impl ResolvedConfig {
    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.entries.get(&key).map(|e| e.value.as_str())
    }

    pub fn entry(&self, key: ConfigKey) -> Option<&ConfigEntry> {
        self.entries.get(&key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries.values()
    }

    pub fn contains(&self, key: ConfigKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn flag(&self, key: ConfigKey) -> bool {
        self.get(key) == Some("true")
    }

    pub fn parsed<T: std::str::FromStr>(&self, key: ConfigKey) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn project_path(&self) -> Option<PathBuf> {
        self.get(ConfigKey::ProjectPath).map(PathBuf::from)
    }

    /// Plain `key -> value` view, used for the session's debug snapshot.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .values()
            .map(|e| (e.key.to_string(), e.value.clone()))
            .collect()
    }

    fn insert_derived(&mut self, key: ConfigKey, value: String) {
        self.entries.insert(
            key,
            ConfigEntry {
                key,
                value,
                provenance: Provenance::Derived,
                shadowed: Vec::new(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn legacy_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join(LEGACY_CONFIG_FILE);
        fs::write(&path, content).unwrap();
        path
    }

    fn env(pairs: &[(&str, &str)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cli_beats_legacy_file() {
        let dir = tempdir().unwrap();
        let legacy = legacy_file(
            dir.path(),
            r#"{"language_code": "fr", "project_path": "/legacy/fr", "folder_location": "/legacy"}"#,
        );
        let cli = CliArgs::new()
            .with(ConfigKey::LanguageCode, "es")
            .with(ConfigKey::ProjectPath, "/cli/es");

        let config = ConfigResolver::new()
            .resolve(&cli, &Environment::new(), Some(&legacy))
            .unwrap();

        assert_eq!(config.get(ConfigKey::LanguageCode), Some("es"));
        assert_eq!(config.get(ConfigKey::ProjectPath), Some("/cli/es"));
        let entry = config.entry(ConfigKey::LanguageCode).unwrap();
        assert_eq!(entry.provenance, Provenance::Cli);
        assert_eq!(
            entry.shadowed,
            vec![ShadowedValue {
                provenance: Provenance::LegacyFile,
                value: "fr".to_string()
            }]
        );
    }

    #[test]
    fn test_legacy_value_used_when_cli_and_env_absent() {
        let dir = tempdir().unwrap();
        let legacy = legacy_file(
            dir.path(),
            r#"{"language_code": "am", "folder_location": "/srv/builds"}"#,
        );

        let config = ConfigResolver::new()
            .resolve(&CliArgs::new(), &Environment::new(), Some(&legacy))
            .unwrap();

        assert_eq!(config.get(ConfigKey::LanguageCode), Some("am"));
        assert_eq!(config.get(ConfigKey::FolderLocation), Some("/srv/builds"));
        assert_eq!(
            config.entry(ConfigKey::FolderLocation).unwrap().provenance,
            Provenance::LegacyFile
        );
    }

    #[test]
    fn test_env_sits_between_cli_and_legacy() {
        let dir = tempdir().unwrap();
        let legacy = legacy_file(
            dir.path(),
            r#"{"language_code": "fr", "project_path": "/legacy/fr"}"#,
        );
        let environment = env(&[
            ("ZUME_PROJECT_PATH", "/env/path"),
            ("ZUME_LANGUAGE_CODE", "de"),
        ]);
        let cli = CliArgs::new().with(ConfigKey::LanguageCode, "en");

        let config = ConfigResolver::new()
            .resolve(&cli, &environment, Some(&legacy))
            .unwrap();

        assert_eq!(config.get(ConfigKey::LanguageCode), Some("en"));
        assert_eq!(config.get(ConfigKey::ProjectPath), Some("/env/path"));
        let entry = config.entry(ConfigKey::ProjectPath).unwrap();
        assert_eq!(entry.provenance, Provenance::Env);
        assert_eq!(entry.shadowed.len(), 1);
        assert_eq!(entry.shadowed[0].provenance, Provenance::LegacyFile);
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        let environment = env(&[("ZUME_LANGUAGE_CODE", "  ")]);
        let config = ConfigResolver::new()
            .resolve(&CliArgs::new(), &environment, None)
            .unwrap();
        assert!(!config.contains(ConfigKey::LanguageCode));
    }

    #[test]
    fn test_missing_legacy_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join(LEGACY_CONFIG_FILE);
        let cli = CliArgs::new()
            .with(ConfigKey::LanguageCode, "en")
            .with(ConfigKey::FolderLocation, "/out");

        let config = ConfigResolver::new()
            .requiring(&[Stage::Setup])
            .resolve(&cli, &Environment::new(), Some(&missing))
            .unwrap();
        assert_eq!(config.get(ConfigKey::LanguageCode), Some("en"));
    }

    #[test]
    fn test_malformed_legacy_file_is_ignored() {
        let dir = tempdir().unwrap();
        let legacy = legacy_file(dir.path(), "{ not json");
        let cli = CliArgs::new().with(ConfigKey::LanguageCode, "en");

        let config = ConfigResolver::new()
            .resolve(&cli, &Environment::new(), Some(&legacy))
            .unwrap();
        assert_eq!(config.get(ConfigKey::LanguageCode), Some("en"));
        assert!(LegacyConfig::load(&legacy).is_err());
    }

    #[test]
    fn test_missing_required_key_names_key_and_stage() {
        let cli = CliArgs::new()
            .with(ConfigKey::LanguageCode, "en")
            .with(ConfigKey::ProjectPath, "/p");

        let err = ConfigResolver::new()
            .requiring(&[Stage::Setup, Stage::VideoDownload])
            .resolve(&cli, &Environment::new(), None)
            .unwrap_err();

        match err {
            ConfigError::MissingRequiredConfig { key, stage } => {
                assert_eq!(key, "folder_location");
                assert_eq!(stage, Stage::Setup);
            }
            other => panic!("Expected MissingRequiredConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_skipped_stage_keys_are_not_required() {
        let cli = CliArgs::new().with(ConfigKey::ProjectPath, "/p");
        let config = ConfigResolver::new()
            .requiring(&[Stage::Rename])
            .resolve(&cli, &Environment::new(), None)
            .unwrap();
        assert_eq!(config.get(ConfigKey::ProjectPath), Some("/p"));
    }

    #[test]
    fn test_project_path_derived_from_folder_and_language() {
        let cli = CliArgs::new()
            .with(ConfigKey::LanguageCode, "ES")
            .with(ConfigKey::FolderLocation, "/builds");

        let config = ConfigResolver::new()
            .resolve(&cli, &Environment::new(), None)
            .unwrap();

        let expected = Path::new("/builds").join("es");
        assert_eq!(config.project_path(), Some(expected));
        assert_eq!(
            config.entry(ConfigKey::ProjectPath).unwrap().provenance,
            Provenance::Derived
        );
    }

    #[test]
    fn test_legacy_project_path_beats_derivation() {
        let dir = tempdir().unwrap();
        let legacy = legacy_file(dir.path(), r#"{"project_path": "/legacy/en"}"#);
        let cli = CliArgs::new()
            .with(ConfigKey::LanguageCode, "en")
            .with(ConfigKey::FolderLocation, "/builds");

        let config = ConfigResolver::new()
            .resolve(&cli, &Environment::new(), Some(&legacy))
            .unwrap();
        assert_eq!(config.get(ConfigKey::ProjectPath), Some("/legacy/en"));
    }

    #[test]
    fn test_vimeo_folder_id_derived_from_folder_map() {
        let map = VimeoFolderMap::parse(
            r#"{"languages": [{"language_code": "en", "folder_id": "123", "name": "English"}]}"#,
        )
        .unwrap();
        let cli = CliArgs::new()
            .with(ConfigKey::LanguageCode, "en")
            .with(ConfigKey::ProjectPath, "/p");

        let config = ConfigResolver::new()
            .with_folder_map(map)
            .requiring(&[Stage::VideoDownload])
            .resolve(&cli, &Environment::new(), None)
            .unwrap();
        assert_eq!(config.get(ConfigKey::VimeoFolderId), Some("123"));
    }

    #[test]
    fn test_malformed_language_code_is_invalid() {
        let cli = CliArgs::new().with(ConfigKey::LanguageCode, "e");
        let err = ConfigResolver::new()
            .resolve(&cli, &Environment::new(), None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "language_code"));
    }

    #[test]
    fn test_invalid_training_type_rejected() {
        let cli = CliArgs::new().with(ConfigKey::TrainingType, "30");
        let err = ConfigResolver::new()
            .resolve(&cli, &Environment::new(), None)
            .unwrap_err();
        assert!(err.to_string().contains("10, 20, intensive"));
    }

    #[test]
    fn test_flag_and_number_normalisation() {
        let dir = tempdir().unwrap();
        let legacy = legacy_file(
            dir.path(),
            r#"{"missing_only": true, "slide_width": 3000, "zoom": 0.8, "unknown": "x"}"#,
        );
        let cli = CliArgs::new().with(ConfigKey::Resume, "yes");

        let config = ConfigResolver::new()
            .resolve(&cli, &Environment::new(), Some(&legacy))
            .unwrap();
        assert!(config.flag(ConfigKey::MissingOnly));
        assert!(config.flag(ConfigKey::Resume));
        assert_eq!(config.parsed::<u32>(ConfigKey::SlideWidth), Some(3000));
        assert_eq!(config.get(ConfigKey::Zoom), Some("0.8"));
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let dir = tempdir().unwrap();
        let legacy = legacy_file(dir.path(), r#"{"language_code": "fr"}"#);
        let cli = CliArgs::new().with(ConfigKey::FolderLocation, "/b");
        let environment = env(&[("ZUME_MAX_WORKERS", "4")]);
        let resolver = ConfigResolver::new();

        let first = resolver.resolve(&cli, &environment, Some(&legacy)).unwrap();
        let second = resolver.resolve(&cli, &environment, Some(&legacy)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolution_never_writes_legacy_file() {
        let dir = tempdir().unwrap();
        let content = r#"{"language_code": "fr"}"#;
        let legacy = legacy_file(dir.path(), content);
        let cli = CliArgs::new().with(ConfigKey::LanguageCode, "en");

        ConfigResolver::new()
            .resolve(&cli, &Environment::new(), Some(&legacy))
            .unwrap();
        assert_eq!(fs::read_to_string(&legacy).unwrap(), content);
    }

    #[test]
    fn test_config_key_parse_accepts_dashes() {
        assert_eq!(
            "project-path".parse::<ConfigKey>().unwrap(),
            ConfigKey::ProjectPath
        );
        assert!("nope".parse::<ConfigKey>().is_err());
        assert_eq!(ConfigKey::LanguageCode.env_var(), "ZUME_LANGUAGE_CODE");
    }
}
