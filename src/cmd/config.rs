//! Configuration view and settings commands (`zume-build config`).

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use zume_build::build_config::{BuildToml, SETTINGS_FILE, settings_dir};
use zume_build::config::{CliArgs, ConfigKey, ConfigSources, LEGACY_CONFIG_FILE, ResolvedConfig};
use zume_build::stage::Stage;

use super::super::ConfigCommands;
use super::build::BuildTarget;

pub fn cmd_config(work_dir: &Path, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show {
            project_path,
            language,
            folder,
            training_type,
            stage,
        } => {
            let target = BuildTarget {
                project_path: project_path.clone(),
                language: language.clone(),
                folder: folder.clone(),
                training_type: *training_type,
            };
            let mut args = CliArgs::new();
            target.apply(&mut args);
            super::stage_cli_args(stage, &mut args);

            let legacy = work_dir.join(LEGACY_CONFIG_FILE);
            let sources = ConfigSources::new(args, super::capture_env(), Some(legacy.clone()));
            // Nothing is required here so partial configurations can be inspected.
            let config = sources.resolve(&super::resolver(work_dir, &[]))?;

            let settings_path = settings_dir(work_dir).join(SETTINGS_FILE);
            let settings = super::load_settings(work_dir)?;
            show(&config, &settings, &settings_path, &legacy);
            Ok(())
        }
        ConfigCommands::Init { force } => init(work_dir, *force),
    }
}

fn show(config: &ResolvedConfig, settings: &BuildToml, settings_path: &Path, legacy: &Path) {
    println!();
    println!("{}", style("Resolved configuration").bold());
    println!("======================");
    println!();

    if config.entries().next().is_none() {
        println!("  (no values set)");
    }
    for entry in config.entries() {
        println!(
            "  {:<18} = {:<30} [{}]",
            entry.key.as_str(),
            entry.value,
            style(entry.provenance).cyan()
        );
        for shadowed in &entry.shadowed {
            println!(
                "  {:<18}   {} {} [{}]",
                "",
                style("shadows").dim(),
                shadowed.value,
                shadowed.provenance
            );
        }
    }

    println!();
    println!(
        "Legacy file: {} ({})",
        legacy.display(),
        if legacy.exists() { "found" } else { "absent" }
    );
    println!(
        "Settings:    {} ({})",
        settings_path.display(),
        if settings_path.exists() {
            "found"
        } else {
            "using defaults"
        }
    );
    println!();

    println!("[defaults]");
    println!("  max_retries = {}", settings.defaults.max_retries);
    println!("  timeout_secs = {}", settings.defaults.timeout_secs);
    println!("  retry_delay_secs = {}", settings.defaults.retry_delay_secs);
    println!();
    println!("[tools]");
    for stage in Stage::ALL {
        let tool = settings.tool_for(stage);
        println!(
            "  {} = {} {}",
            stage.name(),
            tool.program,
            tool.args.join(" ")
        );
    }
    println!();

    println!("{}", style("Stage keys").bold());
    for stage in Stage::ALL {
        let keys = |list: &[ConfigKey]| {
            list.iter()
                .map(|k| {
                    if config.contains(*k) {
                        k.to_string()
                    } else {
                        format!("{} (unset)", k)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!("  {}", stage.label());
        println!("    required: {}", keys(stage.required_keys()));
        if !stage.optional_keys().is_empty() {
            println!("    optional: {}", keys(stage.optional_keys()));
        }
    }
    println!();
}

fn init(work_dir: &Path, force: bool) -> Result<()> {
    let dir = settings_dir(work_dir);
    let path = dir.join(SETTINGS_FILE);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut settings = BuildToml::default();
    for stage in Stage::ALL {
        let tool = settings.tool_for(stage);
        settings.tools.insert(stage, tool);
    }
    settings.save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
