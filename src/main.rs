use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use zume_build::batch::TrainingType;
use zume_build::stage::Stage;

mod cmd;

#[derive(Parser)]
#[command(name = "zume-build")]
#[command(version, about = "Build orchestrator for Zume language packages")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding the stage tools and `.zume/` settings (default: current directory)
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options forwarded to the stage tools.
#[derive(Args, Clone, Debug, Default)]
pub struct StageOptions {
    /// Vimeo folder id (default: looked up in vimeo-folders.json)
    #[arg(long)]
    pub folder_id: Option<String>,

    /// Parallel video downloads
    #[arg(long)]
    pub max_workers: Option<u32>,

    /// List videos without downloading
    #[arg(long)]
    pub list_only: bool,

    /// Slide screenshot width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Slide screenshot height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Seconds to wait for each slide to render
    #[arg(long)]
    pub wait: Option<u32>,

    /// Curriculum to capture (all, ten_session, twenty_session, intensive_session)
    #[arg(long)]
    pub curriculum: Option<String>,

    /// Resume an interrupted slide capture
    #[arg(long)]
    pub resume: bool,

    /// Only capture slides that are missing
    #[arg(long)]
    pub missing_only: bool,

    /// Process only this session number
    #[arg(long)]
    pub session: Option<u32>,

    /// Start from this session number
    #[arg(long)]
    pub start_session: Option<u32>,

    /// Page zoom for slide capture
    #[arg(long)]
    pub zoom: Option<f64>,

    /// Always prompt for credentials during setup
    #[arg(long)]
    pub force_interactive: bool,
}

/// Options controlling how stages are run.
#[derive(Args, Clone, Debug, Default)]
pub struct RunOptions {
    /// Skip a stage (repeatable): setup, video-download, slides-download, rename
    #[arg(long = "skip", value_name = "STAGE")]
    pub skip: Vec<Stage>,

    /// Retries after the first attempt for transient failures
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Seconds to wait between attempts
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// Keep session files even when the build succeeds
    #[arg(long)]
    pub keep_session: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build one language package
    Build {
        /// Project directory (default: <folder>/<language>)
        #[arg(long)]
        project_path: Option<PathBuf>,

        /// Language code, e.g. en, es, pt-br
        #[arg(short, long)]
        language: Option<String>,

        /// Base folder the project directory is created in
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Training type (10, 20, intensive)
        #[arg(long)]
        training_type: Option<TrainingType>,

        /// Ask before each stage
        #[arg(short, long)]
        interactive: bool,

        /// Also write JSON logs to this file
        #[arg(long)]
        log_file: Option<PathBuf>,

        #[command(flatten)]
        stage: StageOptions,

        #[command(flatten)]
        run: RunOptions,
    },
    /// Build every (type, language) combination
    Batch {
        /// Training types (10, 20, intensive)
        #[arg(long, num_args = 1.., required = true)]
        types: Vec<TrainingType>,

        /// Language codes
        #[arg(long, num_args = 1.., required = true)]
        languages: Vec<String>,

        /// Directory receiving every package, the batch log and reports
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,

        #[command(flatten)]
        stage: StageOptions,

        #[command(flatten)]
        run: RunOptions,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage retained session directories
    Sessions {
        #[command(subcommand)]
        command: SessionsCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show each resolved key, where it came from, and what it shadowed
    Show {
        #[arg(long)]
        project_path: Option<PathBuf>,

        #[arg(short, long)]
        language: Option<String>,

        #[arg(long)]
        folder: Option<PathBuf>,

        #[arg(long)]
        training_type: Option<TrainingType>,

        #[command(flatten)]
        stage: StageOptions,
    },
    /// Write a .zume/build.toml with the default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum SessionsCommands {
    /// List kept session directories
    List,
    /// Delete kept session directories
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let work_dir = match cli.work_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_file = match &cli.command {
        Commands::Build { log_file, .. } => log_file.clone(),
        Commands::Batch { output_dir, .. } => Some(
            cmd::resolve_dir(&work_dir, output_dir).join(cmd::batch::BATCH_LOG_FILE),
        ),
        _ => None,
    };
    let _log_guard = zume_build::logging::init(cli.verbose, log_file.as_deref())?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current attempt is killed");
            signal_token.cancel();
        }
    });

    match &cli.command {
        Commands::Build {
            project_path,
            language,
            folder,
            training_type,
            interactive,
            log_file: _,
            stage,
            run,
        } => {
            let target = cmd::build::BuildTarget {
                project_path: project_path.clone(),
                language: language.clone(),
                folder: folder.clone(),
                training_type: *training_type,
            };
            cmd::cmd_build(&work_dir, cli.verbose, target, stage, run, *interactive, cancel).await?;
        }
        Commands::Batch {
            types,
            languages,
            output_dir,
            stage,
            run,
        } => {
            let request = cmd::batch::BatchRequest {
                types,
                languages,
                output_dir,
                stage,
                run,
            };
            cmd::cmd_batch(&work_dir, cli.verbose, request, cancel).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&work_dir, command)?,
        Commands::Sessions { command } => cmd::cmd_sessions(&work_dir, command)?,
    }

    Ok(())
}
