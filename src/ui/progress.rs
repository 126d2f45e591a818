use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::stage::{Stage, StageResult, StageStatus};
use crate::ui::icons::{CHECK, CROSS, PACKAGE, RUNNING, SKIP, STOP};

/// Terminal progress for one build session.
///
/// Two stacked bars: a stage bar counting settled stages, and a spinner with
/// elapsed time for the stage currently running. Output goes through
/// `MultiProgress` so log lines don't tear the bars.
pub struct BuildUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    spinner: ProgressBar,
    verbose: bool,
}

impl BuildUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");
        let stage_bar = multi.add(ProgressBar::new(Stage::ALL.len() as u64));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");

        let spinner_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg} {elapsed:.dim}")
            .expect("progress bar template is a valid static string");
        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.set_style(spinner_style);
        spinner.set_prefix("   Run");

        Self {
            multi,
            stage_bar,
            spinner,
            verbose,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn session_header(&self, session_short: &str, description: &str) {
        self.print_line(format!(
            "{}{} {}",
            PACKAGE,
            style(format!("Session {}", session_short)).bold(),
            style(description).dim()
        ));
    }

    pub fn start_stage(&self, stage: Stage) {
        self.stage_bar
            .set_message(format!("{}: {}", style(stage.ordinal()).yellow(), stage.label()));
        self.spinner
            .set_message(format!("{}{}", RUNNING, style(stage.name()).cyan()));
        self.spinner.reset_elapsed();
        self.spinner.enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!("  {} {}", style("→").dim(), stage.label()));
        }
    }

    pub fn stage_finished(&self, result: &StageResult) {
        self.spinner.disable_steady_tick();
        self.stage_bar.inc(1);
        let line = match result.status {
            StageStatus::Succeeded => format!(
                "  {}{} {}",
                CHECK,
                result.stage.label(),
                style(format!("({} attempt{})", result.attempts, plural(result.attempts))).dim()
            ),
            StageStatus::Failed => format!(
                "  {}{} {}{}",
                CROSS,
                style(result.stage.label()).red(),
                style(format!("after {} attempt{}", result.attempts, plural(result.attempts)))
                    .dim(),
                result
                    .last_error
                    .as_deref()
                    .map(|e| format!(": {}", e))
                    .unwrap_or_default()
            ),
            StageStatus::Skipped => format!(
                "  {}{}",
                SKIP,
                style(format!("{} skipped", result.stage.label())).dim()
            ),
        };
        self.print_line(line);
    }

    pub fn aborted(&self, reason: &str) {
        self.spinner.finish_and_clear();
        self.stage_bar.abandon_with_message(format!("{}", style("aborted").red()));
        self.print_line(format!("  {}{}", STOP, style(reason).red()));
    }

    pub fn done(&self) {
        self.spinner.finish_and_clear();
        self.stage_bar
            .finish_with_message(format!("{}", style("done").green()));
    }
}

fn plural(n: u32) -> &'static str {
    if n == 1 { "" } else { "s" }
}
