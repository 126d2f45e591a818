//! Retained session management (`zume-build sessions`).

use anyhow::Result;
use console::style;
use std::path::Path;

use zume_build::session::{clean_sessions, list_sessions, sessions_root};

use super::super::SessionsCommands;

pub fn cmd_sessions(work_dir: &Path, command: &SessionsCommands) -> Result<()> {
    match command {
        SessionsCommands::List => {
            let sessions = list_sessions(work_dir)?;
            if sessions.is_empty() {
                println!("No retained sessions in {}", sessions_root(work_dir).display());
                return Ok(());
            }
            for session in &sessions {
                let name = session
                    .dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let marker = if session.live {
                    format!("  {}", style("(running)").yellow())
                } else {
                    String::new()
                };
                match &session.snapshot {
                    Some(snap) => println!(
                        "{}  {}  {}{}",
                        style(&name).bold(),
                        snap.created_at.format("%Y-%m-%d %H:%M:%S"),
                        snap.working_dir.display(),
                        marker
                    ),
                    None => println!("{}  (no snapshot){}", style(&name).bold(), marker),
                }
                if let Some(entry) = &session.last_entry {
                    println!(
                        "    last: {} attempt {} {}",
                        entry.stage, entry.attempt, entry.status
                    );
                }
            }
            Ok(())
        }
        SessionsCommands::Clean => {
            let removed = clean_sessions(work_dir)?;
            println!("Removed {} session director{}", removed, if removed == 1 { "y" } else { "ies" });
            Ok(())
        }
    }
}
