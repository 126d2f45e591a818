use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{Combination, TrainingType};
use crate::orchestrator::{PipelineState, SessionOutcome};
use crate::session::SessionId;
use crate::stage::{Stage, StageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationStatus {
    Succeeded,
    Failed,
}

/// Result of one combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationReport {
    pub combination: Combination,
    pub status: CombinationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<PipelineState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageResult>,
    /// Stage the combination stopped at, if it got as far as running one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retained_dir: Option<PathBuf>,
    pub duration_secs: f64,
}

impl CombinationReport {
    /// Report for a combination that reached the orchestrator.
    pub fn from_outcome(combination: Combination, outcome: SessionOutcome, duration_secs: f64) -> Self {
        let status = if outcome.is_done() {
            CombinationStatus::Succeeded
        } else {
            CombinationStatus::Failed
        };
        let (failed_stage, error) = match outcome.last_error() {
            Some((stage, error)) => (stage, Some(error)),
            None => (None, None),
        };
        Self {
            combination,
            status,
            session_id: Some(outcome.session_id),
            final_state: Some(outcome.final_state()),
            stages: outcome.results,
            failed_stage,
            error,
            retained_dir: outcome.retained_dir,
            duration_secs,
        }
    }

    /// Report for a combination that failed before any stage could run.
    pub fn not_started(combination: Combination, error: impl Into<String>) -> Self {
        Self {
            combination,
            status: CombinationStatus::Failed,
            session_id: None,
            final_state: None,
            stages: Vec::new(),
            failed_stage: None,
            error: Some(error.into()),
            retained_dir: None,
            duration_secs: 0.0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == CombinationStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCombination {
    pub combination: Combination,
    pub stage: Option<Stage>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedCombination>,
    pub duration_secs: f64,
}

/// A whole batch invocation, from first combination to report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub run_id: Uuid,
    pub combinations: Vec<Combination>,
    pub results: Vec<CombinationReport>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchRun {
    pub fn new(combinations: Vec<Combination>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            combinations,
            results: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record(&mut self, report: CombinationReport) {
        self.results.push(report);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn result_for(&self, combination: &Combination) -> Option<&CombinationReport> {
        self.results.iter().find(|r| &r.combination == combination)
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.len() == self.combinations.len() && self.results.iter().all(|r| r.succeeded())
    }

    pub fn failed_combinations(&self) -> Vec<Combination> {
        self.results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.combination.clone())
            .collect()
    }

    pub fn summary(&self) -> BatchSummary {
        let succeeded = self.results.iter().filter(|r| r.succeeded()).count();
        let failures: Vec<FailedCombination> = self
            .results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| FailedCombination {
                combination: r.combination.clone(),
                stage: r.failed_stage,
                error: r.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect();
        let end = self.finished_at.unwrap_or_else(Utc::now);
        BatchSummary {
            total: self.combinations.len(),
            succeeded,
            failed: failures.len(),
            failures,
            duration_secs: (end - self.started_at).num_milliseconds() as f64 / 1000.0,
        }
    }

    /// Commands that re-run exactly the failed combinations.
    ///
    /// Failures are grouped by training type so no succeeded combination is
    /// part of any command's cross product.
    pub fn rerun_commands(&self, extra_args: &[String]) -> Vec<String> {
        let failed = self.failed_combinations();
        let mut types: Vec<TrainingType> = Vec::new();
        for c in &failed {
            if !types.contains(&c.training_type) {
                types.push(c.training_type);
            }
        }

        types
            .into_iter()
            .map(|t| {
                let languages: Vec<&str> = failed
                    .iter()
                    .filter(|c| c.training_type == t)
                    .map(|c| c.language.as_str())
                    .collect();
                let mut parts = vec![
                    "zume-build".to_string(),
                    "batch".to_string(),
                    "--types".to_string(),
                    t.to_string(),
                    "--languages".to_string(),
                ];
                parts.extend(languages.iter().map(|l| l.to_string()));
                parts.extend(extra_args.iter().cloned());
                parts.join(" ")
            })
            .collect()
    }

    /// Write the run as JSON under `reports_dir`, named by start time and run id.
    pub fn write_report(&self, reports_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(reports_dir)
            .with_context(|| format!("Failed to create {}", reports_dir.display()))?;
        let filename = format!(
            "{}_{}.json",
            self.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &self.run_id.to_string()[..8]
        );
        let path = reports_dir.join(filename);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize batch run")?;
        fs::write(&path, json).context("Failed to write batch report")?;
        Ok(path)
    }
}
