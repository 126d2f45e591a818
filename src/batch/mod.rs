//! Batch builds over (training type, language) combinations.

mod coordinator;
mod report;

pub use coordinator::BatchCoordinator;
pub use report::{BatchRun, BatchSummary, CombinationReport, CombinationStatus, FailedCombination};

use serde::{Deserialize, Serialize};

/// Training format a package is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrainingType {
    #[serde(rename = "10")]
    TenSession,
    #[serde(rename = "20")]
    TwentySession,
    #[serde(rename = "intensive")]
    Intensive,
}

impl TrainingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingType::TenSession => "10",
            TrainingType::TwentySession => "20",
            TrainingType::Intensive => "intensive",
        }
    }
}

impl std::fmt::Display for TrainingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrainingType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "10" => Ok(TrainingType::TenSession),
            "20" => Ok(TrainingType::TwentySession),
            "intensive" => Ok(TrainingType::Intensive),
            _ => anyhow::bail!("Invalid training type '{}'. Valid values: 10, 20, intensive", s),
        }
    }
}

/// One batch unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combination {
    pub training_type: TrainingType,
    pub language: String,
}

impl Combination {
    pub fn new(training_type: TrainingType, language: impl Into<String>) -> Self {
        Self {
            training_type,
            language: language.into(),
        }
    }
}

impl std::fmt::Display for Combination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type={}, lang={}", self.training_type, self.language)
    }
}

/// Cross product in caller order: types outer, languages inner.
/// Exact duplicates are dropped, keeping the first occurrence.
pub fn combinations(types: &[TrainingType], languages: &[String]) -> Vec<Combination> {
    let mut out: Vec<Combination> = Vec::with_capacity(types.len() * languages.len());
    for training_type in types {
        for language in languages {
            let combo = Combination::new(*training_type, language.clone());
            if !out.contains(&combo) {
                out.push(combo);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_product_order() {
        let langs = vec!["en".to_string(), "es".to_string()];
        let combos = combinations(&[TrainingType::TenSession, TrainingType::Intensive], &langs);
        let rendered: Vec<String> = combos.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "type=10, lang=en",
                "type=10, lang=es",
                "type=intensive, lang=en",
                "type=intensive, lang=es",
            ]
        );
    }

    #[test]
    fn test_duplicates_dropped() {
        let langs = vec!["en".to_string(), "en".to_string()];
        assert_eq!(combinations(&[TrainingType::TwentySession], &langs).len(), 1);
    }

    #[test]
    fn test_training_type_parse() {
        assert_eq!("20".parse::<TrainingType>().unwrap(), TrainingType::TwentySession);
        assert_eq!("Intensive".parse::<TrainingType>().unwrap(), TrainingType::Intensive);
        assert!("30".parse::<TrainingType>().is_err());
    }
}
