use serde::{Deserialize, Serialize};

use super::super::domain::ComplianceIssue;

pub(crate) const DEFAULT_BASE_SCORE: f64 = 0.8;

/// Scoring rubric: a base score reduced by the penalty of every detected issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub base_score: f64,
    pub rules: Vec<IssueRule>,
}

/// An issue is detected when none of its markers appear in the extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRule {
    pub issue: ComplianceIssue,
    pub markers: Vec<String>,
    pub penalty: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_score: DEFAULT_BASE_SCORE,
            rules: vec![
                IssueRule {
                    issue: ComplianceIssue::MissingSitePlan,
                    markers: vec!["site plan".to_string()],
                    penalty: 0.2,
                },
                IssueRule {
                    issue: ComplianceIssue::MissingStructuralDrawings,
                    markers: vec!["structural".to_string()],
                    penalty: 0.3,
                },
            ],
        }
    }
}
