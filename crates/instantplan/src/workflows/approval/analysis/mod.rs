mod config;
mod rules;

pub use config::{AnalysisConfig, IssueRule};

use super::domain::{AnalysisResult, ExtractionResult};
use config::DEFAULT_BASE_SCORE;
use tracing::debug;

/// Scores extracted plan text. Implementations must be pure and deterministic.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, extraction: &ExtractionResult) -> AnalysisResult;
}

/// Keyword rubric scoring driven by [`AnalysisConfig`].
#[derive(Debug, Clone)]
pub struct RuleBasedAnalyzer {
    config: AnalysisConfig,
}

impl Default for RuleBasedAnalyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl RuleBasedAnalyzer {
    pub fn new(mut config: AnalysisConfig) -> Self {
        if !(config.base_score.is_finite() && (0.0..=1.0).contains(&config.base_score)) {
            config.base_score = DEFAULT_BASE_SCORE;
        }
        for rule in &mut config.rules {
            rule.penalty = rules::sanitize_penalty(rule.penalty);
        }
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }
}

impl Analyzer for RuleBasedAnalyzer {
    fn analyze(&self, extraction: &ExtractionResult) -> AnalysisResult {
        let detected = rules::detect_issues(&extraction.text, &self.config.rules);
        let penalty: f64 = detected.iter().map(|rule| rule.penalty).sum();
        let approval_score = rules::bounded_score(self.config.base_score - penalty);
        let issues = detected.iter().map(|rule| rule.issue).collect();

        debug!(approval_score, issue_count = detected.len(), "plan text scored");

        AnalysisResult {
            approval_score,
            issues,
        }
    }
}
