use serde::{Deserialize, Serialize};

use super::analysis::AnalysisConfig;
use super::decision::DecisionPolicy;
use super::domain::Fee;
use super::retry::RetryPolicy;

/// What happens when a registry stays unreachable after the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableVerification {
    /// Record the registration as not present.
    TreatAsAbsent,
    /// Record nothing; the decision notes the missing verification.
    ExcludePendingRetry,
}

/// Knobs for a single approval pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub analysis: AnalysisConfig,
    pub decision: DecisionPolicy,
    pub retry: RetryPolicy,
    pub fee: Fee,
    pub verification_host: String,
    pub unavailable_verification: UnavailableVerification,
    pub allow_revisions: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            decision: DecisionPolicy::default(),
            retry: RetryPolicy::default(),
            fee: Fee {
                amount_minor: 50_000,
                currency: "KES".to_string(),
            },
            verification_host: "example.com".to_string(),
            unavailable_verification: UnavailableVerification::TreatAsAbsent,
            allow_revisions: true,
        }
    }
}
