use serde::{Deserialize, Serialize};

use super::super::domain::RegistrationType;

pub(crate) const DEFAULT_SCORE_THRESHOLD: f64 = 0.75;

/// Thresholds the decision gate applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    pub score_threshold: f64,
    pub required_registrations: Vec<RegistrationType>,
    /// When false, registry findings are advisory and never block approval.
    pub verification_blocks_approval: bool,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            required_registrations: RegistrationType::ALL.to_vec(),
            verification_blocks_approval: false,
        }
    }
}
