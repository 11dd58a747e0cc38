mod policy;

pub use policy::DecisionPolicy;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AnalysisResult, ComplianceIssue, PaymentRecord, PaymentStatus, RegistrationType,
    VerificationRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    Pending,
    Approved,
    Rejected,
}

impl DecisionState {
    pub const fn label(self) -> &'static str {
        match self {
            DecisionState::Pending => "pending",
            DecisionState::Approved => "approved",
            DecisionState::Rejected => "rejected",
        }
    }
}

/// Why a decision is not (yet) an approval, or what a reviewer should look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    ScoreBelowThreshold,
    Compliance(ComplianceIssue),
    ProfessionalNotRegistered(RegistrationType),
    VerificationMissing(RegistrationType),
    AwaitingPayment,
    PaymentFailed,
}

impl DecisionReason {
    pub fn tag(&self) -> String {
        match self {
            DecisionReason::ScoreBelowThreshold => "score_below_threshold".to_string(),
            DecisionReason::Compliance(issue) => issue.label().to_string(),
            DecisionReason::ProfessionalNotRegistered(kind) => {
                format!("{}_not_registered", kind.label())
            }
            DecisionReason::VerificationMissing(kind) => {
                format!("{}_verification_missing", kind.label())
            }
            DecisionReason::AwaitingPayment => "awaiting_payment".to_string(),
            DecisionReason::PaymentFailed => "payment_failed".to_string(),
        }
    }
}

/// Gate outcome. `reasons` block approval; `advisories` are surfaced without blocking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub state: DecisionState,
    pub reasons: BTreeSet<DecisionReason>,
    pub advisories: BTreeSet<DecisionReason>,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalDecision {
    /// Equality ignoring `decided_at`.
    pub fn same_outcome(&self, other: &ApprovalDecision) -> bool {
        self.state == other.state
            && self.reasons == other.reasons
            && self.advisories == other.advisories
    }

    pub fn reason_tags(&self) -> Vec<String> {
        self.reasons.iter().map(DecisionReason::tag).collect()
    }

    pub fn advisory_tags(&self) -> Vec<String> {
        self.advisories.iter().map(DecisionReason::tag).collect()
    }

    pub fn summary(&self) -> String {
        match self.state {
            DecisionState::Approved => "plan approved".to_string(),
            DecisionState::Pending if self.reasons.is_empty() => "decision pending".to_string(),
            DecisionState::Pending => format!("pending: {}", self.reason_tags().join(", ")),
            DecisionState::Rejected => format!("rejected: {}", self.reason_tags().join(", ")),
        }
    }
}

/// Combines analysis, registry findings and payment into a decision.
///
/// Pure: identical inputs (including `decided_at`) yield identical decisions.
pub fn decide(
    analysis: &AnalysisResult,
    verifications: &[VerificationRecord],
    payment: &PaymentRecord,
    policy: &DecisionPolicy,
    decided_at: DateTime<Utc>,
) -> ApprovalDecision {
    let mut reasons = BTreeSet::new();
    let mut advisories = BTreeSet::new();
    let findings = registry_findings(verifications, &policy.required_registrations);
    let compliance = analysis.issues.iter().copied().map(DecisionReason::Compliance);

    if analysis.approval_score < policy.score_threshold {
        reasons.insert(DecisionReason::ScoreBelowThreshold);
        reasons.extend(compliance);
        advisories.extend(findings);
        return ApprovalDecision {
            state: DecisionState::Rejected,
            reasons,
            advisories,
            decided_at,
        };
    }

    advisories.extend(compliance);
    if policy.verification_blocks_approval {
        reasons.extend(findings);
    } else {
        advisories.extend(findings);
    }

    let unregistered = reasons
        .iter()
        .any(|reason| matches!(reason, DecisionReason::ProfessionalNotRegistered(_)));
    if unregistered {
        return ApprovalDecision {
            state: DecisionState::Rejected,
            reasons,
            advisories,
            decided_at,
        };
    }

    match payment.status {
        PaymentStatus::Confirmed => {}
        PaymentStatus::Unpaid => {
            reasons.insert(DecisionReason::AwaitingPayment);
        }
        PaymentStatus::Failed => {
            reasons.insert(DecisionReason::PaymentFailed);
        }
    }

    let state = if reasons.is_empty() {
        DecisionState::Approved
    } else {
        DecisionState::Pending
    };

    ApprovalDecision {
        state,
        reasons,
        advisories,
        decided_at,
    }
}

/// Keeps an earlier approval in place; approvals never regress.
pub fn reconcile(previous: Option<&ApprovalDecision>, next: ApprovalDecision) -> ApprovalDecision {
    match previous {
        Some(existing) if existing.state == DecisionState::Approved => existing.clone(),
        _ => next,
    }
}

fn registry_findings(
    verifications: &[VerificationRecord],
    required: &[RegistrationType],
) -> Vec<DecisionReason> {
    required
        .iter()
        .filter_map(|kind| {
            match verifications
                .iter()
                .find(|record| record.registration_type == *kind)
            {
                None => Some(DecisionReason::VerificationMissing(*kind)),
                Some(record) if !record.present => {
                    Some(DecisionReason::ProfessionalNotRegistered(*kind))
                }
                Some(_) => None,
            }
        })
        .collect()
}
