use super::common::*;
use crate::workflows::approval::decision::reconcile;
use crate::workflows::approval::{
    decide, ComplianceIssue, DecisionPolicy, DecisionReason, DecisionState, PaymentRecord,
    PaymentStatus, RegistrationType,
};

#[test]
fn passing_score_only_waits_for_payment() {
    let decision = decide(
        &analysis(0.8, &[]),
        &both_registered(),
        &unpaid(),
        &DecisionPolicy::default(),
        decided_at(),
    );

    assert_eq!(decision.state, DecisionState::Pending);
    assert_eq!(decision.reason_tags(), vec!["awaiting_payment".to_string()]);
    assert!(decision.advisories.is_empty());
}

#[test]
fn confirmed_payment_approves_passing_plan() {
    let decision = decide(
        &analysis(0.8, &[]),
        &both_registered(),
        &confirmed(),
        &DecisionPolicy::default(),
        decided_at(),
    );

    assert_eq!(decision.state, DecisionState::Approved);
    assert!(decision.reasons.is_empty());
}

#[test]
fn low_score_rejects_regardless_of_payment() {
    let issues = [
        ComplianceIssue::MissingSitePlan,
        ComplianceIssue::MissingStructuralDrawings,
    ];
    let decision = decide(
        &analysis(0.3, &issues),
        &both_registered(),
        &confirmed(),
        &DecisionPolicy::default(),
        decided_at(),
    );

    assert_eq!(decision.state, DecisionState::Rejected);
    assert!(decision.reasons.contains(&DecisionReason::ScoreBelowThreshold));
    assert!(decision
        .reasons
        .contains(&DecisionReason::Compliance(ComplianceIssue::MissingSitePlan)));
    assert!(decision.summary().starts_with("rejected"));
}

#[test]
fn score_equal_to_threshold_passes() {
    let decision = decide(
        &analysis(0.75, &[]),
        &both_registered(),
        &confirmed(),
        &DecisionPolicy::default(),
        decided_at(),
    );

    assert_eq!(decision.state, DecisionState::Approved);
}

#[test]
fn absent_registration_is_advisory_by_default() {
    let verifications = vec![
        verification(RegistrationType::Boraqs, false),
        verification(RegistrationType::Ebk, true),
    ];
    let decision = decide(
        &analysis(0.8, &[]),
        &verifications,
        &confirmed(),
        &DecisionPolicy::default(),
        decided_at(),
    );

    assert_eq!(decision.state, DecisionState::Approved);
    assert_eq!(
        decision.advisory_tags(),
        vec!["boraqs_not_registered".to_string()]
    );
}

#[test]
fn blocking_policy_rejects_unregistered_professionals() {
    let policy = DecisionPolicy {
        verification_blocks_approval: true,
        ..DecisionPolicy::default()
    };
    let verifications = vec![
        verification(RegistrationType::Boraqs, true),
        verification(RegistrationType::Ebk, false),
    ];

    let decision = decide(
        &analysis(0.8, &[]),
        &verifications,
        &confirmed(),
        &policy,
        decided_at(),
    );

    assert_eq!(decision.state, DecisionState::Rejected);
    assert!(decision
        .reasons
        .contains(&DecisionReason::ProfessionalNotRegistered(RegistrationType::Ebk)));
}

#[test]
fn blocking_policy_keeps_missing_verification_pending() {
    let policy = DecisionPolicy {
        verification_blocks_approval: true,
        ..DecisionPolicy::default()
    };
    let verifications = vec![verification(RegistrationType::Boraqs, true)];

    let decision = decide(
        &analysis(0.8, &[]),
        &verifications,
        &confirmed(),
        &policy,
        decided_at(),
    );

    assert_eq!(decision.state, DecisionState::Pending);
    assert_eq!(
        decision.reason_tags(),
        vec!["ebk_verification_missing".to_string()]
    );
}

#[test]
fn failed_payment_is_a_reason() {
    let payment = PaymentRecord {
        status: PaymentStatus::Failed,
        failure: Some("insufficient funds".to_string()),
        ..unpaid()
    };

    let decision = decide(
        &analysis(0.8, &[]),
        &both_registered(),
        &payment,
        &DecisionPolicy::default(),
        decided_at(),
    );

    assert_eq!(decision.state, DecisionState::Pending);
    assert!(decision.reasons.contains(&DecisionReason::PaymentFailed));
}

#[test]
fn decision_is_pure() {
    let inputs = (analysis(0.8, &[]), both_registered(), unpaid());
    let policy = DecisionPolicy::default();

    let first = decide(&inputs.0, &inputs.1, &inputs.2, &policy, decided_at());
    let second = decide(&inputs.0, &inputs.1, &inputs.2, &policy, decided_at());

    assert_eq!(first, second);
}

#[test]
fn approval_never_regresses() {
    let approved = decide(
        &analysis(0.8, &[]),
        &both_registered(),
        &confirmed(),
        &DecisionPolicy::default(),
        decided_at(),
    );
    let later = decide(
        &analysis(0.3, &[ComplianceIssue::MissingSitePlan]),
        &both_registered(),
        &unpaid(),
        &DecisionPolicy::default(),
        decided_at(),
    );

    let reconciled = reconcile(Some(&approved), later.clone());
    assert_eq!(reconciled, approved);

    let without_history = reconcile(None, later.clone());
    assert_eq!(without_history, later);
}
