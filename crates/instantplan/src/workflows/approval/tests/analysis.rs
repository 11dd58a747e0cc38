use super::common::*;
use crate::workflows::approval::{
    AnalysisConfig, Analyzer, ComplianceIssue, ExtractionResult, IssueRule, RuleBasedAnalyzer,
};

#[test]
fn complete_plan_scores_base_without_issues() {
    let analyzer = RuleBasedAnalyzer::default();

    let result = analyzer.analyze(&extraction(APPROVABLE_PLAN));

    assert_eq!(result.approval_score, 0.8);
    assert!(result.issues.is_empty());
}

#[test]
fn missing_markers_reduce_score_per_rule() {
    let analyzer = RuleBasedAnalyzer::default();

    let result = analyzer.analyze(&extraction(INCOMPLETE_PLAN));

    assert_eq!(result.approval_score, 0.3);
    assert!(result.issues.contains(&ComplianceIssue::MissingSitePlan));
    assert!(result.issues.contains(&ComplianceIssue::MissingStructuralDrawings));
}

#[test]
fn markers_match_case_insensitively() {
    let analyzer = RuleBasedAnalyzer::default();

    let result = analyzer.analyze(&extraction("SITE PLAN attached\nsee STRUCTURAL sheet S-01"));

    assert_eq!(result.approval_score, 0.8);
}

#[test]
fn empty_text_trips_every_rule() {
    let analyzer = RuleBasedAnalyzer::default();

    let result = analyzer.analyze(&ExtractionResult::default());

    assert_eq!(result.issues.len(), 2);
    assert_eq!(result.approval_score, 0.3);
}

#[test]
fn score_stays_within_unit_interval_for_hostile_rubrics() {
    let rubrics = [
        AnalysisConfig {
            base_score: f64::NAN,
            rules: Vec::new(),
        },
        AnalysisConfig {
            base_score: 0.8,
            rules: vec![IssueRule {
                issue: ComplianceIssue::MissingSitePlan,
                markers: vec!["site plan".to_string()],
                penalty: 7.5,
            }],
        },
        AnalysisConfig {
            base_score: 0.8,
            rules: vec![IssueRule {
                issue: ComplianceIssue::MissingStructuralDrawings,
                markers: vec!["structural".to_string()],
                penalty: -3.0,
            }],
        },
        AnalysisConfig {
            base_score: 4.0,
            rules: vec![IssueRule {
                issue: ComplianceIssue::MissingSitePlan,
                markers: Vec::new(),
                penalty: f64::INFINITY,
            }],
        },
    ];

    for rubric in rubrics {
        let analyzer = RuleBasedAnalyzer::new(rubric);
        for text in ["", "site plan", "structural", APPROVABLE_PLAN] {
            let score = analyzer.analyze(&extraction(text)).approval_score;
            assert!(
                score.is_finite() && (0.0..=1.0).contains(&score),
                "score {score} escaped [0, 1] for {text:?}"
            );
        }
    }
}

#[test]
fn analysis_is_deterministic() {
    let analyzer = RuleBasedAnalyzer::default();
    let input = extraction(INCOMPLETE_PLAN);

    assert_eq!(analyzer.analyze(&input), analyzer.analyze(&input));
}
