use super::config::IssueRule;

/// Rules whose markers are all absent from `text`. Empty text trips every rule.
pub(crate) fn detect_issues<'a>(text: &str, rules: &'a [IssueRule]) -> Vec<&'a IssueRule> {
    let haystack = text.to_lowercase();
    if haystack.trim().is_empty() {
        return rules.iter().collect();
    }

    rules
        .iter()
        .filter(|rule| {
            !rule
                .markers
                .iter()
                .any(|marker| haystack.contains(&marker.to_lowercase()))
        })
        .collect()
}

pub(crate) fn sanitize_penalty(penalty: f64) -> f64 {
    if penalty.is_finite() && penalty > 0.0 {
        penalty
    } else {
        0.0
    }
}

/// Clamps into `[0, 1]` and rounds to three decimals.
pub(crate) fn bounded_score(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let clamped = raw.clamp(0.0, 1.0);
    ((clamped * 1000.0).round() / 1000.0).clamp(0.0, 1.0)
}
