//! Rule eligibility and detection selection for the SIEM query pipeline.
//!
//! Ensures only `fact*`/`prof*` detections ever reach the SIEM adapter, preventing
//! noisy or unauthorized queries from investigation/response stages.

use serde::{Deserialize, Serialize};
use soc_core::{Detection, EligibleDetection};

const ELIGIBLE_TYPES: &[&str] = &["factfeature", "profilefeature"];

/// True if a detection's rule name or rule type marks it eligible for SIEM queries.
pub fn is_fact_or_profile(rule_name: &str, rule_type: &str) -> bool {
    let name = rule_name.to_lowercase();
    let kind = rule_type.to_lowercase();

    let name_eligible = name.starts_with("fact") || name.starts_with("prof");
    let type_eligible = !kind.is_empty() && ELIGIBLE_TYPES.contains(&kind.as_str());

    name_eligible || type_eligible
}

/// Per-rule counts produced alongside the eligible detection list, for the audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EligibilityBreakdown {
    pub total: usize,
    pub kept: usize,
    pub skipped: usize,
    pub skipped_reasons: Vec<String>,
}

/// Filter raw detections down to those eligible for SIEM querying, with a breakdown
/// of why detections were skipped (not fact*/prof*, missing filter, invalid window).
pub fn select_eligible_detections(
    detections: &[Detection],
) -> (Vec<EligibleDetection>, EligibilityBreakdown) {
    let mut eligible = Vec::new();
    let mut breakdown = EligibilityBreakdown {
        total: detections.len(),
        ..Default::default()
    };

    for detection in detections {
        if !is_fact_or_profile(&detection.rule_name, &detection.rule_type) {
            breakdown.skipped += 1;
            breakdown
                .skipped_reasons
                .push(format!("{}: not a fact*/prof* rule", detection.rule_name));
            continue;
        }

        if detection.event_filter.trim().is_empty() {
            breakdown.skipped += 1;
            breakdown
                .skipped_reasons
                .push(format!("{}: empty event_filter", detection.detection_id));
            continue;
        }

        if detection.from_time <= 0 || detection.to_time <= 0 {
            breakdown.skipped += 1;
            breakdown
                .skipped_reasons
                .push(format!("{}: invalid time window", detection.detection_id));
            continue;
        }

        eligible.push(EligibleDetection::from(detection.clone()));
    }

    breakdown.kept = eligible.len();
    (eligible, breakdown)
}

/// Group eligible detections by identical `event_filter`, so the SIEM executor can
/// issue one query per distinct filter and fan results back out to every detection.
pub fn deduplicate_queries(
    detections: &[EligibleDetection],
) -> Vec<(String, Vec<EligibleDetection>)> {
    let mut groups: Vec<(String, Vec<EligibleDetection>)> = Vec::new();

    for detection in detections {
        let key = detection.event_filter.trim().to_string();
        match groups.iter_mut().find(|(k, _)| k == &key) {
            Some((_, members)) => members.push(detection.clone()),
            None => groups.push((key, vec![detection.clone()])),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(id: &str, rule_name: &str, rule_type: &str) -> Detection {
        Detection {
            detection_id: id.into(),
            rule_name: rule_name.into(),
            rule_type: rule_type.into(),
            event_filter: "user=alice".into(),
            from_time: 1_000,
            to_time: 2_000,
        }
    }

    #[test]
    fn fact_and_profile_prefixes_are_eligible() {
        assert!(is_fact_or_profile("factLogonAnomaly", ""));
        assert!(is_fact_or_profile("ProfileRareLocation", ""));
        assert!(!is_fact_or_profile("correlationRuleX", ""));
    }

    #[test]
    fn rule_type_alone_can_make_a_detection_eligible() {
        assert!(is_fact_or_profile("customRule", "FactFeature"));
    }

    #[test]
    fn filters_out_non_matching_and_invalid_detections() {
        let detections = vec![
            detection("d1", "factLogonAnomaly", ""),
            detection("d2", "correlationRuleX", ""),
            Detection {
                from_time: 0,
                ..detection("d3", "profileRare", "")
            },
        ];

        let (eligible, breakdown) = select_eligible_detections(&detections);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].detection_id, "d1");
        assert_eq!(breakdown.total, 3);
        assert_eq!(breakdown.kept, 1);
        assert_eq!(breakdown.skipped, 2);
    }

    #[test]
    fn dedupes_identical_event_filters() {
        let detections = vec![
            EligibleDetection::from(detection("d1", "factA", "")),
            EligibleDetection::from(detection("d2", "factB", "")),
        ];
        let groups = deduplicate_queries(&detections);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 2);
    }
}
