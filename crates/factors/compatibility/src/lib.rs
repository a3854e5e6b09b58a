use install_guard_core::{
    CompatibilityReport, FactorContext, FactorId, RiskFactor, RiskFactorCheck,
};

const FACTOR_ID: FactorId = "compatibility";
pub const MAX_SCORE: u32 = 40;

pub fn create_factor() -> Box<dyn RiskFactorCheck> {
    Box::new(CompatibilityFactor)
}

pub struct CompatibilityFactor;

impl RiskFactorCheck for CompatibilityFactor {
    fn id(&self) -> FactorId {
        FACTOR_ID
    }

    fn max_score(&self) -> u32 {
        MAX_SCORE
    }

    fn priority(&self) -> u16 {
        10
    }

    fn evaluate(&self, context: &FactorContext<'_>) -> RiskFactor {
        score(context.compatibility)
    }
}

fn score(report: &CompatibilityReport) -> RiskFactor {
    let total = report.checks.len();
    if total == 0 {
        return RiskFactor::full(FACTOR_ID, MAX_SCORE, "No peer dependencies to satisfy");
    }

    let failed = report.failed_count();
    let penalty = failed as f64 / total as f64;
    let score = (f64::from(MAX_SCORE) * (1.0 - penalty)).round() as i64;

    let reason = if failed == 0 {
        format!("All {total} peer dependencies satisfied")
    } else {
        format!("{failed} of {total} peer dependencies missing or incompatible")
    };
    RiskFactor::new(FACTOR_ID, score, MAX_SCORE, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use install_guard_core::{PeerCheckResult, PeerStatus, SecurityReport};

    fn report(statuses: &[PeerStatus]) -> CompatibilityReport {
        CompatibilityReport::from_checks(
            statuses
                .iter()
                .enumerate()
                .map(|(index, status)| PeerCheckResult {
                    name: format!("peer-{index}"),
                    required: "^1.0.0".to_string(),
                    installed: None,
                    status: *status,
                    fix_command: None,
                })
                .collect(),
        )
    }

    #[test]
    fn no_peers_scores_full() {
        let factor = score(&CompatibilityReport::empty());
        assert_eq!(factor.score, MAX_SCORE);
        assert_eq!(factor.max_score, MAX_SCORE);
    }

    #[test]
    fn optional_missing_is_not_penalized() {
        let factor = score(&report(&[PeerStatus::Compatible, PeerStatus::OptionalMissing]));
        assert_eq!(factor.score, MAX_SCORE);
    }

    #[test]
    fn penalty_is_proportional_to_failures() {
        let factor = score(&report(&[
            PeerStatus::Compatible,
            PeerStatus::Missing,
            PeerStatus::Compatible,
            PeerStatus::Compatible,
        ]));
        assert_eq!(factor.score, 30);
        assert!(factor.reason.contains("1 of 4"));

        let factor = score(&report(&[
            PeerStatus::Compatible,
            PeerStatus::Incompatible,
            PeerStatus::Missing,
        ]));
        assert_eq!(factor.score, 13);
    }

    #[test]
    fn all_failures_score_zero() {
        let factor = score(&report(&[PeerStatus::Missing, PeerStatus::Incompatible]));
        assert_eq!(factor.score, 0);
    }

    #[test]
    fn score_does_not_increase_with_more_failures() {
        let mut previous = MAX_SCORE;
        for failures in 0..=5 {
            let mut statuses = vec![PeerStatus::Compatible; 5 - failures];
            statuses.extend(vec![PeerStatus::Incompatible; failures]);
            let factor = score(&report(&statuses));
            assert!(factor.score <= previous);
            previous = factor.score;
        }
    }

    #[test]
    fn evaluate_reads_compatibility_from_context() {
        let compatibility = report(&[PeerStatus::Missing]);
        let security = SecurityReport::empty();
        let context = FactorContext {
            compatibility: &compatibility,
            security: &security,
            package: None,
            now: Utc::now(),
        };
        let factor = CompatibilityFactor.evaluate(&context);
        assert_eq!(factor.name, "compatibility");
        assert_eq!(factor.score, 0);
    }
}
