//! Weighted risk scoring across the registered risk factors.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use install_guard_core::{
    Action, CompatibilityReport, FactorContext, PackageMetadata, RiskFactorCheck, RiskScore,
    SecurityReport,
};

/// Scores strictly above this are allowed.
pub const ALLOW_ABOVE: u32 = 75;
/// Scores strictly above this (and not above [`ALLOW_ABOVE`]) warn; the rest block.
pub const WARN_ABOVE: u32 = 40;

/// Scores a package against every registered factor using the current time.
pub fn calculate_risk_score(
    compatibility: &CompatibilityReport,
    security: &SecurityReport,
    package: Option<&PackageMetadata>,
) -> RiskScore {
    calculate_risk_score_at(compatibility, security, package, Utc::now())
}

pub fn calculate_risk_score_at(
    compatibility: &CompatibilityReport,
    security: &SecurityReport,
    package: Option<&PackageMetadata>,
    now: DateTime<Utc>,
) -> RiskScore {
    let context = FactorContext {
        compatibility,
        security,
        package,
        now,
    };

    let factors = registered_factors()
        .iter()
        .map(|factor| factor.evaluate(&context))
        .collect::<Vec<_>>();
    let score = factors.iter().map(|factor| factor.score).sum::<u32>();

    RiskScore {
        score,
        action: action_for_score(score),
        factors,
    }
}

pub fn action_for_score(score: u32) -> Action {
    if score > ALLOW_ABOVE {
        Action::Allow
    } else if score > WARN_ABOVE {
        Action::Warn
    } else {
        Action::Block
    }
}

fn registered_factors() -> &'static [Box<dyn RiskFactorCheck>] {
    static FACTORS: OnceLock<Vec<Box<dyn RiskFactorCheck>>> = OnceLock::new();
    FACTORS
        .get_or_init(|| {
            let mut factors = Vec::new();
            let mut registered_ids = HashSet::new();
            for create_factor in crate::app_factor_factories() {
                let factor = create_factor();
                if !registered_ids.insert(factor.id()) {
                    panic!("duplicate risk factor registration for '{}'", factor.id());
                }
                factors.push(factor);
            }
            // Lower priority number runs first.
            factors.sort_by_key(|factor| factor.priority());
            factors
        })
        .as_slice()
}

#[cfg(test)]
#[path = "tests/scoring.rs"]
mod tests;
