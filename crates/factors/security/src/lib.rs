use install_guard_core::{
    FactorContext, FactorId, RiskFactor, RiskFactorCheck, SecurityReport, Severity,
};

const FACTOR_ID: FactorId = "security";
pub const MAX_SCORE: u32 = 30;

const CRITICAL_WEIGHT: usize = 15;
const HIGH_WEIGHT: usize = 8;
const MODERATE_WEIGHT: usize = 3;

pub fn create_factor() -> Box<dyn RiskFactorCheck> {
    Box::new(SecurityFactor)
}

pub struct SecurityFactor;

impl RiskFactorCheck for SecurityFactor {
    fn id(&self) -> FactorId {
        FACTOR_ID
    }

    fn max_score(&self) -> u32 {
        MAX_SCORE
    }

    fn priority(&self) -> u16 {
        20
    }

    fn evaluate(&self, context: &FactorContext<'_>) -> RiskFactor {
        score(context.security)
    }
}

fn score(report: &SecurityReport) -> RiskFactor {
    let total = report.vulnerabilities.len();
    if total == 0 {
        return RiskFactor::full(FACTOR_ID, MAX_SCORE, "No known vulnerabilities");
    }

    let critical = report.count(Severity::Critical);
    let high = report.count(Severity::High);
    let moderate = report.count(Severity::Moderate);
    let low = report.count(Severity::Low);

    // Low severity advisories are listed in the reason but carry no weight.
    let weighted = critical * CRITICAL_WEIGHT + high * HIGH_WEIGHT + moderate * MODERATE_WEIGHT;
    let penalty = (weighted as f64 / f64::from(MAX_SCORE)).min(1.0);
    let score = (f64::from(MAX_SCORE) * (1.0 - penalty)).round() as i64;

    let reason = format!(
        "{total} known vulnerabilit{} ({critical} critical, {high} high, {moderate} moderate, {low} low)",
        if total == 1 { "y" } else { "ies" }
    );
    RiskFactor::new(FACTOR_ID, score, MAX_SCORE, reason)
}
