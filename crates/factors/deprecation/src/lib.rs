use install_guard_core::{FactorContext, FactorId, PackageMetadata, RiskFactor, RiskFactorCheck};

const FACTOR_ID: FactorId = "deprecation";
pub const MAX_SCORE: u32 = 15;

pub fn create_factor() -> Box<dyn RiskFactorCheck> {
    Box::new(DeprecationFactor)
}

pub struct DeprecationFactor;

impl RiskFactorCheck for DeprecationFactor {
    fn id(&self) -> FactorId {
        FACTOR_ID
    }

    fn max_score(&self) -> u32 {
        MAX_SCORE
    }

    fn priority(&self) -> u16 {
        30
    }

    fn evaluate(&self, context: &FactorContext<'_>) -> RiskFactor {
        score(context.package)
    }
}

fn score(package: Option<&PackageMetadata>) -> RiskFactor {
    let Some(package) = package else {
        return RiskFactor::full(FACTOR_ID, MAX_SCORE, "Package metadata unavailable");
    };

    match package.deprecated.as_deref() {
        Some(message) => RiskFactor::new(
            FACTOR_ID,
            0,
            MAX_SCORE,
            format!("Deprecated: {message}"),
        ),
        None => RiskFactor::full(FACTOR_ID, MAX_SCORE, "Not deprecated"),
    }
}
