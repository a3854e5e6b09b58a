use chrono::{DateTime, Duration, Utc};
use install_guard_core::{FactorContext, FactorId, PackageMetadata, RiskFactor, RiskFactorCheck};

const FACTOR_ID: FactorId = "maintenance";
pub const MAX_SCORE: u32 = 15;

const ABANDONED_AFTER_DAYS: i64 = 730;
const STALE_AFTER_DAYS: i64 = 365;
const ABANDONED_PENALTY: i64 = 10;
const STALE_PENALTY: i64 = 5;
const NO_MAINTAINER_PENALTY: i64 = 5;
const SINGLE_MAINTAINER_PENALTY: i64 = 2;
const MIN_WEEKLY_DOWNLOADS: u64 = 100;
const LOW_DOWNLOADS_PENALTY: i64 = 3;

pub fn create_factor() -> Box<dyn RiskFactorCheck> {
    Box::new(MaintenanceFactor)
}

pub struct MaintenanceFactor;

impl RiskFactorCheck for MaintenanceFactor {
    fn id(&self) -> FactorId {
        FACTOR_ID
    }

    fn max_score(&self) -> u32 {
        MAX_SCORE
    }

    fn priority(&self) -> u16 {
        40
    }

    fn evaluate(&self, context: &FactorContext<'_>) -> RiskFactor {
        score(context.package, context.now)
    }
}

fn score(package: Option<&PackageMetadata>, now: DateTime<Utc>) -> RiskFactor {
    let Some(package) = package else {
        return RiskFactor::full(FACTOR_ID, MAX_SCORE, "Package metadata unavailable");
    };

    let mut score = i64::from(MAX_SCORE);
    let mut issues = Vec::new();

    if let Some(last_publish) = package.last_publish {
        let age = now.signed_duration_since(last_publish);
        let age_days = age.num_days();
        if age > Duration::days(ABANDONED_AFTER_DAYS) {
            score -= ABANDONED_PENALTY;
            issues.push(format!("last published {age_days} days ago"));
        } else if age > Duration::days(STALE_AFTER_DAYS) {
            score -= STALE_PENALTY;
            issues.push(format!("last published {age_days} days ago"));
        }
    }

    match package.maintainer_count {
        0 => {
            score -= NO_MAINTAINER_PENALTY;
            issues.push("no listed maintainers".to_string());
        }
        1 => {
            score -= SINGLE_MAINTAINER_PENALTY;
            issues.push("single maintainer".to_string());
        }
        _ => {}
    }

    if let Some(downloads) = package.weekly_downloads
        && downloads < MIN_WEEKLY_DOWNLOADS
    {
        score -= LOW_DOWNLOADS_PENALTY;
        issues.push(format!("{downloads} weekly downloads"));
    }

    let reason = if issues.is_empty() {
        "Actively maintained".to_string()
    } else {
        capitalize(&issues.join(", "))
    };
    RiskFactor::new(FACTOR_ID, score, MAX_SCORE, reason)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
