use install_guard_core::{
    Action, CompatibilityReport, PackageMetadata, RiskScore, SecurityReport,
};
use serde::{Deserialize, Serialize};

/// Combined verdict for installing one package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub package_name: String,
    pub compatibility: CompatibilityReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_info: Option<PackageMetadata>,
    pub security: SecurityReport,
    pub risk_score: RiskScore,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestScanReport {
    pub manifest: String,
    pub total: usize,
    pub allowed: usize,
    pub warned: usize,
    pub blocked: usize,
    /// Most severe action across all packages; `ALLOW` for an empty manifest.
    pub action: Action,
    pub packages: Vec<ValidationResult>,
}

impl ManifestScanReport {
    pub fn from_results(manifest: String, packages: Vec<ValidationResult>) -> Self {
        let count = |action: Action| packages.iter().filter(|r| r.action == action).count();
        Self {
            total: packages.len(),
            allowed: count(Action::Allow),
            warned: count(Action::Warn),
            blocked: count(Action::Block),
            action: packages
                .iter()
                .map(|result| result.action)
                .max()
                .unwrap_or(Action::Allow),
            manifest,
            packages,
        }
    }
}
