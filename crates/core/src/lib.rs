use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub type FactorId = &'static str;
pub type FactorFactory = fn() -> Box<dyn RiskFactorCheck>;

/// Dependency name to the range string declared in the consumer's manifest.
pub type InstalledDependencies = BTreeMap<String, String>;

/// Number of ancestor directories searched above the project path for a manifest.
pub const MANIFEST_SEARCH_ANCESTORS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Parses advisory database severity labels. `MEDIUM` is accepted as an alias.
    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MODERATE" | "MEDIUM" => Some(Self::Moderate),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRequirement {
    pub name: String,
    pub range: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerStatus {
    Compatible,
    Incompatible,
    Missing,
    OptionalMissing,
}

impl PeerStatus {
    /// MISSING and INCOMPATIBLE block compatibility; the other states do not.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Missing | Self::Incompatible)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerCheckResult {
    pub name: String,
    pub required: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed: Option<String>,
    pub status: PeerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub checks: Vec<PeerCheckResult>,
    pub compatible: bool,
}

impl CompatibilityReport {
    /// Report used whenever there is nothing to validate against.
    pub fn empty() -> Self {
        Self {
            checks: Vec::new(),
            compatible: true,
        }
    }

    pub fn from_checks(checks: Vec<PeerCheckResult>) -> Self {
        let compatible = !checks.iter().any(|check| check.status.is_failure());
        Self { checks, compatible }
    }

    pub fn failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|check| check.status.is_failure())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub name: String,
    pub resolved_version: String,
    #[serde(default)]
    pub peer_requirements: Vec<PeerRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_publish: Option<DateTime<Utc>>,
    #[serde(default)]
    pub maintainer_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_downloads: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub id: String,
    pub summary: String,
    pub severity: Severity,
    pub affected_versions: String,
    pub reference_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    pub vulnerabilities: Vec<Vulnerability>,
    pub has_critical: bool,
}

impl SecurityReport {
    pub fn empty() -> Self {
        Self::from_vulnerabilities(Vec::new())
    }

    pub fn from_vulnerabilities(vulnerabilities: Vec<Vulnerability>) -> Self {
        let has_critical = vulnerabilities
            .iter()
            .any(|vuln| vuln.severity == Severity::Critical);
        Self {
            vulnerabilities,
            has_critical,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|vuln| vuln.severity == severity)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    pub name: String,
    pub score: u32,
    pub max_score: u32,
    pub reason: String,
}

impl RiskFactor {
    /// Builds a factor with `score` clamped to `[0, max_score]`.
    pub fn new(name: &str, score: i64, max_score: u32, reason: impl Into<String>) -> Self {
        let clamped = score.clamp(0, i64::from(max_score));
        Self {
            name: name.to_string(),
            score: u32::try_from(clamped).unwrap_or(0),
            max_score,
            reason: reason.into(),
        }
    }

    pub fn full(name: &str, max_score: u32, reason: impl Into<String>) -> Self {
        Self::new(name, i64::from(max_score), max_score, reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Allow,
    Warn,
    Block,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Allow => "ALLOW",
            Self::Warn => "WARN",
            Self::Block => "BLOCK",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: u32,
    pub action: Action,
    pub factors: Vec<RiskFactor>,
}

/// Inputs shared by every risk factor evaluation.
pub struct FactorContext<'a> {
    pub compatibility: &'a CompatibilityReport,
    pub security: &'a SecurityReport,
    pub package: Option<&'a PackageMetadata>,
    pub now: DateTime<Utc>,
}

pub trait RiskFactorCheck: Send + Sync {
    fn id(&self) -> FactorId;
    fn max_score(&self) -> u32;
    fn priority(&self) -> u16 {
        100
    }
    fn evaluate(&self, context: &FactorContext<'_>) -> RiskFactor;
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("package '{package}' was not found in {provider}")]
    NotFound {
        provider: &'static str,
        package: String,
    },
    #[error("provider request failed: {message}")]
    Transport { message: String },
    #[error("provider returned invalid data: {message}")]
    InvalidResponse { message: String },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {message}")]
    ParseFile { path: String, message: String },
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetches metadata for the package's `latest` dist-tag.
    async fn fetch_metadata(&self, package: &str) -> Result<PackageMetadata, ProviderError>;

    async fn fetch_peer_requirements(
        &self,
        package: &str,
    ) -> Result<Vec<PeerRequirement>, ProviderError> {
        Ok(self.fetch_metadata(package).await?.peer_requirements)
    }
}

#[async_trait]
pub trait AdvisoryProvider: Send + Sync {
    async fn fetch_advisories(
        &self,
        package: &str,
        version: &str,
    ) -> Result<Vec<Vulnerability>, ProviderError>;
}

pub trait ManifestProvider: Send + Sync {
    fn manifest_file_name(&self) -> &'static str;
    fn parse_installed(&self, path: &Path) -> Result<InstalledDependencies, ManifestError>;

    /// Finds the manifest in `start` or one of its nearest ancestors.
    fn locate(&self, start: &Path) -> Option<PathBuf> {
        search_root(start)
            .ancestors()
            .take(MANIFEST_SEARCH_ANCESTORS + 1)
            .map(|dir| dir.join(self.manifest_file_name()))
            .find(|candidate| candidate.is_file())
    }

    /// Returns `Ok(None)` when no manifest exists within the search window.
    fn load_installed(
        &self,
        start: &Path,
    ) -> Result<Option<InstalledDependencies>, ManifestError> {
        let Some(path) = self.locate(start) else {
            return Ok(None);
        };
        self.parse_installed(&path).map(Some)
    }
}

/// Absolute, lexically normalized form of `start` so relative paths such as `.` or
/// `../app` walk their real ancestors. Falls back to `start` when the working directory
/// is unavailable.
fn search_root(start: &Path) -> PathBuf {
    let Ok(absolute) = std::path::absolute(start) else {
        return start.to_path_buf();
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct DummyManifest;

    impl ManifestProvider for DummyManifest {
        fn manifest_file_name(&self) -> &'static str {
            "package.json"
        }

        fn parse_installed(&self, path: &Path) -> Result<InstalledDependencies, ManifestError> {
            let mut installed = InstalledDependencies::new();
            installed.insert("source".to_string(), path.display().to_string());
            Ok(installed)
        }
    }

    struct DummyMetadata;

    #[async_trait]
    impl MetadataProvider for DummyMetadata {
        async fn fetch_metadata(&self, package: &str) -> Result<PackageMetadata, ProviderError> {
            Ok(PackageMetadata {
                name: package.to_string(),
                resolved_version: "1.0.0".to_string(),
                peer_requirements: vec![PeerRequirement {
                    name: "react".to_string(),
                    range: "^18.0.0".to_string(),
                    optional: false,
                }],
                deprecated: None,
                last_publish: None,
                maintainer_count: 1,
                weekly_downloads: None,
            })
        }
    }

    fn unique_temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        std::env::temp_dir().join(format!("install-guard-core-{nanos}-{name}"))
    }

    fn vuln(severity: Severity) -> Vulnerability {
        Vulnerability {
            id: "GHSA-test".to_string(),
            summary: "test".to_string(),
            severity,
            affected_versions: "<1.0.0".to_string(),
            reference_url: "https://osv.dev/vulnerability/GHSA-test".to_string(),
        }
    }

    #[test]
    fn severity_labels_accept_medium_alias() {
        assert_eq!(Severity::from_label("moderate"), Some(Severity::Moderate));
        assert_eq!(Severity::from_label("MEDIUM"), Some(Severity::Moderate));
        assert_eq!(Severity::from_label(" critical "), Some(Severity::Critical));
        assert_eq!(Severity::from_label("unknown"), None);
    }

    #[test]
    fn risk_factor_clamps_score_into_range() {
        assert_eq!(RiskFactor::new("x", -5, 15, "").score, 0);
        assert_eq!(RiskFactor::new("x", 99, 15, "").score, 15);
        assert_eq!(RiskFactor::new("x", 7, 15, "").score, 7);
    }

    #[test]
    fn compatibility_report_is_incompatible_only_for_failures() {
        let optional = PeerCheckResult {
            name: "a".to_string(),
            required: "^1.0.0".to_string(),
            installed: None,
            status: PeerStatus::OptionalMissing,
            fix_command: None,
        };
        let report = CompatibilityReport::from_checks(vec![optional.clone()]);
        assert!(report.compatible);
        assert_eq!(report.failed_count(), 0);

        let missing = PeerCheckResult {
            status: PeerStatus::Missing,
            fix_command: Some("install a@^1.0.0".to_string()),
            ..optional
        };
        let report = CompatibilityReport::from_checks(vec![missing]);
        assert!(!report.compatible);
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn security_report_flags_critical() {
        let report = SecurityReport::from_vulnerabilities(vec![vuln(Severity::Low)]);
        assert!(!report.has_critical);
        let report =
            SecurityReport::from_vulnerabilities(vec![vuln(Severity::Low), vuln(Severity::Critical)]);
        assert!(report.has_critical);
        assert_eq!(report.count(Severity::Low), 1);
    }

    #[test]
    fn wire_names_are_stable() {
        let json = serde_json::to_value(PeerStatus::OptionalMissing).expect("status json");
        assert_eq!(json, "OPTIONAL_MISSING");
        let json = serde_json::to_value(Action::Block).expect("action json");
        assert_eq!(json, "BLOCK");
        assert_eq!(Action::Warn.to_string(), "WARN");
        assert!(Action::Allow < Action::Warn && Action::Warn < Action::Block);
    }

    #[test]
    fn load_installed_returns_none_without_manifest() {
        let root = unique_temp_path("no-manifest");
        let dir = root.join("a").join("b");
        fs::create_dir_all(&dir).expect("create dir");

        let loaded = DummyManifest.load_installed(&dir).expect("no error");
        assert!(loaded.is_none());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn locate_searches_two_ancestors() {
        let root = unique_temp_path("ancestors");
        let nested = root.join("a").join("b");
        fs::create_dir_all(&nested).expect("create nested");
        fs::write(root.join("package.json"), "{}").expect("write manifest");

        assert_eq!(
            DummyManifest.locate(&nested),
            Some(root.join("package.json"))
        );

        let too_deep = nested.join("c");
        fs::create_dir_all(&too_deep).expect("create deeper");
        assert!(DummyManifest.locate(&too_deep).is_none());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn locate_resolves_relative_paths_from_current_dir() {
        let root = unique_temp_path("relative");
        let web = root.join("packages").join("web");
        let app = root.join("packages").join("app");
        fs::create_dir_all(&web).expect("create web");
        fs::create_dir_all(&app).expect("create app");
        fs::write(root.join("package.json"), "{}").expect("write manifest");
        let expected = fs::canonicalize(root.join("package.json")).expect("canonical manifest");

        let previous = std::env::current_dir().expect("current dir");
        std::env::set_current_dir(&web).expect("enter nested dir");
        let from_dot = DummyManifest.locate(Path::new("."));
        let from_sibling = DummyManifest.locate(Path::new("../app"));
        let loaded = DummyManifest.load_installed(Path::new("."));
        std::env::set_current_dir(previous).expect("restore current dir");

        let canonical =
            |found: Option<PathBuf>| found.map(|path| fs::canonicalize(path).expect("exists"));
        assert_eq!(canonical(from_dot), Some(expected.clone()));
        assert_eq!(canonical(from_sibling), Some(expected));
        assert!(loaded.expect("no error").is_some());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn search_root_normalizes_dot_components() {
        assert_eq!(
            search_root(Path::new("/srv/repo/packages/web/./../app")),
            PathBuf::from("/srv/repo/packages/app")
        );
    }

    #[test]
    fn locate_ignores_directories_named_like_manifest() {
        let root = unique_temp_path("manifest-dir");
        fs::create_dir_all(root.join("package.json")).expect("create dir");

        assert!(DummyManifest.locate(&root).is_none());

        let _ = fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn fetch_peer_requirements_defaults_to_metadata() {
        let peers = DummyMetadata
            .fetch_peer_requirements("demo")
            .await
            .expect("peers");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].name, "react");
    }
}
