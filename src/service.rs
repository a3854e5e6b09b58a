//! Shared application service for package and manifest validation.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use install_guard_compat::CompatibilityChecker;
use install_guard_core::{
    AdvisoryProvider, ManifestProvider, MetadataProvider, SecurityReport,
};
use install_guard_npm::{NpmMetadataClient, PackageJsonManifest, declared_dependencies};
use install_guard_osv::OsvAdvisoryClient;

use crate::cache::SqliteCache;
use crate::config::InstallGuardConfig;
use crate::providers::{
    CachedAdvisoryProvider, CachedMetadataProvider, CoalescingMetadataProvider,
    KnownDeprecatedProvider,
};
use crate::scoring;
use crate::types::{ManifestScanReport, ValidationResult};

/// Advisory query version used when the resolved version is unknown.
const UNRESOLVED_VERSION: &str = "latest";

/// Core runtime service combining compatibility, metadata, and advisory providers.
#[derive(Clone)]
pub struct InstallGuardService {
    compatibility: CompatibilityChecker,
    metadata: Arc<dyn MetadataProvider>,
    advisories: Arc<dyn AdvisoryProvider>,
}

impl InstallGuardService {
    /// Creates a service wired to the npm registry, OSV, and the on-disk cache.
    ///
    /// # Errors
    ///
    /// Returns an error if config loading or cache initialization fails.
    pub fn new() -> anyhow::Result<Self> {
        let config = InstallGuardConfig::load()?;

        let mut metadata: Arc<dyn MetadataProvider> = Arc::new(NpmMetadataClient::new());
        let mut advisories: Arc<dyn AdvisoryProvider> = Arc::new(OsvAdvisoryClient::new());
        if config.cache.enabled {
            let cache = Arc::new(SqliteCache::new(config.cache.ttl_minutes)?);
            match cache.purge_expired() {
                Ok(purged) => tracing::debug!(purged, "purged expired cache entries"),
                Err(error) => tracing::warn!("cache purge failed: {error:#}"),
            }
            metadata = Arc::new(CachedMetadataProvider::new(metadata, cache.clone()));
            advisories = Arc::new(CachedAdvisoryProvider::new(advisories, cache));
        }
        let metadata: Arc<dyn MetadataProvider> =
            Arc::new(KnownDeprecatedProvider::new(metadata, config.deprecated));
        // The compatibility check and the metadata fetch ask for the same package at once.
        let metadata: Arc<dyn MetadataProvider> =
            Arc::new(CoalescingMetadataProvider::new(metadata));

        Ok(Self::with_providers(
            Arc::new(PackageJsonManifest::new()),
            metadata,
            advisories,
        ))
    }

    pub fn with_providers(
        manifest: Arc<dyn ManifestProvider>,
        metadata: Arc<dyn MetadataProvider>,
        advisories: Arc<dyn AdvisoryProvider>,
    ) -> Self {
        Self {
            compatibility: CompatibilityChecker::new(manifest, metadata.clone()),
            metadata,
            advisories,
        }
    }

    /// Produces the combined verdict for installing `package_name`.
    ///
    /// Provider failures degrade to neutral inputs; this never fails.
    pub async fn validate_package(
        &self,
        package_name: &str,
        project_path: Option<&Path>,
    ) -> ValidationResult {
        let (compatibility, metadata) = tokio::join!(
            self.compatibility
                .check_compatibility(package_name, project_path),
            self.metadata.fetch_metadata(package_name)
        );

        let package_info = match metadata {
            Ok(metadata) => Some(metadata),
            Err(error) => {
                tracing::debug!(package = package_name, %error, "package metadata unavailable");
                None
            }
        };

        let version = package_info
            .as_ref()
            .map_or(UNRESOLVED_VERSION, |info| info.resolved_version.as_str());
        let security = match self.advisories.fetch_advisories(package_name, version).await {
            Ok(vulnerabilities) => SecurityReport::from_vulnerabilities(vulnerabilities),
            Err(error) => {
                tracing::debug!(package = package_name, %error, "advisories unavailable");
                SecurityReport::empty()
            }
        };

        let risk_score =
            scoring::calculate_risk_score(&compatibility, &security, package_info.as_ref());
        tracing::debug!(
            package = package_name,
            score = risk_score.score,
            action = %risk_score.action,
            "validated package"
        );

        ValidationResult {
            package_name: package_name.to_string(),
            compatibility,
            package_info,
            security,
            action: risk_score.action,
            risk_score,
        }
    }

    /// Validates every dependency declared in a `package.json`, one at a time.
    ///
    /// # Errors
    ///
    /// Returns an error when the manifest cannot be read or parsed.
    pub async fn check_manifest(&self, manifest_path: &Path) -> anyhow::Result<ManifestScanReport> {
        let names = declared_dependencies(manifest_path)
            .with_context(|| format!("failed to load {}", manifest_path.display()))?;
        let project_dir = manifest_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut packages = Vec::with_capacity(names.len());
        for name in names {
            packages.push(self.validate_package(&name, Some(project_dir)).await);
        }

        Ok(ManifestScanReport::from_results(
            manifest_path.display().to_string(),
            packages,
        ))
    }
}

#[cfg(test)]
#[path = "tests/service.rs"]
mod tests;
