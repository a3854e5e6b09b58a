//! Peer-dependency compatibility checks against a project's declared dependencies.

pub mod range;

use std::path::Path;
use std::sync::Arc;

use install_guard_core::{
    CompatibilityReport, InstalledDependencies, ManifestProvider, MetadataProvider,
    PeerCheckResult, PeerRequirement, PeerStatus,
};

pub use range::{RangeError, VersionRange, ranges_overlap};

/// Reconciles a target package's peer requirements with installed dependency ranges.
#[derive(Clone)]
pub struct CompatibilityChecker {
    manifest: Arc<dyn ManifestProvider>,
    metadata: Arc<dyn MetadataProvider>,
}

impl CompatibilityChecker {
    pub fn new(manifest: Arc<dyn ManifestProvider>, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self { manifest, metadata }
    }

    /// Checks `target`'s peers against the manifest nearest to `project_path`
    /// (the current directory when omitted).
    ///
    /// Never fails: a missing manifest, a missing package, or a provider error all yield
    /// an empty compatible report. An unreadable manifest is treated as declaring nothing.
    pub async fn check_compatibility(
        &self,
        target: &str,
        project_path: Option<&Path>,
    ) -> CompatibilityReport {
        let project_dir = match project_path {
            Some(path) => path.to_path_buf(),
            None => match std::env::current_dir() {
                Ok(dir) => dir,
                Err(err) => {
                    tracing::debug!("no project directory for compatibility check: {err}");
                    return CompatibilityReport::empty();
                }
            },
        };

        let Some(installed) = self.installed_dependencies(&project_dir) else {
            tracing::debug!(
                "no {} found near {}",
                self.manifest.manifest_file_name(),
                project_dir.display()
            );
            return CompatibilityReport::empty();
        };

        let peers = match self.metadata.fetch_peer_requirements(target).await {
            Ok(peers) => peers,
            Err(err) => {
                tracing::debug!("peer requirements for {target} unavailable: {err}");
                return CompatibilityReport::empty();
            }
        };

        if peers.is_empty() {
            return CompatibilityReport::empty();
        }

        classify_peers(&installed, &peers)
    }

    fn installed_dependencies(&self, project_dir: &Path) -> Option<InstalledDependencies> {
        match self.manifest.load_installed(project_dir) {
            Ok(installed) => installed,
            Err(err) => {
                tracing::warn!("ignoring unreadable manifest: {err}");
                Some(InstalledDependencies::new())
            }
        }
    }
}

/// Classifies each peer in declaration order and attaches the combined install command
/// to the first failing entry.
pub fn classify_peers(
    installed: &InstalledDependencies,
    peers: &[PeerRequirement],
) -> CompatibilityReport {
    let mut checks = peers
        .iter()
        .map(|peer| classify_peer(installed, peer))
        .collect::<Vec<_>>();

    let failing_targets = checks
        .iter()
        .filter(|check| check.status.is_failure())
        .map(|check| install_target(&check.name, &check.required))
        .collect::<Vec<_>>();

    if let Some(first_failure) = checks.iter_mut().find(|check| check.status.is_failure()) {
        first_failure.fix_command = Some(format!("install {}", failing_targets.join(" ")));
    }

    CompatibilityReport::from_checks(checks)
}

fn classify_peer(installed: &InstalledDependencies, peer: &PeerRequirement) -> PeerCheckResult {
    let installed_range = installed.get(&peer.name).cloned();
    let status = match installed_range.as_deref() {
        None if peer.optional => PeerStatus::OptionalMissing,
        None => PeerStatus::Missing,
        Some(range) if ranges_overlap(range, &peer.range) => PeerStatus::Compatible,
        Some(_) => PeerStatus::Incompatible,
    };

    PeerCheckResult {
        name: peer.name.clone(),
        required: peer.range.clone(),
        installed: installed_range,
        status,
        fix_command: status
            .is_failure()
            .then(|| format!("install {}", install_target(&peer.name, &peer.range))),
    }
}

fn install_target(name: &str, range: &str) -> String {
    format!("{name}@{range}")
}
