use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use install_guard_core::{MetadataProvider, PackageMetadata, PeerRequirement, ProviderError};
use install_guard_http::{
    base_url_from_env, build_client, join_url, read_json, reqwest_transport_error,
};

const NPM_REGISTRY_URL: &str = "https://registry.npmjs.org";
const NPM_DOWNLOADS_API_URL: &str = "https://api.npmjs.org";

/// Package metadata provider backed by the npm registry and downloads API.
#[derive(Clone)]
pub struct NpmMetadataClient {
    http: Client,
    base_url: String,
    downloads_api_base_url: String,
}

impl NpmMetadataClient {
    pub fn new() -> Self {
        Self::with_http_client(build_client())
    }

    pub fn with_http_client(http: Client) -> Self {
        Self {
            http,
            base_url: base_url_from_env("INSTALL_GUARD_NPM_REGISTRY_BASE_URL", NPM_REGISTRY_URL),
            downloads_api_base_url: base_url_from_env(
                "INSTALL_GUARD_NPM_DOWNLOADS_API_BASE_URL",
                NPM_DOWNLOADS_API_URL,
            ),
        }
    }

    pub fn with_base_urls(
        http: Client,
        base_url: impl Into<String>,
        downloads_api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            downloads_api_base_url: downloads_api_base_url.into(),
        }
    }

    fn encode_package_name(package: &str) -> String {
        package.replace('@', "%40").replace('/', "%2f")
    }

    async fn fetch_packument(&self, package: &str) -> Result<NpmPackument, ProviderError> {
        let url = join_url(&self.base_url, &Self::encode_package_name(package));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| reqwest_transport_error("unable to query npm registry", &url, e))?;

        read_json::<NpmPackument>(response, "npm registry")
            .await?
            .ok_or_else(|| ProviderError::NotFound {
                provider: "npm",
                package: package.to_string(),
            })
    }

    async fn fetch_weekly_downloads(&self, package: &str) -> Result<Option<u64>, ProviderError> {
        let url = join_url(
            &self.downloads_api_base_url,
            &format!(
                "downloads/point/last-week/{}",
                Self::encode_package_name(package)
            ),
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| reqwest_transport_error("unable to query npm downloads API", &url, e))?;

        Ok(read_json::<NpmDownloadsResponse>(response, "npm downloads API")
            .await?
            .and_then(|body| body.downloads))
    }
}

impl Default for NpmMetadataClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataProvider for NpmMetadataClient {
    async fn fetch_metadata(&self, package: &str) -> Result<PackageMetadata, ProviderError> {
        let (packument, downloads) = tokio::join!(
            self.fetch_packument(package),
            self.fetch_weekly_downloads(package)
        );
        let mut packument = packument?;
        let weekly_downloads = downloads.unwrap_or_else(|error| {
            tracing::debug!(package, %error, "weekly downloads unavailable");
            None
        });

        let latest = packument
            .dist_tags
            .latest
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: format!("missing dist-tags.latest for {package}"),
            })?;
        let raw_manifest = packument.versions.remove(&latest).ok_or_else(|| {
            ProviderError::InvalidResponse {
                message: format!("latest version {latest} of {package} missing from versions"),
            }
        })?;
        // Only the latest entry is decoded; older versions may carry malformed fields.
        let manifest = serde_json::from_value::<NpmVersionManifest>(raw_manifest).map_err(|e| {
            ProviderError::InvalidResponse {
                message: format!("invalid manifest for {package}@{latest}: {e}"),
            }
        })?;

        let last_publish = packument
            .time
            .get(&latest)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|value| value.with_timezone(&Utc));

        Ok(PackageMetadata {
            name: package.to_string(),
            peer_requirements: manifest.peer_requirements(),
            deprecated: manifest.deprecation_message(),
            last_publish,
            maintainer_count: packument.maintainers.len(),
            weekly_downloads,
            resolved_version: latest,
        })
    }
}

#[derive(Debug, Deserialize)]
struct NpmPackument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: NpmDistTags,
    #[serde(default)]
    versions: HashMap<String, Value>,
    #[serde(default)]
    time: HashMap<String, Value>,
    #[serde(default)]
    maintainers: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct NpmDistTags {
    latest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NpmVersionManifest {
    #[serde(rename = "peerDependencies", default)]
    peer_dependencies: Map<String, Value>,
    #[serde(rename = "peerDependenciesMeta", default)]
    peer_dependencies_meta: Map<String, Value>,
    deprecated: Option<Value>,
}

impl NpmVersionManifest {
    /// Keeps the packument's declaration order.
    fn peer_requirements(&self) -> Vec<PeerRequirement> {
        self.peer_dependencies
            .iter()
            .filter_map(|(name, range)| {
                let range = range.as_str()?;
                Some(PeerRequirement {
                    name: name.clone(),
                    range: range.to_string(),
                    optional: self
                        .peer_dependencies_meta
                        .get(name)
                        .and_then(|meta| meta.get("optional"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                })
            })
            .collect()
    }

    fn deprecation_message(&self) -> Option<String> {
        match self.deprecated.as_ref()? {
            Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
            Value::Bool(true) => Some("deprecated".to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NpmDownloadsResponse {
    downloads: Option<u64>,
}
