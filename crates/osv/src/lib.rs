use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use install_guard_core::{AdvisoryProvider, ProviderError, Severity, Vulnerability};
use install_guard_http::{
    base_url_from_env, build_client, join_url, read_json, reqwest_transport_error,
};

const OSV_API_BASE_URL: &str = "https://api.osv.dev";
const OSV_VULNERABILITY_URL: &str = "https://osv.dev/vulnerability";
const NPM_ECOSYSTEM: &str = "npm";
/// Severity assumed when an advisory carries no usable database severity.
const DEFAULT_SEVERITY: Severity = Severity::Moderate;

/// Security advisory provider backed by the OSV.dev query API.
#[derive(Clone)]
pub struct OsvAdvisoryClient {
    http: Client,
    api_url: String,
}

impl OsvAdvisoryClient {
    pub fn new() -> Self {
        Self::with_http_client(build_client())
    }

    pub fn with_http_client(http: Client) -> Self {
        Self {
            http,
            api_url: join_url(
                &base_url_from_env("INSTALL_GUARD_OSV_API_BASE_URL", OSV_API_BASE_URL),
                "v1/query",
            ),
        }
    }

    pub fn with_api_url(http: Client, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
        }
    }
}

impl Default for OsvAdvisoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdvisoryProvider for OsvAdvisoryClient {
    async fn fetch_advisories(
        &self,
        package: &str,
        version: &str,
    ) -> Result<Vec<Vulnerability>, ProviderError> {
        query_advisories_with_client(&self.http, &self.api_url, package, version).await
    }
}

/// Queries OSV for npm advisories. The `latest` pseudo-version queries all advisories.
pub async fn query_advisories_with_client(
    http: &Client,
    api_url: &str,
    package_name: &str,
    version: &str,
) -> Result<Vec<Vulnerability>, ProviderError> {
    let body = OsvQueryRequest {
        package: OsvPackage {
            name: package_name.to_string(),
            ecosystem: NPM_ECOSYSTEM.to_string(),
        },
        version: (!version.is_empty() && version != "latest").then(|| version.to_string()),
    };

    let response = http
        .post(api_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| reqwest_transport_error("unable to query OSV advisory API", api_url, e))?;

    let Some(body) = read_json::<OsvQueryResponse>(response, "OSV advisory API").await? else {
        return Ok(Vec::new());
    };

    Ok(body.vulns.into_iter().map(OsvVulnerability::into_vulnerability).collect())
}

#[derive(Debug, Serialize)]
struct OsvQueryRequest {
    package: OsvPackage,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

#[derive(Debug, Serialize)]
struct OsvPackage {
    name: String,
    ecosystem: String,
}

#[derive(Debug, Deserialize)]
struct OsvQueryResponse {
    #[serde(default)]
    vulns: Vec<OsvVulnerability>,
}

#[derive(Debug, Deserialize)]
struct OsvVulnerability {
    id: String,
    summary: Option<String>,
    details: Option<String>,
    database_specific: Option<OsvDatabaseSpecific>,
    #[serde(default)]
    affected: Vec<OsvAffected>,
    #[serde(default)]
    references: Vec<OsvReference>,
}

impl OsvVulnerability {
    fn into_vulnerability(self) -> Vulnerability {
        let severity = self
            .database_specific
            .as_ref()
            .and_then(|specific| specific.severity.as_deref())
            .and_then(Severity::from_label)
            .unwrap_or(DEFAULT_SEVERITY);
        let summary = self
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|summary| !summary.is_empty())
            .or_else(|| {
                self.details
                    .as_deref()
                    .and_then(|details| details.lines().map(str::trim).find(|l| !l.is_empty()))
            })
            .unwrap_or(&self.id)
            .to_string();
        let affected_versions = self.affected_versions();
        let reference_url = self
            .references
            .iter()
            .map(|reference| reference.url.clone())
            .next()
            .unwrap_or_else(|| format!("{OSV_VULNERABILITY_URL}/{}", self.id));

        Vulnerability {
            id: self.id,
            summary,
            severity,
            affected_versions,
            reference_url,
        }
    }

    /// Renders range events as `>=a <b`, one interval per introduced/fixed pair.
    fn affected_versions(&self) -> String {
        let mut intervals = Vec::new();
        for range in self.affected.iter().flat_map(|affected| affected.ranges.iter()) {
            let mut introduced: Option<&str> = None;
            for event in &range.events {
                if let Some(version) = event.introduced.as_deref() {
                    if let Some(open) = introduced.take() {
                        intervals.push(format!(">={open}"));
                    }
                    introduced = Some(version);
                } else if let Some(fixed) = event.fixed.as_deref() {
                    intervals.push(format!(">={} <{fixed}", introduced.take().unwrap_or("0")));
                } else if let Some(last) = event.last_affected.as_deref() {
                    intervals.push(format!(">={} <={last}", introduced.take().unwrap_or("0")));
                }
            }
            if let Some(open) = introduced {
                intervals.push(format!(">={open}"));
            }
        }

        if intervals.is_empty() {
            "unspecified".to_string()
        } else {
            intervals.join(" || ")
        }
    }
}

#[derive(Debug, Deserialize)]
struct OsvDatabaseSpecific {
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsvAffected {
    #[serde(default)]
    ranges: Vec<OsvRange>,
}

#[derive(Debug, Deserialize)]
struct OsvRange {
    #[serde(default)]
    events: Vec<OsvEvent>,
}

#[derive(Debug, Deserialize)]
struct OsvEvent {
    introduced: Option<String>,
    fixed: Option<String>,
    last_affected: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsvReference {
    url: String,
}
