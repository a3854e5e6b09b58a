//! Provider decorators layered over the registry and advisory clients.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use install_guard_core::{
    AdvisoryProvider, MetadataProvider, PackageMetadata, PeerRequirement, ProviderError,
    Vulnerability,
};
use tokio::sync::OnceCell;

use crate::cache::SqliteCache;
use crate::deprecated::known_deprecation;

type SharedFetch = Arc<OnceCell<Result<PackageMetadata, ProviderError>>>;

/// Joins concurrent metadata requests for the same package onto one upstream fetch.
///
/// Only in-flight requests are shared. Once a fetch settles its entry is dropped, so later
/// calls go back to the wrapped provider (and its cache).
pub struct CoalescingMetadataProvider {
    inner: Arc<dyn MetadataProvider>,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

impl CoalescingMetadataProvider {
    pub fn new(inner: Arc<dyn MetadataProvider>) -> Self {
        Self {
            inner,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedFetch>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MetadataProvider for CoalescingMetadataProvider {
    async fn fetch_metadata(&self, package: &str) -> Result<PackageMetadata, ProviderError> {
        let shared = self
            .in_flight()
            .entry(package.to_string())
            .or_default()
            .clone();

        let result = shared
            .get_or_init(|| self.inner.fetch_metadata(package))
            .await
            .clone();

        let mut in_flight = self.in_flight();
        if in_flight
            .get(package)
            .is_some_and(|current| Arc::ptr_eq(current, &shared))
        {
            in_flight.remove(package);
        }
        result
    }
}

/// Serves package metadata from the cache before asking the wrapped provider.
pub struct CachedMetadataProvider {
    inner: Arc<dyn MetadataProvider>,
    cache: Arc<SqliteCache>,
}

impl CachedMetadataProvider {
    pub fn new(inner: Arc<dyn MetadataProvider>, cache: Arc<SqliteCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl MetadataProvider for CachedMetadataProvider {
    async fn fetch_metadata(&self, package: &str) -> Result<PackageMetadata, ProviderError> {
        let key = format!("npm:metadata:{package}");
        if let Some(cached) = read_cached::<PackageMetadata>(&self.cache, &key) {
            return Ok(cached);
        }

        let metadata = self.inner.fetch_metadata(package).await?;
        write_cached(&self.cache, &key, &metadata);
        Ok(metadata)
    }
}

/// Serves advisories from the cache before asking the wrapped provider.
pub struct CachedAdvisoryProvider {
    inner: Arc<dyn AdvisoryProvider>,
    cache: Arc<SqliteCache>,
}

impl CachedAdvisoryProvider {
    pub fn new(inner: Arc<dyn AdvisoryProvider>, cache: Arc<SqliteCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl AdvisoryProvider for CachedAdvisoryProvider {
    async fn fetch_advisories(
        &self,
        package: &str,
        version: &str,
    ) -> Result<Vec<Vulnerability>, ProviderError> {
        let key = format!("osv:npm:{package}@{version}");
        if let Some(cached) = read_cached::<Vec<Vulnerability>>(&self.cache, &key) {
            return Ok(cached);
        }

        let advisories = self.inner.fetch_advisories(package, version).await?;
        write_cached(&self.cache, &key, &advisories);
        Ok(advisories)
    }
}

/// Marks packages from the known-deprecated table when the registry leaves them unflagged.
pub struct KnownDeprecatedProvider {
    inner: Arc<dyn MetadataProvider>,
    extra: BTreeMap<String, String>,
}

impl KnownDeprecatedProvider {
    /// `extra` entries take precedence over the built-in table.
    pub fn new(inner: Arc<dyn MetadataProvider>, extra: BTreeMap<String, String>) -> Self {
        Self { inner, extra }
    }

    fn lookup(&self, package: &str) -> Option<String> {
        self.extra
            .get(package)
            .cloned()
            .or_else(|| known_deprecation(package).map(ToOwned::to_owned))
    }
}

#[async_trait]
impl MetadataProvider for KnownDeprecatedProvider {
    async fn fetch_metadata(&self, package: &str) -> Result<PackageMetadata, ProviderError> {
        let mut metadata = self.inner.fetch_metadata(package).await?;
        if metadata.deprecated.is_none()
            && let Some(message) = self.lookup(package)
        {
            tracing::debug!(package, "marked deprecated from known-deprecated table");
            metadata.deprecated = Some(message);
        }
        Ok(metadata)
    }

    async fn fetch_peer_requirements(
        &self,
        package: &str,
    ) -> Result<Vec<PeerRequirement>, ProviderError> {
        self.inner.fetch_peer_requirements(package).await
    }
}

fn read_cached<T: serde::de::DeserializeOwned>(cache: &SqliteCache, key: &str) -> Option<T> {
    match cache.get_json::<T>(key) {
        Ok(hit) => hit,
        Err(error) => {
            tracing::warn!(key, "cache read failed: {error:#}");
            None
        }
    }
}

fn write_cached<T: serde::Serialize>(cache: &SqliteCache, key: &str, value: &T) {
    if let Err(error) = cache.set_json(key, value) {
        tracing::warn!(key, "cache write failed: {error:#}");
    }
}
