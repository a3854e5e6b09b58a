use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ConfigOverlay {
    pub cache: Option<CacheOverlay>,
    pub deprecated: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(super) struct CacheOverlay {
    pub enabled: Option<bool>,
    pub ttl_minutes: Option<u64>,
}
