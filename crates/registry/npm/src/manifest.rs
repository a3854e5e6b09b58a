use install_guard_core::{InstalledDependencies, ManifestError, ManifestProvider};
use serde_json::Value;
use std::path::Path;

const MANIFEST_FILE_NAME: &str = "package.json";
const DEPENDENCY_SECTIONS: [&str; 2] = ["dependencies", "devDependencies"];

/// Reads installed dependency ranges from a project's `package.json`.
#[derive(Debug, Clone, Default)]
pub struct PackageJsonManifest;

impl PackageJsonManifest {
    pub fn new() -> Self {
        Self
    }
}

impl ManifestProvider for PackageJsonManifest {
    fn manifest_file_name(&self) -> &'static str {
        MANIFEST_FILE_NAME
    }

    fn parse_installed(&self, path: &Path) -> Result<InstalledDependencies, ManifestError> {
        let mut installed = InstalledDependencies::new();
        for (name, range) in read_sections(path)? {
            installed.entry(name).or_insert(range);
        }
        Ok(installed)
    }
}

/// Lists dependency names in declaration order; `dependencies` precede `devDependencies`.
pub fn declared_dependencies(path: &Path) -> Result<Vec<String>, ManifestError> {
    let mut names: Vec<String> = Vec::new();
    for (name, _) in read_sections(path)? {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Entries with non-string ranges are skipped.
fn read_sections(path: &Path) -> Result<Vec<(String, String)>, ManifestError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    let root: Value = serde_json::from_str(&raw).map_err(|error| ManifestError::ParseFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;

    let mut entries = Vec::new();
    for section in DEPENDENCY_SECTIONS {
        let Some(items) = root.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (name, range) in items {
            if let Some(range) = range.as_str() {
                entries.push((name.to_string(), range.to_string()));
            }
        }
    }
    Ok(entries)
}
