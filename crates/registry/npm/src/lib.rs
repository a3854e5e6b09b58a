mod manifest;
mod registry;

pub use manifest::{PackageJsonManifest, declared_dependencies};
pub use registry::NpmMetadataClient;
