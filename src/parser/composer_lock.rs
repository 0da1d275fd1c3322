//! Parser for `composer.lock`.

use super::LockGraph;
use crate::error::{Result, ScanError};
use crate::model::{DependencyNode, Ecosystem};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Packages are kept as raw values so one malformed entry is dropped on
/// its own instead of failing the document.
#[derive(Debug, Deserialize)]
struct ComposerLock {
    #[serde(default)]
    packages: Vec<Value>,
    #[serde(default, rename = "packages-dev")]
    packages_dev: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: Option<String>,
    version: Option<String>,
    dist: Option<Dist>,
    /// An object, or `[]` when the package has no requirements.
    #[serde(default)]
    require: Value,
}

#[derive(Debug, Deserialize)]
struct Dist {
    url: Option<String>,
    shasum: Option<String>,
}

/// `vendor/package` at `version` is published as `vendor_package-version.zip`.
pub fn composer_filename(name: &str, version: &str) -> String {
    format!("{}-{}.zip", name.replace('/', "_"), version)
}

/// Requirements on the runtime itself rather than on a package.
pub fn is_platform_requirement(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    matches!(name.as_str(), "php" | "php-64bit" | "hhvm" | "composer")
        || name.starts_with("ext-")
        || name.starts_with("lib-")
        || name.starts_with("composer-")
}

/// Lowercased package names from a `require`-style object, platform
/// requirements removed.
pub fn required_names(require: &Value) -> Vec<String> {
    match require {
        Value::Object(map) => map
            .keys()
            .filter(|name| !is_platform_requirement(name))
            .map(|name| name.to_ascii_lowercase())
            .collect(),
        _ => Vec::new(),
    }
}

pub fn parse_composer_lock(json: &str, source: &Path) -> Result<LockGraph> {
    let lock: ComposerLock =
        serde_json::from_str(json).map_err(|e| ScanError::parse(source.display().to_string(), e))?;

    let mut graph = LockGraph::default();
    let mut pending = Vec::new();

    let tagged = lock
        .packages
        .into_iter()
        .map(|p| (p, None))
        .chain(lock.packages_dev.into_iter().map(|p| (p, Some("dev".to_string()))));

    for (raw, scope) in tagged {
        let package = match serde_json::from_value::<LockedPackage>(raw) {
            Ok(package) => package,
            Err(e) => {
                debug!(source = %source.display(), error = %e, "dropping malformed composer.lock package");
                graph.dropped += 1;
                continue;
            }
        };
        let (Some(name), Some(version)) = (package.name, package.version) else {
            debug!(source = %source.display(), "dropping composer.lock package without name or version");
            graph.dropped += 1;
            continue;
        };

        let mut node = DependencyNode::new(Ecosystem::Composer, &name, &version)
            .with_filename(composer_filename(&name, &version))
            .with_scope(scope)
            .with_source(source);
        if let Some(dist) = package.dist {
            match (dist.shasum.filter(|s| !s.is_empty()), dist.url) {
                (Some(shasum), _) => node = node.with_locator(shasum),
                (None, Some(url)) => node = node.with_locator(url),
                (None, None) => {}
            }
        }

        let id = graph.graph.add(node);
        graph.graph.alias(name.to_ascii_lowercase(), id);
        pending.push((id, required_names(&package.require)));
    }

    for (from, children) in pending {
        for name in children {
            if let Some(to) = graph.graph.lookup(&name) {
                graph.graph.add_edge(from, to);
            }
        }
    }

    Ok(graph)
}
