//! Parser for `npm ls --json --all` output.
//!
//! The document is a nested `name -> { version, resolved, dependencies }`
//! map. Broken installs leave stub entries (`"left-pad": {}`) or entries
//! marked `"missing": true`; both are skipped.

use super::npm_filename;
use crate::error::{Result, ScanError};
use crate::model::{DependencyNode, Ecosystem};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct NpmListEntry {
    name: Option<String>,
    version: Option<String>,
    resolved: Option<String>,
    integrity: Option<String>,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, NpmListEntry>,
}

impl NpmListEntry {
    fn is_stub(&self) -> bool {
        self.version.is_none() && self.resolved.is_none() && self.dependencies.is_empty()
    }
}

#[derive(Debug)]
pub struct NpmList {
    pub root: DependencyNode,
    /// Stub or missing entries that were skipped.
    pub skipped: usize,
}

/// Parses `npm ls` JSON. `fallback_name`/`fallback_version` are used when
/// the document has no top-level identity (unnamed private projects).
pub fn parse_npm_list(
    json: &str,
    source: &Path,
    fallback_name: &str,
    fallback_version: &str,
) -> Result<NpmList> {
    let top: NpmListEntry = serde_json::from_str(json).map_err(|e| ScanError::parse(source.display().to_string(), e))?;

    let name = top.name.clone().unwrap_or_else(|| fallback_name.to_string());
    let version = top.version.clone().unwrap_or_else(|| fallback_version.to_string());
    let mut root = DependencyNode::new(Ecosystem::Npm, &name, &version)
        .with_filename(npm_filename(&name, &version))
        .with_source(source);

    let mut skipped = 0;
    let mut path = vec![name];
    root.children = convert(&top.dependencies, source, &mut path, &mut skipped);

    Ok(NpmList { root, skipped })
}

fn convert(
    deps: &BTreeMap<String, NpmListEntry>,
    source: &Path,
    path: &mut Vec<String>,
    skipped: &mut usize,
) -> Vec<DependencyNode> {
    let mut nodes = Vec::new();
    for (name, entry) in deps {
        if entry.missing || entry.is_stub() {
            debug!(package = %name, parent = %path.join(" > "), "skipping stub npm entry");
            *skipped += 1;
            continue;
        }
        // npm output is a tree already, but a corrupt document must not recurse forever.
        if path.contains(name) {
            debug!(package = %name, "skipping cyclic npm entry");
            continue;
        }

        let version = entry.version.clone().unwrap_or_default();
        let mut node = DependencyNode::new(Ecosystem::Npm, name, &version)
            .with_filename(npm_filename(name, &version))
            .with_source(source);
        if let Some(locator) = entry.resolved.as_ref().or(entry.integrity.as_ref()) {
            node = node.with_locator(locator);
        }

        path.push(name.clone());
        node.children = convert(&entry.dependencies, source, path, skipped);
        path.pop();

        nodes.push(node);
    }
    nodes
}
