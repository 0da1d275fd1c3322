//! Manifest readers and the manifest-only fallback tree.
//!
//! When no package manager is available, the declared dependencies of each
//! manifest are all that is known. Children are limited to other manifests
//! found in the same scan (and, for Maven, artifacts already present in the
//! local repository), so the hierarchy is best effort.

use super::composer_lock::{composer_filename, is_platform_requirement};
use super::maven_tree::Coordinate;
use super::npm_filename;
use crate::error::{Result, ScanError};
use crate::graph::DependencyGraph;
use crate::model::{substitute_properties, DependencyNode, Ecosystem};
use regex::Regex;
use semver::{Version, VersionReq};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Version given to manifests that declare none.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// How far `<parent>` chains are followed on disk.
const MAX_PARENT_DEPTH: usize = 8;

static XML_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDependency {
    pub group_id: Option<String>,
    pub name: String,
    /// Version range as written; for Maven, the substituted version.
    pub range: String,
    pub scope: Option<String>,
    pub classifier: Option<String>,
    pub packaging: Option<String>,
}

impl DeclaredDependency {
    fn new(name: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            group_id: None,
            name: name.into(),
            range: range.into(),
            scope: None,
            classifier: None,
            packaging: None,
        }
    }

    pub fn key(&self) -> String {
        match &self.group_id {
            Some(group) => format!("{}:{}", group, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub ecosystem: Ecosystem,
    pub path: PathBuf,
    pub group_id: Option<String>,
    pub name: String,
    pub version: String,
    /// Maven packaging; `None` elsewhere.
    pub packaging: Option<String>,
    pub dependencies: Vec<DeclaredDependency>,
    /// Maven `<modules>` entries, relative to the manifest's folder.
    pub modules: Vec<String>,
}

impl Manifest {
    pub fn key(&self) -> String {
        match &self.group_id {
            Some(group) => format!("{}:{}", group, self.name),
            None => self.name.clone(),
        }
    }

    pub fn filename(&self) -> String {
        match self.ecosystem {
            Ecosystem::Npm => npm_filename(&self.name, &self.version),
            Ecosystem::Composer => composer_filename(&self.name, &self.version),
            Ecosystem::Maven => self.coordinate().filename(),
            _ => format!("{}-{}", self.name, self.version),
        }
    }

    /// The node for the manifest itself, without children.
    pub fn node(&self) -> DependencyNode {
        let mut node = DependencyNode::new(self.ecosystem, &self.name, &self.version)
            .with_filename(self.filename())
            .with_source(&self.path);
        if let Some(group) = &self.group_id {
            node = node.with_group(group);
        }
        node
    }

    fn coordinate(&self) -> Coordinate {
        Coordinate {
            group_id: self.group_id.clone().unwrap_or_default(),
            artifact_id: self.name.clone(),
            packaging: self.packaging.clone().unwrap_or_else(|| "jar".to_string()),
            classifier: None,
            version: self.version.clone(),
            scope: None,
        }
    }
}

fn folder_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| ScanError::io(path, e))
}

/// String entries of a JSON dependency map, in key order.
fn string_map(value: Option<&Value>) -> Vec<(String, String)> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: Option<Value>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: Option<Value>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: Option<Value>,
}

pub fn read_package_json(path: &Path) -> Result<Manifest> {
    parse_package_json(&read_text(path)?, path)
}

pub fn parse_package_json(json: &str, path: &Path) -> Result<Manifest> {
    let package: PackageJson = serde_json::from_str(json).map_err(|e| ScanError::parse(path.display().to_string(), e))?;

    let mut dependencies: Vec<DeclaredDependency> = string_map(package.dependencies.as_ref())
        .into_iter()
        .chain(string_map(package.optional_dependencies.as_ref()))
        .map(|(name, range)| DeclaredDependency::new(name, range))
        .collect();
    dependencies.extend(string_map(package.dev_dependencies.as_ref()).into_iter().map(|(name, range)| {
        let mut dep = DeclaredDependency::new(name, range);
        dep.scope = Some("dev".to_string());
        dep
    }));

    Ok(Manifest {
        ecosystem: Ecosystem::Npm,
        path: path.to_path_buf(),
        group_id: None,
        name: package.name.filter(|n| !n.is_empty()).unwrap_or_else(|| folder_name(path)),
        version: package
            .version
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        packaging: None,
        dependencies,
        modules: Vec::new(),
    })
}

#[derive(Debug, Deserialize)]
struct ComposerJson {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    require: Option<Value>,
    #[serde(default, rename = "require-dev")]
    require_dev: Option<Value>,
}

pub fn read_composer_json(path: &Path) -> Result<Manifest> {
    parse_composer_json(&read_text(path)?, path)
}

pub fn parse_composer_json(json: &str, path: &Path) -> Result<Manifest> {
    let package: ComposerJson = serde_json::from_str(json).map_err(|e| ScanError::parse(path.display().to_string(), e))?;

    let declared = |value: Option<&Value>, scope: Option<&str>| -> Vec<DeclaredDependency> {
        string_map(value)
            .into_iter()
            .filter(|(name, _)| !is_platform_requirement(name))
            .map(|(name, range)| {
                let mut dep = DeclaredDependency::new(name.to_ascii_lowercase(), range);
                dep.scope = scope.map(str::to_string);
                dep
            })
            .collect()
    };
    let mut dependencies = declared(package.require.as_ref(), None);
    dependencies.extend(declared(package.require_dev.as_ref(), Some("dev")));

    Ok(Manifest {
        ecosystem: Ecosystem::Composer,
        path: path.to_path_buf(),
        group_id: None,
        name: package
            .name
            .filter(|n| !n.is_empty())
            .map(|n| n.to_ascii_lowercase())
            .unwrap_or_else(|| folder_name(path)),
        version: package
            .version
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        packaging: None,
        dependencies,
        modules: Vec::new(),
    })
}

// --- pom.xml -------------------------------------------------------------

/// Direct child elements of an XML fragment as `(tag, inner)` pairs.
/// Enough of XML for build files: no CDATA, no entities.
fn child_elements(xml: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<(&str, usize)> = None;
    let mut pos = 0;

    while let Some(offset) = xml[pos..].find('<') {
        let start = pos + offset;
        let Some(close) = xml[start..].find('>').map(|c| start + c) else {
            break;
        };
        let tag = &xml[start + 1..close];
        pos = close + 1;

        if tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }
        if let Some(name) = tag.strip_prefix('/') {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                if let Some((open_name, inner_start)) = open.take() {
                    if open_name == name.trim() {
                        out.push((open_name, &xml[inner_start..start]));
                    }
                }
            }
            continue;
        }

        let name = tag.split(|c: char| c.is_whitespace() || c == '/').next().unwrap_or("");
        if tag.ends_with('/') {
            if depth == 0 {
                out.push((name, ""));
            }
            continue;
        }
        if depth == 0 {
            open = Some((name, pos));
        }
        depth += 1;
    }
    out
}

fn child_text<'a>(children: &[(&str, &'a str)], tag: &str) -> Option<&'a str> {
    children
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, inner)| inner.trim())
        .filter(|s| !s.is_empty())
}

fn child_block<'a>(children: &[(&'a str, &'a str)], tag: &str) -> Vec<(&'a str, &'a str)> {
    children
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, inner)| child_elements(inner))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default)]
struct ParentRef {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    relative_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Pom {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    packaging: Option<String>,
    parent: Option<ParentRef>,
    properties: HashMap<String, String>,
    dependencies: Vec<DeclaredDependency>,
    managed: HashMap<String, String>,
    modules: Vec<String>,
}

fn parse_dependencies(children: &[(&str, &str)]) -> Vec<DeclaredDependency> {
    children
        .iter()
        .filter(|(name, _)| *name == "dependency")
        .filter_map(|(_, inner)| {
            let fields = child_elements(inner);
            let artifact = child_text(&fields, "artifactId")?;
            let mut dep = DeclaredDependency::new(artifact, child_text(&fields, "version").unwrap_or(""));
            dep.group_id = child_text(&fields, "groupId").map(str::to_string);
            dep.scope = child_text(&fields, "scope").map(str::to_string);
            dep.classifier = child_text(&fields, "classifier").map(str::to_string);
            dep.packaging = child_text(&fields, "type").map(str::to_string);
            Some(dep)
        })
        .collect()
}

fn parse_pom(content: &str, path: &Path) -> Result<Pom> {
    let content = XML_COMMENT.replace_all(content, "");
    let document = child_elements(&content);
    let Some((_, project)) = document.iter().find(|(name, _)| *name == "project") else {
        return Err(ScanError::parse(path.display().to_string(), "no <project> element"));
    };
    let top = child_elements(project);
    let owned = |s: Option<&str>| s.map(str::to_string);

    let parent = top.iter().find(|(name, _)| *name == "parent").map(|(_, inner)| {
        let fields = child_elements(inner);
        ParentRef {
            group_id: owned(child_text(&fields, "groupId")),
            artifact_id: owned(child_text(&fields, "artifactId")),
            version: owned(child_text(&fields, "version")),
            relative_path: owned(child_text(&fields, "relativePath")),
        }
    });

    let properties = child_block(&top, "properties")
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.trim().to_string()))
        .collect();

    let managed = parse_dependencies(&child_block(&child_block(&top, "dependencyManagement"), "dependencies"))
        .into_iter()
        .filter(|d| !d.range.is_empty())
        .map(|d| (d.key(), d.range))
        .collect();

    let modules = child_block(&top, "modules")
        .into_iter()
        .filter(|(name, _)| *name == "module")
        .map(|(_, inner)| inner.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();

    Ok(Pom {
        group_id: owned(child_text(&top, "groupId")),
        artifact_id: owned(child_text(&top, "artifactId")),
        version: owned(child_text(&top, "version")),
        packaging: owned(child_text(&top, "packaging")),
        parent,
        properties,
        dependencies: parse_dependencies(&child_block(&top, "dependencies")),
        managed,
        modules,
    })
}

/// Parent pom on disk, if the relative path points at the declared parent.
fn load_parent(path: &Path, parent: &ParentRef) -> Option<(PathBuf, Pom)> {
    let relative = parent.relative_path.as_deref().unwrap_or("../pom.xml");
    let mut candidate = path.parent()?.join(relative);
    if candidate.is_dir() {
        candidate.push("pom.xml");
    }
    let content = fs::read_to_string(&candidate).ok()?;
    let pom = parse_pom(&content, &candidate).ok()?;
    (pom.artifact_id == parent.artifact_id).then_some((candidate, pom))
}

pub fn read_pom(path: &Path) -> Result<Manifest> {
    parse_pom_file(&read_text(path)?, path)
}

/// Parses a pom and resolves `${...}` versions from its properties, its
/// coordinates, and those of any parent poms found on disk.
pub fn parse_pom_file(content: &str, path: &Path) -> Result<Manifest> {
    let pom = parse_pom(content, path)?;

    // Nearest pom last so that its values override inherited ones.
    let mut chain = vec![pom.clone()];
    let mut cursor = (path.to_path_buf(), pom.clone());
    for _ in 0..MAX_PARENT_DEPTH {
        let Some(parent_ref) = cursor.1.parent.clone() else {
            break;
        };
        let Some(parent) = load_parent(&cursor.0, &parent_ref) else {
            break;
        };
        chain.push(parent.1.clone());
        cursor = parent;
    }
    chain.reverse();

    let parent_ref = pom.parent.clone().unwrap_or_default();
    let group_id = pom.group_id.clone().or(parent_ref.group_id.clone());
    let version = pom.version.clone().or(parent_ref.version.clone());
    let artifact_id = pom.artifact_id.clone().unwrap_or_else(|| folder_name(path));

    let mut properties = HashMap::new();
    let mut managed = HashMap::new();
    for ancestor in &chain {
        properties.extend(ancestor.properties.clone());
        managed.extend(ancestor.managed.clone());
    }
    let mut builtin = vec![("project.artifactId", Some(artifact_id.clone()))];
    for key in ["project.version", "pom.version", "version"] {
        builtin.push((key, version.clone()));
    }
    builtin.push(("project.groupId", group_id.clone()));
    builtin.push(("project.parent.version", parent_ref.version.clone()));
    builtin.push(("project.parent.groupId", parent_ref.group_id.clone()));
    for (key, value) in builtin {
        if let Some(value) = value {
            properties.insert(key.to_string(), value);
        }
    }

    let resolve = |value: &str| substitute_properties(value, &properties);
    let dependencies = pom
        .dependencies
        .iter()
        .map(|dep| {
            let mut dep = dep.clone();
            if dep.range.is_empty() {
                if let Some(v) = managed.get(&dep.key()) {
                    dep.range = v.clone();
                }
            }
            dep.range = resolve(&dep.range);
            dep.group_id = dep.group_id.as_deref().map(resolve);
            dep
        })
        .collect();

    Ok(Manifest {
        ecosystem: Ecosystem::Maven,
        path: path.to_path_buf(),
        group_id: group_id.as_deref().map(resolve),
        name: artifact_id,
        version: version
            .as_deref()
            .map(resolve)
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        packaging: pom.packaging.clone(),
        dependencies,
        modules: pom.modules.clone(),
    })
}

// --- fallback tree -------------------------------------------------------

/// Parses a node version leniently: `v1.2`, `1.2` and `1.2.3` are accepted.
fn lenient_version(version: &str) -> Option<Version> {
    let trimmed = version.trim().trim_start_matches('v');
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }
    let parts: Vec<&str> = trimmed.split('.').collect();
    match parts.as_slice() {
        [major] => Version::parse(&format!("{}.0.0", major)).ok(),
        [major, minor] => Version::parse(&format!("{}.{}.0", major, minor)).ok(),
        _ => None,
    }
}

/// Whether `range` admits `version`. Ranges or versions that cannot be
/// parsed are given the benefit of the doubt.
pub fn range_admits(range: &str, version: &str) -> bool {
    let range = range.trim();
    if range.is_empty() || range == version {
        return true;
    }
    let Some(version) = lenient_version(version) else {
        return true;
    };

    let mut parsed_any = false;
    for alternative in range.split("||").flat_map(|a| a.split(" | ")) {
        let alternative = alternative.trim();
        let req = VersionReq::parse(alternative)
            .or_else(|_| VersionReq::parse(&alternative.split_whitespace().collect::<Vec<_>>().join(", ")));
        if let Ok(req) = req {
            parsed_any = true;
            if req.matches(&version) {
                return true;
            }
        }
    }
    !parsed_any
}

fn admits(dep: &DeclaredDependency, target: &Manifest) -> bool {
    match target.ecosystem {
        // Maven versions are exact once properties are substituted.
        Ecosystem::Maven => dep.range.is_empty() || dep.range.contains("${") || dep.range == target.version,
        _ => range_admits(&dep.range, &target.version),
    }
}

/// Builds the fallback forest for one project root's manifests. Roots are
/// the manifests no other manifest depends on.
pub fn manifest_forest(manifests: &[Manifest], repository: Option<&Path>) -> Vec<DependencyNode> {
    let mut graph = DependencyGraph::new();
    let ids: Vec<_> = manifests
        .iter()
        .map(|m| {
            let id = graph.add(m.node());
            graph.alias(m.key(), id);
            id
        })
        .collect();

    let mut on_disk = HashMap::new();
    let mut repository_nodes: BTreeMap<PathBuf, usize> = BTreeMap::new();

    for (manifest, &from) in manifests.iter().zip(&ids) {
        for dep in &manifest.dependencies {
            if let Some(to) = graph.lookup(&dep.key()) {
                if to != from && admits(dep, &manifests[to]) {
                    graph.add_edge(from, to);
                    continue;
                }
            }

            let (Ecosystem::Maven, Some(repository)) = (manifest.ecosystem, repository) else {
                continue;
            };
            if dep.range.is_empty() || dep.range.contains("${") {
                debug!(dependency = %dep.key(), manifest = %manifest.path.display(), "unresolved maven version");
                continue;
            }
            let coordinate = Coordinate {
                group_id: dep.group_id.clone().unwrap_or_default(),
                artifact_id: dep.name.clone(),
                packaging: dep.packaging.clone().unwrap_or_else(|| "jar".to_string()),
                classifier: dep.classifier.clone(),
                version: dep.range.clone(),
                scope: dep.scope.clone(),
            };
            let artifact = coordinate.repository_path(repository);
            let to = match repository_nodes.get(&artifact) {
                Some(&id) => id,
                None => {
                    let node = coordinate.into_node(repository, &mut on_disk);
                    if node.artifact_path.is_none() {
                        continue;
                    }
                    let id = graph.add(node);
                    repository_nodes.insert(artifact, id);
                    id
                }
            };
            graph.add_edge(from, to);
        }
    }

    graph.into_forest()
}
