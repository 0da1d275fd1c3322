use super::{DependencyNode, Ecosystem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A folder treated as the top of one resolvable unit, with the manifest
/// files that were assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoot {
    pub folder: PathBuf,
    pub manifests: BTreeSet<PathBuf>,
}

impl ProjectRoot {
    pub fn new(folder: impl Into<PathBuf>, manifests: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            manifests: manifests.into_iter().collect(),
        }
    }

    /// Manifests whose file name equals `file_name`.
    pub fn manifests_named<'a>(&'a self, file_name: &'a str) -> impl Iterator<Item = &'a Path> + 'a {
        self.manifests
            .iter()
            .filter(move |p| p.file_name().map(|n| n == file_name).unwrap_or(false))
            .map(PathBuf::as_path)
    }

    /// The manifest closest to the folder (fewest path components), if any.
    pub fn primary_manifest(&self, file_name: &str) -> Option<&Path> {
        self.manifests
            .iter()
            .filter(|p| p.file_name().is_some_and(|n| n == file_name))
            .min_by_key(|p| (p.components().count(), p.to_path_buf()))
            .map(PathBuf::as_path)
    }
}

/// Output of one resolver for one project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub ecosystem: Ecosystem,
    pub project_root: PathBuf,
    pub roots: Vec<DependencyNode>,
    /// Globs of files already represented by `roots`; the content scan skips them.
    pub excludes: Vec<String>,
    /// Records a parser dropped because they lacked identity fields.
    pub dropped_records: usize,
    /// True when the result came from manifests alone, or nothing could be resolved.
    pub degraded: bool,
}

impl ResolutionResult {
    pub fn new(ecosystem: Ecosystem, project_root: impl Into<PathBuf>, roots: Vec<DependencyNode>) -> Self {
        Self {
            ecosystem,
            project_root: project_root.into(),
            roots,
            excludes: Vec::new(),
            dropped_records: 0,
            degraded: false,
        }
    }

    pub fn empty(ecosystem: Ecosystem, project_root: impl Into<PathBuf>) -> Self {
        Self::new(ecosystem, project_root, Vec::new())
    }

    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn with_dropped(mut self, dropped: usize) -> Self {
        self.dropped_records = dropped;
        self
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.roots.iter().map(DependencyNode::node_count).sum()
    }
}

/// Per-result counters kept in the merged forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcosystemSummary {
    pub ecosystem: Ecosystem,
    pub project_root: PathBuf,
    pub nodes: usize,
    pub dropped_records: usize,
    pub degraded: bool,
}

impl From<&ResolutionResult> for EcosystemSummary {
    fn from(result: &ResolutionResult) -> Self {
        Self {
            ecosystem: result.ecosystem,
            project_root: result.project_root.clone(),
            nodes: result.node_count(),
            dropped_records: result.dropped_records,
            degraded: result.degraded,
        }
    }
}

/// Everything a scan produced, handed to the reporting layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanForest {
    pub scan_time: DateTime<Utc>,
    pub scan_roots: Vec<PathBuf>,
    pub dependencies: Vec<DependencyNode>,
    /// Flat nodes for files no resolver claimed.
    pub files: Vec<DependencyNode>,
    pub excludes: Vec<String>,
    pub summaries: Vec<EcosystemSummary>,
}

impl ScanForest {
    pub fn new(scan_roots: Vec<PathBuf>) -> Self {
        Self {
            scan_time: Utc::now(),
            scan_roots,
            dependencies: Vec::new(),
            files: Vec::new(),
            excludes: Vec::new(),
            summaries: Vec::new(),
        }
    }

    /// Folds one result into the forest: roots and excludes are unioned,
    /// duplicate exclude globs are kept once.
    pub fn merge(&mut self, result: ResolutionResult) {
        self.summaries.push(EcosystemSummary::from(&result));
        for pattern in result.excludes {
            if !self.excludes.contains(&pattern) {
                self.excludes.push(pattern);
            }
        }
        self.dependencies.extend(result.roots);
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.iter().map(DependencyNode::node_count).sum()
    }

    pub fn dropped_records(&self) -> usize {
        self.summaries.iter().map(|s| s.dropped_records).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_manifest_outlives_query_name() {
        let root = ProjectRoot::new(
            "/p",
            [
                PathBuf::from("/p/sub/package.json"),
                PathBuf::from("/p/package.json"),
                PathBuf::from("/p/pom.xml"),
            ],
        );
        let primary = {
            let name = String::from("package.json");
            root.primary_manifest(&name)
        };
        assert_eq!(primary, Some(Path::new("/p/package.json")));
        assert!(root.primary_manifest("composer.json").is_none());
    }

    #[test]
    fn test_merge_unions_roots_and_excludes() {
        let mut forest = ScanForest::new(vec![PathBuf::from("/scan")]);

        let npm = ResolutionResult::new(
            Ecosystem::Npm,
            "/scan/app",
            vec![DependencyNode::new(Ecosystem::Npm, "a", "1.0.0")],
        )
        .with_excludes(vec!["/scan/app/node_modules/**".to_string()]);
        let maven = ResolutionResult::new(
            Ecosystem::Maven,
            "/scan/app",
            vec![DependencyNode::new(Ecosystem::Maven, "core", "1.0")],
        )
        .with_excludes(vec!["/scan/app/node_modules/**".to_string()])
        .with_dropped(2);

        forest.merge(npm);
        forest.merge(maven);

        assert_eq!(forest.dependencies.len(), 2);
        assert_eq!(forest.excludes.len(), 1);
        assert_eq!(forest.summaries.len(), 2);
        assert_eq!(forest.dropped_records(), 2);
    }

    #[test]
    fn test_primary_manifest_prefers_shallowest() {
        let root = ProjectRoot::new(
            "/p",
            vec![
                PathBuf::from("/p/sub/package.json"),
                PathBuf::from("/p/package.json"),
                PathBuf::from("/p/pom.xml"),
            ],
        );
        assert_eq!(
            root.primary_manifest("package.json"),
            Some(Path::new("/p/package.json"))
        );
        assert_eq!(root.manifests_named("package.json").count(), 2);
    }
}
