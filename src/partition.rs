//! Grouping of manifest files into project roots.
//!
//! Manifests are grouped by the directory two levels above them. The group
//! with the shortest key is taken first; the parent directory of its
//! shallowest manifest becomes a project root and claims every manifest
//! beneath it. Groups inside that root are folded in, so nested modules are
//! reported once under their enclosing project and no returned root is an
//! ancestor of another.

use crate::platform::canonical;
use globset::GlobSet;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Child name used to test whether an exclude glob covers a whole directory.
const DIRECTORY_PROBE: &str = "*";

pub type Partition = BTreeMap<PathBuf, BTreeSet<PathBuf>>;

pub struct PathPartitioner {
    include: GlobSet,
    exclude: GlobSet,
}

impl PathPartitioner {
    pub fn new(include: GlobSet, exclude: GlobSet) -> Self {
        Self { include, exclude }
    }

    /// Walks `scan_root` and returns every canonical file path that matches
    /// the include set and no exclude glob, sorted.
    pub fn discover(&self, scan_root: &Path) -> Vec<PathBuf> {
        let root = canonical(scan_root);
        let mut found = Vec::new();

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded_entry(entry.path(), entry.file_type().is_dir()));

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if self.include.is_match(entry.path()) {
                found.push(entry.path().to_path_buf());
            }
        }

        debug!(root = %root.display(), manifests = found.len(), "discovered manifests");
        found
    }

    /// Discovers manifests under `scan_root` and partitions them.
    pub fn partition(&self, scan_root: &Path) -> Partition {
        partition_paths(self.discover(scan_root))
    }

    fn is_excluded_entry(&self, path: &Path, is_dir: bool) -> bool {
        if self.exclude.is_match(path) {
            return true;
        }
        is_dir && self.exclude.is_match(path.join(DIRECTORY_PROBE))
    }
}

/// Partitions `manifests` into non-overlapping top folders.
///
/// Every input path appears under exactly one key, and no key is an ancestor
/// of another key.
pub fn partition_paths(manifests: impl IntoIterator<Item = PathBuf>) -> Partition {
    let mut groups: BTreeMap<PathBuf, BTreeSet<PathBuf>> = BTreeMap::new();
    for manifest in manifests {
        groups.entry(group_key(&manifest)).or_default().insert(manifest);
    }

    let mut result = Partition::new();

    while let Some(key) = groups.keys().min_by_key(|k| depth_order(k)).cloned() {
        let Some(first) = groups
            .get(&key)
            .and_then(|members| members.iter().min_by_key(|m| depth_order(m)).cloned())
        else {
            groups.remove(&key);
            continue;
        };

        let top = first.parent().map(Path::to_path_buf).unwrap_or_else(|| first.clone());

        let mut claimed = BTreeSet::new();
        for members in groups.values_mut() {
            let under: Vec<PathBuf> = members.iter().filter(|m| m.starts_with(&top)).cloned().collect();
            for m in under {
                members.remove(&m);
                claimed.insert(m);
            }
        }

        groups.retain(|k, members| !members.is_empty() && !k.starts_with(&top));
        result.entry(top).or_default().extend(claimed);
    }

    result
}

fn group_key(manifest: &Path) -> PathBuf {
    manifest
        .parent()
        .and_then(Path::parent)
        .or_else(|| manifest.parent())
        .unwrap_or(manifest)
        .to_path_buf()
}

fn depth_order(path: &Path) -> (usize, PathBuf) {
    (path.components().count(), path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::build_glob_set;
    use std::fs;
    use tempfile::TempDir;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    fn assert_partition_invariants(input: &[PathBuf], partition: &Partition) {
        let tops: Vec<&PathBuf> = partition.keys().collect();
        for (i, a) in tops.iter().enumerate() {
            for b in tops.iter().skip(i + 1) {
                assert!(!a.starts_with(b) && !b.starts_with(a), "{:?} overlaps {:?}", a, b);
            }
        }
        for manifest in input {
            let owners = partition.values().filter(|set| set.contains(manifest)).count();
            assert_eq!(owners, 1, "{:?} owned {} times", manifest, owners);
        }
        for (top, members) in partition {
            assert!(members.iter().all(|m| m.starts_with(top)));
        }
    }

    #[test]
    fn test_nested_modules_fold_into_parent() {
        let input = paths(&[
            "/repo/app/pom.xml",
            "/repo/app/core/pom.xml",
            "/repo/app/web/pom.xml",
            "/repo/app/web/deep/nested/pom.xml",
        ]);
        let partition = partition_paths(input.clone());

        assert_eq!(partition.len(), 1);
        assert_eq!(partition[&PathBuf::from("/repo/app")].len(), 4);
        assert_partition_invariants(&input, &partition);
    }

    #[test]
    fn test_sibling_projects_stay_separate() {
        let input = paths(&[
            "/repo/a/package.json",
            "/repo/b/package.json",
            "/repo/c/x/package.json",
        ]);
        let partition = partition_paths(input.clone());

        assert_eq!(
            partition.keys().cloned().collect::<Vec<_>>(),
            paths(&["/repo/a", "/repo/b", "/repo/c/x"])
        );
        assert_partition_invariants(&input, &partition);
    }

    #[test]
    fn test_deep_manifest_claimed_by_shallow_ancestor() {
        let input = paths(&[
            "/w/one/two/three/pom.xml",
            "/w/one/pom.xml",
            "/w/other/pom.xml",
        ]);
        let partition = partition_paths(input.clone());

        assert_eq!(partition.len(), 2);
        assert!(partition[&PathBuf::from("/w/one")].contains(&PathBuf::from("/w/one/two/three/pom.xml")));
        assert_partition_invariants(&input, &partition);
    }

    #[test]
    fn test_invariants_hold_for_mixed_layouts() {
        let layouts: Vec<Vec<PathBuf>> = vec![
            paths(&["/a/pom.xml", "/a/b/pom.xml", "/c/d/pom.xml", "/c/pom.xml"]),
            paths(&["/x/y/z/package.json", "/x/y/package.json", "/x/q/package.json", "/x/package.json"]),
            paths(&["/m/1/2/3/4/pom.xml", "/m/1/2/pom.xml", "/m/5/pom.xml", "/m/5/6/7/pom.xml"]),
            paths(&["/pom.xml", "/a/pom.xml"]),
            Vec::new(),
        ];
        for input in layouts {
            let partition = partition_paths(input.clone());
            assert_partition_invariants(&input, &partition);
        }
    }

    #[test]
    fn test_discover_applies_include_and_exclude() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("app/node_modules/left-pad")).unwrap();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("app/package.json"), "{}").unwrap();
        fs::write(root.join("app/node_modules/left-pad/package.json"), "{}").unwrap();
        fs::write(root.join("lib/package.json"), "{}").unwrap();
        fs::write(root.join("lib/readme.md"), "").unwrap();

        let partitioner = PathPartitioner::new(
            build_glob_set(&["**/package.json".to_string()], true).unwrap(),
            build_glob_set(&["**/node_modules/**".to_string()], true).unwrap(),
        );

        let found = partitioner.discover(root);
        assert_eq!(found.len(), 2);

        let partition = partitioner.partition(root);
        let canonical_root = canonical(root);
        assert_eq!(
            partition.keys().cloned().collect::<Vec<_>>(),
            vec![canonical_root.join("app"), canonical_root.join("lib")]
        );
    }
}
