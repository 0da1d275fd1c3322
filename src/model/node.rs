use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Maven,
    Npm,
    Composer,
    Debian,
    Alpine,
    Arch,
    Rpm,
    File,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Maven => "maven",
            Ecosystem::Npm => "npm",
            Ecosystem::Composer => "composer",
            Ecosystem::Debian => "debian",
            Ecosystem::Alpine => "alpine",
            Ecosystem::Arch => "arch",
            Ecosystem::Rpm => "rpm",
            Ecosystem::File => "file",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Ecosystem::Maven => "Maven",
            Ecosystem::Npm => "NPM",
            Ecosystem::Composer => "Composer",
            Ecosystem::Debian => "Debian",
            Ecosystem::Alpine => "Alpine",
            Ecosystem::Arch => "Arch",
            Ecosystem::Rpm => "RPM",
            Ecosystem::File => "File",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Content hashes of the file behind a node. Every variant is optional:
/// a node that was never fingerprinted, or whose file could not be read,
/// carries none of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl Fingerprint {
    pub fn primary(sha1: impl Into<String>) -> Self {
        Self {
            sha1: Some(sha1.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sha1.is_none()
            && self.cross_platform.is_none()
            && self.header.is_none()
            && self.footer.is_none()
    }

    /// Fills every variant this fingerprint lacks from `other`.
    pub fn merge_missing(&mut self, other: &Fingerprint) {
        if self.sha1.is_none() {
            self.sha1.clone_from(&other.sha1);
        }
        if self.cross_platform.is_none() {
            self.cross_platform.clone_from(&other.cross_platform);
        }
        if self.header.is_none() {
            self.header.clone_from(&other.header);
        }
        if self.footer.is_none() {
            self.footer.clone_from(&other.footer);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub ecosystem: Ecosystem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    /// Canonical filename used as the identity key (`a-1.0.0.tgz`,
    /// `name_version_arch.deb`, ...).
    pub filename: String,
    /// Manifest or database the node was discovered in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    /// File the node's fingerprint is computed from, if it exists on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    /// Content locator published by a lock file (resolved URL, integrity, shasum).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Fingerprint::is_empty")]
    pub fingerprint: Fingerprint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    pub fn new(ecosystem: Ecosystem, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            ecosystem,
            group_id: None,
            name: name.into(),
            version: version.into(),
            classifier: None,
            scope: None,
            architecture: None,
            filename: String::new(),
            source_path: None,
            artifact_path: None,
            locator: None,
            fingerprint: Fingerprint::default(),
            children: Vec::new(),
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_classifier(mut self, classifier: Option<String>) -> Self {
        self.classifier = classifier.filter(|c| !c.is_empty());
        self
    }

    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope.filter(|s| !s.is_empty());
        self
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = Some(architecture.into());
        self
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }

    /// Records a lock-file locator. A bare 40-digit hex value is a SHA-1 and
    /// also becomes the primary hash.
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        let locator = locator.into();
        if is_sha1_hex(&locator) {
            self.fingerprint.sha1 = Some(locator.to_ascii_lowercase());
        }
        self.locator = Some(locator);
        self
    }

    pub fn push_child(&mut self, child: DependencyNode) {
        self.children.push(child);
    }

    /// `group:name` for Maven, `name` elsewhere.
    pub fn key(&self) -> String {
        match &self.group_id {
            Some(group) => format!("{}:{}", group, self.name),
            None => self.name.clone(),
        }
    }

    /// A node is resolved once its version no longer holds a `${...}` reference.
    pub fn is_resolved(&self) -> bool {
        !self.version.is_empty() && !self.version.contains("${")
    }

    /// Replaces `${name}` references in the version from `properties`.
    /// References without a value are left in place.
    pub fn substitute_version(&mut self, properties: &HashMap<String, String>) {
        self.version = substitute_properties(&self.version, properties);
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Visits every node of the subtree in pre-order.
    pub fn visit(&self, f: &mut impl FnMut(&DependencyNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut DependencyNode)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    /// Removes children (with their subtrees) for which `keep` is false.
    pub fn retain_children(&mut self, keep: &impl Fn(&DependencyNode) -> bool) {
        self.children.retain(|c| keep(c));
        for child in &mut self.children {
            child.retain_children(keep);
        }
    }
}

/// Expands `${key}` references from `properties`, repeating until nothing
/// changes so that properties defined in terms of other properties resolve.
pub fn substitute_properties(value: &str, properties: &HashMap<String, String>) -> String {
    let mut current = value.to_string();
    // Bounded so that self-referencing properties terminate.
    for _ in 0..8 {
        let mut next = String::with_capacity(current.len());
        let mut rest = current.as_str();
        while let Some(start) = rest.find("${") {
            next.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let key = &after[..end];
                    match properties.get(key) {
                        Some(v) => next.push_str(v),
                        None => {
                            next.push_str("${");
                            next.push_str(key);
                            next.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    next.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        next.push_str(rest);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// True for a bare 40-digit hex string.
pub fn is_sha1_hex(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_nested_properties() {
        let mut props = HashMap::new();
        props.insert("spring.version".to_string(), "${base}.RELEASE".to_string());
        props.insert("base".to_string(), "5.3.1".to_string());

        let mut node = DependencyNode::new(Ecosystem::Maven, "spring-core", "${spring.version}");
        assert!(!node.is_resolved());
        node.substitute_version(&props);
        assert_eq!(node.version, "5.3.1.RELEASE");
        assert!(node.is_resolved());
    }

    #[test]
    fn test_missing_property_is_kept() {
        let props = HashMap::new();
        assert_eq!(substitute_properties("${nope}-1", &props), "${nope}-1");
    }

    #[test]
    fn test_self_reference_terminates() {
        let mut props = HashMap::new();
        props.insert("a".to_string(), "${a}".to_string());
        assert_eq!(substitute_properties("${a}", &props), "${a}");
    }

    #[test]
    fn test_sha1_locator_becomes_primary_hash() {
        let node = DependencyNode::new(Ecosystem::Composer, "monolog/monolog", "2.9.1")
            .with_locator("ABCDEF0123456789abcdef0123456789abcdef01");
        assert_eq!(
            node.fingerprint.sha1.as_deref(),
            Some("abcdef0123456789abcdef0123456789abcdef01")
        );

        let node = DependencyNode::new(Ecosystem::Npm, "b", "2.0.1")
            .with_locator("https://registry.yarnpkg.com/b/-/b-2.0.1.tgz");
        assert!(node.fingerprint.sha1.is_none());
    }

    #[test]
    fn test_retain_children_drops_subtrees() {
        let mut root = DependencyNode::new(Ecosystem::Npm, "root", "1.0.0");
        let mut keep = DependencyNode::new(Ecosystem::Npm, "keep", "1.0.0");
        keep.push_child(DependencyNode::new(Ecosystem::Npm, "drop", "1.0.0"));
        root.push_child(keep);
        root.push_child(DependencyNode::new(Ecosystem::Npm, "drop", "2.0.0"));

        root.retain_children(&|n| n.name != "drop");
        assert_eq!(root.node_count(), 2);
    }
}
