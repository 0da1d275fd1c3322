//! Parser for `mvn dependency:tree` text output.
//!
//! ```text
//! [INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ app ---
//! [INFO] com.example:app:jar:1.0
//! [INFO] +- junit:junit:jar:4.13.2:test
//! [INFO] |  \- org.hamcrest:hamcrest-core:jar:1.3:test
//! [INFO] \- org.slf4j:slf4j-api:jar:1.7.36:compile
//! ```
//!
//! Output is split into one block per reactor module at the plugin banner,
//! so a module whose output is garbled does not affect its siblings.

use crate::error::{Result, ScanError};
use crate::model::{DependencyNode, Ecosystem};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

const LOG_PREFIX: &str = "[INFO] ";
const PREFIX_WIDTH: usize = 3;
const PREFIX_TOKENS: [&str; 4] = ["+- ", "\\- ", "|  ", "   "];

/// Plugin banner opening a module block. Maven 3.9 prints the short
/// `dependency:` prefix, older versions the full plugin artifact id.
static BLOCK_BANNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--- (?:maven-)?dependency(?:-plugin)?:[^:\s]+:tree\b").expect("static regex"));

/// Module root coordinate: exactly `group:artifact:packaging:version`.
static ROOT_COORDINATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^:\s]+:[^:\s]+:[^:\s]+:[^:\s]+$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub packaging: String,
    pub classifier: Option<String>,
    pub version: String,
    pub scope: Option<String>,
}

impl Coordinate {
    /// Parses `g:a:p:v`, `g:a:p:v:scope` or `g:a:p:classifier:v:scope`.
    pub fn parse(text: &str) -> Option<Self> {
        let fields: Vec<&str> = text.split(':').collect();
        if fields.iter().any(|f| f.trim().is_empty()) {
            return None;
        }
        let owned = |s: &str| s.trim().to_string();
        match fields.as_slice() {
            [g, a, p, v] => Some(Self {
                group_id: owned(g),
                artifact_id: owned(a),
                packaging: owned(p),
                classifier: None,
                version: owned(v),
                scope: None,
            }),
            [g, a, p, v, s] => Some(Self {
                group_id: owned(g),
                artifact_id: owned(a),
                packaging: owned(p),
                classifier: None,
                version: owned(v),
                scope: Some(owned(s)),
            }),
            [g, a, p, c, v, s] => Some(Self {
                group_id: owned(g),
                artifact_id: owned(a),
                packaging: owned(p),
                classifier: Some(owned(c)),
                version: owned(v),
                scope: Some(owned(s)),
            }),
            _ => None,
        }
    }

    /// File extension Maven uses on disk for this packaging.
    pub fn extension(&self) -> &str {
        match self.packaging.as_str() {
            "bundle" | "maven-plugin" | "eclipse-plugin" | "test-jar" | "ejb" | "jar" => "jar",
            other => other,
        }
    }

    /// `artifact-version[-classifier].ext`
    pub fn filename(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.artifact_id, self.version, c, self.extension()),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.extension()),
        }
    }

    /// Location of the artifact in a local repository laid out the Maven way.
    pub fn repository_path(&self, repository: &Path) -> PathBuf {
        let mut path = repository.to_path_buf();
        for part in self.group_id.split('.') {
            path.push(part);
        }
        path.push(&self.artifact_id);
        path.push(&self.version);
        path.push(self.filename());
        path
    }

    pub fn into_node(self, repository: &Path, on_disk: &mut HashMap<PathBuf, bool>) -> DependencyNode {
        let artifact = self.repository_path(repository);
        let exists = *on_disk.entry(artifact.clone()).or_insert_with(|| artifact.is_file());

        let mut node = DependencyNode::new(Ecosystem::Maven, &self.artifact_id, &self.version)
            .with_group(&self.group_id)
            .with_filename(self.filename())
            .with_classifier(self.classifier)
            .with_scope(self.scope);
        if exists {
            node = node.with_artifact(artifact);
        }
        node
    }
}

#[derive(Debug, Default)]
pub struct MavenTree {
    /// One root per module that parsed.
    pub modules: Vec<DependencyNode>,
    pub dropped_blocks: usize,
}

pub struct MavenTreeParser {
    repository: PathBuf,
}

impl MavenTreeParser {
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
        }
    }

    pub fn parse(&self, lines: &[String], source: &Path) -> MavenTree {
        let mut tree = MavenTree::default();
        // Artifact existence checks shared across modules.
        let mut on_disk = HashMap::new();

        for (index, block) in split_blocks(lines).into_iter().enumerate() {
            match self.parse_block(&block, &mut on_disk) {
                Ok(Some(mut root)) => {
                    root.source_path = Some(source.to_path_buf());
                    tree.modules.push(root);
                }
                Ok(None) => debug!(block = index, "module block had no tree"),
                Err(e) => {
                    warn!(block = index, path = %source.display(), error = %e, "dropping module tree");
                    tree.dropped_blocks += 1;
                }
            }
        }

        tree
    }

    fn parse_block(&self, block: &[String], on_disk: &mut HashMap<PathBuf, bool>) -> Result<Option<DependencyNode>> {
        // path[d] is the open node at depth d
        let mut path: Vec<DependencyNode> = Vec::new();

        for line in block {
            let Some(tree_line) = classify(line) else {
                continue;
            };

            let depth = tree_line.depth;
            if depth == 0 {
                if !path.is_empty() {
                    return Err(ScanError::parse("dependency:tree", format!("second root line '{}'", line)));
                }
            } else if path.is_empty() || depth > path.len() {
                return Err(ScanError::parse("dependency:tree", format!("orphan line '{}'", line)));
            }

            let coordinate = Coordinate::parse(tree_line.coordinate)
                .ok_or_else(|| ScanError::parse("dependency:tree", format!("bad coordinate '{}'", tree_line.coordinate)))?;

            while path.len() > depth {
                fold(&mut path);
            }
            path.push(coordinate.into_node(&self.repository, on_disk));
        }

        while path.len() > 1 {
            fold(&mut path);
        }
        Ok(path.pop())
    }
}

/// Pops the deepest open node into its parent.
fn fold(path: &mut Vec<DependencyNode>) {
    if let Some(child) = path.pop() {
        if let Some(parent) = path.last_mut() {
            parent.push_child(child);
        }
    }
}

struct TreeLine<'a> {
    depth: usize,
    coordinate: &'a str,
}

/// Keeps tree lines and module root coordinates; everything else is noise.
fn classify(line: &str) -> Option<TreeLine<'_>> {
    let content = line.strip_prefix(LOG_PREFIX)?;

    let mut rest = content;
    let mut depth = 0;
    let mut last_token = "";
    while let Some(token) = PREFIX_TOKENS.iter().find(|t| rest.starts_with(**t)) {
        rest = &rest[PREFIX_WIDTH..];
        depth += 1;
        last_token = *token;
    }

    if depth == 0 {
        return ROOT_COORDINATE
            .is_match(content.trim_end())
            .then(|| TreeLine {
                depth: 0,
                coordinate: content.trim_end(),
            });
    }

    if last_token != "+- " && last_token != "\\- " {
        return None;
    }

    // Drop trailing annotations such as "(optional)" or
    // "(version managed from 1.0)".
    let coordinate = rest.split_whitespace().next()?;
    if coordinate.starts_with('(') {
        return None;
    }
    Some(TreeLine { depth, coordinate })
}

/// Splits raw output into per-module blocks at the plugin banner. Lines
/// before the first banner belong to no module.
pub fn split_blocks(lines: &[String]) -> Vec<Vec<String>> {
    let mut blocks: Vec<Vec<String>> = Vec::new();
    for line in lines {
        if BLOCK_BANNER.is_match(line) {
            blocks.push(Vec::new());
            continue;
        }
        if let Some(block) = blocks.last_mut() {
            block.push(line.clone());
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    const TWO_MODULES: &str = "\
[INFO] Scanning for projects...
[INFO] ------------------------------------------------------------------------
[INFO] Reactor Build Order:
[INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ core ---
[INFO] com.example:core:jar:1.0
[INFO] +- junit:junit:jar:4.13.2:test
[INFO] |  \\- org.hamcrest:hamcrest-core:jar:1.3:test
[INFO] \\- org.slf4j:slf4j-api:jar:1.7.36:compile
[INFO]
[INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ web ---
[INFO] com.example:web:war:1.0
[INFO] \\- com.example:core:jar:1.0:compile
[INFO]    \\- org.slf4j:slf4j-api:jar:1.7.36:compile
[INFO] ------------------------------------------------------------------------
[INFO] BUILD SUCCESS
";

    #[test]
    fn test_parses_each_module() {
        let parser = MavenTreeParser::new("/nonexistent/repo");
        let tree = parser.parse(&lines(TWO_MODULES), Path::new("/p/pom.xml"));

        assert_eq!(tree.dropped_blocks, 0);
        assert_eq!(tree.modules.len(), 2);

        let core = &tree.modules[0];
        assert_eq!(core.name, "core");
        assert_eq!(core.group_id.as_deref(), Some("com.example"));
        assert_eq!(core.children.len(), 2);
        assert_eq!(core.children[0].name, "junit");
        assert_eq!(core.children[0].scope.as_deref(), Some("test"));
        assert_eq!(core.children[0].children[0].name, "hamcrest-core");
        assert_eq!(core.children[1].filename, "slf4j-api-1.7.36.jar");

        let web = &tree.modules[1];
        assert_eq!(web.filename, "web-1.0.war");
        assert_eq!(web.children[0].children[0].name, "slf4j-api");
    }

    #[test]
    fn test_banner_noise_between_tree_lines_is_ignored() {
        let output = "\
[INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ app ---
[INFO] com.example:app:jar:1.0
[INFO] +- org.apache.commons:commons-lang3:jar:3.14.0:compile
[INFO] Downloading from central: https://repo.maven.apache.org/maven2/x.pom
[WARNING] The POM for foo:bar:jar:1.0 is missing
[INFO] \\- com.google.guava:guava:jar:33.0.0-jre:compile
[INFO]    \\- com.google.guava:failureaccess:jar:1.0.2:compile
";
        let tree = MavenTreeParser::new("/repo").parse(&lines(output), Path::new("pom.xml"));

        assert_eq!(tree.modules.len(), 1);
        let app = &tree.modules[0];
        assert_eq!(app.node_count(), 4);
        assert_eq!(app.children[1].name, "guava");
        assert_eq!(app.children[1].children[0].name, "failureaccess");
    }

    #[test]
    fn test_malformed_block_does_not_poison_siblings() {
        let output = "\
[INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ broken ---
[INFO] com.example:broken:jar:1.0
[INFO] |  |  \\- deep:orphan:jar:1.0:compile
[INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ ok ---
[INFO] com.example:ok:jar:1.0
[INFO] \\- a:b:jar:2.0:runtime
";
        let tree = MavenTreeParser::new("/repo").parse(&lines(output), Path::new("pom.xml"));

        assert_eq!(tree.dropped_blocks, 1);
        assert_eq!(tree.modules.len(), 1);
        assert_eq!(tree.modules[0].name, "ok");
    }

    #[test]
    fn test_classifier_and_annotations() {
        let output = "\
[INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ app ---
[INFO] g:app:jar:1.0
[INFO] +- io.netty:netty-transport-native-epoll:jar:linux-x86_64:4.1.100.Final:runtime
[INFO] \\- com.h2database:h2:jar:2.2.224:test (optional)
";
        let tree = MavenTreeParser::new("/repo").parse(&lines(output), Path::new("pom.xml"));
        let app = &tree.modules[0];

        let netty = &app.children[0];
        assert_eq!(netty.classifier.as_deref(), Some("linux-x86_64"));
        assert_eq!(netty.version, "4.1.100.Final");
        assert_eq!(netty.filename, "netty-transport-native-epoll-4.1.100.Final-linux-x86_64.jar");
        assert_eq!(app.children[1].name, "h2");
    }

    #[test]
    fn test_local_repository_artifacts_are_attached() {
        let repo = TempDir::new().unwrap();
        let coordinate = Coordinate::parse("org.slf4j:slf4j-api:jar:1.7.36:compile").unwrap();
        let jar = coordinate.repository_path(repo.path());
        assert!(jar.ends_with("org/slf4j/slf4j-api/1.7.36/slf4j-api-1.7.36.jar"));
        fs::create_dir_all(jar.parent().unwrap()).unwrap();
        fs::write(&jar, b"jar").unwrap();

        let output = "\
[INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ app ---
[INFO] g:app:jar:1.0
[INFO] +- org.slf4j:slf4j-api:jar:1.7.36:compile
[INFO] \\- g:other:jar:1.0:compile
[INFO]    \\- org.slf4j:slf4j-api:jar:1.7.36:compile
";
        let tree = MavenTreeParser::new(repo.path()).parse(&lines(output), Path::new("pom.xml"));
        let app = &tree.modules[0];

        assert_eq!(app.children[0].artifact_path.as_deref(), Some(jar.as_path()));
        assert_eq!(app.children[1].children[0].artifact_path.as_deref(), Some(jar.as_path()));
        assert!(app.children[1].artifact_path.is_none());
    }

    #[test]
    fn test_short_plugin_banner_opens_a_block() {
        let output = "\
[INFO] --- dependency:3.6.1:tree (default-cli) @ app ---
[INFO] com.example:app:jar:1.0
[INFO] \\- junit:junit:jar:4.13.2:test
";
        let tree = MavenTreeParser::new("/repo").parse(&lines(output), Path::new("pom.xml"));

        assert_eq!(tree.modules.len(), 1);
        assert_eq!(tree.modules[0].name, "app");
        assert_eq!(tree.modules[0].children[0].name, "junit");
    }

    #[test]
    fn test_other_plugin_banners_do_not_split() {
        let blocks = split_blocks(&lines(
            "[INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ app ---\n\
             [INFO] --- maven-resources-plugin:3.3.1:resources (default-resources) @ app ---\n\
             [INFO] g:app:jar:1.0",
        ));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), 2);
    }

    #[test]
    fn test_output_without_banner_yields_nothing() {
        let tree = MavenTreeParser::new("/repo").parse(
            &lines("[INFO] g:a:jar:1.0\n[INFO] \\- x:y:jar:1:compile"),
            Path::new("pom.xml"),
        );
        assert!(tree.modules.is_empty());
        assert_eq!(tree.dropped_blocks, 0);
    }

    #[test]
    fn test_coordinate_rejects_wrong_arity() {
        assert!(Coordinate::parse("a:b:c").is_none());
        assert!(Coordinate::parse("a:b:c:d:e:f:g").is_none());
        assert!(Coordinate::parse("a::jar:1").is_none());
        assert_eq!(Coordinate::parse("a:b:bundle:1").unwrap().extension(), "jar");
    }
}
