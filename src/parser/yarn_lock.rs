//! Parser for `yarn.lock`, classic (v1) and berry (v2+).
//!
//! ```text
//! "@babel/code-frame@^7.0.0", "@babel/code-frame@^7.10.4":
//!   version "7.12.13"
//!   resolved "https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.12.13.tgz#dcfc826b..."
//!   dependencies:
//!     "@babel/highlight" "^7.12.13"
//! ```
//!
//! One entry can satisfy several `name@range` keys. Entries are loaded in a
//! first pass and linked by key in a second, since an entry may reference
//! one that appears later in the file (or itself, through a cycle).

use super::{npm_filename, unquote, LockGraph};
use crate::graph::NodeId;
use crate::model::{is_sha1_hex, DependencyNode, Ecosystem};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Fields,
    Dependencies,
    Other,
}

#[derive(Debug, Default)]
struct Entry {
    keys: Vec<String>,
    version: Option<String>,
    resolved: Option<String>,
    integrity: Option<String>,
    children: Vec<String>,
    /// Indentation of the entry's own fields, learned from its first field.
    field_indent: Option<usize>,
}

#[derive(Debug)]
enum State {
    Outside,
    InEntry(Entry, Section),
}

/// Builds `name@range`, dropping the `npm:` protocol berry adds to plain ranges.
pub fn lock_key(name: &str, range: &str) -> String {
    let range = match range.strip_prefix("npm:") {
        Some(rest) if !rest.contains('@') => rest,
        _ => range,
    };
    format!("{}@{}", name, range)
}

/// Splits `name@range` at the `@` after the (possibly scoped) name.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let search_from = usize::from(key.starts_with('@'));
    let at = key[search_from..].find('@')? + search_from;
    Some((&key[..at], &key[at + 1..]))
}

pub fn parse_yarn_lock(content: &str, source: &Path) -> LockGraph {
    let mut lock = LockGraph::default();
    let mut pending: Vec<(NodeId, Vec<String>)> = Vec::new();
    let mut state = State::Outside;

    for raw in content.lines() {
        let line = raw.trim_end();
        let trimmed = line.trim_start();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            finish(std::mem::replace(&mut state, State::Outside), &mut lock, &mut pending, source);
            continue;
        }

        let indent = line.len() - trimmed.len();

        if indent == 0 {
            finish(std::mem::replace(&mut state, State::Outside), &mut lock, &mut pending, source);
            state = match parse_header(trimmed) {
                Some(keys) => State::InEntry(
                    Entry {
                        keys,
                        ..Entry::default()
                    },
                    Section::Fields,
                ),
                None => {
                    // yarn berry's `__metadata:` block and garbage both end up here
                    if !trimmed.starts_with("__metadata") {
                        debug!(line = %trimmed, "unrecognized yarn.lock header");
                    }
                    State::Outside
                }
            };
            continue;
        }

        let State::InEntry(entry, section) = &mut state else {
            continue;
        };

        let field_indent = *entry.field_indent.get_or_insert(indent);
        if indent <= field_indent {
            *section = apply_field(entry, trimmed);
        } else if *section == Section::Dependencies {
            if let Some((name, range)) = split_field(trimmed) {
                entry.children.push(lock_key(unquote(name), unquote(range)));
            }
        }
    }
    finish(state, &mut lock, &mut pending, source);

    for (from, children) in pending {
        for key in children {
            match lock.graph.lookup(&key) {
                Some(to) => lock.graph.add_edge(from, to),
                None => debug!(key = %key, "yarn.lock dependency has no entry"),
            }
        }
    }

    lock
}

/// Parses `a@^1, "a@^1.2":` (classic) or `"a@npm:^1, a@npm:^1.2":` (berry)
/// into its keys.
fn parse_header(line: &str) -> Option<Vec<String>> {
    let body = line.strip_suffix(':')?;
    let keys: Vec<String> = body
        .split(',')
        .map(|k| k.trim().trim_matches('"'))
        .filter(|k| !k.is_empty())
        .filter_map(|k| split_key(k).map(|(name, range)| lock_key(name, range)))
        .collect();
    (!keys.is_empty()).then_some(keys)
}

/// Splits `key value` (classic) or `key: value` (berry).
fn split_field(line: &str) -> Option<(&str, &str)> {
    if line.starts_with('"') {
        // quoted key, e.g. "@babel/highlight" "^7.12.13"
        let close = line[1..].find('"')? + 1;
        let key = &line[..=close];
        let value = line[close + 1..].trim_start_matches(':').trim();
        return Some((key, value));
    }
    let split_at = line.find([' ', ':'])?;
    let key = &line[..split_at];
    let value = line[split_at..].trim_start_matches(':').trim();
    Some((key, value))
}

fn apply_field(entry: &mut Entry, line: &str) -> Section {
    if let Some(name) = line.strip_suffix(':') {
        return match unquote(name) {
            "dependencies" | "optionalDependencies" => Section::Dependencies,
            _ => Section::Other,
        };
    }

    let Some((key, value)) = split_field(line) else {
        return Section::Fields;
    };
    let value = unquote(value).to_string();
    match unquote(key) {
        "version" => entry.version = Some(value),
        "resolved" | "resolution" => entry.resolved = Some(value),
        "integrity" | "checksum" => entry.integrity = Some(value),
        _ => {}
    }
    Section::Fields
}

fn finish(state: State, lock: &mut LockGraph, pending: &mut Vec<(NodeId, Vec<String>)>, source: &Path) {
    let State::InEntry(entry, _) = state else {
        return;
    };

    let name = entry.keys.first().and_then(|k| split_key(k)).map(|(n, _)| n.to_string());
    let (Some(name), Some(version)) = (name, entry.version.filter(|v| !v.is_empty())) else {
        debug!(keys = ?entry.keys, "dropping yarn.lock entry without version");
        lock.dropped += 1;
        return;
    };

    let mut node = DependencyNode::new(Ecosystem::Npm, &name, &version)
        .with_filename(npm_filename(&name, &version))
        .with_source(source);
    if let Some(resolved) = &entry.resolved {
        node = node.with_locator(resolved);
        // classic lock files append the tarball SHA-1 as a URL fragment
        if let Some((_, fragment)) = resolved.rsplit_once('#') {
            if is_sha1_hex(fragment) {
                node.fingerprint.sha1 = Some(fragment.to_ascii_lowercase());
            }
        }
    } else if let Some(integrity) = &entry.integrity {
        node = node.with_locator(integrity);
    }

    let id = lock.graph.add(node);
    for key in entry.keys {
        lock.graph.alias(key, id);
    }
    pending.push((id, entry.children));
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIC: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@babel/code-frame@^7.0.0", "@babel/code-frame@^7.10.4":
  version "7.12.13"
  resolved "https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.12.13.tgz#dcfc826beef65e75c50e21d3837d7d95798dd658"
  integrity sha512-HV1Cm0Q3ZrpCR93tkWOYiuYIgLxZXZFVG2VgK+MBWjUqZTundupbfx2aXarXuw5Ko5aMcjtJgbSs4vUGBS5v6g==
  dependencies:
    "@babel/highlight" "^7.12.13"

"@babel/highlight@^7.12.13":
  version "7.13.10"
  resolved "https://registry.yarnpkg.com/@babel/highlight/-/highlight-7.13.10.tgz"
  dependencies:
    js-tokens "^4.0.0"

js-tokens@^4.0.0:
  version "4.0.0"
"#;

    #[test]
    fn test_classic_entries_and_aliases() {
        let lock = parse_yarn_lock(CLASSIC, Path::new("yarn.lock"));
        assert_eq!(lock.graph.len(), 3);
        assert_eq!(lock.dropped, 0);

        let a = lock.graph.lookup("@babel/code-frame@^7.0.0").unwrap();
        let b = lock.graph.lookup("@babel/code-frame@^7.10.4").unwrap();
        assert_eq!(a, b);

        let node = lock.graph.node(a);
        assert_eq!(node.version, "7.12.13");
        assert_eq!(node.filename, "code-frame-7.12.13.tgz");
        assert_eq!(
            node.fingerprint.sha1.as_deref(),
            Some("dcfc826beef65e75c50e21d3837d7d95798dd658")
        );
    }

    #[test]
    fn test_tree_for_declared_dependencies() {
        let lock = parse_yarn_lock(CLASSIC, Path::new("yarn.lock"));
        let root = DependencyNode::new(Ecosystem::Npm, "app", "1.0.0");
        let tree = lock.tree_for(root, &["@babel/code-frame@^7.10.4".to_string(), "unknown@1".to_string()]);

        assert_eq!(tree.children.len(), 1);
        let frame = &tree.children[0];
        assert_eq!(frame.children[0].name, "@babel/highlight");
        assert_eq!(frame.children[0].children[0].name, "js-tokens");
    }

    #[test]
    fn test_mutual_reference_is_acyclic() {
        let content = r#"
a@^1.0.0:
  version "1.0.0"
  dependencies:
    b "^2.0.0"

b@^2.0.0:
  version "2.0.0"
  dependencies:
    a "^1.0.0"
"#;
        let lock = parse_yarn_lock(content, Path::new("yarn.lock"));
        let from_a = lock.tree_for(
            DependencyNode::new(Ecosystem::Npm, "app", "1.0.0"),
            &["a@^1.0.0".to_string()],
        );
        let a = &from_a.children[0];
        assert_eq!(a.children[0].name, "b");
        assert!(a.children[0].children.is_empty());

        let lock = parse_yarn_lock(content, Path::new("yarn.lock"));
        let from_b = lock.tree_for(
            DependencyNode::new(Ecosystem::Npm, "app", "1.0.0"),
            &["b@^2.0.0".to_string()],
        );
        let b = &from_b.children[0];
        assert_eq!(b.children[0].name, "a");
        assert!(b.children[0].children.is_empty());
    }

    #[test]
    fn test_berry_format() {
        let content = r#"
__metadata:
  version: 6
  cacheKey: 8

"lodash@npm:^4.17.21":
  version: 4.17.21
  resolution: "lodash@npm:4.17.21"
  checksum: eb835a2e51d381e561e508ce932ea50a8e5a68f4ebdd771ea240d3048244a8d13658acbd502cd4829768c56f2e16bdd4340b9ea141297d472517b83868e677f7
  languageName: node
  linkType: hard

"wrap@npm:^1.0.0":
  version: 1.0.0
  dependencies:
    lodash: ^4.17.21
  peerDependenciesMeta:
    react:
      optional: true
"#;
        let lock = parse_yarn_lock(content, Path::new("yarn.lock"));
        assert_eq!(lock.graph.len(), 2);

        let wrap = lock.graph.lookup("wrap@^1.0.0").unwrap();
        let lodash = lock.graph.lookup("lodash@^4.17.21").unwrap();
        assert_eq!(lock.graph.children(wrap), &[lodash]);
        assert_eq!(lock.graph.node(lodash).locator.as_deref(), Some("lodash@npm:4.17.21"));
    }

    #[test]
    fn test_berry_header_with_several_keys() {
        let content = "\"ms@npm:^2.1.1, ms@npm:^2.1.3\":\n  version: 2.1.3\n";
        let lock = parse_yarn_lock(content, Path::new("yarn.lock"));
        assert_eq!(lock.graph.lookup("ms@^2.1.1"), lock.graph.lookup("ms@^2.1.3"));
        assert!(lock.graph.lookup("ms@^2.1.1").is_some());
    }

    #[test]
    fn test_entry_without_version_is_dropped() {
        let content = "left-pad@^1.0.0:\n  resolved \"x\"\n\nok@1:\n  version \"1.0.0\"\n";
        let lock = parse_yarn_lock(content, Path::new("yarn.lock"));
        assert_eq!(lock.dropped, 1);
        assert_eq!(lock.graph.len(), 1);
    }

    #[test]
    fn test_split_key_handles_scopes() {
        assert_eq!(split_key("@scope/pkg@^1.0.0"), Some(("@scope/pkg", "^1.0.0")));
        assert_eq!(split_key("pkg@npm:other@^2"), Some(("pkg", "npm:other@^2")));
        assert_eq!(lock_key("pkg", "npm:^1"), "pkg@^1");
        assert_eq!(lock_key("pkg", "npm:other@^2"), "pkg@npm:other@^2");
        assert_eq!(split_key("nokey"), None);
    }
}
