//! Raw text to dependency trees.
//!
//! | Parser | Input |
//! |--------|-------|
//! | [`maven_tree`] | `mvn dependency:tree` text output |
//! | [`npm_list`] | `npm ls --json` output |
//! | [`yarn_lock`] | `yarn.lock` (classic and berry) |
//! | [`composer_lock`] | `composer.lock` |
//! | [`manifest`] | `package.json`, `composer.json`, `pom.xml` |
//! | [`os`] | dpkg, apk, pacman and rpm package databases |
//!
//! Parsers never fail as a whole because of one bad block or record: the
//! offending unit is skipped, counted, and logged.

pub mod composer_lock;
pub mod manifest;
pub mod maven_tree;
pub mod npm_list;
pub mod os;
pub mod yarn_lock;

use crate::graph::DependencyGraph;
use crate::model::DependencyNode;
use tracing::debug;

/// A parsed lock file: every entry loaded into a graph and linked.
#[derive(Debug, Default)]
pub struct LockGraph {
    pub graph: DependencyGraph,
    /// Entries dropped because they lacked a name or version.
    pub dropped: usize,
}

impl LockGraph {
    /// Adds `root` to the graph, links it to the entries for `declared`
    /// keys, and returns the acyclic tree rooted at it. Keys without a lock
    /// entry are skipped.
    pub fn tree_for(mut self, root: DependencyNode, declared: &[String]) -> DependencyNode {
        let root_id = self.graph.add(root);
        for key in declared {
            match self.graph.lookup(key) {
                Some(id) => self.graph.add_edge(root_id, id),
                None => debug!(key = %key, "declared dependency has no lock entry"),
            }
        }
        self.graph
            .build_trees(&[root_id])
            .into_iter()
            .next()
            .unwrap_or_else(|| self.graph.node(root_id).clone())
    }
}

/// npm-style tarball name: `name-version.tgz`, scope dropped.
pub fn npm_filename(name: &str, version: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    format!("{}-{}.tgz", base, version)
}

/// Strips one pair of surrounding double quotes.
pub(crate) fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npm_filename_drops_scope() {
        assert_eq!(npm_filename("a", "1.0.0"), "a-1.0.0.tgz");
        assert_eq!(npm_filename("@babel/core", "7.1.0"), "core-7.1.0.tgz");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"x\""), "x");
        assert_eq!(unquote(" x "), "x");
        assert_eq!(unquote("\""), "\"");
    }
}
