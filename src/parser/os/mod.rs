//! Readers for package databases found inside container images.
//!
//! Each reader emits one flat node per record once the record's identity
//! fields are all present and non-blank. Incomplete records are dropped and
//! counted in [`OsPackages::dropped`].

pub mod apk;
pub mod dpkg;
pub mod pacman;
pub mod rpm;

use crate::model::DependencyNode;

#[derive(Debug, Default)]
pub struct OsPackages {
    pub packages: Vec<DependencyNode>,
    pub dropped: usize,
}

impl OsPackages {
    fn accept(&mut self, node: Option<DependencyNode>) {
        match node {
            Some(node) => self.packages.push(node),
            None => self.dropped += 1,
        }
    }
}

/// Splits a database into blank-line separated records.
fn records(content: &str) -> Vec<Vec<&str>> {
    let mut out: Vec<Vec<&str>> = Vec::new();
    let mut current = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// `Some(value)` unless the value is missing, blank, or rpm's `(none)`.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty() && *v != "(none)")
}
