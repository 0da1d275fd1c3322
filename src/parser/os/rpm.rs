//! RPM database query output.
//!
//! The database itself (Berkeley DB, NDB or SQLite depending on the
//! distribution) is read by `rpm`; this parses its `--queryformat` output.

use super::{present, OsPackages};
use crate::model::{DependencyNode, Ecosystem};
use std::path::Path;

/// `--queryformat` producing one tab-separated record per package.
pub const QUERY_FORMAT: &str = "%{NAME}\\t%{VERSION}\\t%{RELEASE}\\t%{ARCH}\\n";

pub fn rpm_filename(name: &str, version: &str, release: &str, architecture: &str) -> String {
    format!("{}-{}-{}.{}.rpm", name, version, release, architecture)
}

pub fn parse_rpm_query(lines: &[String], source: &Path) -> OsPackages {
    let mut out = OsPackages::default();

    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        let mut fields = line.split('\t');
        let node = match (
            present(fields.next()),
            present(fields.next()),
            present(fields.next()),
            present(fields.next()),
        ) {
            (Some(name), Some(version), Some(release), Some(arch)) => Some(
                DependencyNode::new(Ecosystem::Rpm, name, format!("{}-{}", version, release))
                    .with_filename(rpm_filename(name, version, release, arch))
                    .with_architecture(arch)
                    .with_source(source),
            ),
            _ => None,
        };
        out.accept(node);
    }

    out
}
