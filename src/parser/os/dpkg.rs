//! Debian `var/lib/dpkg/status` and `status.d/*` records.
//!
//! ```text
//! Package: libc6
//! Status: install ok installed
//! Architecture: amd64
//! Version: 2.36-9+deb12u4
//! Description: GNU C Library: Shared libraries
//!  Contains the standard libraries that are used by nearly all programs
//! ```

use super::{present, records, OsPackages};
use crate::model::{DependencyNode, Ecosystem};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// `name_version_arch.deb`, with any epoch removed from the version.
pub fn deb_filename(name: &str, version: &str, architecture: &str) -> String {
    let version = version.split_once(':').map_or(version, |(_, rest)| rest);
    format!("{}_{}_{}.deb", name, version, architecture)
}

pub fn parse_dpkg_status(content: &str, source: &Path) -> OsPackages {
    let mut out = OsPackages::default();

    for record in records(content) {
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for line in record {
            // continuation lines belong to the previous multi-line field
            if line.starts_with([' ', '\t']) {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(key.trim(), value.trim());
            }
        }

        if let Some(status) = fields.get("Status") {
            if !status.ends_with(" installed") {
                debug!(package = ?fields.get("Package"), status = %status, "skipping package that is not installed");
                continue;
            }
        }

        let node = match (
            present(fields.get("Package").copied()),
            present(fields.get("Version").copied()),
            present(fields.get("Architecture").copied()),
        ) {
            (Some(name), Some(version), Some(arch)) => Some(
                DependencyNode::new(Ecosystem::Debian, name, version)
                    .with_filename(deb_filename(name, version, arch))
                    .with_architecture(arch)
                    .with_source(source),
            ),
            _ => None,
        };
        out.accept(node);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_records() {
        let content = "\
Package: adduser
Version: 3.134
Architecture: all

Package: libc6
Version: 2.36-9
Architecture: amd64
";
        let db = parse_dpkg_status(content, Path::new("/img/var/lib/dpkg/status"));
        assert_eq!(db.dropped, 0);
        let names: Vec<&str> = db.packages.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(names, vec!["adduser_3.134_all.deb", "libc6_2.36-9_amd64.deb"]);
    }

    #[test]
    fn test_incomplete_record_is_counted() {
        let content = "Package: broken\nVersion: 1.0\n\nPackage: ok\nVersion: 1\nArchitecture: arm64\n";
        let db = parse_dpkg_status(content, Path::new("status"));
        assert_eq!(db.packages.len(), 1);
        assert_eq!(db.dropped, 1);
    }

    #[test]
    fn test_epoch_and_description_continuations() {
        let content = "\
Package: perl
Status: install ok installed
Version: 1:5.36.0-7
Architecture: amd64
Description: Larry Wall's Practical Extraction and Report Language
 Version: not a field
";
        let db = parse_dpkg_status(content, Path::new("status"));
        assert_eq!(db.packages[0].version, "1:5.36.0-7");
        assert_eq!(db.packages[0].filename, "perl_5.36.0-7_amd64.deb");
    }

    #[test]
    fn test_removed_package_is_skipped() {
        let content = "Package: gone\nStatus: deinstall ok config-files\nVersion: 1\nArchitecture: all\n";
        let db = parse_dpkg_status(content, Path::new("status"));
        assert!(db.packages.is_empty());
        assert_eq!(db.dropped, 0);
    }
}
