//! Arch Linux `var/lib/pacman/local`: one directory per installed package,
//! named `name-pkgver-pkgrel`, each holding a `desc` file:
//!
//! ```text
//! %NAME%
//! bash
//!
//! %VERSION%
//! 5.2.026-2
//!
//! %ARCH%
//! x86_64
//! ```

use super::{present, OsPackages};
use crate::model::{DependencyNode, Ecosystem};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub fn pacman_filename(name: &str, version: &str, architecture: Option<&str>) -> String {
    match architecture {
        Some(arch) => format!("{}-{}-{}.pkg.tar.zst", name, version, arch),
        None => format!("{}-{}.pkg.tar.zst", name, version),
    }
}

/// Reads `%KEY%` sections; each value is the lines up to the next blank line.
pub fn parse_desc(content: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut key: Option<String> = None;
    let mut value: Vec<&str> = Vec::new();

    for line in content.lines().map(str::trim_end) {
        if line.len() > 2 && line.starts_with('%') && line.ends_with('%') {
            if let Some(k) = key.take() {
                fields.insert(k, value.join("\n"));
            }
            key = Some(line.trim_matches('%').to_string());
            value.clear();
        } else if line.is_empty() {
            if let Some(k) = key.take() {
                fields.insert(k, value.join("\n"));
            }
            value.clear();
        } else if key.is_some() {
            value.push(line);
        }
    }
    if let Some(k) = key {
        fields.insert(k, value.join("\n"));
    }
    fields
}

/// Splits a `name-pkgver-pkgrel` directory name into name and version.
pub fn split_directory_name(dir: &str) -> Option<(&str, String)> {
    let mut parts = dir.rsplitn(3, '-');
    let pkgrel = parts.next().filter(|s| !s.is_empty())?;
    let pkgver = parts.next().filter(|s| !s.is_empty())?;
    let name = parts.next().filter(|s| !s.is_empty())?;
    Some((name, format!("{}-{}", pkgver, pkgrel)))
}

fn desc_node(fields: &HashMap<String, String>, source: &Path) -> Option<DependencyNode> {
    let name = present(fields.get("NAME").map(String::as_str))?;
    let version = present(fields.get("VERSION").map(String::as_str))?;
    let arch = present(fields.get("ARCH").map(String::as_str));

    let mut node = DependencyNode::new(Ecosystem::Arch, name, version)
        .with_filename(pacman_filename(name, version, arch))
        .with_source(source);
    if let Some(arch) = arch {
        node = node.with_architecture(arch);
    }
    Some(node)
}

/// Reads every package directory under `local_db`, in name order. A
/// directory whose `desc` is missing or incomplete is identified by its name.
pub fn read_local_db(local_db: &Path) -> OsPackages {
    let mut out = OsPackages::default();

    let mut dirs: Vec<_> = match fs::read_dir(local_db) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(e) => {
            debug!(path = %local_db.display(), error = %e, "cannot read pacman database");
            return out;
        }
    };
    dirs.sort();

    for dir in dirs {
        let desc_path = dir.join("desc");
        let from_desc = fs::read_to_string(&desc_path)
            .ok()
            .and_then(|content| desc_node(&parse_desc(&content), &desc_path));

        let node = from_desc.or_else(|| {
            let dir_name = dir.file_name()?.to_str()?;
            let (name, version) = split_directory_name(dir_name)?;
            Some(
                DependencyNode::new(Ecosystem::Arch, name, &version)
                    .with_filename(pacman_filename(name, &version, None))
                    .with_source(&dir),
            )
        });
        out.accept(node);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DESC: &str = "%NAME%\nbash\n\n%VERSION%\n5.2.026-2\n\n%DESC%\nThe GNU Bourne Again shell\n\n%ARCH%\nx86_64\n\n%DEPENDS%\nreadline\nglibc\n";

    #[test]
    fn test_parse_desc() {
        let fields = parse_desc(DESC);
        assert_eq!(fields["NAME"], "bash");
        assert_eq!(fields["VERSION"], "5.2.026-2");
        assert_eq!(fields["DEPENDS"], "readline\nglibc");
    }

    #[test]
    fn test_split_directory_name() {
        assert_eq!(split_directory_name("bash-5.2.026-2"), Some(("bash", "5.2.026-2".to_string())));
        assert_eq!(
            split_directory_name("python-pip-23.1-1"),
            Some(("python-pip", "23.1-1".to_string()))
        );
        assert_eq!(split_directory_name("ALPM"), None);
        assert_eq!(split_directory_name("a-1"), None);
    }

    #[test]
    fn test_local_db_prefers_desc_and_falls_back_to_directory_name() {
        let db = TempDir::new().unwrap();
        let bash = db.path().join("bash-5.2.026-2");
        fs::create_dir(&bash).unwrap();
        fs::write(bash.join("desc"), DESC).unwrap();
        fs::create_dir(db.path().join("zlib-1.3-1")).unwrap();
        fs::create_dir(db.path().join("junk")).unwrap();
        fs::write(db.path().join("ALPM_DB_VERSION"), "9\n").unwrap();

        let packages = read_local_db(db.path());
        assert_eq!(packages.dropped, 1);
        let names: Vec<&str> = packages.packages.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(names, vec!["bash-5.2.026-2-x86_64.pkg.tar.zst", "zlib-1.3-1.pkg.tar.zst"]);
    }
}
