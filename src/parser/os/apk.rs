//! Alpine `lib/apk/db/installed` records, one field per line keyed by a
//! single character (`P:` name, `V:` version, `A:` architecture,
//! `C:` checksum).

use super::{present, records, OsPackages};
use crate::model::{DependencyNode, Ecosystem};
use std::path::Path;

pub fn apk_filename(name: &str, version: &str) -> String {
    format!("{}-{}.apk", name, version)
}

pub fn parse_apk_installed(content: &str, source: &Path) -> OsPackages {
    let mut out = OsPackages::default();

    for record in records(content) {
        let (mut name, mut version, mut arch, mut checksum) = (None, None, None, None);
        for line in record {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key {
                "P" => name = Some(value),
                "V" => version = Some(value),
                "A" => arch = Some(value),
                "C" => checksum = Some(value),
                _ => {}
            }
        }

        let node = match (present(name), present(version), present(arch)) {
            (Some(name), Some(version), Some(arch)) => {
                let mut node = DependencyNode::new(Ecosystem::Alpine, name, version)
                    .with_filename(apk_filename(name, version))
                    .with_architecture(arch)
                    .with_source(source);
                if let Some(checksum) = present(checksum) {
                    node = node.with_locator(checksum);
                }
                Some(node)
            }
            _ => None,
        };
        out.accept(node);
    }

    out
}
