use crate::model::{DependencyNode, ScanForest};
use anyhow::Result;
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Ecosystem")]
    ecosystem: String,
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Nodes")]
    nodes: usize,
    #[tabled(rename = "Dropped")]
    dropped: usize,
    #[tabled(rename = "Source")]
    source: String,
}

pub fn print_cli_table(forest: &ScanForest) -> Result<()> {
    println!();
    println!(
        "Scan completed at: {}",
        forest.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if forest.summaries.is_empty() {
        println!("No package manifests found.");
    } else {
        let rows: Vec<SummaryRow> = forest
            .summaries
            .iter()
            .map(|s| SummaryRow {
                ecosystem: s.ecosystem.display_name().to_string(),
                project: truncate(&s.project_root.display().to_string(), 60),
                nodes: s.nodes,
                dropped: s.dropped_records,
                source: if s.degraded { "fallback" } else { "resolved" }.to_string(),
            })
            .collect();

        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    if !forest.dependencies.is_empty() {
        println!();
        for root in &forest.dependencies {
            print!("{}", render_tree(root));
        }
    }

    println!();
    println!("Summary:");
    println!("  Dependencies: {}", forest.dependency_count());
    println!("  Unclaimed files: {}", forest.files.len());
    let dropped = forest.dropped_records();
    if dropped > 0 {
        println!("  Dropped records: {}", dropped);
    }

    Ok(())
}

/// Renders one tree with box-drawing branches, one node per line.
pub fn render_tree(root: &DependencyNode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", label(root));
    render_children(root, "", &mut out);
    out
}

fn render_children(node: &DependencyNode, prefix: &str, out: &mut String) {
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let _ = writeln!(out, "{}{}{}", prefix, branch, label(child));
        let next = format!("{}{}", prefix, if last { "    " } else { "│   " });
        render_children(child, &next, out);
    }
}

fn label(node: &DependencyNode) -> String {
    let mut label = node.filename.clone();
    if label.is_empty() {
        label = format!("{}@{}", node.key(), node.version);
    }
    if let Some(scope) = &node.scope {
        label.push_str(&format!(" ({})", scope));
    }
    if let Some(sha1) = &node.fingerprint.sha1 {
        label.push_str(&format!(" [{}]", &sha1[..sha1.len().min(12)]));
    }
    label
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let tail: String = s.chars().rev().take(max_len - 3).collect::<Vec<_>>().into_iter().rev().collect();
        format!("...{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Ecosystem;

    #[test]
    fn test_render_tree() {
        let mut root = DependencyNode::new(Ecosystem::Npm, "a", "1.0.0").with_filename("a-1.0.0.tgz");
        let mut b = DependencyNode::new(Ecosystem::Npm, "b", "2.0.1").with_filename("b-2.0.1.tgz");
        b.push_child(DependencyNode::new(Ecosystem::Npm, "c", "1.0.0").with_filename("c-1.0.0.tgz"));
        root.push_child(b);
        root.push_child(
            DependencyNode::new(Ecosystem::Npm, "d", "3.0.0")
                .with_filename("d-3.0.0.tgz")
                .with_scope(Some("dev".to_string())),
        );

        let rendered = render_tree(&root);
        assert_eq!(
            rendered,
            "a-1.0.0.tgz\n├── b-2.0.1.tgz\n│   └── c-1.0.0.tgz\n└── d-3.0.0.tgz (dev)\n"
        );
    }

    #[test]
    fn test_truncate_keeps_path_tail() {
        assert_eq!(truncate("/short", 10), "/short");
        assert_eq!(truncate("/a/very/long/path", 10), "...ng/path");
    }
}
