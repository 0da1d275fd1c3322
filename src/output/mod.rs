mod cli;
mod json;

pub use cli::{print_cli_table, render_tree};
pub use json::print_json;

use crate::model::ScanForest;
use anyhow::Result;

/// Output format for scan results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Summary table plus indented dependency trees
    Table,
    /// The whole forest as JSON
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

pub fn print_result(forest: &ScanForest, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_cli_table(forest),
        OutputFormat::Json => print_json(forest),
    }
}

/// Format result to string for file output
pub fn format_result_to_string(forest: &ScanForest, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(forest)?),
        OutputFormat::Table => {
            let mut out = String::new();
            for root in &forest.dependencies {
                out.push_str(&render_tree(root));
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert!("sarif".parse::<OutputFormat>().is_err());
    }
}
