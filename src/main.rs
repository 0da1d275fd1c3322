use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use depforest::{
    config::Config,
    model::ScanForest,
    output::{format_result_to_string, print_result, OutputFormat},
    resolver::{all_resolvers, is_enabled},
    Orchestrator,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const INCOMPLETE: u8 = 2;
}

#[derive(Parser)]
#[command(name = "depforest")]
#[command(
    author,
    version,
    about = "Reconstruct dependency trees from package ecosystems and fingerprint them"
)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan folders for dependencies
    Scan {
        /// Folders to scan
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Parse files only, never invoke package managers
        #[arg(long)]
        no_tools: bool,

        /// Nested archive levels to expand (0-7)
        #[arg(long)]
        archive_depth: Option<u8>,

        /// Additional exclude globs
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Exit with a distinct code if any ecosystem fell back to manifests or dropped records
        #[arg(long)]
        strict: bool,
    },

    /// List available resolvers
    ListResolvers,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

/// Logs go to stderr so JSON on stdout stays parseable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "depforest=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<u8> {
    let config = Config::load().context("failed to load config file")?;

    match cli.command {
        Commands::Scan {
            paths,
            format,
            output,
            no_tools,
            archive_depth,
            exclude,
            strict,
        } => {
            let mut config = config;
            if no_tools {
                config.maven.ecosystem.run_tool = false;
                config.npm.run_tool = false;
                config.composer.ecosystem.run_tool = false;
                config.os.run_tool = false;
            }
            if let Some(depth) = archive_depth {
                config.archive_depth = depth;
            }
            config.exclude.extend(exclude);

            let format = OutputFormat::from_str(format.as_deref().unwrap_or("table"))
                .map_err(|e| anyhow::anyhow!(e))?;
            run_scan(config, paths, format, output, strict).await
        }
        Commands::ListResolvers => {
            list_resolvers(&config);
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_scan(
    config: Config,
    paths: Vec<PathBuf>,
    format: OutputFormat,
    output_file: Option<PathBuf>,
    strict: bool,
) -> Result<u8> {
    let is_interactive = format == OutputFormat::Table && output_file.is_none();

    for path in &paths {
        if !path.exists() {
            anyhow::bail!("scan path does not exist: {}", path.display());
        }
    }

    let orchestrator = Orchestrator::new(config).context("invalid configuration")?;

    let progress = if is_interactive {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .context("invalid progress template")?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Resolving dependencies...");
        Some(pb)
    } else {
        None
    };

    let forest = orchestrator.scan(&paths).await;

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Found {} dependencies and {} unclaimed files",
            forest.dependency_count(),
            forest.files.len()
        ));
    }

    if let Some(path) = output_file {
        let rendered = format_result_to_string(&forest, format)?;
        std::fs::write(&path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Results written to: {}", path.display());
    } else {
        print_result(&forest, format)?;
    }

    Ok(determine_exit_code(&forest, strict))
}

fn determine_exit_code(forest: &ScanForest, strict: bool) -> u8 {
    let incomplete = forest
        .summaries
        .iter()
        .any(|s| s.degraded || s.dropped_records > 0);
    if strict && incomplete {
        exit_codes::INCOMPLETE
    } else {
        exit_codes::SUCCESS
    }
}

fn list_resolvers(config: &Config) {
    println!("Available resolvers:");
    println!();

    for resolver in all_resolvers(config) {
        let enabled = if is_enabled(config, resolver.ecosystem()) {
            "yes"
        } else {
            "no"
        };
        println!(
            "  {:<10} {:<10} [enabled: {}]",
            resolver.name(),
            resolver.ecosystem().to_string(),
            enabled
        );
        println!("  {:<10} Files: {}", "", resolver.bom_patterns().join(", "));
        println!();
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save().context("failed to write config file")?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'depforest config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use depforest::model::{EcosystemSummary, Ecosystem};

    fn forest_with(degraded: bool, dropped: usize) -> ScanForest {
        let mut forest = ScanForest::new(vec![PathBuf::from("/scan")]);
        forest.summaries.push(EcosystemSummary {
            ecosystem: Ecosystem::Npm,
            project_root: PathBuf::from("/scan/app"),
            nodes: 1,
            dropped_records: dropped,
            degraded,
        });
        forest
    }

    #[test]
    fn test_exit_code_only_fails_when_strict() {
        assert_eq!(determine_exit_code(&forest_with(true, 0), false), exit_codes::SUCCESS);
        assert_eq!(determine_exit_code(&forest_with(true, 0), true), exit_codes::INCOMPLETE);
        assert_eq!(determine_exit_code(&forest_with(false, 3), true), exit_codes::INCOMPLETE);
        assert_eq!(determine_exit_code(&forest_with(false, 0), true), exit_codes::SUCCESS);
    }

    #[test]
    fn test_cli_parses_scan_flags() {
        let cli = Cli::try_parse_from(["depforest", "scan", "/a", "/b", "--no-tools", "-f", "json"]).unwrap();
        match cli.command {
            Commands::Scan { paths, no_tools, format, .. } => {
                assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
                assert!(no_tools);
                assert_eq!(format.as_deref(), Some("json"));
            }
            _ => panic!("expected scan"),
        }
    }
}
