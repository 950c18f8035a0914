use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "dephealth",
    about = "Resolve project dependencies to their source repositories",
    version
)]
pub struct Cli {
    /// Project path to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Scan only this ecosystem, by name or alias (repeatable) [default: auto-detect]
    #[arg(long = "ecosystem", value_name = "NAME")]
    pub ecosystems: Vec<String>,

    /// Also parse lockfiles (pinned versions, includes transitive packages)
    #[arg(long)]
    pub include_lock: bool,

    /// Skip repository resolution; parse dependency files only
    #[arg(long)]
    pub offline: bool,

    /// Disable TLS certificate verification for registry requests
    #[arg(long)]
    pub insecure: bool,

    /// Config file [default: ./.dephealth.toml, fallback ~/.config/dephealth/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Show all packages (not just unresolved ones)
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}
