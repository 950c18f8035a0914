//! `dephealth` maps project dependencies to their source repositories.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load config ([`config::load_config`]).
//! 3. Build the shared HTTP client ([`http::build_client`]).
//! 4. Wire the resolver registry ([`resolver::registry`]).
//! 5. Pick ecosystems: `--ecosystem` names, else directory auto-detection.
//! 6. Parse dependency files (lockfiles first with `--include-lock`, so
//!    pinned versions win).
//! 7. Resolve each package to a repository unless `--offline`.
//! 8. Render the requested report ([`report`]).

mod cli;
mod config;
mod error;
mod http;
mod models;
mod report;
mod resolver;

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use cli::{Cli, ReportFormat};
use config::{load_config, Config};
use models::{PackageInfo, ResolvedPackage};
use resolver::registry::ResolverRegistry;
use resolver::EcosystemResolver;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve project path
    let path = cli
        .path
        .canonicalize()
        .unwrap_or_else(|_| cli.path.clone());

    let config = load_config(&path, cli.config.as_deref())?;

    let verify_tls = config.network.verify_tls && !cli.insecure;
    let client = http::build_client(verify_tls)?;
    let registry = ResolverRegistry::with_builtins(&client);

    // Ecosystems: explicit names (aliases welcome) or auto-detection
    let ecosystems: Vec<String> = if cli.ecosystems.is_empty() {
        registry.detect_ecosystems(&path)
    } else {
        let mut names = Vec::new();
        for name in &cli.ecosystems {
            let Some(resolver) = registry.get(name) else {
                eprintln!("Unknown ecosystem: {}", name);
                std::process::exit(1);
            };
            let canonical = resolver.ecosystem_name().to_string();
            if !names.contains(&canonical) {
                names.push(canonical);
            }
        }
        names
    };

    if ecosystems.is_empty() {
        eprintln!(
            "No supported project manifests found in {}",
            path.display()
        );
        std::process::exit(1);
    }

    // Parse dependency files for each ecosystem
    let mut all_packages = Vec::new();

    for ecosystem in &ecosystems {
        let Some(resolver) = registry.get(ecosystem) else {
            continue;
        };
        let packages = collect_packages(resolver.as_ref(), &path, &config, &cli);

        if !cli.quiet {
            eprintln!(
                "  {} {} {} packages",
                "→".cyan(),
                ecosystem,
                packages.len()
            );
        }

        all_packages.extend(packages);
    }

    // Cross-source dedup; first occurrence wins, so lockfile pins survive
    let mut seen = HashSet::new();
    all_packages.retain(|p| seen.insert((p.ecosystem.clone(), p.name.clone())));

    let results: Vec<ResolvedPackage> = if cli.offline {
        all_packages
            .into_iter()
            .map(|package| ResolvedPackage {
                package,
                repository: None,
            })
            .collect()
    } else {
        resolve_all(&registry, all_packages, cli.quiet).await?
    };

    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&results, &path, cli.verbose, cli.quiet)?;
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(())
}

/// Parse every recognized dependency file one resolver sees under `path`.
/// A file that fails to parse is reported and skipped; the scan goes on.
fn collect_packages(
    resolver: &dyn EcosystemResolver,
    path: &Path,
    config: &Config,
    cli: &Cli,
) -> Vec<PackageInfo> {
    let mut packages = Vec::new();

    if cli.include_lock {
        for lockfile in resolver.detect_lockfiles(path) {
            match resolver.parse_lockfile(&lockfile) {
                Ok(parsed) => packages.extend(parsed),
                Err(err) => {
                    if !cli.quiet {
                        eprintln!("  {} {}", "warning:".yellow(), err);
                    }
                }
            }
        }
    }

    for manifest in resolver.manifest_files() {
        let manifest_path = path.join(manifest);
        if !manifest_path.exists() {
            continue;
        }
        match resolver.parse_manifest(&manifest_path) {
            Ok(parsed) => packages.extend(parsed),
            Err(err) => {
                if !cli.quiet {
                    eprintln!("  {} {}", "warning:".yellow(), err);
                }
            }
        }
    }

    packages.retain(|p| !config.is_excluded(&p.name));
    packages
}

/// Resolve repositories for every package, batched so one slow registry
/// cannot serialize the whole run.
async fn resolve_all(
    registry: &ResolverRegistry,
    packages: Vec<PackageInfo>,
    quiet: bool,
) -> Result<Vec<ResolvedPackage>> {
    use futures::future::join_all;

    const BATCH_SIZE: usize = 75;

    let pb = if !quiet {
        let pb = ProgressBar::new(packages.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut results = Vec::with_capacity(packages.len());

    for batch in packages.chunks(BATCH_SIZE) {
        let futures: Vec<_> = batch
            .iter()
            .map(|package| {
                let resolver = registry.get(&package.ecosystem);
                let name = package.name.clone();
                async move {
                    match resolver {
                        Some(resolver) => resolver.resolve_repository(&name).await,
                        None => None,
                    }
                }
            })
            .collect();

        let repositories = join_all(futures).await;

        for (package, repository) in batch.iter().zip(repositories) {
            results.push(ResolvedPackage {
                package: package.clone(),
                repository,
            });
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message("Done");
    }

    Ok(results)
}
