use std::path::Path;

use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use crate::models::ResolvedPackage;

/// Render a colored terminal report.
pub fn render(results: &[ResolvedPackage], path: &Path, verbose: bool, quiet: bool) -> Result<()> {
    let total = results.len();
    let resolved_count = results.iter().filter(|r| r.repository.is_some()).count();
    let missing_count = total - resolved_count;

    if quiet {
        println!(
            "Total: {}  Resolved: {}  Unresolved: {}",
            total,
            resolved_count.to_string().green(),
            missing_count.to_string().yellow(),
        );
        return Ok(());
    }

    println!("\n {} v{}", "dephealth".bold(), env!("CARGO_PKG_VERSION"));
    println!(" Scanning: {}\n", path.display());

    // Summary box
    let resolved_summary = summarize_ecosystems(results, true);
    let missing_summary = summarize_ecosystems(results, false);

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Total packages   : {}", total));
    println!(
        " │  {:<48} │",
        format!(
            "{}  Resolved      : {:>4}  {}",
            "✓".green(),
            resolved_count,
            resolved_summary
        )
    );
    println!(
        " │  {:<48} │",
        format!(
            "{}  Unresolved    : {:>4}  {}",
            "✗".yellow(),
            missing_count,
            missing_summary
        )
    );
    println!(" └────────────────────────────────────────────────────┘\n");

    // Unresolved table: the actionable part
    if missing_count > 0 {
        println!(
            " {} Packages without a resolved repository:\n",
            "[MISS]".yellow().bold()
        );
        render_table(results, false);
        println!();
    }

    // Verbose: show the full package → repository map
    if verbose && resolved_count > 0 {
        println!(" {} Resolved packages:\n", "[OK]".green().bold());
        render_table(results, true);
        println!();
    }

    Ok(())
}

fn render_table(results: &[ResolvedPackage], resolved: bool) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Ecosystem").add_attribute(Attribute::Bold),
            Cell::new("Repository").add_attribute(Attribute::Bold),
        ]);

    for result in results
        .iter()
        .filter(|r| r.repository.is_some() == resolved)
    {
        let repository_cell = match &result.repository {
            Some(repo) => Cell::new(repo.to_string()).fg(Color::Green),
            None => Cell::new("-").fg(Color::DarkGrey),
        };

        table.add_row(vec![
            Cell::new(&result.package.name),
            Cell::new(result.package.version.as_deref().unwrap_or("-")),
            Cell::new(&result.package.ecosystem),
            repository_cell,
        ]);
    }

    println!("{}", table);
}

fn summarize_ecosystems(results: &[ResolvedPackage], resolved: bool) -> String {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for result in results
        .iter()
        .filter(|r| r.repository.is_some() == resolved)
    {
        *counts.entry(result.package.ecosystem.clone()).or_insert(0) += 1;
    }

    let mut pairs: Vec<(String, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1));

    let summary: Vec<String> = pairs
        .iter()
        .take(3)
        .map(|(ecosystem, count)| format!("{} ({})", ecosystem, count))
        .collect();

    if summary.is_empty() {
        String::new()
    } else {
        format!("[{}]", summary.join(", "))
    }
}
