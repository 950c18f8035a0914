//! Perl resolver: `cpanfile`, `cpanfile.snapshot`, MetaCPAN.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::error::{FileKind, ParseError};
use crate::http::USER_AGENT;
use crate::models::{PackageInfo, RepositoryRef};

use super::{ensure_exists, file_name, read_file, EcosystemResolver};

pub struct PerlResolver {
    client: Client,
}

impl PerlResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_metacpan(&self, package: &str) -> Option<RepositoryRef> {
        // Module names map onto release names by swapping :: for -
        let release = package.replace("::", "-");
        let url = format!("https://fastapi.metacpan.org/v1/release/{}", release);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let data: Value = response.json().await.ok()?;
        repository_from_metacpan(&data)
    }
}

#[async_trait]
impl EcosystemResolver for PerlResolver {
    fn ecosystem_name(&self) -> &'static str {
        "perl"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["cpanfile"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["cpanfile.snapshot"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "cpanfile" => Ok(parse_cpanfile(&read_file(path)?)),
            other => Err(ParseError::unknown_format("perl", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "cpanfile.snapshot" => Ok(parse_snapshot(&read_file(path)?)),
            other => Err(ParseError::unknown_format("perl", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_metacpan(package).await
    }
}

/// Parse `cpanfile` `requires 'Module::Name', 'version';` statements.
/// `on` blocks (test/develop phases) use the same statement form, so their
/// requirements are picked up too.
fn parse_cpanfile(content: &str) -> Vec<PackageInfo> {
    let Ok(re) = Regex::new(r#"^\s*requires\s+['"]([^'"]+)['"](?:\s*,\s*['"]([^'"]+)['"])?"#)
    else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for line in content.lines() {
        let Some(caps) = re.captures(line) else { continue };
        let name = caps[1].to_string();
        if seen.insert(name.clone()) {
            let version = caps.get(2).map(|m| m.as_str());
            packages.push(PackageInfo::new(name, "perl", version));
        }
    }

    packages
}

/// Parse `cpanfile.snapshot`: `distribution:` lines under `DISTRIBUTIONS`.
/// Distribution names end in a dotted-numeric version (`Test-Simple-1.302190`)
/// which is split off; hyphenated names without one are kept whole.
fn parse_snapshot(content: &str) -> Vec<PackageInfo> {
    let mut packages = Vec::new();
    let mut seen = HashSet::new();
    let mut in_distributions = false;

    for line in content.lines() {
        if !line.starts_with(' ') {
            in_distributions = line.trim_end() == "DISTRIBUTIONS";
            continue;
        }
        if !in_distributions {
            continue;
        }
        let Some(dist) = line.trim().strip_prefix("distribution:") else {
            continue;
        };
        let (name, version) = split_distribution_version(dist.trim());
        if !name.is_empty() && seen.insert(name.to_string()) {
            packages.push(PackageInfo::new(name, "perl", version));
        }
    }

    packages
}

/// Split `Name-1.2.3` into name and trailing numeric version. Underscores
/// appear in developer-release versions and stay part of the version.
fn split_distribution_version(dist: &str) -> (&str, Option<&str>) {
    if let Some((name, suffix)) = dist.rsplit_once('-') {
        if suffix.starts_with(|c: char| c.is_ascii_digit())
            && suffix.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '_')
        {
            return (name, Some(suffix));
        }
    }
    (dist, None)
}

/// Pull a repository out of a MetaCPAN release payload:
/// `resources.repository.url`, then `.web`.
fn repository_from_metacpan(data: &Value) -> Option<RepositoryRef> {
    let repository = data.get("resources")?.get("repository")?;
    for key in ["url", "web"] {
        if let Some(repo) = repository
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(RepositoryRef::from_url)
        {
            return Some(repo);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpanfile_with_and_without_versions() {
        let content = r#"requires 'Mojolicious', '9.00';
requires "DBI";
requires 'Plack', '>= 1.0048';

on 'test' => sub {
    requires 'Test::More', '0.98';
};
"#;
        let packages = parse_cpanfile(content);
        assert_eq!(packages.len(), 4);
        assert_eq!(packages[0].name, "Mojolicious");
        assert_eq!(packages[0].version.as_deref(), Some("9.00"));
        assert_eq!(packages[1].name, "DBI");
        assert!(packages[1].version.is_none());
        assert_eq!(packages[2].version.as_deref(), Some(">= 1.0048"));
        assert_eq!(packages[3].name, "Test::More");
    }

    #[test]
    fn test_parse_snapshot_distribution_lines() {
        let content = "\
# carton snapshot format: version 1.0
DISTRIBUTIONS
  Test-Simple-1.302190
    pathname: E/EX/EXODIST/Test-Simple-1.302190.tar.gz
    distribution: Test-Simple-1.302190
    provides:
      Test::More 1.302190
  DBI-1.643
    distribution: DBI-1.643
";
        let packages = parse_snapshot(content);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "Test-Simple");
        assert_eq!(packages[0].version.as_deref(), Some("1.302190"));
        assert_eq!(packages[1].name, "DBI");
        assert_eq!(packages[1].version.as_deref(), Some("1.643"));
    }

    #[test]
    fn test_split_distribution_version_edge_cases() {
        assert_eq!(split_distribution_version("Test-Simple-1.302190"), ("Test-Simple", Some("1.302190")));
        assert_eq!(split_distribution_version("DBI"), ("DBI", None));
        assert_eq!(split_distribution_version("Some-Thing"), ("Some-Thing", None));
    }

    #[test]
    fn test_repository_from_metacpan_url_then_web() {
        let data: Value = serde_json::from_str(
            r#"{"resources": {"repository": {"url": "https://github.com/mojolicious/mojo.git"}}}"#,
        )
        .unwrap();
        let repo = repository_from_metacpan(&data).unwrap();
        assert_eq!(repo.owner, "mojolicious");
        assert_eq!(repo.name, "mojo");

        let web_only: Value = serde_json::from_str(
            r#"{"resources": {"repository": {"web": "https://github.com/perl5-dbi/dbi"}}}"#,
        )
        .unwrap();
        assert_eq!(repository_from_metacpan(&web_only).unwrap().owner, "perl5-dbi");
    }

    #[test]
    fn test_repository_from_metacpan_empty_url() {
        let data: Value = serde_json::from_str(
            r#"{"resources": {"repository": {"url": ""}}}"#,
        )
        .unwrap();
        assert!(repository_from_metacpan(&data).is_none());
    }
}
