//! Go module resolver: `go.mod`, `go.sum`, pkg.go.dev.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use crate::error::{FileKind, ParseError};
use crate::http::USER_AGENT;
use crate::models::{PackageInfo, RepositoryRef};

use super::{ensure_exists, file_name, read_file, EcosystemResolver};

/// Resolver for Go modules.
///
/// Module paths that already encode the GitHub host resolve without any
/// network traffic. Everything else falls back to scanning the module's
/// pkg.go.dev page, which has no JSON lookup; that scrape depends on the
/// page markup and misses for modules hosted elsewhere.
pub struct GoResolver {
    client: Client,
}

impl GoResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Split a host-encoded module path like `github.com/golang/go` into
    /// owner and repository. Purely lexical; no network call is made.
    pub fn github_path(package: &str) -> Option<RepositoryRef> {
        let rest = package.strip_prefix("github.com/")?;
        let mut parts = rest.split('/');
        let owner = parts.next()?;
        let repo = parts.next()?;
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        Some(RepositoryRef::new(owner, repo))
    }

    async fn scrape_pkg_go_dev(&self, package: &str) -> Option<RepositoryRef> {
        let url = format!("https://pkg.go.dev/{}", package);
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

        let body = response.text().await.ok()?;
        first_github_link(&body)
    }
}

#[async_trait]
impl EcosystemResolver for GoResolver {
    fn ecosystem_name(&self) -> &'static str {
        "go"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["go.mod"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["go.sum"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "go.mod" => Ok(parse_go_mod(&read_file(path)?)),
            other => Err(ParseError::unknown_format("go", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "go.sum" => Ok(parse_go_sum(&read_file(path)?)),
            other => Err(ParseError::unknown_format("go", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        if let Some(repo) = Self::github_path(package) {
            return Some(repo);
        }
        self.scrape_pkg_go_dev(package).await
    }
}

/// Parse `go.mod`, handling both the `require ( ... )` block form and
/// single-line `require path version` directives. A module re-declared later
/// in the file keeps the later version.
fn parse_go_mod(content: &str) -> Vec<PackageInfo> {
    let mut packages: Vec<PackageInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut in_require = false;

    for line in content.lines() {
        let line = line.trim();

        if line == "require (" {
            in_require = true;
            continue;
        }
        if in_require && line == ")" {
            in_require = false;
            continue;
        }

        let entry = if in_require {
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            line
        } else if let Some(rest) = line.strip_prefix("require ") {
            if rest.contains('(') {
                continue;
            }
            rest
        } else {
            continue;
        };

        let mut parts = entry.split_whitespace();
        let (Some(module), Some(version)) = (parts.next(), parts.next()) else {
            // Malformed entry, skip it
            continue;
        };

        match index.get(module) {
            Some(&i) => packages[i].version = Some(version.to_string()),
            None => {
                index.insert(module.to_string(), packages.len());
                packages.push(PackageInfo::new(module, "go", Some(version)));
            }
        }
    }

    packages
}

/// Parse `go.sum`: one line per `module version hash` entry, with each
/// module listed once per version and once more for its `/go.mod` hash.
/// Versions are checksum bookkeeping here, not resolved pins, so entries
/// carry no version and collapse to one sorted record per module path.
fn parse_go_sum(content: &str) -> Vec<PackageInfo> {
    let mut modules = BTreeSet::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        if let (Some(module), Some(_version)) = (parts.next(), parts.next()) {
            modules.insert(module.to_string());
        }
    }

    modules
        .into_iter()
        .map(|module| PackageInfo::new(module, "go", None))
        .collect()
}

/// First `https://github.com/<owner>/<repo>` occurrence in an HTML page,
/// with any URL fragment stripped from the repository name.
fn first_github_link(body: &str) -> Option<RepositoryRef> {
    let re = Regex::new(r#"https://github\.com/([^/]+)/([^/\s"]+)"#).ok()?;
    let caps = re.captures(body)?;
    let owner = &caps[1];
    let repo = caps[2].split('#').next().unwrap_or_default();
    if repo.is_empty() {
        return None;
    }
    Some(RepositoryRef::new(owner, repo))
}
