//! Ruby resolver: `Gemfile`, `Gemfile.lock`, RubyGems.

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

pub struct RubyResolver {
    client: Client,
}

impl RubyResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_rubygems(&self, package: &str) -> Option<RepositoryRef> {
        let url = format!("https://rubygems.org/api/v1/gems/{}.json", package);
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
        repository_from_rubygems(&data)
    }
}

#[async_trait]
impl EcosystemResolver for RubyResolver {
    fn ecosystem_name(&self) -> &'static str {
        "ruby"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["Gemfile"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["Gemfile.lock"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "Gemfile" => Ok(parse_gemfile(&read_file(path)?)),
            other => Err(ParseError::unknown_format("ruby", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "Gemfile.lock" => Ok(parse_gemfile_lock(&read_file(path)?)),
            other => Err(ParseError::unknown_format("ruby", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_rubygems(package).await
    }
}

/// Parse `gem 'name', 'requirement', ...` declarations from a `Gemfile`.
/// Only the first requirement string is kept; group blocks and options are
/// ignored.
fn parse_gemfile(content: &str) -> Vec<PackageInfo> {
    let Ok(re) = Regex::new(r#"^\s*gem\s+['"]([^'"]+)['"](?:\s*,\s*['"]([^'"]+)['"])?"#) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for line in content.lines() {
        let Some(caps) = re.captures(line) else { continue };
        let name = caps[1].to_string();
        if !seen.insert(name.clone()) {
            continue;
        }
        let version = caps.get(2).map(|m| m.as_str());
        packages.push(PackageInfo::new(name, "ruby", version));
    }

    packages
}

/// Parse `Gemfile.lock`: entries under `GEM` / `specs:` at exactly four
/// spaces of indent, `name (version)`. Deeper lines are transitive
/// requirements of the entry above and carry ranges, not pins.
fn parse_gemfile_lock(content: &str) -> Vec<PackageInfo> {
    let Ok(re) = Regex::new(r"^ {4}(\S+) \(([^)]+)\)$") else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();
    let mut in_gem = false;

    for line in content.lines() {
        if !line.starts_with(' ') {
            in_gem = line.trim_end() == "GEM";
            continue;
        }
        if !in_gem {
            continue;
        }
        let Some(caps) = re.captures(line) else { continue };
        let name = caps[1].to_string();
        if seen.insert(name.clone()) {
            packages.push(PackageInfo::new(name, "ruby", Some(&caps[2])));
        }
    }

    packages
}

/// Pull a repository out of a RubyGems payload: `source_code_uri` first,
/// `homepage_uri` second.
fn repository_from_rubygems(data: &Value) -> Option<RepositoryRef> {
    for key in ["source_code_uri", "homepage_uri"] {
        if let Some(repo) = data
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(RepositoryRef::from_url)
        {
            return Some(repo);
        }
    }
    None
}
