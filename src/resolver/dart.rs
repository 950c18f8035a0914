//! Dart resolver: `pubspec.yaml`, `pubspec.lock`, pub.dev.
//!
//! Pubspec files are YAML, but the dependency sections use a small, regular
//! subset: top-level section keys, two-space indented package names, deeper
//! lines for git/path/sdk detail. A line-oriented scan covers that subset
//! without dragging in a YAML parser.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::{FileKind, ParseError};
use crate::http::USER_AGENT;
use crate::models::{PackageInfo, RepositoryRef};

use super::{ensure_exists, file_name, read_file, EcosystemResolver};

pub struct DartResolver {
    client: Client,
}

impl DartResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_pub_dev(&self, package: &str) -> Option<RepositoryRef> {
        let url = format!("https://pub.dev/api/packages/{}", package);
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
        repository_from_pub_dev(&data)
    }
}

#[async_trait]
impl EcosystemResolver for DartResolver {
    fn ecosystem_name(&self) -> &'static str {
        "dart"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["pubspec.yaml"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["pubspec.lock"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "pubspec.yaml" => Ok(parse_pubspec_yaml(&read_file(path)?)),
            other => Err(ParseError::unknown_format("dart", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "pubspec.lock" => Ok(parse_pubspec_lock(&read_file(path)?)),
            other => Err(ParseError::unknown_format("dart", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_pub_dev(package).await
    }
}

/// Parse `pubspec.yaml`: package names under `dependencies:` and
/// `dev_dependencies:` at one indent level. Deeper lines belong to git/path/
/// sdk tables and carry no package names.
fn parse_pubspec_yaml(content: &str) -> Vec<PackageInfo> {
    let mut packages = Vec::new();
    let mut seen = HashSet::new();
    let mut in_deps = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !line.starts_with(' ') {
            let section = line.trim_end();
            in_deps = section == "dependencies:" || section == "dev_dependencies:";
            continue;
        }
        if !in_deps {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        if indent > 2 {
            continue;
        }
        let Some((name, constraint)) = trimmed.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || !seen.insert(name.to_string()) {
            continue;
        }
        let constraint = constraint.trim().trim_matches(|c| c == '"' || c == '\'');
        let version = (!constraint.is_empty()).then_some(constraint);
        packages.push(PackageInfo::new(name, "dart", version));
    }

    packages
}

/// Parse `pubspec.lock`. Entries sit under `packages:` at two spaces of
/// indent, pinned version on the `version:` attribute line below each name.
fn parse_pubspec_lock(content: &str) -> Vec<PackageInfo> {
    let mut packages: Vec<PackageInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut in_packages = false;
    let mut current: Option<usize> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !line.starts_with(' ') {
            in_packages = line.trim_end() == "packages:";
            current = None;
            continue;
        }
        if !in_packages {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        if indent == 2 && trimmed.ends_with(':') {
            let name = trimmed.trim_end_matches(':').to_string();
            match index.get(&name) {
                Some(&i) => current = Some(i),
                None => {
                    index.insert(name.clone(), packages.len());
                    current = Some(packages.len());
                    packages.push(PackageInfo::new(name, "dart", None));
                }
            }
        } else if indent >= 4 {
            if let Some(i) = current {
                if let Some(version) = trimmed.strip_prefix("version:") {
                    packages[i].version = Some(version.trim().trim_matches('"').to_string());
                }
            }
        }
    }

    packages
}

/// Pull a repository out of a pub.dev payload: the latest version's pubspec
/// `repository` field, then its `homepage`.
fn repository_from_pub_dev(data: &Value) -> Option<RepositoryRef> {
    let pubspec = data.get("latest")?.get("pubspec")?;
    for key in ["repository", "homepage"] {
        if let Some(repo) = pubspec
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(RepositoryRef::from_url)
        {
            return Some(repo);
        }
    }
    None
}
