//! Rust resolver: `Cargo.toml`, `Cargo.lock`, crates.io.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{FileKind, ParseError};
use crate::http::USER_AGENT;
use crate::models::{PackageInfo, RepositoryRef};

use super::{ensure_exists, file_name, read_file, EcosystemResolver};

pub struct RustResolver {
    client: Client,
}

impl RustResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_crates_io(&self, package: &str) -> Option<RepositoryRef> {
        let url = format!("https://crates.io/api/v1/crates/{}", package);
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
        repository_from_crates_io(&data)
    }
}

#[async_trait]
impl EcosystemResolver for RustResolver {
    fn ecosystem_name(&self) -> &'static str {
        "rust"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["Cargo.toml"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["Cargo.lock"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "Cargo.toml" => Ok(parse_cargo_toml(&read_file(path)?)),
            other => Err(ParseError::unknown_format("rust", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "Cargo.lock" => Ok(parse_cargo_lock(&read_file(path)?)),
            other => Err(ParseError::unknown_format("rust", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_crates_io(package).await
    }
}

#[derive(Debug, Deserialize)]
struct CargoManifest {
    #[serde(default)]
    dependencies: toml::Table,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: toml::Table,
    #[serde(default, rename = "build-dependencies")]
    build_dependencies: toml::Table,
}

/// Parse `Cargo.toml` dependency tables in their three flavors. Values are
/// either a bare requirement string or a detail table with a `version` key;
/// pure path/git dependencies carry no version.
fn parse_cargo_toml(content: &str) -> Vec<PackageInfo> {
    let Ok(manifest) = toml::from_str::<CargoManifest>(content) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    let tables = [
        manifest.dependencies,
        manifest.dev_dependencies,
        manifest.build_dependencies,
    ];
    for table in &tables {
        for (name, value) in table {
            if !seen.insert(name.clone()) {
                continue;
            }
            let version = match value {
                toml::Value::String(req) => Some(req.as_str()),
                toml::Value::Table(detail) => detail.get("version").and_then(|v| v.as_str()),
                _ => None,
            };
            packages.push(PackageInfo::new(name.clone(), "rust", version));
        }
    }

    packages
}

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<CargoLockPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoLockPackage {
    name: String,
    version: String,
    source: Option<String>,
}

/// Parse registry `[[package]]` entries from `Cargo.lock`. Entries without
/// a `source` are workspace members, not dependencies. A crate locked at two
/// majors keeps its first version.
fn parse_cargo_lock(content: &str) -> Vec<PackageInfo> {
    let Ok(lock) = toml::from_str::<CargoLock>(content) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for entry in lock.package {
        if entry.source.is_none() || !seen.insert(entry.name.clone()) {
            continue;
        }
        packages.push(PackageInfo::new(entry.name, "rust", Some(&entry.version)));
    }

    packages
}

/// Pull a repository out of a crates.io payload: `crate.repository`, then
/// `crate.homepage`.
fn repository_from_crates_io(data: &Value) -> Option<RepositoryRef> {
    let krate = data.get("crate")?;
    for key in ["repository", "homepage"] {
        if let Some(repo) = krate
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(RepositoryRef::from_url)
        {
            return Some(repo);
        }
    }
    None
}
