//! PHP resolver: `composer.json`, `composer.lock`, Packagist.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::{FileKind, ParseError};
use crate::http::USER_AGENT;
use crate::models::{PackageInfo, RepositoryRef};

use super::{ensure_exists, file_name, read_file, EcosystemResolver};

pub struct PhpResolver {
    client: Client,
}

impl PhpResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_packagist(&self, package: &str) -> Option<RepositoryRef> {
        let url = format!("https://packagist.org/packages/{}.json", package);
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
        repository_from_packagist(&data)
    }
}

#[async_trait]
impl EcosystemResolver for PhpResolver {
    fn ecosystem_name(&self) -> &'static str {
        "php"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["composer.json"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["composer.lock"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "composer.json" => Ok(parse_composer_json(&read_file(path)?)),
            other => Err(ParseError::unknown_format("php", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "composer.lock" => Ok(parse_composer_lock(&read_file(path)?)),
            other => Err(ParseError::unknown_format("php", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_packagist(package).await
    }
}

/// Platform requirements (`php`, `ext-*`, `lib-*`) live in `require` next to
/// real packages and are not Packagist entries.
fn is_platform_requirement(name: &str) -> bool {
    name == "php" || name.starts_with("ext-") || name.starts_with("lib-")
}

/// Parse `require` and `require-dev` from `composer.json`, maps of
/// `vendor/package` names to version constraints.
fn parse_composer_json(content: &str) -> Vec<PackageInfo> {
    let Ok(json) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for section in ["require", "require-dev"] {
        let Some(entries) = json.get(section).and_then(|v| v.as_object()) else {
            continue;
        };
        for (name, constraint) in entries {
            if is_platform_requirement(name) || !seen.insert(name.clone()) {
                continue;
            }
            packages.push(PackageInfo::new(name.clone(), "php", constraint.as_str()));
        }
    }

    packages
}

/// Parse `composer.lock`: `packages` and `packages-dev` arrays of pinned
/// entries.
fn parse_composer_lock(content: &str) -> Vec<PackageInfo> {
    let Ok(json) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for section in ["packages", "packages-dev"] {
        let Some(entries) = json.get(section).and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in entries {
            let Some(name) = entry.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            if !seen.insert(name.to_string()) {
                continue;
            }
            let version = entry.get("version").and_then(|v| v.as_str());
            packages.push(PackageInfo::new(name, "php", version));
        }
    }

    packages
}

/// Pull a repository out of a Packagist payload: `package.repository`.
fn repository_from_packagist(data: &Value) -> Option<RepositoryRef> {
    data.get("package")?
        .get("repository")
        .and_then(|v| v.as_str())
        .and_then(RepositoryRef::from_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_composer_json_skips_platform_requirements() {
        let content = r#"{
    "require": {
        "php": ">=8.1",
        "ext-json": "*",
        "symfony/console": "^6.2",
        "guzzlehttp/guzzle": "^7.5"
    },
    "require-dev": {
        "phpunit/phpunit": "^10.0"
    }
}"#;
        let packages = parse_composer_json(content);
        assert_eq!(packages.len(), 3);
        assert!(packages.iter().all(|p| !p.name.starts_with("ext-") && p.name != "php"));

        let console = packages.iter().find(|p| p.name == "symfony/console").unwrap();
        assert_eq!(console.version.as_deref(), Some("^6.2"));
    }

    #[test]
    fn test_parse_composer_lock_sections() {
        let content = r#"{
    "packages": [
        {"name": "symfony/console", "version": "v6.2.10"}
    ],
    "packages-dev": [
        {"name": "phpunit/phpunit", "version": "10.1.2"}
    ]
}"#;
        let packages = parse_composer_lock(content);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].version.as_deref(), Some("v6.2.10"));
        assert_eq!(packages[1].name, "phpunit/phpunit");
    }

    #[test]
    fn test_repository_from_packagist() {
        let data: Value = serde_json::from_str(
            r#"{"package": {"repository": "https://github.com/symfony/console"}}"#,
        )
        .unwrap();
        let repo = repository_from_packagist(&data).unwrap();
        assert_eq!(repo.owner, "symfony");
        assert_eq!(repo.name, "console");
    }

    #[test]
    fn test_repository_from_packagist_non_github() {
        let data: Value = serde_json::from_str(
            r#"{"package": {"repository": "https://gitlab.example.org/a/b"}}"#,
        )
        .unwrap();
        assert!(repository_from_packagist(&data).is_none());
    }
}
