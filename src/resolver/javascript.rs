//! JavaScript resolver: `package.json`, npm/yarn/bun lockfiles, npm registry.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::error::{FileKind, ParseError};
use crate::http::USER_AGENT;
use crate::models::{PackageInfo, RepositoryRef};

use super::{ensure_exists, file_name, read_file, EcosystemResolver};

pub struct JavaScriptResolver {
    client: Client,
}

impl JavaScriptResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_npm(&self, package: &str) -> Option<RepositoryRef> {
        // Scoped names must be percent-encoded in the registry path
        let encoded = package.replace('@', "%40").replace('/', "%2F");
        let url = format!("https://registry.npmjs.org/{}", encoded);
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
        repository_from_npm(&data)
    }
}

#[async_trait]
impl EcosystemResolver for JavaScriptResolver {
    fn ecosystem_name(&self) -> &'static str {
        "javascript"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["package.json"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["package-lock.json", "yarn.lock", "bun.lock"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "package.json" => Ok(parse_package_json(&read_file(path)?)),
            other => Err(ParseError::unknown_format("javascript", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "package-lock.json" => Ok(parse_package_lock(&read_file(path)?)),
            "yarn.lock" => Ok(parse_yarn_lock(&read_file(path)?)),
            "bun.lock" => Ok(parse_bun_lock(&read_file(path)?)),
            other => Err(ParseError::unknown_format("javascript", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_npm(package).await
    }
}

/// Parse the `dependencies` and `devDependencies` maps of `package.json`.
/// Range prefixes are trimmed down to the numeric part; pure tags (`*`,
/// `latest`) leave the version empty.
fn parse_package_json(content: &str) -> Vec<PackageInfo> {
    let Ok(json) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for section in ["dependencies", "devDependencies"] {
        let Some(entries) = json.get(section).and_then(|v| v.as_object()) else {
            continue;
        };
        for (name, range) in entries {
            if !seen.insert(name.clone()) {
                continue;
            }
            let version = range
                .as_str()
                .map(|r| r.trim_start_matches(|c: char| !c.is_ascii_digit()))
                .filter(|v| !v.is_empty());
            packages.push(PackageInfo::new(name.clone(), "javascript", version));
        }
    }

    packages
}

/// Parse `package-lock.json` v2/v3 `packages` paths, with a fallback to the
/// nested v1 `dependencies` tree.
fn parse_package_lock(content: &str) -> Vec<PackageInfo> {
    let Ok(json) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    if let Some(entries) = json.get("packages").and_then(|v| v.as_object()) {
        // Keys are install paths; "" is the project itself
        for (path, info) in entries {
            if path.is_empty() {
                continue;
            }
            let name = match path.rsplit_once("node_modules/") {
                Some((_, name)) => name,
                None => path.as_str(),
            };
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            let version = info.get("version").and_then(|v| v.as_str());
            packages.push(PackageInfo::new(name, "javascript", version));
        }
    } else if let Some(deps) = json.get("dependencies") {
        collect_v1_dependencies(deps, &mut packages, &mut seen);
    }

    packages
}

fn collect_v1_dependencies(
    deps: &Value,
    packages: &mut Vec<PackageInfo>,
    seen: &mut HashSet<String>,
) {
    let Some(entries) = deps.as_object() else { return };
    for (name, info) in entries {
        if seen.insert(name.clone()) {
            let version = info.get("version").and_then(|v| v.as_str());
            packages.push(PackageInfo::new(name.clone(), "javascript", version));
        }
        if let Some(nested) = info.get("dependencies") {
            collect_v1_dependencies(nested, packages, seen);
        }
    }
}

/// Parse `yarn.lock` in both classic and berry formats. Entry headers sit
/// at column zero (`name@range, name@range:`), the pinned version on an
/// indented `version` line below.
fn parse_yarn_lock(content: &str) -> Vec<PackageInfo> {
    let (Ok(header_re), Ok(version_re)) = (
        Regex::new(r#"^"?((?:@[^/@"]+/)?[^@"]+)@"#),
        Regex::new(r#"^\s+version:?\s+"?([^"\s]+)"?"#),
    ) else {
        return Vec::new();
    };

    let mut packages: Vec<PackageInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut current: Option<usize> = None;

    for line in content.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !line.starts_with(' ') {
            current = None;
            if let Some(caps) = header_re.captures(line) {
                let name = caps[1].to_string();
                match index.get(&name) {
                    Some(&i) => current = Some(i),
                    None => {
                        index.insert(name.clone(), packages.len());
                        current = Some(packages.len());
                        packages.push(PackageInfo::new(name, "javascript", None));
                    }
                }
            }
        } else if let (Some(i), Some(caps)) = (current, version_re.captures(line)) {
            packages[i].version = Some(caps[1].to_string());
        }
    }

    packages
}

/// Parse `bun.lock`, JSONC where the only extension bun emits is trailing
/// commas. Entries under `packages` are `["name@version", ...]` tuples.
fn parse_bun_lock(content: &str) -> Vec<PackageInfo> {
    let Ok(comma_re) = Regex::new(r",\s*([}\]])") else {
        return Vec::new();
    };
    let cleaned = comma_re.replace_all(content, "$1");
    let Ok(json) = serde_json::from_str::<Value>(&cleaned) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    let Some(entries) = json.get("packages").and_then(|v| v.as_object()) else {
        return packages;
    };
    for (name, info) in entries {
        if !seen.insert(name.clone()) {
            continue;
        }
        let version = info
            .get(0)
            .and_then(|v| v.as_str())
            .and_then(|spec| spec.rsplit_once('@'))
            .map(|(_, version)| version)
            .or_else(|| info.get("version").and_then(|v| v.as_str()));
        packages.push(PackageInfo::new(name.clone(), "javascript", version));
    }

    packages
}

/// Pull a repository out of an npm registry payload: the `repository` field
/// (object or string form), then `homepage`.
fn repository_from_npm(data: &Value) -> Option<RepositoryRef> {
    if let Some(repository) = data.get("repository") {
        if let Some(repo) = repository
            .get("url")
            .and_then(|v| v.as_str())
            .and_then(RepositoryRef::from_url)
        {
            return Some(repo);
        }
        if let Some(repo) = repository.as_str().and_then(RepositoryRef::from_url) {
            return Some(repo);
        }
    }

    data.get("homepage")
        .and_then(|v| v.as_str())
        .and_then(RepositoryRef::from_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_json_sections_and_ranges() {
        let content = r#"{
    "name": "demo",
    "dependencies": {
        "express": "^4.18.2",
        "lodash": "*"
    },
    "devDependencies": {
        "jest": "~29.5.0",
        "express": "^4.0.0"
    }
}"#;
        let packages = parse_package_json(content);
        assert_eq!(packages.len(), 3);

        let express = packages.iter().find(|p| p.name == "express").unwrap();
        assert_eq!(express.version.as_deref(), Some("4.18.2"));
        let lodash = packages.iter().find(|p| p.name == "lodash").unwrap();
        assert!(lodash.version.is_none());
        let jest = packages.iter().find(|p| p.name == "jest").unwrap();
        assert_eq!(jest.version.as_deref(), Some("29.5.0"));
    }

    #[test]
    fn test_parse_package_lock_v3_paths() {
        let content = r#"{
    "lockfileVersion": 3,
    "packages": {
        "": {"name": "demo"},
        "node_modules/express": {"version": "4.18.2"},
        "node_modules/@babel/core": {"version": "7.22.0"},
        "node_modules/express/node_modules/debug": {"version": "2.6.9"}
    }
}"#;
        let packages = parse_package_lock(content);
        let names: HashSet<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains("express"));
        assert!(names.contains("@babel/core"));
        assert!(names.contains("debug"));
    }

    #[test]
    fn test_parse_package_lock_v1_nested() {
        let content = r#"{
    "lockfileVersion": 1,
    "dependencies": {
        "express": {
            "version": "4.18.2",
            "dependencies": {
                "debug": {"version": "2.6.9"}
            }
        }
    }
}"#;
        let packages = parse_package_lock(content);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[1].name, "debug");
        assert_eq!(packages[1].version.as_deref(), Some("2.6.9"));
    }

    #[test]
    fn test_parse_yarn_lock_classic_and_scoped() {
        let content = r#"# yarn lockfile v1

lodash@^4.17.20, lodash@^4.17.21:
  version "4.17.21"
  resolved "https://registry.yarnpkg.com/lodash"

"@babel/core@^7.0.0":
  version "7.22.0"
"#;
        let packages = parse_yarn_lock(content);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "lodash");
        assert_eq!(packages[0].version.as_deref(), Some("4.17.21"));
        assert_eq!(packages[1].name, "@babel/core");
        assert_eq!(packages[1].version.as_deref(), Some("7.22.0"));
    }

    #[test]
    fn test_parse_bun_lock_tolerates_trailing_commas() {
        let content = r#"{
    "lockfileVersion": 1,
    "packages": {
        "lodash": ["lodash@4.17.21", "", {}, "sha512-aaaa"],
        "@scope/pkg": ["@scope/pkg@1.2.3", "", {}, "sha512-bbbb"],
    },
}"#;
        let packages = parse_bun_lock(content);
        assert_eq!(packages.len(), 2);
        let lodash = packages.iter().find(|p| p.name == "lodash").unwrap();
        assert_eq!(lodash.version.as_deref(), Some("4.17.21"));
        let scoped = packages.iter().find(|p| p.name == "@scope/pkg").unwrap();
        assert_eq!(scoped.version.as_deref(), Some("1.2.3"));
    }

    #[test]
    fn test_repository_from_npm_object_form() {
        let data: Value = serde_json::from_str(
            r#"{"repository": {"type": "git", "url": "git+https://github.com/expressjs/express.git"}}"#,
        )
        .unwrap();
        let repo = repository_from_npm(&data).unwrap();
        assert_eq!(repo.owner, "expressjs");
        assert_eq!(repo.name, "express");
    }

    #[test]
    fn test_repository_from_npm_homepage_fallback() {
        let data: Value =
            serde_json::from_str(r#"{"homepage": "https://github.com/jestjs/jest#readme"}"#)
                .unwrap();
        let repo = repository_from_npm(&data).unwrap();
        assert_eq!(repo.owner, "jestjs");
        assert_eq!(repo.name, "jest");
    }

    #[test]
    fn test_repository_from_npm_non_repository_homepage() {
        let data: Value = serde_json::from_str(r#"{"homepage": "https://expressjs.com"}"#).unwrap();
        assert!(repository_from_npm(&data).is_none());
    }
}
