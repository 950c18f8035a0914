//! Python resolver: `requirements.txt`, `pyproject.toml`, lockfiles, PyPI.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{FileKind, ParseError};
use crate::http::USER_AGENT;
use crate::models::{PackageInfo, RepositoryRef};

use super::{ensure_exists, file_name, read_file, EcosystemResolver};

/// Keys of `info.project_urls` checked before falling back to the bare
/// homepage field. PyPI leaves the key naming to package authors.
const PROJECT_URL_KEYS: [&str; 5] = ["Repository", "Source", "Source Code", "Code", "Homepage"];

pub struct PythonResolver {
    client: Client,
}

impl PythonResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_pypi(&self, package: &str) -> Option<RepositoryRef> {
        let url = format!("https://pypi.org/pypi/{}/json", package);
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
        repository_from_pypi(&data)
    }
}

#[async_trait]
impl EcosystemResolver for PythonResolver {
    fn ecosystem_name(&self) -> &'static str {
        "python"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["requirements.txt", "pyproject.toml"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["poetry.lock", "Pipfile.lock", "uv.lock"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "requirements.txt" => Ok(parse_requirements(&read_file(path)?)),
            "pyproject.toml" => Ok(parse_pyproject(&read_file(path)?)),
            other => Err(ParseError::unknown_format("python", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "poetry.lock" | "uv.lock" => Ok(parse_toml_lock(&read_file(path)?)),
            "Pipfile.lock" => Ok(parse_pipfile_lock(&read_file(path)?)),
            other => Err(ParseError::unknown_format("python", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_pypi(package).await
    }
}

/// Parse `requirements.txt` lines of `name[extras] ==version ; markers`.
/// Option lines (`-r`, `--index-url`, editable installs) are skipped.
fn parse_requirements(content: &str) -> Vec<PackageInfo> {
    let Ok(re) = Regex::new(r"^([A-Za-z0-9_.\-]+)(?:\[[^\]]*\])?\s*(?:[=<>~!]+\s*([^;,\s]+))?")
    else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        let Some(caps) = re.captures(line) else { continue };

        let name = caps[1].to_string();
        if !seen.insert(name.to_lowercase()) {
            continue;
        }
        let version = caps.get(2).map(|m| m.as_str());
        packages.push(PackageInfo::new(name, "python", version));
    }

    packages
}

#[derive(Debug, Deserialize)]
struct Pyproject {
    project: Option<PyprojectProject>,
    tool: Option<PyprojectTool>,
}

#[derive(Debug, Deserialize)]
struct PyprojectProject {
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PyprojectTool {
    poetry: Option<PoetryTable>,
}

#[derive(Debug, Deserialize)]
struct PoetryTable {
    #[serde(default)]
    dependencies: toml::Table,
}

/// Parse `pyproject.toml`, covering PEP 621 `[project].dependencies` and the
/// Poetry table. The interpreter pin under Poetry (`python = "..."`) is not a
/// package and is dropped.
fn parse_pyproject(content: &str) -> Vec<PackageInfo> {
    let Ok(doc) = toml::from_str::<Pyproject>(content) else {
        return Vec::new();
    };
    let Ok(re) = Regex::new(r"^([A-Za-z0-9_.\-]+)(?:\[[^\]]*\])?\s*(?:[=<>~!]+\s*([^;,\s]+))?")
    else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    if let Some(project) = doc.project {
        for requirement in &project.dependencies {
            let Some(caps) = re.captures(requirement.trim()) else { continue };
            let name = caps[1].to_string();
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            let version = caps.get(2).map(|m| m.as_str());
            packages.push(PackageInfo::new(name, "python", version));
        }
    }

    if let Some(poetry) = doc.tool.and_then(|t| t.poetry) {
        for (name, value) in &poetry.dependencies {
            if name.eq_ignore_ascii_case("python") || !seen.insert(name.to_lowercase()) {
                continue;
            }
            let version = match value {
                toml::Value::String(req) => Some(req.as_str()),
                toml::Value::Table(table) => table.get("version").and_then(|v| v.as_str()),
                _ => None,
            };
            packages.push(PackageInfo::new(name.clone(), "python", version));
        }
    }

    packages
}

#[derive(Debug, Deserialize)]
struct TomlLock {
    #[serde(default)]
    package: Vec<TomlLockPackage>,
}

#[derive(Debug, Deserialize)]
struct TomlLockPackage {
    name: String,
    version: Option<String>,
}

/// Parse `poetry.lock` / `uv.lock`; both pin `[[package]]` entries with
/// `name` and `version` keys.
fn parse_toml_lock(content: &str) -> Vec<PackageInfo> {
    let Ok(lock) = toml::from_str::<TomlLock>(content) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for entry in lock.package {
        if !seen.insert(entry.name.to_lowercase()) {
            continue;
        }
        packages.push(PackageInfo::new(entry.name, "python", entry.version.as_deref()));
    }

    packages
}

/// Parse `Pipfile.lock`, JSON with `default` and `develop` sections mapping
/// names to `{"version": "==1.2.3"}` objects.
fn parse_pipfile_lock(content: &str) -> Vec<PackageInfo> {
    let Ok(json) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for section in ["default", "develop"] {
        let Some(entries) = json.get(section).and_then(|v| v.as_object()) else {
            continue;
        };
        for (name, info) in entries {
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            let version = info
                .get("version")
                .and_then(|v| v.as_str())
                .map(|v| v.trim_start_matches("=="));
            packages.push(PackageInfo::new(name.clone(), "python", version));
        }
    }

    packages
}

/// Pull a repository out of a PyPI JSON payload: named `project_urls` keys
/// first, then any project URL, then the legacy `home_page` field.
fn repository_from_pypi(data: &Value) -> Option<RepositoryRef> {
    let info = data.get("info")?;

    if let Some(urls) = info.get("project_urls").and_then(|v| v.as_object()) {
        for key in PROJECT_URL_KEYS {
            if let Some(repo) = urls
                .get(key)
                .and_then(|v| v.as_str())
                .and_then(RepositoryRef::from_url)
            {
                return Some(repo);
            }
        }
        if let Some(repo) = urls
            .values()
            .filter_map(|v| v.as_str())
            .find_map(RepositoryRef::from_url)
        {
            return Some(repo);
        }
    }

    info.get("home_page")
        .and_then(|v| v.as_str())
        .and_then(RepositoryRef::from_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_requirements() {
        let content = "\
# web stack
requests==2.28.0
flask>=2.0
uvicorn[standard]==0.20.0
-r extra.txt
pyyaml
";
        let packages = parse_requirements(content);
        assert_eq!(packages.len(), 4);
        assert_eq!(packages[0].name, "requests");
        assert_eq!(packages[0].version.as_deref(), Some("2.28.0"));
        assert_eq!(packages[1].version.as_deref(), Some("2.0"));
        assert_eq!(packages[2].name, "uvicorn");
        assert_eq!(packages[3].name, "pyyaml");
        assert!(packages[3].version.is_none());
    }

    #[test]
    fn test_parse_requirements_dedups_case_insensitively() {
        let packages = parse_requirements("Django==4.2\ndjango==4.1\n");
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "Django");
    }

    #[test]
    fn test_parse_pyproject_merges_pep621_and_poetry() {
        let content = r#"
[project]
name = "demo"
dependencies = ["httpx>=0.24", "rich"]

[tool.poetry.dependencies]
python = "^3.11"
requests = "^2.28"
structlog = { version = "23.1.0", extras = ["dev"] }
"#;
        let packages = parse_pyproject(content);
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["httpx", "rich", "requests", "structlog"]);
        assert_eq!(packages[2].version.as_deref(), Some("^2.28"));
        assert_eq!(packages[3].version.as_deref(), Some("23.1.0"));
    }

    #[test]
    fn test_parse_pipfile_lock_strips_pin_operator() {
        let content = r#"{
    "default": {
        "requests": {"version": "==2.28.2"}
    },
    "develop": {
        "pytest": {"version": "==7.2.0"}
    }
}"#;
        let packages = parse_pipfile_lock(content);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].version.as_deref(), Some("2.28.2"));
        assert_eq!(packages[1].name, "pytest");
    }

    #[test]
    fn test_parse_poetry_lock_entries() {
        let content = r#"
[[package]]
name = "certifi"
version = "2023.7.22"

[[package]]
name = "idna"
version = "3.4"
"#;
        let packages = parse_toml_lock(content);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "certifi");
        assert_eq!(packages[0].version.as_deref(), Some("2023.7.22"));
    }

    #[test]
    fn test_parse_manifest_unknown_name() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "requests==2.28.0").unwrap();

        let resolver = PythonResolver::new(Client::new());
        let err = resolver.parse_manifest(file.path()).unwrap_err();
        assert!(matches!(err, ParseError::UnknownFormat { .. }));
    }

    #[test]
    fn test_repository_from_project_urls() {
        let data: Value = serde_json::from_str(
            r#"{"info": {"project_urls": {"Documentation": "https://docs.rs",
                "Source": "https://github.com/psf/requests"}}}"#,
        )
        .unwrap();
        let repo = repository_from_pypi(&data).unwrap();
        assert_eq!(repo.owner, "psf");
        assert_eq!(repo.name, "requests");
    }

    #[test]
    fn test_repository_from_home_page_fallback() {
        let data: Value = serde_json::from_str(
            r#"{"info": {"project_urls": null, "home_page": "https://github.com/pallets/flask"}}"#,
        )
        .unwrap();
        let repo = repository_from_pypi(&data).unwrap();
        assert_eq!(repo.owner, "pallets");
    }

    #[test]
    fn test_homepage_only_payload_resolves_to_none() {
        let data: Value = serde_json::from_str(
            r#"{"info": {"project_urls": {"Homepage": "https://palletsprojects.com"},
                "home_page": "https://palletsprojects.com"}}"#,
        )
        .unwrap();
        assert!(repository_from_pypi(&data).is_none());
    }
}
