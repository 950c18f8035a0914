//! C#/.NET resolver: project files, `packages.config`, NuGet.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use serde_json::Value;

use crate::error::{FileKind, ParseError};
use crate::http::USER_AGENT;
use crate::models::{PackageInfo, RepositoryRef};

use super::{ensure_exists, file_name, read_file, EcosystemResolver};

pub struct CSharpResolver {
    client: Client,
}

impl CSharpResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_nuget(&self, package: &str) -> Option<RepositoryRef> {
        let url = format!(
            "https://azuresearch-usnc.nuget.org/query?q=packageid:{}&take=1",
            package
        );
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
        repository_from_nuget(&data)
    }
}

#[async_trait]
impl EcosystemResolver for CSharpResolver {
    fn ecosystem_name(&self) -> &'static str {
        "csharp"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["packages.config"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["packages.lock.json"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        let name = file_name(path);
        // Project files are named after the project, so match on extension
        if name == "packages.config" {
            Ok(parse_packages_config(&read_file(path)?))
        } else if name.ends_with(".csproj") || name.ends_with(".fsproj") {
            Ok(parse_project_file(&read_file(path)?))
        } else {
            Err(ParseError::unknown_format("csharp", FileKind::Manifest, name))
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "packages.lock.json" => Ok(parse_packages_lock(&read_file(path)?)),
            other => Err(ParseError::unknown_format("csharp", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_nuget(package).await
    }
}

/// Parse `<PackageReference>` elements from a `.csproj`/`.fsproj` project
/// file, reading the `Include` and `Version` attributes.
fn parse_project_file(content: &str) -> Vec<PackageInfo> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.name().local_name().as_ref() == b"PackageReference" {
                    let mut name = None;
                    let mut version = None;
                    for attr in e.attributes().flatten() {
                        let val = attr.unescape_value().unwrap_or_default().into_owned();
                        match attr.key.local_name().as_ref() {
                            b"Include" => name = Some(val),
                            b"Version" => version = Some(val),
                            _ => {}
                        }
                    }
                    if let Some(name) = name {
                        if seen.insert(name.to_lowercase()) {
                            packages.push(PackageInfo::new(name, "csharp", version.as_deref()));
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    packages
}

/// Parse `<package id="..." version="..."/>` entries from `packages.config`.
fn parse_packages_config(content: &str) -> Vec<PackageInfo> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.name().local_name().as_ref() == b"package" {
                    let mut name = None;
                    let mut version = None;
                    for attr in e.attributes().flatten() {
                        let val = attr.unescape_value().unwrap_or_default().into_owned();
                        match attr.key.local_name().as_ref() {
                            b"id" => name = Some(val),
                            b"version" => version = Some(val),
                            _ => {}
                        }
                    }
                    if let Some(name) = name {
                        if seen.insert(name.to_lowercase()) {
                            packages.push(PackageInfo::new(name, "csharp", version.as_deref()));
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    packages
}

/// Parse `packages.lock.json`: per-framework dependency maps. `Project`
/// entries are workspace references, not registry packages.
fn parse_packages_lock(content: &str) -> Vec<PackageInfo> {
    let Ok(json) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    let Some(frameworks) = json.get("dependencies").and_then(|v| v.as_object()) else {
        return packages;
    };
    for entries in frameworks.values().filter_map(|v| v.as_object()) {
        for (name, info) in entries {
            if info.get("type").and_then(|t| t.as_str()) == Some("Project") {
                continue;
            }
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            let version = info.get("resolved").and_then(|v| v.as_str());
            packages.push(PackageInfo::new(name.clone(), "csharp", version));
        }
    }

    packages
}

/// Pull a repository out of a NuGet search payload: `data[0].projectUrl`.
fn repository_from_nuget(data: &Value) -> Option<RepositoryRef> {
    data.get("data")?
        .get(0)?
        .get("projectUrl")
        .and_then(|v| v.as_str())
        .and_then(RepositoryRef::from_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_parse_project_file_package_references() {
        let content = r#"<Project Sdk="Microsoft.NET.Sdk">
  <ItemGroup>
    <PackageReference Include="Newtonsoft.Json" Version="13.0.3" />
    <PackageReference Include="Serilog" Version="2.12.0" />
  </ItemGroup>
</Project>"#;
        let packages = parse_project_file(content);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "Newtonsoft.Json");
        assert_eq!(packages[0].version.as_deref(), Some("13.0.3"));
    }

    #[test]
    fn test_parse_manifest_accepts_csproj_extension() {
        let mut file = Builder::new().suffix(".csproj").tempfile().unwrap();
        write!(
            file,
            r#"<Project><ItemGroup><PackageReference Include="Dapper" Version="2.0.123"/></ItemGroup></Project>"#
        )
        .unwrap();

        let resolver = CSharpResolver::new(Client::new());
        let packages = resolver.parse_manifest(file.path()).unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "Dapper");
    }

    #[test]
    fn test_parse_packages_config_entries() {
        let content = r#"<?xml version="1.0" encoding="utf-8"?>
<packages>
  <package id="NUnit" version="3.13.3" targetFramework="net48" />
</packages>"#;
        let packages = parse_packages_config(content);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "NUnit");
        assert_eq!(packages[0].version.as_deref(), Some("3.13.3"));
    }

    #[test]
    fn test_parse_packages_lock_skips_project_references() {
        let content = r#"{
    "version": 1,
    "dependencies": {
        "net7.0": {
            "Newtonsoft.Json": {"type": "Direct", "resolved": "13.0.3"},
            "My.Lib": {"type": "Project"}
        }
    }
}"#;
        let packages = parse_packages_lock(content);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "Newtonsoft.Json");
        assert_eq!(packages[0].version.as_deref(), Some("13.0.3"));
    }

    #[test]
    fn test_repository_from_nuget_project_url() {
        let data: Value = serde_json::from_str(
            r#"{"data": [{"projectUrl": "https://github.com/JamesNK/Newtonsoft.Json"}]}"#,
        )
        .unwrap();
        let repo = repository_from_nuget(&data).unwrap();
        assert_eq!(repo.owner, "JamesNK");
        assert_eq!(repo.name, "Newtonsoft.Json");
    }

    #[test]
    fn test_repository_from_nuget_empty_results() {
        let data: Value = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(repository_from_nuget(&data).is_none());
    }
}
