//! Elixir resolver: `mix.exs`, `mix.lock`, hex.pm.

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

/// `meta.links` keys tried before falling back to any repository-shaped link.
const HEX_LINK_KEYS: [&str; 5] = ["GitHub", "Github", "github", "Source", "Repository"];

pub struct ElixirResolver {
    client: Client,
}

impl ElixirResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_hex(&self, package: &str) -> Option<RepositoryRef> {
        let url = format!("https://hex.pm/api/packages/{}", package);
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
        repository_from_hex(&data)
    }
}

#[async_trait]
impl EcosystemResolver for ElixirResolver {
    fn ecosystem_name(&self) -> &'static str {
        "elixir"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["mix.exs"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["mix.lock"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "mix.exs" => Ok(parse_mix_exs(&read_file(path)?)),
            other => Err(ParseError::unknown_format("elixir", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "mix.lock" => Ok(parse_mix_lock(&read_file(path)?)),
            other => Err(ParseError::unknown_format("elixir", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_hex(package).await
    }
}

/// Parse `mix.exs`: `{:name, "requirement", ...}` tuples inside the `deps`
/// function body. Atoms elsewhere in the module (app names, env keys) never
/// enter the scan.
fn parse_mix_exs(content: &str) -> Vec<PackageInfo> {
    let Ok(re) = Regex::new(r#"\{:([a-zA-Z][A-Za-z0-9_]*)(?:\s*,\s*"([^"]+)")?"#) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();
    let mut in_deps = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if !in_deps {
            if trimmed == "defp deps do" || trimmed == "def deps do" {
                in_deps = true;
            }
            continue;
        }
        if trimmed == "end" {
            break;
        }
        for caps in re.captures_iter(trimmed) {
            let name = caps[1].to_string();
            if seen.insert(name.clone()) {
                let version = caps.get(2).map(|m| m.as_str());
                packages.push(PackageInfo::new(name, "elixir", version));
            }
        }
    }

    packages
}

/// Parse `mix.lock` entries, `"name": {:hex, :name, "version", ...}`. Git
/// and path entries keep their name but have no registry version.
fn parse_mix_lock(content: &str) -> Vec<PackageInfo> {
    let (Ok(entry_re), Ok(hex_re)) = (
        Regex::new(r#""([A-Za-z0-9_]+)":\s*\{:"#),
        Regex::new(r#""([A-Za-z0-9_]+)":\s*\{:hex,\s*:[A-Za-z0-9_]+,\s*"([^"]+)""#),
    ) else {
        return Vec::new();
    };

    let mut versions: HashMap<String, String> = HashMap::new();
    for caps in hex_re.captures_iter(content) {
        versions.insert(caps[1].to_string(), caps[2].to_string());
    }

    let mut packages = Vec::new();
    let mut seen = HashSet::new();
    for caps in entry_re.captures_iter(content) {
        let name = caps[1].to_string();
        if seen.insert(name.clone()) {
            let version = versions.get(&name).map(String::as_str);
            packages.push(PackageInfo::new(name, "elixir", version));
        }
    }

    packages
}

/// Pull a repository out of a hex.pm payload: named `meta.links` keys first,
/// then any link value that parses as a repository. Link values that are not
/// strings are skipped.
fn repository_from_hex(data: &Value) -> Option<RepositoryRef> {
    let links = data.get("meta")?.get("links")?.as_object()?;

    for key in HEX_LINK_KEYS {
        if let Some(repo) = links
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(RepositoryRef::from_url)
        {
            return Some(repo);
        }
    }

    links
        .values()
        .filter_map(|v| v.as_str())
        .find_map(RepositoryRef::from_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mix_exs_deps_block_only() {
        let content = r#"defmodule Example.MixProject do
  use Mix.Project

  def project do
    [
      app: :example,
      deps: deps()
    ]
  end

  defp deps do
    [
      {:phoenix, "~> 1.7"},
      {:ecto_sql, "~> 3.10"},
      {:local_dep, path: "../local"}
    ]
  end
end
"#;
        let packages = parse_mix_exs(content);
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["phoenix", "ecto_sql", "local_dep"]);
        assert_eq!(packages[0].version.as_deref(), Some("~> 1.7"));
        assert!(packages[2].version.is_none());
    }

    #[test]
    fn test_parse_mix_exs_without_deps_function() {
        let content = "defmodule Bare.MixProject do\n  use Mix.Project\nend\n";
        assert!(parse_mix_exs(content).is_empty());
    }

    #[test]
    fn test_parse_mix_lock_hex_and_git_entries() {
        let content = r#"%{
  "phoenix": {:hex, :phoenix, "1.7.0", "abc", [:mix], [], "hexpm"},
  "ecto": {:hex, :ecto, "3.10.1", "def", [:mix], [], "hexpm"},
  "internal": {:git, "https://github.com/team/internal.git", "abcdef", []},
}
"#;
        let packages = parse_mix_lock(content);
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0].name, "phoenix");
        assert_eq!(packages[0].version.as_deref(), Some("1.7.0"));
        let internal = packages.iter().find(|p| p.name == "internal").unwrap();
        assert!(internal.version.is_none());
    }

    #[test]
    fn test_repository_from_hex_github_link() {
        let data: Value = serde_json::from_str(
            r#"{"meta": {"links": {"GitHub": "https://github.com/phoenixframework/phoenix",
                "Docs": "https://hexdocs.pm/phoenix"}}}"#,
        )
        .unwrap();
        let repo = repository_from_hex(&data).unwrap();
        assert_eq!(repo.owner, "phoenixframework");
        assert_eq!(repo.name, "phoenix");
    }

    #[test]
    fn test_repository_from_hex_ignores_non_string_links() {
        let data: Value =
            serde_json::from_str(r#"{"meta": {"links": {"Docs": 123}}}"#).unwrap();
        assert!(repository_from_hex(&data).is_none());
    }
}
