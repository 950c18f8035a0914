//! Java/JVM resolver: Maven, Gradle and sbt build files, Maven Central.
//!
//! Packages are named `groupId:artifactId` throughout, matching Maven
//! coordinates.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::error::{FileKind, ParseError};
use crate::http::USER_AGENT;
use crate::models::{PackageInfo, RepositoryRef};

use super::{ensure_exists, file_name, read_file, EcosystemResolver};

pub struct JavaResolver {
    client: Client,
}

impl JavaResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Two-step Central lookup: the search API for the latest version, then
    /// that version's POM for its `<scm>` block.
    async fn fetch_maven_central(&self, package: &str) -> Option<RepositoryRef> {
        let (group, artifact) = package.split_once(':')?;

        let search_url = format!(
            "https://search.maven.org/solrsearch/select?q=g:%22{}%22+AND+a:%22{}%22&rows=1&wt=json",
            group, artifact
        );
        let response = self
            .client
            .get(&search_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let data: Value = response.json().await.ok()?;
        let version = data
            .get("response")?
            .get("docs")?
            .get(0)?
            .get("latestVersion")?
            .as_str()?
            .to_string();

        let pom_url = format!(
            "https://repo1.maven.org/maven2/{}/{}/{}/{}-{}.pom",
            group.replace('.', "/"),
            artifact,
            version,
            artifact,
            version
        );
        let response = self
            .client
            .get(&pom_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }

        let pom = response.text().await.ok()?;
        scm_url_from_pom(&pom).as_deref().and_then(RepositoryRef::from_url)
    }
}

#[async_trait]
impl EcosystemResolver for JavaResolver {
    fn ecosystem_name(&self) -> &'static str {
        "java"
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["pom.xml", "build.gradle", "build.gradle.kts", "build.sbt"]
    }

    fn lockfile_names(&self) -> &'static [&'static str] {
        &["gradle.lockfile"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Manifest)?;
        match file_name(path) {
            "pom.xml" => Ok(parse_pom_xml(&read_file(path)?)),
            "build.gradle" | "build.gradle.kts" => Ok(parse_gradle(&read_file(path)?)),
            "build.sbt" => Ok(parse_sbt(&read_file(path)?)),
            other => Err(ParseError::unknown_format("java", FileKind::Manifest, other)),
        }
    }

    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
        ensure_exists(path, FileKind::Lockfile)?;
        match file_name(path) {
            "gradle.lockfile" => Ok(parse_gradle_lockfile(&read_file(path)?)),
            other => Err(ParseError::unknown_format("java", FileKind::Lockfile, other)),
        }
    }

    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef> {
        self.fetch_maven_central(package).await
    }
}

/// Parse `pom.xml` with a streaming event walk over `<dependency>` entries.
/// Property placeholders in `<version>` are kept verbatim.
fn parse_pom_xml(content: &str) -> Vec<PackageInfo> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    let mut in_dependency = false;
    let mut current_tag = String::new();
    let mut group_id = String::new();
    let mut artifact_id = String::new();
    let mut version = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if tag == "dependency" {
                    in_dependency = true;
                    group_id.clear();
                    artifact_id.clear();
                    version.clear();
                }
                current_tag = tag;
            }
            Ok(Event::Text(ref e)) if in_dependency => {
                if let Ok(text) = e.unescape() {
                    match current_tag.as_str() {
                        "groupId" => group_id = text.to_string(),
                        "artifactId" => artifact_id = text.to_string(),
                        "version" => version = text.to_string(),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().local_name().as_ref() == b"dependency" && in_dependency {
                    in_dependency = false;
                    if !group_id.is_empty() && !artifact_id.is_empty() {
                        let name = format!("{}:{}", group_id, artifact_id);
                        if seen.insert(name.clone()) {
                            let pinned = (!version.is_empty()).then_some(version.as_str());
                            packages.push(PackageInfo::new(name, "java", pinned));
                        }
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    packages
}

/// Parse `build.gradle` / `build.gradle.kts` with regex, covering both the
/// `"group:artifact:version"` shorthand and the map-style
/// `group: 'g', name: 'a', version: 'v'` form of the common configuration
/// methods.
fn parse_gradle(content: &str) -> Vec<PackageInfo> {
    let (Ok(string_re), Ok(map_re)) = (
        Regex::new(
            r#"(?:implementation|api|compileOnly|runtimeOnly|testImplementation|testRuntimeOnly|annotationProcessor)\s*\(?\s*['"]([^'":]+):([^'":]+):?([^'"]*)['"]"#,
        ),
        Regex::new(
            r#"group:\s*['"]([^'"]+)['"]\s*,\s*name:\s*['"]([^'"]+)['"](?:\s*,\s*version:\s*['"]([^'"]+)['"])?"#,
        ),
    ) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for caps in string_re.captures_iter(content) {
        let name = format!("{}:{}", &caps[1], &caps[2]);
        if !seen.insert(name.clone()) {
            continue;
        }
        let version = (!caps[3].is_empty()).then(|| caps[3].to_string());
        packages.push(PackageInfo::new(name, "java", version.as_deref()));
    }

    for caps in map_re.captures_iter(content) {
        let name = format!("{}:{}", &caps[1], &caps[2]);
        if !seen.insert(name.clone()) {
            continue;
        }
        let version = caps.get(3).map(|m| m.as_str());
        packages.push(PackageInfo::new(name, "java", version));
    }

    packages
}

/// Parse `build.sbt` `"group" %% "artifact" % "version"` expressions. The
/// doubled `%%` marks a Scala-suffixed artifact; both forms capture the same.
fn parse_sbt(content: &str) -> Vec<PackageInfo> {
    let Ok(re) = Regex::new(r#""([^"]+)"\s*%{1,2}\s*"([^"]+)"\s*%\s*"([^"]+)""#) else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for caps in re.captures_iter(content) {
        let name = format!("{}:{}", &caps[1], &caps[2]);
        if seen.insert(name.clone()) {
            packages.push(PackageInfo::new(name, "java", Some(&caps[3])));
        }
    }

    packages
}

/// Parse `gradle.lockfile` lines of `group:artifact:version=configurations`.
fn parse_gradle_lockfile(content: &str) -> Vec<PackageInfo> {
    let Ok(re) = Regex::new(r"^([^:=\s#]+):([^:=\s]+):([^=\s]+)=") else {
        return Vec::new();
    };

    let mut packages = Vec::new();
    let mut seen = HashSet::new();

    for line in content.lines() {
        let Some(caps) = re.captures(line.trim()) else { continue };
        let name = format!("{}:{}", &caps[1], &caps[2]);
        if seen.insert(name.clone()) {
            packages.push(PackageInfo::new(name, "java", Some(&caps[3])));
        }
    }

    packages
}

/// Pull the repository URL out of a POM's `<scm>` block: `<url>` preferred,
/// `<connection>`/`<developerConnection>` with the `scm:git:` prefix stripped
/// as fallback. The project-level `<url>` is a homepage and is ignored.
fn scm_url_from_pom(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut in_scm = false;
    let mut current_tag = String::new();
    let mut url: Option<String> = None;
    let mut connection: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if tag == "scm" {
                    in_scm = true;
                }
                current_tag = tag;
            }
            Ok(Event::Text(ref e)) if in_scm => {
                if let Ok(text) = e.unescape() {
                    match current_tag.as_str() {
                        "url" => url = Some(text.to_string()),
                        "connection" | "developerConnection" => {
                            if connection.is_none() {
                                connection = Some(text.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().local_name().as_ref() == b"scm" {
                    break;
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    url.or_else(|| connection.map(|c| c.trim_start_matches("scm:git:").to_string()))
}
