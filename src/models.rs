use serde::{Deserialize, Serialize};

/// A single dependency extracted from a manifest or lockfile.
///
/// `name` is the ecosystem-native identifier: a module path for Go, a
/// registry name for npm/PyPI/crates.io, a `group:artifact` pair for Maven,
/// a distribution name for CPAN. Parsers deduplicate within one result;
/// lockfile versions are authoritative where both sources exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub ecosystem: String,
    pub version: Option<String>,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, ecosystem: &str, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            ecosystem: ecosystem.to_string(),
            version: version.map(str::to_string),
        }
    }
}

/// An `owner/name` pair identifying a hosted GitHub repository.
///
/// Produced only by repository resolution; a package that cannot be mapped
/// is represented as `None`, never as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Extract `owner/name` from a repository URL as registries report them.
    ///
    /// Accepts `https://github.com/o/r`, `git+https://…`, `git://…`,
    /// `ssh://git@…`, and the scp-like `git@github.com:o/r.git`. Trailing
    /// `.git`, deeper path segments, `#fragment`, and `?query` are dropped.
    /// Anything not hosted on github.com is an unsupported shape and yields
    /// `None`.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim();

        let rest = if let Some(rest) = url.strip_prefix("git@github.com:") {
            rest
        } else {
            let s = url.strip_prefix("git+").unwrap_or(url);
            let s = s
                .strip_prefix("https://")
                .or_else(|| s.strip_prefix("http://"))
                .or_else(|| s.strip_prefix("ssh://"))
                .or_else(|| s.strip_prefix("git://"))?;
            let s = s.strip_prefix("git@").unwrap_or(s);
            let s = s.strip_prefix("www.").unwrap_or(s);
            s.strip_prefix("github.com/")?
        };

        let mut segments = rest.split('/');
        let owner = segments.next()?;
        let name = segments.next()?;
        // Fragment/query may ride on the repo segment; .git comes last
        let name = name
            .split(['#', '?'])
            .next()
            .unwrap_or(name)
            .trim_end_matches(".git");

        if owner.is_empty() || name.is_empty() {
            return None;
        }

        Some(Self::new(owner, name))
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One row handed to the report layer: a parsed package and the repository
/// it resolved to, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPackage {
    pub package: PackageInfo,
    pub repository: Option<RepositoryRef>,
}
