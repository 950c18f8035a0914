//! Per-ecosystem dependency resolvers.
//!
//! Each submodule implements [`EcosystemResolver`] for one package ecosystem:
//! - **Go**: `go.mod` / `go.sum`, pkg.go.dev
//! - **Python**: `requirements.txt` / `pyproject.toml`, PyPI
//! - **JavaScript**: `package.json`, npm registry
//! - **Ruby**: `Gemfile`, RubyGems
//! - **Rust**: `Cargo.toml`, crates.io
//! - **PHP**: `composer.json`, Packagist
//! - **Java**: `pom.xml` / Gradle / sbt, Maven Central
//! - **C#**: `packages.config` / project files, NuGet
//! - **Dart**: `pubspec.yaml`, pub.dev
//! - **Elixir**: `mix.exs`, hex.pm
//! - **Perl**: `cpanfile`, MetaCPAN
//!
//! The [`registry`] module maps ecosystem names and their aliases onto shared
//! resolver instances.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{FileKind, ParseError};
use crate::models::{PackageInfo, RepositoryRef};

pub mod csharp;
pub mod dart;
pub mod elixir;
pub mod go;
pub mod java;
pub mod javascript;
pub mod perl;
pub mod php;
pub mod python;
pub mod registry;
pub mod ruby;
pub mod rust;

/// Capability contract implemented by every ecosystem resolver.
///
/// Parsing is synchronous file work with typed [`ParseError`]s. Repository
/// resolution is fail-soft and returns `None` on any miss, so the caller can
/// batch lookups without wrapping each one in error handling.
#[async_trait]
pub trait EcosystemResolver: Send + Sync {
    /// Canonical lowercase ecosystem name, used as the tag on every
    /// [`PackageInfo`] this resolver produces.
    fn ecosystem_name(&self) -> &'static str;

    /// Manifest filenames this resolver recognizes.
    fn manifest_files(&self) -> &'static [&'static str];

    /// Lockfile filenames this resolver recognizes.
    fn lockfile_names(&self) -> &'static [&'static str];

    /// The subset of recognized lockfiles present directly under `directory`.
    fn detect_lockfiles(&self, directory: &Path) -> Vec<PathBuf> {
        self.lockfile_names()
            .iter()
            .map(|name| directory.join(name))
            .filter(|path| path.exists())
            .collect()
    }

    /// Parse declared dependencies out of a manifest file.
    fn parse_manifest(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError>;

    /// Parse pinned dependencies out of a lockfile.
    fn parse_lockfile(&self, path: &Path) -> Result<Vec<PackageInfo>, ParseError>;

    /// Best-effort mapping from a package name to its source repository.
    async fn resolve_repository(&self, package: &str) -> Option<RepositoryRef>;
}

/// Existence precondition shared by all parse operations. Checked before the
/// filename is inspected, so a missing file always reports as missing rather
/// than as an unknown format.
pub(crate) fn ensure_exists(path: &Path, kind: FileKind) -> Result<(), ParseError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ParseError::not_found(kind, path))
    }
}

/// Final path component as UTF-8, empty when the path has none.
pub(crate) fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|name| name.to_str()).unwrap_or_default()
}

/// Read a file that passed the preconditions, wrapping I/O failures.
pub(crate) fn read_file(path: &Path) -> Result<String, ParseError> {
    std::fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })
}
