//! Name → resolver table with alias support and directory auto-detection.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use reqwest::Client;

use super::csharp::CSharpResolver;
use super::dart::DartResolver;
use super::elixir::ElixirResolver;
use super::go::GoResolver;
use super::java::JavaResolver;
use super::javascript::JavaScriptResolver;
use super::perl::PerlResolver;
use super::php::PhpResolver;
use super::python::PythonResolver;
use super::ruby::RubyResolver;
use super::rust::RustResolver;
use super::EcosystemResolver;

/// Lookup table from ecosystem names and aliases to resolver instances.
///
/// Every alias of an ecosystem points at the same shared instance, so
/// [`ResolverRegistry::resolvers`] returns each resolver exactly once no
/// matter how many names reach it. Built once at startup and passed by
/// reference from there.
pub struct ResolverRegistry {
    table: HashMap<String, Arc<dyn EcosystemResolver>>,
}

impl ResolverRegistry {
    /// An empty registry with nothing wired.
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// The full built-in resolver set, with `client` shared across every
    /// network strategy.
    pub fn with_builtins(client: &Client) -> Self {
        let mut registry = Self::new();

        let python: Arc<dyn EcosystemResolver> = Arc::new(PythonResolver::new(client.clone()));
        registry.register("python", python.clone());
        registry.register("py", python);

        let javascript: Arc<dyn EcosystemResolver> =
            Arc::new(JavaScriptResolver::new(client.clone()));
        registry.register("javascript", javascript.clone());
        registry.register("typescript", javascript.clone());
        registry.register("js", javascript.clone());
        registry.register("npm", javascript);

        let go: Arc<dyn EcosystemResolver> = Arc::new(GoResolver::new(client.clone()));
        registry.register("go", go);

        let ruby: Arc<dyn EcosystemResolver> = Arc::new(RubyResolver::new(client.clone()));
        registry.register("ruby", ruby.clone());
        registry.register("gem", ruby);

        let rust: Arc<dyn EcosystemResolver> = Arc::new(RustResolver::new(client.clone()));
        registry.register("rust", rust.clone());
        registry.register("cargo", rust);

        let php: Arc<dyn EcosystemResolver> = Arc::new(PhpResolver::new(client.clone()));
        registry.register("php", php.clone());
        registry.register("composer", php);

        let java: Arc<dyn EcosystemResolver> = Arc::new(JavaResolver::new(client.clone()));
        registry.register("java", java.clone());
        registry.register("kotlin", java.clone());
        registry.register("scala", java.clone());
        registry.register("maven", java);

        let csharp: Arc<dyn EcosystemResolver> = Arc::new(CSharpResolver::new(client.clone()));
        registry.register("csharp", csharp.clone());
        registry.register("dotnet", csharp.clone());
        registry.register("nuget", csharp);

        let dart: Arc<dyn EcosystemResolver> = Arc::new(DartResolver::new(client.clone()));
        registry.register("dart", dart.clone());
        registry.register("flutter", dart.clone());
        registry.register("pub", dart);

        let elixir: Arc<dyn EcosystemResolver> = Arc::new(ElixirResolver::new(client.clone()));
        registry.register("elixir", elixir.clone());
        registry.register("hex", elixir);

        let perl: Arc<dyn EcosystemResolver> = Arc::new(PerlResolver::new(client.clone()));
        registry.register("perl", perl.clone());
        registry.register("cpan", perl);

        registry
    }

    /// Case-insensitive lookup by canonical name or alias.
    pub fn get(&self, ecosystem: &str) -> Option<Arc<dyn EcosystemResolver>> {
        self.table.get(&ecosystem.to_lowercase()).cloned()
    }

    /// Insert or overwrite a name → resolver mapping. Names are stored
    /// lowercase, matching the lookup.
    pub fn register(&mut self, ecosystem: &str, resolver: Arc<dyn EcosystemResolver>) {
        self.table.insert(ecosystem.to_lowercase(), resolver);
    }

    /// Every distinct backing resolver exactly once, whatever the alias
    /// fan-in. Order is unspecified.
    pub fn resolvers(&self) -> Vec<Arc<dyn EcosystemResolver>> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for resolver in self.table.values() {
            if seen.insert(Arc::as_ptr(resolver) as *const ()) {
                unique.push(resolver.clone());
            }
        }
        unique
    }

    /// Canonical names of every ecosystem with manifest or lockfile evidence
    /// directly under `directory`, sorted and duplicate-free. Read-only, so
    /// calling it twice on an unchanged directory gives the same answer.
    pub fn detect_ecosystems(&self, directory: &Path) -> Vec<String> {
        let mut detected = BTreeSet::new();

        for resolver in self.resolvers() {
            if !resolver.detect_lockfiles(directory).is_empty() {
                detected.insert(resolver.ecosystem_name());
                continue;
            }
            for manifest in resolver.manifest_files() {
                if directory.join(manifest).exists() {
                    detected.insert(resolver.ecosystem_name());
                    break;
                }
            }
        }

        detected.into_iter().map(String::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::models::{PackageInfo, RepositoryRef};
    use async_trait::async_trait;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn builtins() -> ResolverRegistry {
        ResolverRegistry::with_builtins(&Client::new())
    }

    #[test]
    fn test_aliases_share_one_instance() {
        let registry = builtins();
        let canonical = registry.get("javascript").unwrap();
        for alias in ["typescript", "js", "npm", "JS", "Npm"] {
            let resolver = registry.get(alias).unwrap();
            assert_eq!(resolver.ecosystem_name(), "javascript");
            assert!(Arc::ptr_eq(&canonical, &resolver));
        }
    }

    #[test]
    fn test_unknown_name_is_none() {
        assert!(builtins().get("cobol").is_none());
    }

    #[test]
    fn test_resolvers_enumerates_each_backing_instance_once() {
        let registry = builtins();
        let unique = registry.resolvers();
        assert_eq!(unique.len(), 11);
        assert!(registry.table.len() > unique.len());

        let names: HashSet<&str> = unique.iter().map(|r| r.ecosystem_name()).collect();
        assert_eq!(names.len(), 11);
        assert!(names.contains("go") && names.contains("perl"));
    }

    #[test]
    fn test_detect_ecosystems_sorted_and_idempotent() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("go.sum"), "github.com/a/b v1.0.0 h1:x\n").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();

        let registry = builtins();
        let first = registry.detect_ecosystems(dir.path());
        assert_eq!(first, vec!["go", "javascript", "rust"]);
        assert_eq!(registry.detect_ecosystems(dir.path()), first);
    }

    #[test]
    fn test_detect_ecosystems_empty_directory() {
        let dir = tempdir().unwrap();
        assert!(builtins().detect_ecosystems(dir.path()).is_empty());
    }

    struct StubResolver;

    #[async_trait]
    impl EcosystemResolver for StubResolver {
        fn ecosystem_name(&self) -> &'static str {
            "stub"
        }
        fn manifest_files(&self) -> &'static [&'static str] {
            &["stub.toml"]
        }
        fn lockfile_names(&self) -> &'static [&'static str] {
            &[]
        }
        fn parse_manifest(&self, _path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
            Ok(Vec::new())
        }
        fn parse_lockfile(&self, _path: &Path) -> Result<Vec<PackageInfo>, ParseError> {
            Ok(Vec::new())
        }
        async fn resolve_repository(&self, _package: &str) -> Option<RepositoryRef> {
            None
        }
    }

    #[test]
    fn test_register_custom_resolver_and_alias() {
        let mut registry = ResolverRegistry::new();
        let stub: Arc<dyn EcosystemResolver> = Arc::new(StubResolver);
        registry.register("stub", stub.clone());
        registry.register("STUB-ALIAS", stub);

        assert_eq!(registry.get("Stub").unwrap().ecosystem_name(), "stub");
        assert!(registry.get("stub-alias").is_some());
        assert_eq!(registry.resolvers().len(), 1);
    }

    #[test]
    fn test_detect_lockfiles_default_impl() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("go.sum"), "").unwrap();

        let registry = builtins();
        let go = registry.get("go").unwrap();
        let found: Vec<PathBuf> = go.detect_lockfiles(dir.path());
        assert_eq!(found, vec![dir.path().join("go.sum")]);
    }
}
