use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

/// Root configuration structure, deserialized from `.dephealth.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// What gets scanned and what gets skipped.
    #[serde(default)]
    pub scan: ScanConfig,
    /// Registry request behavior.
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanConfig {
    /// Package names skipped during resolution, any ecosystem.
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    /// Verify TLS certificates on registry requests. The `--insecure` flag
    /// overrides this to `false` for one run.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_verify_tls() -> bool {
    true
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { verify_tls: true }
    }
}

impl Config {
    /// Case-insensitive exclusion check against `scan.exclude`.
    pub fn is_excluded(&self, package: &str) -> bool {
        self.scan
            .exclude
            .iter()
            .any(|name| name.eq_ignore_ascii_case(package))
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`, the path passed via `--config`
/// 2. `<project_path>/.dephealth.toml`
/// 3. `~/.config/dephealth/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        let content = std::fs::read_to_string(path)?;
        return Ok(toml::from_str(&content)?);
    }

    let project_config = project_path.join(".dephealth.toml");
    if project_config.exists() {
        let content = std::fs::read_to_string(&project_config)?;
        return Ok(toml::from_str(&content)?);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("dephealth").join("config.toml");
        if home_config.exists() {
            let content = std::fs::read_to_string(&home_config)?;
            return Ok(toml::from_str(&content)?);
        }
    }

    Ok(Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.scan.exclude.is_empty());
        assert!(config.network.verify_tls);
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
[scan]
exclude = ["internal-tool", "my-company/private"]

[network]
verify_tls = false
"#,
        )
        .unwrap();
        assert_eq!(config.scan.exclude.len(), 2);
        assert!(!config.network.verify_tls);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str("[scan]\nexclude = [\"x\"]\n").unwrap();
        assert!(config.network.verify_tls);
    }

    #[test]
    fn test_is_excluded_case_insensitive() {
        let config: Config = toml::from_str("[scan]\nexclude = [\"Internal-Tool\"]\n").unwrap();
        assert!(config.is_excluded("internal-tool"));
        assert!(config.is_excluded("INTERNAL-TOOL"));
        assert!(!config.is_excluded("other"));
    }

    #[test]
    fn test_load_config_prefers_project_file() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(".dephealth.toml"),
            "[scan]\nexclude = [\"from-project\"]\n",
        )
        .unwrap();

        let config = load_config(dir.path(), None).unwrap();
        assert!(config.is_excluded("from-project"));
    }

    #[test]
    fn test_load_config_override_wins() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(".dephealth.toml"),
            "[scan]\nexclude = [\"from-project\"]\n",
        )
        .unwrap();
        let override_path = dir.path().join("custom.toml");
        fs::write(&override_path, "[scan]\nexclude = [\"from-override\"]\n").unwrap();

        let config = load_config(dir.path(), Some(&override_path)).unwrap();
        assert!(config.is_excluded("from-override"));
        assert!(!config.is_excluded("from-project"));
    }
}
