use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::policy::RawParallelConfig;
use crate::engine::OutcomeOrder;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");
const ENV_PREFIX: &str = "STEMZIP_";
const REPO_CONFIG_STEM: &str = "stemzip";

/// Settings for where and how archives are produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    pub output_dir: PathBuf,
    pub extensions: Vec<String>,
    pub recursive: bool,
    pub order: OutcomeOrder,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("archives"),
            extensions: Vec::new(),
            recursive: false,
            order: OutcomeOrder::Completion,
        }
    }
}

/// Layered configuration: embedded defaults, then user and repository files
/// (or an explicit file), then `STEMZIP_*` environment variables, then any
/// programmatic overrides such as CLI flags.
pub struct ArchiverConfig {
    figment: Figment,
}

impl ArchiverConfig {
    pub fn load_with(custom_config: Option<&Path>, overrides: Option<serde_json::Value>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

        if let Some(path) = custom_config {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            figment = merge_file(figment, path);
        } else {
            if let Some(user_config) = Self::user_config_path() {
                figment = merge_file(figment, &user_config);
            }
            for ext in ["toml", "json", "yaml", "yml"] {
                figment = merge_file(figment, Path::new(&format!("{REPO_CONFIG_STEM}.{ext}")));
            }
        }

        // Environment variables override files
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        Ok(ArchiverConfig { figment })
    }

    /// Get a nested object/section as JSON
    pub fn get_section(&self, path: &str) -> Result<serde_json::Value> {
        Ok(self.figment.extract_inner(path)?)
    }

    /// Get the full merged configuration as a structured value
    pub fn get_full_config(&self) -> Result<serde_json::Value> {
        Ok(self.figment.extract()?)
    }

    /// The raw `parallel_processing` block. Never fails: an unreadable block
    /// is treated as absent so the validator falls back to defaults.
    pub fn parallel_settings(&self) -> RawParallelConfig {
        match self.get_section("parallel_processing") {
            Ok(value) => RawParallelConfig::from_value(value),
            Err(e) => {
                tracing::warn!("Ignoring unreadable parallel_processing config: {}", e);
                RawParallelConfig::default()
            }
        }
    }

    pub fn archive_settings(&self) -> Result<ArchiveSettings> {
        self.figment
            .extract_inner("archive")
            .context("Invalid [archive] configuration")
    }

    fn user_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config").join("stemzip").join("config.toml"))
    }
}

/// Merge a config file, choosing the format from its extension
fn merge_file(figment: Figment, path: &Path) -> Figment {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "json" => figment.merge(Json::file(path)),
        "yaml" | "yml" => figment.merge(Yaml::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_loads_defaults() {
        let config = ArchiverConfig::load_with(None, None).expect("Should load default config");
        let parallel = config.get_section("parallel_processing").unwrap();
        assert_eq!(parallel["max_workers"], "auto");
        assert_eq!(parallel["progress_reporting"], true);

        let archive = config.archive_settings().unwrap();
        assert_eq!(archive.order, OutcomeOrder::Completion);
    }

    #[test]
    fn test_custom_yaml_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.yaml");
        fs::write(
            &path,
            "parallel_processing:\n  enabled: false\n  max_workers: 3\narchive:\n  output_dir: /tmp/zips\n  extensions: [csv]\n",
        )
        .unwrap();

        let config = ArchiverConfig::load_with(Some(&path), None).unwrap();
        let raw = config.parallel_settings();
        assert_eq!(raw.enabled, Some(serde_json::json!(false)));
        assert_eq!(raw.max_workers, Some(serde_json::json!(3)));

        let archive = config.archive_settings().unwrap();
        assert_eq!(archive.output_dir, PathBuf::from("/tmp/zips"));
        assert_eq!(archive.extensions, vec!["csv".to_string()]);
        // Untouched keys keep their defaults
        assert!(!archive.recursive);
    }

    #[test]
    fn test_missing_custom_config_is_an_error() {
        let result = ArchiverConfig::load_with(Some(Path::new("does-not-exist.toml")), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_win() {
        let overrides = serde_json::json!({
            "parallel_processing": { "max_workers": 7 },
            "archive": { "order": "input" }
        });
        let config = ArchiverConfig::load_with(None, Some(overrides)).unwrap();
        assert_eq!(config.parallel_settings().max_workers, Some(serde_json::json!(7)));
        assert_eq!(config.archive_settings().unwrap().order, OutcomeOrder::Input);
    }

    #[test]
    fn test_environment_variables_are_merged() {
        unsafe {
            std::env::set_var("STEMZIP_TESTONLY__MARKER", "from-env");
        }
        let config = ArchiverConfig::load_with(None, None).unwrap();
        assert_eq!(config.get_section("testonly.marker").unwrap(), "from-env");
    }
}
