use crate::models::AppConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;

/// File name of the application configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "gazeview.yaml";

/// Prefix of environment variables that override file settings
pub const ENV_PREFIX: &str = "GAZEVIEW";

/// Configuration manager for loading and saving `gazeview.yaml`.
///
/// Loading layers three sources, later ones winning:
/// 1. Built-in defaults ([`AppConfig::default`])
/// 2. `gazeview.yaml` in the config directory, if present
/// 3. Environment variables such as `GAZEVIEW_CAMERA__INDEX=1`
///    (prefix, then section and key joined by `__`)
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    env_prefix: String,

    /// Replaces the process environment when set
    env_override: Option<HashMap<String, String>>,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `gazeview.yaml`; created if missing
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            env_prefix: ENV_PREFIX.to_string(),
            env_override: None,
        })
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn with_environment(mut self, vars: HashMap<String, String>) -> Self {
        self.env_override = Some(vars);
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load the layered configuration and validate it.
    ///
    /// # Returns
    /// The merged AppConfig; defaults if neither file nor environment set anything
    pub fn load(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let defaults = ::config::Config::try_from(&AppConfig::default())
            .context("Failed to build default configuration")?;

        let file = ::config::File::from(self.config_path.as_std_path())
            .format(::config::FileFormat::Yaml)
            .required(false);

        let environment = ::config::Environment::with_prefix(&self.env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(self.env_override.clone().map(|vars| vars.into_iter().collect()));

        let config: AppConfig = ::config::Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to load config: {}", self.config_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    ///
    /// # Arguments
    /// * `config` - The AppConfig to save
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Write the defaults if no config file exists yet.
    ///
    /// # Returns
    /// `true` if a file was written
    pub fn ensure_default_config(&self) -> Result<bool> {
        if self.config_path.exists() {
            return Ok(false);
        }
        self.save(&AppConfig::default())?;
        Ok(true)
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Resolve a path from the config against the config directory.
    pub fn resolve(&self, path: &str) -> Utf8PathBuf {
        let path = Utf8Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path)
            .unwrap()
            .with_environment(HashMap::new());
        (manager, temp_dir)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        let config = manager.load().unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_save_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut config = AppConfig::default();
        config.camera.index = 3;
        config.demo.run_seconds = 42;
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ensure_default_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        assert!(manager.ensure_default_config().unwrap());
        assert!(manager.config_path().exists());
        assert!(!manager.ensure_default_config().unwrap());
    }

    #[test]
    fn test_resolve_relative() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert_eq!(manager.resolve("logs"), manager.config_dir().join("logs"));
    }
}
