//! meshpipe configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Main meshpipe configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Remote generation service endpoints and credentials
    pub service: ServiceConfig,

    /// Status polling policy
    pub polling: PollingConfig,

    /// Preview submission defaults
    pub preview: PreviewConfig,

    /// Refine submission defaults
    pub refine: RefineConfig,

    /// Artifact import settings
    pub import: ImportConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the API key environment variable is set and the polling
    /// policy is usable. Call this early to fail fast with a clear message.
    pub fn validate(&self) -> Result<()> {
        self.service.get_api_key()?;

        if self.service.submit_url.trim().is_empty() {
            return Err(eyre::eyre!("service.submit-url must not be empty"));
        }
        if self.service.status_url_base.trim().is_empty() {
            return Err(eyre::eyre!("service.status-url-base must not be empty"));
        }
        if self.polling.interval_ms == 0 {
            return Err(eyre::eyre!("polling.interval-ms must be greater than zero"));
        }
        if self.polling.interval_ms > self.polling.max_wait_ms {
            return Err(eyre::eyre!(
                "polling.interval-ms ({}) must not exceed polling.max-wait-ms ({})",
                self.polling.interval_ms,
                self.polling.max_wait_ms
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidate_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed; a broken config file is reported later by [`Config::load`].
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::candidate_paths(),
        };
        paths
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(&p).ok())
            .and_then(|c| c.log_level)
    }

    /// Project-local `.meshpipe.yml`, then `~/.config/meshpipe/meshpipe.yml`
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".meshpipe.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("meshpipe").join("meshpipe.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Remote generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Endpoint that accepts preview and refine submissions
    #[serde(rename = "submit-url")]
    pub submit_url: String,

    /// Status URL prefix; the task id is appended verbatim
    #[serde(rename = "status-url-base")]
    pub status_url_base: String,

    /// Environment variable containing the bearer token
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Per-request timeout in milliseconds (0 keeps the HTTP client default)
    ///
    /// Also bounds artifact downloads, body included.
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            submit_url: "https://api.meshy.ai/openapi/v2/text-to-3d".to_string(),
            status_url_base: "https://api.meshy.ai/openapi/v2/text-to-3d/".to_string(),
            api_key_env: "MESHY_API_KEY".to_string(),
            request_timeout_ms: 0,
        }
    }
}

impl ServiceConfig {
    /// Read the bearer token from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        debug!(api_key_env = %self.api_key_env, "get_api_key: called");
        let key = std::env::var(&self.api_key_env).map_err(|_| {
            eyre::eyre!(
                "API key not found. Set the {} environment variable.",
                self.api_key_env
            )
        })?;
        if key.trim().is_empty() {
            return Err(eyre::eyre!("API key in {} is empty", self.api_key_env));
        }
        Ok(key.trim().to_string())
    }

    /// Full status URL for a task
    pub fn status_url(&self, task_id: &str) -> String {
        format!("{}{}", self.status_url_base, task_id)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.request_timeout_ms))
        }
    }
}

/// Status polling policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Fixed delay between status requests in milliseconds
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Total budget for one task in milliseconds
    #[serde(rename = "max-wait-ms")]
    pub max_wait_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_wait_ms: 600_000,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Preview submission defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    #[serde(rename = "art-style")]
    pub art_style: String,

    #[serde(rename = "should-remesh")]
    pub should_remesh: bool,

    #[serde(rename = "target-polycount")]
    pub target_polycount: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            art_style: "realistic".to_string(),
            should_remesh: true,
            target_polycount: 30_000,
        }
    }
}

/// Refine submission defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    #[serde(rename = "enable-pbr")]
    pub enable_pbr: bool,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self { enable_pbr: true }
    }
}

/// Artifact import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Import the model after a successful stage
    pub enabled: bool,

    /// Directory downloaded artifacts are cached in
    #[serde(rename = "cache-dir")]
    pub cache_dir: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/meshpipe/cache on Linux)
        let cache_dir = dirs::data_local_dir()
            .map(|d| d.join("meshpipe").join("cache"))
            .unwrap_or_else(|| PathBuf::from(".meshpipe-cache"));

        Self {
            enabled: true,
            cache_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.service.api_key_env, "MESHY_API_KEY");
        assert_eq!(config.service.request_timeout(), None);
        assert_eq!(config.polling.interval(), Duration::from_secs(5));
        assert_eq!(config.polling.max_wait(), Duration::from_secs(600));
        assert_eq!(config.preview.art_style, "realistic");
        assert!(config.preview.should_remesh);
        assert_eq!(config.preview.target_polycount, 30_000);
        assert!(config.refine.enable_pbr);
        assert!(config.import.enabled);
    }

    #[test]
    fn test_status_url_appends_task_id() {
        let service = ServiceConfig::default();
        assert_eq!(
            service.status_url("abc"),
            "https://api.meshy.ai/openapi/v2/text-to-3d/abc"
        );
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: DEBUG
service:
  submit-url: http://localhost:9000/submit
  status-url-base: http://localhost:9000/status/
  api-key-env: MY_KEY
  request-timeout-ms: 45000
polling:
  interval-ms: 250
  max-wait-ms: 10000
preview:
  art-style: sculpture
  should-remesh: false
  target-polycount: 5000
refine:
  enable-pbr: false
import:
  enabled: false
  cache-dir: /tmp/meshpipe-test
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("DEBUG"));
        assert_eq!(config.service.status_url("t"), "http://localhost:9000/status/t");
        assert_eq!(config.service.request_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(config.polling.interval_ms, 250);
        assert_eq!(config.preview.art_style, "sculpture");
        assert!(!config.preview.should_remesh);
        assert!(!config.refine.enable_pbr);
        assert_eq!(config.import.cache_dir, PathBuf::from("/tmp/meshpipe-test"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
polling:
  interval-ms: 1000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.polling.interval_ms, 1000);
        assert_eq!(config.polling.max_wait_ms, 600_000);
        assert_eq!(config.service.api_key_env, "MESHY_API_KEY");
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_load_explicit_path_and_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshpipe.yml");
        fs::write(&path, "log-level: WARN\npolling:\n  interval-ms: 42\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.polling.interval_ms, 42);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("WARN"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/meshpipe.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_validate_requires_api_key() {
        let mut config = Config::default();
        config.service.api_key_env = "MESHPIPE_TEST_KEY_VALIDATE".to_string();

        // SAFETY: serialized with other env-mutating tests
        unsafe { std::env::remove_var("MESHPIPE_TEST_KEY_VALIDATE") };
        assert!(config.validate().is_err());

        unsafe { std::env::set_var("MESHPIPE_TEST_KEY_VALIDATE", "msy_test") };
        assert!(config.validate().is_ok());
        assert_eq!(config.service.get_api_key().unwrap(), "msy_test");

        unsafe { std::env::remove_var("MESHPIPE_TEST_KEY_VALIDATE") };
    }

    #[test]
    #[serial]
    fn test_validate_rejects_bad_polling() {
        let mut config = Config::default();
        config.service.api_key_env = "MESHPIPE_TEST_KEY_POLLING".to_string();
        unsafe { std::env::set_var("MESHPIPE_TEST_KEY_POLLING", "msy_test") };

        config.polling.interval_ms = 0;
        assert!(config.validate().is_err());

        config.polling.interval_ms = 10_000;
        config.polling.max_wait_ms = 5_000;
        assert!(config.validate().is_err());

        unsafe { std::env::remove_var("MESHPIPE_TEST_KEY_POLLING") };
    }
}
