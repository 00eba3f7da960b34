use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::auth::AuthScheme;
use crate::pipeline::{RetryPolicy, RunOptions};

/// Configuration file structure for maintlens.
///
/// Holds the service endpoint, run policy and output preferences so they do
/// not have to be repeated on every invocation. Command-line flags override
/// anything set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Metrics service base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Credential sent with every request
    pub api_key: Option<String>,

    #[serde(default)]
    pub auth_scheme: AuthScheme,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// Attempts per remote call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_true")]
    pub continue_on_file_error: bool,

    #[serde(default)]
    pub concurrent_metrics: bool,

    /// Explicit metric names; fetched from the service when unset
    pub metrics: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            auth_scheme: AuthScheme::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            continue_on_file_error: true,
            concurrent_metrics: false,
            metrics: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RunConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            ..RetryPolicy::default()
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            retry: self.retry_policy(),
            continue_on_file_error: self.continue_on_file_error,
            concurrent_metrics: self.concurrent_metrics,
            metrics: self.metrics.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./maintlens.toml
    /// 3. ./maintlens.json
    /// 4. ./maintlens.yaml
    /// 5. ./maintlens.yml
    ///
    /// Returns default configuration if no file is found. An explicit path
    /// that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "maintlens.toml",
            "maintlens.json",
            "maintlens.yaml",
            "maintlens.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml" | "yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Rejects settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.run.max_attempts == 0 {
            bail!("run.max-attempts must be at least 1");
        }
        if !self.run.backoff_multiplier.is_finite() || self.run.backoff_multiplier < 1.0 {
            bail!("run.backoff-multiplier must be a finite number of at least 1.0");
        }
        url::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid api.base-url: {}", self.api.base_url))?;
        if self.run.metrics.as_ref().is_some_and(|m| m.iter().any(|name| name.trim().is_empty())) {
            bail!("run.metrics must not contain empty names");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.auth_scheme, AuthScheme::ApiKey);
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.run.max_attempts, 3);
        assert_eq!(config.run.retry_delay_ms, 1000);
        assert!(config.run.continue_on_file_error);
        assert!(!config.run.concurrent_metrics);
        assert_eq!(config.output.format, OutputFormat::Summary);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[api]
base-url = "https://metrics.example.com"
api-key = "secret"
auth-scheme = "bearer"

[run]
max-attempts = 5
retry-delay-ms = 250
continue-on-file-error = false
metrics = ["intuitive_design", "code_efficiency"]

[output]
format = "json"
pretty = true
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.api.base_url, "https://metrics.example.com");
        assert_eq!(config.api.api_key.as_deref(), Some("secret"));
        assert_eq!(config.api.auth_scheme, AuthScheme::Bearer);
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.run.max_attempts, 5);
        assert!(!config.run.continue_on_file_error);
        assert_eq!(
            config.run.metrics,
            Some(vec!["intuitive_design".to_string(), "code_efficiency".to_string()])
        );
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "api": { "api-key": "json-key" },
  "run": { "concurrent-metrics": true }
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.api.api_key.as_deref(), Some("json-key"));
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert!(config.run.concurrent_metrics);
        assert!(config.run.continue_on_file_error);
    }

    #[test]
    fn test_load_yaml_without_extension_falls_back() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "run:\n  max-attempts: 7\n").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.run.max_attempts, 7);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = Config::load(Some(Path::new("does-not-exist.toml"))).unwrap_err();
        assert!(err.to_string().contains("does-not-exist.toml"));
    }

    #[test]
    fn test_save_and_reload_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.api.api_key = Some("k".to_string());
        config.run.max_attempts = 4;
        config.output.format = OutputFormat::Json;

        for name in ["saved.toml", "saved.json", "saved.yaml"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();

            let loaded = Config::load(Some(&path)).unwrap();
            assert_eq!(loaded.api.api_key.as_deref(), Some("k"), "{name}");
            assert_eq!(loaded.run.max_attempts, 4, "{name}");
            assert_eq!(loaded.output.format, OutputFormat::Json, "{name}");
        }
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.run.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.run.metrics = Some(vec![" ".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_backoff() {
        for value in ["inf", "nan"] {
            let contents = format!("[run]\nbackoff-multiplier = {value}\nretry-delay-ms = 1\n");
            let config: Config = toml::from_str(&contents).unwrap();
            assert!(config.validate().is_err(), "{value}");
        }
    }

    #[test]
    fn test_run_options_follow_config() {
        let run = RunConfig {
            max_attempts: 4,
            retry_delay_ms: 10,
            backoff_multiplier: 2.0,
            continue_on_file_error: false,
            concurrent_metrics: true,
            metrics: Some(vec!["code_efficiency".to_string()]),
        };

        let options = run.run_options();
        assert_eq!(options.retry.max_attempts, 4);
        assert_eq!(options.retry.delay, Duration::from_millis(10));
        assert!((options.retry.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert!(!options.continue_on_file_error);
        assert!(options.concurrent_metrics);
        assert_eq!(options.metrics, Some(vec!["code_efficiency".to_string()]));
    }
}
