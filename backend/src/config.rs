use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/medai.yaml";

/// Largest retention age or sweep interval, in seconds, that still fits a
/// `chrono::Duration`.
pub const MAX_RETENTION_SECS: u64 = (i64::MAX / 1000) as u64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub models: ModelPaths,
    pub llm: LlmConfig,
    /// Optional YAML file replacing the built-in condition table.
    pub conditions_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub results_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub retention: RetentionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("../uploads"),
            results_dir: PathBuf::from("../results"),
            max_upload_bytes: 16 * 1024 * 1024,
            retention: RetentionConfig::default(),
        }
    }
}

/// Artifact retention. `max_age_secs: None` keeps files forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_age_secs: Option<u64>,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: None,
            sweep_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub brain_classifier: PathBuf,
    pub lungs_classifier: PathBuf,
    pub super_resolution: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            brain_classifier: PathBuf::from("../models/resnet50_brain.pt"),
            lungs_classifier: PathBuf::from("../models/resnet50_lungs.pt"),
            super_resolution: PathBuf::from("../models/srgan_generator.pt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Root of an OpenAI-compatible API, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Check `GET {base_url}/models` when the client is first initialized.
    pub verify_on_init: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "meta-llama/Llama-3.2-3B-Instruct".to_string(),
            api_key: None,
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 500,
            timeout_secs: 120,
            verify_on_init: true,
        }
    }
}

impl AppConfig {
    /// Loads the YAML file named by `MEDAI_CONFIG` (or the default path when it
    /// exists), then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("MEDAI_CONFIG").ok();
        let path = explicit
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if explicit.is_some() || Path::new(&path).exists() {
            log::info!("Loading configuration from {}", path);
            Self::from_file(&path)?
        } else {
            log::info!("No config file at {}, using defaults", path);
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        if config_str.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that parse but cannot be used at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retention = &self.storage.retention;
        if let Some(age) = retention.max_age_secs.filter(|age| *age > MAX_RETENTION_SECS) {
            return Err(ConfigError::InvalidValue {
                key: "storage.retention.max_age_secs".to_string(),
                value: age.to_string(),
            });
        }
        if retention.sweep_interval_secs > MAX_RETENTION_SECS {
            return Err(ConfigError::InvalidValue {
                key: "storage.retention.sweep_interval_secs".to_string(),
                value: retention.sweep_interval_secs.to_string(),
            });
        }
        Ok(())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_value("PORT", &port)?;
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("RESULTS_DIR") {
            self.storage.results_dir = PathBuf::from(dir);
        }
        if let Some(age) = lookup("RETENTION_MAX_AGE_SECS") {
            self.storage.retention.max_age_secs = Some(parse_value("RETENTION_MAX_AGE_SECS", &age)?);
        }
        if let Some(path) = lookup("BRAIN_MODEL_PATH") {
            self.models.brain_classifier = PathBuf::from(path);
        }
        if let Some(path) = lookup("LUNGS_MODEL_PATH") {
            self.models.lungs_classifier = PathBuf::from(path);
        }
        if let Some(path) = lookup("SR_MODEL_PATH") {
            self.models.super_resolution = PathBuf::from(path);
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(path) = lookup("CONDITIONS_FILE") {
            self.conditions_file = Some(PathBuf::from(path));
        }
        self.validate()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.storage.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.llm.max_tokens, 500);
        assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert!((config.llm.top_p - 0.9).abs() < f32::EPSILON);
        assert!(config.storage.retention.max_age_secs.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 9000
storage:
  retention:
    max_age_secs: 86400
llm:
  model: local-instruct
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.retention.max_age_secs, Some(86400));
        assert_eq!(config.storage.retention.sweep_interval_secs, 3600);
        assert_eq!(config.llm.model, "local-instruct");
        assert_eq!(config.llm.max_tokens, 500);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = AppConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8081"),
            ("UPLOAD_DIR", "/tmp/up"),
            ("LLM_BASE_URL", "http://llm:9000/v1"),
            ("RETENTION_MAX_AGE_SECS", "60"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.storage.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(config.llm.base_url, "http://llm:9000/v1");
        assert_eq!(config.storage.retention.max_age_secs, Some(60));
    }

    #[test]
    fn test_invalid_port_override_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_out_of_range_retention_is_rejected() {
        let yaml = format!("storage:\n  retention:\n    max_age_secs: {}\n", u64::MAX);
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "storage.retention.max_age_secs"));

        let yaml = format!("storage:\n  retention:\n    max_age_secs: {}\n", MAX_RETENTION_SECS);
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.storage.retention.max_age_secs, Some(MAX_RETENTION_SECS));

        let huge = (MAX_RETENTION_SECS + 1).to_string();
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "RETENTION_MAX_AGE_SECS").then(|| huge.clone()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = AppConfig::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config/medai.yaml")).unwrap();
        assert_eq!(config.server.port, 5000);
        assert!(config.storage.retention.max_age_secs.is_none());
        assert_eq!(config.models.super_resolution, PathBuf::from("../models/srgan_generator.pt"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AppConfig::from_file("/nonexistent/medai.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
