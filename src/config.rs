//! Configuration loader and validator for the content pipeline.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub agents: AgentsConfig,
    pub content: Content,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub notification_ttl_ms: u64,
}

/// Agent endpoint and the two agent identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentsConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    pub generation_agent_id: String,
    pub scheduling_agent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Content {
    /// Voice guideline used when the operator has not saved a brand voice.
    pub fallback_voice: String,
}

impl App {
    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }

    /// Default SQLite URL inside `data_dir`.
    pub fn database_url(&self) -> String {
        format!(
            "sqlite://{}/contentflow.db",
            self.data_dir.trim_end_matches('/')
        )
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.notification_ttl_ms == 0 {
        return Err(ConfigError::Invalid("app.notification_ttl_ms must be > 0"));
    }

    if Url::parse(cfg.agents.endpoint.trim()).is_err() {
        return Err(ConfigError::Invalid("agents.endpoint must be a valid URL"));
    }
    if cfg.agents.generation_agent_id.trim().is_empty() {
        return Err(ConfigError::Invalid("agents.generation_agent_id must be non-empty"));
    }
    if cfg.agents.scheduling_agent_id.trim().is_empty() {
        return Err(ConfigError::Invalid("agents.scheduling_agent_id must be non-empty"));
    }

    if cfg.content.fallback_voice.trim().is_empty() {
        return Err(ConfigError::Invalid("content.fallback_voice must be non-empty"));
    }

    Ok(())
}

/// Example configuration, also printed by `contentflow example-config`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  notification_ttl_ms: 5000

agents:
  endpoint: "http://localhost:3000/api/agent"
  api_key: ""
  generation_agent_id: "699878ee97f966a0d9ca80c4"
  scheduling_agent_id: "69987900ad9589c32de456d2"

content:
  fallback_voice: "Professional and engaging"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.notification_ttl(), Duration::from_secs(5));
        assert_eq!(cfg.app.database_url(), "sqlite://./data/contentflow.db");
    }

    #[test]
    fn invalid_endpoint() {
        let mut cfg = example_cfg();
        cfg.agents.endpoint = "not a url".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("agents.endpoint")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_agent_ids() {
        let mut cfg = example_cfg();
        cfg.agents.generation_agent_id = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("generation_agent_id")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.agents.scheduling_agent_id = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_app_settings() {
        let mut cfg = example_cfg();
        cfg.app.notification_ttl_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.app.data_dir = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.content.fallback_voice = "\n".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn api_key_is_optional() {
        let yaml = example().replace("  api_key: \"\"\n", "");
        let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(cfg.agents.api_key.is_empty());
        validate(&cfg).unwrap();
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_cfg();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.agents.generation_agent_id, "699878ee97f966a0d9ca80c4");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
