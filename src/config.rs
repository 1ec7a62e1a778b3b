//! Application configuration
//!
//! Loaded from the environment (with `.env` support) under the
//! `MATCHBOOK_` prefix, e.g. `MATCHBOOK_PORT=9000`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// Row cap per side for depth snapshots served over HTTP when the
    /// request does not specify its own.
    #[serde(default = "default_depth_limit")]
    pub depth_limit: usize,

    /// Capacity of each broadcast channel feeding the WebSocket layer.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_depth_limit() -> usize {
    50
}

fn default_event_capacity() -> usize {
    1024
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MATCHBOOK"))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.environment, "development");
        assert_eq!(config.depth_limit, 50);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn test_overrides() {
        let config: AppConfig =
            serde_json::from_str(r#"{"port": 9000, "depth_limit": 10}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.depth_limit, 10);
    }
}
