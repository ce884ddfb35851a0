use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils;

pub const DEFAULT_SOURCE_URL: &str = "https://www.eventbrite.com.au/d/australia--sydney/events/";
pub const DEFAULT_SITE_ORIGIN: &str = "https://www.eventbrite.com.au";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Placeholder payload attached to every candidate the listing page does not describe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CandidateDefaults {
    pub city: String,
    pub source_site: String,
    pub venue_name: String,
    pub venue_address: String,
    /// `{title}` and `{city}` are substituted.
    pub description_template: String,
    pub category: Vec<String>,
    pub image_url: String,
}

impl Default for CandidateDefaults {
    fn default() -> Self {
        Self {
            city: "Sydney".to_string(),
            source_site: "Eventbrite".to_string(),
            venue_name: "Sydney CBD".to_string(),
            venue_address: "Sydney, NSW, Australia".to_string(),
            description_template:
                "Join us for {title} in {city}. Experience the best local events.".to_string(),
            category: vec!["General".to_string(), "Social".to_string()],
            image_url: "https://images.unsplash.com/photo-1501281668745-f7f57925c3b4?auto=format&fit=crop&w=800&q=80".to_string(),
        }
    }
}

impl CandidateDefaults {
    pub fn describe(&self, title: &str) -> String {
        self.description_template
            .replace("{title}", title)
            .replace("{city}", &self.city)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub source_url: String,
    pub site_origin: String,
    pub user_agent: String,
    pub fetch_timeout_secs: u64,
    pub watch_interval_secs: u64,
    pub defaults: CandidateDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: utils::database_path(),
            source_url: DEFAULT_SOURCE_URL.to_string(),
            site_origin: DEFAULT_SITE_ORIGIN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: DEFAULT_TIMEOUT_SECS,
            watch_interval_secs: DEFAULT_INTERVAL_SECS,
            defaults: CandidateDefaults::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON config file, then environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = std::env::var("SYDNEY_EVENTS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| utils::config_path());
        let mut config = read_config(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        tracing::debug!(?path, db = ?config.database_path, "configuration loaded");
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SYDNEY_EVENTS_DB") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("SYDNEY_EVENTS_SOURCE_URL") {
            self.source_url = url;
        }
        if let Some(agent) = lookup("SYDNEY_EVENTS_USER_AGENT") {
            self.user_agent = agent;
        }
        if let Some(city) = lookup("SYDNEY_EVENTS_CITY") {
            self.defaults.city = city;
        }
        if let Some(value) = lookup("SYDNEY_EVENTS_TIMEOUT_SECS") {
            self.fetch_timeout_secs = parse_secs("SYDNEY_EVENTS_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("SYDNEY_EVENTS_INTERVAL_SECS") {
            self.watch_interval_secs = parse_secs("SYDNEY_EVENTS_INTERVAL_SECS", &value)?;
        }
        Ok(())
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("SYDNEY_EVENTS_DB", "/tmp/events.sqlite"),
                ("SYDNEY_EVENTS_TIMEOUT_SECS", "25"),
                ("SYDNEY_EVENTS_CITY", "Newcastle"),
            ]))
            .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/events.sqlite"));
        assert_eq!(config.fetch_timeout_secs, 25);
        assert_eq!(config.defaults.city, "Newcastle");
        assert_eq!(config.source_url, DEFAULT_SOURCE_URL);
    }

    #[test]
    fn zero_or_garbage_timeout_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("SYDNEY_EVENTS_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(config
            .apply_env(env(&[("SYDNEY_EVENTS_INTERVAL_SECS", "soon")]))
            .is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"fetch_timeout_secs": 30, "defaults": {"city": "Parramatta"}}"#)
                .unwrap();
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.defaults.city, "Parramatta");
        assert_eq!(config.defaults.venue_name, "Sydney CBD");
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn description_template_substitutes_title_and_city() {
        let defaults = CandidateDefaults::default();
        assert_eq!(
            defaults.describe("Harbour Lights"),
            "Join us for Harbour Lights in Sydney. Experience the best local events."
        );
    }
}
