use serde::{Deserialize, Serialize};
use std::fs;
use std::env;
use anyhow::{Result, Context};

pub const CONFIG_PATH: &str = "data/config.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Sold-listings search URL; the page number is appended as `&page=N`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    /// Exclusive
    #[serde(default = "default_stop_page")]
    pub stop_page: u32,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_error_log")]
    pub error_log: String,
    #[serde(default = "default_comp_error_log")]
    pub comp_error_log: String,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "https://www.hemnet.se/salda/bostader?location_ids%5B%5D=17744&item_types%5B%5D=villa&item_types%5B%5D=radhus&item_types%5B%5D=bostadsratt&sold_age=13m".to_string()
}

fn default_start_page() -> u32 {
    1
}

fn default_stop_page() -> u32 {
    10
}

fn default_database_path() -> String {
    "data/hemnet.db".to_string()
}

fn default_error_log() -> String {
    "data/errors.txt".to_string()
}

fn default_comp_error_log() -> String {
    "data/errors_comp.txt".to_string()
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_request_delay_ms() -> u64 {
    2000 // 2 seconds between requests
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: default_base_url(),
            start_page: default_start_page(),
            stop_page: default_stop_page(),
            database_path: default_database_path(),
            error_log: default_error_log(),
            comp_error_log: default_comp_error_log(),
            tracing_level: default_tracing_level(),
            user_agent: default_user_agent(),
            request_delay_ms: default_request_delay_ms(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(CONFIG_PATH)?;

        // Override with environment variables if present
        if let Ok(base_url) = env::var("BASE_URL") {
            config.base_url = base_url;
        }

        if let Ok(start_page) = env::var("START_PAGE") {
            config.start_page = start_page.parse()
                .context("Failed to parse START_PAGE environment variable")?;
        }

        if let Ok(stop_page) = env::var("STOP_PAGE") {
            config.stop_page = stop_page.parse()
                .context("Failed to parse STOP_PAGE environment variable")?;
        }

        if let Ok(database_path) = env::var("DATABASE_PATH") {
            config.database_path = database_path;
        }

        if let Ok(error_log) = env::var("ERROR_LOG") {
            config.error_log = error_log;
        }

        if let Ok(comp_error_log) = env::var("COMP_ERROR_LOG") {
            config.comp_error_log = comp_error_log;
        }

        if let Ok(tracing_level) = env::var("TRACING_LEVEL") {
            config.tracing_level = tracing_level;
        }

        if let Ok(user_agent) = env::var("USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Ok(request_delay) = env::var("REQUEST_DELAY_MS") {
            config.request_delay_ms = request_delay.parse()
                .context("Failed to parse REQUEST_DELAY_MS environment variable")?;
        }

        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = timeout.parse()
                .context("Failed to parse REQUEST_TIMEOUT_SECONDS environment variable")?;
        }

        Ok(config)
    }

    /// Read a config file; a missing file gives the defaults
    pub fn load_from(path: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(config_str) => serde_yaml::from_str(&config_str)
                .with_context(|| format!("Failed to parse {}", path)),
            Err(_) => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("base_url is required (set via data/config.yaml or BASE_URL env var)");
        }

        if self.start_page >= self.stop_page {
            anyhow::bail!(
                "start_page ({}) must be lower than stop_page ({})",
                self.start_page,
                self.stop_page
            );
        }

        Ok(())
    }

    pub fn create_default() -> Result<()> {
        // Ensure data directory exists
        std::fs::create_dir_all("data")?;

        let config_str = serde_yaml::to_string(&Config::default())?;
        fs::write(CONFIG_PATH, config_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.start_page, 1);
        assert_eq!(config.stop_page, 10);
        assert_eq!(config.database_path, "data/hemnet.db");
        assert!(config.base_url.contains("location_ids%5B%5D=17744"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("start_page: 3\nstop_page: 5\n").unwrap();
        assert_eq!(config.start_page, 3);
        assert_eq!(config.stop_page, 5);
        assert_eq!(config.request_delay_ms, 2000);
        assert_eq!(config.error_log, "data/errors.txt");
        assert_eq!(config.comp_error_log, "data/errors_comp.txt");
    }

    #[test]
    fn test_empty_page_range_is_rejected() {
        let config = Config {
            start_page: 5,
            stop_page: 5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from("does/not/exist.yaml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
