use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const BASE_URL_ENV: &str = "SMARTICO_BASE_URL";
pub const API_KEY_ENV: &str = "SMARTICO_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub server: ServerConfig,
    pub smartico: SmarticoConfig,
    pub aggregation: AggregationConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmarticoConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub page_delay_ms: u64,
    pub profiles_page_size: u32,
    pub report_page_size: u32,
}

impl SmarticoConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// System/default affiliate excluded from every aggregate.
    pub sentinel_affiliate_id: i64,
    /// Usernames containing this marker are treated as system accounts.
    pub sentinel_username_marker: String,
    /// Amount credited to a first deposit whose row reports a zero deposit total.
    pub ftd_fallback_amount: f64,
    pub player_report_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl DashboardConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DashboardConfig =
            toml::from_str(content).context("failed to parse dashboard config")?;
        config.validate()?;
        Ok(config)
    }

    /// Upstream location and credentials usually live in the environment rather
    /// than in the checked-in TOML. Blank values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_blank(BASE_URL_ENV) {
            self.smartico.base_url = url;
        }
        if let Some(key) = non_blank(API_KEY_ENV) {
            self.smartico.api_key = Some(key);
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.server.port > 0, "server.port must be > 0");
        anyhow::ensure!(
            !self.smartico.base_url.trim().is_empty(),
            "smartico.base_url must not be empty"
        );
        anyhow::ensure!(
            self.smartico.profiles_page_size > 0,
            "smartico.profiles_page_size must be > 0"
        );
        anyhow::ensure!(
            self.smartico.report_page_size > 0,
            "smartico.report_page_size must be > 0"
        );
        anyhow::ensure!(
            self.aggregation.ftd_fallback_amount >= 0.0,
            "aggregation.ftd_fallback_amount must be >= 0"
        );
        anyhow::ensure!(
            self.aggregation.player_report_limit > 0,
            "aggregation.player_report_limit must be > 0"
        );
        Ok(())
    }

    pub fn default_config_path() -> String {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));

        if let Some(dir) = &exe_dir {
            let candidate = dir.join("dashboard.toml");
            if candidate.exists() {
                return candidate.to_string_lossy().to_string();
            }
        }

        let candidate = Path::new("config/dashboard.toml");
        if candidate.exists() {
            return candidate.to_string_lossy().to_string();
        }

        // Running from inside a crate directory during development
        let candidate = Path::new("../../config/dashboard.toml");
        if candidate.exists() {
            return candidate.to_string_lossy().to_string();
        }

        "config/dashboard.toml".to_string()
    }
}

impl FromStr for DashboardConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn shipped_config() -> &'static str {
        include_str!("../../../config/dashboard.toml")
    }

    #[test]
    fn test_parse_shipped_config() {
        let config = DashboardConfig::from_toml_str(shipped_config()).unwrap();
        assert_eq!(config.server.port, 3333);
        assert_eq!(config.smartico.profiles_page_size, 1000);
        assert_eq!(config.smartico.report_page_size, 200);
        assert_eq!(config.smartico.page_delay(), Duration::from_millis(100));
        assert_eq!(config.aggregation.sentinel_affiliate_id, 468904);
        assert_eq!(config.aggregation.sentinel_username_marker, "DEFAULT");
        assert_eq!(config.aggregation.ftd_fallback_amount, 10.0);
        assert_eq!(config.aggregation.player_report_limit, 3000);
        assert!(config.smartico.api_key.is_none());
    }

    #[test]
    fn test_parse_invalid_config_missing_section() {
        let bad = "
[server]
port = 3333
host = \"0.0.0.0\"
";
        assert!(DashboardConfig::from_toml_str(bad).is_err());
    }

    #[test]
    fn test_validate_zero_page_size() {
        let content = shipped_config().replace("report_page_size = 200", "report_page_size = 0");
        let err = DashboardConfig::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("report_page_size must be > 0"));
    }

    #[test]
    fn test_validate_negative_fallback() {
        let content = shipped_config().replace(
            "ftd_fallback_amount = 10.0",
            "ftd_fallback_amount = -1.0",
        );
        let err = DashboardConfig::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("ftd_fallback_amount must be >= 0"));
    }

    #[test]
    fn test_env_overrides_replace_url_and_key() {
        let mut config = DashboardConfig::from_toml_str(shipped_config()).unwrap();
        config.apply_env_overrides(|key| match key {
            BASE_URL_ENV => Some("http://localhost:9999".to_string()),
            API_KEY_ENV => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.smartico.base_url, "http://localhost:9999");
        assert_eq!(config.smartico.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_env_overrides_ignore_blank_values() {
        let mut config = DashboardConfig::from_toml_str(shipped_config()).unwrap();
        let original_url = config.smartico.base_url.clone();
        config.apply_env_overrides(|_| Some("   ".to_string()));
        assert_eq!(config.smartico.base_url, original_url);
        assert!(config.smartico.api_key.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(shipped_config().as_bytes()).unwrap();
        let config = DashboardConfig::load(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = DashboardConfig::load("does/not/exist.toml").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.toml"));
    }
}
