use std::collections::{BTreeMap, HashSet};
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("failed to write config: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookKind {
    Discord,
    Slack,
    Generic,
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookKind::Discord => write!(f, "discord"),
            WebhookKind::Slack => write!(f, "slack"),
            WebhookKind::Generic => write!(f, "generic"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(rename = "type", default = "default_webhook_kind")]
    pub kind: WebhookKind,
    pub url: String,
}

/// Target definition as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_body_contains: Option<String>,
}

fn default_interval_ms() -> u64 {
    30_000
}

fn default_cooldown_minutes() -> u64 {
    5
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_webhook_kind() -> WebhookKind {
    WebhookKind::Generic
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "netpulse.db".into() }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { enabled: false, cooldown_minutes: default_cooldown_minutes(), webhooks: Vec::new() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval_ms: default_interval_ms(),
            database: DatabaseConfig::default(),
            alerts: AlertConfig::default(),
            targets: vec![TargetConfig {
                name: "Example".into(),
                url: "https://example.com".into(),
                method: default_method(),
                expected_status: default_expected_status(),
                timeout_ms: default_timeout_ms(),
                headers: BTreeMap::new(),
                expect_body_contains: None,
            }],
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/netpulse/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("netpulse/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Monitoring")?;
        write_1(f, "Check Interval (ms)", &self.check_interval_ms)?;
        write_1(f, "Targets", &self.targets.len())?;
        for target in &self.targets {
            write_2(f, &target.name, &format!("{} {}", target.method, target.url))?;
        }
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "Alerts")?;
        write_1(f, "Enabled", &self.alerts.enabled)?;
        write_1(f, "Cooldown (min)", &self.alerts.cooldown_minutes)?;
        // Webhook URLs usually embed secrets
        write_1(f, "Webhooks", &self.alerts.webhooks.len())?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/netpulse/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::ReadFailed)?;
            Self::from_toml(&raw_string)?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(ConfigError::WriteFailed)
    }

    /// Reject configurations the monitor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_ms == 0 {
            return Err(ConfigError::Invalid("check_interval_ms must be greater than 0".into()));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            let url = url::Url::parse(&target.url).map_err(|e| {
                ConfigError::Invalid(format!("target {:?} has invalid url: {}", target.name, e))
            })?;

            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "target {:?} must use http or https, got {}",
                    target.name,
                    url.scheme()
                )));
            }

            if reqwest::Method::from_bytes(target.method.as_bytes()).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "target {:?} has invalid method {:?}",
                    target.name, target.method
                )));
            }

            if target.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "target {:?} must have a timeout greater than 0",
                    target.name
                )));
            }

            if !seen.insert(target.url.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate target url {}", target.url)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
        check_interval_ms = 15000

        [database]
        path = "/tmp/pulse.db"

        [alerts]
        enabled = true

        [[alerts.webhooks]]
        type = "discord"
        url = "https://discord.example/hook"

        [[alerts.webhooks]]
        url = "https://hooks.example/generic"

        [[targets]]
        name = "API"
        url = "https://api.example.com/health"
        expect_body_contains = "ok"
        headers = { "X-Token" = "abc" }

        [[targets]]
        name = "Site"
        url = "http://example.com"
        method = "HEAD"
        expected_status = 204
        timeout_ms = 2500
    "#;

    #[test]
    fn test_parse_with_defaults() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.check_interval_ms, 15_000);
        assert_eq!(config.database.path, "/tmp/pulse.db");
        assert!(config.alerts.enabled);
        assert_eq!(config.alerts.cooldown_minutes, 5);
        assert_eq!(config.alerts.webhooks[0].kind, WebhookKind::Discord);
        assert_eq!(config.alerts.webhooks[1].kind, WebhookKind::Generic);

        let api = &config.targets[0];
        assert_eq!(api.method, "GET");
        assert_eq!(api.expected_status, 200);
        assert_eq!(api.timeout_ms, 10_000);
        assert_eq!(api.headers.get("X-Token").map(String::as_str), Some("abc"));
        assert_eq!(api.expect_body_contains.as_deref(), Some("ok"));

        let site = &config.targets[1];
        assert_eq!(site.method, "HEAD");
        assert_eq!(site.expected_status, 204);
        assert_eq!(site.timeout_ms, 2_500);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.check_interval_ms, 30_000);
        assert!(!config.alerts.enabled);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_rejects_duplicate_urls() {
        let mut config = Config::default();
        config.targets.push(config.targets[0].clone());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let mut config = Config::default();
        config.targets[0].url = "ftp://example.com".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = Config { check_interval_ms: 0, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/netpulse");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.check_interval_ms, 30_000);
        assert!(dir.path().join("nested/netpulse.toml").exists());

        let reloaded = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reloaded.targets, config.targets);
    }
}
