use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::decoder::{DecodePolicy, MeasurementSchema};

/// Top-level config loaded from `monitor.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub keys: KeyLayout,
    #[serde(default)]
    pub decode: DecodeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// When set, every data endpoint requires `?access_token=` to match.
    /// Unset disables gating entirely.
    pub access_token: Option<String>,
    /// Upper bound on the store work done for one request, retries included.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Directory with the dashboard assets, served for unmatched paths.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            access_token: None,
            request_timeout_ms: default_request_timeout_ms(),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            max_connections: default_max_connections(),
            dial_timeout_ms: default_timeout_ms(),
            read_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// One command is a write followed by a read, so a round trip gets both
    /// budgets.
    pub fn round_trip_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms + self.write_timeout_ms)
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_max_connections() -> usize {
    5
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts per store call. 0 = keep retrying until the request deadline.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

/// Key names the pipeline reads. Every prefix is a literal string followed
/// directly by the record id.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyLayout {
    /// Monitor keys are enumerated with `<monitor_prefix>*`; the id is the
    /// remainder of the key. The same key holds the monitor name.
    #[serde(default = "default_monitor_prefix")]
    pub monitor_prefix: String,
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
    #[serde(default = "default_unit_prefix")]
    pub unit_prefix: String,
    #[serde(default = "default_results_prefix")]
    pub results_prefix: String,
    /// List holding the numeric check ids.
    #[serde(default = "default_checks_list")]
    pub checks_list: String,
    #[serde(default = "default_check_prefix")]
    pub check_prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            monitor_prefix: default_monitor_prefix(),
            label_prefix: default_label_prefix(),
            unit_prefix: default_unit_prefix(),
            results_prefix: default_results_prefix(),
            checks_list: default_checks_list(),
            check_prefix: default_check_prefix(),
        }
    }
}

fn default_monitor_prefix() -> String {
    "name:".to_string()
}

fn default_label_prefix() -> String {
    "value_label:".to_string()
}

fn default_unit_prefix() -> String {
    "value_unit:".to_string()
}

fn default_results_prefix() -> String {
    "results:".to_string()
}

fn default_checks_list() -> String {
    "checks".to_string()
}

fn default_check_prefix() -> String {
    "check:".to_string()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("keys.{field} must not be empty")]
    EmptyKey { field: &'static str },
    #[error("keys.{field} = {value:?} contains glob metacharacters")]
    GlobInKey { field: &'static str, value: String },
    #[error("observed key {key:?} does not start with keys.monitor_prefix {prefix:?}")]
    ForeignKey { key: String, prefix: String },
    #[error("observed key {key:?} is the bare monitor prefix")]
    EmptyId { key: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

impl KeyLayout {
    pub fn monitor_pattern(&self) -> String {
        format!("{}*", self.monitor_prefix)
    }

    pub fn name_key(&self, id: &str) -> String {
        format!("{}{id}", self.monitor_prefix)
    }

    pub fn label_key(&self, id: &str) -> String {
        format!("{}{id}", self.label_prefix)
    }

    pub fn unit_key(&self, id: &str) -> String {
        format!("{}{id}", self.unit_prefix)
    }

    pub fn results_key(&self, id: &str) -> String {
        format!("{}{id}", self.results_prefix)
    }

    pub fn check_key(&self, entry: &str) -> String {
        format!("{}{entry}", self.check_prefix)
    }

    /// Strip the monitor prefix from an enumerated key.
    pub fn monitor_id<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.monitor_prefix.as_str())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("monitor_prefix", &self.monitor_prefix),
            ("label_prefix", &self.label_prefix),
            ("unit_prefix", &self.unit_prefix),
            ("results_prefix", &self.results_prefix),
            ("checks_list", &self.checks_list),
            ("check_prefix", &self.check_prefix),
        ];
        for (field, value) in fields {
            if value.is_empty() {
                return Err(ConfigError::EmptyKey { field });
            }
            if value.contains(['*', '?', '[', ']', '\\']) {
                return Err(ConfigError::GlobInKey {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check keys actually found in the store against the monitor prefix.
    pub fn validate_observed<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        for key in keys {
            match self.monitor_id(key) {
                None => {
                    return Err(ConfigError::ForeignKey {
                        key: key.to_string(),
                        prefix: self.monitor_prefix.clone(),
                    });
                }
                Some("") => {
                    return Err(ConfigError::EmptyId {
                        key: key.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DecodeConfig {
    #[serde(default)]
    pub schema: MeasurementSchema,
    #[serde(default)]
    pub policy: DecodePolicy,
}

impl MonitorConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: MonitorConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `MONITOR_*` / `REDIS_URL` overrides from the process environment.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(listen) = lookup("MONITOR_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(token) = lookup("MONITOR_ACCESS_TOKEN") {
            self.server.access_token = Some(token);
        }
        if let Some(dir) = lookup("MONITOR_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.store.url = url;
        }
        if let Some(schema) = lookup("MONITOR_SCHEMA") {
            self.decode.schema = schema.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.keys.validate()?;
        if self.store.max_connections == 0 {
            return Err(ConfigError::Zero {
                field: "store.max_connections",
            });
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "server.request_timeout_ms",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_legacy_deployment() {
        let config = MonitorConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:5000");
        assert_eq!(config.store.max_connections, 5);
        assert_eq!(config.store.dial_timeout(), Duration::from_secs(10));
        assert_eq!(config.store.round_trip_timeout(), Duration::from_secs(20));
        assert_eq!(config.keys.monitor_prefix, "name:");
        assert_eq!(config.decode.schema, MeasurementSchema::SixField);
        assert_eq!(config.decode.policy, DecodePolicy::ZeroFill);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [server]
            access_token = "s3cret"

            [store]
            max_connections = 12

            [decode]
            schema = "five_field"
            policy = "skip"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.access_token.as_deref(), Some("s3cret"));
        assert_eq!(config.server.listen, "0.0.0.0:5000");
        assert_eq!(config.store.max_connections, 12);
        assert_eq!(config.store.read_timeout_ms, 10_000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.decode.schema, MeasurementSchema::FiveField);
        assert_eq!(config.decode.policy, DecodePolicy::Skip);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("MONITOR_ACCESS_TOKEN", "tok"),
            ("REDIS_URL", "redis://cache:6380"),
            ("MONITOR_SCHEMA", "five_field"),
        ]
        .into_iter()
        .collect();

        let mut config = MonitorConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.access_token.as_deref(), Some("tok"));
        assert_eq!(config.store.url, "redis://cache:6380");
        assert_eq!(config.decode.schema, MeasurementSchema::FiveField);
    }

    #[test]
    fn unknown_schema_override_is_rejected() {
        let mut config = MonitorConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "MONITOR_SCHEMA").then(|| "seven_field".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn key_layout_rejects_glob_and_empty_prefixes() {
        let mut keys = KeyLayout::default();
        keys.monitor_prefix = "name*".to_string();
        assert_eq!(
            keys.validate(),
            Err(ConfigError::GlobInKey {
                field: "monitor_prefix",
                value: "name*".to_string()
            })
        );

        keys.monitor_prefix = String::new();
        assert_eq!(
            keys.validate(),
            Err(ConfigError::EmptyKey {
                field: "monitor_prefix"
            })
        );
    }

    #[test]
    fn observed_keys_must_carry_prefix() {
        let keys = KeyLayout::default();
        assert!(keys.validate_observed(["name:a", "name:b"]).is_ok());
        assert!(matches!(
            keys.validate_observed(["name:a", "label:b"]),
            Err(ConfigError::ForeignKey { .. })
        ));
        assert!(matches!(
            keys.validate_observed(["name:"]),
            Err(ConfigError::EmptyId { .. })
        ));
    }

    #[test]
    fn key_derivation() {
        let keys = KeyLayout::default();
        assert_eq!(keys.monitor_pattern(), "name:*");
        assert_eq!(keys.monitor_id("name:sensorA"), Some("sensorA"));
        assert_eq!(keys.monitor_id("value_label:sensorA"), None);
        assert_eq!(keys.label_key("sensorA"), "value_label:sensorA");
        assert_eq!(keys.unit_key("sensorA"), "value_unit:sensorA");
        assert_eq!(keys.results_key("7"), "results:7");
        assert_eq!(keys.check_key("7"), "check:7");
    }
}
