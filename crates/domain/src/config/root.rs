use serde::{Deserialize, Serialize};

use super::blocklists::BlocklistsConfig;
use super::cache::CacheConfig;
use super::client_groups::ClientGroupConfig;
use super::client_identification::ClientIdentificationConfig;
use super::errors::ConfigError;
use super::local_records::LocalRecord;
use super::logging::LoggingConfig;
use super::query_log::QueryLogConfig;
use super::response::ResponseConfig;
use super::server::ServerConfig;
use super::upstream::{ResolverConfig, UpstreamDef};

const DEFAULT_CONFIG_PATH: &str = "sentrydns.toml";
const FALLBACK_CONFIG_PATH: &str = "/etc/sentrydns/config.toml";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstreams: Vec<UpstreamDef>,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub blocklists: BlocklistsConfig,

    #[serde(default)]
    pub response: ResponseConfig,

    #[serde(default)]
    pub local_records: Vec<LocalRecord>,

    #[serde(default)]
    pub client_identification: ClientIdentificationConfig,

    #[serde(default)]
    pub client_groups: Vec<ClientGroupConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub query_log: QueryLogConfig,
}

impl Config {
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)?
        } else if std::path::Path::new(FALLBACK_CONFIG_PATH).exists() {
            Self::from_file(FALLBACK_CONFIG_PATH)?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(listen) = overrides.listen {
            self.server.listen = vec![listen];
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.is_empty() {
            return Err(ConfigError::Validation(
                "no server.listen addresses configured".to_string(),
            ));
        }
        if self.upstreams.is_empty() {
            return Err(ConfigError::Validation(
                "no upstreams configured".to_string(),
            ));
        }
        if self.cache.min_ttl > self.cache.max_ttl {
            return Err(ConfigError::Validation(
                "cache.min_ttl cannot exceed cache.max_ttl".to_string(),
            ));
        }
        for group in &self.client_groups {
            if group.id.is_empty() {
                return Err(ConfigError::Validation(
                    "client_groups[] entry has an empty id".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Rewrites scalar config values in place, preserving comments and
    /// formatting elsewhere in the file. Array-of-table sections
    /// (`upstreams`, `local_records`, `client_groups`) are left untouched —
    /// the control surface doesn't support structural edits, only scalar
    /// hot-reload knobs.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let existing = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        let mut doc = existing
            .parse::<toml_edit::DocumentMut>()
            .map_err(|e| ConfigError::Parse(format!("failed to parse config file: {e}")))?;

        fn set_val(table: &mut toml_edit::Table, key: &str, new_val: toml_edit::Value) {
            match table.get_mut(key) {
                Some(item @ toml_edit::Item::Value(_)) => {
                    let suffix = item.as_value().and_then(|v| v.decor().suffix()).cloned();
                    *item = toml_edit::Item::Value(new_val);
                    if let (Some(s), Some(v)) = (suffix, item.as_value_mut()) {
                        v.decor_mut().set_suffix(s);
                    }
                }
                Some(item) => *item = toml_edit::Item::Value(new_val),
                None => {
                    table.insert(key, toml_edit::Item::Value(new_val));
                }
            }
        }

        fn str_array(values: &[String]) -> toml_edit::Value {
            let mut arr = toml_edit::Array::new();
            for v in values {
                arr.push(v.as_str());
            }
            toml_edit::Value::Array(arr)
        }

        if let Some(t) = doc.get_mut("server").and_then(|i| i.as_table_mut()) {
            set_val(t, "listen", str_array(&self.server.listen));
            set_val(
                t,
                "reuse_port_listeners",
                toml_edit::Value::from(self.server.reuse_port_listeners as i64),
            );
            set_val(
                t,
                "read_timeout_ms",
                toml_edit::Value::from(self.server.read_timeout_ms as i64),
            );
            set_val(
                t,
                "write_timeout_ms",
                toml_edit::Value::from(self.server.write_timeout_ms as i64),
            );
            set_val(
                t,
                "control_listen",
                toml_edit::Value::from(self.server.control_listen.clone()),
            );
        }

        if let Some(t) = doc.get_mut("resolver").and_then(|i| i.as_table_mut()) {
            set_val(
                t,
                "strategy",
                toml_edit::Value::from(format!("{:?}", self.resolver.strategy).to_lowercase()),
            );
            set_val(
                t,
                "upstream_timeout_ms",
                toml_edit::Value::from(self.resolver.upstream_timeout_ms as i64),
            );
            set_val(
                t,
                "upstream_backoff_ms",
                toml_edit::Value::from(self.resolver.upstream_backoff_ms as i64),
            );
        }

        if let Some(t) = doc.get_mut("cache").and_then(|i| i.as_table_mut()) {
            set_val(t, "min_ttl", toml_edit::Value::from(self.cache.min_ttl as i64));
            set_val(t, "max_ttl", toml_edit::Value::from(self.cache.max_ttl as i64));
            set_val(t, "negative_ttl", toml_edit::Value::from(self.cache.negative_ttl as i64));
            set_val(t, "serve_stale", toml_edit::Value::from(self.cache.serve_stale));
            set_val(
                t,
                "stale_ttl_secs",
                toml_edit::Value::from(self.cache.stale_ttl_secs as i64),
            );
            set_val(
                t,
                "sweep_interval_secs",
                toml_edit::Value::from(self.cache.sweep_interval_secs as i64),
            );
            set_val(
                t,
                "sweep_min_hits",
                toml_edit::Value::from(self.cache.sweep_min_hits as i64),
            );
            set_val(
                t,
                "hot_threshold",
                toml_edit::Value::from(self.cache.hot_threshold as i64),
            );
        }

        if let Some(t) = doc.get_mut("blocklists").and_then(|i| i.as_table_mut()) {
            set_val(
                t,
                "refresh_interval_secs",
                toml_edit::Value::from(self.blocklists.refresh_interval_secs as i64),
            );
            set_val(t, "allowlist", str_array(&self.blocklists.allowlist));
            set_val(t, "denylist", str_array(&self.blocklists.denylist));
        }

        if let Some(t) = doc.get_mut("logging").and_then(|i| i.as_table_mut()) {
            set_val(t, "level", toml_edit::Value::from(self.logging.level.clone()));
            set_val(t, "format", toml_edit::Value::from(self.logging.format.clone()));
        }

        std::fs::write(path, doc.to_string())
            .map_err(|e| ConfigError::FileWrite(path.to_string(), e.to_string()))?;
        Ok(())
    }

    pub fn get_config_path() -> Option<String> {
        if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() {
            Some(DEFAULT_CONFIG_PATH.to_string())
        } else if std::path::Path::new(FALLBACK_CONFIG_PATH).exists() {
            Some(FALLBACK_CONFIG_PATH.to_string())
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub listen: Option<String>,
    pub log_level: Option<String>,
}
