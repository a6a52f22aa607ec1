//! Configuration management for LoRa coverage mapping

use crate::types::{AesKey, SessionKeys};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Base name of the configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "lora-coverage";

/// Prefix of environment overrides, e.g. `LORA_COVERAGE__DATABASE__URL`
pub const ENV_PREFIX: &str = "LORA_COVERAGE";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Session keys (optional until a frame has to be decrypted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora: Option<LoraConfig>,

    /// Log ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Coverage export configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

/// LoRaWAN session keys, as 32 hex digits each
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoraConfig {
    /// Network session key
    #[serde(default)]
    pub nwk_s_key: Option<AesKey>,

    /// Application session key
    #[serde(default)]
    pub app_s_key: Option<AesKey>,
}

/// Log ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Message tag of uplink events in the bridge log
    #[serde(default = "default_uplink_message")]
    pub uplink_message: String,

    /// Keep radio measurements of records whose payload has the wrong length
    #[serde(default = "default_salvage_invalid_payload_length")]
    pub salvage_invalid_payload_length: bool,
}

/// Coverage export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// JSONP callback name
    #[serde(default = "default_callback")]
    pub callback: String,

    /// Output file
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log to file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_database_url() -> String {
    "sqlite://coverage.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_min_connections() -> u32 {
    1
}

const fn default_connect_timeout() -> u64 {
    30
}

fn default_uplink_message() -> String {
    "PUSH_DATA: RXPK".to_string()
}

const fn default_salvage_invalid_payload_length() -> bool {
    true
}

fn default_callback() -> String {
    "eqfeed_callback".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("data_geo.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            uplink_message: default_uplink_message(),
            salvage_invalid_payload_length: default_salvage_invalid_payload_length(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            callback: default_callback(),
            output: default_output(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from an optional file and the environment
    ///
    /// Without an explicit path, `lora-coverage.{toml,json,yaml}` in the
    /// working directory is used when present.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or parsed.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let builder = config::Config::builder();
        let builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first offending field.
    pub fn validate(&self) -> crate::Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url", "must not be empty"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(invalid(
                "database.min_connections",
                "must not exceed database.max_connections",
            ));
        }

        if self.ingest.uplink_message.is_empty() {
            return Err(invalid("ingest.uplink_message", "must not be empty"));
        }

        if !is_callback_name(&self.export.callback) {
            return Err(invalid(
                "export.callback",
                "must be a JavaScript identifier path such as eqfeed_callback",
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(invalid("logging.format", "must be json or pretty"));
        }

        Ok(())
    }

    /// The configured session key pair
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either key is missing.
    pub fn session_keys(&self) -> crate::Result<SessionKeys> {
        let lora = self.lora.as_ref();
        let nwk_s_key = lora
            .and_then(|l| l.nwk_s_key)
            .ok_or_else(|| missing_key("lora.nwk_s_key"))?;
        let app_s_key = lora
            .and_then(|l| l.app_s_key)
            .ok_or_else(|| missing_key("lora.app_s_key"))?;

        Ok(SessionKeys {
            nwk_s_key,
            app_s_key,
        })
    }
}

/// Whether `name` can be emitted verbatim as a JSONP callback
#[must_use]
pub fn is_callback_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}

fn invalid(field: &str, message: &str) -> crate::Error {
    crate::Error::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn missing_key(field: &str) -> crate::Error {
    crate::Error::Configuration {
        message: format!("{field} is not set; session keys must be configured"),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::uninlined_format_args
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const NWK_S_KEY: &str = "2B7E151628AED2A6ABF7158809CF4F3C";
    const APP_S_KEY: &str = "000102030405060708090A0B0C0D0E0F";

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.database.url, "sqlite://coverage.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.min_connections, 1);
        assert_eq!(config.ingest.uplink_message, "PUSH_DATA: RXPK");
        assert!(config.ingest.salvage_invalid_payload_length);
        assert_eq!(config.export.callback, "eqfeed_callback");
        assert_eq!(config.export.output, PathBuf::from("data_geo.json"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.lora.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_deserialization() {
        let json_str = r#"{
            "database": {"url": "sqlite:///tmp/test.db"},
            "ingest": {"salvage_invalid_payload_length": false}
        }"#;

        let config: Config = serde_json::from_str(json_str).unwrap();

        assert_eq!(config.database.url, "sqlite:///tmp/test.db");
        assert_eq!(config.database.max_connections, 5);
        assert!(!config.ingest.salvage_invalid_payload_length);
        assert_eq!(config.ingest.uplink_message, "PUSH_DATA: RXPK");
        assert_eq!(config.export.callback, "eqfeed_callback");
    }

    #[test]
    fn test_session_keys_missing() {
        let config = Config::default();
        let err = config.session_keys().unwrap_err();
        assert!(matches!(err, crate::Error::Configuration { .. }));
        assert!(err.to_string().contains("lora.nwk_s_key"));

        let config = Config {
            lora: Some(LoraConfig {
                nwk_s_key: Some(NWK_S_KEY.parse().unwrap()),
                app_s_key: None,
            }),
            ..Config::default()
        };
        assert!(config.session_keys().unwrap_err().to_string().contains("lora.app_s_key"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "sqlite://coverage-test.db"

[lora]
nwk_s_key = "{NWK_S_KEY}"
app_s_key = "{APP_S_KEY}"

[export]
callback = "window.coverage"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        let keys = config.session_keys().unwrap();

        assert_eq!(config.database.url, "sqlite://coverage-test.db");
        assert_eq!(config.export.callback, "window.coverage");
        assert_eq!(keys.nwk_s_key, NWK_S_KEY.parse().unwrap());
        assert_eq!(keys.app_s_key, APP_S_KEY.parse().unwrap());
    }

    #[test]
    fn test_load_rejects_bad_key() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[lora]\nnwk_s_key = \"0102\"").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, crate::Error::Configuration { .. }), "{err}");
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.export.callback = "alert(1)".to_string();
        assert!(matches!(
            config.validate(),
            Err(crate::Error::Validation { ref field, .. }) if field == "export.callback"
        ));

        let mut config = Config::default();
        config.database.min_connections = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_callback_names() {
        assert!(is_callback_name("eqfeed_callback"));
        assert!(is_callback_name("$jsonp.cb_1"));
        assert!(!is_callback_name(""));
        assert!(!is_callback_name("1abc"));
        assert!(!is_callback_name("a..b"));
        assert!(!is_callback_name("cb();evil"));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config {
            lora: Some(LoraConfig {
                nwk_s_key: Some(NWK_S_KEY.parse().unwrap()),
                app_s_key: Some(APP_S_KEY.parse().unwrap()),
            }),
            ..Config::default()
        };

        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&serialized).unwrap();

        assert_eq!(
            deserialized.session_keys().unwrap(),
            config.session_keys().unwrap()
        );
        assert!(!format!("{:?}", config).contains(NWK_S_KEY));
    }
}
