//! Process configuration, read once from the environment at startup.
//!
//! Unlike the TUI predecessor this crate grew from (a TOML file under
//! `~/.config`), a headless ingestion service's deployment-specific knobs —
//! broker address, topic, credentials — belong in the environment, matching
//! how the original's `KafkaProducerManager` reads `KAFKA_BOOTSTRAP_SERVERS`
//! et al. from `os.environ`.

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::extraction::{PublisherAuth, PublisherConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("environment variable {name} has an invalid value: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

/// Frozen for the process lifetime once loaded; nothing in this crate
/// re-reads the environment after startup.
pub struct EngineConfig {
    pub kafka_bootstrap_servers: String,
    pub kafka_topic: String,
    pub kafka_client_id_prefix: String,
    pub kafka_auth: Option<KafkaAuth>,
    pub publisher_worker_count: usize,
    pub table_sink_path: String,
    pub environment: String,
    pub extractor_concurrency: usize,
    pub feed_min_refresh_interval: Duration,
    pub feed_refresh_buffer: Duration,
}

pub struct KafkaAuth {
    pub username: String,
    pub password: SecretString,
}

/// Masks credentials so they never reach a log line via `{:?}`.
impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("kafka_bootstrap_servers", &self.kafka_bootstrap_servers)
            .field("kafka_topic", &self.kafka_topic)
            .field("kafka_client_id_prefix", &self.kafka_client_id_prefix)
            .field("kafka_auth", &self.kafka_auth.as_ref().map(|_| "[REDACTED]"))
            .field("publisher_worker_count", &self.publisher_worker_count)
            .field("table_sink_path", &self.table_sink_path)
            .field("environment", &self.environment)
            .field("extractor_concurrency", &self.extractor_concurrency)
            .field("feed_min_refresh_interval", &self.feed_min_refresh_interval)
            .field("feed_refresh_buffer", &self.feed_refresh_buffer)
            .finish()
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar {
            name,
            reason: format!("expected an integer, got {raw:?}"),
        }),
    }
}

fn optional_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(Duration::from_secs(default_secs)),
        Ok(raw) => raw
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidVar {
                name,
                reason: format!("expected an integer number of seconds, got {raw:?}"),
            }),
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let kafka_auth = match std::env::var("KAFKA_AUTH_ENABLED").as_deref() {
            Ok("true") | Ok("1") => Some(KafkaAuth {
                username: required("KAFKA_USERNAME")?,
                password: SecretString::from(required("KAFKA_PASSWORD")?),
            }),
            _ => None,
        };

        Ok(Self {
            kafka_bootstrap_servers: required("KAFKA_BOOTSTRAP_SERVERS")?,
            kafka_topic: required("KAFKA_PRODUCER_TOPIC")?,
            kafka_client_id_prefix: optional("KAFKA_CLIENT_ID_PREFIX", "pulsebee"),
            kafka_auth,
            publisher_worker_count: optional_usize("PUBLISHER_WORKER_COUNT", 3)?,
            table_sink_path: optional("TABLE_SINK_PATH", "./pulsebee-table-sink.db"),
            environment: optional("ENVIRONMENT", "development"),
            extractor_concurrency: optional_usize("EXTRACTOR_CONCURRENCY", 3)?,
            feed_min_refresh_interval: optional_secs("FEED_MIN_REFRESH_INTERVAL_SECS", 10)?,
            feed_refresh_buffer: optional_secs("FEED_REFRESH_BUFFER_SECS", 5)?,
        })
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            bootstrap_servers: self.kafka_bootstrap_servers.clone(),
            topic: self.kafka_topic.clone(),
            client_id_prefix: self.kafka_client_id_prefix.clone(),
            auth: self.kafka_auth.as_ref().map(|auth| PublisherAuth {
                username: auth.username.clone(),
                password: auth.password.clone(),
            }),
            worker_count: self.publisher_worker_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that
    // mutate them so parallel test execution can't interleave writes.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in [
            "KAFKA_BOOTSTRAP_SERVERS",
            "KAFKA_PRODUCER_TOPIC",
            "KAFKA_CLIENT_ID_PREFIX",
            "KAFKA_AUTH_ENABLED",
            "KAFKA_USERNAME",
            "KAFKA_PASSWORD",
            "PUBLISHER_WORKER_COUNT",
            "TABLE_SINK_PATH",
            "ENVIRONMENT",
            "EXTRACTOR_CONCURRENCY",
            "FEED_MIN_REFRESH_INTERVAL_SECS",
            "FEED_REFRESH_BUFFER_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_var_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let result = EngineConfig::from_env();
        assert!(matches!(result, Err(ConfigError::MissingVar("KAFKA_BOOTSTRAP_SERVERS"))));
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092");
        std::env::set_var("KAFKA_PRODUCER_TOPIC", "articles");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.kafka_client_id_prefix, "pulsebee");
        assert_eq!(config.publisher_worker_count, 3);
        assert_eq!(config.environment, "development");
        assert!(config.kafka_auth.is_none());
        clear_all();
    }

    #[test]
    fn auth_requires_username_and_password_when_enabled() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092");
        std::env::set_var("KAFKA_PRODUCER_TOPIC", "articles");
        std::env::set_var("KAFKA_AUTH_ENABLED", "true");

        let result = EngineConfig::from_env();
        assert!(matches!(result, Err(ConfigError::MissingVar("KAFKA_USERNAME"))));
        clear_all();
    }

    #[test]
    fn debug_output_masks_credentials() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092");
        std::env::set_var("KAFKA_PRODUCER_TOPIC", "articles");
        std::env::set_var("KAFKA_AUTH_ENABLED", "true");
        std::env::set_var("KAFKA_USERNAME", "svc-account");
        std::env::set_var("KAFKA_PASSWORD", "super-secret");

        let config = EngineConfig::from_env().unwrap();
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("super-secret"));
        assert!(debug_output.contains("[REDACTED]"));
        clear_all();
    }

    #[test]
    fn invalid_integer_var_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092");
        std::env::set_var("KAFKA_PRODUCER_TOPIC", "articles");
        std::env::set_var("EXTRACTOR_CONCURRENCY", "not-a-number");

        let result = EngineConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidVar { name: "EXTRACTOR_CONCURRENCY", .. })));
        clear_all();
    }
}
