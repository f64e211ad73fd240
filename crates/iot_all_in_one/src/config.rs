use common::postgres::PostgresConfig;
use config::{Config, ConfigError, Environment};
use iot_api::validate_retention_days;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default = "default_log_json")]
    pub log_json: bool,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Create tables and indexes on startup
    #[serde(default = "default_postgres_apply_schema")]
    pub postgres_apply_schema: bool,

    // NATS configuration
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream carrying notification jobs
    #[serde(default = "default_notification_stream")]
    pub notification_stream: String,

    /// Durable consumer name for the notification worker
    #[serde(default = "default_notification_consumer_name")]
    pub notification_consumer_name: String,

    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Delivery attempts per notification before it is dropped
    #[serde(default = "default_notification_max_deliver")]
    pub notification_max_deliver: i64,

    /// Delay before a failed notification is redelivered, in seconds
    #[serde(default = "default_notification_retry_delay_secs")]
    pub notification_retry_delay_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Retention
    /// Device events older than this are deleted
    #[serde(default = "default_event_retention_days")]
    pub event_retention_days: i64,

    #[serde(default = "default_retention_sweep_interval_secs")]
    pub retention_sweep_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_json() -> bool {
    true
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "iot".to_string()
}

fn default_postgres_username() -> String {
    "iot".to_string()
}

fn default_postgres_password() -> String {
    "iot".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_apply_schema() -> bool {
    true
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_notification_stream() -> String {
    "notifications".to_string()
}

fn default_notification_consumer_name() -> String {
    "iot-notification-worker".to_string()
}

fn default_nats_batch_size() -> usize {
    20
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_notification_max_deliver() -> i64 {
    10
}

fn default_notification_retry_delay_secs() -> u64 {
    30
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_event_retention_days() -> i64 {
    iot_api::EVENT_RETENTION_DAYS
}

fn default_retention_sweep_interval_secs() -> u64 {
    // daily
    24 * 60 * 60
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("IOT"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_retention_days(self.event_retention_days)
            .map_err(|e| ConfigError::Message(format!("IOT_EVENT_RETENTION_DAYS: {}", e)))?;

        if self.retention_sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "IOT_RETENTION_SWEEP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn postgres(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            apply_schema: self.postgres_apply_schema,
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 4] = [
        "IOT_LOG_LEVEL",
        "IOT_EVENT_RETENTION_DAYS",
        "IOT_NOTIFICATION_STREAM",
        "IOT_RETENTION_SWEEP_INTERVAL_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.event_retention_days, 100);
        assert_eq!(config.notification_stream, "notifications");
        assert_eq!(config.postgres().database, "iot");
        assert_eq!(config.retention_sweep_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("IOT_LOG_LEVEL", "debug");
        std::env::set_var("IOT_EVENT_RETENTION_DAYS", "30");
        std::env::set_var("IOT_NOTIFICATION_STREAM", "alarms");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.event_retention_days, 30);
        assert_eq!(config.notification_stream, "alarms");

        clear_env();
    }

    #[test]
    fn test_rejects_non_positive_retention() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        for days in ["0", "-1"] {
            std::env::set_var("IOT_EVENT_RETENTION_DAYS", days);
            let err = ServiceConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("IOT_EVENT_RETENTION_DAYS"));
        }

        std::env::set_var("IOT_EVENT_RETENTION_DAYS", "9223372036854775807");
        assert!(ServiceConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    fn test_rejects_zero_sweep_interval() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("IOT_RETENTION_SWEEP_INTERVAL_SECS", "0");
        let err = ServiceConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("IOT_RETENTION_SWEEP_INTERVAL_SECS"));

        clear_env();
    }
}
