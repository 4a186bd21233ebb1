//! Host-facing configuration aggregation.
//!
//! The host loads this from wherever it keeps configuration (file, env,
//! service); the engine only consumes the deserialized form.

use arara_data::connection::ConnectionConfig;
use arara_integration::retry::RetrySchedule;
use arara_quoting::QuotingParameters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-adapter connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Override of the default `[1, 2, 5, 10, 15]` reconnect ladder.
    pub retry_delays_sec: Vec<u64>,
    pub inactivity_timeout_sec: Option<u64>,
    pub ping_timeout_sec: Option<u64>,
}

impl ConnectionSettings {
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            retry: RetrySchedule::from_secs(&self.retry_delays_sec),
            inactivity_timeout: self.inactivity_timeout_sec.map(Duration::from_secs),
            ping_timeout: self.ping_timeout_sec.map(Duration::from_secs),
        }
    }
}

/// Aggregated engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    pub connection: ConnectionSettings,
    /// Per-instrument depth snapshot limit; `None` uses the product-type
    /// defaults (1000 derivatives / 5000 spot).
    pub snapshot_depth_limit: Option<u32>,
    pub quoting: QuotingParameters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: SystemConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SystemConfig::default());

        let connection = config.connection.to_connection_config();
        assert_eq!(connection.retry, RetrySchedule::default());
        assert_eq!(connection.inactivity_timeout, None);
    }

    #[test]
    fn test_overrides_deserialize() {
        let config: SystemConfig = serde_json::from_str(
            r#"
            {
                "connection": {
                    "retry_delays_sec": [2, 4],
                    "inactivity_timeout_sec": 10
                },
                "snapshot_depth_limit": 500,
                "quoting": { "grouping_bp": 5.0, "cooldown_on_fill_ms": 1000 }
            }
            "#,
        )
        .unwrap();

        let connection = config.connection.to_connection_config();
        assert_eq!(connection.retry, RetrySchedule::from_secs(&[2, 4]));
        assert_eq!(connection.inactivity_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.snapshot_depth_limit, Some(500));
        assert_eq!(config.quoting.grouping_bp, 5.0);
        assert_eq!(config.quoting.cooldown_on_fill_ms, 1000);
    }
}
