//! # Configuration Management
//!
//! Explicit, validated configuration for the synchronization core. Defaults
//! mirror [`crate::constants`]; every value can be overridden through
//! `FLOWSYNC_`-prefixed environment variables (double underscore as section
//! separator, e.g. `FLOWSYNC_SCHEDULER__ENABLED=true`).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use flowsync_core::config::FlowsyncConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FlowsyncConfig::load()?;
//! println!("batch size: {}", config.sync.batch_size);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants;
use crate::error::{Result, SyncError};

/// Top-level configuration for the synchronization core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowsyncConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub scheduler: SchedulerConfig,
}

/// Database connection settings for the Postgres-backed store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; empty when running against the in-memory store.
    pub url: String,
    /// Connection pool size.
    pub pool: u32,
}

/// Tuning for the two ingestion engines and reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Workflows per batch during runtime ingestion (checkpoint granularity).
    pub batch_size: usize,
    /// Reconciliation debounce window per (tenant, source, target) key.
    pub reconcile_debounce_secs: u64,
}

/// Scheduler loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Disabled by default: all synchronization is request-driven unless
    /// explicitly enabled.
    pub enabled: bool,
    /// How often each loop wakes up.
    pub tick_secs: u64,
    /// Debounce window per (tenant, environment) trigger key.
    pub trigger_debounce_secs: u64,
    /// Fallback sync interval for environments that do not set their own.
    pub default_sync_interval_secs: u64,
}

impl Default for FlowsyncConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: String::new(),
                pool: 10,
            },
            sync: SyncConfig {
                batch_size: constants::SYNC_BATCH_SIZE,
                reconcile_debounce_secs: constants::RECONCILE_DEBOUNCE_SECS,
            },
            scheduler: SchedulerConfig {
                enabled: false,
                tick_secs: constants::SCHEDULER_TICK_SECS,
                trigger_debounce_secs: constants::TRIGGER_DEBOUNCE_SECS,
                default_sync_interval_secs: constants::DEFAULT_SYNC_INTERVAL_SECS,
            },
        }
    }
}

impl FlowsyncConfig {
    /// Load configuration from defaults plus `FLOWSYNC_` environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let builder = ::config::Config::builder()
            .set_default("database.url", defaults.database.url.clone())
            .and_then(|b| b.set_default("database.pool", defaults.database.pool))
            .and_then(|b| b.set_default("sync.batch_size", defaults.sync.batch_size as u64))
            .and_then(|b| {
                b.set_default(
                    "sync.reconcile_debounce_secs",
                    defaults.sync.reconcile_debounce_secs,
                )
            })
            .and_then(|b| b.set_default("scheduler.enabled", defaults.scheduler.enabled))
            .and_then(|b| b.set_default("scheduler.tick_secs", defaults.scheduler.tick_secs))
            .and_then(|b| {
                b.set_default(
                    "scheduler.trigger_debounce_secs",
                    defaults.scheduler.trigger_debounce_secs,
                )
            })
            .and_then(|b| {
                b.set_default(
                    "scheduler.default_sync_interval_secs",
                    defaults.scheduler.default_sync_interval_secs,
                )
            })
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        let config = builder
            .add_source(
                ::config::Environment::with_prefix("FLOWSYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        let loaded: FlowsyncConfig = config
            .try_deserialize()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            return Err(SyncError::Configuration(
                "sync.batch_size must be at least 1".to_string(),
            ));
        }
        if self.scheduler.tick_secs == 0 {
            return Err(SyncError::Configuration(
                "scheduler.tick_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconcile_debounce(&self) -> Duration {
        Duration::from_secs(self.sync.reconcile_debounce_secs)
    }

    pub fn trigger_debounce(&self) -> Duration {
        Duration::from_secs(self.scheduler.trigger_debounce_secs)
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FlowsyncConfig::default();
        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.sync.reconcile_debounce_secs, 60);
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.default_sync_interval_secs, 1800);
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let mut config = FlowsyncConfig::default();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let config = FlowsyncConfig::default();
        assert_eq!(config.reconcile_debounce(), Duration::from_secs(60));
        assert_eq!(config.scheduler_tick(), Duration::from_secs(60));
    }
}
