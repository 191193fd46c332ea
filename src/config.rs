//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment
//! variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Cache controller configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Target ceiling on the summed size of cached values, in bytes
    pub max_capacity_bytes: usize,
    /// TTL applied when a caller does not pass one
    pub default_ttl: Duration,
    /// Period of the expiry sweep
    pub sweep_interval: Duration,
    /// Capacity of the write-behind buffer, also the flush batch size
    pub write_behind_buffer_size: usize,
    /// Longest a buffered write waits before being flushed
    pub write_behind_flush_interval: Duration,
    /// Serialize concurrent misses for the same key through one compute
    pub coalesce_misses: bool,
    /// HTTP port of the admin server binary
    pub server_port: u16,
}

impl CacheConfig {
    /// Creates a new config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_CAPACITY_BYTES` - Size budget in bytes (default: 104857600)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 600)
    /// - `CACHE_SWEEP_INTERVAL` - Sweep period in seconds (default: 60)
    /// - `CACHE_WRITE_BEHIND_BUFFER` - Write-behind buffer size (default: 100)
    /// - `CACHE_FLUSH_INTERVAL` - Write-behind flush period in seconds (default: 5)
    /// - `CACHE_COALESCE_MISSES` - `true`/`false` (default: true)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_capacity_bytes: env_or("CACHE_MAX_CAPACITY_BYTES", defaults.max_capacity_bytes),
            default_ttl: env_secs_or("CACHE_DEFAULT_TTL", defaults.default_ttl),
            sweep_interval: env_secs_or("CACHE_SWEEP_INTERVAL", defaults.sweep_interval),
            write_behind_buffer_size: env_or(
                "CACHE_WRITE_BEHIND_BUFFER",
                defaults.write_behind_buffer_size,
            ),
            write_behind_flush_interval: env_secs_or(
                "CACHE_FLUSH_INTERVAL",
                defaults.write_behind_flush_interval,
            ),
            coalesce_misses: env_or("CACHE_COALESCE_MISSES", defaults.coalesce_misses),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    // == Validate ==
    /// Rejects values the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_capacity_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "max_capacity_bytes must be greater than 0".to_string(),
            ));
        }
        if self.write_behind_buffer_size == 0 {
            return Err(CacheError::InvalidConfig(
                "write_behind_buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() || self.write_behind_flush_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "sweep and flush intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity_bytes: 100 * 1024 * 1024,
            default_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            write_behind_buffer_size: 100,
            write_behind_flush_interval: Duration::from_secs(5),
            coalesce_misses: true,
            server_port: 3000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs_or(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_capacity_bytes, 104_857_600);
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.write_behind_buffer_size, 100);
        assert_eq!(config.write_behind_flush_interval, Duration::from_secs(5));
        assert!(config.coalesce_misses);
        assert_eq!(config.server_port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("CACHE_MAX_CAPACITY_BYTES", "2048");
        env::set_var("CACHE_DEFAULT_TTL", "30");
        env::set_var("CACHE_COALESCE_MISSES", "false");
        env::set_var("CACHE_SWEEP_INTERVAL", "not-a-number");

        let config = CacheConfig::from_env();
        assert_eq!(config.max_capacity_bytes, 2048);
        assert_eq!(config.default_ttl, Duration::from_secs(30));
        assert!(!config.coalesce_misses);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));

        env::remove_var("CACHE_MAX_CAPACITY_BYTES");
        env::remove_var("CACHE_DEFAULT_TTL");
        env::remove_var("CACHE_COALESCE_MISSES");
        env::remove_var("CACHE_SWEEP_INTERVAL");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let zero_capacity = CacheConfig {
            max_capacity_bytes: 0,
            ..CacheConfig::default()
        };
        assert!(matches!(zero_capacity.validate(), Err(CacheError::InvalidConfig(_))));

        let zero_buffer = CacheConfig {
            write_behind_buffer_size: 0,
            ..CacheConfig::default()
        };
        assert!(zero_buffer.validate().is_err());

        let zero_sweep = CacheConfig {
            sweep_interval: Duration::ZERO,
            ..CacheConfig::default()
        };
        assert!(zero_sweep.validate().is_err());
    }
}
