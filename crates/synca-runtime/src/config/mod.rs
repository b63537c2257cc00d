//! Runtime configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Environment variables (runtime)
//! 2. User's synca_config.rs (compile-time, via `SYNCA_CONFIG_RS`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use synca_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .num_threads(2)
//!     .stack_size(128 * 1024);
//! ```

pub mod defaults {
    include!(concat!(env!("OUT_DIR"), "/synca_merged_config.rs"));
}

use std::sync::OnceLock;
use std::time::Duration;

use synca_core::constants::MIN_STACK_SIZE;
use synca_core::env::{env_get, env_get_bool};
use synca_core::error::{SyncaError, SyncaResult};

/// Runtime configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Worker threads in the default pool
    pub num_threads: usize,
    /// Diagnostic name of the default pool
    pub pool_name: String,
    /// Usable stack size per coroutine (guard page excluded)
    pub stack_size: usize,
    /// Upper bound on a single idle park of a worker
    pub park_timeout: Duration,
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SYNCA_NUM_THREADS` - Worker threads in the default pool
    /// - `SYNCA_POOL_NAME` - Name of the default pool
    /// - `SYNCA_STACK_SIZE` - Coroutine stack size in bytes
    /// - `SYNCA_PARK_TIMEOUT_MS` - Idle park timeout in milliseconds
    /// - `SYNCA_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            num_threads: env_get("SYNCA_NUM_THREADS", defaults::NUM_THREADS),
            pool_name: synca_core::env::env_get_str("SYNCA_POOL_NAME", "synca"),
            stack_size: env_get("SYNCA_STACK_SIZE", defaults::STACK_SIZE),
            park_timeout: Duration::from_millis(env_get(
                "SYNCA_PARK_TIMEOUT_MS",
                defaults::PARK_TIMEOUT_MS,
            )),
            debug_logging: env_get_bool("SYNCA_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Explicit defaults, no environment override.
    pub fn new() -> Self {
        Self {
            num_threads: defaults::NUM_THREADS,
            pool_name: "synca".to_string(),
            stack_size: defaults::STACK_SIZE,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    pub fn pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn validate(&self) -> SyncaResult<()> {
        if self.num_threads == 0 {
            return Err(SyncaError::InvalidConfig("num_threads must be at least 1"));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(SyncaError::InvalidConfig("stack_size below minimum"));
        }
        if self.park_timeout.is_zero() {
            return Err(SyncaError::InvalidConfig("park_timeout must be non-zero"));
        }
        Ok(())
    }
}

static GLOBAL: OnceLock<RuntimeConfig> = OnceLock::new();

/// Install the process-wide config. Only the first call wins.
pub fn install(config: RuntimeConfig) -> SyncaResult<()> {
    config.validate()?;
    GLOBAL
        .set(config)
        .map_err(|_| SyncaError::InvalidConfig("runtime config already installed"))
}

/// The process-wide config (`from_env()` if none was installed)
pub fn global() -> &'static RuntimeConfig {
    GLOBAL.get_or_init(RuntimeConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RuntimeConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_threads, defaults::NUM_THREADS);
        assert_eq!(config.stack_size, defaults::STACK_SIZE);
    }

    #[test]
    fn test_builder_and_validation() {
        let config = RuntimeConfig::new().num_threads(0);
        assert_eq!(
            config.validate(),
            Err(SyncaError::InvalidConfig("num_threads must be at least 1"))
        );

        let config = RuntimeConfig::new().stack_size(1024);
        assert!(config.validate().is_err());

        let config = RuntimeConfig::new()
            .num_threads(2)
            .pool_name("net")
            .park_timeout(Duration::from_millis(5));
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_name, "net");
    }
}
