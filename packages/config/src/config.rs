use std::time::Duration;
use thiserror::Error;

use crate::constants::*;
use crate::env::{parse_env, string_env};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {variable}: {value}")]
    InvalidValue { variable: String, value: String },
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("Unsupported database URL: {0}")]
    UnsupportedDatabase(String),
}

/// Resource limits applied to every sandboxed execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub max_source_bytes: usize,
    pub memory_mb: u64,
    pub python_bin: String,
    /// Refuse to run when the host cannot confine the child's filesystem
    /// and network access
    pub require_isolation: bool,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_EXEC_TIMEOUT_MS),
            max_output_bytes: DEFAULT_EXEC_MAX_OUTPUT_BYTES,
            max_source_bytes: DEFAULT_EXEC_MAX_SOURCE_BYTES,
            memory_mb: DEFAULT_EXEC_MEMORY_MB,
            python_bin: DEFAULT_PYTHON_BIN.to_string(),
            require_isolation: DEFAULT_EXEC_REQUIRE_ISOLATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub database_url: String,
    pub load_timeout: Duration,
    pub max_buffer_bytes: usize,
    pub execution: ExecutionLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            load_timeout: Duration::from_millis(DEFAULT_LOAD_TIMEOUT_MS),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            execution: ExecutionLimits::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = string_env(PAIRROOM_HOST, None, DEFAULT_HOST);

        let port = match parse_env::<u16>(PAIRROOM_PORT)? {
            Some(port) => port,
            None => parse_env::<u16>(PORT)?.unwrap_or(DEFAULT_PORT),
        };

        let cors_origin = string_env(PAIRROOM_CORS_ORIGIN, None, DEFAULT_CORS_ORIGIN);
        let database_url = string_env(PAIRROOM_DATABASE_URL, Some(DATABASE_URL), DEFAULT_DATABASE_URL);

        let load_timeout_ms =
            parse_env::<u64>(PAIRROOM_LOAD_TIMEOUT_MS)?.unwrap_or(DEFAULT_LOAD_TIMEOUT_MS);
        let max_buffer_bytes =
            parse_env::<usize>(PAIRROOM_MAX_BUFFER_BYTES)?.unwrap_or(DEFAULT_MAX_BUFFER_BYTES);

        let execution = ExecutionLimits {
            timeout: Duration::from_millis(
                parse_env::<u64>(PAIRROOM_EXEC_TIMEOUT_MS)?.unwrap_or(DEFAULT_EXEC_TIMEOUT_MS),
            ),
            max_output_bytes: parse_env::<usize>(PAIRROOM_EXEC_MAX_OUTPUT_BYTES)?
                .unwrap_or(DEFAULT_EXEC_MAX_OUTPUT_BYTES),
            max_source_bytes: parse_env::<usize>(PAIRROOM_EXEC_MAX_SOURCE_BYTES)?
                .unwrap_or(DEFAULT_EXEC_MAX_SOURCE_BYTES),
            memory_mb: parse_env::<u64>(PAIRROOM_EXEC_MEMORY_MB)?.unwrap_or(DEFAULT_EXEC_MEMORY_MB),
            python_bin: string_env(PAIRROOM_PYTHON_BIN, None, DEFAULT_PYTHON_BIN),
            require_isolation: parse_env::<bool>(PAIRROOM_EXEC_REQUIRE_ISOLATION)?
                .unwrap_or(DEFAULT_EXEC_REQUIRE_ISOLATION),
        };

        let config = Config {
            host,
            port,
            cors_origin,
            database_url,
            load_timeout: Duration::from_millis(load_timeout_ms),
            max_buffer_bytes,
            execution,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that hold regardless of where values came from
    /// (environment or command-line overrides).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::PortOutOfRange(self.port));
        }
        if self.execution.timeout.is_zero() {
            return Err(ConfigError::ZeroLimit(PAIRROOM_EXEC_TIMEOUT_MS));
        }
        if self.execution.max_output_bytes == 0 {
            return Err(ConfigError::ZeroLimit(PAIRROOM_EXEC_MAX_OUTPUT_BYTES));
        }
        if self.execution.max_source_bytes == 0 {
            return Err(ConfigError::ZeroLimit(PAIRROOM_EXEC_MAX_SOURCE_BYTES));
        }
        if self.max_buffer_bytes == 0 {
            return Err(ConfigError::ZeroLimit(PAIRROOM_MAX_BUFFER_BYTES));
        }
        if self.load_timeout.is_zero() {
            return Err(ConfigError::ZeroLimit(PAIRROOM_LOAD_TIMEOUT_MS));
        }
        if !self.database_url.starts_with("sqlite:") {
            return Err(ConfigError::UnsupportedDatabase(self.database_url.clone()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env() {
        for name in [
            PAIRROOM_HOST,
            PAIRROOM_PORT,
            PORT,
            PAIRROOM_CORS_ORIGIN,
            PAIRROOM_DATABASE_URL,
            DATABASE_URL,
            PAIRROOM_LOAD_TIMEOUT_MS,
            PAIRROOM_EXEC_TIMEOUT_MS,
            PAIRROOM_EXEC_MAX_OUTPUT_BYTES,
            PAIRROOM_EXEC_MAX_SOURCE_BYTES,
            PAIRROOM_EXEC_MEMORY_MB,
            PAIRROOM_PYTHON_BIN,
            PAIRROOM_EXEC_REQUIRE_ISOLATION,
            PAIRROOM_MAX_BUFFER_BYTES,
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_when_env_empty() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
    }

    #[test]
    #[serial]
    fn test_legacy_port_variable() {
        clear_env();
        env::set_var(PORT, "9100");
        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 9100);

        env::set_var(PAIRROOM_PORT, "9200");
        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 9200);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_port_rejected() {
        clear_env();
        env::set_var(PAIRROOM_PORT, "0");
        assert_eq!(Config::from_env(), Err(ConfigError::PortOutOfRange(0)));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_timeout_rejected() {
        clear_env();
        env::set_var(PAIRROOM_EXEC_TIMEOUT_MS, "soon");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_execution_limits_from_env() {
        clear_env();
        env::set_var(PAIRROOM_EXEC_TIMEOUT_MS, "1500");
        env::set_var(PAIRROOM_EXEC_MAX_OUTPUT_BYTES, "1024");
        env::set_var(PAIRROOM_PYTHON_BIN, "/usr/bin/python3");
        let config = Config::from_env().unwrap();
        assert_eq!(config.execution.timeout, Duration::from_millis(1500));
        assert_eq!(config.execution.max_output_bytes, 1024);
        assert_eq!(config.execution.python_bin, "/usr/bin/python3");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_require_isolation_flag() {
        clear_env();
        assert!(!Config::from_env().unwrap().execution.require_isolation);

        env::set_var(PAIRROOM_EXEC_REQUIRE_ISOLATION, "true");
        assert!(Config::from_env().unwrap().execution.require_isolation);

        env::set_var(PAIRROOM_EXEC_REQUIRE_ISOLATION, "sometimes");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));
        clear_env();
    }

    #[test]
    fn test_non_sqlite_database_rejected() {
        let config = Config {
            database_url: "postgres://localhost/pairroom".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedDatabase(_))
        ));
    }
}
