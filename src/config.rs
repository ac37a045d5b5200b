//! Runtime configuration read from the environment.
//!
//! | variable              | meaning                              | default            |
//! |-----------------------|--------------------------------------|--------------------|
//! | `DKVM_LOG`            | `debug`, `info`, `warn` or `error`   | `info`             |
//! | `DKVM_LOG_TIMESTAMP`  | `1`/`true` to timestamp log lines    | off                |
//! | `DKVM_STACK_CAPACITY` | initial guarded-stack capacity (>=1) | `128`              |
//! | `DKVM_BITMAP_PATH`    | output file of `DRAW`                | `proc_picture.bmp` |
//!
//! Command-line flags take precedence over these values.

use crate::types::guarded_stack::DEFAULT_CAPACITY;
use crate::utils::log::{self, Level};
use crate::virtual_machine::errors::VMError;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

/// Default output path of the `DRAW` instruction.
pub const DEFAULT_BITMAP_PATH: &str = "proc_picture.bmp";

/// Tunables shared by the command-line tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_level: Level,
    pub log_timestamp: bool,
    pub stack_capacity: usize,
    pub bitmap_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Level::Info,
            log_timestamp: false,
            stack_capacity: DEFAULT_CAPACITY,
            bitmap_path: PathBuf::from(DEFAULT_BITMAP_PATH),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, VMError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VMError> {
        let mut config = Config::default();

        if let Some(value) = lookup("DKVM_LOG") {
            config.log_level = Level::parse(&value).ok_or(VMError::InvalidConfig {
                key: "DKVM_LOG",
                value,
                reason: "expected debug, info, warn or error",
            })?;
        }

        if let Some(value) = lookup("DKVM_LOG_TIMESTAMP") {
            config.log_timestamp = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(VMError::InvalidConfig {
                        key: "DKVM_LOG_TIMESTAMP",
                        value,
                        reason: "expected a boolean",
                    });
                }
            };
        }

        if let Some(value) = lookup("DKVM_STACK_CAPACITY") {
            config.stack_capacity = match value.trim().parse::<usize>() {
                Ok(capacity) if capacity >= 1 => capacity,
                _ => {
                    return Err(VMError::InvalidConfig {
                        key: "DKVM_STACK_CAPACITY",
                        value,
                        reason: "expected a positive integer",
                    });
                }
            };
        }

        if let Some(value) = lookup("DKVM_BITMAP_PATH") {
            if value.is_empty() {
                return Err(VMError::InvalidConfig {
                    key: "DKVM_BITMAP_PATH",
                    value,
                    reason: "path must not be empty",
                });
            }
            config.bitmap_path = PathBuf::from(value);
        }

        Ok(config)
    }

    /// Applies the logging settings to the global logger.
    pub fn apply_logging(&self) {
        log::set_level(self.log_level);
        log::SHOW_TIMESTAMP.store(self.log_timestamp, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        assert_eq!(Config::from_lookup(lookup(&[])).unwrap(), Config::default());
        assert_eq!(Config::default().stack_capacity, 128);
        assert_eq!(
            Config::default().bitmap_path,
            PathBuf::from("proc_picture.bmp")
        );
    }

    #[test]
    fn reads_all_variables() {
        let config = Config::from_lookup(lookup(&[
            ("DKVM_LOG", "debug"),
            ("DKVM_LOG_TIMESTAMP", "true"),
            ("DKVM_STACK_CAPACITY", "16"),
            ("DKVM_BITMAP_PATH", "out/pic.bmp"),
        ]))
        .unwrap();
        assert_eq!(config.log_level, Level::Debug);
        assert!(config.log_timestamp);
        assert_eq!(config.stack_capacity, 16);
        assert_eq!(config.bitmap_path, PathBuf::from("out/pic.bmp"));
    }

    #[test]
    fn rejects_invalid_values() {
        for vars in [
            [("DKVM_LOG", "chatty")],
            [("DKVM_LOG_TIMESTAMP", "maybe")],
            [("DKVM_STACK_CAPACITY", "0")],
            [("DKVM_STACK_CAPACITY", "-4")],
            [("DKVM_BITMAP_PATH", "")],
        ] {
            assert!(matches!(
                Config::from_lookup(lookup(&vars)),
                Err(VMError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn error_names_the_variable() {
        let err = Config::from_lookup(lookup(&[("DKVM_STACK_CAPACITY", "zero")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value \"zero\" for DKVM_STACK_CAPACITY: expected a positive integer"
        );
    }
}
